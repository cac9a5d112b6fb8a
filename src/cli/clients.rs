use comfy_table::{Cell, Table};

use crate::audit::{self, AuditEvent};
use crate::error::{ChequeError, Result};
use crate::models::{AuditAction, Client, ClientType, NewClient};
use crate::registry;
use crate::reminders::{is_valid_email, is_valid_phone};
use crate::security::{sanitize_input, Permission};

use super::Context;

fn print_clients(title: &str, clients: Vec<Client>) {
    let mut table = Table::new();
    table.set_header(vec!["ID", "Type", "Name", "ID / Tax ID", "Phone", "Email"]);
    for client in clients {
        let identity = client.id_number.or(client.tax_id).unwrap_or_default();
        table.add_row(vec![
            Cell::new(client.id),
            Cell::new(client.client_type),
            Cell::new(client.name),
            Cell::new(identity),
            Cell::new(client.phone.unwrap_or_default()),
            Cell::new(client.email.unwrap_or_default()),
        ]);
    }
    println!("{title}\n{table}");
}

pub fn list(client_type: Option<&str>) -> Result<()> {
    let ctx = Context::open()?;
    ctx.authorize(Permission::ClientRead)?;
    let client_type = client_type.map(str::parse::<ClientType>).transpose()?;
    print_clients("Clients", registry::list_clients(&ctx.conn, client_type, true)?);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn build_client(
    name: &str,
    client_type: &str,
    id_number: Option<String>,
    tax_id: Option<String>,
    address: Option<String>,
    phone: Option<String>,
    email: Option<String>,
) -> Result<NewClient> {
    if let Some(p) = phone.as_deref().filter(|p| !is_valid_phone(p)) {
        return Err(ChequeError::Validation(format!("Invalid phone number: {p}")));
    }
    if let Some(e) = email.as_deref().filter(|e| !is_valid_email(e)) {
        return Err(ChequeError::Validation(format!("Invalid email: {e}")));
    }
    Ok(NewClient {
        id_number,
        tax_id,
        address: address.map(|a| sanitize_input(&a)),
        phone,
        email,
        ..NewClient::named(client_type.parse()?, &sanitize_input(name))
    })
}

#[allow(clippy::too_many_arguments)]
pub fn add(
    name: &str,
    client_type: &str,
    id_number: Option<String>,
    tax_id: Option<String>,
    address: Option<String>,
    phone: Option<String>,
    email: Option<String>,
) -> Result<()> {
    let ctx = Context::open()?;
    let actor = ctx.authorize(Permission::ClientCreate)?;
    let client = build_client(name, client_type, id_number, tax_id, address, phone, email)?;
    let id = registry::add_client(&ctx.conn, &client)?;
    audit::log_event(
        &ctx.conn,
        &AuditEvent::new(&actor, AuditAction::Create)
            .resource("client", id)
            .details(serde_json::json!({ "name": client.name, "type": client.client_type })),
    )?;
    println!("Added client: {} (ID {id})", client.name);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn update(
    id: i64,
    name: &str,
    client_type: &str,
    id_number: Option<String>,
    tax_id: Option<String>,
    address: Option<String>,
    phone: Option<String>,
    email: Option<String>,
) -> Result<()> {
    let ctx = Context::open()?;
    let actor = ctx.authorize(Permission::ClientUpdate)?;
    let client = build_client(name, client_type, id_number, tax_id, address, phone, email)?;
    registry::update_client(&ctx.conn, id, &client)?;
    audit::log_event(
        &ctx.conn,
        &AuditEvent::new(&actor, AuditAction::Update)
            .resource("client", id)
            .details(serde_json::json!({ "name": client.name, "type": client.client_type })),
    )?;
    println!("Updated client {id}: {}", client.name);
    Ok(())
}

pub fn search(term: &str) -> Result<()> {
    let ctx = Context::open()?;
    ctx.authorize(Permission::ClientRead)?;
    let found = registry::search_clients(&ctx.conn, term)?;
    if found.is_empty() {
        println!("No clients match '{term}'");
        return Ok(());
    }
    print_clients(&format!("Clients matching '{term}'"), found);
    Ok(())
}

pub fn remove(id: i64) -> Result<()> {
    let ctx = Context::open()?;
    let actor = ctx.authorize(Permission::ClientDelete)?;
    registry::deactivate_client(&ctx.conn, id)?;
    audit::log_event(&ctx.conn, &AuditEvent::new(&actor, AuditAction::Delete).resource("client", id))?;
    println!("Deactivated client {id}");
    Ok(())
}
