use comfy_table::{Cell, Table};

use crate::audit::{self, AuditEvent};
use crate::error::Result;
use crate::models::{AuditAction, NewBranch};
use crate::registry;
use crate::security::Permission;

use super::Context;

fn yes_no(active: bool) -> &'static str {
    if active { "yes" } else { "no" }
}

pub fn list(all: bool) -> Result<()> {
    let ctx = Context::open()?;
    ctx.authorize(Permission::BankRead)?;
    let banks = registry::list_banks(&ctx.conn, !all)?;

    let mut table = Table::new();
    table.set_header(vec!["ID", "Name", "Code", "Active"]);
    for bank in banks {
        table.add_row(vec![
            Cell::new(bank.id),
            Cell::new(bank.name),
            Cell::new(bank.code.unwrap_or_default()),
            Cell::new(yes_no(bank.active)),
        ]);
    }
    println!("Banks\n{table}");
    Ok(())
}

pub fn add(name: &str, code: Option<&str>) -> Result<()> {
    let ctx = Context::open()?;
    let actor = ctx.authorize(Permission::BankCreate)?;
    let id = registry::add_bank(&ctx.conn, name, code)?;
    audit::log_event(
        &ctx.conn,
        &AuditEvent::new(&actor, AuditAction::Create)
            .resource("bank", id)
            .details(serde_json::json!({ "name": name, "code": code })),
    )?;
    println!("Added bank: {name} (ID {id})");
    Ok(())
}

pub fn update(id: i64, name: &str, code: Option<&str>) -> Result<()> {
    let ctx = Context::open()?;
    let actor = ctx.authorize(Permission::BankUpdate)?;
    registry::update_bank(&ctx.conn, id, name, code)?;
    audit::log_event(
        &ctx.conn,
        &AuditEvent::new(&actor, AuditAction::Update)
            .resource("bank", id)
            .details(serde_json::json!({ "name": name, "code": code })),
    )?;
    println!("Updated bank {id}");
    Ok(())
}

pub fn remove(id: i64) -> Result<()> {
    let ctx = Context::open()?;
    let actor = ctx.authorize(Permission::BankDelete)?;
    registry::deactivate_bank(&ctx.conn, id)?;
    audit::log_event(&ctx.conn, &AuditEvent::new(&actor, AuditAction::Delete).resource("bank", id))?;
    println!("Deactivated bank {id}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Branches
// ---------------------------------------------------------------------------

pub fn list_branches(bank: Option<&str>) -> Result<()> {
    let ctx = Context::open()?;
    ctx.authorize(Permission::BankRead)?;
    let bank_id = bank.map(|b| registry::find_bank(&ctx.conn, b)).transpose()?.map(|b| b.id);
    let branches = registry::list_branches(&ctx.conn, bank_id, true)?;

    let mut table = Table::new();
    table.set_header(vec!["ID", "Bank", "Branch", "Address", "Phone"]);
    for branch in branches {
        table.add_row(vec![
            Cell::new(branch.id),
            Cell::new(branch.bank_name),
            Cell::new(branch.name),
            Cell::new(branch.address.unwrap_or_default()),
            Cell::new(branch.phone.unwrap_or_default()),
        ]);
    }
    println!("Branches\n{table}");
    Ok(())
}

pub fn add_branch(
    name: &str,
    bank: &str,
    address: Option<String>,
    postal_code: Option<String>,
    phone: Option<String>,
    email: Option<String>,
) -> Result<()> {
    let ctx = Context::open()?;
    let actor = ctx.authorize(Permission::BankCreate)?;
    let bank = registry::find_bank(&ctx.conn, bank)?;
    let id = registry::add_branch(
        &ctx.conn,
        &NewBranch {
            bank_id: bank.id,
            name: name.to_string(),
            address,
            postal_code,
            phone,
            email,
        },
    )?;
    audit::log_event(
        &ctx.conn,
        &AuditEvent::new(&actor, AuditAction::Create)
            .resource("branch", id)
            .details(serde_json::json!({ "name": name, "bank": bank.name })),
    )?;
    println!("Added branch: {name} at {} (ID {id})", bank.name);
    Ok(())
}

pub fn remove_branch(id: i64) -> Result<()> {
    let ctx = Context::open()?;
    let actor = ctx.authorize(Permission::BankDelete)?;
    registry::deactivate_branch(&ctx.conn, id)?;
    audit::log_event(&ctx.conn, &AuditEvent::new(&actor, AuditAction::Delete).resource("branch", id))?;
    println!("Deactivated branch {id}");
    Ok(())
}
