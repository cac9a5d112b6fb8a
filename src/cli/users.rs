use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::audit::{self, AuditEvent};
use crate::error::{ChequeError, Result};
use crate::models::{AuditAction, Role};
use crate::registry;
use crate::security::{self, PasswordPolicy, Permission};

use super::Context;

pub fn list() -> Result<()> {
    let ctx = Context::open()?;
    ctx.authorize(Permission::UserRead)?;
    let users = registry::list_users(&ctx.conn)?;

    let mut table = Table::new();
    table.set_header(vec!["ID", "Username", "Role", "Name", "Email", "Active", "Last login"]);
    for user in users {
        let active = if user.active { "yes".green() } else { "no".red() };
        table.add_row(vec![
            Cell::new(user.id),
            Cell::new(user.username),
            Cell::new(user.role),
            Cell::new(user.full_name.unwrap_or_default()),
            Cell::new(user.email.unwrap_or_default()),
            Cell::new(active),
            Cell::new(user.last_login.unwrap_or_default()),
        ]);
    }
    println!("Users\n{table}");
    Ok(())
}

pub fn add(username: &str, role: &str, full_name: Option<&str>, email: Option<&str>) -> Result<()> {
    let ctx = Context::open()?;
    let actor = ctx.authorize(Permission::UserCreate)?;
    let role: Role = role.parse()?;

    let password = super::read_password(&format!("Password for {username}: "))?;
    let problems = security::validate_password(&password, &PasswordPolicy::default());
    if !problems.is_empty() {
        return Err(ChequeError::Validation(problems.join("; ")));
    }
    let id = registry::add_user(&ctx.conn, username, &security::hash_password(&password), role, full_name, email)?;
    audit::log_event(
        &ctx.conn,
        &AuditEvent::new(&actor, AuditAction::Create)
            .resource("user", id)
            .details(serde_json::json!({ "username": username, "role": role })),
    )?;
    println!("Added user {username} ({role})");
    Ok(())
}

pub fn remove(username: &str) -> Result<()> {
    let ctx = Context::open()?;
    let actor = ctx.authorize(Permission::UserDelete)?;
    if actor.username == username {
        return Err(ChequeError::Validation("You cannot deactivate your own account".to_string()));
    }
    registry::deactivate_user(&ctx.conn, username)?;
    audit::log_event(
        &ctx.conn,
        &AuditEvent::new(&actor, AuditAction::Delete).resource("user", username),
    )?;
    println!("Deactivated user {username}");
    Ok(())
}
