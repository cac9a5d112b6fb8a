use std::path::Path;

use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::audit::{self, AuditEvent, AuditFilter};
use crate::error::Result;
use crate::models::AuditAction;
use crate::security::{self, Permission};

use super::Context;

pub fn list(
    user: Option<String>,
    action: Option<&str>,
    from_date: Option<String>,
    to_date: Option<String>,
    limit: usize,
) -> Result<()> {
    let ctx = Context::open()?;
    ctx.authorize(Permission::AuditRead)?;
    let filter = AuditFilter {
        username: user,
        action: action.map(str::parse).transpose()?,
        from: from_date,
        to: to_date,
        limit: Some(limit),
        ..Default::default()
    };
    let entries = audit::query(&ctx.conn, &filter)?;

    let mut table = Table::new();
    table.set_header(vec!["Time", "User", "Action", "Resource", "Result", "Details"]);
    for e in &entries {
        let resource = match (&e.resource_type, &e.resource_id) {
            (Some(kind), Some(id)) => format!("{kind} {id}"),
            (Some(kind), None) => kind.clone(),
            _ => String::new(),
        };
        let result = if e.success {
            "ok".green()
        } else {
            e.error_message.as_deref().unwrap_or("failed").red()
        };
        table.add_row(vec![
            Cell::new(&e.timestamp),
            Cell::new(&e.username),
            Cell::new(e.action.as_str()),
            Cell::new(resource),
            Cell::new(result),
            Cell::new(e.details.as_ref().map(|d| d.to_string()).unwrap_or_default()),
        ]);
    }
    println!("Audit log\n{table}");
    Ok(())
}

pub fn report() -> Result<()> {
    let ctx = Context::open()?;
    ctx.authorize(Permission::AuditRead)?;
    let report = audit::security_report(&ctx.conn, super::now())?;

    let failed = report.failed_logins_24h.to_string();
    println!(
        "Failed logins (24h):  {}",
        if report.failed_logins_24h > 0 { failed.red().bold() } else { failed.normal() }
    );
    println!("Active sessions:      {}", report.active_sessions);

    let mut table = Table::new();
    table.set_header(vec!["User", "Events (7 days)"]);
    for item in &report.top_users_7d {
        table.add_row(vec![Cell::new(&item.name), Cell::new(item.count)]);
    }
    println!("\nMost active users\n{table}");

    let mut table = Table::new();
    table.set_header(vec!["Action", "Events (7 days)"]);
    for item in &report.events_by_action_7d {
        table.add_row(vec![Cell::new(&item.name), Cell::new(item.count)]);
    }
    println!("\nEvents by action\n{table}");
    Ok(())
}

pub fn export(output: &str, from_date: Option<String>, to_date: Option<String>) -> Result<()> {
    let ctx = Context::open()?;
    let actor = ctx.authorize(Permission::AuditRead)?;
    let key = security::load_or_create_key(&ctx.settings.key_path())?;
    let filter = AuditFilter {
        from: from_date,
        to: to_date,
        ..Default::default()
    };
    let count = audit::export_encrypted(&ctx.conn, &key, &filter, Path::new(output))?;
    audit::log_event(
        &ctx.conn,
        &AuditEvent::new(&actor, AuditAction::Export)
            .resource("audit_log", output)
            .details(serde_json::json!({ "entries": count })),
    )?;
    println!("Wrote {count} encrypted audit entries to {output}");
    Ok(())
}
