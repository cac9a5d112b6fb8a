use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::error::{ChequeError, Result};
use crate::notifications;
use crate::security::Permission;

use super::Context;

pub fn list(unread_only: bool) -> Result<()> {
    let ctx = Context::open()?;
    let actor = ctx.authorize(Permission::ChequeRead)?;
    let rows = notifications::list_notifications(&ctx.conn, actor.user_id, unread_only)?;

    let mut table = Table::new();
    table.set_header(vec!["ID", "Date", "Title", "Message", "Cheque"]);
    for n in &rows {
        let title = if n.is_read { n.title.normal() } else { n.title.bold() };
        table.add_row(vec![
            Cell::new(n.id),
            Cell::new(&n.created_at),
            Cell::new(title),
            Cell::new(&n.message),
            Cell::new(n.cheque_id.map(|id| id.to_string()).unwrap_or_default()),
        ]);
    }
    println!("Notifications\n{table}");
    println!("{} unread", notifications::unread_count(&ctx.conn, actor.user_id)?);
    Ok(())
}

pub fn read(id: Option<i64>, all: bool) -> Result<()> {
    let ctx = Context::open()?;
    let actor = ctx.authorize(Permission::ChequeRead)?;
    match (id, all) {
        (_, true) => {
            let n = notifications::mark_all_read(&ctx.conn, actor.user_id)?;
            println!("Marked {n} notification(s) as read");
        }
        (Some(id), false) => {
            if !notifications::mark_read(&ctx.conn, id)? {
                return Err(ChequeError::Validation(format!("No notification with ID {id}")));
            }
            println!("Marked notification {id} as read");
        }
        (None, false) => {
            return Err(ChequeError::Validation("Give a notification ID or --all".to_string()));
        }
    }
    Ok(())
}

pub fn refresh() -> Result<()> {
    let ctx = Context::open()?;
    ctx.authorize(Permission::ChequeRead)?;
    let days = ctx.settings.notification_days;
    let created = notifications::create_due_notifications(&ctx.conn, super::today(), days)?;
    println!("Created {created} due-date notification(s) for the next {days} day(s)");
    Ok(())
}
