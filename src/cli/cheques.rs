use colored::{ColoredString, Colorize};
use comfy_table::{Cell, CellAlignment, Table};

use crate::audit::{self, AuditEvent};
use crate::cheques::{self, ChequeEdit, ChequeFilter};
use crate::duplicates::{self, Candidate};
use crate::error::{ChequeError, Result};
use crate::fmt::money;
use crate::models::{AuditAction, Cheque, ChequeStatus, NewCheque};
use crate::registry;
use crate::security::{sanitize_input, Permission};

use super::Context;

pub(crate) fn status_label(status: ChequeStatus) -> ColoredString {
    match status {
        ChequeStatus::Pending => status.as_str().yellow(),
        ChequeStatus::Deposited => status.as_str().cyan(),
        ChequeStatus::Cleared => status.as_str().green(),
        ChequeStatus::Cancelled => status.as_str().dimmed(),
        s if s.is_bounce() => s.as_str().red().bold(),
        s => s.as_str().normal(),
    }
}

pub(crate) fn print_cheques(title: &str, rows: &[Cheque]) {
    let mut table = Table::new();
    table.set_header(vec!["ID", "Number", "Due", "Amount", "Status", "Client", "Bank", "Branch"]);
    for c in rows {
        table.add_row(vec![
            Cell::new(c.id),
            Cell::new(&c.cheque_number),
            Cell::new(&c.due_date),
            Cell::new(money(c.amount, &c.currency)).set_alignment(CellAlignment::Right),
            Cell::new(status_label(c.status)),
            Cell::new(c.client_name.as_deref().unwrap_or("-")),
            Cell::new(c.bank_name.as_deref().unwrap_or("-")),
            Cell::new(c.branch_name.as_deref().unwrap_or("-")),
        ]);
    }
    let total: f64 = rows.iter().map(|c| c.amount).sum();
    println!("{title}\n{table}");
    println!("{} cheque(s), {}", rows.len(), money(total, "").bold());
}

#[allow(clippy::too_many_arguments)]
pub fn list(
    status: Option<&str>,
    bank: Option<&str>,
    client: Option<i64>,
    from_date: Option<String>,
    to_date: Option<String>,
    search: Option<String>,
    limit: usize,
) -> Result<()> {
    let ctx = Context::open()?;
    ctx.authorize(Permission::ChequeRead)?;
    let filter = ChequeFilter {
        status: status.map(str::parse).transpose()?,
        bank_id: bank.map(|b| registry::find_bank(&ctx.conn, b)).transpose()?.map(|b| b.id),
        client_id: client,
        due_from: from_date,
        due_to: to_date,
        search,
        limit: Some(limit),
        ..Default::default()
    };
    print_cheques("Cheques", &cheques::list_cheques(&ctx.conn, &filter)?);
    Ok(())
}

pub struct AddArgs {
    pub number: String,
    pub amount: f64,
    pub due: String,
    pub branch: i64,
    pub issue: Option<String>,
    pub client: Option<i64>,
    pub currency: Option<String>,
    pub depositor: Option<String>,
    pub invoice: Option<String>,
    pub invoice_date: Option<String>,
    pub scan: Option<String>,
    pub notes: Option<String>,
    pub force: bool,
}

pub fn add(args: AddArgs) -> Result<()> {
    let ctx = Context::open()?;
    let actor = ctx.authorize(Permission::ChequeCreate)?;
    let branch = registry::get_branch(&ctx.conn, args.branch)?;
    if let Some(client_id) = args.client {
        registry::get_client(&ctx.conn, client_id)?;
    }
    if cheques::is_duplicate_number(&ctx.conn, &args.number, branch.id)? {
        return Err(ChequeError::DuplicateCheque {
            number: args.number.trim().to_string(),
            branch_id: branch.id,
        });
    }

    let candidate = Candidate {
        cheque_number: args.number.trim().to_string(),
        amount: args.amount,
        client_id: args.client,
        branch_id: Some(branch.id),
    };
    let matches = duplicates::find_candidates(&ctx.conn, &candidate, super::now())?;
    if !matches.is_empty() {
        println!("{}", "Possible duplicates:".yellow().bold());
        for m in &matches {
            println!(
                "  #{} {} {} ({:.0}%: {})",
                m.cheque_id,
                m.cheque_number,
                money(m.amount, ""),
                m.score_pct,
                m.reasons.join(", ")
            );
        }
        if !args.force {
            return Err(ChequeError::Validation(
                "cheque looks like a duplicate; pass --force to record it anyway".to_string(),
            ));
        }
    }

    let issue = args
        .issue
        .unwrap_or_else(|| super::today().format("%Y-%m-%d").to_string());
    let cheque = NewCheque {
        client_id: args.client,
        currency: args.currency.unwrap_or_else(|| ctx.settings.default_currency.clone()),
        depositor_name: args.depositor.map(|s| sanitize_input(&s)),
        invoice_number: args.invoice.map(|s| sanitize_input(&s)),
        invoice_date: args.invoice_date,
        scan_path: args.scan,
        notes: args.notes.map(|s| sanitize_input(&s)),
        created_by: actor.user_id,
        ..NewCheque::new(args.number.trim(), args.amount, &issue, &args.due, branch.id)
    };

    let tx = ctx.conn.unchecked_transaction()?;
    let id = cheques::add_cheque(&tx, &cheque)?;
    audit::log_event(
        &tx,
        &AuditEvent::new(&actor, AuditAction::Create)
            .resource("cheque", id)
            .details(serde_json::json!({
                "cheque_number": cheque.cheque_number,
                "amount": cheque.amount,
                "branch_id": branch.id,
            })),
    )?;
    tx.commit()?;
    println!(
        "Recorded cheque {} for {} due {} (ID {id})",
        cheque.cheque_number,
        money(cheque.amount, &cheque.currency),
        cheque.due_date
    );
    Ok(())
}

pub fn show(id: i64) -> Result<()> {
    let ctx = Context::open()?;
    ctx.authorize(Permission::ChequeRead)?;
    let c = cheques::get_cheque(&ctx.conn, id)?;
    let dash = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".to_string());

    println!("Cheque {}", c.cheque_number.bold());
    println!("  Amount:     {}", money(c.amount, &c.currency));
    println!("  Status:     {}", status_label(c.status));
    println!("  Issued:     {}", c.issue_date);
    let overdue = c.status.is_open() && c.due_date < super::today().format("%Y-%m-%d").to_string();
    if overdue {
        println!("  Due:        {} {}", c.due_date, "(overdue)".red());
    } else {
        println!("  Due:        {}", c.due_date);
    }
    println!("  Client:     {}", dash(&c.client_name));
    println!("  Bank:       {}", dash(&c.bank_name));
    println!("  Branch:     {}", dash(&c.branch_name));
    println!("  Depositor:  {}", dash(&c.depositor_name));
    println!("  Invoice:    {}", dash(&c.invoice_number));
    println!("  Scan:       {}", dash(&c.scan_path));
    println!("  Notes:      {}", dash(&c.notes));
    println!("  Created:    {}", c.created_at);
    println!("  Updated:    {}", c.updated_at);
    Ok(())
}

pub fn set_status(id: i64, status: &str) -> Result<()> {
    let ctx = Context::open()?;
    let actor = ctx.authorize(Permission::ChequeUpdate)?;
    let status: ChequeStatus = status.parse()?;
    if cheques::update_cheque_status(&ctx.conn, id, status, &actor)? {
        println!("Cheque {id} is now {}", status_label(status));
    } else {
        println!("Cheque {id} is already {status}");
    }
    Ok(())
}

pub fn edit(id: i64, edit: ChequeEdit) -> Result<()> {
    let ctx = Context::open()?;
    let actor = ctx.authorize(Permission::ChequeUpdate)?;
    if let Some(client_id) = edit.client_id {
        registry::get_client(&ctx.conn, client_id)?;
    }
    let edit = ChequeEdit {
        notes: edit.notes.map(|s| sanitize_input(&s)),
        depositor_name: edit.depositor_name.map(|s| sanitize_input(&s)),
        invoice_number: edit.invoice_number.map(|s| sanitize_input(&s)),
        ..edit
    };
    cheques::update_cheque(&ctx.conn, id, &edit, &actor)?;
    println!("Updated cheque {id}");
    Ok(())
}

pub fn delete(id: i64) -> Result<()> {
    let ctx = Context::open()?;
    let actor = ctx.authorize(Permission::ChequeDelete)?;
    cheques::delete_cheque(&ctx.conn, id, &actor)?;
    println!("Deleted cheque {id}");
    Ok(())
}

pub fn due(days: Option<i64>) -> Result<()> {
    let ctx = Context::open()?;
    ctx.authorize(Permission::ChequeRead)?;
    let days = days.unwrap_or(ctx.settings.notification_days);
    let rows = cheques::due_soon(&ctx.conn, super::today(), days)?;
    print_cheques(&format!("Due within {days} day(s)"), &rows);
    Ok(())
}

pub fn overdue() -> Result<()> {
    let ctx = Context::open()?;
    ctx.authorize(Permission::ChequeRead)?;
    let rows = cheques::overdue(&ctx.conn, super::today())?;
    print_cheques(&"Overdue".red().bold().to_string(), &rows);
    Ok(())
}
