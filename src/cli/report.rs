use chrono::Datelike;
use colored::Colorize;
use comfy_table::{Cell, CellAlignment, Table};

use crate::analytics;
use crate::duplicates;
use crate::error::Result;
use crate::fmt::{money, percent};
use crate::models::ChequeStatus;
use crate::scoring::RiskLevel;
use crate::security::Permission;

use super::cheques::status_label;
use super::Context;

fn amount_cell(val: f64) -> Cell {
    Cell::new(money(val, "")).set_alignment(CellAlignment::Right)
}

pub fn dashboard() -> Result<()> {
    let ctx = Context::open()?;
    ctx.authorize(Permission::ReportGenerate)?;
    let stats = analytics::dashboard_stats(&ctx.conn, super::today())?;
    let currency = &ctx.settings.default_currency;

    println!("Cheques:  {}", stats.total_cheques);
    println!("Amount:   {}", money(stats.total_amount, currency).bold());
    let overdue = format!(
        "{} ({})",
        stats.overdue_count,
        money(stats.overdue_amount, currency)
    );
    println!(
        "Overdue:  {}",
        if stats.overdue_count > 0 { overdue.red().bold() } else { overdue.normal() }
    );

    let mut table = Table::new();
    table.set_header(vec!["Status", "Count", "Amount"]);
    for s in &stats.by_status {
        let label = match s.status.parse::<ChequeStatus>() {
            Ok(status) => status_label(status).to_string(),
            Err(_) => s.status.clone(),
        };
        table.add_row(vec![Cell::new(label), Cell::new(s.count), amount_cell(s.amount)]);
    }
    println!("\nBy status\n{table}");

    let mut table = Table::new();
    table.set_header(vec!["Bank", "Count", "Amount"]);
    for b in &stats.top_banks {
        table.add_row(vec![Cell::new(&b.bank), Cell::new(b.count), amount_cell(b.amount)]);
    }
    println!("\nTop banks\n{table}");
    Ok(())
}

pub fn aging(from_date: Option<&str>, to_date: Option<&str>) -> Result<()> {
    let ctx = Context::open()?;
    ctx.authorize(Permission::ReportGenerate)?;
    let rows = analytics::aging_analysis(&ctx.conn, from_date, to_date, super::now())?;

    let mut table = Table::new();
    table.set_header(vec!["Status", "Count", "Share", "Avg days", "Min", "Max"]);
    for r in &rows {
        table.add_row(vec![
            Cell::new(&r.status),
            Cell::new(r.count),
            Cell::new(percent(r.percentage)),
            Cell::new(format!("{:.1}", r.avg_days)),
            Cell::new(r.min_days),
            Cell::new(r.max_days),
        ]);
    }
    println!("Aging by status\n{table}");
    Ok(())
}

pub fn trends(years: u32) -> Result<()> {
    let ctx = Context::open()?;
    ctx.authorize(Permission::ReportGenerate)?;
    let trends = analytics::seasonal_trends(&ctx.conn, years, super::now())?;

    for (title, periods) in [("Monthly", &trends.monthly), ("Quarterly", &trends.quarterly)] {
        let mut table = Table::new();
        table.set_header(vec!["Period", "Count", "Total", "Average"]);
        for p in periods {
            table.add_row(vec![
                Cell::new(&p.period),
                Cell::new(p.count),
                amount_cell(p.total),
                amount_cell(p.avg),
            ]);
        }
        println!("{title}\n{table}\n");
    }

    let mut table = Table::new();
    table.set_header(vec!["Day", "Count", "Average"]);
    for d in &trends.weekdays {
        table.add_row(vec![Cell::new(d.day), Cell::new(d.count), amount_cell(d.avg_amount)]);
    }
    println!("By weekday (last year)\n{table}");
    Ok(())
}

pub fn risk() -> Result<()> {
    let ctx = Context::open()?;
    ctx.authorize(Permission::ReportGenerate)?;
    let profiles = analytics::client_risk_profiles(&ctx.conn, super::now())?;

    let mut table = Table::new();
    table.set_header(vec!["Client", "Level", "Score", "Bounce rate", "Cheques", "Amount", "Avg days", "Last bounce"]);
    for p in &profiles {
        let level = match p.risk_level {
            RiskLevel::Low => p.risk_level.as_str().green(),
            RiskLevel::Medium => p.risk_level.as_str().yellow(),
            RiskLevel::High => p.risk_level.as_str().red(),
            RiskLevel::Critical => p.risk_level.as_str().red().bold(),
        };
        table.add_row(vec![
            Cell::new(&p.client_name),
            Cell::new(level),
            Cell::new(format!("{:.1}", p.risk_score)),
            Cell::new(percent(p.bounce_rate)),
            Cell::new(p.total_cheques),
            amount_cell(p.total_amount),
            Cell::new(format!("{:.1}", p.avg_processing_days)),
            Cell::new(p.last_bounce.as_deref().unwrap_or("-")),
        ]);
    }
    println!("Client risk profiles\n{table}");
    Ok(())
}

pub fn risk_score(client_id: i64) -> Result<()> {
    let ctx = Context::open()?;
    ctx.authorize(Permission::ReportGenerate)?;
    let client = crate::registry::get_client(&ctx.conn, client_id)?;
    let features = analytics::heuristic_features(&ctx.conn, client_id, super::now())?;
    let score = crate::scoring::heuristic_risk_score(&features);

    println!("Client:          {}", client.name.bold());
    println!("Cheques:         {}", features.total_cheques);
    println!("Average amount:  {}", money(features.avg_amount, &ctx.settings.default_currency));
    println!("Bounced:         {}", features.bounced);
    println!("Branches used:   {}", features.branches_used);
    if let Some(days) = features.avg_processing_days {
        println!("Avg processing:  {days:.1} days");
    }
    if let Some(days) = features.days_since_last_cheque {
        println!("Last cheque:     {days} days ago");
    }
    let level = RiskLevel::from_score(score);
    let label = format!("{score:.1}/100 ({})", level.as_str());
    let label = match level {
        RiskLevel::Low => label.green(),
        RiskLevel::Medium => label.yellow(),
        RiskLevel::High | RiskLevel::Critical => label.red().bold(),
    };
    println!("Risk score:      {label}");
    Ok(())
}

pub fn performance(from_date: Option<&str>, to_date: Option<&str>) -> Result<()> {
    let ctx = Context::open()?;
    ctx.authorize(Permission::ReportGenerate)?;
    let m = analytics::performance_metrics(&ctx.conn, from_date, to_date)?;
    let o = &m.overall;

    println!("Cheques:          {}", o.total_cheques);
    println!("Total:            {}", money(o.total_amount, &ctx.settings.default_currency));
    println!("Average:          {}", money(o.avg_amount, &ctx.settings.default_currency));
    println!("Success rate:     {}", percent(o.success_rate));
    println!("Avg processing:   {:.1} days", o.avg_processing_days);
    println!("Clients:          {}", o.unique_clients);
    println!("Branches:         {}", o.unique_branches);

    let opt_pct = |v: Option<f64>| v.map(percent).unwrap_or_else(|| "-".to_string());
    let mut table = Table::new();
    table.set_header(vec!["Bank", "Count", "Amount", "Avg days", "Success"]);
    for b in &m.banks {
        table.add_row(vec![
            Cell::new(&b.bank),
            Cell::new(b.count),
            amount_cell(b.total_amount),
            Cell::new(b.avg_processing_days.map(|d| format!("{d:.1}")).unwrap_or_else(|| "-".to_string())),
            Cell::new(opt_pct(b.success_rate)),
        ]);
    }
    println!("\nBy bank\n{table}");

    let mut table = Table::new();
    table.set_header(vec!["Month", "Count", "Amount", "Average", "Success"]);
    for t in &m.monthly {
        table.add_row(vec![
            Cell::new(&t.month),
            Cell::new(t.count),
            amount_cell(t.total_amount),
            amount_cell(t.avg_amount),
            Cell::new(opt_pct(t.success_rate)),
        ]);
    }
    println!("\nBy month\n{table}");
    Ok(())
}

pub fn cashflow(days: i64) -> Result<()> {
    let ctx = Context::open()?;
    ctx.authorize(Permission::ReportGenerate)?;
    let p = analytics::cash_flow_projection(&ctx.conn, super::today(), days)?;

    let mut table = Table::new();
    table.set_header(vec!["Date", "Cheques", "Due", "Expected", "Cumulative"]);
    for d in &p.days {
        table.add_row(vec![
            Cell::new(&d.date),
            Cell::new(d.cheque_count),
            amount_cell(d.pending_amount),
            amount_cell(d.expected_amount),
            amount_cell(d.cumulative_amount),
        ]);
    }
    println!("Cash flow, next {days} day(s)\n{table}");
    let currency = &ctx.settings.default_currency;
    println!("Due:       {}", money(p.total_pending, currency));
    println!("Expected:  {}", money(p.total_expected, currency).green().bold());
    println!("Historical success rate applied: {}", percent(p.success_rate));
    Ok(())
}

pub fn monthly(year: Option<i32>) -> Result<()> {
    let ctx = Context::open()?;
    ctx.authorize(Permission::ReportGenerate)?;
    let year = year.unwrap_or_else(|| super::today().year());
    let months = analytics::monthly_summary(&ctx.conn, year)?;
    if months.is_empty() {
        println!("No cheques due in {year}");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["Month", "Count", "Total", "Cleared", "Bounced", "Open"]);
    let (mut count, mut total) = (0, 0.0);
    for m in &months {
        count += m.count;
        total += m.total;
        table.add_row(vec![
            Cell::new(&m.month),
            Cell::new(m.count),
            amount_cell(m.total),
            amount_cell(m.cleared),
            amount_cell(m.bounced),
            amount_cell(m.open),
        ]);
    }
    println!("Cheques due in {year}\n{table}");
    println!("{count} cheque(s), {}", money(total, ""));
    Ok(())
}

pub fn duplicates() -> Result<()> {
    let ctx = Context::open()?;
    ctx.authorize(Permission::ReportGenerate)?;
    let pairs = duplicates::scan_ledger(&ctx.conn)?;
    if pairs.is_empty() {
        println!("No likely duplicates");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["Score", "Cheque", "Amount", "Client", "Other", "Amount", "Client", "Reasons"]);
    for p in &pairs {
        table.add_row(vec![
            Cell::new(percent(p.score_pct)),
            Cell::new(format!("#{} {}", p.first.id, p.first.cheque_number)),
            amount_cell(p.first.amount),
            Cell::new(p.first.client_name.as_deref().unwrap_or("-")),
            Cell::new(format!("#{} {}", p.second.id, p.second.cheque_number)),
            amount_cell(p.second.amount),
            Cell::new(p.second.client_name.as_deref().unwrap_or("-")),
            Cell::new(p.reasons.join(", ")),
        ]);
    }
    println!("Likely duplicates\n{table}");
    Ok(())
}
