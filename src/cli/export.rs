use std::path::PathBuf;

use comfy_table::{Cell, Table};

use crate::cheques::ChequeFilter;
use crate::error::Result;
use crate::export::{self, ExportFormat, ReportKind};
use crate::fmt::format_bytes;
use crate::security::Permission;

use super::Context;

/// Shown instead of exporting when the kind is `history`.
const HISTORY: &str = "history";

pub struct ExportArgs {
    pub kind: String,
    pub format: String,
    pub output: Option<String>,
    pub status: Option<String>,
    pub from_date: Option<String>,
    pub to_date: Option<String>,
}

pub fn run(args: ExportArgs) -> Result<()> {
    if args.kind.eq_ignore_ascii_case(HISTORY) {
        return history();
    }
    let ctx = Context::open()?;
    let actor = ctx.authorize(Permission::ReportExport)?;
    let kind: ReportKind = args.kind.parse()?;
    let format: ExportFormat = args.format.parse()?;
    let filter = ChequeFilter {
        status: args.status.as_deref().map(str::parse).transpose()?,
        due_from: args.from_date,
        due_to: args.to_date,
        ..Default::default()
    };

    let now = super::now();
    let path = match args.output {
        Some(p) => PathBuf::from(p),
        None => {
            let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
            ctx.data_dir()
                .join("exports")
                .join(format!("{}-{stamp}.{}", kind.key(), format.extension()))
        }
    };

    let record = export::export_report(&ctx.conn, kind, format, &filter, &path, &ctx.company_name()?, &actor, now)?;
    println!("{kind} saved to {}", record.filename);
    println!("{} record(s), {}", record.record_count, format_bytes(record.file_size.max(0) as u64));
    Ok(())
}

fn history() -> Result<()> {
    let ctx = Context::open()?;
    ctx.authorize(Permission::ReportExport)?;
    let mut table = Table::new();
    table.set_header(vec!["ID", "Date", "Type", "Records", "Size", "File"]);
    for r in export::export_history(&ctx.conn, 20)? {
        table.add_row(vec![
            Cell::new(r.id),
            Cell::new(r.created_at),
            Cell::new(r.export_type),
            Cell::new(r.record_count),
            Cell::new(format_bytes(r.file_size.max(0) as u64)),
            Cell::new(r.filename),
        ]);
    }
    println!("Recent exports\n{table}");
    Ok(())
}
