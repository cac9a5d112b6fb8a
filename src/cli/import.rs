use std::path::Path;

use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::error::{ChequeError, Result};
use crate::importer::{self, ImportFormat};
use crate::security::Permission;

use super::Context;

pub fn run(file: &str, format: Option<&str>) -> Result<()> {
    let ctx = Context::open()?;
    let actor = ctx.authorize(Permission::ChequeCreate)?;
    let path = Path::new(file);
    if !path.exists() {
        return Err(ChequeError::Validation(format!("File not found: {file}")));
    }
    let format = format
        .map(|key| {
            ImportFormat::from_key(key)
                .ok_or_else(|| ChequeError::Validation(format!("Unknown import format: {key}")))
        })
        .transpose()?;

    let report = importer::import_file(&ctx.conn, path, format, &actor)?;

    println!(
        "{} {} of {} row(s)",
        "Imported".green(),
        report.imported,
        report.total_rows
    );
    if !report.errors.is_empty() {
        let mut table = Table::new();
        table.set_header(vec!["Line", "Problem"]);
        for e in &report.errors {
            table.add_row(vec![Cell::new(e.line), Cell::new(&e.message)]);
        }
        println!("{}\n{table}", format!("{} row(s) skipped", report.errors.len()).yellow());
    }
    Ok(())
}
