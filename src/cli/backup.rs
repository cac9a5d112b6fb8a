use std::path::PathBuf;

use crate::audit::{self, AuditEvent};
use crate::db::backup_to;
use crate::error::Result;
use crate::fmt::format_bytes;
use crate::models::AuditAction;
use crate::security::Permission;

use super::Context;

pub fn run(output: Option<String>) -> Result<()> {
    let ctx = Context::open()?;
    let actor = ctx.authorize(Permission::SystemBackup)?;

    let dest_path = match output {
        Some(p) => PathBuf::from(p),
        None => {
            let backups_dir = ctx.data_dir().join("backups");
            std::fs::create_dir_all(&backups_dir)?;
            let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
            backups_dir.join(format!("cheques-{stamp}.db"))
        }
    };

    backup_to(&ctx.conn, &dest_path)?;

    let size = std::fs::metadata(&dest_path)?.len();
    audit::log_event(
        &ctx.conn,
        &AuditEvent::new(&actor, AuditAction::Backup)
            .resource("database", dest_path.display())
            .details(serde_json::json!({ "size": size })),
    )?;
    println!("Backup saved to {}", dest_path.display());
    println!("Size: {}", format_bytes(size));
    Ok(())
}
