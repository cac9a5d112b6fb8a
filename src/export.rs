//! Report exports to CSV, JSON and PDF, recorded in the export history.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use chrono::NaiveDateTime;
use rusqlite::Connection;
use serde::Serialize;

use crate::analytics;
use crate::audit::{self, AuditEvent};
use crate::cheques::{self, ChequeFilter};
use crate::duplicates;
use crate::error::{ChequeError, Result};
use crate::fmt::{money, percent};
use crate::models::{Actor, AuditAction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    Register,
    StatusSummary,
    BankAnalysis,
    ClientAnalysis,
    RiskProfiles,
    Duplicates,
}

impl ReportKind {
    pub const ALL: [ReportKind; 6] = [
        Self::Register,
        Self::StatusSummary,
        Self::BankAnalysis,
        Self::ClientAnalysis,
        Self::RiskProfiles,
        Self::Duplicates,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::StatusSummary => "status",
            Self::BankAnalysis => "banks",
            Self::ClientAnalysis => "clients",
            Self::RiskProfiles => "risk",
            Self::Duplicates => "duplicates",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::Register => "Registre des chèques",
            Self::StatusSummary => "Synthèse par statut",
            Self::BankAnalysis => "Analyse par banque",
            Self::ClientAnalysis => "Analyse par client",
            Self::RiskProfiles => "Profils de risque clients",
            Self::Duplicates => "Doublons potentiels",
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for ReportKind {
    type Err = ChequeError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .iter()
            .find(|k| k.key() == wanted)
            .copied()
            .ok_or_else(|| {
                let keys: Vec<&str> = Self::ALL.iter().map(|k| k.key()).collect();
                ChequeError::Validation(format!("Unknown report '{s}' (expected one of: {})", keys.join(", ")))
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
    Pdf,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Pdf => "pdf",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = ChequeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            "pdf" => Ok(Self::Pdf),
            other => Err(ChequeError::Validation(format!("Unknown export format: {other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Report tables
// ---------------------------------------------------------------------------

/// A report flattened to rows of display strings, plus its structured form.
#[derive(Debug, Clone)]
pub struct ReportTable {
    pub title: String,
    pub headers: Vec<&'static str>,
    /// Right-align the column (amounts, counts).
    pub numeric: Vec<bool>,
    pub rows: Vec<Vec<String>>,
    pub footer: Option<Vec<String>>,
    pub data: serde_json::Value,
}

impl ReportTable {
    fn new(kind: ReportKind, columns: &[(&'static str, bool)], data: serde_json::Value) -> Self {
        Self {
            title: kind.title().to_string(),
            headers: columns.iter().map(|(h, _)| *h).collect(),
            numeric: columns.iter().map(|(_, n)| *n).collect(),
            rows: Vec::new(),
            footer: None,
            data,
        }
    }

    pub fn record_count(&self) -> usize {
        self.rows.len()
    }
}

pub fn build_report(
    conn: &Connection,
    kind: ReportKind,
    filter: &ChequeFilter,
    now: NaiveDateTime,
) -> Result<ReportTable> {
    let table = match kind {
        ReportKind::Register => {
            let list = cheques::list_cheques(conn, filter)?;
            let mut t = ReportTable::new(
                kind,
                &[
                    ("Numéro", false),
                    ("Client", false),
                    ("Banque", false),
                    ("Agence", false),
                    ("Montant", true),
                    ("Échéance", false),
                    ("Statut", false),
                ],
                serde_json::to_value(&list)?,
            );
            let total: f64 = list.iter().map(|c| c.amount).sum();
            t.rows = list
                .iter()
                .map(|c| {
                    vec![
                        c.cheque_number.clone(),
                        c.client_name.clone().unwrap_or_default(),
                        c.bank_name.clone().unwrap_or_default(),
                        c.branch_name.clone().unwrap_or_default(),
                        money(c.amount, &c.currency),
                        c.due_date.clone(),
                        c.status.to_string(),
                    ]
                })
                .collect();
            t.footer = Some(vec![
                "Total".to_string(),
                format!("{} chèques", list.len()),
                String::new(),
                String::new(),
                money(total, "MAD"),
                String::new(),
                String::new(),
            ]);
            t
        }
        ReportKind::StatusSummary => {
            let stats = analytics::dashboard_stats(conn, now.date())?;
            let mut t = ReportTable::new(
                kind,
                &[("Statut", false), ("Nombre", true), ("Montant", true), ("Part", true)],
                serde_json::to_value(&stats)?,
            );
            t.rows = stats
                .by_status
                .iter()
                .map(|s| {
                    let share = if stats.total_amount > 0.0 { s.amount / stats.total_amount * 100.0 } else { 0.0 };
                    vec![s.status.clone(), s.count.to_string(), money(s.amount, "MAD"), percent(share)]
                })
                .collect();
            t.footer = Some(vec![
                "Total".to_string(),
                stats.total_cheques.to_string(),
                money(stats.total_amount, "MAD"),
                String::new(),
            ]);
            t
        }
        ReportKind::BankAnalysis => {
            let banks = analytics::status_by_bank(conn)?;
            let mut t = ReportTable::new(
                kind,
                &[
                    ("Banque", false),
                    ("Nombre", true),
                    ("Montant", true),
                    ("Encaissés", true),
                    ("Rejetés", true),
                    ("En cours", true),
                ],
                serde_json::to_value(&banks)?,
            );
            t.rows = banks
                .iter()
                .map(|b| {
                    vec![
                        b.bank.clone(),
                        b.count.to_string(),
                        money(b.total, "MAD"),
                        b.cleared.to_string(),
                        b.bounced.to_string(),
                        b.open.to_string(),
                    ]
                })
                .collect();
            t
        }
        ReportKind::ClientAnalysis => {
            let clients = analytics::top_clients(conn, 100)?;
            let mut t = ReportTable::new(
                kind,
                &[("Client", false), ("Nombre", true), ("Montant", true), ("Rejetés", true)],
                serde_json::to_value(&clients)?,
            );
            t.rows = clients
                .iter()
                .map(|c| vec![c.name.clone(), c.count.to_string(), money(c.total, "MAD"), c.bounced.to_string()])
                .collect();
            t
        }
        ReportKind::RiskProfiles => {
            let profiles = analytics::client_risk_profiles(conn, now)?;
            let mut t = ReportTable::new(
                kind,
                &[
                    ("Client", false),
                    ("Niveau", false),
                    ("Score", true),
                    ("Taux de rejet", true),
                    ("Chèques", true),
                    ("Montant", true),
                ],
                serde_json::to_value(&profiles)?,
            );
            t.rows = profiles
                .iter()
                .map(|p| {
                    vec![
                        p.client_name.clone(),
                        p.risk_level.as_str().to_string(),
                        format!("{:.1}", p.risk_score),
                        percent(p.bounce_rate),
                        p.total_cheques.to_string(),
                        money(p.total_amount, "MAD"),
                    ]
                })
                .collect();
            t
        }
        ReportKind::Duplicates => {
            let pairs = duplicates::scan_ledger(conn)?;
            let mut t = ReportTable::new(
                kind,
                &[
                    ("Chèque 1", false),
                    ("Chèque 2", false),
                    ("Client", false),
                    ("Montant", true),
                    ("Score", true),
                    ("Raisons", false),
                ],
                serde_json::to_value(&pairs)?,
            );
            t.rows = pairs
                .iter()
                .map(|p| {
                    vec![
                        format!("{} (#{})", p.first.cheque_number, p.first.id),
                        format!("{} (#{})", p.second.cheque_number, p.second.id),
                        p.first.client_name.clone().unwrap_or_default(),
                        money(p.first.amount, "MAD"),
                        percent(p.score_pct),
                        p.reasons.join(", "),
                    ]
                })
                .collect();
            t
        }
    };
    Ok(table)
}

// ---------------------------------------------------------------------------
// Writers
// ---------------------------------------------------------------------------

pub fn to_csv(table: &ReportTable) -> Result<Vec<u8>> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record(&table.headers)?;
    for row in &table.rows {
        wtr.write_record(row)?;
    }
    wtr.flush()?;
    wtr.into_inner()
        .map_err(|e| ChequeError::Io(std::io::Error::other(e.to_string())))
}

pub fn to_json(table: &ReportTable, generated_at: NaiveDateTime) -> Result<Vec<u8>> {
    let doc = serde_json::json!({
        "report": table.title,
        "generated_at": generated_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        "record_count": table.record_count(),
        "data": table.data,
    });
    Ok(serde_json::to_vec_pretty(&doc)?)
}

#[cfg(feature = "pdf")]
fn to_pdf(table: &ReportTable, company: &str, generated_at: NaiveDateTime) -> Result<Vec<u8>> {
    crate::pdf::render_table(table, company, generated_at)
}

#[cfg(not(feature = "pdf"))]
fn to_pdf(_table: &ReportTable, _company: &str, _generated_at: NaiveDateTime) -> Result<Vec<u8>> {
    Err(ChequeError::Validation("PDF export requires the 'pdf' feature".to_string()))
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportRecord {
    pub id: i64,
    pub filename: String,
    pub export_type: String,
    pub record_count: i64,
    pub file_size: i64,
    pub created_at: String,
}

/// Build the report, write it to `path` and record the export.
#[allow(clippy::too_many_arguments)]
pub fn export_report(
    conn: &Connection,
    kind: ReportKind,
    format: ExportFormat,
    filter: &ChequeFilter,
    path: &Path,
    company: &str,
    actor: &Actor,
    now: NaiveDateTime,
) -> Result<ExportRecord> {
    let table = build_report(conn, kind, filter, now)?;
    let bytes = match format {
        ExportFormat::Csv => to_csv(&table)?,
        ExportFormat::Json => to_json(&table, now)?,
        ExportFormat::Pdf => to_pdf(&table, company, now)?,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, &bytes)?;

    let filename = path.display().to_string();
    let export_type = format!("{}.{}", kind.key(), format.extension());
    let filters = serde_json::json!({
        "status": filter.status.map(|s| s.as_str()),
        "bank_id": filter.bank_id,
        "client_id": filter.client_id,
        "due_from": filter.due_from,
        "due_to": filter.due_to,
        "search": filter.search,
    });
    let created_at = now.format("%Y-%m-%d %H:%M:%S").to_string();

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO export_history (filename, export_type, filters, record_count, file_size, created_by, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            filename,
            export_type,
            filters.to_string(),
            table.record_count() as i64,
            bytes.len() as i64,
            actor.user_id,
            created_at,
        ],
    )?;
    let id = tx.last_insert_rowid();
    audit::log_event(
        &tx,
        &AuditEvent::new(actor, AuditAction::Export)
            .resource("export", id)
            .details(serde_json::json!({ "type": export_type, "records": table.record_count() })),
    )?;
    tx.commit()?;
    log::info!("exported {export_type} ({} records) to {filename}", table.record_count());

    Ok(ExportRecord {
        id,
        filename,
        export_type,
        record_count: table.record_count() as i64,
        file_size: bytes.len() as i64,
        created_at,
    })
}

pub fn export_history(conn: &Connection, limit: usize) -> Result<Vec<ExportRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id, filename, export_type, COALESCE(record_count, 0), COALESCE(file_size, 0), created_at \
         FROM export_history ORDER BY created_at DESC, id DESC LIMIT {limit}"
    ))?;
    let rows = stmt.query_map([], |row| {
        Ok(ExportRecord {
            id: row.get(0)?,
            filename: row.get(1)?,
            export_type: row.get(2)?,
            record_count: row.get(3)?,
            file_size: row.get(4)?,
            created_at: row.get(5)?,
        })
    })?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::{add_branch, add_client, insert_cheque, test_db};

    fn now() -> NaiveDateTime {
        NaiveDateTime::parse_from_str("2025-03-10 12:00:00", "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn seeded() -> (tempfile::TempDir, Connection) {
        let (dir, conn) = test_db();
        let awb = add_branch(&conn, "AWB", "Casa");
        let bp = add_branch(&conn, "BP", "Rabat");
        let atlas = add_client(&conn, "Atlas");
        let ts = "2025-03-01 09:00:00";
        insert_cheque(&conn, "E1", 1200.0, Some(atlas), awb, "pending", "2025-04-01", ts, ts);
        insert_cheque(&conn, "E2", 800.0, Some(atlas), bp, "bounced", "2025-02-01", ts, ts);
        insert_cheque(&conn, "E1", 1200.0, Some(atlas), bp, "cleared", "2025-01-15", ts, ts);
        (dir, conn)
    }

    #[test]
    fn test_report_kind_keys() {
        for kind in ReportKind::ALL {
            assert_eq!(kind.key().parse::<ReportKind>().unwrap(), kind);
        }
        assert!("pnl".parse::<ReportKind>().is_err());
        assert_eq!("PDF".parse::<ExportFormat>().unwrap(), ExportFormat::Pdf);
    }

    #[test]
    fn test_register_respects_filter() {
        let (_dir, conn) = seeded();
        let filter = ChequeFilter { status: Some(crate::models::ChequeStatus::Bounced), ..Default::default() };
        let table = build_report(&conn, ReportKind::Register, &filter, now()).unwrap();
        assert_eq!(table.record_count(), 1);
        assert_eq!(table.rows[0][0], "E2");
        assert_eq!(table.rows[0][4], "800.00 MAD");
        assert_eq!(table.headers.len(), table.numeric.len());
    }

    #[test]
    fn test_duplicates_report_lists_pair() {
        let (_dir, conn) = seeded();
        let table = build_report(&conn, ReportKind::Duplicates, &ChequeFilter::default(), now()).unwrap();
        assert_eq!(table.record_count(), 1);
        assert!(table.rows[0][0].starts_with("E1"));
    }

    #[test]
    fn test_csv_export_records_history() {
        let (dir, conn) = seeded();
        let path = dir.path().join("exports").join("banks.csv");
        let record = export_report(
            &conn,
            ReportKind::BankAnalysis,
            ExportFormat::Csv,
            &ChequeFilter::default(),
            &path,
            "",
            &Actor::system(),
            now(),
        )
        .unwrap();
        assert_eq!(record.record_count, 2);
        assert_eq!(record.export_type, "banks.csv");

        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(lines.next().unwrap(), "Banque,Nombre,Montant,Encaissés,Rejetés,En cours");
        assert_eq!(content.lines().count(), 3);

        let history = export_history(&conn, 10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].file_size, content.len() as i64);
        let audits: i64 = conn
            .query_row("SELECT count(*) FROM audit_log WHERE action = 'export'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(audits, 1);
    }

    #[test]
    fn test_json_export_carries_structured_data() {
        let (dir, conn) = seeded();
        let path = dir.path().join("risk.json");
        export_report(
            &conn,
            ReportKind::RiskProfiles,
            ExportFormat::Json,
            &ChequeFilter::default(),
            &path,
            "",
            &Actor::system(),
            now(),
        )
        .unwrap();
        let doc: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(doc["record_count"], 1);
        assert_eq!(doc["data"][0]["client_name"], "Atlas");
        assert_eq!(doc["generated_at"], "2025-03-10 12:00:00");
    }

    #[cfg(feature = "pdf")]
    #[test]
    fn test_pdf_export_writes_pdf() {
        let (dir, conn) = seeded();
        let path = dir.path().join("register.pdf");
        export_report(
            &conn,
            ReportKind::Register,
            ExportFormat::Pdf,
            &ChequeFilter::default(),
            &path,
            "Atlas Distribution",
            &Actor::system(),
            now(),
        )
        .unwrap();
        assert!(std::fs::read(&path).unwrap().starts_with(b"%PDF"));
    }
}
