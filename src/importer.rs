use std::collections::HashMap;
use std::path::Path;

use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::audit::{self, AuditEvent};
use crate::cheques;
use crate::db;
use crate::duplicates::{self, Candidate};
use crate::error::{ChequeError, Result};
use crate::models::{Actor, AuditAction, ChequeStatus, ClientType, NewCheque, NewClient};
use crate::registry;
use crate::security;

pub const REQUIRED_COLUMNS: [&str; 4] = ["cheque_number", "amount", "due_date", "client_name"];
pub const ALLOWED_EXTENSIONS: [&str; 3] = ["csv", "xlsx", "xls"];

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Parse an amount cell. Accepts thousands separators and a decimal comma
/// (`1 250,50`); returns `None` for anything non-numeric.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{a0}')
        .collect();
    let cleaned = cleaned.trim_end_matches("MAD");
    if cleaned.is_empty() {
        return None;
    }
    let normalized = match cleaned.split_once(',') {
        Some((_, frac)) if !cleaned.contains('.') && frac.len() <= 2 && !frac.contains(',') => {
            cleaned.replace(',', ".")
        }
        _ => cleaned.replace(',', ""),
    };
    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    // Excel epoch is 1899-12-30 (accounting for the 1900 leap year bug)
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    if !(1.0..=2_958_465.0).contains(&serial) {
        return None;
    }
    base.checked_add_signed(chrono::Duration::days(serial as i64))
}

/// YYYY-MM-DD, DD/MM/YYYY, a timestamp, or an Excel serial number.
pub fn parse_import_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    for fmt in ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(raw, fmt) {
            return Some(d);
        }
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt.date());
        }
    }
    raw.parse::<f64>().ok().and_then(excel_serial_to_date)
}

fn client_type_or_default(raw: Option<&str>) -> ClientType {
    match raw.map(|s| s.trim().to_lowercase()) {
        Some(s) if s == "entreprise" || s == "société" || s == "societe" => ClientType::Company,
        Some(s) => s.parse().unwrap_or(ClientType::Individual),
        None => ClientType::Individual,
    }
}

fn compute_checksum(file_path: &Path) -> Result<String> {
    let data = std::fs::read(file_path)?;
    let mut hasher = Sha256::new();
    hasher.update(&data);
    Ok(hex::encode(hasher.finalize()))
}

// ---------------------------------------------------------------------------
// Formats: enum dispatch over the supported file kinds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportFormat {
    Csv,
    Excel,
}

impl ImportFormat {
    pub fn from_key(key: &str) -> Option<Self> {
        match key.trim().to_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "excel" | "xlsx" | "xls" => Some(Self::Excel),
            _ => None,
        }
    }

    pub fn detect(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        Self::from_key(ext)
    }

    /// Header names (lowercased) and data rows with their spreadsheet line.
    fn read(&self, path: &Path) -> Result<Table> {
        match self {
            Self::Csv => read_csv(path),
            Self::Excel => read_excel(path),
        }
    }
}

struct Table {
    headers: Vec<String>,
    rows: Vec<(usize, Vec<String>)>,
}

fn read_csv(path: &Path) -> Result<Table> {
    let file = std::fs::File::open(path)?;
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(std::io::BufReader::new(file));
    let headers = rdr
        .headers()?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_lowercase())
        .collect();
    let mut rows = Vec::new();
    for (i, record) in rdr.records().enumerate() {
        let record = record?;
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        rows.push((i + 2, record.iter().map(str::to_string).collect()));
    }
    Ok(Table { headers, rows })
}

#[cfg(feature = "xlsx")]
fn read_excel(path: &Path) -> Result<Table> {
    use calamine::{Data, Reader};

    fn cell_text(cell: &Data) -> String {
        match cell {
            Data::String(s) | Data::DateTimeIso(s) => s.trim().to_string(),
            Data::Float(f) if f.fract() == 0.0 => format!("{}", *f as i64),
            Data::Float(f) => f.to_string(),
            Data::Int(i) => i.to_string(),
            Data::DateTime(dt) => dt.as_f64().to_string(),
            Data::Bool(b) => b.to_string(),
            _ => String::new(),
        }
    }

    let mut workbook = calamine::open_workbook_auto(path)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| ChequeError::Validation("Workbook has no sheets".to_string()))??;
    let mut iter = range.rows();
    let headers = iter
        .next()
        .map(|row| row.iter().map(|c| cell_text(c).to_lowercase()).collect())
        .unwrap_or_default();
    let mut rows = Vec::new();
    for (i, row) in iter.enumerate() {
        let cells: Vec<String> = row.iter().map(cell_text).collect();
        if cells.iter().all(|c| c.is_empty()) {
            continue;
        }
        rows.push((i + 2, cells));
    }
    Ok(Table { headers, rows })
}

#[cfg(not(feature = "xlsx"))]
fn read_excel(_path: &Path) -> Result<Table> {
    Err(ChequeError::Validation(
        "Excel import requires the 'xlsx' feature".to_string(),
    ))
}

// ---------------------------------------------------------------------------
// import_file
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    pub total_rows: usize,
    pub imported: usize,
    pub errors: Vec<RowError>,
}

struct ImportRow<'a> {
    columns: &'a HashMap<&'a str, usize>,
    cells: &'a [String],
}

impl ImportRow<'_> {
    fn get(&self, column: &str) -> Option<&str> {
        let idx = *self.columns.get(column)?;
        self.cells
            .get(idx)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }

    fn owned(&self, column: &str) -> Option<String> {
        self.get(column).map(str::to_string)
    }
}

/// A row that passed validation, ready to insert once its client is known.
struct ValidRow {
    cheque_number: String,
    amount: f64,
    due_date: NaiveDate,
    issue_date: NaiveDate,
    client: NewClient,
    branch_id: i64,
    currency: Option<String>,
    depositor_name: Option<String>,
    notes: Option<String>,
}

fn validate_row(conn: &Connection, row: &ImportRow) -> std::result::Result<ValidRow, String> {
    let cheque_number = row.get("cheque_number").ok_or("Numéro de chèque manquant")?;
    if !security::is_clean_input(cheque_number) {
        return Err("Numéro de chèque invalide".to_string());
    }
    let amount = parse_amount(row.get("amount").unwrap_or_default()).ok_or("Montant non numérique")?;
    if amount <= 0.0 {
        return Err("Montant invalide".to_string());
    }
    let due_date = row
        .get("due_date")
        .and_then(parse_import_date)
        .ok_or("Date d'échéance invalide")?;
    let issue_date = match row.get("issue_date") {
        Some(raw) => parse_import_date(raw).ok_or("Date d'émission invalide")?,
        None => due_date,
    };
    let client_name = row.get("client_name").ok_or("Nom du client manquant")?;
    let branch = match row.get("branch_name") {
        Some(name) => registry::find_branch_by_name(conn, name).map_err(|e| e.to_string())?,
        None => None,
    };
    let branch_id = branch.ok_or("Agence non trouvée")?.id;

    let client = NewClient {
        phone: row.owned("client_phone"),
        email: row.owned("client_email"),
        address: row.owned("client_address"),
        ..NewClient::named(client_type_or_default(row.get("client_type")), client_name)
    };
    Ok(ValidRow {
        cheque_number: cheque_number.to_string(),
        amount,
        due_date,
        issue_date,
        client,
        branch_id,
        currency: row.owned("currency"),
        depositor_name: row.owned("depositor_name").map(|s| security::sanitize_input(&s)),
        notes: row.owned("notes").map(|s| security::sanitize_input(&s)),
    })
}

/// Bulk-load cheques from a CSV or Excel file. Bad rows and likely
/// duplicates are reported per line and skipped; the good rows are inserted
/// in a single transaction.
pub fn import_file(
    conn: &Connection,
    file_path: &Path,
    format: Option<ImportFormat>,
    actor: &Actor,
) -> Result<ImportReport> {
    security::validate_upload(file_path, &ALLOWED_EXTENSIONS)?;
    let format = match format {
        Some(f) => f,
        None => ImportFormat::detect(file_path).ok_or_else(|| {
            ChequeError::Validation(format!("Cannot detect file format of {}", file_path.display()))
        })?,
    };
    let table = format.read(file_path)?;

    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .filter(|c| !table.headers.iter().any(|h| h == *c))
        .copied()
        .collect();
    if !missing.is_empty() {
        return Err(ChequeError::Validation(format!(
            "Colonnes manquantes: {}",
            missing.join(", ")
        )));
    }
    let columns: HashMap<&str, usize> = table
        .headers
        .iter()
        .enumerate()
        .map(|(i, h)| (h.as_str(), i))
        .collect();

    let default_currency = db::get_setting(conn, "default_currency")?.unwrap_or_else(|| "MAD".to_string());
    let now = chrono::Utc::now().naive_utc();
    let mut report = ImportReport {
        total_rows: table.rows.len(),
        ..Default::default()
    };

    let mut tx = conn.unchecked_transaction()?;
    for (line, cells) in &table.rows {
        let row = ImportRow { columns: &columns, cells };
        let valid = match validate_row(&tx, &row) {
            Ok(v) => v,
            Err(message) => {
                report.errors.push(RowError { line: *line, message });
                continue;
            }
        };

        // A skipped row rolls back with its savepoint, client included.
        let row_sp = tx.savepoint()?;
        let (client_id, _) = registry::find_or_create_client(&row_sp, &valid.client)?;
        let candidate = Candidate {
            cheque_number: valid.cheque_number.clone(),
            amount: valid.amount,
            client_id: Some(client_id),
            branch_id: Some(valid.branch_id),
        };
        if !duplicates::find_candidates(&row_sp, &candidate, now)?.is_empty() {
            report.errors.push(RowError { line: *line, message: "Doublon détecté".to_string() });
            continue;
        }

        let cheque = NewCheque {
            currency: valid.currency.unwrap_or_else(|| default_currency.clone()),
            client_id: Some(client_id),
            status: ChequeStatus::Pending,
            depositor_name: valid.depositor_name,
            notes: valid.notes,
            created_by: actor.user_id,
            ..NewCheque::new(
                &valid.cheque_number,
                valid.amount,
                &valid.issue_date.format("%Y-%m-%d").to_string(),
                &valid.due_date.format("%Y-%m-%d").to_string(),
                valid.branch_id,
            )
        };
        let inserted = cheques::add_cheque(&row_sp, &cheque);
        match inserted {
            Ok(_) => {
                row_sp.commit()?;
                report.imported += 1;
            }
            Err(ChequeError::DuplicateCheque { .. }) => {
                report.errors.push(RowError { line: *line, message: "Doublon détecté".to_string() });
            }
            Err(ChequeError::Validation(msg)) => {
                report.errors.push(RowError { line: *line, message: format!("Erreur - {msg}") });
            }
            Err(e) => return Err(e),
        }
    }

    let filename = file_path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    audit::log_event(
        &tx,
        &AuditEvent::new(actor, AuditAction::Import)
            .resource("file", filename)
            .details(serde_json::json!({
                "sha256": compute_checksum(file_path)?,
                "total_rows": report.total_rows,
                "imported": report.imported,
                "errors": report.errors.len(),
            })),
    )?;
    tx.commit()?;
    log::info!(
        "imported {}/{} rows from {filename} ({} errors)",
        report.imported,
        report.total_rows,
        report.errors.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::{add_branch, test_db};

    fn write_csv(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    fn count(conn: &Connection, sql: &str) -> i64 {
        conn.query_row(sql, [], |r| r.get(0)).unwrap()
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("1000"), Some(1000.0));
        assert_eq!(parse_amount("1,234.56"), Some(1234.56));
        assert_eq!(parse_amount("1 250,50"), Some(1250.5));
        assert_eq!(parse_amount("750 MAD"), Some(750.0));
        assert_eq!(parse_amount("-5"), Some(-5.0));
        assert_eq!(parse_amount("abc"), None);
        assert_eq!(parse_amount(""), None);
    }

    #[test]
    fn test_parse_import_date() {
        let expected = NaiveDate::from_ymd_opt(2025, 1, 10);
        assert_eq!(parse_import_date("2025-01-10"), expected);
        assert_eq!(parse_import_date("10/01/2025"), expected);
        assert_eq!(parse_import_date("45667"), expected);
        assert_eq!(parse_import_date("2025-01-10 00:00:00"), expected);
        assert_eq!(parse_import_date("31/02/2025"), None);
        assert_eq!(parse_import_date("soon"), None);
    }

    #[test]
    fn test_excel_serial_to_date() {
        assert_eq!(excel_serial_to_date(45667.0), NaiveDate::from_ymd_opt(2025, 1, 10));
        assert_eq!(excel_serial_to_date(-3.0), None);
    }

    #[test]
    fn test_client_type_fallbacks() {
        assert_eq!(client_type_or_default(Some("entreprise")), ClientType::Company);
        assert_eq!(client_type_or_default(Some("company")), ClientType::Company);
        assert_eq!(client_type_or_default(Some("personne")), ClientType::Individual);
        assert_eq!(client_type_or_default(None), ClientType::Individual);
    }

    #[test]
    fn test_import_reports_row_errors_with_lines() {
        let (dir, conn) = test_db();
        add_branch(&conn, "AWB", "Casa Anfa");
        let path = write_csv(
            dir.path(),
            "batch.csv",
            "cheque_number,amount,due_date,client_name,branch_name,client_type\n\
             C100,1500,2025-04-01,Atlas SARL,Anfa,entreprise\n\
             ,200,2025-04-01,Oasis,Anfa,\n\
             C102,-3,2025-04-01,Oasis,Anfa,\n\
             C103,abc,2025-04-01,Oasis,Anfa,\n\
             C104,300,demain,Oasis,Anfa,\n\
             C105,300,01/05/2025,,Anfa,\n\
             C106,300,01/05/2025,Oasis,Marrakech,\n\
             C107,450.50,15/05/2025,Oasis,anfa,personne\n",
        );

        let report = import_file(&conn, &path, None, &Actor::system()).unwrap();
        assert_eq!(report.total_rows, 8);
        assert_eq!(report.imported, 2);
        let lines: Vec<(usize, &str)> = report.errors.iter().map(|e| (e.line, e.message.as_str())).collect();
        assert_eq!(
            lines,
            vec![
                (3, "Numéro de chèque manquant"),
                (4, "Montant invalide"),
                (5, "Montant non numérique"),
                (6, "Date d'échéance invalide"),
                (7, "Nom du client manquant"),
                (8, "Agence non trouvée"),
            ]
        );

        let (ty, due, issue): (String, String, String) = conn
            .query_row(
                "SELECT cl.client_type, c.due_date, c.issue_date FROM cheques c JOIN clients cl ON c.client_id = cl.id \
                 WHERE c.cheque_number = 'C100'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .unwrap();
        assert_eq!(ty, "company");
        assert_eq!(due, "2025-04-01");
        assert_eq!(issue, "2025-04-01");
        assert_eq!(count(&conn, "SELECT count(*) FROM audit_log WHERE action = 'import'"), 1);
    }

    #[test]
    fn test_import_skips_duplicates_within_and_across_batches() {
        let (dir, conn) = test_db();
        add_branch(&conn, "BP", "Rabat Agdal");
        let body = "cheque_number,amount,due_date,client_name,branch_name\n\
                    D1,900,2025-06-01,Nadia,Agdal\n\
                    D1,900,2025-06-01,Nadia,Agdal\n";
        let path = write_csv(dir.path(), "dups.csv", body);

        let first = import_file(&conn, &path, Some(ImportFormat::Csv), &Actor::system()).unwrap();
        assert_eq!(first.imported, 1);
        assert_eq!(first.errors.len(), 1);
        assert_eq!(first.errors[0].message, "Doublon détecté");

        let second = import_file(&conn, &path, Some(ImportFormat::Csv), &Actor::system()).unwrap();
        assert_eq!(second.imported, 0);
        assert_eq!(count(&conn, "SELECT count(*) FROM cheques"), 1);
        assert_eq!(count(&conn, "SELECT count(*) FROM clients"), 1);
    }

    #[test]
    fn test_skipped_duplicate_leaves_no_new_client() {
        let (dir, conn) = test_db();
        add_branch(&conn, "BP", "Rabat Agdal");
        let first = write_csv(
            dir.path(),
            "first.csv",
            "cheque_number,amount,due_date,client_name,branch_name
D1,900,2025-06-01,Nadia,Agdal
",
        );
        import_file(&conn, &first, None, &Actor::system()).unwrap();

        let second = write_csv(
            dir.path(),
            "second.csv",
            "cheque_number,amount,due_date,client_name,branch_name
             D1,900,2025-06-01,Zineb,Agdal
             D2,120,2025-06-02,Omar,Agdal
",
        );
        let report = import_file(&conn, &second, None, &Actor::system()).unwrap();
        assert_eq!(report.imported, 1);
        assert_eq!(report.errors[0].message, "Doublon détecté");
        assert_eq!(count(&conn, "SELECT count(*) FROM clients WHERE name = 'Zineb'"), 0);
        assert_eq!(count(&conn, "SELECT count(*) FROM clients WHERE name = 'Omar'"), 1);
        assert_eq!(count(&conn, "SELECT count(*) FROM cheques"), 2);
    }

    #[test]
    fn test_cheque_number_with_stripped_characters_is_rejected() {
        let (dir, conn) = test_db();
        add_branch(&conn, "AWB", "Casa Anfa");
        let path = write_csv(
            dir.path(),
            "odd.csv",
            "cheque_number,amount,due_date,client_name,branch_name
             A(1),100,2025-06-01,Atlas,Anfa
             A1,100,2025-07-01,Karim,Anfa
",
        );
        let report = import_file(&conn, &path, None, &Actor::system()).unwrap();
        assert_eq!(report.imported, 1);
        assert_eq!(report.errors.len(), 1);
        assert_eq!((report.errors[0].line, report.errors[0].message.as_str()), (2, "Numéro de chèque invalide"));
        assert_eq!(count(&conn, "SELECT count(*) FROM clients WHERE name = 'Atlas'"), 0);
    }

    #[test]
    fn test_missing_columns_fail_before_insert() {
        let (dir, conn) = test_db();
        add_branch(&conn, "AWB", "Casa");
        let path = write_csv(dir.path(), "bad.csv", "cheque_number,amount\nX1,10\n");
        let err = import_file(&conn, &path, None, &Actor::system()).unwrap_err();
        assert!(err.to_string().contains("due_date"));
        assert!(err.to_string().contains("client_name"));
        assert_eq!(count(&conn, "SELECT count(*) FROM cheques"), 0);
    }

    #[test]
    fn test_rejects_disallowed_extension() {
        let (dir, conn) = test_db();
        let path = write_csv(dir.path(), "cheques.txt", "cheque_number\n");
        assert!(matches!(
            import_file(&conn, &path, None, &Actor::system()),
            Err(ChequeError::Validation(_))
        ));
    }
}
