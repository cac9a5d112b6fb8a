use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, Row};

use crate::audit::{self, AuditEvent};
use crate::error::{ChequeError, Result};
use crate::models::{Actor, AuditAction, Cheque, ChequeStatus, NewCheque};
use crate::security;

pub const NOTIFICATION_STATUS_CHANGE: &str = "status_change";

const CHEQUE_SELECT: &str = "SELECT c.id, c.cheque_number, c.amount, c.currency, c.issue_date, c.due_date, \
     c.status, c.client_id, cl.name, c.branch_id, br.name, bk.name, c.scan_path, c.depositor_name, \
     c.invoice_number, c.notes, c.created_at, c.updated_at, c.created_by \
     FROM cheques c \
     LEFT JOIN clients cl ON c.client_id = cl.id \
     LEFT JOIN branches br ON c.branch_id = br.id \
     LEFT JOIN banks bk ON br.bank_id = bk.id";

fn cheque_from_row(row: &Row) -> rusqlite::Result<Cheque> {
    let raw_status: String = row.get(6)?;
    let status = raw_status.parse::<ChequeStatus>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, e.to_string().into())
    })?;
    Ok(Cheque {
        id: row.get(0)?,
        cheque_number: row.get(1)?,
        amount: row.get(2)?,
        currency: row.get::<_, Option<String>>(3)?.unwrap_or_else(|| "MAD".to_string()),
        issue_date: row.get(4)?,
        due_date: row.get(5)?,
        status,
        client_id: row.get(7)?,
        client_name: row.get(8)?,
        branch_id: row.get(9)?,
        branch_name: row.get(10)?,
        bank_name: row.get(11)?,
        scan_path: row.get(12)?,
        depositor_name: row.get(13)?,
        invoice_number: row.get(14)?,
        notes: row.get(15)?,
        created_at: row.get(16)?,
        updated_at: row.get(17)?,
        created_by: row.get(18)?,
    })
}

pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| ChequeError::Validation(format!("Invalid date '{raw}', expected YYYY-MM-DD")))
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(e, rusqlite::Error::SqliteFailure(err, _) if err.code == rusqlite::ErrorCode::ConstraintViolation
        && err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE)
}

// ---------------------------------------------------------------------------
// Create / read
// ---------------------------------------------------------------------------

pub fn add_cheque(conn: &Connection, cheque: &NewCheque) -> Result<i64> {
    let number = cheque.cheque_number.trim();
    if number.is_empty() {
        return Err(ChequeError::Validation("Cheque number is required".to_string()));
    }
    if !security::is_clean_input(number) {
        return Err(ChequeError::Validation(format!("Invalid cheque number: {number}")));
    }
    if !(cheque.amount > 0.0) || !cheque.amount.is_finite() {
        return Err(ChequeError::Validation(format!(
            "Amount must be greater than zero (got {})",
            cheque.amount
        )));
    }
    let issue = parse_date(&cheque.issue_date)?;
    let due = parse_date(&cheque.due_date)?;
    if let Some(d) = &cheque.invoice_date {
        parse_date(d)?;
    }

    conn.execute(
        "INSERT INTO cheques (cheque_number, amount, currency, issue_date, due_date, client_id, branch_id, \
         status, scan_path, depositor_name, invoice_number, invoice_date, notes, created_by) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        rusqlite::params![
            number,
            cheque.amount,
            cheque.currency,
            issue.format("%Y-%m-%d").to_string(),
            due.format("%Y-%m-%d").to_string(),
            cheque.client_id,
            cheque.branch_id,
            cheque.status.as_str(),
            cheque.scan_path,
            cheque.depositor_name,
            cheque.invoice_number,
            cheque.invoice_date,
            cheque.notes,
            cheque.created_by,
        ],
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            ChequeError::DuplicateCheque {
                number: number.to_string(),
                branch_id: cheque.branch_id,
            }
        } else {
            ChequeError::Db(e)
        }
    })?;
    let id = conn.last_insert_rowid();
    log::info!("added cheque {number} (id {id}) for {:.2} {}", cheque.amount, cheque.currency);
    Ok(id)
}

pub fn is_duplicate_number(conn: &Connection, number: &str, branch_id: i64) -> Result<bool> {
    let mut stmt = conn.prepare_cached("SELECT 1 FROM cheques WHERE cheque_number = ?1 AND branch_id = ?2")?;
    Ok(stmt.exists(rusqlite::params![number.trim(), branch_id])?)
}

pub fn get_cheque(conn: &Connection, id: i64) -> Result<Cheque> {
    conn.query_row(&format!("{CHEQUE_SELECT} WHERE c.id = ?1"), [id], cheque_from_row)
        .optional()?
        .ok_or(ChequeError::UnknownCheque(id))
}

#[derive(Debug, Clone, Default)]
pub struct ChequeFilter {
    pub status: Option<ChequeStatus>,
    pub bank_id: Option<i64>,
    pub branch_id: Option<i64>,
    pub client_id: Option<i64>,
    pub due_from: Option<String>,
    pub due_to: Option<String>,
    pub min_amount: Option<f64>,
    pub max_amount: Option<f64>,
    /// Fuzzy-matched against cheque number, client name, depositor and notes.
    pub search: Option<String>,
    pub limit: Option<usize>,
}

pub fn list_cheques(conn: &Connection, filter: &ChequeFilter) -> Result<Vec<Cheque>> {
    let mut clauses: Vec<String> = Vec::new();
    let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    if let Some(status) = filter.status {
        params.push(Box::new(status.as_str()));
        clauses.push(format!("c.status = ?{}", params.len()));
    }
    if let Some(bank_id) = filter.bank_id {
        params.push(Box::new(bank_id));
        clauses.push(format!("br.bank_id = ?{}", params.len()));
    }
    if let Some(branch_id) = filter.branch_id {
        params.push(Box::new(branch_id));
        clauses.push(format!("c.branch_id = ?{}", params.len()));
    }
    if let Some(client_id) = filter.client_id {
        params.push(Box::new(client_id));
        clauses.push(format!("c.client_id = ?{}", params.len()));
    }
    if let Some(from) = &filter.due_from {
        params.push(Box::new(parse_date(from)?.format("%Y-%m-%d").to_string()));
        clauses.push(format!("c.due_date >= ?{}", params.len()));
    }
    if let Some(to) = &filter.due_to {
        params.push(Box::new(parse_date(to)?.format("%Y-%m-%d").to_string()));
        clauses.push(format!("c.due_date <= ?{}", params.len()));
    }
    if let Some(min) = filter.min_amount {
        params.push(Box::new(min));
        clauses.push(format!("c.amount >= ?{}", params.len()));
    }
    if let Some(max) = filter.max_amount {
        params.push(Box::new(max));
        clauses.push(format!("c.amount <= ?{}", params.len()));
    }
    let term = filter.search.as_deref().map(str::trim).filter(|t| !t.is_empty());

    let where_clause = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };
    // A search is applied after the query, so the limit has to wait for it.
    let limit_clause = match (term, filter.limit) {
        (None, Some(l)) => format!(" LIMIT {l}"),
        _ => String::new(),
    };
    let sql = format!("{CHEQUE_SELECT}{where_clause} ORDER BY c.due_date DESC, c.created_at DESC{limit_clause}");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(params.iter()), cheque_from_row)?;
    let cheques = rows.collect::<std::result::Result<Vec<_>, _>>()?;

    let Some(term) = term else {
        return Ok(cheques);
    };
    Ok(cheques
        .into_iter()
        .filter(|c| matches_search(c, term))
        .take(filter.limit.unwrap_or(usize::MAX))
        .collect())
}

pub const FUZZY_THRESHOLD: f64 = 0.6;

/// Case-insensitive substring match, or a normalized Levenshtein similarity
/// of at least `FUZZY_THRESHOLD` over the whole field.
pub fn fuzzy_match(query: &str, text: &str) -> bool {
    let query = query.trim().to_lowercase();
    let text = text.trim().to_lowercase();
    if query.is_empty() || text.is_empty() {
        return false;
    }
    text.contains(&query) || strsim::normalized_levenshtein(&query, &text) >= FUZZY_THRESHOLD
}

fn matches_search(cheque: &Cheque, term: &str) -> bool {
    [
        Some(&cheque.cheque_number),
        cheque.client_name.as_ref(),
        cheque.depositor_name.as_ref(),
        cheque.notes.as_ref(),
    ]
    .into_iter()
    .flatten()
    .any(|field| fuzzy_match(term, field))
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Move a cheque to `new_status`. Returns `false` when it already had that
/// status, in which case nothing is written.
///
/// The status update, the status-change notification and the audit entry
/// commit together. Cleared and cancelled cheques cannot be moved.
pub fn update_cheque_status(conn: &Connection, id: i64, new_status: ChequeStatus, actor: &Actor) -> Result<bool> {
    let tx = conn.unchecked_transaction()?;

    let current = get_cheque(&tx, id)?;
    if current.status == new_status {
        return Ok(false);
    }
    if !current.status.can_transition_to(new_status) {
        return Err(ChequeError::InvalidTransition {
            from: current.status.to_string(),
            to: new_status.to_string(),
        });
    }

    tx.execute(
        "UPDATE cheques SET status = ?1, updated_at = datetime('now') WHERE id = ?2",
        rusqlite::params![new_status.as_str(), id],
    )?;

    if let Some(message) = new_status.transition_message() {
        tx.execute(
            "INSERT INTO notifications (kind, title, message, cheque_id, user_id) VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                NOTIFICATION_STATUS_CHANGE,
                format!("Chèque {}", current.cheque_number),
                message,
                id,
                actor.user_id,
            ],
        )?;
        let event = AuditEvent::new(actor, AuditAction::Update)
            .resource("cheque", id)
            .details(serde_json::json!({
                "cheque_number": current.cheque_number,
                "from": current.status.as_str(),
                "to": new_status.as_str(),
            }));
        audit::log_event(&tx, &event)?;
    }

    tx.commit()?;
    log::info!("cheque {} moved {} -> {}", current.cheque_number, current.status, new_status);
    Ok(true)
}

/// Editable fields; `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct ChequeEdit {
    pub due_date: Option<String>,
    pub amount: Option<f64>,
    pub client_id: Option<i64>,
    pub notes: Option<String>,
    pub scan_path: Option<String>,
    pub depositor_name: Option<String>,
    pub invoice_number: Option<String>,
}

pub fn update_cheque(conn: &Connection, id: i64, edit: &ChequeEdit, actor: &Actor) -> Result<()> {
    let mut sets: Vec<String> = Vec::new();
    let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    if let Some(due) = &edit.due_date {
        params.push(Box::new(parse_date(due)?.format("%Y-%m-%d").to_string()));
        sets.push(format!("due_date = ?{}", params.len()));
    }
    if let Some(amount) = edit.amount {
        if !(amount > 0.0) {
            return Err(ChequeError::Validation("Amount must be greater than zero".to_string()));
        }
        params.push(Box::new(amount));
        sets.push(format!("amount = ?{}", params.len()));
    }
    let optional_text = [
        ("notes", &edit.notes),
        ("scan_path", &edit.scan_path),
        ("depositor_name", &edit.depositor_name),
        ("invoice_number", &edit.invoice_number),
    ];
    for (column, value) in optional_text {
        if let Some(v) = value {
            params.push(Box::new(v.clone()));
            sets.push(format!("{column} = ?{}", params.len()));
        }
    }
    if let Some(client_id) = edit.client_id {
        params.push(Box::new(client_id));
        sets.push(format!("client_id = ?{}", params.len()));
    }
    if sets.is_empty() {
        return Ok(());
    }

    params.push(Box::new(id));
    let sql = format!(
        "UPDATE cheques SET {}, updated_at = datetime('now') WHERE id = ?{}",
        sets.join(", "),
        params.len()
    );
    let tx = conn.unchecked_transaction()?;
    let changed = tx.execute(&sql, rusqlite::params_from_iter(params.iter()))?;
    if changed == 0 {
        return Err(ChequeError::UnknownCheque(id));
    }
    audit::log_event(&tx, &AuditEvent::new(actor, AuditAction::Update).resource("cheque", id))?;
    tx.commit()?;
    Ok(())
}

/// Permanently remove a cheque. Its notifications go with it.
pub fn delete_cheque(conn: &Connection, id: i64, actor: &Actor) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    let cheque = get_cheque(&tx, id)?;
    tx.execute("DELETE FROM cheques WHERE id = ?1", [id])?;
    let event = AuditEvent::new(actor, AuditAction::Delete)
        .resource("cheque", id)
        .details(serde_json::json!({ "cheque_number": cheque.cheque_number, "amount": cheque.amount }));
    audit::log_event(&tx, &event)?;
    tx.commit()?;
    log::warn!("deleted cheque {} (id {id})", cheque.cheque_number);
    Ok(())
}

// ---------------------------------------------------------------------------
// Due dates
// ---------------------------------------------------------------------------

/// Open cheques due between `today` and `today + days`, soonest first.
pub fn due_soon(conn: &Connection, today: NaiveDate, days: i64) -> Result<Vec<Cheque>> {
    let start = today.format("%Y-%m-%d").to_string();
    let end = (today + chrono::Duration::days(days)).format("%Y-%m-%d").to_string();
    let mut stmt = conn.prepare(&format!(
        "{CHEQUE_SELECT} WHERE c.status IN ('pending', 'deposited') AND c.due_date BETWEEN ?1 AND ?2 \
         ORDER BY c.due_date, c.id"
    ))?;
    let rows = stmt.query_map([start, end], cheque_from_row)?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

/// Open cheques whose due date has passed, oldest first.
pub fn overdue(conn: &Connection, today: NaiveDate) -> Result<Vec<Cheque>> {
    let mut stmt = conn.prepare(&format!(
        "{CHEQUE_SELECT} WHERE c.status IN ('pending', 'deposited') AND c.due_date < ?1 \
         ORDER BY c.due_date, c.id"
    ))?;
    let rows = stmt.query_map([today.format("%Y-%m-%d").to_string()], cheque_from_row)?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::{add_branch, add_client, insert_cheque, test_db};

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn count(conn: &Connection, table: &str) -> i64 {
        conn.query_row(&format!("SELECT count(*) FROM {table}"), [], |r| r.get(0)).unwrap()
    }

    #[test]
    fn test_same_number_rejected_within_branch() {
        let (_dir, conn) = test_db();
        let b1 = add_branch(&conn, "AWB", "Casa Centre");
        let b2 = add_branch(&conn, "AWB", "Casa Maarif");
        let client = add_client(&conn, "Atlas");
        let mut cheque = NewCheque::new("A1", 1000.0, "2025-01-01", "2025-02-01", b1);
        cheque.client_id = Some(client);
        add_cheque(&conn, &cheque).unwrap();

        let err = add_cheque(&conn, &cheque).unwrap_err();
        assert!(matches!(err, ChequeError::DuplicateCheque { ref number, branch_id } if number == "A1" && branch_id == b1));
        assert_eq!(count(&conn, "cheques"), 1);

        cheque.branch_id = b2;
        add_cheque(&conn, &cheque).unwrap();
        assert_eq!(count(&conn, "cheques"), 2);
        assert!(is_duplicate_number(&conn, "A1", b2).unwrap());
        assert!(!is_duplicate_number(&conn, "A2", b2).unwrap());
    }

    #[test]
    fn test_add_validates_amount_and_dates() {
        let (_dir, conn) = test_db();
        let branch = add_branch(&conn, "BP", "Rabat");
        let zero = NewCheque::new("Z1", 0.0, "2025-01-01", "2025-02-01", branch);
        assert!(matches!(add_cheque(&conn, &zero), Err(ChequeError::Validation(_))));
        let bad_date = NewCheque::new("Z2", 10.0, "2025-01-01", "01/02/2025", branch);
        assert!(matches!(add_cheque(&conn, &bad_date), Err(ChequeError::Validation(_))));
        let blank = NewCheque::new("  ", 10.0, "2025-01-01", "2025-02-01", branch);
        assert!(add_cheque(&conn, &blank).is_err());
        let odd = NewCheque::new("A(1)", 10.0, "2025-01-01", "2025-02-01", branch);
        assert!(matches!(add_cheque(&conn, &odd), Err(ChequeError::Validation(_))));
    }

    #[test]
    fn test_get_cheque_joins_names() {
        let (_dir, conn) = test_db();
        let branch = add_branch(&conn, "CIH", "Fes Ville Nouvelle");
        let client = add_client(&conn, "Oasis SARL");
        let mut new = NewCheque::new("C9", 250.5, "2025-01-01", "2025-03-01", branch);
        new.client_id = Some(client);
        let id = add_cheque(&conn, &new).unwrap();
        let c = get_cheque(&conn, id).unwrap();
        assert_eq!(c.client_name.as_deref(), Some("Oasis SARL"));
        assert_eq!(c.branch_name.as_deref(), Some("Fes Ville Nouvelle"));
        assert_eq!(c.bank_name.as_deref(), Some("Crédit Immobilier et Hôtelier"));
        assert_eq!(c.status, ChequeStatus::Pending);
        assert!(matches!(get_cheque(&conn, 999), Err(ChequeError::UnknownCheque(999))));
    }

    #[test]
    fn test_list_filters_and_ordering() {
        let (_dir, conn) = test_db();
        let awb = add_branch(&conn, "AWB", "Casa");
        let bp = add_branch(&conn, "BP", "Rabat");
        let client = add_client(&conn, "Atlas Trading");
        insert_cheque(&conn, "1", 100.0, Some(client), awb, "pending", "2025-01-10", "2025-01-01 00:00:00", "2025-01-01 00:00:00");
        insert_cheque(&conn, "2", 500.0, None, bp, "cleared", "2025-03-10", "2025-01-02 00:00:00", "2025-01-02 00:00:00");
        insert_cheque(&conn, "3", 900.0, Some(client), bp, "pending", "2025-02-10", "2025-01-03 00:00:00", "2025-01-03 00:00:00");

        let all = list_cheques(&conn, &ChequeFilter::default()).unwrap();
        let numbers: Vec<_> = all.iter().map(|c| c.cheque_number.as_str()).collect();
        assert_eq!(numbers, vec!["2", "3", "1"]);

        let pending = list_cheques(&conn, &ChequeFilter { status: Some(ChequeStatus::Pending), ..Default::default() }).unwrap();
        assert_eq!(pending.len(), 2);

        let bp_bank = crate::registry::find_bank(&conn, "BP").unwrap();
        let by_bank = list_cheques(&conn, &ChequeFilter { bank_id: Some(bp_bank.id), ..Default::default() }).unwrap();
        assert_eq!(by_bank.len(), 2);

        let ranged = list_cheques(
            &conn,
            &ChequeFilter {
                due_from: Some("2025-02-01".into()),
                due_to: Some("2025-02-28".into()),
                min_amount: Some(800.0),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(ranged.len(), 1);
        assert_eq!(ranged[0].cheque_number, "3");

        let search = list_cheques(&conn, &ChequeFilter { search: Some("atlas".into()), ..Default::default() }).unwrap();
        assert_eq!(search.len(), 2);
        let capped = list_cheques(
            &conn,
            &ChequeFilter { search: Some("atlas".into()), limit: Some(1), ..Default::default() },
        )
        .unwrap();
        assert_eq!(capped.len(), 1);
        assert_eq!(capped[0].cheque_number, "3");
    }

    #[test]
    fn test_fuzzy_match() {
        assert!(fuzzy_match("ATLAS", "Atlas Trading"));
        assert!(fuzzy_match("Atals Trading", "Atlas Trading"));
        assert!(!fuzzy_match("Zineb", "Atlas Trading"));
        assert!(!fuzzy_match("", "Atlas Trading"));
    }

    #[test]
    fn test_search_tolerates_typos_and_covers_depositor() {
        let (_dir, conn) = test_db();
        let branch = add_branch(&conn, "AWB", "Casa");
        let client = add_client(&conn, "Oasis Distribution");
        let mut by_client = NewCheque::new("S1", 100.0, "2025-01-01", "2025-02-01", branch);
        by_client.client_id = Some(client);
        add_cheque(&conn, &by_client).unwrap();
        let mut by_depositor = NewCheque::new("S2", 200.0, "2025-01-01", "2025-02-01", branch);
        by_depositor.depositor_name = Some("Youssef Benali".to_string());
        add_cheque(&conn, &by_depositor).unwrap();

        let search = |term: &str| -> Vec<String> {
            list_cheques(&conn, &ChequeFilter { search: Some(term.into()), ..Default::default() })
                .unwrap()
                .into_iter()
                .map(|c| c.cheque_number)
                .collect()
        };
        assert_eq!(search("Oasis Distributoin"), vec!["S1"]);
        assert_eq!(search("benali"), vec!["S2"]);
        assert_eq!(search("Youssef Benaly"), vec!["S2"]);
        assert!(search("Marrakech").is_empty());
    }

    #[test]
    fn test_terminal_transition_writes_trail_once() {
        let (_dir, conn) = test_db();
        let branch = add_branch(&conn, "AWB", "Casa");
        let id = insert_cheque(&conn, "T1", 300.0, None, branch, "pending", "2025-02-01", "2025-01-01 00:00:00", "2025-01-01 00:00:00");
        let actor = Actor::system();

        assert!(update_cheque_status(&conn, id, ChequeStatus::Deposited, &actor).unwrap());
        assert_eq!(count(&conn, "notifications"), 0);

        assert!(update_cheque_status(&conn, id, ChequeStatus::Cleared, &actor).unwrap());
        assert!(!update_cheque_status(&conn, id, ChequeStatus::Cleared, &actor).unwrap());

        assert_eq!(count(&conn, "notifications"), 1);
        assert_eq!(count(&conn, "audit_log"), 1);
        assert_eq!(get_cheque(&conn, id).unwrap().status, ChequeStatus::Cleared);
    }

    #[test]
    fn test_closed_cheque_cannot_move() {
        let (_dir, conn) = test_db();
        let branch = add_branch(&conn, "AWB", "Casa");
        let id = insert_cheque(&conn, "T2", 300.0, None, branch, "cancelled", "2025-02-01", "2025-01-01 00:00:00", "2025-01-01 00:00:00");
        let err = update_cheque_status(&conn, id, ChequeStatus::Pending, &Actor::system()).unwrap_err();
        assert!(matches!(err, ChequeError::InvalidTransition { .. }));
        assert_eq!(count(&conn, "notifications"), 0);
    }

    #[test]
    fn test_bounced_cheque_can_be_represented() {
        let (_dir, conn) = test_db();
        let branch = add_branch(&conn, "AWB", "Casa");
        let id = insert_cheque(&conn, "T3", 300.0, None, branch, "bounced", "2025-02-01", "2025-01-01 00:00:00", "2025-01-01 00:00:00");
        assert!(update_cheque_status(&conn, id, ChequeStatus::Deposited, &Actor::system()).unwrap());
        assert!(update_cheque_status(&conn, id, ChequeStatus::Cleared, &Actor::system()).unwrap());
        assert_eq!(count(&conn, "notifications"), 1);
    }

    #[test]
    fn test_update_and_delete() {
        let (_dir, conn) = test_db();
        let branch = add_branch(&conn, "AWB", "Casa");
        let id = insert_cheque(&conn, "U1", 300.0, None, branch, "pending", "2025-02-01", "2025-01-01 00:00:00", "2025-01-01 00:00:00");
        let edit = ChequeEdit { notes: Some("remis au guichet".into()), due_date: Some("2025-02-15".into()), ..Default::default() };
        update_cheque(&conn, id, &edit, &Actor::system()).unwrap();
        let c = get_cheque(&conn, id).unwrap();
        assert_eq!(c.due_date, "2025-02-15");
        assert_eq!(c.notes.as_deref(), Some("remis au guichet"));

        update_cheque_status(&conn, id, ChequeStatus::Bounced, &Actor::system()).unwrap();
        delete_cheque(&conn, id, &Actor::system()).unwrap();
        assert_eq!(count(&conn, "cheques"), 0);
        assert_eq!(count(&conn, "notifications"), 0);
        assert!(matches!(delete_cheque(&conn, id, &Actor::system()), Err(ChequeError::UnknownCheque(_))));
    }

    #[test]
    fn test_due_soon_and_overdue() {
        let (_dir, conn) = test_db();
        let branch = add_branch(&conn, "AWB", "Casa");
        let ts = "2025-01-01 00:00:00";
        insert_cheque(&conn, "D0", 1.0, None, branch, "pending", "2025-03-09", ts, ts);
        insert_cheque(&conn, "D1", 1.0, None, branch, "pending", "2025-03-10", ts, ts);
        insert_cheque(&conn, "D2", 1.0, None, branch, "deposited", "2025-03-13", ts, ts);
        insert_cheque(&conn, "D3", 1.0, None, branch, "pending", "2025-03-14", ts, ts);
        insert_cheque(&conn, "D4", 1.0, None, branch, "cleared", "2025-03-11", ts, ts);

        let today = date("2025-03-10");
        let soon: Vec<_> = due_soon(&conn, today, 3).unwrap().into_iter().map(|c| c.cheque_number).collect();
        assert_eq!(soon, vec!["D1", "D2"]);
        let late: Vec<_> = overdue(&conn, today).unwrap().into_iter().map(|c| c.cheque_number).collect();
        assert_eq!(late, vec!["D0"]);
    }
}
