use std::path::Path;

use rusqlite::{Connection, Row};
use serde::Serialize;

use crate::error::Result;
use crate::models::{Actor, AuditAction, AuditEntry};
use crate::security;

/// One row to be appended to the audit trail.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub user_id: Option<i64>,
    pub username: String,
    pub action: AuditAction,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub details: Option<serde_json::Value>,
    pub success: bool,
    pub error_message: Option<String>,
    pub session_id: Option<String>,
}

impl AuditEvent {
    pub fn new(actor: &Actor, action: AuditAction) -> Self {
        Self {
            user_id: actor.user_id,
            username: actor.username.clone(),
            action,
            resource_type: None,
            resource_id: None,
            details: None,
            success: true,
            error_message: None,
            session_id: actor.session_token.clone(),
        }
    }

    pub fn resource(mut self, kind: &str, id: impl ToString) -> Self {
        self.resource_type = Some(kind.to_string());
        self.resource_id = Some(id.to_string());
        self
    }

    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn failed(mut self, message: &str) -> Self {
        self.success = false;
        self.error_message = Some(message.to_string());
        self
    }
}

pub fn log_event(conn: &Connection, event: &AuditEvent) -> Result<()> {
    let details = match &event.details {
        Some(v) => Some(serde_json::to_string(v)?),
        None => None,
    };
    conn.execute(
        "INSERT INTO audit_log (user_id, username, action, resource_type, resource_id, details, success, error_message, session_id) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        rusqlite::params![
            event.user_id,
            event.username,
            event.action.as_str(),
            event.resource_type,
            event.resource_id,
            details,
            event.success,
            event.error_message,
            event.session_id,
        ],
    )?;
    log::debug!(
        "audit: {} {} {:?}/{:?} success={}",
        event.username,
        event.action.as_str(),
        event.resource_type,
        event.resource_id,
        event.success
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Query
// ---------------------------------------------------------------------------

pub const DEFAULT_QUERY_LIMIT: usize = 1000;

#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    /// Inclusive, `YYYY-MM-DD` or full timestamp.
    pub from: Option<String>,
    /// Inclusive; a bare date covers the whole day.
    pub to: Option<String>,
    pub user_id: Option<i64>,
    pub username: Option<String>,
    pub action: Option<AuditAction>,
    pub limit: Option<usize>,
}

fn entry_from_row(row: &Row) -> rusqlite::Result<AuditEntry> {
    let raw_action: String = row.get(4)?;
    let action = raw_action.parse::<AuditAction>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, e.to_string().into())
    })?;
    let raw_details: Option<String> = row.get(7)?;
    Ok(AuditEntry {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        user_id: row.get(2)?,
        username: row.get(3)?,
        action,
        resource_type: row.get(5)?,
        resource_id: row.get(6)?,
        details: raw_details.and_then(|s| serde_json::from_str(&s).ok()),
        success: row.get(8)?,
        error_message: row.get(9)?,
    })
}

/// Newest first.
pub fn query(conn: &Connection, filter: &AuditFilter) -> Result<Vec<AuditEntry>> {
    let mut clauses = Vec::new();
    let mut params: Vec<String> = Vec::new();

    if let Some(from) = &filter.from {
        params.push(from.clone());
        clauses.push(format!("timestamp >= ?{}", params.len()));
    }
    if let Some(to) = &filter.to {
        // A bare date would otherwise stop at midnight.
        let upper = if to.len() == 10 { format!("{to} 23:59:59") } else { to.clone() };
        params.push(upper);
        clauses.push(format!("timestamp <= ?{}", params.len()));
    }
    if let Some(uid) = filter.user_id {
        params.push(uid.to_string());
        clauses.push(format!("user_id = ?{}", params.len()));
    }
    if let Some(name) = &filter.username {
        params.push(name.clone());
        clauses.push(format!("username = ?{}", params.len()));
    }
    if let Some(action) = filter.action {
        params.push(action.as_str().to_string());
        clauses.push(format!("action = ?{}", params.len()));
    }

    let where_clause = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };
    let limit = filter.limit.unwrap_or(DEFAULT_QUERY_LIMIT);
    let sql = format!(
        "SELECT id, timestamp, user_id, username, action, resource_type, resource_id, details, success, error_message \
         FROM audit_log{where_clause} ORDER BY timestamp DESC, id DESC LIMIT {limit}"
    );
    let mut stmt = conn.prepare(&sql)?;
    let param_values: Vec<&dyn rusqlite::types::ToSql> =
        params.iter().map(|p| p as &dyn rusqlite::types::ToSql).collect();
    let rows = stmt.query_map(param_values.as_slice(), entry_from_row)?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

// ---------------------------------------------------------------------------
// Security report
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct CountItem {
    pub name: String,
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct SecurityReport {
    pub failed_logins_24h: i64,
    pub active_sessions: i64,
    pub top_users_7d: Vec<CountItem>,
    pub events_by_action_7d: Vec<CountItem>,
}

fn fmt_ts(ts: chrono::NaiveDateTime) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

pub fn security_report(conn: &Connection, now: chrono::NaiveDateTime) -> Result<SecurityReport> {
    let day_ago = fmt_ts(now - chrono::Duration::hours(24));
    let week_ago = fmt_ts(now - chrono::Duration::days(7));
    let now_s = fmt_ts(now);

    let failed_logins_24h: i64 = conn.query_row(
        "SELECT count(*) FROM audit_log WHERE action = 'login' AND success = 0 AND timestamp >= ?1",
        [&day_ago],
        |r| r.get(0),
    )?;
    let active_sessions: i64 = conn.query_row(
        "SELECT count(*) FROM sessions WHERE active = 1 AND expires_at > ?1",
        [&now_s],
        |r| r.get(0),
    )?;

    let count_items = |sql: &str| -> Result<Vec<CountItem>> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map([&week_ago], |row| {
            Ok(CountItem {
                name: row.get(0)?,
                count: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    };

    let top_users_7d = count_items(
        "SELECT username, count(*) AS n FROM audit_log WHERE timestamp >= ?1 \
         GROUP BY username ORDER BY n DESC, username LIMIT 10",
    )?;
    let events_by_action_7d = count_items(
        "SELECT action, count(*) AS n FROM audit_log WHERE timestamp >= ?1 \
         GROUP BY action ORDER BY n DESC, action",
    )?;

    Ok(SecurityReport {
        failed_logins_24h,
        active_sessions,
        top_users_7d,
        events_by_action_7d,
    })
}

/// Write the audit log matching `filter` as encrypted JSON. Returns the
/// number of entries written.
pub fn export_encrypted(conn: &Connection, key: &[u8; 32], filter: &AuditFilter, path: &Path) -> Result<usize> {
    let entries = query(conn, filter)?;
    let json = serde_json::to_string(&entries)?;
    let sealed = security::encrypt(key, json.as_bytes())?;
    std::fs::write(path, sealed)?;
    log::info!("exported {} audit entries to {}", entries.len(), path.display());
    Ok(entries.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::test_db;
    use crate::models::Role;

    fn actor(name: &str) -> Actor {
        Actor {
            user_id: None,
            username: name.to_string(),
            role: Role::Admin,
            session_token: None,
        }
    }

    fn log_at(conn: &Connection, event: &AuditEvent, ts: &str) {
        log_event(conn, event).unwrap();
        conn.execute("UPDATE audit_log SET timestamp = ?1 WHERE id = last_insert_rowid()", [ts])
            .unwrap();
    }

    #[test]
    fn test_log_and_query_with_details() {
        let (_dir, conn) = test_db();
        let event = AuditEvent::new(&actor("amina"), AuditAction::Update)
            .resource("cheque", 42)
            .details(serde_json::json!({"status": "cleared"}));
        log_event(&conn, &event).unwrap();

        let entries = query(&conn, &AuditFilter::default()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].resource_id.as_deref(), Some("42"));
        assert_eq!(entries[0].details.as_ref().unwrap()["status"], "cleared");
        assert!(entries[0].success);
    }

    #[test]
    fn test_query_filters_and_orders_newest_first() {
        let (_dir, conn) = test_db();
        log_at(&conn, &AuditEvent::new(&actor("a"), AuditAction::Login), "2025-01-01 08:00:00");
        log_at(&conn, &AuditEvent::new(&actor("b"), AuditAction::Export), "2025-01-02 09:00:00");
        log_at(&conn, &AuditEvent::new(&actor("a"), AuditAction::Logout), "2025-01-03 10:00:00");

        let all = query(&conn, &AuditFilter::default()).unwrap();
        assert_eq!(all[0].action, AuditAction::Logout);

        let only_a = query(&conn, &AuditFilter { username: Some("a".into()), ..Default::default() }).unwrap();
        assert_eq!(only_a.len(), 2);

        let day = query(
            &conn,
            &AuditFilter { from: Some("2025-01-02".into()), to: Some("2025-01-02".into()), ..Default::default() },
        )
        .unwrap();
        assert_eq!(day.len(), 1);
        assert_eq!(day[0].username, "b");

        let limited = query(&conn, &AuditFilter { limit: Some(1), ..Default::default() }).unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn test_security_report_counts() {
        let (_dir, conn) = test_db();
        let now = chrono::NaiveDate::from_ymd_opt(2025, 3, 10).unwrap().and_hms_opt(12, 0, 0).unwrap();
        let failed = AuditEvent::new(&actor("x"), AuditAction::Login).failed("bad password");
        log_at(&conn, &failed, "2025-03-10 09:00:00");
        log_at(&conn, &failed, "2025-03-01 09:00:00");
        log_at(&conn, &AuditEvent::new(&actor("y"), AuditAction::Create), "2025-03-09 09:00:00");

        let report = security_report(&conn, now).unwrap();
        assert_eq!(report.failed_logins_24h, 1);
        assert_eq!(report.active_sessions, 0);
        assert_eq!(report.events_by_action_7d.len(), 2);
        assert!(report.top_users_7d.iter().any(|u| u.name == "y" && u.count == 1));
    }

    #[test]
    fn test_export_encrypted_roundtrips() {
        let (dir, conn) = test_db();
        log_event(&conn, &AuditEvent::new(&actor("z"), AuditAction::Backup)).unwrap();
        let key = [7u8; 32];
        let path = dir.path().join("audit.enc");
        assert_eq!(export_encrypted(&conn, &key, &AuditFilter::default(), &path).unwrap(), 1);

        let sealed = std::fs::read_to_string(&path).unwrap();
        assert!(!sealed.contains("backup"));
        let plain = security::decrypt(&key, &sealed).unwrap();
        let entries: serde_json::Value = serde_json::from_slice(&plain).unwrap();
        assert_eq!(entries[0]["action"], "backup");
    }
}
