use std::path::Path;

use rusqlite::backup::Backup;
use rusqlite::{Connection, OptionalExtension};

use crate::error::Result;

pub const DB_FILE: &str = "cheques.db";

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS banks (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    code TEXT,
    created_at TEXT DEFAULT (datetime('now')),
    active INTEGER DEFAULT 1
);

CREATE TABLE IF NOT EXISTS branches (
    id INTEGER PRIMARY KEY,
    bank_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    address TEXT,
    postal_code TEXT,
    phone TEXT,
    email TEXT,
    created_at TEXT DEFAULT (datetime('now')),
    active INTEGER DEFAULT 1,
    FOREIGN KEY (bank_id) REFERENCES banks(id)
);

CREATE TABLE IF NOT EXISTS clients (
    id INTEGER PRIMARY KEY,
    client_type TEXT NOT NULL CHECK (client_type IN ('individual', 'company')),
    name TEXT NOT NULL,
    id_number TEXT,
    tax_id TEXT,
    address TEXT,
    phone TEXT,
    email TEXT,
    created_at TEXT DEFAULT (datetime('now')),
    active INTEGER DEFAULT 1
);

CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY,
    username TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    role TEXT NOT NULL CHECK (role IN ('admin', 'accountant', 'agent', 'readonly')),
    full_name TEXT,
    email TEXT,
    active INTEGER DEFAULT 1,
    created_at TEXT DEFAULT (datetime('now')),
    last_login TEXT
);

CREATE TABLE IF NOT EXISTS cheques (
    id INTEGER PRIMARY KEY,
    amount REAL NOT NULL,
    currency TEXT DEFAULT 'MAD',
    issue_date TEXT NOT NULL,
    due_date TEXT NOT NULL,
    client_id INTEGER,
    branch_id INTEGER NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending'
        CHECK (status IN ('pending', 'deposited', 'cleared', 'bounced', 'unpaid', 'cancelled')),
    cheque_number TEXT NOT NULL,
    scan_path TEXT,
    depositor_name TEXT,
    invoice_number TEXT,
    invoice_date TEXT,
    notes TEXT,
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now')),
    created_by INTEGER,
    UNIQUE (cheque_number, branch_id),
    FOREIGN KEY (client_id) REFERENCES clients(id),
    FOREIGN KEY (branch_id) REFERENCES branches(id),
    FOREIGN KEY (created_by) REFERENCES users(id)
);

CREATE TABLE IF NOT EXISTS notifications (
    id INTEGER PRIMARY KEY,
    kind TEXT NOT NULL,
    title TEXT NOT NULL,
    message TEXT NOT NULL,
    cheque_id INTEGER,
    user_id INTEGER,
    is_read INTEGER DEFAULT 0,
    created_at TEXT DEFAULT (datetime('now')),
    FOREIGN KEY (cheque_id) REFERENCES cheques(id) ON DELETE CASCADE,
    FOREIGN KEY (user_id) REFERENCES users(id)
);

CREATE TABLE IF NOT EXISTS audit_log (
    id INTEGER PRIMARY KEY,
    timestamp TEXT DEFAULT (datetime('now')),
    user_id INTEGER,
    username TEXT NOT NULL,
    action TEXT NOT NULL,
    resource_type TEXT,
    resource_id TEXT,
    details TEXT,
    success INTEGER NOT NULL,
    error_message TEXT,
    session_id TEXT
);

CREATE TABLE IF NOT EXISTS sessions (
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL,
    token TEXT NOT NULL UNIQUE,
    created_at TEXT DEFAULT (datetime('now')),
    expires_at TEXT NOT NULL,
    active INTEGER DEFAULT 1,
    FOREIGN KEY (user_id) REFERENCES users(id)
);

CREATE TABLE IF NOT EXISTS settings (
    id INTEGER PRIMARY KEY,
    key TEXT NOT NULL UNIQUE,
    value TEXT NOT NULL,
    description TEXT,
    updated_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS export_history (
    id INTEGER PRIMARY KEY,
    filename TEXT NOT NULL,
    export_type TEXT NOT NULL,
    filters TEXT,
    record_count INTEGER,
    file_size INTEGER,
    created_by INTEGER,
    created_at TEXT DEFAULT (datetime('now')),
    FOREIGN KEY (created_by) REFERENCES users(id)
);

CREATE INDEX IF NOT EXISTS idx_cheques_status ON cheques(status);
CREATE INDEX IF NOT EXISTS idx_cheques_due_date ON cheques(due_date);
CREATE INDEX IF NOT EXISTS idx_cheques_client ON cheques(client_id);
CREATE INDEX IF NOT EXISTS idx_cheques_branch ON cheques(branch_id);
CREATE INDEX IF NOT EXISTS idx_cheques_number ON cheques(cheque_number);
CREATE INDEX IF NOT EXISTS idx_branches_bank ON branches(bank_id);
CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications(user_id);
CREATE INDEX IF NOT EXISTS idx_notifications_read ON notifications(is_read);
CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp);
CREATE INDEX IF NOT EXISTS idx_audit_user ON audit_log(user_id);
CREATE INDEX IF NOT EXISTS idx_audit_action ON audit_log(action);
";

// (name, code)
const DEFAULT_BANKS: &[(&str, &str)] = &[
    ("Crédit Agricole du Maroc", "CAM"),
    ("Attijariwafa Bank", "AWB"),
    ("Banque Populaire", "BP"),
    ("Crédit Immobilier et Hôtelier", "CIH"),
    ("BMCE Bank", "BMCE"),
    ("Société Générale Maroc", "SGMB"),
    ("Crédit du Maroc", "CDM"),
    ("Al Barid Bank", "ABB"),
    ("BMCI", "BMCI"),
];

// (key, value, description)
const DEFAULT_SETTINGS: &[(&str, &str, &str)] = &[
    ("company_name", "", "Company name printed on reports"),
    ("notification_days", "3", "Days before the due date to raise a notification"),
    ("default_currency", "MAD", "Currency for new cheques"),
];

pub fn get_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;

    for (name, code) in DEFAULT_BANKS {
        conn.execute(
            "INSERT OR IGNORE INTO banks (name, code) VALUES (?1, ?2)",
            rusqlite::params![name, code],
        )?;
    }
    for (key, value, description) in DEFAULT_SETTINGS {
        conn.execute(
            "INSERT OR IGNORE INTO settings (key, value, description) VALUES (?1, ?2, ?3)",
            rusqlite::params![key, value, description],
        )?;
    }
    Ok(())
}

pub fn get_setting(conn: &Connection, key: &str) -> Result<Option<String>> {
    Ok(conn
        .query_row("SELECT value FROM settings WHERE key = ?1", [key], |r| r.get(0))
        .optional()?)
}

pub fn set_setting(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, datetime('now')) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        rusqlite::params![key, value],
    )?;
    Ok(())
}

/// Online copy of the live database into `dest`.
pub fn backup_to(conn: &Connection, dest: &Path) -> Result<()> {
    let mut dest_conn = Connection::open(dest)?;
    let backup = Backup::new(conn, &mut dest_conn)?;
    backup.run_to_completion(100, std::time::Duration::from_millis(10), None)?;
    log::info!("database backed up to {}", dest.display());
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    pub fn test_db() -> (tempfile::TempDir, Connection) {
        let dir = tempfile::tempdir().unwrap();
        let conn = get_connection(&dir.path().join("test.db")).unwrap();
        init_db(&conn).unwrap();
        (dir, conn)
    }

    pub fn add_branch(conn: &Connection, bank: &str, name: &str) -> i64 {
        let bank_id: i64 = conn
            .query_row("SELECT id FROM banks WHERE code = ?1", [bank], |r| r.get(0))
            .unwrap();
        conn.execute(
            "INSERT INTO branches (bank_id, name) VALUES (?1, ?2)",
            rusqlite::params![bank_id, name],
        )
        .unwrap();
        conn.last_insert_rowid()
    }

    pub fn add_client(conn: &Connection, name: &str) -> i64 {
        conn.execute(
            "INSERT INTO clients (client_type, name) VALUES ('company', ?1)",
            [name],
        )
        .unwrap();
        conn.last_insert_rowid()
    }

    /// Insert a cheque with explicit audit timestamps so date arithmetic in
    /// tests does not depend on the wall clock.
    #[allow(clippy::too_many_arguments)]
    pub fn insert_cheque(
        conn: &Connection,
        number: &str,
        amount: f64,
        client_id: Option<i64>,
        branch_id: i64,
        status: &str,
        due_date: &str,
        created_at: &str,
        updated_at: &str,
    ) -> i64 {
        conn.execute(
            "INSERT INTO cheques (cheque_number, amount, issue_date, due_date, client_id, branch_id, status, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            rusqlite::params![number, amount, &created_at[..10], due_date, client_id, branch_id, status, created_at, updated_at],
        )
        .unwrap();
        conn.last_insert_rowid()
    }
}

#[cfg(test)]
mod tests {
    use super::testing::test_db;
    use super::*;
    use crate::error::ChequeError;

    #[test]
    fn test_init_db_creates_tables() {
        let (_dir, conn) = test_db();
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();
        for expected in &[
            "banks", "branches", "clients", "cheques", "users", "notifications", "audit_log",
            "sessions", "settings", "export_history",
        ] {
            assert!(tables.contains(&expected.to_string()), "missing table: {expected}");
        }
    }

    #[test]
    fn test_init_db_is_idempotent() {
        let (_dir, conn) = test_db();
        init_db(&conn).unwrap();
        let banks: i64 = conn.query_row("SELECT count(*) FROM banks", [], |r| r.get(0)).unwrap();
        assert_eq!(banks, DEFAULT_BANKS.len() as i64);
    }

    #[test]
    fn test_settings_defaults_and_overwrite() {
        let (_dir, conn) = test_db();
        assert_eq!(get_setting(&conn, "default_currency").unwrap().as_deref(), Some("MAD"));
        set_setting(&conn, "notification_days", "5").unwrap();
        assert_eq!(get_setting(&conn, "notification_days").unwrap().as_deref(), Some("5"));
        assert_eq!(get_setting(&conn, "missing").unwrap(), None);
    }

    #[test]
    fn test_get_setting_reports_db_errors() {
        let (_dir, conn) = test_db();
        conn.execute_batch("DROP TABLE settings").unwrap();
        assert!(matches!(get_setting(&conn, "company_name"), Err(ChequeError::Db(_))));
    }

    #[test]
    fn test_status_check_constraint() {
        let (_dir, conn) = test_db();
        let branch = testing::add_branch(&conn, "AWB", "Casa Centre");
        let err = conn.execute(
            "INSERT INTO cheques (cheque_number, amount, issue_date, due_date, branch_id, status) \
             VALUES ('X1', 10, '2025-01-01', '2025-02-01', ?1, 'lost')",
            [branch],
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_backup_copies_data() {
        let (dir, conn) = test_db();
        let dest = dir.path().join("copy.db");
        backup_to(&conn, &dest).unwrap();
        let copy = Connection::open(&dest).unwrap();
        let banks: i64 = copy.query_row("SELECT count(*) FROM banks", [], |r| r.get(0)).unwrap();
        assert_eq!(banks, DEFAULT_BANKS.len() as i64);
    }
}
