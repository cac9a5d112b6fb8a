use chrono::NaiveDate;
use rusqlite::{Connection, Row};

use crate::cheques;
use crate::error::Result;
use crate::fmt::money;
use crate::models::Notification;

pub const KIND_DUE_SOON: &str = "due_soon";
pub const KIND_PAYMENT_REMINDER: &str = "payment_reminder";

const LIST_LIMIT: usize = 50;

fn notification_from_row(row: &Row) -> rusqlite::Result<Notification> {
    Ok(Notification {
        id: row.get(0)?,
        kind: row.get(1)?,
        title: row.get(2)?,
        message: row.get(3)?,
        cheque_id: row.get(4)?,
        user_id: row.get(5)?,
        is_read: row.get(6)?,
        created_at: row.get(7)?,
    })
}

/// Whether a notification of `kind` already exists for the cheque on `day`.
pub fn exists_on(conn: &Connection, cheque_id: i64, kind: &str, day: NaiveDate) -> Result<bool> {
    let mut stmt = conn.prepare_cached(
        "SELECT 1 FROM notifications WHERE cheque_id = ?1 AND kind = ?2 AND date(created_at) = ?3",
    )?;
    Ok(stmt.exists(rusqlite::params![cheque_id, kind, day.format("%Y-%m-%d").to_string()])?)
}

pub fn insert(
    conn: &Connection,
    kind: &str,
    title: &str,
    message: &str,
    cheque_id: Option<i64>,
    user_id: Option<i64>,
    created_at: &str,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO notifications (kind, title, message, cheque_id, user_id, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![kind, title, message, cheque_id, user_id, created_at],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Raise a broadcast `due_soon` notification for every open cheque due
/// within `days` of `today`, at most once per cheque per day. Returns the
/// number created.
pub fn create_due_notifications(conn: &Connection, today: NaiveDate, days: i64) -> Result<usize> {
    let due = cheques::due_soon(conn, today, days)?;
    let stamp = today.and_hms_opt(8, 0, 0).unwrap_or_default().format("%Y-%m-%d %H:%M:%S").to_string();
    let tx = conn.unchecked_transaction()?;
    let mut created = 0usize;
    for cheque in &due {
        if exists_on(&tx, cheque.id, KIND_DUE_SOON, today)? {
            continue;
        }
        let client = cheque.client_name.as_deref().unwrap_or("client inconnu");
        let message = format!(
            "Le chèque {} de {} ({}) arrive à échéance le {}",
            cheque.cheque_number,
            client,
            money(cheque.amount, &cheque.currency),
            cheque.due_date
        );
        insert(&tx, KIND_DUE_SOON, "Échéance proche", &message, Some(cheque.id), None, &stamp)?;
        created += 1;
    }
    tx.commit()?;
    if created > 0 {
        log::info!("created {created} due-date notifications");
    }
    Ok(created)
}

/// Latest notifications addressed to `user_id` or broadcast to everyone.
pub fn list_notifications(conn: &Connection, user_id: Option<i64>, unread_only: bool) -> Result<Vec<Notification>> {
    let unread = if unread_only { " AND is_read = 0" } else { "" };
    let sql = format!(
        "SELECT id, kind, title, message, cheque_id, user_id, is_read, created_at FROM notifications \
         WHERE (user_id IS NULL OR user_id = ?1){unread} ORDER BY created_at DESC, id DESC LIMIT {LIST_LIMIT}"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([user_id], notification_from_row)?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

pub fn mark_read(conn: &Connection, id: i64) -> Result<bool> {
    Ok(conn.execute("UPDATE notifications SET is_read = 1 WHERE id = ?1", [id])? > 0)
}

pub fn mark_all_read(conn: &Connection, user_id: Option<i64>) -> Result<usize> {
    Ok(conn.execute(
        "UPDATE notifications SET is_read = 1 WHERE is_read = 0 AND (user_id IS NULL OR user_id = ?1)",
        [user_id],
    )?)
}

pub fn unread_count(conn: &Connection, user_id: Option<i64>) -> Result<i64> {
    Ok(conn.query_row(
        "SELECT count(*) FROM notifications WHERE is_read = 0 AND (user_id IS NULL OR user_id = ?1)",
        [user_id],
        |r| r.get(0),
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::{add_branch, add_client, insert_cheque, test_db};
    use crate::models::Role;
    use crate::registry;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_due_notifications_once_per_day() {
        let (_dir, conn) = test_db();
        let branch = add_branch(&conn, "AWB", "Casa");
        let client = add_client(&conn, "Atlas");
        let ts = "2025-01-01 00:00:00";
        insert_cheque(&conn, "N1", 100.0, Some(client), branch, "pending", "2025-03-11", ts, ts);
        insert_cheque(&conn, "N2", 100.0, None, branch, "cleared", "2025-03-11", ts, ts);

        assert_eq!(create_due_notifications(&conn, day("2025-03-10"), 3).unwrap(), 1);
        assert_eq!(create_due_notifications(&conn, day("2025-03-10"), 3).unwrap(), 0);
        assert_eq!(create_due_notifications(&conn, day("2025-03-11"), 3).unwrap(), 1);

        let list = list_notifications(&conn, None, false).unwrap();
        assert_eq!(list.len(), 2);
        assert!(list[0].message.contains("N1"));
        assert!(list[0].message.contains("Atlas"));
    }

    #[test]
    fn test_user_scoping_and_read_flags() {
        let (_dir, conn) = test_db();
        let amina = registry::add_user(&conn, "amina", "h", Role::Agent, None, None).unwrap();
        let omar = registry::add_user(&conn, "omar", "h", Role::Agent, None, None).unwrap();
        let ts = "2025-01-01 10:00:00";
        insert(&conn, "info", "Broadcast", "pour tous", None, None, ts).unwrap();
        let mine = insert(&conn, "info", "Perso", "pour amina", None, Some(amina), ts).unwrap();
        insert(&conn, "info", "Autre", "pour omar", None, Some(omar), ts).unwrap();

        assert_eq!(list_notifications(&conn, Some(amina), false).unwrap().len(), 2);
        assert_eq!(unread_count(&conn, Some(amina)).unwrap(), 2);

        assert!(mark_read(&conn, mine).unwrap());
        assert_eq!(unread_count(&conn, Some(amina)).unwrap(), 1);
        assert_eq!(list_notifications(&conn, Some(amina), true).unwrap().len(), 1);

        assert_eq!(mark_all_read(&conn, Some(amina)).unwrap(), 1);
        assert_eq!(unread_count(&conn, Some(amina)).unwrap(), 0);
        assert_eq!(unread_count(&conn, Some(omar)).unwrap(), 1);
        assert!(!mark_read(&conn, 999).unwrap());
    }
}
