use rusqlite::{Connection, OptionalExtension, Row};

use crate::error::{ChequeError, Result};
use crate::models::{Bank, Branch, Client, ClientType, NewBranch, NewClient, Role, User};

// ---------------------------------------------------------------------------
// Banks
// ---------------------------------------------------------------------------

fn bank_from_row(row: &Row) -> rusqlite::Result<Bank> {
    Ok(Bank {
        id: row.get(0)?,
        name: row.get(1)?,
        code: row.get(2)?,
        active: row.get(3)?,
    })
}

pub fn list_banks(conn: &Connection, active_only: bool) -> Result<Vec<Bank>> {
    let sql = if active_only {
        "SELECT id, name, code, active FROM banks WHERE active = 1 ORDER BY name"
    } else {
        "SELECT id, name, code, active FROM banks ORDER BY name"
    };
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([], bank_from_row)?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

pub fn add_bank(conn: &Connection, name: &str, code: Option<&str>) -> Result<i64> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ChequeError::Validation("Bank name is required".to_string()));
    }
    conn.execute(
        "INSERT INTO banks (name, code) VALUES (?1, ?2)",
        rusqlite::params![name, code],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn update_bank(conn: &Connection, id: i64, name: &str, code: Option<&str>) -> Result<()> {
    let changed = conn.execute(
        "UPDATE banks SET name = ?1, code = ?2 WHERE id = ?3",
        rusqlite::params![name, code, id],
    )?;
    if changed == 0 {
        return Err(ChequeError::UnknownBank(id.to_string()));
    }
    Ok(())
}

/// Soft delete: the bank disappears from active lists but its branches and
/// cheques are kept.
pub fn deactivate_bank(conn: &Connection, id: i64) -> Result<()> {
    let changed = conn.execute("UPDATE banks SET active = 0 WHERE id = ?1", [id])?;
    if changed == 0 {
        return Err(ChequeError::UnknownBank(id.to_string()));
    }
    Ok(())
}

/// Look a bank up by exact name or by code, case-insensitively.
pub fn find_bank(conn: &Connection, name_or_code: &str) -> Result<Bank> {
    conn.query_row(
        "SELECT id, name, code, active FROM banks \
         WHERE lower(name) = lower(?1) OR lower(code) = lower(?1)",
        [name_or_code],
        bank_from_row,
    )
    .optional()?
    .ok_or_else(|| ChequeError::UnknownBank(name_or_code.to_string()))
}

// ---------------------------------------------------------------------------
// Branches
// ---------------------------------------------------------------------------

const BRANCH_SELECT: &str = "SELECT b.id, b.bank_id, bk.name, b.name, b.address, b.postal_code, \
     b.phone, b.email, b.active FROM branches b JOIN banks bk ON b.bank_id = bk.id";

fn branch_from_row(row: &Row) -> rusqlite::Result<Branch> {
    Ok(Branch {
        id: row.get(0)?,
        bank_id: row.get(1)?,
        bank_name: row.get(2)?,
        name: row.get(3)?,
        address: row.get(4)?,
        postal_code: row.get(5)?,
        phone: row.get(6)?,
        email: row.get(7)?,
        active: row.get(8)?,
    })
}

pub fn list_branches(conn: &Connection, bank_id: Option<i64>, active_only: bool) -> Result<Vec<Branch>> {
    let mut conditions = Vec::new();
    if active_only {
        conditions.push("b.active = 1");
    }
    if bank_id.is_some() {
        conditions.push("b.bank_id = ?1");
    }
    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    };
    let sql = format!("{BRANCH_SELECT}{where_clause} ORDER BY bk.name, b.name");
    let mut stmt = conn.prepare(&sql)?;
    let rows = match bank_id {
        Some(id) => stmt.query_map([id], branch_from_row)?.collect::<std::result::Result<Vec<_>, _>>()?,
        None => stmt.query_map([], branch_from_row)?.collect::<std::result::Result<Vec<_>, _>>()?,
    };
    Ok(rows)
}

pub fn add_branch(conn: &Connection, branch: &NewBranch) -> Result<i64> {
    if branch.name.trim().is_empty() {
        return Err(ChequeError::Validation("Branch name is required".to_string()));
    }
    let bank_exists: bool = conn
        .prepare("SELECT 1 FROM banks WHERE id = ?1")?
        .exists([branch.bank_id])?;
    if !bank_exists {
        return Err(ChequeError::UnknownBank(branch.bank_id.to_string()));
    }
    conn.execute(
        "INSERT INTO branches (bank_id, name, address, postal_code, phone, email) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            branch.bank_id,
            branch.name.trim(),
            branch.address,
            branch.postal_code,
            branch.phone,
            branch.email,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_branch(conn: &Connection, id: i64) -> Result<Branch> {
    conn.query_row(&format!("{BRANCH_SELECT} WHERE b.id = ?1"), [id], branch_from_row)
        .optional()?
        .ok_or_else(|| ChequeError::UnknownBranch(id.to_string()))
}

pub fn deactivate_branch(conn: &Connection, id: i64) -> Result<()> {
    let changed = conn.execute("UPDATE branches SET active = 0 WHERE id = ?1", [id])?;
    if changed == 0 {
        return Err(ChequeError::UnknownBranch(id.to_string()));
    }
    Ok(())
}

/// First active branch whose name contains `fragment`, case-insensitively.
pub fn find_branch_by_name(conn: &Connection, fragment: &str) -> Result<Option<Branch>> {
    let needle = fragment.trim().to_lowercase();
    if needle.is_empty() {
        return Ok(None);
    }
    let branches = list_branches(conn, None, true)?;
    Ok(branches.into_iter().find(|b| b.name.to_lowercase().contains(&needle)))
}

// ---------------------------------------------------------------------------
// Clients
// ---------------------------------------------------------------------------

const CLIENT_SELECT: &str =
    "SELECT id, client_type, name, id_number, tax_id, address, phone, email, active FROM clients";

fn client_from_row(row: &Row) -> rusqlite::Result<Client> {
    let raw_type: String = row.get(1)?;
    let client_type = raw_type.parse::<ClientType>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, e.to_string().into())
    })?;
    Ok(Client {
        id: row.get(0)?,
        client_type,
        name: row.get(2)?,
        id_number: row.get(3)?,
        tax_id: row.get(4)?,
        address: row.get(5)?,
        phone: row.get(6)?,
        email: row.get(7)?,
        active: row.get(8)?,
    })
}

pub fn list_clients(conn: &Connection, client_type: Option<ClientType>, active_only: bool) -> Result<Vec<Client>> {
    let mut conditions = Vec::new();
    if active_only {
        conditions.push("active = 1");
    }
    if client_type.is_some() {
        conditions.push("client_type = ?1");
    }
    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    };
    let sql = format!("{CLIENT_SELECT}{where_clause} ORDER BY name");
    let mut stmt = conn.prepare(&sql)?;
    let rows = match client_type {
        Some(t) => stmt
            .query_map([t.as_str()], client_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?,
        None => stmt.query_map([], client_from_row)?.collect::<std::result::Result<Vec<_>, _>>()?,
    };
    Ok(rows)
}

pub fn add_client(conn: &Connection, client: &NewClient) -> Result<i64> {
    if client.name.trim().is_empty() {
        return Err(ChequeError::Validation("Client name is required".to_string()));
    }
    conn.execute(
        "INSERT INTO clients (client_type, name, id_number, tax_id, address, phone, email) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            client.client_type.as_str(),
            client.name.trim(),
            client.id_number,
            client.tax_id,
            client.address,
            client.phone,
            client.email,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn update_client(conn: &Connection, id: i64, client: &NewClient) -> Result<()> {
    let changed = conn.execute(
        "UPDATE clients SET client_type = ?1, name = ?2, id_number = ?3, tax_id = ?4, \
         address = ?5, phone = ?6, email = ?7 WHERE id = ?8",
        rusqlite::params![
            client.client_type.as_str(),
            client.name.trim(),
            client.id_number,
            client.tax_id,
            client.address,
            client.phone,
            client.email,
            id,
        ],
    )?;
    if changed == 0 {
        return Err(ChequeError::UnknownClient(id.to_string()));
    }
    Ok(())
}

pub fn get_client(conn: &Connection, id: i64) -> Result<Client> {
    conn.query_row(&format!("{CLIENT_SELECT} WHERE id = ?1"), [id], client_from_row)
        .optional()?
        .ok_or_else(|| ChequeError::UnknownClient(id.to_string()))
}

pub fn deactivate_client(conn: &Connection, id: i64) -> Result<()> {
    let changed = conn.execute("UPDATE clients SET active = 0 WHERE id = ?1", [id])?;
    if changed == 0 {
        return Err(ChequeError::UnknownClient(id.to_string()));
    }
    Ok(())
}

/// Active clients whose name or id number contains `term`, at most 10.
pub fn search_clients(conn: &Connection, term: &str) -> Result<Vec<Client>> {
    let pattern = format!("%{}%", term.trim());
    let mut stmt = conn.prepare(&format!(
        "{CLIENT_SELECT} WHERE active = 1 AND (name LIKE ?1 OR id_number LIKE ?1) ORDER BY name LIMIT 10"
    ))?;
    let rows = stmt.query_map([pattern], client_from_row)?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

/// Resolve a client by name, creating it from `template` when no active
/// client matches. Returns the id and whether a new row was inserted.
pub fn find_or_create_client(conn: &Connection, template: &NewClient) -> Result<(i64, bool)> {
    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM clients WHERE active = 1 AND lower(name) = lower(?1) ORDER BY id LIMIT 1",
            [template.name.trim()],
            |r| r.get(0),
        )
        .optional()?;
    if let Some(id) = existing {
        return Ok((id, false));
    }
    if let Some(first) = search_clients(conn, &template.name)?.into_iter().next() {
        return Ok((first.id, false));
    }
    let id = add_client(conn, template)?;
    log::info!("created client '{}' (id {id})", template.name.trim());
    Ok((id, true))
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

const USER_SELECT: &str =
    "SELECT id, username, role, full_name, email, active, last_login FROM users";

fn user_from_row(row: &Row) -> rusqlite::Result<User> {
    let raw_role: String = row.get(2)?;
    let role = raw_role.parse::<Role>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, e.to_string().into())
    })?;
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        role,
        full_name: row.get(3)?,
        email: row.get(4)?,
        active: row.get(5)?,
        last_login: row.get(6)?,
    })
}

/// Insert a user with an already-hashed password.
pub fn add_user(
    conn: &Connection,
    username: &str,
    password_hash: &str,
    role: Role,
    full_name: Option<&str>,
    email: Option<&str>,
) -> Result<i64> {
    let username = username.trim();
    if username.is_empty() {
        return Err(ChequeError::Validation("Username is required".to_string()));
    }
    conn.execute(
        "INSERT INTO users (username, password_hash, role, full_name, email) VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![username, password_hash, role.as_str(), full_name, email],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            ChequeError::Validation(format!("User '{username}' already exists"))
        }
        other => ChequeError::Db(other),
    })?;
    Ok(conn.last_insert_rowid())
}

pub fn list_users(conn: &Connection) -> Result<Vec<User>> {
    let mut stmt = conn.prepare(&format!("{USER_SELECT} ORDER BY username"))?;
    let rows = stmt.query_map([], user_from_row)?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

pub fn find_user(conn: &Connection, username: &str) -> Result<User> {
    conn.query_row(&format!("{USER_SELECT} WHERE username = ?1"), [username], user_from_row)
        .optional()?
        .ok_or_else(|| ChequeError::UnknownUser(username.to_string()))
}

pub fn deactivate_user(conn: &Connection, username: &str) -> Result<()> {
    let changed = conn.execute("UPDATE users SET active = 0 WHERE username = ?1", [username])?;
    if changed == 0 {
        return Err(ChequeError::UnknownUser(username.to_string()));
    }
    conn.execute(
        "UPDATE sessions SET active = 0 WHERE user_id = (SELECT id FROM users WHERE username = ?1)",
        [username],
    )?;
    Ok(())
}

pub fn user_count(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row("SELECT count(*) FROM users", [], |r| r.get(0))?)
}
