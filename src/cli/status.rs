use rusqlite::Connection;

use crate::db::{get_connection, get_setting};
use crate::error::Result;
use crate::fmt::format_bytes;
use crate::settings::{load_session_token, load_settings};

fn count(conn: &Connection, sql: &str) -> Result<i64> {
    Ok(conn.query_row(sql, [], |r| r.get(0))?)
}

pub fn run() -> Result<()> {
    let settings = load_settings();
    let data_dir = settings.data_dir();
    let db_path = settings.db_path();

    println!("Data dir:   {}", data_dir.display());
    println!("Database:   {}", db_path.display());

    if db_path.exists() {
        let size = std::fs::metadata(&db_path)?.len();
        println!("DB size:    {}", format_bytes(size));

        let conn = get_connection(&db_path)?;

        let company = get_setting(&conn, "company_name")?.filter(|c| !c.is_empty());
        println!("Company:    {}", company.as_deref().unwrap_or("(not set)"));
        println!(
            "Session:    {}",
            if load_session_token(&data_dir).is_some() { "saved" } else { "none" }
        );

        println!();
        println!("Banks:          {}", count(&conn, "SELECT count(*) FROM banks WHERE active = 1")?);
        println!("Branches:       {}", count(&conn, "SELECT count(*) FROM branches WHERE active = 1")?);
        println!("Clients:        {}", count(&conn, "SELECT count(*) FROM clients WHERE active = 1")?);
        println!("Users:          {}", count(&conn, "SELECT count(*) FROM users WHERE active = 1")?);
        println!("Cheques:        {}", count(&conn, "SELECT count(*) FROM cheques")?);
        println!(
            "Open cheques:   {}",
            count(&conn, "SELECT count(*) FROM cheques WHERE status IN ('pending', 'deposited')")?
        );
        println!(
            "Unread notices: {}",
            count(&conn, "SELECT count(*) FROM notifications WHERE is_read = 0")?
        );
    } else {
        println!();
        println!("Database not found. Run `chequeman init` to set up.");
    }

    Ok(())
}
