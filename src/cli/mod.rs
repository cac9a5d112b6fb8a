pub mod audit;
pub mod auth;
pub mod backup;
pub mod banks;
pub mod cheques;
pub mod clients;
pub mod export;
pub mod import;
pub mod init;
pub mod notifications;
pub mod poll;
pub mod remind;
pub mod report;
pub mod seal;
pub mod status;
pub mod users;

use std::path::PathBuf;

use chrono::{NaiveDate, NaiveDateTime};
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use zeroize::Zeroizing;

use crate::db::get_connection;
use crate::error::{ChequeError, Result};
use crate::models::Actor;
use crate::security::{self, Permission};
use crate::settings::{self, Settings};

/// Read by password prompts before falling back to the terminal, so scripts
/// and tests can run unattended.
pub const PASSWORD_ENV: &str = "CHEQUEMAN_PASSWORD";

pub(crate) fn now() -> NaiveDateTime {
    chrono::Utc::now().naive_utc()
}

pub(crate) fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

pub(crate) fn read_password(prompt: &str) -> Result<Zeroizing<String>> {
    if let Ok(pw) = std::env::var(PASSWORD_ENV) {
        return Ok(Zeroizing::new(pw));
    }
    Ok(Zeroizing::new(rpassword::prompt_password(prompt)?))
}

/// Settings plus the open database for one command.
pub(crate) struct Context {
    pub settings: Settings,
    pub conn: Connection,
}

impl Context {
    pub fn open() -> Result<Self> {
        let settings = settings::load_settings();
        let db_path = settings.db_path();
        if !db_path.exists() {
            return Err(ChequeError::Settings(format!(
                "database not found at {}. Run `chequeman init` first",
                db_path.display()
            )));
        }
        let conn = get_connection(&db_path)?;
        Ok(Self { settings, conn })
    }

    pub fn data_dir(&self) -> PathBuf {
        self.settings.data_dir()
    }

    /// The logged-in user, from the session token saved by `login`.
    pub fn actor(&self) -> Result<Actor> {
        let token = settings::load_session_token(&self.data_dir())
            .ok_or_else(|| ChequeError::Auth("not logged in. Run `chequeman login`".to_string()))?;
        match security::validate_session(&self.conn, &token, now())? {
            Some(session) => Ok(Actor::from(&session)),
            None => {
                settings::clear_session_token(&self.data_dir())?;
                Err(ChequeError::Auth("session expired. Run `chequeman login`".to_string()))
            }
        }
    }

    pub fn authorize(&self, permission: Permission) -> Result<Actor> {
        let actor = self.actor()?;
        security::require_permission(&actor, permission)?;
        Ok(actor)
    }

    pub fn company_name(&self) -> Result<String> {
        Ok(crate::db::get_setting(&self.conn, "company_name")?.unwrap_or_default())
    }
}

#[derive(Parser)]
#[command(name = "chequeman", about = "Track postdated cheques: banks, clients, due dates, reminders and reports.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the data directory, the database and the first admin user.
    Init {
        /// Path for chequeman data (default: ~/Documents/chequeman)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
        /// Username of the first administrator
        #[arg(long, default_value = "admin")]
        admin: String,
        /// Company name printed on reports
        #[arg(long)]
        company: Option<String>,
    },
    /// Show the database location and summary counts.
    Status,
    /// Open a session.
    Login {
        username: String,
    },
    /// Close the current session.
    Logout,
    /// Show the logged-in user.
    Whoami,
    /// Manage banks.
    Banks {
        #[command(subcommand)]
        command: BanksCommands,
    },
    /// Manage bank branches.
    Branches {
        #[command(subcommand)]
        command: BranchesCommands,
    },
    /// Manage clients.
    Clients {
        #[command(subcommand)]
        command: ClientsCommands,
    },
    /// Manage users.
    Users {
        #[command(subcommand)]
        command: UsersCommands,
    },
    /// Record and track cheques.
    Cheques {
        #[command(subcommand)]
        command: ChequesCommands,
    },
    /// In-app notifications.
    Notifications {
        #[command(subcommand)]
        command: NotificationsCommands,
    },
    /// Analytics reports.
    Report {
        #[command(subcommand)]
        command: ReportCommands,
    },
    /// Heuristic risk score (0-100) of a client.
    RiskScore {
        /// Client ID
        client: i64,
    },
    /// Import cheques from a CSV or Excel file.
    Import {
        /// Path to CSV or XLSX file to import
        file: String,
        /// Force the format: csv or excel
        #[arg(long)]
        format: Option<String>,
    },
    /// Send SMS/email reminders for cheques due soon.
    Remind {
        /// Days ahead to look (default: notification_days setting)
        #[arg(long)]
        days: Option<i64>,
        /// Show what would be sent without sending
        #[arg(long = "dry-run")]
        dry_run: bool,
    },
    /// Ask bank APIs for the status of open cheques.
    Poll {
        /// Poll a single cheque
        #[arg(long)]
        cheque: Option<i64>,
    },
    /// Export a report to CSV, JSON or PDF.
    Export {
        /// Report: register, status, banks, clients, risk, duplicates
        kind: String,
        /// Output format: csv, json, pdf
        #[arg(long, default_value = "csv")]
        format: String,
        /// Output file path (default: <data_dir>/exports/<kind>-<timestamp>.<ext>)
        #[arg(long)]
        output: Option<String>,
        /// Only cheques with this status (register)
        #[arg(long)]
        status: Option<String>,
        /// Due on or after YYYY-MM-DD
        #[arg(long = "from")]
        from_date: Option<String>,
        /// Due on or before YYYY-MM-DD
        #[arg(long = "to")]
        to_date: Option<String>,
    },
    /// Inspect the audit trail.
    Audit {
        #[command(subcommand)]
        command: AuditCommands,
    },
    /// Back up the database.
    Backup {
        /// Output path (default: <data_dir>/backups/cheques-YYYYMMDD-HHMMSS.db)
        #[arg(long)]
        output: Option<String>,
    },
    /// Encrypt a credential for use in settings.json (bank API keys, SMTP password).
    Seal,
    /// Print shell completions.
    Completions {
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
pub enum BanksCommands {
    /// List banks.
    List {
        /// Include deactivated banks
        #[arg(long)]
        all: bool,
    },
    /// Add a bank.
    Add {
        name: String,
        /// Short code, e.g. AWB
        #[arg(long)]
        code: Option<String>,
    },
    /// Rename a bank or change its code.
    Update {
        id: i64,
        #[arg(long)]
        name: String,
        #[arg(long)]
        code: Option<String>,
    },
    /// Deactivate a bank.
    Remove {
        id: i64,
    },
}

#[derive(Subcommand)]
pub enum BranchesCommands {
    /// List branches.
    List {
        /// Only branches of this bank (name or code)
        #[arg(long)]
        bank: Option<String>,
    },
    /// Add a branch.
    Add {
        name: String,
        /// Bank name or code
        #[arg(long)]
        bank: String,
        #[arg(long)]
        address: Option<String>,
        #[arg(long = "postal-code")]
        postal_code: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
    /// Deactivate a branch.
    Remove {
        id: i64,
    },
}

#[derive(Subcommand)]
pub enum ClientsCommands {
    /// List clients.
    List {
        /// individual or company
        #[arg(long = "type")]
        client_type: Option<String>,
    },
    /// Add a client.
    Add {
        name: String,
        /// individual or company
        #[arg(long = "type", default_value = "individual")]
        client_type: String,
        /// National ID (individuals)
        #[arg(long = "id-number")]
        id_number: Option<String>,
        /// Tax ID (companies)
        #[arg(long = "tax-id")]
        tax_id: Option<String>,
        #[arg(long)]
        address: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
    /// Replace a client's details.
    Update {
        id: i64,
        name: String,
        #[arg(long = "type", default_value = "individual")]
        client_type: String,
        #[arg(long = "id-number")]
        id_number: Option<String>,
        #[arg(long = "tax-id")]
        tax_id: Option<String>,
        #[arg(long)]
        address: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
    /// Search clients by name, ID number, tax ID, phone or email.
    Search {
        term: String,
    },
    /// Deactivate a client.
    Remove {
        id: i64,
    },
}

#[derive(Subcommand)]
pub enum UsersCommands {
    /// List users.
    List,
    /// Add a user. The password is prompted for.
    Add {
        username: String,
        /// admin, accountant, agent or readonly
        #[arg(long, default_value = "agent")]
        role: String,
        #[arg(long = "full-name")]
        full_name: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
    /// Deactivate a user and close their sessions.
    Remove {
        username: String,
    },
}

#[derive(Subcommand)]
pub enum ChequesCommands {
    /// List cheques.
    List {
        #[arg(long)]
        status: Option<String>,
        /// Bank name or code
        #[arg(long)]
        bank: Option<String>,
        #[arg(long)]
        client: Option<i64>,
        /// Due on or after YYYY-MM-DD
        #[arg(long = "from")]
        from_date: Option<String>,
        /// Due on or before YYYY-MM-DD
        #[arg(long = "to")]
        to_date: Option<String>,
        /// Fuzzy match on cheque number, client, depositor or notes
        #[arg(long)]
        search: Option<String>,
        #[arg(long, default_value = "100")]
        limit: usize,
    },
    /// Record a cheque.
    Add {
        /// Cheque number
        number: String,
        #[arg(long)]
        amount: f64,
        /// Due date YYYY-MM-DD
        #[arg(long)]
        due: String,
        /// Branch ID
        #[arg(long)]
        branch: i64,
        /// Issue date YYYY-MM-DD (default: today)
        #[arg(long)]
        issue: Option<String>,
        /// Client ID
        #[arg(long)]
        client: Option<i64>,
        #[arg(long)]
        currency: Option<String>,
        #[arg(long)]
        depositor: Option<String>,
        #[arg(long)]
        invoice: Option<String>,
        #[arg(long = "invoice-date")]
        invoice_date: Option<String>,
        /// Path to the cheque scan
        #[arg(long)]
        scan: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        /// Record even when it looks like a duplicate
        #[arg(long)]
        force: bool,
    },
    /// Show one cheque.
    Show {
        id: i64,
    },
    /// Change a cheque's status.
    Status {
        id: i64,
        /// pending, deposited, cleared, bounced, unpaid, cancelled
        status: String,
    },
    /// Edit a cheque.
    Edit {
        id: i64,
        #[arg(long)]
        due: Option<String>,
        #[arg(long)]
        amount: Option<f64>,
        #[arg(long)]
        client: Option<i64>,
        #[arg(long)]
        depositor: Option<String>,
        #[arg(long)]
        invoice: Option<String>,
        #[arg(long)]
        scan: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Delete a cheque.
    Delete {
        id: i64,
    },
    /// Open cheques due within the next days.
    Due {
        #[arg(long)]
        days: Option<i64>,
    },
    /// Open cheques past their due date.
    Overdue,
}

#[derive(Subcommand)]
pub enum NotificationsCommands {
    /// List notifications.
    List {
        /// Only unread notifications
        #[arg(long)]
        unread: bool,
    },
    /// Mark a notification, or all of them, as read.
    Read {
        id: Option<i64>,
        #[arg(long, conflicts_with = "id")]
        all: bool,
    },
    /// Raise due-soon notifications for cheques approaching their due date.
    Refresh,
}

#[derive(Subcommand)]
pub enum ReportCommands {
    /// Totals by status, overdue amount and busiest banks.
    Dashboard,
    /// Days spent in each status.
    Aging {
        #[arg(long = "from")]
        from_date: Option<String>,
        #[arg(long = "to")]
        to_date: Option<String>,
    },
    /// Monthly, quarterly and weekday volumes.
    Trends {
        #[arg(long, default_value = "2")]
        years: u32,
    },
    /// Client risk profiles.
    Risk,
    /// Success rates and processing times.
    Performance {
        #[arg(long = "from")]
        from_date: Option<String>,
        #[arg(long = "to")]
        to_date: Option<String>,
    },
    /// Expected cash inflow from open cheques.
    Cashflow {
        #[arg(long, default_value = "30")]
        days: i64,
    },
    /// Per-month totals for one year by due date.
    Monthly {
        /// Defaults to the current year
        #[arg(long)]
        year: Option<i32>,
    },
    /// Likely duplicate pairs in the ledger.
    Duplicates,
}

#[derive(Subcommand)]
pub enum AuditCommands {
    /// List audit entries.
    List {
        #[arg(long)]
        user: Option<String>,
        /// login, logout, create, read, update, delete, export, import, backup, restore, config_change
        #[arg(long)]
        action: Option<String>,
        /// From YYYY-MM-DD
        #[arg(long = "from")]
        from_date: Option<String>,
        /// To YYYY-MM-DD
        #[arg(long = "to")]
        to_date: Option<String>,
        #[arg(long, default_value = "50")]
        limit: usize,
    },
    /// Failed logins, active sessions and activity summary.
    Report,
    /// Write the audit trail to an encrypted file.
    Export {
        output: String,
        #[arg(long = "from")]
        from_date: Option<String>,
        #[arg(long = "to")]
        to_date: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_cheque_add() {
        let cli = Cli::try_parse_from([
            "chequeman", "cheques", "add", "A1", "--amount", "1000", "--due", "2025-03-01", "--branch", "2",
        ])
        .unwrap();
        match cli.command {
            Commands::Cheques { command: ChequesCommands::Add { number, amount, branch, force, .. } } => {
                assert_eq!(number, "A1");
                assert_eq!(amount, 1000.0);
                assert_eq!(branch, 2);
                assert!(!force);
            }
            _ => panic!("wrong command"),
        }
    }

    #[test]
    fn test_read_conflicts_with_all() {
        assert!(Cli::try_parse_from(["chequeman", "notifications", "read", "3", "--all"]).is_err());
    }
}
