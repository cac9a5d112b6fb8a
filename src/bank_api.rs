//! Cheque status polling against bank HTTP APIs.

use std::time::Duration;

use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::cheques;
use crate::error::{ChequeError, Result};
use crate::models::{Actor, ChequeStatus};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankApiConfig {
    pub bank_code: String,
    pub api_url: String,
    pub api_key: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Translate a bank's status vocabulary into ours.
pub fn map_bank_status(raw: &str) -> Option<ChequeStatus> {
    match raw.trim().to_lowercase().as_str() {
        "cleared" => Some(ChequeStatus::Cleared),
        "bounced" | "returned" => Some(ChequeStatus::Bounced),
        "pending" => Some(ChequeStatus::Pending),
        "processing" => Some(ChequeStatus::Deposited),
        "cancelled" => Some(ChequeStatus::Cancelled),
        _ => None,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusQuery {
    pub cheque_number: String,
    pub amount: f64,
    pub branch_id: i64,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    status: Option<String>,
}

pub trait BankStatusClient {
    /// The bank's raw status string for the cheque, if it reported one.
    fn fetch_status(&self, config: &BankApiConfig, query: &StatusQuery) -> Result<Option<String>>;
}

pub struct HttpBankClient {
    client: reqwest::blocking::Client,
}

impl HttpBankClient {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }
}

impl BankStatusClient for HttpBankClient {
    fn fetch_status(&self, config: &BankApiConfig, query: &StatusQuery) -> Result<Option<String>> {
        let url = format!("{}/status", config.api_url.trim_end_matches('/'));
        log::debug!("POST {url} for cheque {}", query.cheque_number);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&config.api_key)
            .json(query)
            .send()?;
        if !response.status().is_success() {
            return Err(ChequeError::Other(format!(
                "{} API answered {} for cheque {}",
                config.bank_code,
                response.status(),
                query.cheque_number
            )));
        }
        let body: StatusResponse = response.json()?;
        Ok(body.status)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PollOutcome {
    Updated(ChequeStatus),
    Unchanged,
    NoConfig,
    UnknownStatus(String),
}

impl std::fmt::Display for PollOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Updated(status) => write!(f, "updated to {status}"),
            Self::Unchanged => f.write_str("unchanged"),
            Self::NoConfig => f.write_str("no API configured for this bank"),
            Self::UnknownStatus(raw) => write!(f, "unknown bank status '{raw}'"),
        }
    }
}

/// Ask the cheque's bank for its status and apply it. The update goes
/// through the regular status change so the notification and audit trail
/// are written once.
pub fn poll_cheque_status(
    conn: &Connection,
    client: &dyn BankStatusClient,
    configs: &[BankApiConfig],
    cheque_id: i64,
    actor: &Actor,
) -> Result<PollOutcome> {
    let row: Option<(String, f64, i64, Option<String>)> = conn
        .query_row(
            "SELECT c.cheque_number, c.amount, c.branch_id, bk.code FROM cheques c \
             JOIN branches b ON c.branch_id = b.id JOIN banks bk ON b.bank_id = bk.id \
             WHERE c.id = ?1",
            [cheque_id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
        )
        .optional()?;
    let (cheque_number, amount, branch_id, bank_code) = row.ok_or(ChequeError::UnknownCheque(cheque_id))?;

    let config = bank_code.as_deref().and_then(|code| {
        configs
            .iter()
            .find(|c| c.enabled && c.bank_code.eq_ignore_ascii_case(code))
    });
    let Some(config) = config else {
        log::warn!("no bank API configured for {:?}", bank_code);
        return Ok(PollOutcome::NoConfig);
    };

    let query = StatusQuery { cheque_number, amount, branch_id };
    let raw = client.fetch_status(config, &query)?.unwrap_or_default();
    let Some(status) = map_bank_status(&raw) else {
        log::warn!("cheque {}: unmapped bank status '{raw}'", query.cheque_number);
        return Ok(PollOutcome::UnknownStatus(raw));
    };

    if cheques::update_cheque_status(conn, cheque_id, status, actor)? {
        log::info!("cheque {} set to {status} from {} API", query.cheque_number, config.bank_code);
        Ok(PollOutcome::Updated(status))
    } else {
        Ok(PollOutcome::Unchanged)
    }
}

#[derive(Debug)]
pub struct PollResult {
    pub cheque_id: i64,
    pub cheque_number: String,
    pub outcome: Result<PollOutcome>,
}

/// Poll every open cheque. A failure on one cheque is recorded and the
/// batch moves on.
pub fn poll_open_cheques(
    conn: &Connection,
    client: &dyn BankStatusClient,
    configs: &[BankApiConfig],
    actor: &Actor,
) -> Result<Vec<PollResult>> {
    let open = {
        let mut stmt = conn.prepare(
            "SELECT id, cheque_number FROM cheques WHERE status IN ('pending', 'deposited') ORDER BY due_date, id",
        )?;
        let rows = stmt.query_map([], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?)))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()?
    };
    let results: Vec<PollResult> = open
        .into_iter()
        .map(|(cheque_id, cheque_number)| {
            let outcome = poll_cheque_status(conn, client, configs, cheque_id, actor);
            if let Err(e) = &outcome {
                log::error!("polling cheque {cheque_number} failed: {e}");
            }
            PollResult { cheque_id, cheque_number, outcome }
        })
        .collect();
    Ok(results)
}
