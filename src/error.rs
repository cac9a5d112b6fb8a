use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChequeError {
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[cfg(feature = "xlsx")]
    #[error("Spreadsheet error: {0}")]
    Xlsx(#[from] calamine::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Mail error: {0}")]
    Mail(String),

    #[cfg(feature = "pdf")]
    #[error("PDF error: {0}")]
    Pdf(String),

    #[error("Unknown bank: {0}")]
    UnknownBank(String),

    #[error("Unknown branch: {0}")]
    UnknownBranch(String),

    #[error("Unknown client: {0}")]
    UnknownClient(String),

    #[error("Unknown cheque: {0}")]
    UnknownCheque(i64),

    #[error("Unknown user: {0}")]
    UnknownUser(String),

    #[error("Cheque {number} already exists at branch {branch_id}")]
    DuplicateCheque { number: String, branch_id: i64 },

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("Cannot move cheque from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("{0}")]
    Validation(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Account locked: too many failed logins for {0}")]
    LockedOut(String),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, ChequeError>;
