use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ChequeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChequeStatus {
    Pending,
    Deposited,
    Cleared,
    Bounced,
    Unpaid,
    Cancelled,
}

impl ChequeStatus {
    pub const ALL: [ChequeStatus; 6] = [
        Self::Pending,
        Self::Deposited,
        Self::Cleared,
        Self::Bounced,
        Self::Unpaid,
        Self::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Deposited => "deposited",
            Self::Cleared => "cleared",
            Self::Bounced => "bounced",
            Self::Unpaid => "unpaid",
            Self::Cancelled => "cancelled",
        }
    }

    /// Still awaiting an outcome from the bank.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::Deposited)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_open()
    }

    pub fn is_bounce(&self) -> bool {
        matches!(self, Self::Bounced | Self::Unpaid)
    }

    /// Cleared and cancelled cheques are closed for good; bounced and unpaid
    /// ones may be presented again.
    pub fn can_transition_to(&self, next: ChequeStatus) -> bool {
        !matches!(self, Self::Cleared | Self::Cancelled) || *self == next
    }

    /// Message recorded in the notification trail when a cheque lands here.
    pub fn transition_message(&self) -> Option<&'static str> {
        match self {
            Self::Cleared => Some("Chèque encaissé avec succès"),
            Self::Bounced => Some("Chèque rejeté par la banque"),
            Self::Unpaid => Some("Chèque marqué comme impayé"),
            Self::Cancelled => Some("Chèque annulé"),
            Self::Pending | Self::Deposited => None,
        }
    }
}

impl fmt::Display for ChequeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChequeStatus {
    type Err = ChequeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .iter()
            .find(|st| st.as_str() == wanted)
            .copied()
            .ok_or_else(|| ChequeError::InvalidStatus(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientType {
    Individual,
    Company,
}

impl ClientType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Individual => "individual",
            Self::Company => "company",
        }
    }
}

impl fmt::Display for ClientType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClientType {
    type Err = ChequeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "individual" | "person" => Ok(Self::Individual),
            "company" | "business" => Ok(Self::Company),
            other => Err(ChequeError::Validation(format!("Unknown client type: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Accountant,
    Agent,
    Readonly,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Accountant => "accountant",
            Self::Agent => "agent",
            Self::Readonly => "readonly",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ChequeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "accountant" => Ok(Self::Accountant),
            "agent" => Ok(Self::Agent),
            "readonly" => Ok(Self::Readonly),
            other => Err(ChequeError::Validation(format!("Unknown role: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Bank {
    pub id: i64,
    pub name: String,
    pub code: Option<String>,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Branch {
    pub id: i64,
    pub bank_id: i64,
    pub bank_name: String,
    pub name: String,
    pub address: Option<String>,
    pub postal_code: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub active: bool,
}

#[derive(Debug, Clone, Default)]
pub struct NewBranch {
    pub bank_id: i64,
    pub name: String,
    pub address: Option<String>,
    pub postal_code: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Client {
    pub id: i64,
    pub client_type: ClientType,
    pub name: String,
    pub id_number: Option<String>,
    pub tax_id: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub active: bool,
}

#[derive(Debug, Clone)]
pub struct NewClient {
    pub client_type: ClientType,
    pub name: String,
    pub id_number: Option<String>,
    pub tax_id: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

impl NewClient {
    pub fn named(client_type: ClientType, name: &str) -> Self {
        Self {
            client_type,
            name: name.to_string(),
            id_number: None,
            tax_id: None,
            address: None,
            phone: None,
            email: None,
        }
    }
}

/// A cheque row joined with its client, branch and bank names.
#[derive(Debug, Clone, Serialize)]
pub struct Cheque {
    pub id: i64,
    pub cheque_number: String,
    pub amount: f64,
    pub currency: String,
    pub issue_date: String,
    pub due_date: String,
    pub status: ChequeStatus,
    pub client_id: Option<i64>,
    pub client_name: Option<String>,
    pub branch_id: i64,
    pub branch_name: Option<String>,
    pub bank_name: Option<String>,
    pub scan_path: Option<String>,
    pub depositor_name: Option<String>,
    pub invoice_number: Option<String>,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub created_by: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct NewCheque {
    pub cheque_number: String,
    pub amount: f64,
    pub currency: String,
    pub issue_date: String,
    pub due_date: String,
    pub client_id: Option<i64>,
    pub branch_id: i64,
    pub status: ChequeStatus,
    pub scan_path: Option<String>,
    pub depositor_name: Option<String>,
    pub invoice_number: Option<String>,
    pub invoice_date: Option<String>,
    pub notes: Option<String>,
    pub created_by: Option<i64>,
}

impl NewCheque {
    pub fn new(number: &str, amount: f64, issue_date: &str, due_date: &str, branch_id: i64) -> Self {
        Self {
            cheque_number: number.to_string(),
            amount,
            currency: "MAD".to_string(),
            issue_date: issue_date.to_string(),
            due_date: due_date.to_string(),
            client_id: None,
            branch_id,
            status: ChequeStatus::Pending,
            scan_path: None,
            depositor_name: None,
            invoice_number: None,
            invoice_date: None,
            notes: None,
            created_by: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub role: Role,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub active: bool,
    pub last_login: Option<String>,
}

/// The user on whose behalf an operation runs. Recorded in the audit trail.
#[derive(Debug, Clone)]
pub struct Actor {
    pub user_id: Option<i64>,
    pub username: String,
    pub role: Role,
    pub session_token: Option<String>,
}

impl Actor {
    pub fn system() -> Self {
        Self {
            user_id: None,
            username: "system".to_string(),
            role: Role::Admin,
            session_token: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub id: i64,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub cheque_id: Option<i64>,
    pub user_id: Option<i64>,
    pub is_read: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Login,
    Logout,
    Create,
    Read,
    Update,
    Delete,
    Export,
    Import,
    Backup,
    Restore,
    ConfigChange,
}

impl AuditAction {
    pub const ALL: [AuditAction; 11] = [
        Self::Login,
        Self::Logout,
        Self::Create,
        Self::Read,
        Self::Update,
        Self::Delete,
        Self::Export,
        Self::Import,
        Self::Backup,
        Self::Restore,
        Self::ConfigChange,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Logout => "logout",
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Export => "export",
            Self::Import => "import",
            Self::Backup => "backup",
            Self::Restore => "restore",
            Self::ConfigChange => "config_change",
        }
    }
}

impl FromStr for AuditAction {
    type Err = ChequeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|a| a.as_str() == s.trim())
            .copied()
            .ok_or_else(|| ChequeError::Validation(format!("Unknown audit action: {s}")))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub id: i64,
    pub timestamp: String,
    pub user_id: Option<i64>,
    pub username: String,
    pub action: AuditAction,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub details: Option<serde_json::Value>,
    pub success: bool,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub user_id: i64,
    pub username: String,
    pub role: Role,
    pub expires_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip_through_str() {
        for st in ChequeStatus::ALL {
            assert_eq!(st.as_str().parse::<ChequeStatus>().unwrap(), st);
        }
        assert!("encaisse".parse::<ChequeStatus>().is_err());
    }

    #[test]
    fn test_status_classes() {
        assert!(ChequeStatus::Pending.is_open());
        assert!(ChequeStatus::Deposited.is_open());
        assert!(ChequeStatus::Unpaid.is_terminal());
        assert!(ChequeStatus::Bounced.is_bounce());
        assert!(!ChequeStatus::Cleared.is_bounce());
    }

    #[test]
    fn test_closed_statuses_reject_transitions() {
        assert!(!ChequeStatus::Cleared.can_transition_to(ChequeStatus::Bounced));
        assert!(!ChequeStatus::Cancelled.can_transition_to(ChequeStatus::Pending));
        assert!(ChequeStatus::Bounced.can_transition_to(ChequeStatus::Deposited));
        assert!(ChequeStatus::Pending.can_transition_to(ChequeStatus::Cleared));
    }

    #[test]
    fn test_only_terminal_statuses_have_messages() {
        assert!(ChequeStatus::Pending.transition_message().is_none());
        assert!(ChequeStatus::Deposited.transition_message().is_none());
        assert!(ChequeStatus::Cleared.transition_message().is_some());
    }

    #[test]
    fn test_client_type_and_role_parse() {
        assert_eq!("Company".parse::<ClientType>().unwrap(), ClientType::Company);
        assert!("tribe".parse::<ClientType>().is_err());
        assert_eq!("accountant".parse::<Role>().unwrap(), Role::Accountant);
        assert!("root".parse::<Role>().is_err());
    }
}
