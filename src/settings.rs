use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::bank_api::BankApiConfig;
use crate::error::{ChequeError, Result};
use crate::security::{self, SessionPolicy};

/// Prefix marking a secret stored encrypted with the local key file.
pub const SEALED_PREFIX: &str = "enc:";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsConfig {
    pub api_url: String,
    pub api_key: String,
    #[serde(default = "default_sender_id")]
    pub sender_id: String,
}

fn default_sender_id() -> String {
    "CHEQUES".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub smtp_server: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub username: String,
    pub password: String,
    pub sender: String,
}

fn default_smtp_port() -> u16 {
    587
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub data_dir: String,
    #[serde(default = "default_notification_days")]
    pub notification_days: i64,
    #[serde(default = "default_currency")]
    pub default_currency: String,
    #[serde(default = "default_session_timeout")]
    pub session_timeout_secs: i64,
    #[serde(default = "default_max_login_attempts")]
    pub max_login_attempts: i64,
    #[serde(default = "default_lockout")]
    pub lockout_secs: i64,
    #[serde(default)]
    pub key_file: Option<String>,
    #[serde(default)]
    pub sms: Option<SmsConfig>,
    #[serde(default)]
    pub email: Option<EmailConfig>,
    #[serde(default)]
    pub bank_apis: Vec<BankApiConfig>,
}

fn default_notification_days() -> i64 {
    3
}

fn default_currency() -> String {
    "MAD".to_string()
}

fn default_session_timeout() -> i64 {
    3600
}

fn default_max_login_attempts() -> i64 {
    5
}

fn default_lockout() -> i64 {
    900
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir().to_string_lossy().to_string(),
            notification_days: default_notification_days(),
            default_currency: default_currency(),
            session_timeout_secs: default_session_timeout(),
            max_login_attempts: default_max_login_attempts(),
            lockout_secs: default_lockout(),
            key_file: None,
            sms: None,
            email: None,
            bank_apis: Vec::new(),
        }
    }
}

impl Settings {
    pub fn session_policy(&self) -> SessionPolicy {
        SessionPolicy {
            timeout_secs: self.session_timeout_secs,
            max_login_attempts: self.max_login_attempts,
            lockout_secs: self.lockout_secs,
        }
    }

    pub fn key_path(&self) -> PathBuf {
        match &self.key_file {
            Some(p) => PathBuf::from(shellexpand_path(p)),
            None => self.data_dir().join("secret.key"),
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.data_dir)
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir().join(crate::db::DB_FILE)
    }
}

fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("chequeman")
}

fn settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Documents")
        .join("chequeman")
}

pub fn load_settings() -> Settings {
    let path = settings_path();
    if path.exists() {
        let content = std::fs::read_to_string(&path).unwrap_or_default();
        serde_json::from_str(&content).unwrap_or_else(|e| {
            log::warn!("ignoring unreadable {}: {e}", path.display());
            Settings::default()
        })
    } else {
        Settings::default()
    }
}

pub fn save_settings(settings: &Settings) -> Result<()> {
    std::fs::create_dir_all(config_dir())?;
    write_settings(&settings_path(), settings)
}

// The file may carry gateway credentials.
fn write_settings(path: &Path, settings: &Settings) -> Result<()> {
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| ChequeError::Settings(e.to_string()))?;
    security::write_private(path, format!("{json}\n").as_bytes())
}

pub fn settings_file_exists() -> bool {
    settings_path().exists()
}

pub fn shellexpand_path(path: &str) -> String {
    if path.starts_with('~') {
        if let Some(home) = dirs::home_dir() {
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    std::fs::canonicalize(path)
        .unwrap_or_else(|_| PathBuf::from(path))
        .to_string_lossy()
        .to_string()
}

// ---------------------------------------------------------------------------
// Secrets
// ---------------------------------------------------------------------------

/// Encrypt a credential for storage in settings.json.
pub fn seal_secret(key: &[u8; 32], plain: &str) -> Result<String> {
    Ok(format!("{SEALED_PREFIX}{}", security::encrypt(key, plain.as_bytes())?))
}

/// Plain value of a credential, decrypting it when it was sealed.
pub fn open_secret(key: &[u8; 32], stored: &str) -> Result<String> {
    match stored.strip_prefix(SEALED_PREFIX) {
        Some(sealed) => String::from_utf8(security::decrypt(key, sealed)?)
            .map_err(|e| ChequeError::Crypto(e.to_string())),
        None => Ok(stored.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Session token
// ---------------------------------------------------------------------------

fn session_file(data_dir: &Path) -> PathBuf {
    data_dir.join("session")
}

pub fn save_session_token(data_dir: &Path, token: &str) -> Result<()> {
    std::fs::create_dir_all(data_dir)?;
    let path = session_file(data_dir);
    security::write_private(&path, token.as_bytes())
}

pub fn load_session_token(data_dir: &Path) -> Option<String> {
    std::fs::read_to_string(session_file(data_dir))
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn clear_session_token(data_dir: &Path) -> Result<()> {
    let path = session_file(data_dir);
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    Ok(())
}
