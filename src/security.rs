//! Password hashing, role permissions, sessions and at-rest encryption.

use std::io::Write;
use std::path::Path;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use chrono::NaiveDateTime;
use rand::RngCore;
use rusqlite::{Connection, OptionalExtension};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::audit::{self, AuditEvent};
use crate::error::{ChequeError, Result};
use crate::models::{Actor, AuditAction, Role, Session};

pub const PBKDF2_ITERATIONS: u32 = 100_000;
const SALT_LEN: usize = 32;
const HASH_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const MAX_INPUT_LEN: usize = 1000;

fn ts(dt: NaiveDateTime) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

// ---------------------------------------------------------------------------
// Passwords
// ---------------------------------------------------------------------------

fn derive(password: &str, salt: &[u8], iterations: u32) -> [u8; HASH_LEN] {
    let mut out = [0u8; HASH_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut out);
    out
}

/// Hash as `pbkdf2$<iterations>$<salt b64>$<hash b64>`.
pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    let hash = derive(password, &salt, PBKDF2_ITERATIONS);
    format!("pbkdf2${PBKDF2_ITERATIONS}${}${}", B64.encode(salt), B64.encode(hash))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Malformed stored hashes never verify.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let parts: Vec<&str> = stored.split('$').collect();
    let [scheme, iterations, salt, hash] = parts.as_slice() else {
        return false;
    };
    if *scheme != "pbkdf2" {
        return false;
    }
    let (Ok(iterations), Ok(salt), Ok(expected)) =
        (iterations.parse::<u32>(), B64.decode(salt), B64.decode(hash))
    else {
        return false;
    };
    constant_time_eq(&derive(password, &salt, iterations), &expected)
}

#[derive(Debug, Clone)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub require_uppercase: bool,
    pub require_lowercase: bool,
    pub require_digit: bool,
    pub require_special: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 8,
            require_uppercase: true,
            require_lowercase: true,
            require_digit: true,
            require_special: true,
        }
    }
}

const SPECIAL_CHARS: &str = "!@#$%^&*()_+-=[]{}|;:,.<>?";

/// Every rule the password breaks; empty when it is acceptable.
pub fn validate_password(password: &str, policy: &PasswordPolicy) -> Vec<String> {
    let mut errors = Vec::new();
    if password.chars().count() < policy.min_length {
        errors.push(format!(
            "Le mot de passe doit contenir au moins {} caractères",
            policy.min_length
        ));
    }
    if policy.require_uppercase && !password.chars().any(char::is_uppercase) {
        errors.push("Le mot de passe doit contenir au moins une majuscule".to_string());
    }
    if policy.require_lowercase && !password.chars().any(char::is_lowercase) {
        errors.push("Le mot de passe doit contenir au moins une minuscule".to_string());
    }
    if policy.require_digit && !password.chars().any(|c| c.is_ascii_digit()) {
        errors.push("Le mot de passe doit contenir au moins un chiffre".to_string());
    }
    if policy.require_special && !password.chars().any(|c| SPECIAL_CHARS.contains(c)) {
        errors.push("Le mot de passe doit contenir au moins un caractère spécial".to_string());
    }
    errors
}

// ---------------------------------------------------------------------------
// Permissions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    ChequeCreate,
    ChequeRead,
    ChequeUpdate,
    ChequeDelete,
    ClientCreate,
    ClientRead,
    ClientUpdate,
    ClientDelete,
    BankCreate,
    BankRead,
    BankUpdate,
    BankDelete,
    UserCreate,
    UserRead,
    UserUpdate,
    UserDelete,
    ReportGenerate,
    ReportExport,
    SystemBackup,
    SystemRestore,
    SystemConfigure,
    AuditRead,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ChequeCreate => "cheque.create",
            Self::ChequeRead => "cheque.read",
            Self::ChequeUpdate => "cheque.update",
            Self::ChequeDelete => "cheque.delete",
            Self::ClientCreate => "client.create",
            Self::ClientRead => "client.read",
            Self::ClientUpdate => "client.update",
            Self::ClientDelete => "client.delete",
            Self::BankCreate => "bank.create",
            Self::BankRead => "bank.read",
            Self::BankUpdate => "bank.update",
            Self::BankDelete => "bank.delete",
            Self::UserCreate => "user.create",
            Self::UserRead => "user.read",
            Self::UserUpdate => "user.update",
            Self::UserDelete => "user.delete",
            Self::ReportGenerate => "report.generate",
            Self::ReportExport => "report.export",
            Self::SystemBackup => "system.backup",
            Self::SystemRestore => "system.restore",
            Self::SystemConfigure => "system.configure",
            Self::AuditRead => "audit.read",
        }
    }
}

const ACCOUNTANT: &[Permission] = &[
    Permission::ChequeCreate,
    Permission::ChequeRead,
    Permission::ChequeUpdate,
    Permission::ClientCreate,
    Permission::ClientRead,
    Permission::ClientUpdate,
    Permission::BankRead,
    Permission::ReportGenerate,
    Permission::ReportExport,
    Permission::SystemBackup,
];

const AGENT: &[Permission] = &[
    Permission::ChequeCreate,
    Permission::ChequeRead,
    Permission::ChequeUpdate,
    Permission::ClientRead,
    Permission::ClientUpdate,
    Permission::BankRead,
    Permission::ReportGenerate,
];

const READONLY: &[Permission] = &[
    Permission::ChequeRead,
    Permission::ClientRead,
    Permission::BankRead,
    Permission::ReportGenerate,
];

pub fn has_permission(role: Role, permission: Permission) -> bool {
    match role {
        Role::Admin => true,
        Role::Accountant => ACCOUNTANT.contains(&permission),
        Role::Agent => AGENT.contains(&permission),
        Role::Readonly => READONLY.contains(&permission),
    }
}

pub fn require_permission(actor: &Actor, permission: Permission) -> Result<()> {
    if has_permission(actor.role, permission) {
        Ok(())
    } else {
        log::warn!("{} ({}) denied {}", actor.username, actor.role, permission.as_str());
        Err(ChequeError::PermissionDenied(format!(
            "role '{}' cannot {}",
            actor.role,
            permission.as_str()
        )))
    }
}

// ---------------------------------------------------------------------------
// Encryption
// ---------------------------------------------------------------------------

/// Write `contents` to a file only the owner can read. The file is created
/// with mode 0600, and an existing file is tightened before it is rewritten.
pub fn write_private(path: &Path, contents: &[u8]) -> Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }
    file.write_all(contents)?;
    Ok(())
}

/// Read the 32-byte key at `path`, creating it (mode 0600) on first use.
pub fn load_or_create_key(path: &Path) -> Result<Zeroizing<[u8; 32]>> {
    if path.exists() {
        let raw = Zeroizing::new(std::fs::read(path)?);
        let key: [u8; 32] = raw
            .as_slice()
            .try_into()
            .map_err(|_| ChequeError::Crypto(format!("key file {} is not 32 bytes", path.display())))?;
        return Ok(Zeroizing::new(key));
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let generated = Aes256Gcm::generate_key(&mut OsRng);
    let mut key = Zeroizing::new([0u8; 32]);
    key.copy_from_slice(generated.as_slice());
    write_private(path, key.as_slice())?;
    log::info!("created encryption key at {}", path.display());
    Ok(key)
}

/// AES-256-GCM with a fresh nonce; returns base64(nonce || ciphertext).
pub fn encrypt(key: &[u8; 32], plaintext: &[u8]) -> Result<String> {
    let cipher = Aes256Gcm::new(key.into());
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| ChequeError::Crypto(e.to_string()))?;
    let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(nonce.as_slice());
    sealed.extend_from_slice(&ciphertext);
    Ok(B64.encode(sealed))
}

pub fn decrypt(key: &[u8; 32], sealed: &str) -> Result<Vec<u8>> {
    let raw = B64
        .decode(sealed.trim())
        .map_err(|e| ChequeError::Crypto(e.to_string()))?;
    if raw.len() <= NONCE_LEN {
        return Err(ChequeError::Crypto("ciphertext too short".to_string()));
    }
    let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new(key.into());
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| ChequeError::Crypto("decryption failed: wrong key or tampered data".to_string()))
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SessionPolicy {
    pub timeout_secs: i64,
    pub max_login_attempts: i64,
    pub lockout_secs: i64,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            timeout_secs: 3600,
            max_login_attempts: 5,
            lockout_secs: 900,
        }
    }
}

/// Failed logins for `username` inside the lockout window ending at `now`.
pub fn login_attempts(conn: &Connection, username: &str, policy: &SessionPolicy, now: NaiveDateTime) -> Result<i64> {
    let since = ts(now - chrono::Duration::seconds(policy.lockout_secs));
    Ok(conn.query_row(
        "SELECT count(*) FROM audit_log WHERE username = ?1 AND action = 'login' AND success = 0 AND timestamp > ?2",
        rusqlite::params![username, since],
        |r| r.get(0),
    )?)
}

fn new_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Authenticate and open a session. Every attempt is audited; too many
/// recent failures lock the account until the window passes.
pub fn login(
    conn: &Connection,
    username: &str,
    password: &str,
    policy: &SessionPolicy,
    now: NaiveDateTime,
) -> Result<Session> {
    let username = username.trim();
    if login_attempts(conn, username, policy, now)? >= policy.max_login_attempts {
        return Err(ChequeError::LockedOut(username.to_string()));
    }

    let row: Option<(i64, String, String, bool)> = conn
        .query_row(
            "SELECT id, password_hash, role, active FROM users WHERE username = ?1",
            [username],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
        )
        .optional()?;

    let anonymous = Actor {
        user_id: row.as_ref().map(|r| r.0),
        username: username.to_string(),
        role: Role::Readonly,
        session_token: None,
    };
    let failure = |reason: &str| -> Result<Session> {
        audit::log_event(conn, &AuditEvent::new(&anonymous, AuditAction::Login).failed(reason))?;
        log::warn!("failed login for '{username}': {reason}");
        Err(ChequeError::Auth("invalid username or password".to_string()))
    };

    let Some((user_id, hash, raw_role, active)) = row else {
        return failure("unknown user");
    };
    if !active {
        return failure("inactive user");
    }
    if !verify_password(password, &hash) {
        return failure("bad password");
    }
    let role: Role = raw_role.parse()?;

    let token = new_token();
    let expires_at = ts(now + chrono::Duration::seconds(policy.timeout_secs));
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO sessions (user_id, token, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![user_id, token, ts(now), expires_at],
    )?;
    tx.execute("UPDATE users SET last_login = ?1 WHERE id = ?2", rusqlite::params![ts(now), user_id])?;
    let actor = Actor {
        user_id: Some(user_id),
        username: username.to_string(),
        role,
        session_token: Some(token.clone()),
    };
    audit::log_event(&tx, &AuditEvent::new(&actor, AuditAction::Login))?;
    tx.commit()?;
    log::info!("user '{username}' logged in");

    Ok(Session {
        token,
        user_id,
        username: username.to_string(),
        role,
        expires_at,
    })
}

/// The live session for `token`. Expired sessions are deactivated and
/// reported as absent, as are sessions of deactivated users.
pub fn validate_session(conn: &Connection, token: &str, now: NaiveDateTime) -> Result<Option<Session>> {
    let row: Option<(i64, String, String, String, bool)> = conn
        .query_row(
            "SELECT s.user_id, s.expires_at, u.username, u.role, u.active FROM sessions s \
             JOIN users u ON s.user_id = u.id WHERE s.token = ?1 AND s.active = 1",
            [token],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?)),
        )
        .optional()?;
    let Some((user_id, expires_at, username, raw_role, active)) = row else {
        return Ok(None);
    };
    if !active || expires_at.as_str() < ts(now).as_str() {
        conn.execute("UPDATE sessions SET active = 0 WHERE token = ?1", [token])?;
        log::info!("session for '{username}' expired");
        return Ok(None);
    }
    Ok(Some(Session {
        token: token.to_string(),
        user_id,
        username,
        role: raw_role.parse()?,
        expires_at,
    }))
}

pub fn logout(conn: &Connection, token: &str) -> Result<bool> {
    let session = conn
        .query_row(
            "SELECT s.user_id, u.username, u.role FROM sessions s JOIN users u ON s.user_id = u.id \
             WHERE s.token = ?1 AND s.active = 1",
            [token],
            |r| Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?, r.get::<_, String>(2)?)),
        )
        .optional()?;
    let Some((user_id, username, raw_role)) = session else {
        return Ok(false);
    };
    let tx = conn.unchecked_transaction()?;
    tx.execute("UPDATE sessions SET active = 0 WHERE token = ?1", [token])?;
    let actor = Actor {
        user_id: Some(user_id),
        username,
        role: raw_role.parse()?,
        session_token: Some(token.to_string()),
    };
    audit::log_event(&tx, &AuditEvent::new(&actor, AuditAction::Logout))?;
    tx.commit()?;
    Ok(true)
}

pub fn cleanup_expired_sessions(conn: &Connection, now: NaiveDateTime) -> Result<usize> {
    let cleaned = conn.execute(
        "UPDATE sessions SET active = 0 WHERE active = 1 AND expires_at < ?1",
        [ts(now)],
    )?;
    if cleaned > 0 {
        log::info!("cleaned up {cleaned} expired sessions");
    }
    Ok(cleaned)
}

impl From<&Session> for Actor {
    fn from(s: &Session) -> Self {
        Actor {
            user_id: Some(s.user_id),
            username: s.username.clone(),
            role: s.role,
            session_token: Some(s.token.clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// Input hygiene
// ---------------------------------------------------------------------------

const DANGEROUS: [char; 10] = ['<', '>', '"', '\'', '&', ';', '(', ')', '|', '`'];

/// True when `input` holds none of the characters `sanitize_input` strips.
pub fn is_clean_input(input: &str) -> bool {
    !input.contains(DANGEROUS)
}

/// Strip characters commonly used for injection and cap the length.
pub fn sanitize_input(input: &str) -> String {
    let cleaned: String = input
        .chars()
        .filter(|c| !DANGEROUS.contains(c))
        .take(MAX_INPUT_LEN)
        .collect();
    cleaned.trim().to_string()
}

pub const MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

const EXECUTABLE_SIGNATURES: [&[u8]; 3] = [b"\x4d\x5a", b"\x7f\x45\x4c\x46", b"\xfe\xed\xfa"];

/// Reject files with a disallowed extension, over 10 MB, or starting with
/// an executable header.
pub fn validate_upload(path: &Path, allowed_extensions: &[&str]) -> Result<()> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    if !allowed_extensions.contains(&ext.as_str()) {
        return Err(ChequeError::Validation(format!("File type not allowed: .{ext}")));
    }
    let size = std::fs::metadata(path)?.len();
    if size > MAX_UPLOAD_BYTES {
        return Err(ChequeError::Validation(format!(
            "File too large ({}, max {})",
            crate::fmt::format_bytes(size),
            crate::fmt::format_bytes(MAX_UPLOAD_BYTES)
        )));
    }
    let mut header = [0u8; 8];
    let read = {
        use std::io::Read;
        let mut f = std::fs::File::open(path)?;
        f.read(&mut header)?
    };
    if EXECUTABLE_SIGNATURES.iter().any(|sig| header[..read].starts_with(sig)) {
        return Err(ChequeError::Validation("Executable file rejected".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::test_db;
    use crate::registry;

    fn now() -> NaiveDateTime {
        chrono::Utc::now().naive_utc()
    }

    fn add_user(conn: &Connection, name: &str, password: &str, role: Role) -> i64 {
        registry::add_user(conn, name, &hash_password(password), role, None, None).unwrap()
    }

    #[test]
    fn test_hash_and_verify() {
        let stored = hash_password("S3cret!pass");
        assert!(stored.starts_with("pbkdf2$100000$"));
        assert!(verify_password("S3cret!pass", &stored));
        assert!(!verify_password("s3cret!pass", &stored));
        assert_ne!(stored, hash_password("S3cret!pass"));
    }

    #[test]
    fn test_verify_rejects_malformed_hashes() {
        assert!(!verify_password("x", ""));
        assert!(!verify_password("x", "md5$1$abc$def"));
        assert!(!verify_password("x", "pbkdf2$notanumber$AAAA$AAAA"));
    }

    #[test]
    fn test_password_policy() {
        let policy = PasswordPolicy::default();
        assert!(validate_password("Str0ng!pass", &policy).is_empty());
        let errors = validate_password("weak", &policy);
        assert_eq!(errors.len(), 4);
        let relaxed = PasswordPolicy { require_special: false, ..Default::default() };
        assert!(validate_password("Str0ngpass", &relaxed).is_empty());
    }

    #[test]
    fn test_role_permissions() {
        assert!(has_permission(Role::Admin, Permission::AuditRead));
        assert!(has_permission(Role::Accountant, Permission::ReportExport));
        assert!(!has_permission(Role::Accountant, Permission::UserCreate));
        assert!(has_permission(Role::Agent, Permission::ChequeUpdate));
        assert!(!has_permission(Role::Agent, Permission::ClientCreate));
        assert!(has_permission(Role::Readonly, Permission::ChequeRead));
        assert!(!has_permission(Role::Readonly, Permission::ChequeCreate));

        let reader = Actor { user_id: None, username: "r".into(), role: Role::Readonly, session_token: None };
        assert!(matches!(
            require_permission(&reader, Permission::ChequeDelete),
            Err(ChequeError::PermissionDenied(_))
        ));
    }

    #[test]
    fn test_encrypt_roundtrip_and_tamper() {
        let dir = tempfile::tempdir().unwrap();
        let key_path = dir.path().join("keys").join("secret.key");
        let key = load_or_create_key(&key_path).unwrap();
        let again = load_or_create_key(&key_path).unwrap();
        assert_eq!(*key, *again);

        let sealed = encrypt(&key, b"RIB 0123456789").unwrap();
        assert_eq!(decrypt(&key, &sealed).unwrap(), b"RIB 0123456789");
        assert_ne!(encrypt(&key, b"RIB 0123456789").unwrap(), sealed);

        let other = [1u8; 32];
        assert!(matches!(decrypt(&other, &sealed), Err(ChequeError::Crypto(_))));
        assert!(decrypt(&key, "AAAA").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_key_file_is_private() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let key_path = dir.path().join("secret.key");
        load_or_create_key(&key_path).unwrap();
        let mode = std::fs::metadata(&key_path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_write_private_tightens_existing_file() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token");
        std::fs::write(&path, "old").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();
        write_private(&path, b"new").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
        assert_eq!(std::fs::metadata(&path).unwrap().permissions().mode() & 0o777, 0o600);
    }

    #[test]
    fn test_login_session_lifecycle() {
        let (_dir, conn) = test_db();
        add_user(&conn, "amina", "Str0ng!pass", Role::Accountant);
        let policy = SessionPolicy::default();

        let session = login(&conn, "amina", "Str0ng!pass", &policy, now()).unwrap();
        assert_eq!(session.role, Role::Accountant);
        assert_eq!(session.token.len(), 64);
        assert!(registry::find_user(&conn, "amina").unwrap().last_login.is_some());

        let live = validate_session(&conn, &session.token, now()).unwrap().unwrap();
        assert_eq!(live.username, "amina");

        assert!(logout(&conn, &session.token).unwrap());
        assert!(validate_session(&conn, &session.token, now()).unwrap().is_none());
        assert!(!logout(&conn, &session.token).unwrap());
    }

    #[test]
    fn test_expired_session_is_deactivated() {
        let (_dir, conn) = test_db();
        add_user(&conn, "omar", "Str0ng!pass", Role::Agent);
        let policy = SessionPolicy { timeout_secs: 60, ..Default::default() };
        let start = now();
        let session = login(&conn, "omar", "Str0ng!pass", &policy, start).unwrap();

        let later = start + chrono::Duration::seconds(120);
        assert!(validate_session(&conn, &session.token, later).unwrap().is_none());
        let active: bool = conn
            .query_row("SELECT active FROM sessions WHERE token = ?1", [&session.token], |r| r.get(0))
            .unwrap();
        assert!(!active);
    }

    #[test]
    fn test_cleanup_expired_sessions() {
        let (_dir, conn) = test_db();
        add_user(&conn, "omar", "Str0ng!pass", Role::Agent);
        let policy = SessionPolicy { timeout_secs: 60, ..Default::default() };
        let start = now();
        login(&conn, "omar", "Str0ng!pass", &policy, start).unwrap();
        assert_eq!(cleanup_expired_sessions(&conn, start).unwrap(), 0);
        assert_eq!(cleanup_expired_sessions(&conn, start + chrono::Duration::hours(1)).unwrap(), 1);
    }

    #[test]
    fn test_failed_logins_lock_account() {
        let (_dir, conn) = test_db();
        add_user(&conn, "karim", "Str0ng!pass", Role::Agent);
        let policy = SessionPolicy { max_login_attempts: 3, ..Default::default() };

        for _ in 0..3 {
            assert!(matches!(login(&conn, "karim", "wrong", &policy, now()), Err(ChequeError::Auth(_))));
        }
        assert_eq!(login_attempts(&conn, "karim", &policy, now()).unwrap(), 3);
        assert!(matches!(
            login(&conn, "karim", "Str0ng!pass", &policy, now()),
            Err(ChequeError::LockedOut(_))
        ));
    }

    #[test]
    fn test_unknown_and_inactive_users_fail_alike() {
        let (_dir, conn) = test_db();
        add_user(&conn, "sara", "Str0ng!pass", Role::Agent);
        registry::deactivate_user(&conn, "sara").unwrap();
        let policy = SessionPolicy::default();
        let a = login(&conn, "sara", "Str0ng!pass", &policy, now()).unwrap_err();
        let b = login(&conn, "ghost", "whatever", &policy, now()).unwrap_err();
        assert_eq!(a.to_string(), b.to_string());
    }

    #[test]
    fn test_sanitize_input() {
        assert_eq!(sanitize_input("  <b>Atlas & Co</b>; "), "bAtlas  Co/b");
        assert_eq!(sanitize_input(&"x".repeat(1500)).len(), 1000);
        assert_eq!(sanitize_input(""), "");
    }

    #[test]
    fn test_is_clean_input() {
        assert!(is_clean_input("CHQ-0042/B"));
        assert!(!is_clean_input("A(1)"));
        assert!(!is_clean_input("x;y"));
    }

    #[test]
    fn test_validate_upload() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("cheques.csv");
        std::fs::write(&csv, "cheque_number,amount\n").unwrap();
        validate_upload(&csv, &["csv", "xlsx"]).unwrap();

        let txt = dir.path().join("notes.txt");
        std::fs::write(&txt, "hello").unwrap();
        assert!(validate_upload(&txt, &["csv"]).is_err());

        let exe = dir.path().join("payload.csv");
        std::fs::write(&exe, b"MZ\x90\x00rest").unwrap();
        assert!(validate_upload(&exe, &["csv"]).is_err());
    }
}
