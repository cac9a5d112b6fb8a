use zeroize::Zeroizing;

use crate::audit::{self, AuditEvent};
use crate::error::{ChequeError, Result};
use crate::models::AuditAction;
use crate::security::{self, Permission};
use crate::settings::seal_secret;

use super::Context;

/// Prompt for a credential and print its sealed form for settings.json.
pub fn run() -> Result<()> {
    let ctx = Context::open()?;
    let actor = ctx.authorize(Permission::SystemConfigure)?;
    let plain = Zeroizing::new(rpassword::prompt_password("Secret to seal: ")?);
    if plain.is_empty() {
        return Err(ChequeError::Validation("Nothing to seal".to_string()));
    }
    let key = security::load_or_create_key(&ctx.settings.key_path())?;
    let sealed = seal_secret(&key, &plain)?;
    audit::log_event(&ctx.conn, &AuditEvent::new(&actor, AuditAction::Update).resource("settings", "secret"))?;
    println!("{sealed}");
    Ok(())
}
