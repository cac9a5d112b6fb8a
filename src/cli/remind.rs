use colored::Colorize;

use crate::error::Result;
use crate::reminders::{self, Dispatcher, DryRun, HttpSmsGateway, Notifier, SmtpMailer};
use crate::security::{self, Permission};
use crate::settings::{open_secret, Settings, SEALED_PREFIX};

use super::Context;

/// Real channels from settings, with sealed credentials opened.
fn dispatcher(settings: &Settings) -> Result<Dispatcher> {
    let needs_key = settings.sms.iter().any(|s| s.api_key.starts_with(SEALED_PREFIX))
        || settings.email.iter().any(|e| e.password.starts_with(SEALED_PREFIX));
    let key = if needs_key {
        Some(security::load_or_create_key(&settings.key_path())?)
    } else {
        None
    };
    let open = |stored: &str| match &key {
        Some(k) => open_secret(k, stored),
        None => Ok(stored.to_string()),
    };

    let sms = match &settings.sms {
        Some(cfg) => {
            let mut cfg = cfg.clone();
            cfg.api_key = open(&cfg.api_key)?;
            Some(HttpSmsGateway::new(cfg)?)
        }
        None => None,
    };
    let email = match &settings.email {
        Some(cfg) => {
            let mut cfg = cfg.clone();
            cfg.password = open(&cfg.password)?;
            Some(SmtpMailer::new(cfg))
        }
        None => None,
    };
    if sms.is_none() && email.is_none() {
        log::warn!("no SMS gateway or SMTP server configured; reminders will only be counted");
    }
    Ok(Dispatcher { sms, email })
}

pub fn run(days: Option<i64>, dry_run: bool) -> Result<()> {
    let ctx = Context::open()?;
    ctx.authorize(Permission::ChequeUpdate)?;
    let days = days.unwrap_or(ctx.settings.notification_days);

    let notifier: Box<dyn Notifier> = if dry_run {
        Box::new(DryRun)
    } else {
        Box::new(dispatcher(&ctx.settings)?)
    };
    let summary = reminders::send_due_reminders(&ctx.conn, notifier.as_ref(), super::today(), days)?;

    let heading = if dry_run { "Dry run".yellow() } else { "Reminders".green() };
    println!("{heading}: {} cheque(s) due within {days} day(s)", summary.total_cheques);
    println!("  SMS sent:            {}", summary.sms_sent);
    println!("  Emails sent:         {}", summary.emails_sent);
    println!("  Already sent today:  {}", summary.skipped_already_sent);
    Ok(())
}
