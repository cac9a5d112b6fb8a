//! Payment reminders over SMS and email.

use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;

use chrono::NaiveDate;
use regex::Regex;
use rusqlite::Connection;
use serde::Serialize;

use crate::cheques;
use crate::error::{ChequeError, Result};
use crate::fmt::money;
use crate::notifications::{self, KIND_PAYMENT_REMINDER};
use crate::registry;
use crate::settings::{EmailConfig, SmsConfig};

const SMS_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Sms,
    Email,
}

#[derive(Debug, Clone, Copy)]
pub struct Template {
    pub id: &'static str,
    pub name: &'static str,
    pub channel: Channel,
    pub subject: &'static str,
    pub body: &'static str,
}

pub const PAYMENT_REMINDER_SMS: Template = Template {
    id: "payment_reminder_sms",
    name: "Rappel de paiement SMS",
    channel: Channel::Sms,
    subject: "",
    body: "Cher(e) {client_name}, votre chèque n°{cheque_number} d'un montant de {amount} MAD arrive à \
           échéance le {due_date}. Merci de vous assurer de la provision suffisante.",
};

pub const PAYMENT_REMINDER_EMAIL: Template = Template {
    id: "payment_reminder_email",
    name: "Rappel de paiement Email",
    channel: Channel::Email,
    subject: "Rappel d'échéance - Chèque n°{cheque_number}",
    body: "Cher(e) {client_name},\n\n\
           Nous vous rappelons que votre chèque n°{cheque_number} d'un montant de {amount} MAD \
           arrive à échéance le {due_date}.\n\n\
           Merci de vous assurer que votre compte dispose de la provision suffisante.\n\n\
           Cordialement,\nL'équipe de gestion\n",
};

pub const CHEQUE_BOUNCED_SMS: Template = Template {
    id: "cheque_bounced_sms",
    name: "Chèque rejeté SMS",
    channel: Channel::Sms,
    subject: "",
    body: "URGENT: Votre chèque n°{cheque_number} de {amount} MAD a été rejeté. Contactez-nous au plus vite.",
};

pub const CHEQUE_PROCESSED_EMAIL: Template = Template {
    id: "cheque_processed_email",
    name: "Chèque traité Email",
    channel: Channel::Email,
    subject: "Confirmation de traitement - Chèque n°{cheque_number}",
    body: "Cher(e) {client_name},\n\n\
           Nous vous confirmons que votre chèque n°{cheque_number} d'un montant de {amount} MAD \
           a été traité avec succès le {processing_date}.\n\n\
           Statut: {status}\n\n\
           Cordialement,\nL'équipe de gestion\n",
};

pub const TEMPLATES: [Template; 4] = [
    PAYMENT_REMINDER_SMS,
    PAYMENT_REMINDER_EMAIL,
    CHEQUE_BOUNCED_SMS,
    CHEQUE_PROCESSED_EMAIL,
];

pub fn template(id: &str) -> Option<Template> {
    TEMPLATES.iter().find(|t| t.id == id).copied()
}

/// Substitute `{name}` placeholders. Unknown placeholders are left as is.
pub fn render(template: &str, vars: &HashMap<&str, String>) -> String {
    let mut out = template.to_string();
    for (key, value) in vars {
        out = out.replace(&format!("{{{key}}}"), value);
    }
    out
}

// ---------------------------------------------------------------------------
// Contact validation
// ---------------------------------------------------------------------------

fn phone_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\+212|0)[5-7]\d{8}$").expect("valid phone pattern"))
}

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("valid email pattern")
    })
}

/// Moroccan mobile or landline number, spaces and dashes ignored.
pub fn is_valid_phone(phone: &str) -> bool {
    let compact: String = phone.chars().filter(|c| *c != ' ' && *c != '-').collect();
    phone_re().is_match(&compact)
}

pub fn is_valid_email(email: &str) -> bool {
    email_re().is_match(email.trim())
}

// ---------------------------------------------------------------------------
// Channels
// ---------------------------------------------------------------------------

pub trait Notifier {
    fn send_sms(&self, to: &str, message: &str) -> Result<()>;
    fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<()>;

    /// Dry runs leave no trace in the notification table.
    fn is_dry_run(&self) -> bool {
        false
    }
}

pub struct HttpSmsGateway {
    client: reqwest::blocking::Client,
    config: SmsConfig,
}

impl HttpSmsGateway {
    pub fn new(config: SmsConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder().timeout(SMS_TIMEOUT).build()?;
        Ok(Self { client, config })
    }

    fn send(&self, to: &str, message: &str) -> Result<()> {
        let payload = serde_json::json!({
            "to": to,
            "message": message,
            "from": self.config.sender_id,
        });
        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()?;
        if !response.status().is_success() {
            return Err(ChequeError::Other(format!("SMS gateway answered {}", response.status())));
        }
        log::info!("SMS reminder sent to {to}");
        Ok(())
    }
}

fn mail_err(e: impl std::fmt::Display) -> ChequeError {
    ChequeError::Mail(e.to_string())
}

pub struct SmtpMailer {
    config: EmailConfig,
}

impl SmtpMailer {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        use lettre::message::header::ContentType;
        use lettre::message::Mailbox;
        use lettre::transport::smtp::authentication::Credentials;
        use lettre::{Message, SmtpTransport, Transport};

        let from: Mailbox = self.config.sender.parse().map_err(mail_err)?;
        let to_box: Mailbox = to.parse().map_err(mail_err)?;
        let message = Message::builder()
            .from(from)
            .to(to_box)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(mail_err)?;
        let transport = SmtpTransport::starttls_relay(&self.config.smtp_server)
            .map_err(mail_err)?
            .port(self.config.smtp_port)
            .credentials(Credentials::new(
                self.config.username.clone(),
                self.config.password.clone(),
            ))
            .build();
        transport.send(&message).map_err(mail_err)?;
        log::info!("email reminder sent to {to}");
        Ok(())
    }
}

/// Sends through whichever channels are configured.
pub struct Dispatcher {
    pub sms: Option<HttpSmsGateway>,
    pub email: Option<SmtpMailer>,
}

impl Notifier for Dispatcher {
    fn send_sms(&self, to: &str, message: &str) -> Result<()> {
        match &self.sms {
            Some(gateway) => gateway.send(to, message),
            None => Err(ChequeError::Other("SMS gateway not configured".to_string())),
        }
    }

    fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        match &self.email {
            Some(mailer) => mailer.send(to, subject, body),
            None => Err(ChequeError::Other("email not configured".to_string())),
        }
    }
}

/// Logs what would be sent.
pub struct DryRun;

impl Notifier for DryRun {
    fn send_sms(&self, to: &str, message: &str) -> Result<()> {
        log::info!("[dry-run] SMS to {to}: {message}");
        Ok(())
    }

    fn send_email(&self, to: &str, subject: &str, _body: &str) -> Result<()> {
        log::info!("[dry-run] email to {to}: {subject}");
        Ok(())
    }

    fn is_dry_run(&self) -> bool {
        true
    }
}

// ---------------------------------------------------------------------------
// Due reminders
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReminderSummary {
    pub sms_sent: usize,
    pub emails_sent: usize,
    pub total_cheques: usize,
    pub skipped_already_sent: usize,
}

/// Remind the client of every open cheque due within `days` of `today`.
/// A cheque is reminded at most once a day; the reminder is recorded as a
/// `payment_reminder` notification whether or not a channel succeeded.
pub fn send_due_reminders(
    conn: &Connection,
    notifier: &dyn Notifier,
    today: NaiveDate,
    days: i64,
) -> Result<ReminderSummary> {
    let due: Vec<_> = cheques::due_soon(conn, today, days)?
        .into_iter()
        .filter(|c| c.client_id.is_some())
        .collect();
    let mut summary = ReminderSummary {
        total_cheques: due.len(),
        ..Default::default()
    };
    let stamp = today
        .and_time(chrono::Utc::now().time())
        .format("%Y-%m-%d %H:%M:%S")
        .to_string();

    for cheque in &due {
        if notifications::exists_on(conn, cheque.id, KIND_PAYMENT_REMINDER, today)? {
            summary.skipped_already_sent += 1;
            continue;
        }
        let Some(client_id) = cheque.client_id else { continue };
        let client = registry::get_client(conn, client_id)?;

        let vars = HashMap::from([
            ("client_name", client.name.clone()),
            ("cheque_number", cheque.cheque_number.clone()),
            ("amount", money(cheque.amount, "")),
            ("due_date", cheque.due_date.clone()),
        ]);

        if let Some(phone) = client.phone.as_deref().filter(|p| is_valid_phone(p)) {
            match notifier.send_sms(phone, &render(PAYMENT_REMINDER_SMS.body, &vars)) {
                Ok(()) => summary.sms_sent += 1,
                Err(e) => log::warn!("SMS reminder for cheque {} failed: {e}", cheque.cheque_number),
            }
        }
        if let Some(email) = client.email.as_deref().filter(|e| is_valid_email(e)) {
            let subject = render(PAYMENT_REMINDER_EMAIL.subject, &vars);
            let body = render(PAYMENT_REMINDER_EMAIL.body, &vars);
            match notifier.send_email(email, &subject, &body) {
                Ok(()) => summary.emails_sent += 1,
                Err(e) => log::warn!("email reminder for cheque {} failed: {e}", cheque.cheque_number),
            }
        }

        if !notifier.is_dry_run() {
            notifications::insert(
                conn,
                KIND_PAYMENT_REMINDER,
                "Rappel automatique envoyé",
                &format!("Rappel de paiement envoyé pour le chèque {}", cheque.cheque_number),
                Some(cheque.id),
                None,
                &stamp,
            )?;
        }
    }
    log::info!(
        "reminders: {} cheques, {} SMS, {} emails, {} already reminded",
        summary.total_cheques,
        summary.sms_sent,
        summary.emails_sent,
        summary.skipped_already_sent
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::{add_branch, insert_cheque, test_db};
    use crate::models::{ClientType, NewClient};
    use std::cell::RefCell;

    #[derive(Default)]
    struct Recorder {
        sms: RefCell<Vec<(String, String)>>,
        emails: RefCell<Vec<(String, String)>>,
        fail_email: bool,
    }

    impl Notifier for Recorder {
        fn send_sms(&self, to: &str, message: &str) -> Result<()> {
            self.sms.borrow_mut().push((to.to_string(), message.to_string()));
            Ok(())
        }

        fn send_email(&self, to: &str, subject: &str, _body: &str) -> Result<()> {
            if self.fail_email {
                return Err(ChequeError::Mail("relay down".into()));
            }
            self.emails.borrow_mut().push((to.to_string(), subject.to_string()));
            Ok(())
        }
    }

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn seeded() -> (tempfile::TempDir, Connection) {
        let (dir, conn) = test_db();
        let branch = add_branch(&conn, "AWB", "Casa");
        let client = registry::add_client(
            &conn,
            &NewClient {
                phone: Some("06 12-34-56-78".into()),
                email: Some("nadia@example.ma".into()),
                ..NewClient::named(ClientType::Individual, "Nadia")
            },
        )
        .unwrap();
        let ts = "2025-01-01 00:00:00";
        insert_cheque(&conn, "M1", 1500.0, Some(client), branch, "pending", "2025-03-12", ts, ts);
        insert_cheque(&conn, "M2", 99.0, None, branch, "pending", "2025-03-12", ts, ts);
        insert_cheque(&conn, "M3", 99.0, Some(client), branch, "pending", "2025-04-30", ts, ts);
        (dir, conn)
    }

    #[test]
    fn test_render_substitutes_known_placeholders() {
        let vars = HashMap::from([("cheque_number", "A1".to_string()), ("amount", "1,000.00".to_string())]);
        let out = render(CHEQUE_BOUNCED_SMS.body, &vars);
        assert!(out.contains("n°A1 de 1,000.00 MAD"));
        assert_eq!(render("{client_name}!", &vars), "{client_name}!");
        assert_eq!(template("cheque_processed_email").unwrap().channel, Channel::Email);
    }

    #[test]
    fn test_contact_validation() {
        assert!(is_valid_phone("0612345678"));
        assert!(is_valid_phone("+212 6 12 34 56 78"));
        assert!(is_valid_phone("05-22-33-44-55"));
        assert!(!is_valid_phone("0812345678"));
        assert!(!is_valid_phone("061234567"));
        assert!(is_valid_email("a.b@example.ma"));
        assert!(!is_valid_email("not-an-email"));
    }

    #[test]
    fn test_reminders_sent_once_per_day() {
        let (_dir, conn) = seeded();
        let rec = Recorder::default();

        let first = send_due_reminders(&conn, &rec, day("2025-03-10"), 3).unwrap();
        assert_eq!(
            first,
            ReminderSummary { sms_sent: 1, emails_sent: 1, total_cheques: 1, skipped_already_sent: 0 }
        );
        let sms = rec.sms.borrow();
        assert_eq!(sms[0].0, "06 12-34-56-78");
        assert!(sms[0].1.contains("1,500.00 MAD"));
        assert!(rec.emails.borrow()[0].1.contains("M1"));
        drop(sms);

        let second = send_due_reminders(&conn, &rec, day("2025-03-10"), 3).unwrap();
        assert_eq!(second.skipped_already_sent, 1);
        assert_eq!(second.sms_sent, 0);
    }

    #[test]
    fn test_failed_channel_still_records_reminder() {
        let (_dir, conn) = seeded();
        let rec = Recorder { fail_email: true, ..Default::default() };
        let summary = send_due_reminders(&conn, &rec, day("2025-03-10"), 3).unwrap();
        assert_eq!(summary.sms_sent, 1);
        assert_eq!(summary.emails_sent, 0);
        let recorded: i64 = conn
            .query_row("SELECT count(*) FROM notifications WHERE kind = 'payment_reminder'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(recorded, 1);
    }

    #[test]
    fn test_dry_run_records_nothing() {
        let (_dir, conn) = seeded();
        let summary = send_due_reminders(&conn, &DryRun, day("2025-03-10"), 3).unwrap();
        assert_eq!(summary.sms_sent, 1);
        let recorded: i64 = conn.query_row("SELECT count(*) FROM notifications", [], |r| r.get(0)).unwrap();
        assert_eq!(recorded, 0);
    }

    #[test]
    fn test_unconfigured_dispatcher_errors() {
        let d = Dispatcher { sms: None, email: None };
        assert!(d.send_sms("0612345678", "x").is_err());
        assert!(d.send_email("a@b.ma", "s", "b").is_err());
    }
}
