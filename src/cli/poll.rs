use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::bank_api::{self, BankApiConfig, HttpBankClient, PollOutcome};
use crate::cheques;
use crate::error::{ChequeError, Result};
use crate::security::{self, Permission};
use crate::settings::{open_secret, Settings, SEALED_PREFIX};

use super::Context;

fn bank_configs(settings: &Settings) -> Result<Vec<BankApiConfig>> {
    if !settings.bank_apis.iter().any(|c| c.api_key.starts_with(SEALED_PREFIX)) {
        return Ok(settings.bank_apis.clone());
    }
    let key = security::load_or_create_key(&settings.key_path())?;
    settings
        .bank_apis
        .iter()
        .map(|c| {
            Ok(BankApiConfig {
                api_key: open_secret(&key, &c.api_key)?,
                ..c.clone()
            })
        })
        .collect()
}

fn outcome_label(outcome: &PollOutcome) -> String {
    match outcome {
        PollOutcome::Updated(_) => outcome.to_string().green().to_string(),
        PollOutcome::Unchanged => outcome.to_string(),
        PollOutcome::NoConfig | PollOutcome::UnknownStatus(_) => outcome.to_string().yellow().to_string(),
    }
}

pub fn run(cheque: Option<i64>) -> Result<()> {
    let ctx = Context::open()?;
    let actor = ctx.authorize(Permission::ChequeUpdate)?;
    let configs = bank_configs(&ctx.settings)?;
    if configs.iter().all(|c| !c.enabled) {
        return Err(ChequeError::Settings("no bank API configured in settings.json".to_string()));
    }
    let client = HttpBankClient::new()?;

    if let Some(id) = cheque {
        let current = cheques::get_cheque(&ctx.conn, id)?;
        if current.status.is_terminal() {
            println!("Cheque {id} is already {}", current.status);
            return Ok(());
        }
        let outcome = bank_api::poll_cheque_status(&ctx.conn, &client, &configs, id, &actor)?;
        println!("Cheque {id}: {}", outcome_label(&outcome));
        return Ok(());
    }

    let results = bank_api::poll_open_cheques(&ctx.conn, &client, &configs, &actor)?;
    let mut table = Table::new();
    table.set_header(vec!["ID", "Number", "Result"]);
    let mut failed = 0;
    for r in &results {
        let label = match &r.outcome {
            Ok(outcome) => outcome_label(outcome),
            Err(e) => {
                failed += 1;
                format!("error: {e}").red().to_string()
            }
        };
        table.add_row(vec![Cell::new(r.cheque_id), Cell::new(&r.cheque_number), Cell::new(label)]);
    }
    println!("Bank status poll\n{table}");
    println!("{} cheque(s) polled, {failed} failed", results.len());
    Ok(())
}
