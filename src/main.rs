mod analytics;
mod audit;
mod bank_api;
mod cheques;
mod cli;
mod db;
mod duplicates;
mod error;
mod export;
mod fmt;
mod importer;
mod models;
mod notifications;
#[cfg(feature = "pdf")]
mod pdf;
mod registry;
mod reminders;
mod scoring;
mod security;
mod settings;

use clap::{CommandFactory, Parser};

use cli::{
    AuditCommands, BanksCommands, BranchesCommands, ChequesCommands, Cli, ClientsCommands, Commands,
    NotificationsCommands, ReportCommands, UsersCommands,
};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init { data_dir, admin, company } => cli::init::run(data_dir, &admin, company),
        Commands::Status => cli::status::run(),
        Commands::Login { username } => cli::auth::login(&username),
        Commands::Logout => cli::auth::logout(),
        Commands::Whoami => cli::auth::whoami(),
        Commands::Banks { command } => match command {
            BanksCommands::List { all } => cli::banks::list(all),
            BanksCommands::Add { name, code } => cli::banks::add(&name, code.as_deref()),
            BanksCommands::Update { id, name, code } => cli::banks::update(id, &name, code.as_deref()),
            BanksCommands::Remove { id } => cli::banks::remove(id),
        },
        Commands::Branches { command } => match command {
            BranchesCommands::List { bank } => cli::banks::list_branches(bank.as_deref()),
            BranchesCommands::Add {
                name,
                bank,
                address,
                postal_code,
                phone,
                email,
            } => cli::banks::add_branch(&name, &bank, address, postal_code, phone, email),
            BranchesCommands::Remove { id } => cli::banks::remove_branch(id),
        },
        Commands::Clients { command } => match command {
            ClientsCommands::List { client_type } => cli::clients::list(client_type.as_deref()),
            ClientsCommands::Add {
                name,
                client_type,
                id_number,
                tax_id,
                address,
                phone,
                email,
            } => cli::clients::add(&name, &client_type, id_number, tax_id, address, phone, email),
            ClientsCommands::Update {
                id,
                name,
                client_type,
                id_number,
                tax_id,
                address,
                phone,
                email,
            } => cli::clients::update(id, &name, &client_type, id_number, tax_id, address, phone, email),
            ClientsCommands::Search { term } => cli::clients::search(&term),
            ClientsCommands::Remove { id } => cli::clients::remove(id),
        },
        Commands::Users { command } => match command {
            UsersCommands::List => cli::users::list(),
            UsersCommands::Add {
                username,
                role,
                full_name,
                email,
            } => cli::users::add(&username, &role, full_name.as_deref(), email.as_deref()),
            UsersCommands::Remove { username } => cli::users::remove(&username),
        },
        Commands::Cheques { command } => match command {
            ChequesCommands::List {
                status,
                bank,
                client,
                from_date,
                to_date,
                search,
                limit,
            } => cli::cheques::list(status.as_deref(), bank.as_deref(), client, from_date, to_date, search, limit),
            ChequesCommands::Add {
                number,
                amount,
                due,
                branch,
                issue,
                client,
                currency,
                depositor,
                invoice,
                invoice_date,
                scan,
                notes,
                force,
            } => cli::cheques::add(cli::cheques::AddArgs {
                number,
                amount,
                due,
                branch,
                issue,
                client,
                currency,
                depositor,
                invoice,
                invoice_date,
                scan,
                notes,
                force,
            }),
            ChequesCommands::Show { id } => cli::cheques::show(id),
            ChequesCommands::Status { id, status } => cli::cheques::set_status(id, &status),
            ChequesCommands::Edit {
                id,
                due,
                amount,
                client,
                depositor,
                invoice,
                scan,
                notes,
            } => cli::cheques::edit(
                id,
                crate::cheques::ChequeEdit {
                    due_date: due,
                    amount,
                    client_id: client,
                    notes,
                    scan_path: scan,
                    depositor_name: depositor,
                    invoice_number: invoice,
                },
            ),
            ChequesCommands::Delete { id } => cli::cheques::delete(id),
            ChequesCommands::Due { days } => cli::cheques::due(days),
            ChequesCommands::Overdue => cli::cheques::overdue(),
        },
        Commands::Notifications { command } => match command {
            NotificationsCommands::List { unread } => cli::notifications::list(unread),
            NotificationsCommands::Read { id, all } => cli::notifications::read(id, all),
            NotificationsCommands::Refresh => cli::notifications::refresh(),
        },
        Commands::Report { command } => match command {
            ReportCommands::Dashboard => cli::report::dashboard(),
            ReportCommands::Aging { from_date, to_date } => {
                cli::report::aging(from_date.as_deref(), to_date.as_deref())
            }
            ReportCommands::Trends { years } => cli::report::trends(years),
            ReportCommands::Risk => cli::report::risk(),
            ReportCommands::Performance { from_date, to_date } => {
                cli::report::performance(from_date.as_deref(), to_date.as_deref())
            }
            ReportCommands::Cashflow { days } => cli::report::cashflow(days),
            ReportCommands::Monthly { year } => cli::report::monthly(year),
            ReportCommands::Duplicates => cli::report::duplicates(),
        },
        Commands::RiskScore { client } => cli::report::risk_score(client),
        Commands::Import { file, format } => cli::import::run(&file, format.as_deref()),
        Commands::Remind { days, dry_run } => cli::remind::run(days, dry_run),
        Commands::Poll { cheque } => cli::poll::run(cheque),
        Commands::Export {
            kind,
            format,
            output,
            status,
            from_date,
            to_date,
        } => cli::export::run(cli::export::ExportArgs {
            kind,
            format,
            output,
            status,
            from_date,
            to_date,
        }),
        Commands::Audit { command } => match command {
            AuditCommands::List {
                user,
                action,
                from_date,
                to_date,
                limit,
            } => cli::audit::list(user, action.as_deref(), from_date, to_date, limit),
            AuditCommands::Report => cli::audit::report(),
            AuditCommands::Export {
                output,
                from_date,
                to_date,
            } => cli::audit::export(&output, from_date, to_date),
        },
        Commands::Backup { output } => cli::backup::run(output),
        Commands::Seal => cli::seal::run(),
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "chequeman", &mut std::io::stdout());
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
