use crate::audit::{self, AuditEvent};
use crate::db::{get_connection, init_db, set_setting};
use crate::error::{ChequeError, Result};
use crate::models::{Actor, AuditAction, Role};
use crate::registry;
use crate::security::{self, PasswordPolicy};
use crate::settings::{load_settings, save_settings, settings_file_exists, shellexpand_path};

pub fn run(data_dir: Option<String>, admin: &str, company: Option<String>) -> Result<()> {
    let mut settings = load_settings();

    if let Some(dir) = data_dir {
        settings.data_dir = shellexpand_path(&dir);
    } else if !settings_file_exists() {
        let default = &settings.data_dir;
        println!("Data directory [{}]: ", default);
        let mut input = String::new();
        std::io::stdin().read_line(&mut input).ok();
        let chosen = input.trim();
        if !chosen.is_empty() {
            settings.data_dir = shellexpand_path(chosen);
        }
    }

    save_settings(&settings)?;

    let resolved = settings.data_dir();
    std::fs::create_dir_all(&resolved)?;
    std::fs::create_dir_all(resolved.join("imports"))?;
    std::fs::create_dir_all(resolved.join("exports"))?;
    std::fs::create_dir_all(resolved.join("backups"))?;

    let conn = get_connection(&settings.db_path())?;
    init_db(&conn)?;
    security::load_or_create_key(&settings.key_path())?;

    if let Some(name) = company {
        set_setting(&conn, "company_name", name.trim())?;
    }

    if registry::user_count(&conn)? == 0 {
        let password = super::read_password(&format!("Password for {admin}: "))?;
        let problems = security::validate_password(&password, &PasswordPolicy::default());
        if !problems.is_empty() {
            return Err(ChequeError::Validation(problems.join("; ")));
        }
        let id = registry::add_user(&conn, admin, &security::hash_password(&password), Role::Admin, None, None)?;
        audit::log_event(
            &conn,
            &AuditEvent::new(&Actor::system(), AuditAction::Create).resource("user", id),
        )?;
        println!("Created administrator '{admin}'");
    }

    println!("Initialized chequeman at {}", resolved.display());
    Ok(())
}
