use colored::Colorize;

use crate::error::Result;
use crate::security;
use crate::settings;

use super::Context;

pub fn login(username: &str) -> Result<()> {
    let ctx = Context::open()?;
    security::cleanup_expired_sessions(&ctx.conn, super::now())?;
    let password = super::read_password("Password: ")?;
    let session = security::login(&ctx.conn, username, &password, &ctx.settings.session_policy(), super::now())?;
    settings::save_session_token(&ctx.data_dir(), &session.token)?;
    println!(
        "{} as {} ({}), session expires {}",
        "Logged in".green(),
        session.username.bold(),
        session.role,
        session.expires_at
    );
    Ok(())
}

pub fn logout() -> Result<()> {
    let ctx = Context::open()?;
    let data_dir = ctx.data_dir();
    match settings::load_session_token(&data_dir) {
        Some(token) => {
            security::logout(&ctx.conn, &token)?;
            settings::clear_session_token(&data_dir)?;
            println!("Logged out");
        }
        None => println!("No active session"),
    }
    Ok(())
}

pub fn whoami() -> Result<()> {
    let ctx = Context::open()?;
    let actor = ctx.actor()?;
    let user = crate::registry::find_user(&ctx.conn, &actor.username)?;
    println!("User:       {}", user.username.bold());
    println!("Role:       {}", user.role);
    if let Some(name) = &user.full_name {
        println!("Name:       {name}");
    }
    if let Some(email) = &user.email {
        println!("Email:      {email}");
    }
    println!("Last login: {}", user.last_login.as_deref().unwrap_or("-"));
    Ok(())
}
