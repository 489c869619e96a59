//! Config subcommand handlers.

use dialoguer::{Confirm, Input, Select};

use racklink_config::{self as config, Profile};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::util;

const REDACTED: &str = "********";

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Init => init(),
        ConfigCommand::Show => show(global),
        ConfigCommand::SetToken { profile } => set_token(profile.or_else(|| global.profile.clone())),
        ConfigCommand::Path => {
            output::print_output(&config::config_path().display().to_string(), false);
            Ok(())
        }
    }
}

// ── Init: interactive wizard ────────────────────────────────────────

fn init() -> Result<(), CliError> {
    let config_path = config::config_path();
    eprintln!("racklink configuration wizard");
    eprintln!("   Config path: {}\n", config_path.display());

    let mut cfg = config::load_config_or_default();

    // 1. Profile name
    let profile_name: String = Input::new()
        .with_prompt("Profile name")
        .default("default".into())
        .interact_text()?;

    // 2. Bus URL
    let bus_url: String = Input::new()
        .with_prompt("Bus WebSocket URL")
        .default("wss://bus.example.com/ws".into())
        .validate_with(|input: &String| -> Result<(), String> {
            Profile::new(input.as_str())
                .bus_url()
                .map(|_| ())
                .map_err(|e| e.to_string())
        })
        .interact_text()?;

    let mut profile = Profile::new(bus_url);

    // 3. Credentials
    let choices = &[
        "Token in system keyring (recommended)",
        "Token in config file (plaintext)",
        "Account id only",
    ];
    let selection = Select::new()
        .with_prompt("How should racklink authenticate?")
        .items(choices)
        .default(0)
        .interact()?;

    if selection == 2 {
        let user_id: String = Input::new().with_prompt("Account id").interact_text()?;
        profile.user_id = Some(user_id);
    } else {
        let token = rpassword::prompt_password("Bus token: ")?;
        if token.is_empty() {
            return Err(CliError::Validation {
                field: "token".into(),
                reason: "token cannot be empty".into(),
            });
        }
        if selection == 0 {
            config::store_token(&profile_name, &token)?;
            eprintln!("   Token stored in system keyring");
        } else {
            profile.token = Some(token);
        }
    }

    let make_default = cfg.profiles.is_empty()
        || Confirm::new()
            .with_prompt(format!("Make '{profile_name}' the default profile?"))
            .default(true)
            .interact()?;
    if make_default {
        cfg.default_profile = Some(profile_name.clone());
    }
    cfg.profiles.insert(profile_name.clone(), profile);

    let path = config::save_config(&cfg)?;
    eprintln!("\n   Saved profile '{profile_name}' to {}", path.display());
    Ok(())
}

// ── Show ────────────────────────────────────────────────────────────

fn show(global: &GlobalOpts) -> Result<(), CliError> {
    let mut cfg = util::load_config()?;
    for profile in cfg.profiles.values_mut() {
        if profile.token.is_some() {
            profile.token = Some(REDACTED.into());
        }
    }

    let text = toml::to_string_pretty(&cfg).map_err(|e| CliError::Render(e.to_string()))?;
    let out = output::render_single(
        &global.output,
        &cfg,
        |_| text.trim_end().to_owned(),
        |c| c.default_profile.clone().unwrap_or_default(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

// ── Set token ───────────────────────────────────────────────────────

fn set_token(profile: Option<String>) -> Result<(), CliError> {
    let cfg = util::load_config()?;
    let name = cfg.active_profile_name(profile.as_deref());
    cfg.profile(&name)?;

    let token = rpassword::prompt_password(format!("Bus token for '{name}': "))?;
    if token.is_empty() {
        return Err(CliError::Validation {
            field: "token".into(),
            reason: "token cannot be empty".into(),
        });
    }
    config::store_token(&name, &token)?;
    eprintln!("Token for '{name}' stored in system keyring");
    Ok(())
}
