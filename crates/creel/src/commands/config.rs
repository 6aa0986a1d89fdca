//! Config command

use anyhow::{anyhow, Context, Result};
use creel_core::{ConfigLoader, CreelConfig};

use super::Globals;
use crate::cli::{ConfigCommands, ConfigInitArgs, ConfigShowArgs};
use crate::output;

pub fn run(cmd: ConfigCommands, globals: &Globals<'_>) -> Result<()> {
    match cmd {
        ConfigCommands::Show(args) => show(args, globals),
        ConfigCommands::Init(args) => init(args),
    }
}

fn show(args: ConfigShowArgs, globals: &Globals<'_>) -> Result<()> {
    let loader = ConfigLoader::new()?;
    let source = loader.locate(globals.config)?;
    let config = globals.load_config()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    output::header("Configuration");
    match &source {
        Some(path) => output::kv("Source", path.as_str()),
        None => output::kv("Source", "built-in defaults"),
    }
    output::kv(
        "Store URL",
        config.store.url.as_deref().unwrap_or("(not set)"),
    );
    output::kv(
        "Service key",
        if config.store.service_key.is_some() {
            "(set)"
        } else {
            "(not set)"
        },
    );
    println!();
    print!("{}", config.to_yaml()?);
    Ok(())
}

fn init(args: ConfigInitArgs) -> Result<()> {
    if args.output.exists() && !args.force {
        return Err(anyhow!(
            "File {} already exists. Use --force to overwrite.",
            args.output
        ));
    }

    let content = default_config_yaml()?;
    std::fs::write(&args.output, content)
        .with_context(|| format!("Failed to write {}", args.output))?;

    output::success(&format!("Created {}", args.output));
    output::info("Set SUPABASE_URL and SUPABASE_SERVICE_ROLE_KEY in the environment");
    Ok(())
}

fn default_config_yaml() -> Result<String> {
    let body = CreelConfig::default().to_yaml()?;
    Ok(format!(
        "# creel configuration\n\
         # The service key is read from SUPABASE_SERVICE_ROLE_KEY and never written here.\n\
         {}",
        body
    ))
}
