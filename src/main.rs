use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command};
use std::path::Path;
use student_recon::report::{render_preview, write_report};
use student_recon::{Config, Reconciler, SourceLoader};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let matches = Command::new("student-recon")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Builds one consolidated record per student from enrollment, grade, program and rating sources")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("config.toml"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .help("Report file path (overrides output_file in the configuration)"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .action(ArgAction::SetTrue)
                .help("Do not print the report preview"),
        )
        .get_matches();

    let config_file = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("config.toml");

    // Load or create configuration
    let mut config = if Path::new(config_file).exists() {
        info!("Loading configuration from {}", config_file);
        Config::load_from_file(config_file)
            .with_context(|| format!("Failed to load configuration: {}", config_file))?
    } else {
        Config::default()
            .save_to_file(config_file)
            .with_context(|| format!("Failed to write default configuration: {}", config_file))?;
        println!("📝 Created default configuration file: {}", config_file);
        println!("⚠️  Please review the source locations in {} and run the program again.", config_file);
        return Ok(());
    };

    if let Some(output) = matches.get_one::<String>("output") {
        config.output_file = output.clone();
    }

    let store = SourceLoader::new(&config)
        .load_store()
        .await
        .context("Failed to load source tables")?;

    let rows = Reconciler::new(&store).reconcile();

    write_report(&rows, &config.output_file)?;
    info!("Report written to {}", config.output_file);

    if !matches.get_flag("quiet") {
        print!("{}", render_preview(&rows, config.preview_rows));
    }

    Ok(())
}
