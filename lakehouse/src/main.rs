use clap::{Arg, ArgAction, Command};
use common::config::Settings;
use std::process;
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let matches = Command::new("Weather ETL")
        .version("1.0")
        .about("Runs the weather and climate pipeline and serves its dashboard")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .global(true)
                .help("Sets a custom config file"),
        )
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .action(ArgAction::SetTrue)
                .global(true)
                .help("Emit logs as JSON lines"),
        )
        .subcommand(Command::new("run").about("Run every runnable unit of the pipeline once"))
        .subcommand(Command::new("list").about("Print the pipeline units and signal versions"))
        .subcommand(Command::new("serve").about("Serve the dashboard API"))
        .get_matches();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if matches.get_flag("json-logs") {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config_path = matches
        .get_one::<String>("config")
        .map(|s| s.as_str())
        .unwrap_or("config/pipeline.toml");

    match run(config_path, &matches).await {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            error!(error = %e, "Pipeline error");
            process::exit(1);
        }
    }
}

// Ok(false) means the command completed but some unit failed.
async fn run(config_path: &str, matches: &clap::ArgMatches) -> anyhow::Result<bool> {
    let settings = Settings::new(config_path)?;

    match matches.subcommand() {
        Some(("run", _)) => {
            let report = lakehouse::run_pipeline(Arc::new(settings)).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(report.success())
        }
        Some(("list", _)) => {
            let overview = lakehouse::list_pipeline(&settings).await?;
            println!("{}", serde_json::to_string_pretty(&overview)?);
            Ok(true)
        }
        Some(("serve", _)) => {
            lakehouse::serve_dashboard(&settings).await?;
            Ok(true)
        }
        _ => anyhow::bail!("No subcommand specified. Use --help for usage information."),
    }
}
