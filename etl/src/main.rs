use clap::{Arg, Command};
use common::config::Settings;
use etl::{Sources, observe_city};
use std::process;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let matches = Command::new("ETL source probe")
        .version("1.0")
        .about("Fetches one record from an upstream source and prints it as JSON")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .global(true)
                .help("Sets a custom config file"),
        )
        .subcommand(
            Command::new("weather")
                .about("Geocode a city and fetch its current weather")
                .arg(
                    Arg::new("city")
                        .long("city")
                        .value_name("NAME")
                        .required(true)
                        .help("City to look up"),
                ),
        )
        .subcommand(Command::new("climate").about("Download the climate dataset and summarise it"))
        .get_matches();

    let config_path = matches
        .get_one::<String>("config")
        .map(|s| s.as_str())
        .unwrap_or("config/pipeline.toml");

    if let Err(e) = run(config_path, &matches).await {
        eprintln!("ETL source error: {}", e);
        process::exit(1);
    }
}

async fn run(config_path: &str, matches: &clap::ArgMatches) -> anyhow::Result<()> {
    let settings = Settings::new(config_path)?;
    let sources = Sources::from_settings(&settings)?;

    match matches.subcommand() {
        Some(("weather", weather_matches)) => {
            let city = weather_matches
                .get_one::<String>("city")
                .ok_or_else(|| anyhow::anyhow!("--city is required"))?;
            let record = observe_city(&*sources.geocoder, &*sources.weather, city).await;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Some(("climate", _)) => {
            let extract = sources.climate.pull().await;
            let summary = serde_json::json!({
                "status": extract.status,
                "rows": extract.rows.len(),
                "first": extract.rows.first(),
                "last": extract.rows.last(),
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        _ => anyhow::bail!("Please specify a valid subcommand"),
    }

    Ok(())
}
