use alertrelay_dispatch::config::{AppConfig, DEFAULT_CONFIG_PATH};
use alertrelay_dispatch::run;
use anyhow::Result;
use tracing_subscriber::EnvFilter;

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  alertrelay [config.toml] < payload.json   Dispatch one alert payload read from stdin");
    eprintln!("  alertrelay hello                          Print a greeting and exit");
    eprintln!();
    eprintln!("Config defaults to {DEFAULT_CONFIG_PATH} when present.");
}

#[tokio::main]
async fn main() -> Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|e| anyhow::anyhow!("Failed to install default CryptoProvider: {e:?}"))?;

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive("alertrelay=info".parse()?))
        .init();

    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1).map(|s| s.as_str()) {
        Some("hello") => {
            println!("hello alertrelay");
            return Ok(());
        }
        Some("-h") | Some("--help") => {
            print_usage();
            return Ok(());
        }
        other => other,
    };

    let config = AppConfig::resolve(config_path)?;
    let report = run::dispatch_reader(&config, std::io::stdin().lock()).await?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
