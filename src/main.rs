use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::WrapErr;
use wsse_envelope::{EnvelopeService, config::Config, telemetry};

#[derive(Parser, Debug)]
#[command(name = "wsse-envelope", version, about = "Build WS-Security signed SOAP 1.2 envelopes")]
struct CommandLine {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sign the XML document in FILE for the SubmitData operation
    Submit {
        #[arg(value_name = "FILE")]
        payload: PathBuf,
    },
    /// Sign the configured reference request for the FetchReference operation
    Fetch,
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    dotenvy::dotenv().ok();
    telemetry::init_tracing();

    let cli = CommandLine::parse();
    let config = Config::load().wrap_err("failed to load signer configuration")?;
    tracing::debug!(?config, "configuration loaded");

    let service = EnvelopeService::new(config.signer);
    let envelope = match cli.command {
        Commands::Submit { payload } => {
            let xml = std::fs::read_to_string(&payload)
                .wrap_err_with(|| format!("failed to read {}", payload.display()))?;
            service.submit_data(&xml)?
        }
        Commands::Fetch => service.fetch_reference()?,
    };

    println!("{envelope}");
    Ok(())
}
