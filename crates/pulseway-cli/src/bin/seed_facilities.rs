//! CLI tool to register hospitals with a PulseWay server.

use std::path::PathBuf;

use clap::Parser;
use pulseway_cli::sim::{default_facilities, load_seed_file};
use pulseway_sdk::PulseClient;

/// Register a list of facilities (built-in list unless --file is given)
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// PulseWay Server URL
    #[arg(long, default_value = "http://localhost:3000")]
    url: String,

    /// JSON file with [{"name", "location": {"latitude", "longitude"}}]
    #[arg(long)]
    file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pulseway_cli::init_logging();
    let args = Args::parse();

    let seeds = match args.file.as_deref() {
        Some(path) => load_seed_file(path)?,
        None => default_facilities(),
    };

    let client = PulseClient::new(&args.url);
    let mut registered = 0usize;
    for seed in &seeds {
        match client.register_facility(&seed.name, seed.location).await {
            Ok(facility) => {
                registered += 1;
                println!("Registered {} as '{}'", facility.display_name, facility.facility_id);
            }
            Err(e) => eprintln!("Skipped {}: {}", seed.name, e),
        }
    }

    let total = client.list_facilities().await.map(|list| list.len()).unwrap_or(0);
    println!(
        "\nRegistered {} of {} facilities ({} known to the server).",
        registered,
        seeds.len(),
        total
    );
    Ok(())
}
