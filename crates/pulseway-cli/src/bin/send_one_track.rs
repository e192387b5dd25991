//! CLI tool to drive one simulated ambulance against a PulseWay server.
//!
//! The ambulance drives a straight line toward a destination while the
//! SDK's location reporter publishes its position.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use pulseway_cli::sim::{DrivePath, StraightPath};
use pulseway_core::Coordinate;
use pulseway_sdk::{LocationReporter, PulseClient, SimulatedProvider, WatchOptions};
use tokio::time;

/// Send ambulance positions to PulseWay Server (single vehicle, straight line)
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// PulseWay Server URL
    #[arg(long, default_value = "http://localhost:3000")]
    url: String,

    /// Start latitude
    #[arg(long, default_value_t = 12.95)]
    lat: f64,

    /// Start longitude
    #[arg(long, default_value_t = 77.65)]
    lon: f64,

    /// Destination latitude
    #[arg(long, default_value_t = 12.9)]
    dest_lat: f64,

    /// Destination longitude
    #[arg(long, default_value_t = 77.6)]
    dest_lon: f64,

    /// Speed in meters per second
    #[arg(long, default_value_t = 15.0)]
    speed: f64,

    /// Simulation steps per second
    #[arg(long, default_value_t = 1.0)]
    rate: f64,

    /// Facility to inform on arrival
    #[arg(long)]
    facility: Option<String>,

    /// End the session (dropping all links) on arrival
    #[arg(long, default_value_t = false)]
    end_session: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pulseway_cli::init_logging();
    let args = Args::parse();

    println!("Connecting to PulseWay Server at {}...", args.url);
    let mut client = PulseClient::new(&args.url);
    let registration = client.register().await?;
    println!("Registered ambulance: {}", registration.vehicle_id);

    let start = Coordinate::new(args.lat, args.lon);
    let end = Coordinate::new(args.dest_lat, args.dest_lon);
    start.validate()?;
    end.validate()?;
    let path = StraightPath::new(start, end, args.speed);

    let provider = Arc::new(SimulatedProvider::new(start));
    let sink = Arc::new(
        PulseClient::new(&args.url)
            .with_session(&registration.vehicle_id, &registration.session_token),
    );
    let options = WatchOptions {
        time_interval: Duration::from_millis(registration.report_interval_ms),
        distance_interval_m: registration.report_distance_m,
    };
    let reporter = LocationReporter::new(
        registration.vehicle_id.clone(),
        provider.clone(),
        sink,
        options,
    );
    let handle = reporter.start().await?;

    println!("Driving {:.0} m at {} m/s", path.distance_m, args.speed);
    println!("  From: ({}, {})", start.latitude, start.longitude);
    println!("  To:   ({}, {})", end.latitude, end.longitude);
    println!();

    let started = time::Instant::now();
    let mut step = 0u32;
    let mut interval = time::interval(Duration::from_secs_f64(1.0 / args.rate.max(0.01)));

    loop {
        interval.tick().await;
        let elapsed = started.elapsed().as_secs_f64();
        let position = path.position_at(elapsed);
        provider.move_to(position);
        step += 1;
        println!(
            "[{:3}] At ({:.6}, {:.6})",
            step, position.latitude, position.longitude
        );
        if path.is_finished(elapsed) {
            break;
        }
    }

    // Let the final sample publish before stopping.
    time::sleep(Duration::from_millis(500)).await;
    handle.join().await;

    if let Some(facility) = args.facility.as_deref() {
        match client.inform(facility, Some(end)).await {
            Ok(link) => println!("Informed {} ({})", link.facility_id, link.vehicle_id),
            Err(e) => eprintln!("Inform failed: {}", e),
        }
    }

    if let Ok(view) = client.nearby(Some(5.0)).await {
        match view.entries.first() {
            Some(nearest) => println!("Nearest hospital: {} ({})", nearest.display_name, nearest.label),
            None => println!("{}", view.message.unwrap_or_default()),
        }
    }

    if args.end_session {
        let removed = client.end_session().await?;
        println!("Session ended, {} links dropped", removed);
    }

    println!("\nSimulation complete after {} steps.", step);
    Ok(())
}
