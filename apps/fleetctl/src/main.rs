//! Flotilla operator CLI.
//!
//! - `fleetctl simulate` runs the configured mission against in-memory
//!   vehicles and prints the final fleet state as JSON.
//! - `fleetctl plan` expands a formation and prints its waypoints as JSON.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use flotilla_fleet::Fleet;
use flotilla_geo::{FormationSpec, LocalPoint, Origin, Waypoint};
use flotilla_link::FlightLink;
use flotilla_link::sim::{DEFAULT_HOME, SimLink};

use config::FleetctlConfig;

#[derive(Parser)]
#[command(name = "fleetctl", version, about = "Coordinate a fleet of aerial vehicles")]
struct Cli {
    /// Path to the fleet configuration file
    #[arg(
        short,
        long,
        global = true,
        env = "FLOTILLA_CONFIG",
        value_name = "FILE",
        default_value = "fleet.toml"
    )]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the configured mission against simulated vehicles
    Simulate {
        /// Override the number of vehicles
        #[arg(long)]
        agents: Option<u32>,
    },

    /// Print the waypoints of a formation as JSON
    Plan {
        #[arg(long, value_enum, default_value_t = Shape::Circle)]
        shape: Shape,

        /// Number of slots (defaults to the configured fleet size)
        #[arg(long)]
        agents: Option<u32>,

        /// Distance between neighbours, or the circle radius
        #[arg(long, default_value_t = 10.0)]
        spacing: f64,

        /// Slots per row for grids
        #[arg(long, default_value_t = 2)]
        columns: u32,

        /// Line heading in degrees clockwise from north
        #[arg(long, default_value_t = 90.0)]
        heading: f64,

        /// Height of every slot above the origin
        #[arg(long, default_value_t = 20.0)]
        altitude: f64,

        /// Origin as LAT,LON,ALT; converts the plan to global coordinates
        #[arg(long, value_parser = parse_origin, allow_hyphen_values = true)]
        origin: Option<Origin>,
    },

    /// Write the effective configuration to the config path
    InitConfig,
}

#[derive(Clone, Copy, ValueEnum)]
enum Shape {
    Line,
    Grid,
    Circle,
}

fn parse_origin(s: &str) -> Result<Origin, String> {
    let parts: Vec<f64> = s
        .split(',')
        .map(|p| p.trim().parse::<f64>().map_err(|e| format!("{p:?}: {e}")))
        .collect::<Result<_, _>>()?;
    let [lat, lon, alt] = parts[..] else {
        return Err("expected LAT,LON,ALT".into());
    };
    Origin::new(lat, lon, alt).map_err(|e| e.to_string())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = FleetctlConfig::load(&cli.config)?;

    match cli.command {
        Command::Simulate { agents } => simulate(config, agents).await,
        Command::Plan {
            shape,
            agents,
            spacing,
            columns,
            heading,
            altitude,
            origin,
        } => {
            let anchor = Waypoint::Local(LocalPoint::new(0.0, 0.0, altitude));
            let spec = match shape {
                Shape::Line => FormationSpec::Line {
                    anchor,
                    spacing_m: spacing,
                    heading_deg: heading,
                },
                Shape::Grid => FormationSpec::Grid {
                    anchor,
                    columns,
                    spacing_m: spacing,
                },
                Shape::Circle => FormationSpec::Circle {
                    center: anchor,
                    radius_m: spacing,
                },
            };
            let n = agents.unwrap_or(config.num_agents) as usize;
            let plan = plan(&spec, n, origin.as_ref())?;
            println!("{}", serde_json::to_string_pretty(&plan)?);
            Ok(())
        }
        Command::InitConfig => {
            config.save(&cli.config)?;
            info!(path = %cli.config.display(), "configuration written");
            Ok(())
        }
    }
}

/// Plans `spec`, resolving every slot to global coordinates when an origin
/// is given. Without one, a circle around a local center stays local.
fn plan(spec: &FormationSpec, n: usize, origin: Option<&Origin>) -> Result<Vec<Waypoint>> {
    if let (None, FormationSpec::Circle { center: Waypoint::Local(c), radius_m }) = (origin, spec) {
        anyhow::ensure!(
            radius_m.is_finite() && *radius_m > 0.0,
            "circle radius must be positive, got {radius_m}"
        );
        let slots = flotilla_geo::circle_offsets(n, *radius_m, *c);
        return Ok(slots.into_iter().map(Waypoint::Local).collect());
    }
    let waypoints = flotilla_geo::plan(spec, n, origin)?;
    match origin {
        None => Ok(waypoints),
        Some(o) => waypoints
            .iter()
            .map(|w| -> Result<Waypoint> { Ok(Waypoint::Global(w.to_global(Some(o))?)) })
            .collect(),
    }
}

async fn simulate(config: FleetctlConfig, agents: Option<u32>) -> Result<()> {
    let mut fleet_config = config.fleet_config()?;
    if let Some(n) = agents {
        fleet_config.agents = n;
    }
    let mission = config.mission();
    mission
        .validate(fleet_config.agents as usize)
        .with_context(|| format!("mission does not fit {} vehicles", fleet_config.agents))?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        agents = fleet_config.agents,
        steps = mission.steps.len(),
        "starting simulated mission"
    );

    let fleet = Fleet::new(&fleet_config, |descriptor| {
        info!(
            agent = descriptor.id,
            endpoint = %descriptor.endpoint,
            command = %descriptor.command_address(),
            "simulated vehicle"
        );
        Arc::new(SimLink::at(DEFAULT_HOME)) as Arc<dyn FlightLink>
    })
    .context("building fleet")?;

    let outcome = tokio::select! {
        res = mission.run(&fleet) => res,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, shutting fleet down");
            fleet.shutdown();
            Err(flotilla_fleet::FleetError::Cancelled)
        }
    };

    println!("{}", serde_json::to_string_pretty(&fleet.snapshots())?);
    fleet.shutdown();

    if let Some(report) = outcome.as_ref().err().and_then(|e| e.report()) {
        for failure in report.failures() {
            warn!(agent = failure.agent_id(), error = %failure, "agent failure");
        }
    }
    outcome.context("mission failed")
}
