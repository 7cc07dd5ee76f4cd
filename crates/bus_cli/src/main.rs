use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use bus_core::clock::SystemClock;
use bus_core::params::SimParamsOverride;
use bus_core::planner::{PlanOptions, RoutePlanner, RouteStart};
use bus_core::registry::{RegistryConfig, SimulationRegistry};
use bus_core::roster::{BusId, BusRoster, InMemoryRoster};
use bus_core::routing::osrm::OsrmRouter;
use bus_core::routing::{OfflineRouter, RoadRouter};
use bus_core::telemetry::InMemoryTelemetry;
use clap::{Parser, Subcommand, ValueEnum};
use log::{info, warn};

// ── CLI definition ─────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "bus_sim",
    about = "Plan school bus routes and simulate buses driving them",
    long_about = "Reads a JSON roster of buses, builds street routes through each\n\
                  bus's pickups and animates a simulated bus along them."
)]
struct Cli {
    /// OSRM base URL; without it every leg is a straight line
    #[arg(long, env = "BUS_SIM_OSRM_ENDPOINT", global = true)]
    osrm_endpoint: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the planned route of one bus as JSON
    Route {
        /// JSON file holding an array of buses
        #[arg(long)]
        roster: PathBuf,
        #[arg(long)]
        bus: BusId,
        #[arg(value_enum, long, default_value_t = StartArg::RouteOrigin)]
        start: StartArg,
        /// Keep the roster's pickup order instead of optimizing it
        #[arg(long)]
        keep_order: bool,
    },
    /// Simulate one bus and print its position until it arrives
    Simulate {
        #[arg(long)]
        roster: PathBuf,
        #[arg(long)]
        bus: BusId,
        /// JSON file with parameter overrides
        #[arg(long)]
        params: Option<PathBuf>,
        #[arg(value_enum, long, default_value_t = StartArg::RouteOrigin)]
        start: StartArg,
        /// Milliseconds between printed positions
        #[arg(long, default_value_t = 1_000)]
        report_every_ms: u64,
        /// Give up after this many seconds
        #[arg(long, default_value_t = 3_600)]
        timeout_s: u64,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum StartArg {
    RouteOrigin,
    School,
}

impl From<StartArg> for RouteStart {
    fn from(arg: StartArg) -> Self {
        match arg {
            StartArg::RouteOrigin => RouteStart::RouteOrigin,
            StartArg::School => RouteStart::School,
        }
    }
}

// ── Helpers ────────────────────────────────────────────────────────

fn load_roster(path: &Path) -> Result<Arc<InMemoryRoster>> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let buses: Vec<BusRoster> =
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    info!("loaded {} buses from {}", buses.len(), path.display());
    Ok(Arc::new(InMemoryRoster::from_buses(buses)))
}

fn load_overrides(path: Option<&Path>) -> Result<SimParamsOverride> {
    let Some(path) = path else {
        return Ok(SimParamsOverride::default());
    };
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn router(endpoint: Option<&str>) -> Result<Arc<dyn RoadRouter>> {
    match endpoint {
        Some(url) => {
            info!("routing through OSRM at {}", url);
            let osrm = OsrmRouter::new(url).context("creating OSRM client")?;
            Ok(Arc::new(osrm))
        }
        None => {
            warn!("no OSRM endpoint configured, routes will be straight lines");
            Ok(Arc::new(OfflineRouter))
        }
    }
}

// ── Commands ───────────────────────────────────────────────────────

fn cmd_route(
    cli_endpoint: Option<&str>,
    roster: &Path,
    bus: BusId,
    start: StartArg,
    keep_order: bool,
) -> Result<()> {
    let planner = RoutePlanner::new(load_roster(roster)?, router(cli_endpoint)?);
    let route = planner.plan_with(
        bus,
        PlanOptions {
            start: start.into(),
            recompute_order: !keep_order,
        },
    )?;
    println!("{}", serde_json::to_string_pretty(&route)?);
    Ok(())
}

fn cmd_simulate(
    cli_endpoint: Option<&str>,
    roster: &Path,
    bus: BusId,
    params: Option<&Path>,
    start: StartArg,
    report_every_ms: u64,
    timeout_s: u64,
) -> Result<()> {
    let planner = RoutePlanner::new(load_roster(roster)?, router(cli_endpoint)?);
    let config = RegistryConfig {
        route_start: start.into(),
        ..RegistryConfig::default()
    };
    let registry = SimulationRegistry::new(
        planner,
        Arc::new(InMemoryTelemetry::new()),
        Arc::new(SystemClock),
        config,
    );

    let handle = registry.start(bus, load_overrides(params)?)?;
    println!("{}", serde_json::to_string(&handle)?);

    let deadline = Instant::now() + Duration::from_secs(timeout_s);
    let every = Duration::from_millis(report_every_ms.max(1));
    while registry.is_running(bus) {
        if Instant::now() >= deadline {
            registry.stop(bus);
            bail!("bus {} did not arrive within {} s", bus, timeout_s);
        }
        println!("{}", serde_json::to_string(&registry.location(bus)?)?);
        thread::sleep(every);
    }

    println!("{}", serde_json::to_string(&registry.location(bus)?)?);
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let endpoint = cli.osrm_endpoint.as_deref();

    match cli.command {
        Commands::Route {
            roster,
            bus,
            start,
            keep_order,
        } => cmd_route(endpoint, &roster, bus, start, keep_order),
        Commands::Simulate {
            roster,
            bus,
            params,
            start,
            report_every_ms,
            timeout_s,
        } => cmd_simulate(
            endpoint,
            &roster,
            bus,
            params.as_deref(),
            start,
            report_every_ms,
            timeout_s,
        ),
    }
}
