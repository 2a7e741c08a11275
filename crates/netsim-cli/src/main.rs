use anyhow::{Context, Result, bail};
use clap::Parser;
use netsim_abstract::{Algorithm, SimConfig, Topology};
use netsim_simulator::{EventLog, SimulationReport, build, run_scenario};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "Discrete-event packet network simulator")]
struct Args {
    /// Simulation horizon in seconds; the topology is read from stdin.
    sim_time: Option<f64>,

    /// Congestion-control algorithm: tahoe, reno, fast or cubic.
    #[arg(default_value = "fast")]
    algorithm: String,

    /// Run a TOML scenario file instead of reading stdin.
    #[arg(long)]
    scenario: Option<PathBuf>,

    /// Write a JSON summary of the finished simulation.
    #[arg(long)]
    trace_out: Option<PathBuf>,

    /// Seconds between sonar rounds.
    #[arg(long, default_value_t = 5.0)]
    sonar_period: f64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let args = Args::parse();

    let report = if let Some(path) = &args.scenario {
        let outcome = run_scenario(path)?;
        print!("{}", outcome.log);
        outcome.report
    } else {
        run_from_stdin(&args)?
    };

    if let Some(path) = &args.trace_out {
        write_trace(path, &report)?;
    }
    Ok(())
}

fn run_from_stdin(args: &Args) -> Result<SimulationReport> {
    let Some(sim_time) = args.sim_time else {
        bail!("either a simulation time or --scenario is required");
    };
    if sim_time <= 0.0 {
        bail!("simulation time must be positive");
    }
    let algorithm: Algorithm = args
        .algorithm
        .parse()
        .map_err(|err: String| anyhow::anyhow!(err))?;

    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .context("failed to read the topology from stdin")?;
    let topology = Topology::parse(&input).context("malformed topology")?;

    let config = SimConfig {
        sim_time_s: sim_time,
        algorithm,
        sonar_period_s: args.sonar_period,
    };
    let mut simulator = build(&topology, config, EventLog::stdout())?;
    info!(
        hosts = topology.hosts.len(),
        routers = topology.routers.len(),
        links = topology.links.len(),
        flows = topology.flows.len(),
        "starting simulation"
    );
    simulator.run();
    simulator.finish_log()?;
    info!(
        time = simulator.current_time(),
        unfinished = simulator.flows_remaining(),
        "simulation complete"
    );
    Ok(simulator.export_report())
}

fn write_trace(path: &Path, report: &SimulationReport) -> Result<()> {
    let data = serde_json::to_vec_pretty(report).context("failed to serialize the trace")?;
    let mut file = std::fs::File::create(path)
        .with_context(|| format!("failed to create trace file {}", path.display()))?;
    file.write_all(&data)
        .with_context(|| format!("failed to write trace file {}", path.display()))?;
    Ok(())
}
