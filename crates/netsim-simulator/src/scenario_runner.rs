use crate::builder;
use crate::fault::FaultPlan;
use crate::log::EventLog;
use crate::report::SimulationReport;
use anyhow::{Context, Result, bail};
use netsim_abstract::{SimConfig, TestAssertion, TestScenario, Topology};
use std::fs;
use std::path::Path;
use tracing::info;

/// Result of a scenario run: the full event log text plus the summary the
/// assertions were checked against.
pub struct ScenarioOutcome {
    pub report: SimulationReport,
    pub log: String,
}

/// Load a TOML scenario from disk, run it, and check every assertion.
pub fn run_scenario(path: &Path) -> Result<ScenarioOutcome> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read scenario file {}", path.display()))?;
    let scenario: TestScenario =
        toml::from_str(&content).context("failed to parse scenario file")?;
    run(&scenario)
}

pub fn run(scenario: &TestScenario) -> Result<ScenarioOutcome> {
    info!(name = %scenario.name, "running scenario");
    let topology = Topology::parse(&scenario.topology)
        .with_context(|| format!("scenario '{}' has a malformed topology", scenario.name))?;
    let mut config = SimConfig::default();
    scenario.config.apply_to(&mut config);

    let (log, buffer) = EventLog::memory();
    let mut simulator = builder::build(&topology, config, log)
        .with_context(|| format!("scenario '{}' has an invalid topology", scenario.name))?;
    simulator.set_faults(FaultPlan::from_actions(&scenario.faults));
    simulator.run();
    simulator.finish_log()?;

    let report = simulator.export_report();
    let log = buffer.contents();
    for assertion in &scenario.assertions {
        check(assertion, &report, &log, &simulator)?;
    }
    info!(name = %scenario.name, "scenario passed");
    Ok(ScenarioOutcome { report, log })
}

fn check(
    assertion: &TestAssertion,
    report: &SimulationReport,
    log: &str,
    simulator: &crate::engine::Simulator,
) -> Result<()> {
    match assertion {
        TestAssertion::AllFlowsFinish => {
            for flow in &report.flows {
                if !flow.finished() {
                    bail!("flow '{}' did not finish", flow.id);
                }
            }
        }
        TestAssertion::FlowFinishesBy { flow, secs } => {
            let found = report
                .flow(flow)
                .with_context(|| format!("no flow '{flow}' in the report"))?;
            match found.finished_at_s {
                Some(t) if t <= *secs => {}
                Some(t) => bail!("flow '{flow}' finished at {t:.6}, after {secs:.6}"),
                None => bail!("flow '{flow}' did not finish"),
            }
        }
        TestAssertion::MinPacketLoss { link, count } => {
            let found = report
                .link(link)
                .with_context(|| format!("no link '{link}' in the report"))?;
            if found.packets_dropped < *count {
                bail!(
                    "link '{link}' dropped {} packets, expected at least {count}",
                    found.packets_dropped
                );
            }
        }
        TestAssertion::MinRetransmits { flow, count } => {
            let found = report
                .flow(flow)
                .with_context(|| format!("no flow '{flow}' in the report"))?;
            if found.retransmits < *count {
                bail!(
                    "flow '{flow}' retransmitted {} packets, expected at least {count}",
                    found.retransmits
                );
            }
        }
        TestAssertion::StateReached { flow, state } => {
            let seen = log.lines().any(|line| {
                let fields: Vec<&str> = line.split_whitespace().collect();
                fields.len() == 4 && fields[1] == "state" && fields[2] == flow && fields[3] == state
            });
            if !seen {
                bail!("flow '{flow}' never entered state '{state}'");
            }
        }
        TestAssertion::ForwardEntry { router, dest, port } => {
            match simulator.router_forward(router, dest) {
                Some(found) if found == port => {}
                Some(found) => bail!(
                    "router '{router}' forwards '{dest}' via '{found}', expected '{port}'"
                ),
                None => bail!("router '{router}' has no forward entry for '{dest}'"),
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_passing_scenario_runs_clean() {
        let scenario: TestScenario = toml::from_str(
            r#"
name = "sanity"
description = "one flow over one router"
topology = """
H1
H2
-
R1
-
L1 H1 R1 10 10 64
L2 R1 H2 10 10 64
-
F1 H1 H2 0.1 0.5
"""

[config]
sim_time_s = 30.0
algorithm = "reno"

[[assertions]]
type = "all_flows_finish"

[[assertions]]
type = "flow_finishes_by"
flow = "F1"
secs = 30.0
"#,
        )
        .unwrap();
        let outcome = run(&scenario).unwrap();
        assert!(outcome.log.contains("finish F1"));
        assert!(outcome.report.flow("F1").unwrap().finished());
    }

    #[test]
    fn a_failed_assertion_is_an_error() {
        let scenario: TestScenario = toml::from_str(
            r#"
name = "impossible"
description = "expects loss that cannot happen"
topology = """
H1
H2
-
-
L1 H1 H2 10 10 64
-
F1 H1 H2 0.01 0.0
"""

[config]
sim_time_s = 10.0
algorithm = "tahoe"

[[assertions]]
type = "min_packet_loss"
link = "L1"
count = 1
"#,
        )
        .unwrap();
        assert!(run(&scenario).is_err());
    }
}
