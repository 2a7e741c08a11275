use crate::cable::Link;
use crate::engine::{Device, Simulator};
use crate::host::Host;
use crate::log::EventLog;
use crate::router::Router;
use netsim_abstract::{SimConfig, Topology};
use std::collections::HashMap;
use thiserror::Error;

/// Configuration errors, reported before the simulation starts.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("duplicate device id '{0}'")]
    DuplicateDevice(String),
    #[error("link '{link}' references unknown device '{endpoint}'")]
    UnknownEndpoint { link: String, endpoint: String },
    #[error("link '{link}' endpoint '{endpoint}' is itself a link")]
    LinkAsEndpoint { link: String, endpoint: String },
    #[error("host '{0}' is attached to more than one link")]
    HostDegree(String),
    #[error("flow '{flow}' endpoint '{endpoint}' is not a host")]
    FlowEndpoint { flow: String, endpoint: String },
    #[error("duplicate flow id '{0}'")]
    DuplicateFlow(String),
}

/// Validate a parsed topology and wire it into a ready-to-run simulator:
/// hosts and routers first, then links attached to both endpoints, then
/// flows on their source hosts, with the initial sonar and flow-start
/// events scheduled.
pub fn build(
    topology: &Topology,
    config: SimConfig,
    log: EventLog,
) -> Result<Simulator, BuildError> {
    let mut devices: HashMap<String, Device> = HashMap::new();

    for id in &topology.hosts {
        if devices.contains_key(id) {
            return Err(BuildError::DuplicateDevice(id.clone()));
        }
        devices.insert(id.clone(), Device::Host(Host::new(id)));
    }
    for id in &topology.routers {
        if devices.contains_key(id) {
            return Err(BuildError::DuplicateDevice(id.clone()));
        }
        devices.insert(id.clone(), Device::Router(Router::new(id)));
    }

    for spec in &topology.links {
        if devices.contains_key(&spec.id) {
            return Err(BuildError::DuplicateDevice(spec.id.clone()));
        }
        for endpoint in [&spec.endpoint_a, &spec.endpoint_b] {
            match devices.get_mut(endpoint) {
                Some(Device::Host(host)) => {
                    if !host.attach(spec.id.clone()) {
                        return Err(BuildError::HostDegree(endpoint.clone()));
                    }
                }
                Some(Device::Router(router)) => router.attach(spec.id.clone()),
                Some(Device::Link(_)) => {
                    return Err(BuildError::LinkAsEndpoint {
                        link: spec.id.clone(),
                        endpoint: endpoint.clone(),
                    });
                }
                None => {
                    return Err(BuildError::UnknownEndpoint {
                        link: spec.id.clone(),
                        endpoint: endpoint.clone(),
                    });
                }
            }
        }
        devices.insert(spec.id.clone(), Device::Link(Link::new(spec)));
    }

    let mut flow_ids = Vec::new();
    for spec in &topology.flows {
        if flow_ids.contains(&spec.id) {
            return Err(BuildError::DuplicateFlow(spec.id.clone()));
        }
        flow_ids.push(spec.id.clone());
        for endpoint in [&spec.src, &spec.dest] {
            if !matches!(devices.get(endpoint), Some(Device::Host(_))) {
                return Err(BuildError::FlowEndpoint {
                    flow: spec.id.clone(),
                    endpoint: endpoint.clone(),
                });
            }
        }
        let Some(Device::Host(host)) = devices.get_mut(&spec.src) else {
            unreachable!();
        };
        host.add_flow(spec, config.algorithm);
    }

    let mut simulator = Simulator::assemble(
        devices,
        config,
        log,
        topology.selectors.clone(),
        topology.hosts.clone(),
        topology.routers.clone(),
        topology.links.iter().map(|l| l.id.clone()).collect(),
    );
    simulator.schedule_initial_events();
    Ok(simulator)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Topology {
        Topology::parse(text).unwrap()
    }

    #[test]
    fn builds_a_two_host_chain() {
        let topology = parse("H1\nH2\n-\nR1\n-\nL1 H1 R1 10 10 64\nL2 R1 H2 10 10 64\n-\nF1 H1 H2 1 0.5\n");
        let (log, _buffer) = EventLog::memory();
        let sim = build(&topology, SimConfig::default(), log).unwrap();
        assert_eq!(sim.flows_remaining(), 1);
    }

    #[test]
    fn rejects_duplicate_device_ids() {
        let topology = parse("H1\nH1\n-\n-\nL1 H1 H1 10 10 64\n-\n");
        let (log, _buffer) = EventLog::memory();
        let err = build(&topology, SimConfig::default(), log).unwrap_err();
        assert!(matches!(err, BuildError::DuplicateDevice(id) if id == "H1"));
    }

    #[test]
    fn rejects_unknown_link_endpoint() {
        let topology = parse("H1\nH2\n-\n-\nL1 H1 H9 10 10 64\n-\n");
        let (log, _buffer) = EventLog::memory();
        let err = build(&topology, SimConfig::default(), log).unwrap_err();
        assert!(matches!(err, BuildError::UnknownEndpoint { endpoint, .. } if endpoint == "H9"));
    }

    #[test]
    fn rejects_host_with_two_links() {
        let topology =
            parse("H1\nH2\n-\nR1\n-\nL1 H1 R1 10 10 64\nL2 H1 H2 10 10 64\n-\n");
        let (log, _buffer) = EventLog::memory();
        let err = build(&topology, SimConfig::default(), log).unwrap_err();
        assert!(matches!(err, BuildError::HostDegree(id) if id == "H1"));
    }

    #[test]
    fn rejects_flow_from_a_router() {
        let topology = parse("H1\nH2\n-\nR1\n-\nL1 H1 R1 10 10 64\nL2 R1 H2 10 10 64\n-\nF1 R1 H2 1 0\n");
        let (log, _buffer) = EventLog::memory();
        let err = build(&topology, SimConfig::default(), log).unwrap_err();
        assert!(matches!(err, BuildError::FlowEndpoint { endpoint, .. } if endpoint == "R1"));
    }
}
