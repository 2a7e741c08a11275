use serde::Serialize;
use std::collections::BTreeMap;

/// Serializable post-run summary, written as JSON by the CLI's
/// `--trace-out` and consumed by scenario assertions.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub duration_s: f64,
    pub flows: Vec<FlowReport>,
    pub links: Vec<LinkReport>,
    pub routers: Vec<RouterReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FlowReport {
    pub id: String,
    pub src: String,
    pub dest: String,
    pub num_packets: u64,
    pub packets_sent: u64,
    pub retransmits: u64,
    pub finished_at_s: Option<f64>,
    pub final_cwnd: f64,
}

impl FlowReport {
    pub fn finished(&self) -> bool {
        self.finished_at_s.is_some()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LinkReport {
    pub id: String,
    pub bytes_transmitted: u64,
    pub packets_dropped: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RouterReport {
    pub id: String,
    pub forward: BTreeMap<String, String>,
}

impl SimulationReport {
    pub fn flow(&self, id: &str) -> Option<&FlowReport> {
        self.flows.iter().find(|flow| flow.id == id)
    }

    pub fn link(&self, id: &str) -> Option<&LinkReport> {
        self.links.iter().find(|link| link.id == id)
    }

    pub fn router(&self, id: &str) -> Option<&RouterReport> {
        self.routers.iter().find(|router| router.id == id)
    }
}
