use crate::cable::Link;
use crate::fault::FaultPlan;
use crate::host::Host;
use crate::log::EventLog;
use crate::report::{FlowReport, LinkReport, RouterReport, SimulationReport};
use crate::router::Router;
use netsim_abstract::{Packet, SimConfig, SimTime, secs_to_time, time_to_secs};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::io;
use tracing::debug;

pub(crate) enum Device {
    Host(Host),
    Router(Router),
    Link(Link),
}

#[derive(Debug)]
enum EventKind {
    /// A packet reaches a device (after propagation, for link exits).
    Arrival {
        to: String,
        from: String,
        packet: Packet,
    },
    /// A cable finished serializing its head packet.
    CableDone { link: String, dir: usize },
    FlowStart {
        host: String,
        flow: String,
    },
    FlowAlarm {
        host: String,
        flow: String,
        generation: u64,
    },
    SonarTick {
        host: String,
    },
}

#[derive(Debug)]
struct Event {
    time: SimTime,
    seq: u64, // tie-breaker: same-instant events run in insertion order
    kind: EventKind,
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}

impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        // reversed: the earliest event is the heap maximum
        other
            .time
            .cmp(&self.time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// The simulator: virtual clock, event queue and device graph. All state
/// mutation happens inside `step`, one event at a time.
pub struct Simulator {
    now: SimTime,
    queue: BinaryHeap<Event>,
    seq: u64,
    devices: HashMap<String, Device>,
    config: SimConfig,
    log: EventLog,
    faults: FaultPlan,
    selectors: Vec<String>,
    active_flows: usize,
    host_order: Vec<String>,
    router_order: Vec<String>,
    link_order: Vec<String>,
}

impl std::fmt::Debug for Simulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulator")
            .field("now", &self.now)
            .field("active_flows", &self.active_flows)
            .finish_non_exhaustive()
    }
}

impl Simulator {
    pub(crate) fn assemble(
        devices: HashMap<String, Device>,
        config: SimConfig,
        log: EventLog,
        selectors: Vec<String>,
        host_order: Vec<String>,
        router_order: Vec<String>,
        link_order: Vec<String>,
    ) -> Self {
        Self {
            now: 0,
            queue: BinaryHeap::new(),
            seq: 0,
            devices,
            config,
            log,
            faults: FaultPlan::default(),
            selectors,
            active_flows: 0,
            host_order,
            router_order,
            link_order,
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn current_time(&self) -> f64 {
        time_to_secs(self.now)
    }

    pub fn flows_remaining(&self) -> usize {
        self.active_flows
    }

    /// Register a deterministic fault: drop the first admission of
    /// `packet_no` of `flow` on `link`.
    pub fn add_drop_data_once(&mut self, link: &str, flow: &str, packet_no: u64) {
        self.faults.add_drop_data_once(link, flow, packet_no);
    }

    /// Register seeded random loss on `link`.
    pub fn add_random_loss(&mut self, link: &str, rate: f64, seed: u64) {
        self.faults.add_random_loss(link, rate, seed);
    }

    pub(crate) fn set_faults(&mut self, faults: FaultPlan) {
        self.faults = faults;
    }

    pub(crate) fn schedule_initial_events(&mut self) {
        let hosts = self.host_order.clone();
        for host in &hosts {
            self.push(0, EventKind::SonarTick { host: host.clone() });
        }
        for host_id in &hosts {
            let Some(Device::Host(host)) = self.devices.get(host_id) else {
                continue;
            };
            let starts: Vec<(String, SimTime)> = host
                .flow_ids()
                .map(|flow| {
                    let start = host
                        .flow(flow)
                        .map(|f| f.core.start_at)
                        .unwrap_or_default();
                    (flow.clone(), start)
                })
                .collect();
            self.active_flows += starts.len();
            for (flow, start) in starts {
                self.push(
                    start,
                    EventKind::FlowStart {
                        host: host_id.clone(),
                        flow,
                    },
                );
            }
        }
    }

    /// Run to the configured horizon: emit the log header, then process
    /// events until the queue drains or the next event lies past the end.
    pub fn run(&mut self) {
        let selectors = std::mem::take(&mut self.selectors);
        self.log.header(&selectors);
        let until = secs_to_time(self.config.sim_time_s);
        while self.step(until) {}
    }

    /// Process one event at or before `until`. Returns false when the
    /// queue is empty or the next event lies beyond the horizon.
    pub fn step(&mut self, until: SimTime) -> bool {
        match self.queue.peek() {
            Some(event) if event.time <= until => {}
            _ => return false,
        }
        let event = self.queue.pop().expect("peeked event vanished");
        debug_assert!(event.time >= self.now, "virtual time moved backward");
        self.now = event.time;
        debug!(time = self.now, kind = ?event.kind, "processing event");

        match event.kind {
            EventKind::Arrival { to, from, packet } => self.deliver(to, from, packet),
            EventKind::CableDone { link, dir } => self.cable_done(link, dir),
            EventKind::FlowStart { host, flow } => {
                let now = self.now;
                let Self { devices, log, .. } = self;
                let Some(Device::Host(h)) = devices.get_mut(&host) else {
                    return true;
                };
                let out = h.start_flow(&flow, now, log);
                let port = h.port().map(str::to_string);
                self.apply_host_output(&host, port, out);
            }
            EventKind::FlowAlarm {
                host,
                flow,
                generation,
            } => {
                let now = self.now;
                let Self { devices, log, .. } = self;
                let Some(Device::Host(h)) = devices.get_mut(&host) else {
                    return true;
                };
                let out = h.flow_alarm(&flow, generation, now, log);
                let port = h.port().map(str::to_string);
                self.apply_host_output(&host, port, out);
            }
            EventKind::SonarTick { host } => {
                let Some(Device::Host(h)) = self.devices.get_mut(&host) else {
                    return true;
                };
                let probe = h.sonar_tick();
                let port = h.port().map(str::to_string);
                if let Some(port) = port {
                    self.feed_link(&port, &host, probe);
                }
                let next = self.now + secs_to_time(self.config.sonar_period_s);
                self.push(next, EventKind::SonarTick { host });
            }
        }
        true
    }

    fn deliver(&mut self, to: String, from: String, packet: Packet) {
        match self.devices.get(&to) {
            Some(Device::Link(_)) => self.feed_link(&to, &from, packet),
            Some(Device::Router(_)) => {
                let outs = {
                    let Some(Device::Router(router)) = self.devices.get_mut(&to) else {
                        unreachable!();
                    };
                    router.handle(packet, &from)
                };
                for (port, packet) in outs {
                    self.feed_link(&port, &to, packet);
                }
            }
            Some(Device::Host(_)) => {
                let now = self.now;
                let Self { devices, log, .. } = self;
                let Some(Device::Host(host)) = devices.get_mut(&to) else {
                    unreachable!();
                };
                let out = host.handle_arrival(packet, now, log);
                let port = host.port().map(str::to_string);
                self.apply_host_output(&to, port, out);
            }
            None => debug!(device = %to, "packet for unknown device dropped"),
        }
    }

    fn apply_host_output(&mut self, host: &str, port: Option<String>, out: crate::host::HostOutput) {
        if let Some(port) = port {
            for packet in out.sends {
                self.feed_link(&port, host, packet);
            }
        }
        if let Some(req) = out.alarm {
            self.push(
                req.at,
                EventKind::FlowAlarm {
                    host: host.to_string(),
                    flow: req.flow,
                    generation: req.generation,
                },
            );
        }
        if out.finished {
            self.active_flows = self.active_flows.saturating_sub(1);
        }
    }

    fn feed_link(&mut self, link_id: &str, from: &str, packet: Packet) {
        let now = self.now;
        let Self {
            devices,
            log,
            faults,
            ..
        } = self;
        let Some(Device::Link(link)) = devices.get_mut(link_id) else {
            debug!(link = %link_id, "hand-off to a non-link dropped");
            return;
        };
        let Some(dir) = link.dir_from(from) else {
            debug!(link = %link_id, from = %from, "hand-off from a non-endpoint dropped");
            return;
        };
        if faults.should_drop(link_id, &packet) {
            link.drops += 1;
            if let Packet::Data(data) = &packet {
                log.packet_loss(now, link_id, &data.flow, data.number);
            }
            return;
        }
        if let Some(done_at) = link.feed(dir, packet, now, log) {
            self.push(
                done_at,
                EventKind::CableDone {
                    link: link_id.to_string(),
                    dir,
                },
            );
        }
    }

    fn cable_done(&mut self, link_id: String, dir: usize) {
        let now = self.now;
        let Self { devices, log, .. } = self;
        let Some(Device::Link(link)) = devices.get_mut(&link_id) else {
            return;
        };
        let (packet, to, arrival, next_done) = link.service_done(dir, now, log);
        self.push(
            arrival,
            EventKind::Arrival {
                to,
                from: link_id.clone(),
                packet,
            },
        );
        if let Some(done_at) = next_done {
            self.push(done_at, EventKind::CableDone { link: link_id, dir });
        }
    }

    fn push(&mut self, time: SimTime, kind: EventKind) {
        self.queue.push(Event {
            time,
            seq: self.seq,
            kind,
        });
        self.seq += 1;
    }

    /// Forward-table entry of a router, for tests and reports.
    pub fn router_forward(&self, router: &str, dest: &str) -> Option<&str> {
        match self.devices.get(router) {
            Some(Device::Router(r)) => r.forward_entry(dest),
            _ => None,
        }
    }

    /// Serializable post-run summary.
    pub fn export_report(&self) -> SimulationReport {
        let mut flows = Vec::new();
        for host_id in &self.host_order {
            let Some(Device::Host(host)) = self.devices.get(host_id) else {
                continue;
            };
            for flow_id in host.flow_ids() {
                let Some(flow) = host.flow(flow_id) else {
                    continue;
                };
                flows.push(FlowReport {
                    id: flow.core.id.clone(),
                    src: flow.core.src.clone(),
                    dest: flow.core.dest.clone(),
                    num_packets: flow.core.num_packets,
                    packets_sent: flow.core.sent,
                    retransmits: flow.core.retransmits,
                    finished_at_s: flow.core.finished_at.map(time_to_secs),
                    final_cwnd: flow.core.cwnd(),
                });
            }
        }
        let links = self
            .link_order
            .iter()
            .filter_map(|id| match self.devices.get(id) {
                Some(Device::Link(link)) => Some(LinkReport {
                    id: link.id().to_string(),
                    bytes_transmitted: link.bytes_transmitted,
                    packets_dropped: link.drops,
                }),
                _ => None,
            })
            .collect();
        let routers = self
            .router_order
            .iter()
            .filter_map(|id| match self.devices.get(id) {
                Some(Device::Router(router)) => Some(RouterReport {
                    id: router.id().to_string(),
                    forward: router
                        .forward_table()
                        .iter()
                        .map(|(dest, port)| (dest.clone(), port.clone()))
                        .collect(),
                }),
                _ => None,
            })
            .collect();
        SimulationReport {
            duration_s: time_to_secs(self.now),
            flows,
            links,
            routers,
        }
    }

    /// Flush the event log, surfacing any write error from the run.
    pub fn finish_log(&mut self) -> io::Result<()> {
        self.log.finish_writes()
    }
}
