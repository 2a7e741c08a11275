use crate::flow::{AlarmReq, Flow, FlowCtx};
use crate::log::EventLog;
use netsim_abstract::{AckPacket, Algorithm, EchoPacket, FlowSpec, Packet, SimTime, SonarPacket};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

/// Receive-side go-back-N acker with selective bookkeeping: `expected` is
/// the smallest never-seen number, out-of-order arrivals wait in a
/// min-heap and are drained as the gap fills.
#[derive(Debug)]
pub(crate) struct Acker {
    expected: u64,
    partial: BinaryHeap<Reverse<u64>>,
}

impl Default for Acker {
    fn default() -> Self {
        Self {
            expected: 1,
            partial: BinaryHeap::new(),
        }
    }
}

impl Acker {
    /// Feed an arriving packet number; returns the ack number to send, or
    /// None for a number already covered.
    pub fn input(&mut self, number: u64) -> Option<u64> {
        if number < self.expected {
            return None;
        }
        if number == self.expected {
            self.expected += 1;
            while let Some(&Reverse(top)) = self.partial.peek() {
                if top > self.expected {
                    break;
                }
                self.partial.pop();
                if top == self.expected {
                    self.expected += 1;
                }
            }
        } else {
            self.partial.push(Reverse(number));
        }
        Some(self.expected)
    }
}

/// What a host handler asks the engine to do afterwards: feed packets onto
/// the host's single link, arm a flow alarm, account a finished flow.
#[derive(Default)]
pub(crate) struct HostOutput {
    pub sends: Vec<Packet>,
    pub alarm: Option<AlarmReq>,
    pub finished: bool,
}

/// An edge device: sources its flows, acknowledges arriving data, and
/// probes the network with a sonar round every few seconds.
pub struct Host {
    id: String,
    port: Option<String>,
    flows: HashMap<String, Flow>,
    flow_order: Vec<String>,
    ackers: HashMap<String, Acker>,
    sonar_version: u64,
}

impl Host {
    pub(crate) fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            port: None,
            flows: HashMap::new(),
            flow_order: Vec::new(),
            ackers: HashMap::new(),
            sonar_version: 0,
        }
    }

    pub(crate) fn port(&self) -> Option<&str> {
        self.port.as_deref()
    }

    /// Attach the single port; false when the host already has one.
    pub(crate) fn attach(&mut self, port: String) -> bool {
        if self.port.is_some() {
            return false;
        }
        self.port = Some(port);
        true
    }

    pub(crate) fn add_flow(&mut self, spec: &FlowSpec, algorithm: Algorithm) {
        self.flow_order.push(spec.id.clone());
        self.flows.insert(spec.id.clone(), Flow::new(spec, algorithm));
    }

    pub(crate) fn flow_ids(&self) -> impl Iterator<Item = &String> {
        self.flow_order.iter()
    }

    pub(crate) fn flow(&self, id: &str) -> Option<&Flow> {
        self.flows.get(id)
    }

    /// Next sonar round: bump the version and emit the probe.
    pub(crate) fn sonar_tick(&mut self) -> Packet {
        self.sonar_version += 1;
        Packet::Sonar(SonarPacket {
            src: self.id.clone(),
            version: self.sonar_version,
        })
    }

    pub(crate) fn start_flow(
        &mut self,
        flow_id: &str,
        now: SimTime,
        log: &mut EventLog,
    ) -> HostOutput {
        let mut out = HostOutput::default();
        if let Some(flow) = self.flows.get_mut(flow_id) {
            let mut ctx = FlowCtx {
                now,
                log,
                sends: &mut out.sends,
                alarm: &mut out.alarm,
            };
            flow.start(&mut ctx);
        }
        out
    }

    pub(crate) fn flow_alarm(
        &mut self,
        flow_id: &str,
        generation: u64,
        now: SimTime,
        log: &mut EventLog,
    ) -> HostOutput {
        let mut out = HostOutput::default();
        if let Some(flow) = self.flows.get_mut(flow_id) {
            let mut ctx = FlowCtx {
                now,
                log,
                sends: &mut out.sends,
                alarm: &mut out.alarm,
            };
            flow.on_alarm(&mut ctx, generation);
        }
        out
    }

    pub(crate) fn handle_arrival(
        &mut self,
        packet: Packet,
        now: SimTime,
        log: &mut EventLog,
    ) -> HostOutput {
        let mut out = HostOutput::default();
        match packet {
            Packet::Data(data) => {
                if data.dest != self.id {
                    return out;
                }
                log.receive_data(now, &data.flow, &self.id, data.number);
                let acker = self.ackers.entry(data.flow.clone()).or_default();
                if let Some(ack_no) = acker.input(data.number) {
                    // echo the send timestamp only on cumulative advance,
                    // so retransmissions never feed the RTT estimator
                    let echoed = if ack_no > data.number {
                        Some(data.sent_at)
                    } else {
                        None
                    };
                    log.send_ack(now, &data.flow, &self.id, ack_no);
                    out.sends.push(Packet::Ack(AckPacket {
                        src: self.id.clone(),
                        dest: data.src,
                        flow: data.flow,
                        ack_no,
                        echoed,
                    }));
                }
            }
            Packet::Ack(ack) => {
                if ack.dest != self.id {
                    return out;
                }
                log.receive_ack(now, &ack.flow, &self.id, ack.ack_no);
                if let Some(flow) = self.flows.get_mut(&ack.flow) {
                    let mut ctx = FlowCtx {
                        now,
                        log,
                        sends: &mut out.sends,
                        alarm: &mut out.alarm,
                    };
                    out.finished = flow.get_ack(&mut ctx, ack.ack_no, ack.echoed);
                }
            }
            Packet::Sonar(sonar) => {
                if sonar.src != self.id {
                    out.sends.push(Packet::Echo(EchoPacket {
                        src: sonar.src,
                        dest: self.id.clone(),
                        version: sonar.version,
                    }));
                }
            }
            Packet::Echo(_) => {}
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netsim_abstract::DataPacket;

    #[test]
    fn acker_advances_in_order() {
        let mut acker = Acker::default();
        assert_eq!(acker.input(1), Some(2));
        assert_eq!(acker.input(2), Some(3));
        assert_eq!(acker.input(3), Some(4));
    }

    #[test]
    fn acker_holds_gaps_and_drains_them() {
        let mut acker = Acker::default();
        assert_eq!(acker.input(1), Some(2));
        // gap at 2: later arrivals keep acking 2
        assert_eq!(acker.input(3), Some(2));
        assert_eq!(acker.input(4), Some(2));
        // the hole fills and the heap drains through it
        assert_eq!(acker.input(2), Some(5));
    }

    #[test]
    fn acker_ignores_already_covered_numbers() {
        let mut acker = Acker::default();
        acker.input(1);
        acker.input(2);
        assert_eq!(acker.input(1), None);
    }

    #[test]
    fn acker_tolerates_duplicate_out_of_order_arrivals() {
        let mut acker = Acker::default();
        assert_eq!(acker.input(3), Some(1));
        assert_eq!(acker.input(3), Some(1));
        assert_eq!(acker.input(2), Some(1));
        assert_eq!(acker.input(1), Some(4));
    }

    fn data(dest: &str, number: u64, sent_at: SimTime) -> Packet {
        Packet::Data(DataPacket {
            src: "H1".into(),
            dest: dest.into(),
            flow: "F1".into(),
            number,
            sent_at,
        })
    }

    #[test]
    fn in_order_data_echoes_the_send_timestamp() {
        let (mut log, _buffer) = EventLog::memory();
        let mut host = Host::new("H2");
        let out = host.handle_arrival(data("H2", 1, 42), 100, &mut log);
        assert_eq!(out.sends.len(), 1);
        let Packet::Ack(ack) = &out.sends[0] else {
            panic!("expected an ack");
        };
        assert_eq!(ack.ack_no, 2);
        assert_eq!(ack.echoed, Some(42));
        assert_eq!(ack.dest, "H1");
    }

    #[test]
    fn out_of_order_data_acks_without_echo() {
        let (mut log, _buffer) = EventLog::memory();
        let mut host = Host::new("H2");
        host.handle_arrival(data("H2", 1, 10), 100, &mut log);
        let out = host.handle_arrival(data("H2", 3, 30), 200, &mut log);
        let Packet::Ack(ack) = &out.sends[0] else {
            panic!("expected an ack");
        };
        assert_eq!(ack.ack_no, 2);
        assert_eq!(ack.echoed, None);
    }

    #[test]
    fn foreign_data_is_discarded() {
        let (mut log, buffer) = EventLog::memory();
        let mut host = Host::new("H3");
        let out = host.handle_arrival(data("H2", 1, 0), 100, &mut log);
        assert!(out.sends.is_empty());
        assert!(buffer.contents().is_empty());
    }

    #[test]
    fn sonar_gets_an_echo_back() {
        let (mut log, _buffer) = EventLog::memory();
        let mut host = Host::new("H2");
        let out = host.handle_arrival(
            Packet::Sonar(SonarPacket {
                src: "H1".into(),
                version: 3,
            }),
            0,
            &mut log,
        );
        assert_eq!(
            out.sends,
            vec![Packet::Echo(EchoPacket {
                src: "H1".into(),
                dest: "H2".into(),
                version: 3,
            })]
        );

        // a host's own probe coming back around is not echoed
        let out = host.handle_arrival(
            Packet::Sonar(SonarPacket {
                src: "H2".into(),
                version: 1,
            }),
            0,
            &mut log,
        );
        assert!(out.sends.is_empty());
    }
}
