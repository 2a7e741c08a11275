use crate::log::EventLog;
use netsim_abstract::{LinkSpec, Packet, SimTime, millis_to_time, secs_to_time};
use std::collections::VecDeque;

/// One direction of a link: a FIFO of admitted packets plus the byte level
/// they occupy in the shared-per-direction buffer. `busy` is set while the
/// head packet is being serialized.
#[derive(Debug, Default)]
struct Cable {
    queue: VecDeque<Packet>,
    buffered: u64,
    busy: bool,
}

/// Full-duplex link between two devices: two independent cables, one per
/// direction, each with its own finite buffer, serialization rate and
/// propagation delay.
#[derive(Debug)]
pub struct Link {
    id: String,
    endpoints: [String; 2],
    rate_mbps: f64,
    delay: SimTime,
    capacity: u64,
    cables: [Cable; 2],
    pub(crate) drops: u64,
    pub(crate) bytes_transmitted: u64,
}

fn serialization_time(rate_mbps: f64, size: u64) -> SimTime {
    secs_to_time(size as f64 * 8.0 / (rate_mbps * 1e6))
}

impl Link {
    pub(crate) fn new(spec: &LinkSpec) -> Self {
        Self {
            id: spec.id.clone(),
            endpoints: [spec.endpoint_a.clone(), spec.endpoint_b.clone()],
            rate_mbps: spec.rate_mbps,
            delay: millis_to_time(spec.delay_ms),
            capacity: (spec.buffer_kb * 1000.0).round() as u64,
            cables: [Cable::default(), Cable::default()],
            drops: 0,
            bytes_transmitted: 0,
        }
    }

    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    /// Cable index for a packet handed off by `from`, or None if `from` is
    /// not an endpoint of this link.
    pub(crate) fn dir_from(&self, from: &str) -> Option<usize> {
        self.endpoints.iter().position(|e| e == from)
    }

    /// Tail-drop admission. Returns the serialization-complete time when
    /// the cable was idle and service starts now; dropped Data packets log
    /// `packet_loss`, control packets drop silently.
    pub(crate) fn feed(
        &mut self,
        dir: usize,
        packet: Packet,
        now: SimTime,
        log: &mut EventLog,
    ) -> Option<SimTime> {
        let size = packet.size();
        let cable = &mut self.cables[dir];
        if cable.buffered + size > self.capacity {
            self.drops += 1;
            if let Packet::Data(data) = &packet {
                log.packet_loss(now, &self.id, &data.flow, data.number);
            }
            return None;
        }
        cable.buffered += size;
        log.buffer_diff(now, &self.id, size as i64);
        cable.queue.push_back(packet);
        if cable.busy {
            None
        } else {
            cable.busy = true;
            Some(now + serialization_time(self.rate_mbps, size))
        }
    }

    /// The head packet finished serializing: release its buffer bytes,
    /// log the transmission and return the packet, its destination, its
    /// arrival time there, and the completion time of the next packet if
    /// one was waiting.
    pub(crate) fn service_done(
        &mut self,
        dir: usize,
        now: SimTime,
        log: &mut EventLog,
    ) -> (Packet, String, SimTime, Option<SimTime>) {
        let rate_mbps = self.rate_mbps;
        let cable = &mut self.cables[dir];
        let packet = cable
            .queue
            .pop_front()
            .expect("service completion on an empty cable");
        let size = packet.size();
        cable.buffered -= size;
        log.buffer_diff(now, &self.id, -(size as i64));
        log.transmission(now, &self.id, size);
        self.bytes_transmitted += size;

        let next_done = match cable.queue.front() {
            Some(next) => Some(now + serialization_time(rate_mbps, next.size())),
            None => {
                cable.busy = false;
                None
            }
        };
        let to = self.endpoints[1 - dir].clone();
        (packet, to, now + self.delay, next_done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::EventLog;
    use netsim_abstract::{AckPacket, DataPacket};

    fn link(buffer_kb: f64) -> Link {
        Link::new(&LinkSpec {
            id: "L1".into(),
            endpoint_a: "H1".into(),
            endpoint_b: "R1".into(),
            rate_mbps: 10.0,
            delay_ms: 10.0,
            buffer_kb,
        })
    }

    fn data(number: u64) -> Packet {
        Packet::Data(DataPacket {
            src: "H1".into(),
            dest: "H2".into(),
            flow: "F1".into(),
            number,
            sent_at: 0,
        })
    }

    #[test]
    fn serialization_and_propagation_are_sequential() {
        let (mut log, _buffer) = EventLog::memory();
        let mut link = link(64.0);
        let done = link.feed(0, data(1), 0, &mut log).unwrap();
        // 1024 bytes at 10 Mbps
        assert_eq!(done, 819_200);
        let (packet, to, arrival, next) = link.service_done(0, done, &mut log);
        assert!(packet.is_data());
        assert_eq!(to, "R1");
        assert_eq!(arrival, 819_200 + 10_000_000);
        assert!(next.is_none());
    }

    #[test]
    fn queued_packet_starts_service_when_head_leaves() {
        let (mut log, _buffer) = EventLog::memory();
        let mut link = link(64.0);
        let done = link.feed(0, data(1), 0, &mut log).unwrap();
        // second admission while busy: no new service event
        assert!(link.feed(0, data(2), 100, &mut log).is_none());
        let (_, _, _, next) = link.service_done(0, done, &mut log);
        assert_eq!(next, Some(done + 819_200));
    }

    #[test]
    fn tail_drop_logs_loss_for_data_only() {
        let (mut log, buffer) = EventLog::memory();
        // 2100-byte buffer: two data packets fit (2048), nothing more
        let mut link = link(2.1);
        link.feed(0, data(1), 0, &mut log);
        link.feed(0, data(2), 0, &mut log);
        link.feed(0, data(3), 0, &mut log);
        assert_eq!(link.drops, 1);
        assert!(buffer.contents().contains("packet_loss L1 F1 3"));

        let ack = Packet::Ack(AckPacket {
            src: "H2".into(),
            dest: "H1".into(),
            flow: "F1".into(),
            ack_no: 1,
            echoed: None,
        });
        link.feed(0, ack, 0, &mut log);
        assert_eq!(link.drops, 2);
        // control drops are silent
        assert_eq!(buffer.contents().matches("packet_loss").count(), 1);
    }

    #[test]
    fn directions_do_not_share_buffers() {
        let (mut log, _buffer) = EventLog::memory();
        let mut link = link(1.0);
        assert!(link.feed(0, data(1), 0, &mut log).is_some());
        // opposite direction has its own full capacity
        assert!(link.feed(1, data(2), 0, &mut log).is_some());
        assert_eq!(link.drops, 0);
    }
}
