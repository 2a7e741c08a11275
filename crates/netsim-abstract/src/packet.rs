use crate::time::SimTime;

/// Fixed packet sizes in bytes.
pub mod sizes {
    pub const DATA: u64 = 1024;
    pub const DATA_PAYLOAD: u64 = 1024;
    pub const ACK: u64 = 64;
    pub const SONAR: u64 = 64;
    pub const ECHO: u64 = 64;
}

/// A data segment travelling from a flow's source host to its destination.
///
/// `number` is 1-based and identifies the segment within the flow;
/// `sent_at` is stamped by the sender at each transmission attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPacket {
    pub src: String,
    pub dest: String,
    pub flow: String,
    pub number: u64,
    pub sent_at: SimTime,
}

/// Cumulative acknowledgement: `ack_no` is the smallest packet number the
/// receiver has not yet seen in order.
///
/// `echoed` carries the acknowledged data packet's send timestamp, but only
/// when the ack advanced the receive window; retransmission-triggered acks
/// carry nothing so a later RTT sample cannot be measured against the wrong
/// transmission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckPacket {
    pub src: String,
    pub dest: String,
    pub flow: String,
    pub ack_no: u64,
    pub echoed: Option<SimTime>,
}

/// Routing probe flooded from a host; `version` increases every round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SonarPacket {
    pub src: String,
    pub version: u64,
}

/// Reply to a sonar probe, routed back along the reverse table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EchoPacket {
    pub src: String,
    pub dest: String,
    pub version: u64,
}

/// The packets devices exchange. Dispatch is a `match` under the receiving
/// device rather than virtual methods on the packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Data(DataPacket),
    Ack(AckPacket),
    Sonar(SonarPacket),
    Echo(EchoPacket),
}

impl Packet {
    pub fn size(&self) -> u64 {
        match self {
            Packet::Data(_) => sizes::DATA,
            Packet::Ack(_) => sizes::ACK,
            Packet::Sonar(_) => sizes::SONAR,
            Packet::Echo(_) => sizes::ECHO,
        }
    }

    pub fn is_data(&self) -> bool {
        matches!(self, Packet::Data(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_match_the_wire_contract() {
        let data = Packet::Data(DataPacket {
            src: "H1".into(),
            dest: "H2".into(),
            flow: "F1".into(),
            number: 1,
            sent_at: 0,
        });
        let ack = Packet::Ack(AckPacket {
            src: "H2".into(),
            dest: "H1".into(),
            flow: "F1".into(),
            ack_no: 2,
            echoed: None,
        });
        assert_eq!(data.size(), 1024);
        assert_eq!(ack.size(), 64);
        assert!(data.is_data());
        assert!(!ack.is_data());
    }
}
