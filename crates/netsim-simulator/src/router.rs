use netsim_abstract::Packet;
use std::collections::HashMap;

/// Store-and-forward router.
///
/// `forward` routes Data/Ack packets by destination host; `reverse` and
/// `version` belong to the control plane: each sonar round floods the
/// network reverse-path style, and the returning echoes walk `reverse`
/// back toward the probing host, teaching `forward` entries for the
/// echoing host on the way.
#[derive(Debug)]
pub struct Router {
    id: String,
    ports: Vec<String>,
    forward: HashMap<String, String>,
    reverse: HashMap<String, String>,
    version: HashMap<String, u64>,
}

impl Router {
    pub(crate) fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            ports: Vec::new(),
            forward: HashMap::new(),
            reverse: HashMap::new(),
            version: HashMap::new(),
        }
    }

    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn attach(&mut self, port: String) {
        self.ports.push(port);
    }

    pub fn forward_entry(&self, dest: &str) -> Option<&str> {
        self.forward.get(dest).map(String::as_str)
    }

    pub(crate) fn forward_table(&self) -> &HashMap<String, String> {
        &self.forward
    }

    /// Dispatch an arriving packet; returns `(out_port, packet)` pairs for
    /// the engine to feed into the corresponding links.
    pub(crate) fn handle(&mut self, packet: Packet, from: &str) -> Vec<(String, Packet)> {
        match packet {
            Packet::Data(_) | Packet::Ack(_) => {
                let dest = match &packet {
                    Packet::Data(data) => &data.dest,
                    Packet::Ack(ack) => &ack.dest,
                    _ => unreachable!(),
                };
                match self.forward.get(dest) {
                    Some(port) => vec![(port.clone(), packet)],
                    // table miss: flood so early traffic survives until the
                    // first sonar round lands
                    None => self.broadcast_except(from, packet),
                }
            }
            Packet::Sonar(sonar) => {
                let seen = self.version.get(&sonar.src).copied().unwrap_or(0);
                if seen < sonar.version {
                    self.version.insert(sonar.src.clone(), sonar.version);
                    self.reverse.insert(sonar.src.clone(), from.to_string());
                    self.broadcast_except(from, Packet::Sonar(sonar))
                } else {
                    Vec::new()
                }
            }
            Packet::Echo(echo) => {
                if self.version.get(&echo.src).copied() == Some(echo.version) {
                    self.forward.insert(echo.dest.clone(), from.to_string());
                    match self.reverse.get(&echo.src) {
                        Some(port) => vec![(port.clone(), Packet::Echo(echo))],
                        None => Vec::new(),
                    }
                } else {
                    // stale echo from an earlier round
                    Vec::new()
                }
            }
        }
    }

    fn broadcast_except(&self, from: &str, packet: Packet) -> Vec<(String, Packet)> {
        self.ports
            .iter()
            .filter(|port| port.as_str() != from)
            .map(|port| (port.clone(), packet.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netsim_abstract::{AckPacket, DataPacket, EchoPacket, SonarPacket};

    fn data(dest: &str) -> Packet {
        Packet::Data(DataPacket {
            src: "H1".into(),
            dest: dest.into(),
            flow: "F1".into(),
            number: 1,
            sent_at: 0,
        })
    }

    fn router_with_ports(ports: &[&str]) -> Router {
        let mut router = Router::new("R1");
        for port in ports {
            router.attach(port.to_string());
        }
        router
    }

    #[test]
    fn data_follows_forward_table_or_floods() {
        let mut router = router_with_ports(&["L1", "L2", "L3"]);
        let out = router.handle(data("H2"), "L1");
        // no table yet: flood everywhere but the arrival port
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|(port, _)| port != "L1"));

        router.forward.insert("H2".into(), "L3".into());
        let out = router.handle(data("H2"), "L1");
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].0, "L3");
    }

    #[test]
    fn sonar_is_version_gated() {
        let mut router = router_with_ports(&["L1", "L2", "L3"]);
        let sonar = Packet::Sonar(SonarPacket {
            src: "H1".into(),
            version: 1,
        });
        let out = router.handle(sonar.clone(), "L1");
        assert_eq!(out.len(), 2);
        assert_eq!(router.reverse.get("H1"), Some(&"L1".to_string()));

        // same round arriving on a slower port is dropped, reverse stays
        let out = router.handle(sonar, "L2");
        assert!(out.is_empty());
        assert_eq!(router.reverse.get("H1"), Some(&"L1".to_string()));
    }

    #[test]
    fn echo_teaches_forward_and_walks_reverse() {
        let mut router = router_with_ports(&["L1", "L2"]);
        router.handle(
            Packet::Sonar(SonarPacket {
                src: "H1".into(),
                version: 1,
            }),
            "L1",
        );
        let out = router.handle(
            Packet::Echo(EchoPacket {
                src: "H1".into(),
                dest: "H2".into(),
                version: 1,
            }),
            "L2",
        );
        assert_eq!(router.forward_entry("H2"), Some("L2"));
        assert_eq!(out, vec![(
            "L1".to_string(),
            Packet::Echo(EchoPacket {
                src: "H1".into(),
                dest: "H2".into(),
                version: 1,
            })
        )]);

        // an echo from a stale round is ignored
        let out = router.handle(
            Packet::Echo(EchoPacket {
                src: "H1".into(),
                dest: "H3".into(),
                version: 0,
            }),
            "L2",
        );
        assert!(out.is_empty());
        assert_eq!(router.forward_entry("H3"), None);
    }

    #[test]
    fn acks_route_like_data() {
        let mut router = router_with_ports(&["L1", "L2"]);
        router.forward.insert("H1".into(), "L1".into());
        let ack = Packet::Ack(AckPacket {
            src: "H2".into(),
            dest: "H1".into(),
            flow: "F1".into(),
            ack_no: 2,
            echoed: None,
        });
        let out = router.handle(ack, "L2");
        assert_eq!(out[0].0, "L1");
    }
}
