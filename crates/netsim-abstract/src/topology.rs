use thiserror::Error;

/// A link line: `link_id endpoint_a endpoint_b rate_Mbps delay_ms buffer_KB`.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkSpec {
    pub id: String,
    pub endpoint_a: String,
    pub endpoint_b: String,
    pub rate_mbps: f64,
    pub delay_ms: f64,
    pub buffer_kb: f64,
}

/// A flow line: `flow_id src_host dest_host data_MB start_s`.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowSpec {
    pub id: String,
    pub src: String,
    pub dest: String,
    pub data_mb: f64,
    pub start_s: f64,
}

/// Parsed topology file: hosts, routers, links, flows, and the optional
/// selector lines forwarded verbatim into the event-log header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Topology {
    pub hosts: Vec<String>,
    pub routers: Vec<String>,
    pub links: Vec<LinkSpec>,
    pub flows: Vec<FlowSpec>,
    pub selectors: Vec<String>,
}

#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("line {line}: expected {expected} fields, found {found}")]
    FieldCount {
        line: usize,
        expected: usize,
        found: usize,
    },
    #[error("line {line}: invalid number '{value}'")]
    InvalidNumber { line: usize, value: String },
    #[error("missing section: the file needs at least hosts, routers, links and flows")]
    MissingSection,
}

fn parse_f64(line: usize, value: &str) -> Result<f64, TopologyError> {
    value.parse().map_err(|_| TopologyError::InvalidNumber {
        line,
        value: value.to_string(),
    })
}

impl Topology {
    /// Parse the plaintext topology format: whitespace-separated fields,
    /// sections separated by a line whose first character is `-`, in the
    /// order hosts, routers, links, flows, then optional selectors. Blank
    /// lines are ignored.
    pub fn parse(input: &str) -> Result<Topology, TopologyError> {
        let mut topology = Topology::default();
        let mut section = 0usize;

        for (idx, raw) in input.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            if line.starts_with('-') {
                section += 1;
                continue;
            }

            match section {
                0 => topology.hosts.push(line.to_string()),
                1 => topology.routers.push(line.to_string()),
                2 => {
                    let fields: Vec<&str> = line.split_whitespace().collect();
                    if fields.len() != 6 {
                        return Err(TopologyError::FieldCount {
                            line: line_no,
                            expected: 6,
                            found: fields.len(),
                        });
                    }
                    topology.links.push(LinkSpec {
                        id: fields[0].to_string(),
                        endpoint_a: fields[1].to_string(),
                        endpoint_b: fields[2].to_string(),
                        rate_mbps: parse_f64(line_no, fields[3])?,
                        delay_ms: parse_f64(line_no, fields[4])?,
                        buffer_kb: parse_f64(line_no, fields[5])?,
                    });
                }
                3 => {
                    let fields: Vec<&str> = line.split_whitespace().collect();
                    if fields.len() != 5 {
                        return Err(TopologyError::FieldCount {
                            line: line_no,
                            expected: 5,
                            found: fields.len(),
                        });
                    }
                    topology.flows.push(FlowSpec {
                        id: fields[0].to_string(),
                        src: fields[1].to_string(),
                        dest: fields[2].to_string(),
                        data_mb: parse_f64(line_no, fields[3])?,
                        start_s: parse_f64(line_no, fields[4])?,
                    });
                }
                _ => topology.selectors.push(line.to_string()),
            }
        }

        if section < 3 {
            return Err(TopologyError::MissingSection);
        }
        Ok(topology)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
H1
H2
-
R1
-
L1 H1 R1 10 10 64
L2 R1 H2 10 10 64
-
F1 H1 H2 20 0.5
-
link_flow_rate
buf_level
";

    #[test]
    fn parses_all_five_sections() {
        let t = Topology::parse(SAMPLE).unwrap();
        assert_eq!(t.hosts, vec!["H1", "H2"]);
        assert_eq!(t.routers, vec!["R1"]);
        assert_eq!(t.links.len(), 2);
        assert_eq!(t.links[0].rate_mbps, 10.0);
        assert_eq!(t.links[1].buffer_kb, 64.0);
        assert_eq!(t.flows.len(), 1);
        assert_eq!(t.flows[0].data_mb, 20.0);
        assert_eq!(t.flows[0].start_s, 0.5);
        assert_eq!(t.selectors, vec!["link_flow_rate", "buf_level"]);
    }

    #[test]
    fn selectors_are_optional() {
        let t = Topology::parse("H1\nH2\n-\n-\nL1 H1 H2 1 1 16\n-\nF1 H1 H2 1 0\n").unwrap();
        assert!(t.routers.is_empty());
        assert!(t.selectors.is_empty());
    }

    #[test]
    fn rejects_short_link_line() {
        let err = Topology::parse("H1\n-\n-\nL1 H1 H2 10\n-\n").unwrap_err();
        assert!(matches!(err, TopologyError::FieldCount { line: 4, .. }));
    }

    #[test]
    fn rejects_bad_number() {
        let err = Topology::parse("H1\n-\n-\nL1 H1 H2 ten 10 64\n-\n").unwrap_err();
        assert!(matches!(err, TopologyError::InvalidNumber { .. }));
    }

    #[test]
    fn rejects_truncated_file() {
        let err = Topology::parse("H1\nH2\n-\nR1\n").unwrap_err();
        assert!(matches!(err, TopologyError::MissingSection));
    }
}
