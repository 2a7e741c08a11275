pub mod config;
pub mod packet;
pub mod scenario;
pub mod time;
pub mod topology;

pub use config::{Algorithm, SimConfig};
pub use packet::{AckPacket, DataPacket, EchoPacket, Packet, SonarPacket, sizes};
pub use scenario::{FaultAction, SimConfigOverride, TestAssertion, TestScenario};
pub use time::{SimTime, millis_to_time, secs_to_time, time_to_secs};
pub use topology::{FlowSpec, LinkSpec, Topology, TopologyError};
