use netsim_abstract::{FaultAction, Packet};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

struct DropOnce {
    link: String,
    flow: String,
    packet_no: u64,
    armed: bool,
}

struct RandomLoss {
    link: String,
    rate: f64,
    rng: StdRng,
}

/// Faults injected at cable admission, before the tail-drop check.
///
/// Deterministic one-shot drops target the first admission of a specific
/// data packet; random loss draws from a generator seeded per rule, so a
/// rerun with the same plan reproduces the same drops.
#[derive(Default)]
pub struct FaultPlan {
    drops: Vec<DropOnce>,
    losses: Vec<RandomLoss>,
}

impl FaultPlan {
    pub fn from_actions(actions: &[FaultAction]) -> Self {
        let mut plan = FaultPlan::default();
        for action in actions {
            match action {
                FaultAction::DropDataOnce {
                    link,
                    flow,
                    packet_no,
                } => plan.add_drop_data_once(link, flow, *packet_no),
                FaultAction::RandomLoss { link, rate, seed } => {
                    plan.add_random_loss(link, *rate, *seed)
                }
            }
        }
        plan
    }

    pub fn add_drop_data_once(&mut self, link: &str, flow: &str, packet_no: u64) {
        self.drops.push(DropOnce {
            link: link.to_string(),
            flow: flow.to_string(),
            packet_no,
            armed: true,
        });
    }

    pub fn add_random_loss(&mut self, link: &str, rate: f64, seed: u64) {
        self.losses.push(RandomLoss {
            link: link.to_string(),
            rate,
            rng: StdRng::seed_from_u64(seed),
        });
    }

    pub(crate) fn should_drop(&mut self, link: &str, packet: &Packet) -> bool {
        if let Packet::Data(data) = packet {
            for drop in &mut self.drops {
                if drop.armed
                    && drop.link == link
                    && drop.flow == data.flow
                    && drop.packet_no == data.number
                {
                    drop.armed = false;
                    return true;
                }
            }
        }
        for loss in &mut self.losses {
            if loss.link == link && loss.rng.random::<f64>() < loss.rate {
                return true;
            }
        }
        false
    }
}
