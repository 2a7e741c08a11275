use super::CongestionControl;
use crate::flow::{FlowCore, FlowCtx, PacketRecord};
use netsim_abstract::SimTime;

const GAMMA: f64 = 0.05;
const ALPHA: f64 = 3.0;

enum Mode {
    Steady,
    Recovery { recover: u64 },
}

/// FAST TCP: a delay-based window update on every new ack. Loss handling
/// falls back to the Reno rules, returning to the single steady state
/// afterwards.
pub(crate) struct Fast {
    mode: Mode,
    state_start: SimTime,
    avg_rtt: Option<f64>,
}

impl Fast {
    pub fn new() -> Self {
        Self {
            mode: Mode::Steady,
            state_start: 0,
            avg_rtt: None,
        }
    }

    fn enter_steady(&mut self, core: &mut FlowCore, ctx: &mut FlowCtx<'_>) {
        self.mode = Mode::Steady;
        self.state_start = ctx.now;
        core.log_state(ctx, "fast");
    }

    fn enter_recovery(&mut self, core: &mut FlowCore, ctx: &mut FlowCtx<'_>) {
        let half = (core.cwnd() / 2.0).max(1.0);
        core.set_ssthresh(ctx, half);
        core.set_cwnd(ctx, half + 3.0);
        core.schedule_retransmit(core.window.offset());
        self.mode = Mode::Recovery {
            recover: core.packet_cursor - 1,
        };
        self.state_start = ctx.now;
        core.log_state(ctx, "frfr");
    }

    fn collapse(&mut self, core: &mut FlowCore, ctx: &mut FlowCtx<'_>, sent_at: Option<SimTime>) {
        if let Some(sent_at) = sent_at {
            if sent_at >= self.state_start {
                let half = (core.cwnd() / 2.0).max(1.0);
                core.set_ssthresh(ctx, half);
            }
        }
        core.set_cwnd(ctx, 1.0);
        core.go_back(ctx, None);
        self.enter_steady(core, ctx);
    }

    fn steady_update(&mut self, core: &mut FlowCore, ctx: &mut FlowCtx<'_>) {
        let curr = core.curr_rtt;
        if curr <= 0.0 || !core.base_rtt.is_finite() {
            return;
        }
        let cwnd = core.cwnd();
        let weight = (3.0 / cwnd).min(0.25);
        let avg = match self.avg_rtt {
            Some(avg) => (1.0 - weight) * avg + weight * curr,
            None => curr,
        };
        self.avg_rtt = Some(avg);

        let ratio = core.base_rtt / curr;
        let target = (1.0 - GAMMA) * cwnd + GAMMA * (ratio * cwnd + ALPHA);
        core.set_cwnd(ctx, (2.0 * cwnd).min(target));
    }
}

impl CongestionControl for Fast {
    fn start(&mut self, core: &mut FlowCore, ctx: &mut FlowCtx<'_>) {
        self.enter_steady(core, ctx);
    }

    fn on_ack(&mut self, core: &mut FlowCore, ctx: &mut FlowCtx<'_>, record: PacketRecord) {
        match self.mode {
            Mode::Steady => self.steady_update(core, ctx),
            Mode::Recovery { recover } => {
                if record.number >= recover {
                    let ssthresh = core.ssthresh;
                    core.set_cwnd(ctx, ssthresh);
                    self.enter_steady(core, ctx);
                } else {
                    self.collapse(core, ctx, None);
                }
            }
        }
    }

    fn on_dupack(&mut self, core: &mut FlowCore, ctx: &mut FlowCtx<'_>, ndup: u32) {
        match self.mode {
            Mode::Steady => {
                if ndup == 3 {
                    self.enter_recovery(core, ctx);
                }
            }
            Mode::Recovery { .. } => {
                let cwnd = core.cwnd();
                core.set_cwnd(ctx, cwnd + 1.0);
            }
        }
    }

    fn on_timeout(&mut self, core: &mut FlowCore, ctx: &mut FlowCtx<'_>, record: PacketRecord) {
        let sent_at = match self.mode {
            Mode::Steady => Some(record.timestamp),
            Mode::Recovery { .. } => None,
        };
        self.collapse(core, ctx, sent_at);
    }
}
