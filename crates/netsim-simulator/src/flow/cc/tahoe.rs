use super::CongestionControl;
use crate::flow::{FlowCore, FlowCtx, PacketRecord};
use netsim_abstract::SimTime;

/// TCP Tahoe: slow start and congestion avoidance. Any loss signal
/// (timeout or third duplicate ack) collapses the window to one and
/// rewinds the sender.
pub(crate) struct Tahoe {
    in_ca: bool,
    state_start: SimTime,
}

impl Tahoe {
    pub fn new() -> Self {
        Self {
            in_ca: false,
            state_start: 0,
        }
    }

    fn enter_ss(&mut self, core: &mut FlowCore, ctx: &mut FlowCtx<'_>) {
        self.in_ca = false;
        self.state_start = ctx.now;
        core.log_state(ctx, "ss");
    }

    fn enter_ca(&mut self, core: &mut FlowCore, ctx: &mut FlowCtx<'_>) {
        self.in_ca = true;
        self.state_start = ctx.now;
        core.log_state(ctx, "ca");
    }

    fn loss(&mut self, core: &mut FlowCore, ctx: &mut FlowCtx<'_>, sent_at: SimTime) {
        // a loss among packets sent under the previous state already paid
        if sent_at >= self.state_start {
            let half = (core.cwnd() / 2.0).max(1.0);
            core.set_ssthresh(ctx, half);
        }
        core.set_cwnd(ctx, 1.0);
        core.go_back(ctx, None);
        self.enter_ss(core, ctx);
    }
}

impl CongestionControl for Tahoe {
    fn start(&mut self, core: &mut FlowCore, ctx: &mut FlowCtx<'_>) {
        self.enter_ss(core, ctx);
    }

    fn on_ack(&mut self, core: &mut FlowCore, ctx: &mut FlowCtx<'_>, record: PacketRecord) {
        if self.in_ca {
            let cwnd = core.cwnd();
            core.set_cwnd(ctx, cwnd + 1.0 / cwnd);
        } else {
            if record.timestamp >= self.state_start {
                let cwnd = core.cwnd();
                core.set_cwnd(ctx, cwnd + 1.0);
            }
            if core.cwnd() >= core.ssthresh {
                self.enter_ca(core, ctx);
            }
        }
    }

    fn on_dupack(&mut self, core: &mut FlowCore, ctx: &mut FlowCtx<'_>, ndup: u32) {
        if ndup == 3 {
            let sent_at = core
                .window
                .get(core.window.offset())
                .map(|record| record.timestamp)
                .unwrap_or(self.state_start);
            self.loss(core, ctx, sent_at);
        }
    }

    fn on_timeout(&mut self, core: &mut FlowCore, ctx: &mut FlowCtx<'_>, record: PacketRecord) {
        self.loss(core, ctx, record.timestamp);
    }
}
