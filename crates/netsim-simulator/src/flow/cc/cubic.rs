use super::CongestionControl;
use crate::flow::{FlowCore, FlowCtx, PacketRecord};
use netsim_abstract::{SimTime, time_to_secs};

const C: f64 = 0.4;
const BETA: f64 = 0.8;

/// CUBIC: after a loss the window follows a cubic curve anchored at the
/// pre-loss maximum `w_max`, concave up to it and convex beyond it.
pub(crate) struct Cubic {
    in_ca: bool,
    state_start: SimTime,
    w_max: f64,
    cubic_thresh: f64,
}

impl Cubic {
    pub fn new() -> Self {
        Self {
            in_ca: false,
            state_start: 0,
            w_max: f64::INFINITY,
            cubic_thresh: f64::INFINITY,
        }
    }

    fn enter_ss(&mut self, core: &mut FlowCore, ctx: &mut FlowCtx<'_>) {
        self.in_ca = false;
        self.state_start = ctx.now;
        self.rederive(core);
        core.log_state(ctx, "ss");
    }

    fn enter_ca(&mut self, core: &mut FlowCore, ctx: &mut FlowCtx<'_>) {
        self.in_ca = true;
        self.state_start = ctx.now;
        self.rederive(core);
        core.log_state(ctx, "ca");
    }

    fn rederive(&mut self, core: &FlowCore) {
        if core.ssthresh.is_finite() {
            self.w_max = core.ssthresh * 2.0;
            self.cubic_thresh = self.w_max * (1.0 - BETA);
        }
    }

    fn loss(&mut self, core: &mut FlowCore, ctx: &mut FlowCtx<'_>, sent_at: SimTime) {
        if sent_at >= self.state_start {
            let half = (core.cwnd() / 2.0).max(1.0);
            core.set_ssthresh(ctx, half);
        }
        core.set_cwnd(ctx, 1.0);
        core.go_back(ctx, None);
        self.enter_ss(core, ctx);
    }
}

impl CongestionControl for Cubic {
    fn start(&mut self, core: &mut FlowCore, ctx: &mut FlowCtx<'_>) {
        self.enter_ss(core, ctx);
    }

    fn on_ack(&mut self, core: &mut FlowCore, ctx: &mut FlowCtx<'_>, _record: PacketRecord) {
        if self.in_ca {
            let k = (self.w_max * BETA / C).cbrt();
            let t = time_to_secs(ctx.now - self.state_start);
            let target = (C * (t - k).powi(3) + self.w_max).max(1.0);
            core.set_cwnd(ctx, target);
        } else {
            let cwnd = core.cwnd();
            core.set_cwnd(ctx, cwnd + 1.0);
            if core.cwnd() >= self.cubic_thresh {
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
