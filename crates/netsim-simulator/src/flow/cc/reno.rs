use super::CongestionControl;
use crate::flow::{FlowCore, FlowCtx, PacketRecord};
use netsim_abstract::SimTime;

enum Mode {
    SlowStart,
    Avoidance,
    /// Fast retransmit / fast recovery. `recover` is the highest packet
    /// outstanding on entry; a cumulative ack at or beyond it ends
    /// recovery, one below it deflates like a timeout.
    Recovery {
        recover: u64,
    },
}

/// TCP Reno: Tahoe plus fast retransmit / fast recovery on the third
/// duplicate ack.
pub(crate) struct Reno {
    mode: Mode,
    state_start: SimTime,
}

impl Reno {
    pub fn new() -> Self {
        Self {
            mode: Mode::SlowStart,
            state_start: 0,
        }
    }

    fn enter_ss(&mut self, core: &mut FlowCore, ctx: &mut FlowCtx<'_>) {
        self.mode = Mode::SlowStart;
        self.state_start = ctx.now;
        core.log_state(ctx, "ss");
    }

    fn enter_ca(&mut self, core: &mut FlowCore, ctx: &mut FlowCtx<'_>) {
        self.mode = Mode::Avoidance;
        self.state_start = ctx.now;
        core.log_state(ctx, "ca");
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
        self.enter_ss(core, ctx);
    }
}

impl CongestionControl for Reno {
    fn start(&mut self, core: &mut FlowCore, ctx: &mut FlowCtx<'_>) {
        self.enter_ss(core, ctx);
    }

    fn on_ack(&mut self, core: &mut FlowCore, ctx: &mut FlowCtx<'_>, record: PacketRecord) {
        match self.mode {
            Mode::SlowStart => {
                if record.timestamp >= self.state_start {
                    let cwnd = core.cwnd();
                    core.set_cwnd(ctx, cwnd + 1.0);
                }
                if core.cwnd() >= core.ssthresh {
                    self.enter_ca(core, ctx);
                }
            }
            Mode::Avoidance => {
                let cwnd = core.cwnd();
                core.set_cwnd(ctx, cwnd + 1.0 / cwnd);
            }
            Mode::Recovery { recover } => {
                if record.number >= recover {
                    // recovery acknowledged: deflate to the threshold
                    let ssthresh = core.ssthresh;
                    core.set_cwnd(ctx, ssthresh);
                    self.enter_ca(core, ctx);
                } else {
                    self.collapse(core, ctx, None);
                }
            }
        }
    }

    fn on_dupack(&mut self, core: &mut FlowCore, ctx: &mut FlowCtx<'_>, ndup: u32) {
        match self.mode {
            Mode::SlowStart | Mode::Avoidance => {
                if ndup == 3 {
                    self.enter_recovery(core, ctx);
                }
            }
            Mode::Recovery { .. } => {
                // window inflation: each duplicate means a packet left
                let cwnd = core.cwnd();
                core.set_cwnd(ctx, cwnd + 1.0);
            }
        }
    }

    fn on_timeout(&mut self, core: &mut FlowCore, ctx: &mut FlowCtx<'_>, record: PacketRecord) {
        match self.mode {
            Mode::SlowStart | Mode::Avoidance => {
                self.collapse(core, ctx, Some(record.timestamp));
            }
            Mode::Recovery { .. } => self.collapse(core, ctx, None),
        }
    }
}
