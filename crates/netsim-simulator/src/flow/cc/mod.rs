mod cubic;
mod fast;
mod reno;
mod tahoe;

use super::{FlowCore, FlowCtx, PacketRecord};
use netsim_abstract::Algorithm;

/// A congestion-control variant. The window/timer machinery is shared;
/// variants differ only in how they react to these three events. Each
/// state transition records its entry time so events caused by packets
/// sent before the transition can be ignored.
pub(crate) trait CongestionControl {
    /// The flow is starting; log the initial state.
    fn start(&mut self, core: &mut FlowCore, ctx: &mut FlowCtx<'_>);

    /// A new cumulative ack arrived for `record`.
    fn on_ack(&mut self, core: &mut FlowCore, ctx: &mut FlowCtx<'_>, record: PacketRecord);

    /// The `ndup`-th duplicate of the last cumulative ack arrived.
    fn on_dupack(&mut self, core: &mut FlowCore, ctx: &mut FlowCtx<'_>, ndup: u32);

    /// The retransmission alarm fired for `record`.
    fn on_timeout(&mut self, core: &mut FlowCore, ctx: &mut FlowCtx<'_>, record: PacketRecord);
}

pub(crate) fn make(algorithm: Algorithm) -> Box<dyn CongestionControl> {
    match algorithm {
        Algorithm::Tahoe => Box::new(tahoe::Tahoe::new()),
        Algorithm::Reno => Box::new(reno::Reno::new()),
        Algorithm::Fast => Box::new(fast::Fast::new()),
        Algorithm::Cubic => Box::new(cubic::Cubic::new()),
    }
}
