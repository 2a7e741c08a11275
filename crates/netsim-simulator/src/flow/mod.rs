pub(crate) mod cc;
mod rtt;
mod window;

use crate::log::EventLog;
use netsim_abstract::{Algorithm, DataPacket, FlowSpec, Packet, SimTime, secs_to_time, sizes, time_to_secs};
use rtt::RttEstimator;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};
use window::SlidingWindow;

pub(crate) use window::PacketRecord;

/// Request to (re)arm the flow's retransmission alarm. The generation is
/// checked when the event fires; a bumped generation cancels it.
#[derive(Debug, Clone)]
pub(crate) struct AlarmReq {
    pub flow: String,
    pub at: SimTime,
    pub generation: u64,
}

/// What a flow handler may do: log, hand packets to its host, and re-arm
/// its alarm. The host collects `sends` onto its single link afterwards.
pub(crate) struct FlowCtx<'a> {
    pub now: SimTime,
    pub log: &'a mut EventLog,
    pub sends: &'a mut Vec<Packet>,
    pub alarm: &'a mut Option<AlarmReq>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Deadline {
    expire: SimTime,
    number: u64,
    sent_at: SimTime,
}

/// Window, timer and credit machinery shared by every congestion-control
/// variant. The variants mutate it through the methods below; everything
/// observable (cwnd, ssthresh, state) is logged at the point of change.
pub(crate) struct FlowCore {
    pub id: String,
    pub src: String,
    pub dest: String,
    pub num_packets: u64,
    pub start_at: SimTime,
    pub window: SlidingWindow,
    pub packet_cursor: u64,
    cwnd: f64,
    credits: u64,
    debt: u64,
    pub ssthresh: f64,
    retransmit_queue: VecDeque<u64>,
    deadlines: BinaryHeap<Reverse<Deadline>>,
    pub alarm_generation: u64,
    rto: f64,
    estimator: RttEstimator,
    pub curr_rtt: f64,
    pub base_rtt: f64,
    last_ack: Option<u64>,
    ndup: u32,
    pub done: bool,
    pub sent: u64,
    pub retransmits: u64,
    pub finished_at: Option<SimTime>,
}

impl FlowCore {
    fn new(spec: &FlowSpec) -> Self {
        let num_packets = (spec.data_mb * 1e6 / sizes::DATA_PAYLOAD as f64).ceil() as u64;
        let estimator = RttEstimator::new();
        Self {
            id: spec.id.clone(),
            src: spec.src.clone(),
            dest: spec.dest.clone(),
            num_packets,
            start_at: secs_to_time(spec.start_s),
            window: SlidingWindow::new(),
            packet_cursor: 1,
            cwnd: 1.0,
            credits: 1,
            debt: 0,
            ssthresh: f64::INFINITY,
            retransmit_queue: VecDeque::new(),
            deadlines: BinaryHeap::new(),
            alarm_generation: 0,
            rto: estimator.rto(),
            estimator,
            curr_rtt: 0.0,
            base_rtt: f64::INFINITY,
            last_ack: None,
            ndup: 0,
            done: false,
            sent: 0,
            retransmits: 0,
            finished_at: None,
        }
    }

    pub fn cwnd(&self) -> f64 {
        self.cwnd
    }

    /// Credit-aware cwnd assignment. Raising the window first retires
    /// debt, then releases send credits; lowering only accumulates debt,
    /// never revoking credits a sender already consumed. A credit moves
    /// when `floor(cwnd)` crosses an integer.
    pub fn set_cwnd(&mut self, ctx: &mut FlowCtx<'_>, value: f64) {
        let old = self.cwnd.floor() as i64;
        let new = value.floor() as i64;
        self.cwnd = value;
        ctx.log.window_size(ctx.now, &self.id, value);
        if new > old {
            self.put_credits((new - old) as u64);
        } else if new < old {
            self.debt += (old - new) as u64;
        }
    }

    pub fn set_ssthresh(&mut self, ctx: &mut FlowCtx<'_>, value: f64) {
        self.ssthresh = value;
        ctx.log.ssthresh(ctx.now, &self.id, value);
    }

    pub fn log_state(&self, ctx: &mut FlowCtx<'_>, name: &str) {
        ctx.log.state(ctx.now, &self.id, name);
    }

    pub fn schedule_retransmit(&mut self, number: u64) {
        self.retransmit_queue.push_back(number);
    }

    /// Rewind the send cursor (to `to`, or the left window edge) and return
    /// the reclaimed transmissions as credits through the debt-aware path.
    pub fn go_back(&mut self, ctx: &mut FlowCtx<'_>, to: Option<u64>) {
        let target = to.unwrap_or_else(|| self.window.offset());
        let old = self.packet_cursor;
        self.packet_cursor = target;
        // the rewound cursor re-covers anything queued for resend
        self.retransmit_queue.clear();
        if old > target {
            self.put_credits(old - target);
        }
        self.run_alarm(ctx);
    }

    fn put_credits(&mut self, n: u64) {
        let retired = n.min(self.debt);
        self.debt -= retired;
        self.credits += n - retired;
    }

    /// Send while credits last: queued retransmissions first, then new
    /// packets up to `num_packets`. Every transmission arms a deadline.
    pub fn pump(&mut self, ctx: &mut FlowCtx<'_>) {
        while !self.done && self.credits > 0 {
            let mut resend = None;
            while let Some(number) = self.retransmit_queue.pop_front() {
                // entries below the edge were covered while queued
                if number >= self.window.offset() {
                    resend = Some(number);
                    break;
                }
            }
            let number = if let Some(number) = resend {
                number
            } else if self.packet_cursor <= self.num_packets {
                let number = self.packet_cursor;
                self.packet_cursor += 1;
                number
            } else {
                break;
            };
            self.credits -= 1;

            let first_send = self.window.record_send(number, ctx.now);
            if !first_send {
                self.retransmits += 1;
                ctx.log.retransmit(ctx.now, &self.id, number);
            }
            ctx.log
                .send_data(ctx.now, &self.id, &self.src, sizes::DATA, number);
            self.sent += 1;
            ctx.sends.push(Packet::Data(DataPacket {
                src: self.src.clone(),
                dest: self.dest.clone(),
                flow: self.id.clone(),
                number,
                sent_at: ctx.now,
            }));

            self.deadlines.push(Reverse(Deadline {
                expire: ctx.now + secs_to_time(self.rto),
                number,
                sent_at: ctx.now,
            }));
            self.run_alarm(ctx);
        }
    }

    /// Cancel the armed alarm, drop stale deadlines (acked packets, or
    /// numbers past a rewound cursor), and arm for the new heap top.
    pub fn run_alarm(&mut self, ctx: &mut FlowCtx<'_>) {
        self.alarm_generation += 1;
        while let Some(Reverse(deadline)) = self.deadlines.peek() {
            let stale = deadline.number >= self.packet_cursor
                || self
                    .window
                    .get(deadline.number)
                    .is_none_or(|record| record.acked);
            if stale {
                self.deadlines.pop();
            } else {
                break;
            }
        }
        *ctx.alarm = match self.deadlines.peek() {
            Some(Reverse(deadline)) => Some(AlarmReq {
                flow: self.id.clone(),
                at: deadline.expire.max(ctx.now),
                generation: self.alarm_generation,
            }),
            None => None,
        };
    }
}

/// A sending flow: the shared machinery plus its congestion-control
/// plug-in. The plug-in only ever reacts to three events.
pub(crate) struct Flow {
    pub core: FlowCore,
    controller: Box<dyn cc::CongestionControl>,
}

impl Flow {
    pub fn new(spec: &FlowSpec, algorithm: Algorithm) -> Self {
        Self {
            core: FlowCore::new(spec),
            controller: cc::make(algorithm),
        }
    }

    pub fn start(&mut self, ctx: &mut FlowCtx<'_>) {
        ctx.log.window_size(ctx.now, &self.core.id, self.core.cwnd);
        self.controller.start(&mut self.core, ctx);
        self.core.pump(ctx);
    }

    /// Process a cumulative ack. Returns true when this ack completed the
    /// flow.
    pub fn get_ack(&mut self, ctx: &mut FlowCtx<'_>, ack_no: u64, echoed: Option<SimTime>) -> bool {
        if self.core.done {
            return false;
        }
        if ack_no == self.core.num_packets + 1 {
            self.finish(ctx);
            return true;
        }
        let packet_no = ack_no.saturating_sub(1);

        if packet_no < self.core.window.offset() {
            if self.core.last_ack == Some(packet_no) {
                self.core.ndup += 1;
                ctx.log.dupack(ctx.now, ack_no, ctx.now);
                let ndup = self.core.ndup;
                self.controller.on_dupack(&mut self.core, ctx, ndup);
                self.core.pump(ctx);
            }
            // anything else below the window is a stale ack
            return false;
        }

        self.core.ndup = 0;
        let record = {
            let record = self
                .core
                .window
                .get_mut(packet_no)
                .expect("cumulative ack beyond the send window");
            record.acked = true;
            if let Some(ts) = echoed {
                record.timestamp = ts;
            }
            *record
        };

        let rtt = time_to_secs(ctx.now.saturating_sub(record.timestamp));
        self.core.rto = self.core.estimator.sample(rtt);
        ctx.log.packet_rtt(ctx.now, &self.core.id, rtt);
        self.core.curr_rtt = rtt;
        self.core.base_rtt = self.core.base_rtt.min(rtt);

        let old_offset = self.core.window.offset();
        self.core.window.advance_to(packet_no + 1);
        // a late ack after a rewind can overtake the cursor; the next new
        // packet is never below the window edge
        self.core.packet_cursor = self.core.packet_cursor.max(packet_no + 1);
        self.core.run_alarm(ctx);
        self.controller.on_ack(&mut self.core, ctx, record);
        self.core.last_ack = Some(packet_no);

        let credit = (packet_no + 1)
            .min(self.core.packet_cursor)
            .saturating_sub(old_offset)
            .max(1);
        self.core.put_credits(credit);
        self.core.pump(ctx);
        false
    }

    /// The armed alarm fired. Stale generations are ignored.
    pub fn on_alarm(&mut self, ctx: &mut FlowCtx<'_>, generation: u64) {
        if self.core.done || generation != self.core.alarm_generation {
            return;
        }
        let Some(Reverse(deadline)) = self.core.deadlines.pop() else {
            return;
        };
        ctx.log.timeout(ctx.now, deadline.number);
        let record = *self
            .core
            .window
            .get(deadline.number)
            .expect("timeout for a packet outside the window");
        self.controller.on_timeout(&mut self.core, ctx, record);
        self.core.run_alarm(ctx);
        self.core.pump(ctx);
    }

    fn finish(&mut self, ctx: &mut FlowCtx<'_>) {
        self.core.done = true;
        self.core.finished_at = Some(ctx.now);
        self.core.window.advance_to(self.core.num_packets + 1);
        self.core.deadlines.clear();
        self.core.alarm_generation += 1;
        *ctx.alarm = None;
        ctx.log.finish(ctx.now, &self.core.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> FlowSpec {
        FlowSpec {
            id: "F1".into(),
            src: "H1".into(),
            dest: "H2".into(),
            data_mb: 0.01, // 10 packets
            start_s: 0.0,
        }
    }

    fn ctx<'a>(
        now: SimTime,
        log: &'a mut EventLog,
        sends: &'a mut Vec<Packet>,
        alarm: &'a mut Option<AlarmReq>,
    ) -> FlowCtx<'a> {
        FlowCtx {
            now,
            log,
            sends,
            alarm,
        }
    }

    #[test]
    fn packet_budget_rounds_up() {
        let flow = Flow::new(&spec(), Algorithm::Tahoe);
        assert_eq!(flow.core.num_packets, 10);
        let mut spec_half = spec();
        spec_half.data_mb = 0.0105;
        assert_eq!(Flow::new(&spec_half, Algorithm::Tahoe).core.num_packets, 11);
    }

    #[test]
    fn start_sends_one_packet_and_arms_the_alarm() {
        let (mut log, _buffer) = EventLog::memory();
        let mut sends = Vec::new();
        let mut alarm = None;
        let mut flow = Flow::new(&spec(), Algorithm::Tahoe);
        flow.start(&mut ctx(0, &mut log, &mut sends, &mut alarm));

        assert_eq!(sends.len(), 1);
        let req = alarm.expect("alarm armed");
        assert_eq!(req.at, secs_to_time(1.0)); // initial rto
        assert_eq!(flow.core.packet_cursor, 2);
    }

    #[test]
    fn acks_grow_the_window_and_slide_the_edge() {
        let (mut log, _buffer) = EventLog::memory();
        let mut sends = Vec::new();
        let mut alarm = None;
        let mut flow = Flow::new(&spec(), Algorithm::Tahoe);
        flow.start(&mut ctx(0, &mut log, &mut sends, &mut alarm));
        sends.clear();

        // ack packet 1: slow start doubles the effective window
        let finished = flow.get_ack(
            &mut ctx(100_000_000, &mut log, &mut sends, &mut alarm),
            2,
            Some(0),
        );
        assert!(!finished);
        assert_eq!(flow.core.window.offset(), 2);
        assert_eq!(flow.core.cwnd(), 2.0);
        assert_eq!(sends.len(), 2);
    }

    #[test]
    fn final_ack_finishes_and_cancels_the_alarm() {
        let (mut log, buffer) = EventLog::memory();
        let mut sends = Vec::new();
        let mut alarm = None;
        let mut flow = Flow::new(&spec(), Algorithm::Tahoe);
        flow.start(&mut ctx(0, &mut log, &mut sends, &mut alarm));

        let mut now = 0;
        let mut next_ack = 2;
        while !flow.core.done {
            now += 50_000_000;
            sends.clear();
            flow.get_ack(&mut ctx(now, &mut log, &mut sends, &mut alarm), next_ack, Some(now - 50_000_000));
            next_ack += 1;
        }
        assert_eq!(flow.core.finished_at, Some(now));
        assert!(alarm.is_none());
        assert!(buffer.contents().contains("finish F1"));
        // no further sends after finish
        sends.clear();
        flow.get_ack(&mut ctx(now + 1, &mut log, &mut sends, &mut alarm), 5, None);
        assert!(sends.is_empty());
    }

    #[test]
    fn duplicate_acks_are_counted_not_slid() {
        let (mut log, buffer) = EventLog::memory();
        let mut sends = Vec::new();
        let mut alarm = None;
        let mut flow = Flow::new(&spec(), Algorithm::Reno);
        flow.start(&mut ctx(0, &mut log, &mut sends, &mut alarm));
        flow.get_ack(&mut ctx(10_000_000, &mut log, &mut sends, &mut alarm), 2, Some(0));
        let offset = flow.core.window.offset();

        // repeat the same cumulative ack
        flow.get_ack(&mut ctx(20_000_000, &mut log, &mut sends, &mut alarm), 2, None);
        flow.get_ack(&mut ctx(30_000_000, &mut log, &mut sends, &mut alarm), 2, None);
        assert_eq!(flow.core.window.offset(), offset);
        assert_eq!(buffer.contents().matches("dupack").count(), 2);
    }

    #[test]
    fn timeout_rewinds_and_resends() {
        let (mut log, buffer) = EventLog::memory();
        let mut sends = Vec::new();
        let mut alarm = None;
        let mut flow = Flow::new(&spec(), Algorithm::Tahoe);
        flow.start(&mut ctx(0, &mut log, &mut sends, &mut alarm));
        let req = alarm.clone().expect("armed");
        sends.clear();

        flow.on_alarm(
            &mut ctx(req.at, &mut log, &mut sends, &mut alarm),
            req.generation,
        );
        let text = buffer.contents();
        assert!(text.contains("timeout 1"));
        assert!(text.contains("retransmit F1 1"));
        assert_eq!(sends.len(), 1);
        assert_eq!(flow.core.retransmits, 1);
    }

    #[test]
    fn stale_alarm_generations_are_ignored() {
        let (mut log, _buffer) = EventLog::memory();
        let mut sends = Vec::new();
        let mut alarm = None;
        let mut flow = Flow::new(&spec(), Algorithm::Tahoe);
        flow.start(&mut ctx(0, &mut log, &mut sends, &mut alarm));
        let stale = alarm.clone().expect("armed");

        // an ack re-arms with a newer generation
        flow.get_ack(&mut ctx(1_000_000, &mut log, &mut sends, &mut alarm), 2, Some(0));
        sends.clear();
        flow.on_alarm(
            &mut ctx(stale.at, &mut log, &mut sends, &mut alarm),
            stale.generation,
        );
        assert!(sends.is_empty());
        assert_eq!(flow.core.retransmits, 0);
    }
}
