use netsim_abstract::{SimTime, time_to_secs};
use std::io::{self, BufWriter, Write};
use std::sync::{Arc, Mutex};

/// Line-oriented event log shared by every component.
///
/// One line per event: `<time_seconds> <kind> <ids> [fields]`, time with six
/// fractional digits. The header (selector lines forwarded from the
/// topology file) is terminated by a single blank line. Lines are written
/// whole, so the log stays parseable even if the sink fails mid-run; the
/// first write error is kept and surfaced by `finish`.
pub struct EventLog {
    out: Box<dyn Write + Send>,
    error: Option<io::Error>,
}

impl EventLog {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self { out, error: None }
    }

    /// Log to standard output through a buffer.
    pub fn stdout() -> Self {
        Self::new(Box::new(BufWriter::new(io::stdout())))
    }

    /// Log into a shared in-memory buffer, readable while the simulator
    /// still owns the log half.
    pub fn memory() -> (Self, MemoryLogBuffer) {
        let buffer = MemoryLogBuffer::new();
        (Self::new(Box::new(buffer.clone())), buffer)
    }

    pub fn header(&mut self, selectors: &[String]) {
        for line in selectors {
            self.write(format_args!("{line}"));
        }
        self.write(format_args!(""));
    }

    pub fn send_data(&mut self, t: SimTime, flow: &str, host: &str, size: u64, packet_no: u64) {
        self.event(t, format_args!("send_data {flow} {host} {size} {packet_no}"));
    }

    pub fn receive_data(&mut self, t: SimTime, flow: &str, host: &str, packet_no: u64) {
        self.event(t, format_args!("receive_data {flow} {host} {packet_no}"));
    }

    pub fn send_ack(&mut self, t: SimTime, flow: &str, host: &str, packet_no: u64) {
        self.event(t, format_args!("send_ack {flow} {host} {packet_no}"));
    }

    pub fn receive_ack(&mut self, t: SimTime, flow: &str, host: &str, packet_no: u64) {
        self.event(t, format_args!("receive_ack {flow} {host} {packet_no}"));
    }

    pub fn transmission(&mut self, t: SimTime, link: &str, size: u64) {
        self.event(t, format_args!("transmission {link} {size}"));
    }

    pub fn buffer_diff(&mut self, t: SimTime, link: &str, diff: i64) {
        self.event(t, format_args!("buffer_diff {link} {diff:+}"));
    }

    pub fn packet_loss(&mut self, t: SimTime, link: &str, flow: &str, packet_no: u64) {
        self.event(t, format_args!("packet_loss {link} {flow} {packet_no}"));
    }

    pub fn packet_rtt(&mut self, t: SimTime, flow: &str, rtt_secs: f64) {
        self.event(t, format_args!("packet_rtt {flow} {rtt_secs:.6}"));
    }

    pub fn window_size(&mut self, t: SimTime, flow: &str, cwnd: f64) {
        self.event(t, format_args!("window_size {flow} {cwnd:.6}"));
    }

    pub fn state(&mut self, t: SimTime, flow: &str, name: &str) {
        self.event(t, format_args!("state {flow} {name}"));
    }

    pub fn ssthresh(&mut self, t: SimTime, flow: &str, value: f64) {
        self.event(t, format_args!("ssthresh {flow} {value:.6}"));
    }

    pub fn timeout(&mut self, t: SimTime, packet_no: u64) {
        self.event(t, format_args!("timeout {packet_no}"));
    }

    pub fn retransmit(&mut self, t: SimTime, flow: &str, packet_no: u64) {
        self.event(t, format_args!("retransmit {flow} {packet_no}"));
    }

    pub fn dupack(&mut self, t: SimTime, ack_no: u64, timestamp: SimTime) {
        self.event(
            t,
            format_args!("dupack {ack_no} {:.6}", time_to_secs(timestamp)),
        );
    }

    pub fn finish(&mut self, t: SimTime, flow: &str) {
        self.event(t, format_args!("finish {flow}"));
    }

    /// Flush the sink and report the first error seen, if any.
    pub fn finish_writes(&mut self) -> io::Result<()> {
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        self.out.flush()
    }

    fn event(&mut self, t: SimTime, rest: std::fmt::Arguments<'_>) {
        self.write(format_args!("{:.6} {rest}", time_to_secs(t)));
    }

    fn write(&mut self, line: std::fmt::Arguments<'_>) {
        if self.error.is_some() {
            return;
        }
        if let Err(err) = writeln!(self.out, "{line}") {
            self.error = Some(err);
        }
    }
}

/// Cloneable byte buffer usable as a log sink while other handles read it.
#[derive(Clone, Default)]
pub struct MemoryLogBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl MemoryLogBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        let data = self.inner.lock().expect("log buffer poisoned");
        String::from_utf8_lossy(&data).into_owned()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }
}

impl std::io::Write for MemoryLogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut data = self.inner.lock().expect("log buffer poisoned");
        data.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
