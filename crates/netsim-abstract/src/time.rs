/// Virtual simulation time in integer nanoseconds.
///
/// Event-queue keys must have a total order, so time is kept as an integer
/// count rather than floating seconds. Nanoseconds keep the serialization
/// time of Mbps-scale links exact (1024 bytes at 10 Mbps = 819200 ns).
pub type SimTime = u64;

pub const NANOS_PER_SEC: f64 = 1e9;

pub fn secs_to_time(secs: f64) -> SimTime {
    (secs * NANOS_PER_SEC).round() as SimTime
}

pub fn millis_to_time(millis: f64) -> SimTime {
    (millis * 1e6).round() as SimTime
}

pub fn time_to_secs(t: SimTime) -> f64 {
    t as f64 / NANOS_PER_SEC
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions_are_exact_for_link_scales() {
        assert_eq!(secs_to_time(0.5), 500_000_000);
        assert_eq!(millis_to_time(10.0), 10_000_000);
        // 1024 bytes serialized at 10 Mbps
        assert_eq!(secs_to_time(1024.0 * 8.0 / 10.0e6), 819_200);
        assert_eq!(time_to_secs(819_200), 0.0008192);
    }
}
