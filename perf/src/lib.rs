//! Measurement helpers shared by `perf_report` and the criterion benches.

use basalt_chan::{CONTROL_SIZE, ChannelStats};
use std::time::Instant;

// ─── Latency ────────────────────────────────────────────────────────────────

/// Distribution of one set of timing samples.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Percentiles {
    pub p50: u64,
    pub p90: u64,
    pub p99: u64,
    pub p999: u64,
    pub max: u64,
    pub mean: f64,
    pub samples: usize,
}

impl Percentiles {
    /// Sorts `samples` in place. Panics on an empty slice.
    pub fn from_samples(samples: &mut [u64]) -> Self {
        assert!(!samples.is_empty(), "no samples to summarise");
        samples.sort_unstable();
        let total: u128 = samples.iter().map(|&s| s as u128).sum();
        Self {
            p50: nearest_rank(samples, 0.5),
            p90: nearest_rank(samples, 0.9),
            p99: nearest_rank(samples, 0.99),
            p999: nearest_rank(samples, 0.999),
            max: samples[samples.len() - 1],
            mean: total as f64 / samples.len() as f64,
            samples: samples.len(),
        }
    }
}

fn nearest_rank(sorted: &[u64], q: f64) -> u64 {
    let rank = (q * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

/// What the channel did while a latency run was timed.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct Traffic {
    pub frames: u64,
    pub bytes: u64,
    pub cycle_skips: u64,
    pub write_timeouts: u64,
}

impl From<ChannelStats> for Traffic {
    fn from(stats: ChannelStats) -> Self {
        Self {
            frames: stats.frames_read,
            bytes: stats.bytes_read,
            cycle_skips: stats.cycle_skips,
            write_timeouts: stats.write_timeouts,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct LatencyRun {
    pub name: String,
    pub unit: &'static str,
    pub latency: Percentiles,
    pub traffic: Traffic,
}

impl LatencyRun {
    pub fn new(name: impl Into<String>, unit: &'static str, samples: &mut [u64]) -> Self {
        Self {
            name: name.into(),
            unit,
            latency: Percentiles::from_samples(samples),
            traffic: Traffic::default(),
        }
    }

    /// Attaches the counters of both endpoints involved in the run.
    pub fn with_traffic(mut self, a: ChannelStats, b: ChannelStats) -> Self {
        self.traffic = a.merge(b).into();
        self
    }

    pub fn print_row(&self) {
        let l = &self.latency;
        println!(
            "  {:<26} {:>8} {:>8} {:>8} {:>8} {:>8} {:>7}  {}",
            self.name, l.p50, l.p90, l.p99, l.p999, l.max, self.traffic.cycle_skips, self.unit,
        );
    }
}

pub fn print_latency_header() {
    println!(
        "  {:<26} {:>8} {:>8} {:>8} {:>8} {:>8} {:>7}  unit",
        "run", "p50", "p90", "p99", "p99.9", "max", "skips",
    );
    println!("  {}", "─".repeat(88));
}

/// Times `batches` rounds of `per_batch` calls to `op` after one untimed
/// round, recording the mean cost of a call in each round.
pub fn time_per_call<F: FnMut()>(
    name: &str,
    batches: usize,
    per_batch: usize,
    mut op: F,
) -> LatencyRun {
    (0..per_batch).for_each(|_| op());

    let mut samples: Vec<u64> = (0..batches)
        .map(|_| {
            let start = Instant::now();
            (0..per_batch).for_each(|_| op());
            (start.elapsed().as_nanos() / per_batch as u128).max(1) as u64
        })
        .collect();
    LatencyRun::new(name, "ns/op", &mut samples)
}

// ─── Process usage ──────────────────────────────────────────────────────────

/// `getrusage(RUSAGE_SELF)` counters, or the difference between two readings.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct ProcessUsage {
    pub max_rss_bytes: i64,
    pub minor_faults: i64,
    pub voluntary_switches: i64,
    pub involuntary_switches: i64,
    pub user_us: i64,
    pub system_us: i64,
}

impl ProcessUsage {
    pub fn now() -> Self {
        // SAFETY: rusage is plain data and getrusage only writes into it.
        let usage = unsafe {
            let mut usage: libc::rusage = std::mem::zeroed();
            libc::getrusage(libc::RUSAGE_SELF, &mut usage);
            usage
        };
        let micros = |tv: libc::timeval| tv.tv_sec as i64 * 1_000_000 + tv.tv_usec as i64;
        // Linux reports kilobytes, the BSDs bytes.
        let rss_unit = if cfg!(target_os = "linux") { 1024 } else { 1 };
        Self {
            max_rss_bytes: usage.ru_maxrss as i64 * rss_unit,
            minor_faults: usage.ru_minflt as i64,
            voluntary_switches: usage.ru_nvcsw as i64,
            involuntary_switches: usage.ru_nivcsw as i64,
            user_us: micros(usage.ru_utime),
            system_us: micros(usage.ru_stime),
        }
    }

    /// Counters accumulated since `start`. Peak RSS is not a counter and is
    /// carried over as is.
    pub fn since(&self, start: &ProcessUsage) -> ProcessUsage {
        ProcessUsage {
            max_rss_bytes: self.max_rss_bytes,
            minor_faults: self.minor_faults - start.minor_faults,
            voluntary_switches: self.voluntary_switches - start.voluntary_switches,
            involuntary_switches: self.involuntary_switches - start.involuntary_switches,
            user_us: self.user_us - start.user_us,
            system_us: self.system_us - start.system_us,
        }
    }
}

// ─── Regions and payloads ───────────────────────────────────────────────────

pub fn temp_region_path(label: &str) -> String {
    let pid = std::process::id();
    format!("/tmp/basalt_bench_{label}_{pid}")
}

/// Region size whose rings hold `capacity` bytes each.
pub fn region_size_for(capacity: usize) -> usize {
    CONTROL_SIZE + 2 * capacity
}

/// Deterministic non-zero payload of `len` bytes.
pub fn make_payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8 + 1).collect()
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

pub fn section_header(title: &str) {
    let rule = "─".repeat(90);
    println!("\n{rule}\n  {title}\n{rule}\n");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentiles_of_a_ramp() {
        let mut samples: Vec<u64> = (1..=1000).rev().collect();
        let p = Percentiles::from_samples(&mut samples);
        assert_eq!((p.p50, p.p90, p.p99, p.p999, p.max), (500, 900, 990, 999, 1000));
        assert_eq!(p.samples, 1000);
        assert!((p.mean - 500.5).abs() < 1e-9);
    }

    #[test]
    fn single_sample_is_every_percentile() {
        let p = Percentiles::from_samples(&mut [42]);
        assert_eq!((p.p50, p.p999, p.max), (42, 42, 42));
    }

    #[test]
    fn traffic_counts_what_was_read() {
        let writer = ChannelStats {
            frames_written: 3,
            bytes_written: 30,
            cycle_skips: 1,
            ..ChannelStats::default()
        };
        let reader = ChannelStats {
            frames_read: 3,
            bytes_read: 30,
            cycle_skips: 1,
            ..ChannelStats::default()
        };
        let run = LatencyRun::new("x", "ns", &mut [1, 2, 3]).with_traffic(writer, reader);
        assert_eq!(run.traffic.frames, 3);
        assert_eq!(run.traffic.bytes, 30);
        assert_eq!(run.traffic.cycle_skips, 2);
        assert_eq!(run.traffic.write_timeouts, 0);
    }

    #[test]
    fn usage_deltas_keep_peak_rss() {
        let start = ProcessUsage {
            max_rss_bytes: 10,
            minor_faults: 5,
            user_us: 100,
            ..ProcessUsage::default()
        };
        let end = ProcessUsage {
            max_rss_bytes: 20,
            minor_faults: 8,
            user_us: 250,
            ..ProcessUsage::default()
        };
        let delta = end.since(&start);
        assert_eq!((delta.max_rss_bytes, delta.minor_faults, delta.user_us), (20, 3, 150));
    }

    #[test]
    fn payloads_never_contain_the_pad_marker() {
        assert!(make_payload(4096).iter().all(|&b| b != 0));
        assert_eq!(region_size_for(30 * 1024), 64 * 1024);
    }

    #[test]
    fn byte_formatting() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(64 * 1024), "64.0 KB");
        assert_eq!(format_bytes(16 << 20), "16.0 MB");
    }
}
