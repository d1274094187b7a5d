use std::hint::black_box;
use std::thread;
use std::time::{Duration, Instant};

use basalt_chan::{Channel, ChannelOptions, ChannelStats};
use basalt_perf::*;

const CAPACITY: usize = 64 * 1024;
const PAYLOADS: [usize; 4] = [16, 256, 1024, 8192];

/// Result of streaming traffic from one thread to another.
#[derive(Debug, Clone, serde::Serialize)]
struct ThroughputRun {
    payload: usize,
    messages: u64,
    elapsed_ns: u64,
    msgs_per_sec: f64,
    bytes_per_sec: f64,
    write_timeouts: u64,
    cycle_skips: u64,
}

fn main() {
    let usage_start = ProcessUsage::now();
    let mut results: Vec<LatencyRun> = Vec::new();

    // ═══════════════════════════════════════════════════════════════════════
    // 1. Banner
    // ═══════════════════════════════════════════════════════════════════════
    print_banner();

    // ═══════════════════════════════════════════════════════════════════════
    // 2. Same-thread cost of one write + read
    // ═══════════════════════════════════════════════════════════════════════
    section_single_thread(&mut results);

    // ═══════════════════════════════════════════════════════════════════════
    // 3. Cross-thread ping-pong latency
    // ═══════════════════════════════════════════════════════════════════════
    section_ping_pong(&mut results);

    // ═══════════════════════════════════════════════════════════════════════
    // 4. Cross-thread throughput
    // ═══════════════════════════════════════════════════════════════════════
    let throughput = section_throughput();

    // ═══════════════════════════════════════════════════════════════════════
    // 5. Resource Usage
    // ═══════════════════════════════════════════════════════════════════════
    let usage = ProcessUsage::now().since(&usage_start);
    section_resources(&usage);

    // ═══════════════════════════════════════════════════════════════════════
    // 6. JSON Output
    // ═══════════════════════════════════════════════════════════════════════
    save_results(&results, &throughput, &usage);
}

fn pair() -> (Channel, Channel) {
    Channel::pair(region_size_for(CAPACITY), &ChannelOptions::default())
        .expect("failed to create channel pair")
}

fn print_banner() {
    let bar = "\u{2550}".repeat(90);
    println!("\n{bar}");
    println!("  BASALT CHANNEL PERFORMANCE REPORT");
    println!("  same-thread cost + cross-thread latency + throughput");
    println!("{bar}\n");

    let os = run_cmd("uname", &["-srm"]).unwrap_or_else(|| "unknown".into());
    let date = run_cmd("date", &["+%Y-%m-%d %H:%M:%S"]).unwrap_or_default();
    let ncpu = thread::available_parallelism().map(|n| n.get()).unwrap_or(0);

    println!("  OS:      {}", os.trim());
    println!("  Date:    {}", date.trim());
    println!("  Cores:   {ncpu}");
    println!("  Ring:    {} per direction", format_bytes(CAPACITY as u64));
}

fn section_single_thread(results: &mut Vec<LatencyRun>) {
    section_header("WRITE + READ (same thread, no contention)");
    print_latency_header();

    for &len in &PAYLOADS {
        let (mut guest, mut host) = pair();
        let payload = make_payload(len);
        let mut buf = vec![0u8; len];
        let r = time_per_call(&format!("write_read_{len}B"), 200, 1000, || {
            assert!(host.try_write(black_box(&payload)));
            black_box(guest.try_read(&mut buf));
        })
        .with_traffic(host.stats(), guest.stats());
        r.print_row();
        results.push(r);
    }

    let (mut guest, _host) = pair();
    let mut buf = [0u8; 64];
    let r = time_per_call("try_read_empty", 200, 1000, || {
        black_box(guest.try_read(&mut buf));
    });
    r.print_row();
    results.push(r);
}

/// The host echoes every message back; the guest times each round trip.
fn section_ping_pong(results: &mut Vec<LatencyRun>) {
    section_header("PING-PONG (two threads, round trip)");
    print_latency_header();

    for &len in &[16usize, 1024] {
        let (mut guest, mut host) = pair();
        let rounds = 100_000usize;

        let echo = thread::spawn(move || {
            let mut buf = vec![0u8; len];
            for _ in 0..rounds {
                let n = host.read(&mut buf);
                host.write(&buf[..n]).expect("echo write timed out");
            }
            host.stats()
        });

        let payload = make_payload(len);
        let mut buf = vec![0u8; len];
        let mut samples = Vec::with_capacity(rounds);
        for _ in 0..rounds {
            let start = Instant::now();
            guest.write(&payload).expect("ping write timed out");
            let n = guest.read(&mut buf);
            samples.push(start.elapsed().as_nanos() as u64);
            debug_assert_eq!(n, len);
        }
        let echo_stats = echo.join().expect("echo thread panicked");

        let r = LatencyRun::new(format!("round_trip_{len}B"), "ns", &mut samples)
            .with_traffic(guest.stats(), echo_stats);
        r.print_row();
        results.push(r);
    }
}

fn section_throughput() -> Vec<ThroughputRun> {
    section_header("THROUGHPUT (producer thread -> consumer thread, 1s each)");
    println!(
        "  {:<10} {:>12} {:>14} {:>14} {:>10} {:>10}",
        "payload", "messages", "msgs/s", "bytes/s", "timeouts", "skips",
    );

    let mut runs = Vec::new();
    for &len in &PAYLOADS {
        let (guest, host) = pair();
        let (mut reader, _) = guest.split();
        let (_, mut writer) = host.split();
        let duration = Duration::from_secs(1);

        let producer = thread::spawn(move || {
            let payload = make_payload(len);
            let start = Instant::now();
            let mut sent = 0u64;
            while start.elapsed() < duration {
                if writer.try_write(&payload) {
                    sent += 1;
                } else {
                    std::hint::spin_loop();
                }
            }
            (sent, writer.stats())
        });

        let start = Instant::now();
        let mut buf = vec![0u8; len];
        let mut received = 0u64;
        let (sent, writer_stats) = loop {
            if reader.try_read(&mut buf).is_some() {
                received += 1;
            } else if producer.is_finished() {
                let (sent, stats) = producer.join().expect("producer panicked");
                while received < sent {
                    reader.read(&mut buf);
                    received += 1;
                }
                break (sent, stats);
            }
        };
        let elapsed = start.elapsed();
        assert_eq!(received, sent);

        let stats: ChannelStats = reader.stats().merge(writer_stats);
        let secs = elapsed.as_secs_f64();
        let run = ThroughputRun {
            payload: len,
            messages: received,
            elapsed_ns: elapsed.as_nanos() as u64,
            msgs_per_sec: received as f64 / secs,
            bytes_per_sec: stats.bytes_read as f64 / secs,
            write_timeouts: stats.write_timeouts,
            cycle_skips: stats.cycle_skips,
        };
        println!(
            "  {:<10} {:>12} {:>14.0} {:>14} {:>10} {:>10}",
            format_bytes(len as u64),
            run.messages,
            run.msgs_per_sec,
            format!("{}/s", format_bytes(run.bytes_per_sec as u64)),
            run.write_timeouts,
            run.cycle_skips,
        );
        runs.push(run);
    }
    runs
}

fn section_resources(usage: &ProcessUsage) {
    section_header("RESOURCE USAGE");

    println!("  Peak RSS:                    {}", format_bytes(usage.max_rss_bytes as u64));
    println!("  Minor page faults:           {}", usage.minor_faults);
    println!("  Voluntary ctx switches:      {}", usage.voluntary_switches);
    println!("  Involuntary ctx switches:    {}", usage.involuntary_switches);
    println!("  User CPU time:               {:.3}s", usage.user_us as f64 / 1e6);
    println!("  System CPU time:             {:.3}s", usage.system_us as f64 / 1e6);
}

fn save_results(results: &[LatencyRun], throughput: &[ThroughputRun], usage: &ProcessUsage) {
    let timestamp = run_cmd("date", &["+%Y%m%d_%H%M%S"])
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "unknown".into());

    let results_dir = concat!(env!("CARGO_MANIFEST_DIR"), "/results");
    let _ = std::fs::create_dir_all(results_dir);
    let json_path = format!("{results_dir}/{timestamp}_report.json");

    let output = serde_json::json!({
        "report_type": "channel",
        "timestamp": timestamp,
        "ring_capacity": CAPACITY,
        "latency": results,
        "throughput": throughput,
        "resources": usage,
    });

    let bar = "\u{2550}".repeat(90);
    let written = serde_json::to_string_pretty(&output)
        .map_err(std::io::Error::from)
        .and_then(|json| std::fs::write(&json_path, json));
    match written {
        Ok(()) => {
            println!("\n{bar}");
            println!("  Results saved to: {json_path}");
            println!("{bar}\n");
        }
        Err(e) => eprintln!("\n  [failed to save results: {e}]\n"),
    }
}

fn run_cmd(cmd: &str, args: &[&str]) -> Option<String> {
    std::process::Command::new(cmd)
        .args(args)
        .output()
        .ok()
        .and_then(|o| {
            if o.status.success() {
                String::from_utf8(o.stdout).ok()
            } else {
                None
            }
        })
}
