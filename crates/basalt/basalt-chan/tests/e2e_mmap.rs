//! End-to-end two-process test for a file-backed channel region.
//!
//! # Overview
//!
//! The same test executable is spawned twice, once as the host and once as
//! the guest, selected by an environment variable. Both processes map the
//! same region file and talk **concurrently**:
//!
//! ```text
//!                    Time -->
//!
//! [Orchestrator] --[create zeroed region]--[spawn]----------------[wait]
//!
//! [Host]   ----[open]--[write MESSAGE_COUNT on A...]------[read ack on B]
//!                           |    |    |                         ^
//!                           v    v    v                         |
//! [Guest]  ----[open]--[read and verify on A...]---------[write ack on B]
//! ```
//!
//! The ring is much smaller than the traffic, so the host keeps running into
//! backpressure and both counters wrap the ring many times.
//!
//! # Running the Test
//!
//! ```bash
//! cargo test -p basalt-chan --test e2e_mmap -- --nocapture
//! ```

use basalt_chan::{Channel, ChannelOptions, SharedMapping, Side};
use std::env;
use std::io::Write;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

/// Writes to stderr with immediate flush to bypass test output capture.
macro_rules! log {
    ($($arg:tt)*) => {{
        let _ = writeln!(std::io::stderr(), $($arg)*);
        let _ = std::io::stderr().flush();
    }};
}

const ENV_ROLE: &str = "BASALT_E2E_ROLE";
const ENV_PATH: &str = "BASALT_E2E_PATH";
const ROLE_HOST: &str = "host";
const ROLE_GUEST: &str = "guest";

const MESSAGE_COUNT: u64 = 20_000;

/// Region with two 8 KiB rings.
const REGION_SIZE: u64 = 4096 + 2 * 8192;

const PEER_TIMEOUT: Duration = Duration::from_secs(10);

fn message(seq: u64) -> Vec<u8> {
    let mut m = seq.to_le_bytes().to_vec();
    m.extend((0..(seq % 97) as u8).map(|b| b ^ seq as u8));
    m
}

fn run_host(path: &str) {
    log!("[HOST] Opening region at {path}");
    let mut chan = Channel::open_file(path, &ChannelOptions::default().side(Side::Host))
        .expect("host: failed to open region");

    let start = Instant::now();
    let mut stalls = 0u64;
    for seq in 0..MESSAGE_COUNT {
        let m = message(seq);
        loop {
            match chan.write(&m) {
                Ok(_) => break,
                Err(e) if e.is_backpressure() && start.elapsed() < PEER_TIMEOUT => stalls += 1,
                Err(e) => panic!("[HOST] write {seq} failed: {e}"),
            }
        }
    }
    log!("[HOST] Wrote {MESSAGE_COUNT} messages in {:?} ({stalls} stalls)", start.elapsed());

    let mut buf = [0u8; 64];
    let n = chan
        .read_timeout(&mut buf, PEER_TIMEOUT)
        .expect("host: guest never acknowledged");
    let ack = std::str::from_utf8(&buf[..n]).expect("host: ack is not utf-8");
    log!("[HOST] Ack: {ack}");
    assert_eq!(ack, format!("done:{MESSAGE_COUNT}"));

    let stats = chan.stats();
    log!("[HOST] {stats:?}");
    assert_eq!(stats.frames_written, MESSAGE_COUNT);
    chan.close().expect("host: close failed");
}

fn run_guest(path: &str) {
    log!("[GUEST] Opening region at {path}");
    let mut chan = Channel::open_file(path, &ChannelOptions::default())
        .expect("guest: failed to open region");

    let start = Instant::now();
    let mut buf = [0u8; 256];
    for seq in 0..MESSAGE_COUNT {
        let n = chan
            .read_timeout(&mut buf, PEER_TIMEOUT)
            .unwrap_or_else(|e| panic!("[GUEST] message {seq}: {e}"));
        assert_eq!(&buf[..n], &message(seq)[..], "message {seq} corrupted");
    }
    log!("[GUEST] Verified {MESSAGE_COUNT} messages in {:?}", start.elapsed());

    chan.write(format!("done:{MESSAGE_COUNT}").as_bytes())
        .expect("guest: ack failed");

    let stats = chan.stats();
    log!("[GUEST] {stats:?}");
    assert_eq!(stats.invalid_frames, 0);
    chan.close().expect("guest: close failed");
}

#[test]
fn e2e_two_process_channel() {
    if let Ok(role) = env::var(ENV_ROLE) {
        let path = env::var(ENV_PATH).expect("BASALT_E2E_PATH not set");
        match role.as_str() {
            ROLE_HOST => run_host(&path),
            ROLE_GUEST => run_guest(&path),
            other => panic!("Unknown role: {other}"),
        }
        return;
    }

    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let path = dir.path().join("region").display().to_string();
    let exe = env::current_exe().expect("Failed to get current executable path");

    // Both peers assume a zeroed region.
    drop(SharedMapping::create_rw(&path, REGION_SIZE).expect("failed to create region file"));

    log!("[ORCHESTRATOR] Region: {path} ({REGION_SIZE} bytes)");

    let spawn = |role: &str| {
        Command::new(&exe)
            .arg("--exact")
            .arg("e2e_two_process_channel")
            .env(ENV_ROLE, role)
            .env(ENV_PATH, &path)
            .stderr(Stdio::inherit())
            .spawn()
            .unwrap_or_else(|e| panic!("Failed to spawn {role} process: {e}"))
    };

    let mut host = spawn(ROLE_HOST);
    let mut guest = spawn(ROLE_GUEST);

    let host_status = host.wait().expect("Failed to wait for host");
    let guest_status = guest.wait().expect("Failed to wait for guest");

    log!("[ORCHESTRATOR] Host exit status: {host_status}");
    log!("[ORCHESTRATOR] Guest exit status: {guest_status}");
    assert!(host_status.success(), "Host process failed with status: {host_status}");
    assert!(guest_status.success(), "Guest process failed with status: {guest_status}");
}
