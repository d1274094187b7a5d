use basalt_chan::{Channel, ChannelOptions, SharedMapping, Side};
use basalt_perf::{make_payload, region_size_for, temp_region_path};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

const CAPACITY: usize = 64 * 1024;
const PAYLOADS: [usize; 4] = [16, 256, 1024, 8192];

fn bench_write_then_read(c: &mut Criterion) {
    let (mut guest, mut host) =
        Channel::pair(region_size_for(CAPACITY), &ChannelOptions::default()).expect("pair");

    let mut group = c.benchmark_group("channel");
    for &len in &PAYLOADS {
        let payload = make_payload(len);
        let mut buf = vec![0u8; len];
        group.throughput(Throughput::Bytes(len as u64));
        group.bench_with_input(BenchmarkId::new("write_read", len), &payload, |b, payload| {
            b.iter(|| {
                assert!(host.try_write(black_box(payload)));
                black_box(guest.try_read(&mut buf));
            });
        });
    }
    group.finish();
}

fn bench_try_read_empty(c: &mut Criterion) {
    let (mut guest, _host) =
        Channel::pair(region_size_for(CAPACITY), &ChannelOptions::default()).expect("pair");
    let mut buf = [0u8; 64];

    let mut group = c.benchmark_group("channel");
    group.throughput(Throughput::Elements(1));
    group.bench_function("try_read (empty)", |b| {
        b.iter(|| black_box(guest.try_read(&mut buf)));
    });
    group.finish();
}

fn bench_drain_batch(c: &mut Criterion) {
    let (mut guest, mut host) =
        Channel::pair(region_size_for(CAPACITY), &ChannelOptions::default()).expect("pair");
    let payload = make_payload(64);
    let mut buf = [0u8; 64];

    let mut group = c.benchmark_group("channel");
    group.throughput(Throughput::Elements(1));
    group.bench_function("try_read (data)", |b| {
        b.iter_custom(|iters| {
            let mut total = std::time::Duration::ZERO;
            let mut left = iters;
            while left > 0 {
                let mut batch = 0;
                while batch < left && host.try_write(&payload) {
                    batch += 1;
                }
                let start = std::time::Instant::now();
                for _ in 0..batch {
                    black_box(guest.try_read(&mut buf));
                }
                total += start.elapsed();
                left -= batch;
            }
            total
        });
    });
    group.finish();
}

fn bench_file_backed_capacities(c: &mut Criterion) {
    let mut group = c.benchmark_group("channel_capacity");
    group.throughput(Throughput::Elements(1));
    let payload = make_payload(128);
    let mut buf = [0u8; 128];

    for &cap in &[4096usize, 16384, 65536, 1 << 20] {
        let path = temp_region_path(&format!("crit_cap_{cap}"));
        drop(
            SharedMapping::create_rw(&path, region_size_for(cap) as u64)
                .expect("failed to create region"),
        );
        let host_options = ChannelOptions::default().side(Side::Host);
        let mut host = Channel::open_file(&path, &host_options).expect("failed to open host");
        let mut guest =
            Channel::open_file(&path, &ChannelOptions::default()).expect("failed to open guest");

        group.bench_function(format!("round_trip_cap_{cap}"), |b| {
            b.iter(|| {
                assert!(host.try_write(black_box(&payload)));
                black_box(guest.try_read(&mut buf));
            });
        });

        drop(host);
        drop(guest);
        let _ = std::fs::remove_file(&path);
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_write_then_read,
    bench_try_read_empty,
    bench_drain_batch,
    bench_file_backed_capacities,
);
criterion_main!(benches);
