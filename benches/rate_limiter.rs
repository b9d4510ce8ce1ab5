//! Broadcast path benchmarks
//!
//! Measures limiter admission and queue draining, plus envelope encoding.
//!
//! Run with: cargo bench --bench rate_limiter

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;
use std::time::{Duration, Instant};

use opswatch::dashboard::RateLimiter;
use opswatch::{Message, RateLimitConfig};

fn config(max: u32, bound: usize) -> RateLimitConfig {
    RateLimitConfig {
        max_messages_per_second: max,
        burst_limit: bound,
        window_ms: 1000,
    }
}

fn bench_admission(c: &mut Criterion) {
    let mut group = c.benchmark_group("admission");
    for max in [20u32, 1000] {
        group.bench_with_input(BenchmarkId::new("try_acquire", max), &max, |b, &max| {
            let t0 = Instant::now();
            let mut limiter = RateLimiter::new(&config(max, 100), t0);
            let mut tick = 0u64;
            b.iter(|| {
                tick += 1;
                // Advance one window every `max` calls so capacity keeps refilling
                let now = t0 + Duration::from_secs(tick / max as u64);
                black_box(limiter.try_acquire(now))
            });
        });
    }
    group.finish();
}

fn bench_queue_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue");
    for depth in [10usize, 100, 1000] {
        group.bench_with_input(BenchmarkId::new("fill_and_drain", depth), &depth, |b, &depth| {
            let message = Message::log_change(json!({ "filename": "app.log", "recentContent": "x" }));
            b.iter(|| {
                let t0 = Instant::now();
                let mut limiter = RateLimiter::new(&config(depth as u32, depth), t0);
                for _ in 0..depth {
                    limiter.enqueue(message.clone(), Some("logs".to_string()), t0);
                }
                black_box(limiter.drain_ready(t0 + Duration::from_secs(1)).len())
            });
        });
    }
    group.finish();
}

fn bench_encode(c: &mut Criterion) {
    let tail = "GET /health 200 1ms\n".repeat(20);
    let message = Message::log_change(json!({
        "filename": "access.log",
        "path": "/var/log/app/access.log",
        "recentContent": tail,
    }));
    c.bench_function("encode_log_change", |b| b.iter(|| black_box(message.to_json())));
}

criterion_group!(benches, bench_admission, bench_queue_drain, bench_encode);
criterion_main!(benches);
