//! In-band pipeline cost against the 10us budget.
//!
//! Measures the canonical interceptor chain on the happy path and the codec
//! on its own, so a regression in either shows up before it shows up in
//! production percentiles.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use velo_codec::{decode, encode};
use velo_gateway::interceptor::{InterceptorChain, InterceptorContext};
use velo_gateway::monitor::PerformanceMonitor;
use velo_types::{Message, MessageType};

fn bench_chain_happy_path(c: &mut Criterion) {
    let mut group = c.benchmark_group("chain_happy_path");

    let monitor = Arc::new(PerformanceMonitor::new());
    let chain = InterceptorChain::standard(1_000_000_000, Arc::clone(&monitor));
    let order = Message::order(MessageType::OrderNew, 12345, "AAPL", 150.50, 100, true);

    group.bench_function("order_through_standard_chain", |b| {
        b.iter(|| {
            let mut ctx = InterceptorContext::new(black_box(order.clone()));
            let accepted = chain.process(&mut ctx);
            black_box(accepted);
        });
    });

    group.finish();
}

fn bench_chain_rejection_path(c: &mut Criterion) {
    let mut group = c.benchmark_group("chain_rejection_path");

    let monitor = Arc::new(PerformanceMonitor::new());
    let chain = InterceptorChain::standard(1_000_000_000, monitor);
    // Crossed market fails validation on the first interceptor.
    let crossed = Message::market_data("AAPL", 150.55, 150.45, 1_000, 1_000);

    group.bench_function("crossed_quote_rejected", |b| {
        b.iter(|| {
            let mut ctx = InterceptorContext::new(black_box(crossed.clone()));
            let accepted = chain.process(&mut ctx);
            black_box(accepted);
        });
    });

    group.finish();
}

fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");

    let order = Message::order(MessageType::OrderNew, 12345, "AAPL", 150.50, 100, true);
    let frame = encode(&order);

    group.bench_function("encode_order", |b| {
        b.iter(|| black_box(encode(black_box(&order))));
    });

    group.bench_function("decode_order", |b| {
        b.iter(|| black_box(decode(black_box(&frame)).expect("valid frame")));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_chain_happy_path,
    bench_chain_rejection_path,
    bench_codec
);
criterion_main!(benches);
