//! Load generator for exercising a running gateway.
//!
//! Latency mode paces single order frames and reports send-side latency
//! percentiles; throughput mode pushes an alternating order/quote stream as
//! fast as the socket accepts it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{info, warn};

use velo_codec::encode;
use velo_types::{Message, MessageType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Paced sends, per-message latency percentiles.
    Latency,
    /// Unpaced sends for a bounded duration, messages per second.
    Throughput,
}

#[derive(Parser, Debug)]
#[command(name = "loadgen")]
#[command(about = "Velo gateway load generator")]
#[command(version)]
struct Args {
    /// Gateway address
    #[arg(long, default_value = "127.0.0.1:8080")]
    addr: String,

    /// Messages to send
    #[arg(short = 'n', long, default_value_t = 100_000)]
    count: usize,

    /// Test mode
    #[arg(short = 'm', long, value_enum, default_value_t = Mode::Latency)]
    mode: Mode,

    /// Throughput mode duration cap in seconds
    #[arg(short = 'd', long, default_value_t = 10)]
    duration: u64,

    /// Client id stamped on generated messages
    #[arg(long, default_value_t = 1)]
    client_id: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();
    let args = Args::parse();

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                stop.store(true, Ordering::Release);
            }
        });
    }

    let mut stream = TcpStream::connect(&args.addr)
        .await
        .with_context(|| format!("failed to connect to {}", args.addr))?;
    stream.set_nodelay(true).context("set TCP_NODELAY")?;
    info!(addr = %args.addr, mode = ?args.mode, "connected to gateway");

    match args.mode {
        Mode::Latency => run_latency(&mut stream, &args, &stop).await,
        Mode::Throughput => run_throughput(&mut stream, &args, &stop).await,
    }
}

fn order(client_id: u64, index: usize) -> Message {
    Message::order(
        MessageType::OrderNew,
        12_345 + index as u64,
        "AAPL",
        150.50,
        100,
        index % 2 == 0,
    )
    .with_client_id(client_id)
}

fn quote(client_id: u64) -> Message {
    Message::market_data("AAPL", 150.45, 150.55, 1_000, 1_000).with_client_id(client_id)
}

async fn run_latency(stream: &mut TcpStream, args: &Args, stop: &AtomicBool) -> Result<()> {
    info!(count = args.count, "running latency test");
    let mut latencies_us = Vec::with_capacity(args.count);

    for i in 0..args.count {
        if stop.load(Ordering::Acquire) {
            warn!(sent = i, "interrupted, reporting partial results");
            break;
        }

        let frame = encode(&order(args.client_id, i));
        let started = Instant::now();
        stream.write_all(&frame).await.context("send failed")?;
        latencies_us.push(started.elapsed().as_secs_f64() * 1_000_000.0);

        // Pace the stream so the server is measured, not overwhelmed.
        tokio::time::sleep(Duration::from_micros(10)).await;

        if (i + 1) % 10_000 == 0 {
            info!(sent = i + 1, total = args.count, "progress");
        }
    }

    if latencies_us.is_empty() {
        warn!("no messages were sent");
        return Ok(());
    }

    latencies_us.sort_by(f64::total_cmp);
    let sum: f64 = latencies_us.iter().sum();
    let avg = sum / latencies_us.len() as f64;

    info!(
        sent = latencies_us.len(),
        avg_us = avg,
        p50_us = percentile(&latencies_us, 0.50),
        p95_us = percentile(&latencies_us, 0.95),
        p99_us = percentile(&latencies_us, 0.99),
        min_us = latencies_us[0],
        max_us = latencies_us[latencies_us.len() - 1],
        target_met = avg < 10.0,
        "latency test results"
    );
    Ok(())
}

async fn run_throughput(stream: &mut TcpStream, args: &Args, stop: &AtomicBool) -> Result<()> {
    info!(
        count = args.count,
        duration_s = args.duration,
        "running throughput test"
    );
    let deadline = Instant::now() + Duration::from_secs(args.duration);
    let started = Instant::now();
    let mut sent = 0usize;

    while sent < args.count && Instant::now() < deadline && !stop.load(Ordering::Acquire) {
        let message = if sent % 2 == 0 {
            order(args.client_id, sent)
        } else {
            quote(args.client_id)
        };
        stream
            .write_all(&encode(&message))
            .await
            .context("send failed")?;
        sent += 1;
    }
    stream.flush().await.context("flush failed")?;

    let elapsed = started.elapsed().as_secs_f64();
    let rate = if elapsed > 0.0 {
        sent as f64 / elapsed
    } else {
        0.0
    };
    info!(sent, elapsed_s = elapsed, rate_msg_per_s = rate, "throughput test results");
    Ok(())
}

/// Sorted-rank percentile over an ascending slice.
fn percentile(sorted: &[f64], quantile: f64) -> f64 {
    let rank = (sorted.len() as f64 * quantile) as usize;
    sorted[rank.saturating_sub(1).min(sorted.len() - 1)]
}
