//! Gateway server binary.
//!
//! Builds a runtime with one pinned worker per configured thread, binds the
//! server, registers the domain services, and runs until SIGINT or SIGTERM.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

use velo_gateway::config::{
    GatewayConfig, DEFAULT_BUFFER_SIZE, DEFAULT_PORT, DEFAULT_RATE_LIMIT, DEFAULT_THREAD_COUNT,
};
use velo_gateway::interceptor::InterceptorChain;
use velo_gateway::monitor::PerformanceMonitor;
use velo_gateway::registry::ServiceRegistry;
use velo_gateway::server::GatewayServer;
use velo_gateway::services::{MarketDataService, OrderMatchingService, RiskManagementService};

const STATS_PERIOD: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(name = "gateway")]
#[command(about = "Velo low-latency trading gateway")]
#[command(version)]
struct Args {
    /// TCP port to bind
    #[arg(short = 'p', long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Worker thread count
    #[arg(short = 't', long = "threads", default_value_t = DEFAULT_THREAD_COUNT)]
    threads: usize,

    /// Per-socket buffer size in bytes
    #[arg(short = 'b', long = "buffer-size", default_value_t = DEFAULT_BUFFER_SIZE)]
    buffer_size: usize,

    /// Pin worker threads to CPUs (the default)
    #[arg(short = 'a', long = "affinity", action = ArgAction::SetTrue)]
    affinity: bool,

    /// Disable CPU pinning
    #[arg(long = "no-affinity", action = ArgAction::SetTrue, conflicts_with = "affinity")]
    no_affinity: bool,

    /// Throttler admission limit in messages per second
    #[arg(long = "rate-limit", default_value_t = DEFAULT_RATE_LIMIT)]
    rate_limit: usize,

    /// Let the dispatcher idle between messages instead of spinning
    #[arg(long = "no-busy-poll", action = ArgAction::SetTrue)]
    no_busy_poll: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args);

    let config = GatewayConfig {
        port: args.port,
        thread_count: args.threads.max(1),
        buffer_size: args.buffer_size,
        affinity_enabled: args.affinity || !args.no_affinity,
        rate_limit: args.rate_limit,
        busy_poll: !args.no_busy_poll,
        ..Default::default()
    };

    info!(
        port = config.port,
        threads = config.thread_count,
        buffer_size = config.clamped_buffer_size(),
        affinity = config.affinity_enabled,
        "starting Velo gateway, target latency < 10us"
    );

    let runtime = build_runtime(&config)?;
    runtime.block_on(run(config))
}

fn init_logging(args: &Args) {
    let log_level = match args.log_level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    };
    tracing_subscriber::fmt().with_max_level(log_level).init();
}

/// Multi-thread runtime whose workers double as the socket worker pool.
/// Worker `i` pins to CPU `i mod N`; pinning is best-effort and skipped
/// silently where core enumeration is unavailable.
fn build_runtime(config: &GatewayConfig) -> Result<Runtime> {
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder
        .worker_threads(config.thread_count)
        .thread_name("gateway-worker")
        .enable_all();

    if config.affinity_enabled {
        if let Some(cores) = core_affinity::get_core_ids().filter(|c| !c.is_empty()) {
            let next_worker = Arc::new(AtomicUsize::new(0));
            builder.on_thread_start(move || {
                let worker = next_worker.fetch_add(1, Ordering::Relaxed);
                let core = cores[worker % cores.len()];
                if core_affinity::set_for_current(core) {
                    debug!(worker, core = core.id, "pinned worker thread");
                } else {
                    debug!(worker, core = core.id, "could not pin worker thread");
                }
            });
        }
    }

    builder.build().context("failed to build worker runtime")
}

async fn run(config: GatewayConfig) -> Result<()> {
    let monitor = Arc::new(PerformanceMonitor::new());
    let registry = Arc::new(ServiceRegistry::new(config.queue_capacity, config.busy_poll));

    registry.register(Arc::new(OrderMatchingService::new()));
    registry.register(Arc::new(MarketDataService::new()));
    registry.register(Arc::new(RiskManagementService::new()));

    let chain = Arc::new(InterceptorChain::standard(
        config.rate_limit,
        Arc::clone(&monitor),
    ));

    let server = Arc::new(
        GatewayServer::bind(config, chain, Arc::clone(&registry), Arc::clone(&monitor))
            .await
            .context("failed to initialize gateway server")?,
    );

    registry.start_all().await;
    server.start();

    info!(addr = %server.local_addr(), "gateway running, press Ctrl+C to stop");

    let stats = tokio::spawn(stats_loop(
        Arc::clone(&server),
        Arc::clone(&registry),
        Arc::clone(&monitor),
    ));

    wait_for_shutdown().await;
    info!("received shutdown signal, stopping");

    stats.abort();
    server.stop().await;
    registry.stop_all().await;

    info!("gateway stopped");
    Ok(())
}

/// Periodic operational stats; also feeds the monitor's throughput gauge.
async fn stats_loop(
    server: Arc<GatewayServer>,
    registry: Arc<ServiceRegistry>,
    monitor: Arc<PerformanceMonitor>,
) {
    let mut tick = tokio::time::interval(STATS_PERIOD);
    tick.tick().await; // immediate first tick
    let mut last_processed = server.messages_processed();

    loop {
        tick.tick().await;
        let processed = server.messages_processed();
        let rate = (processed - last_processed) / STATS_PERIOD.as_secs();
        last_processed = processed;
        monitor.record_throughput(rate);

        info!(
            connections = server.connection_count(),
            processed,
            dropped = server.messages_dropped(),
            active_services = registry.active_count(),
            stats = %monitor.snapshot(),
            "gateway stats"
        );
    }
}

async fn wait_for_shutdown() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    result = ctrl_c => {
                        if let Err(e) = result {
                            warn!(error = %e, "ctrl-c handler failed");
                        }
                    }
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable");
                if let Err(e) = ctrl_c.await {
                    warn!(error = %e, "ctrl-c handler failed");
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = ctrl_c.await {
            warn!(error = %e, "ctrl-c handler failed");
        }
    }
}
