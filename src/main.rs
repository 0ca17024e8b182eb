use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, error, info, warn};

use pm_watcher::cli::{Cli, Commands};
use pm_watcher::collectors::PortTrafficCollector;
use pm_watcher::config::AppConfig;
use pm_watcher::snmp::client::{SnmpTarget, SnmpV2cTransport};
use pm_watcher::snmp::SnmpTransport;
use pm_watcher::storage::sqlite::SqliteMetricStore;
use pm_watcher::storage::MetricStore;
use pm_watcher::writer::BufferedWriter;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Commands::Run => run_loop(&config).await,
        Commands::Collect { filter } => collect_once(&config, filter).await,
        Commands::Discover { json } => discover(&config, json).await,
        Commands::Check => check(&config).await,
    }
}

async fn connect(config: &AppConfig) -> Result<Arc<dyn SnmpTransport>> {
    let target = SnmpTarget {
        host: config.snmp.host.clone(),
        port: config.snmp.port,
        community: config.snmp.community.clone(),
        timeout: Duration::from_secs(config.snmp.timeout_secs),
        retries: config.snmp.retries,
        max_repetitions: config.snmp.max_repetitions,
    };
    let transport = SnmpV2cTransport::connect(target)
        .await
        .context("opening SNMP session")?;
    Ok(Arc::new(transport))
}

fn build_collector(config: &AppConfig, transport: Arc<dyn SnmpTransport>) -> PortTrafficCollector {
    PortTrafficCollector::new(transport, config.traffic_settings())
}

fn open_store(config: &AppConfig) -> Result<Arc<SqliteMetricStore>> {
    let store =
        SqliteMetricStore::new(&config.storage.path).context("opening metric storage")?;
    Ok(Arc::new(store))
}

/// Continuous collection: one cycle per interval, skipping a tick when the
/// previous cycle is still running, with periodic local cleanup. Ctrl-C
/// stops the loop and flushes the writer before exit.
async fn run_loop(config: &AppConfig) -> Result<()> {
    if !config.pm.enabled {
        warn!("pm collection is disabled in configuration, nothing to do");
        return Ok(());
    }

    let transport = connect(config).await?;
    let collector = Arc::new(build_collector(config, transport));
    if !collector.probe().await {
        anyhow::bail!(
            "SNMP agent {}:{} did not answer the probe",
            config.snmp.host,
            config.snmp.port
        );
    }
    let store = open_store(config)?;
    if !store.health_check() {
        anyhow::bail!("metric store at {} failed its health check", config.storage.path);
    }
    let writer = Arc::new(BufferedWriter::new(
        store,
        config.storage.batch_size,
        Duration::from_secs(config.storage.flush_interval_secs),
    ));

    let startup_delay = Duration::from_secs(config.collection.startup_delay_secs);
    if !startup_delay.is_zero() {
        info!("waiting {}s before first cycle", startup_delay.as_secs());
        tokio::time::sleep(startup_delay).await;
    }

    let interval = Duration::from_secs(config.pm.interval_secs);
    let counter_ttl = Duration::from_secs(config.pm.cleanup.counter_ttl_secs);
    let request_ttl = Duration::from_secs(config.pm.cleanup.request_ttl_secs);
    let failed_request_ttl = Duration::from_secs(config.pm.cleanup.failed_request_ttl_secs);
    let max_counters = config.pm.cleanup.max_counters;

    info!(
        "starting collection loop (interval={}s, target={}:{})",
        interval.as_secs(),
        config.snmp.host,
        config.snmp.port
    );

    let in_flight = Arc::new(tokio::sync::Mutex::new(()));
    let mut ticks = tokio::time::interval(interval);
    ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut cycle: u64 = 0;
    let records_collected = Arc::new(std::sync::atomic::AtomicU64::new(0));

    loop {
        tokio::select! {
            _ = ticks.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received, shutting down");
                break;
            }
        }

        // A cycle slower than the interval makes the next tick a no-op
        // instead of stacking concurrent cycles.
        let Ok(guard) = in_flight.clone().try_lock_owned() else {
            warn!("previous collection cycle still running, skipping this tick");
            continue;
        };
        cycle += 1;

        let collector = Arc::clone(&collector);
        let writer = Arc::clone(&writer);
        let records_collected = Arc::clone(&records_collected);
        tokio::spawn(async move {
            let _guard = guard;

            let started = tokio::time::Instant::now();
            let records = collector.collect_port_traffic(None).await;
            let elapsed = started.elapsed();
            info!(
                "cycle {cycle}: {} records in {:.1}s",
                records.len(),
                elapsed.as_secs_f64()
            );
            records_collected.fetch_add(records.len() as u64, std::sync::atomic::Ordering::Relaxed);
            writer.enqueue(records);

            collector.cleanup_old_counters(counter_ttl, max_counters);
            collector
                .manager()
                .cleanup_old_requests(request_ttl, failed_request_ttl)
                .await;
            let stats = writer.stats();
            debug!(
                "writer: {} enqueued, {} written, {} dropped, {} buffered",
                stats.records_enqueued,
                stats.records_written,
                stats.records_dropped,
                stats.buffer_size
            );
        });
    }

    // Let an in-flight cycle finish before the final flush.
    let _drain = in_flight.lock().await;
    writer.shutdown().await;

    let stats = writer.stats();
    info!(
        "run summary: {cycle} cycles, {} records collected, {} written, {} dropped",
        records_collected.load(std::sync::atomic::Ordering::Relaxed),
        stats.records_written,
        stats.records_dropped
    );
    Ok(())
}

async fn collect_once(config: &AppConfig, filter: Option<String>) -> Result<()> {
    let transport = connect(config).await?;
    let collector = build_collector(config, transport);
    let store = open_store(config)?;
    let writer = BufferedWriter::new(
        store,
        config.storage.batch_size,
        Duration::from_secs(config.storage.flush_interval_secs),
    );

    let ports = collector
        .discover_ports(filter.as_deref().or(config.pm.port_filter.as_deref()))
        .await;
    if ports.is_empty() {
        warn!("no ports discovered, nothing to collect");
        writer.shutdown().await;
        return Ok(());
    }

    let records = collector.collect_port_traffic(Some(ports)).await;
    println!("collected {} records", records.len());
    writer.enqueue(records);
    writer.shutdown().await;
    Ok(())
}

async fn discover(config: &AppConfig, json: bool) -> Result<()> {
    let transport = connect(config).await?;
    let collector = build_collector(config, transport);

    let ports = collector
        .discover_ports(config.pm.port_filter.as_deref())
        .await;
    let mut ports: Vec<_> = ports.into_values().collect();
    ports.sort_by(|a, b| a.key().cmp(&b.key()));

    if json {
        println!("{}", serde_json::to_string_pretty(&ports)?);
        return Ok(());
    }

    if ports.is_empty() {
        println!("No ports discovered.");
        return Ok(());
    }
    println!("{:<8} {:<8} {:<24} {:<12} {:>12}", "NE", "PORT", "NAME", "TYPE", "BANDWIDTH");
    for port in &ports {
        println!(
            "{:<8} {:<8} {:<24} {:<12} {:>12}",
            port.ne_id, port.port_id, port.port_name, port.port_type, port.bandwidth
        );
    }
    println!("{} ports", ports.len());
    Ok(())
}

async fn check(config: &AppConfig) -> Result<()> {
    let mut healthy = true;

    match connect(config).await {
        Ok(transport) => {
            let collector = build_collector(config, transport);
            if collector.probe().await {
                println!("SNMP agent {}:{} reachable", config.snmp.host, config.snmp.port);
            } else {
                println!("SNMP agent {}:{} not responding", config.snmp.host, config.snmp.port);
                healthy = false;
            }
        }
        Err(e) => {
            error!("SNMP session failed: {e:#}");
            println!("SNMP agent {}:{} unreachable", config.snmp.host, config.snmp.port);
            healthy = false;
        }
    }

    match open_store(config) {
        Ok(store) => {
            if store.health_check() {
                println!("storage at {} healthy", config.storage.path);
            } else {
                println!("storage at {} failed health check", config.storage.path);
                healthy = false;
            }
            store.close();
        }
        Err(e) => {
            error!("storage open failed: {e:#}");
            println!("storage at {} unavailable", config.storage.path);
            healthy = false;
        }
    }

    if !healthy {
        std::process::exit(1);
    }
    Ok(())
}
