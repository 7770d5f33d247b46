mod config;

use anyhow::Result;
use nvmon_collector::nvme::NvmeCollector;
use nvmon_collector::Collector;
use nvmon_common::types::format_labels;
use tokio::signal;
use tokio::time::{interval, Duration};
use tracing_subscriber::EnvFilter;

#[cfg(target_os = "linux")]
fn build_collector(config: &config::AgentConfig) -> impl Collector {
    NvmeCollector::new(
        nvmon_nvme::LinuxDeviceInfo::new(),
        &config.devices,
        config.collect_ebs,
        config.collect_instance_store,
    )
}

#[cfg(not(target_os = "linux"))]
fn build_collector(config: &config::AgentConfig) -> impl Collector {
    NvmeCollector::new(
        nvmon_nvme::UnsupportedDeviceInfo,
        &config.devices,
        config.collect_ebs,
        config.collect_instance_store,
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("nvmon=info".parse()?))
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/agent.toml".to_string());

    let config = config::AgentConfig::load(&config_path)?;
    tracing::info!(agent_id = %config.agent_id, "nvmon-agent starting");

    let mut collector = build_collector(&config);
    let mut tick = interval(Duration::from_secs(config.collection_interval_secs));

    tracing::info!(
        interval_secs = config.collection_interval_secs,
        collect_ebs = config.collect_ebs,
        collect_instance_store = config.collect_instance_store,
        "Starting collection loop"
    );

    loop {
        tokio::select! {
            _ = tick.tick() => {
                match collector.collect(&config.agent_id) {
                    Ok(points) => {
                        tracing::info!(count = points.len(), "Collected metrics");
                        for point in &points {
                            tracing::debug!(
                                metric = %point.metric_name,
                                value = point.value,
                                labels = %format_labels(&point.labels),
                                "metric"
                            );
                        }
                    }
                    Err(e) => {
                        tracing::warn!(collector = collector.name(), error = %e, "Collection failed");
                    }
                }
            }
            _ = signal::ctrl_c() => {
                tracing::info!("Shutdown signal received");
                break;
            }
        }
    }

    Ok(())
}
