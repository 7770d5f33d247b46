//! Metric collection framework for the nvmon agent.
//!
//! Each [`Collector`] implementation gathers a category of device metrics
//! and returns them as a vector of [`MetricDataPoint`]s ready for export.

pub mod nvme;

use anyhow::Result;
use nvmon_common::types::MetricDataPoint;

/// A metric collector that runs on the agent host.
///
/// Implementations are registered in the agent's collection loop and called
/// at each collection interval. The trait requires `Send + Sync` to support
/// concurrent collection across multiple threads.
pub trait Collector: Send + Sync {
    /// Returns the collector name (e.g., `"nvme"`), used for logging and
    /// metric namespacing.
    fn name(&self) -> &str;

    /// Collects current metric values for the given `agent_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if device enumeration fails. Per-device failures
    /// are handled internally with backoff and do not fail the cycle.
    fn collect(&mut self, agent_id: &str) -> Result<Vec<MetricDataPoint>>;
}
