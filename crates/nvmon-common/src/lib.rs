//! Shared types for the nvmon agent.
//!
//! These are the values exchanged between the NVMe core
//! (`nvmon-nvme`) and the metric-emission boundary (`nvmon-collector`).

pub mod types;
