//! Resource usage of a container as reported by the daemon
use std::collections::HashMap;

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;

use crate::remote::{NetworkStats, StatsResponse};

/// Reports the statistics for a container
#[derive(Debug, Serialize, Default, PartialEq, Eq)]
pub struct Stats {
    /// Time the daemon took the snapshot
    pub read: Option<DateTime<Utc>>,
    /// Cpu statistics for the container
    pub cpu: CpuStats,
    /// Memory statistics for the container
    pub memory: MemoryStats,
    /// Pid statistics for the container
    pub pids: PidStats,
    /// Network statistics keyed by interface name
    pub networks: HashMap<String, NetworkStats>,
}

#[derive(Debug, Serialize, Default, PartialEq, Eq)]
pub struct CpuStats {
    /// Cpu time consumed by tasks in total
    pub usage_total: u64,
    /// Cpu time consumed by tasks in user mode
    pub usage_user: u64,
    /// Cpu time consumed by tasks in kernel mode
    pub usage_kernel: u64,
    /// Cpu time consumed by tasks itemized per core
    pub per_core_usage_total: Vec<u64>,
    pub throttled_periods: u64,
    pub throttled_time: u64,
}

#[derive(Debug, Serialize, Default, PartialEq, Eq)]
pub struct MemoryStats {
    /// Usage in bytes
    pub usage: u64,
    /// Maximum recorded usage in bytes
    pub max_usage: u64,
    /// Number of times memory usage hit limits
    pub fail_count: u64,
    /// Memory usage limit
    pub limit: u64,
    /// Page cache in bytes
    pub cache: u64,
}

#[derive(Debug, Serialize, Default, PartialEq, Eq)]
pub struct PidStats {
    /// Current number of active pids
    pub current: u64,
    /// Allowed number of active pids (0 means no limit)
    pub limit: u64,
}

impl From<StatsResponse> for Stats {
    fn from(resp: StatsResponse) -> Self {
        let read = match resp.timestamp {
            0 => None,
            ts => i64::try_from(ts)
                .ok()
                .and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
        };

        Self {
            read,
            cpu: CpuStats {
                usage_total: resp.cpu_usage_total,
                usage_user: resp.cpu_usage_user,
                usage_kernel: resp.cpu_usage_kernel,
                per_core_usage_total: resp.percpu_usage,
                throttled_periods: resp.cpu_throttled_periods,
                throttled_time: resp.cpu_throttled_time,
            },
            memory: MemoryStats {
                usage: resp.memory_usage,
                max_usage: resp.memory_max_usage,
                fail_count: resp.memory_failcnt,
                limit: resp.memory_limit,
                cache: resp.memory_cache,
            },
            pids: PidStats {
                current: resp.pids_current,
                limit: resp.pids_limit,
            },
            networks: resp
                .network_stats
                .into_iter()
                .map(|net| (net.name.clone(), net))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_stats_response() {
        let resp = StatsResponse {
            cpu_usage_total: 300,
            cpu_usage_user: 200,
            cpu_usage_kernel: 100,
            percpu_usage: vec![150, 150],
            memory_usage: 4096,
            memory_limit: 8192,
            pids_current: 3,
            network_stats: vec![NetworkStats {
                name: "eth0".to_owned(),
                rx_bytes: 10,
                tx_bytes: 20,
                ..Default::default()
            }],
            timestamp: 1_700_000_000,
            ..Default::default()
        };

        let stats = Stats::from(resp);
        assert_eq!(stats.cpu.usage_total, 300);
        assert_eq!(stats.cpu.per_core_usage_total, vec![150, 150]);
        assert_eq!(stats.memory.usage, 4096);
        assert_eq!(stats.memory.limit, 8192);
        assert_eq!(stats.pids.current, 3);
        assert_eq!(stats.networks["eth0"].tx_bytes, 20);
        assert_eq!(stats.read.map(|t| t.timestamp()), Some(1_700_000_000));
    }

    #[test]
    fn test_missing_timestamp() {
        let stats = Stats::from(StatsResponse::default());
        assert_eq!(stats.read, None);
        assert!(stats.networks.is_empty());
    }
}
