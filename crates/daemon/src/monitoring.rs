//! Health and tool-call metrics

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use sysinfo::{Pid, ProcessesToUpdate, System};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub status: &'static str,
    pub active_sessions: usize,
    /// Seconds since the daemon started
    pub uptime: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<MemoryUsage>,
}

/// Daemon process memory, in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryUsage {
    pub rss: u64,
    pub virtual_memory: u64,
}

/// Process-level liveness
pub struct HealthMonitor {
    started: Instant,
    pid: Option<Pid>,
    system: Mutex<System>,
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthMonitor {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            pid: sysinfo::get_current_pid().ok(),
            system: Mutex::new(System::new()),
        }
    }

    pub fn health(&self, active_sessions: usize) -> HealthStatus {
        HealthStatus {
            status: "healthy",
            active_sessions,
            uptime: self.started.elapsed().as_secs_f64(),
            timestamp: Utc::now(),
            memory: self.memory(),
        }
    }

    /// `None` where the platform does not expose process memory
    pub fn memory(&self) -> Option<MemoryUsage> {
        let pid = self.pid?;
        let mut system = self.system.lock();
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        system.process(pid).map(|process| MemoryUsage {
            rss: process.memory(),
            virtual_memory: process.virtual_memory(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolMetrics {
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
    pub success_rate: f64,
    pub error_rate: f64,
    /// Milliseconds
    pub average_response_time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_response_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_response_time: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    pub tool_calls: ToolMetrics,
    pub by_tool: BTreeMap<String, ToolMetrics>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default)]
struct Tally {
    total: u64,
    successful: u64,
    sum_ms: f64,
    min_ms: Option<f64>,
    max_ms: Option<f64>,
}

impl Tally {
    fn record(&mut self, success: bool, ms: f64) {
        self.total += 1;
        if success {
            self.successful += 1;
        }
        self.sum_ms += ms;
        self.min_ms = Some(self.min_ms.map_or(ms, |m| m.min(ms)));
        self.max_ms = Some(self.max_ms.map_or(ms, |m| m.max(ms)));
    }

    fn metrics(&self) -> ToolMetrics {
        if self.total == 0 {
            return ToolMetrics::default();
        }
        let total = self.total as f64;
        let failed = self.total - self.successful;
        ToolMetrics {
            total: self.total,
            successful: self.successful,
            failed,
            success_rate: self.successful as f64 / total,
            error_rate: failed as f64 / total,
            average_response_time: self.sum_ms / total,
            min_response_time: self.min_ms,
            max_response_time: self.max_ms,
        }
    }
}

#[derive(Default)]
struct Tallies {
    overall: Tally,
    by_tool: BTreeMap<String, Tally>,
}

/// Running per-tool call statistics
#[derive(Default)]
pub struct MetricsCollector {
    tallies: Mutex<Tallies>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_tool_call(&self, tool: &str, success: bool, elapsed: Duration) {
        let ms = elapsed.as_secs_f64() * 1000.0;
        let mut tallies = self.tallies.lock();
        tallies.overall.record(success, ms);
        tallies
            .by_tool
            .entry(tool.to_string())
            .or_default()
            .record(success, ms);
    }

    pub fn metrics(&self) -> Metrics {
        let tallies = self.tallies.lock();
        Metrics {
            tool_calls: tallies.overall.metrics(),
            by_tool: tallies
                .by_tool
                .iter()
                .map(|(name, tally)| (name.clone(), tally.metrics()))
                .collect(),
            timestamp: Utc::now(),
        }
    }

    pub fn reset(&self) {
        *self.tallies.lock() = Tallies::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_metrics() {
        let metrics = MetricsCollector::new().metrics();
        assert_eq!(metrics.tool_calls, ToolMetrics::default());
        assert!(metrics.by_tool.is_empty());
    }

    #[test]
    fn test_per_tool_rates() {
        let collector = MetricsCollector::new();
        collector.record_tool_call("navigate", true, Duration::from_millis(100));
        collector.record_tool_call("navigate", false, Duration::from_millis(300));
        collector.record_tool_call("click", true, Duration::from_millis(20));

        let metrics = collector.metrics();
        assert_eq!(metrics.tool_calls.total, 3);
        assert_eq!(metrics.tool_calls.failed, 1);

        let navigate = &metrics.by_tool["navigate"];
        assert_eq!(navigate.total, 2);
        assert_eq!(navigate.success_rate, 0.5);
        assert_eq!(navigate.error_rate, 0.5);
        assert_eq!(navigate.average_response_time, 200.0);
        assert_eq!(navigate.min_response_time, Some(100.0));
        assert_eq!(navigate.max_response_time, Some(300.0));

        collector.reset();
        assert_eq!(collector.metrics().tool_calls.total, 0);
    }

    #[test]
    fn test_health_serializes_camel_case() {
        let health = HealthMonitor::new().health(2);
        let value = serde_json::to_value(&health).unwrap();
        assert_eq!(value["status"], "healthy");
        assert_eq!(value["activeSessions"], 2);
        assert!(value["uptime"].as_f64().unwrap() >= 0.0);
    }

    #[test]
    fn test_health_reports_process_memory() {
        let monitor = HealthMonitor::new();
        let health = monitor.health(0);
        if sysinfo::IS_SUPPORTED_SYSTEM {
            let memory = health.memory.unwrap();
            assert!(memory.rss > 0);
            assert!(memory.virtual_memory >= memory.rss);

            let value = serde_json::to_value(&health).unwrap();
            assert!(value["memory"]["rss"].as_u64().unwrap() > 0);
            assert!(value["memory"]["virtualMemory"].is_u64());
        }
    }
}
