use std::sync::Arc;

use tracing::{debug, error};

use crate::MemoryError;

/// Reports the resident memory of the current process.
pub trait MemorySampler: Send + Sync {
    /// Resident memory in bytes, `None` if the platform cannot tell.
    fn resident_bytes(&self) -> Option<u64>;
}

/// Samples `VmRSS` from `/proc/self/status`.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessMemory;

impl MemorySampler for ProcessMemory {
    #[cfg(target_os = "linux")]
    fn resident_bytes(&self) -> Option<u64> {
        let status = std::fs::read_to_string("/proc/self/status").ok()?;

        status
            .lines()
            .find(|line| line.starts_with("VmRSS:"))
            .and_then(|line| line.split_whitespace().nth(1))
            .and_then(|kib| kib.parse::<u64>().ok())
            .map(|kib| kib.saturating_mul(1024))
    }

    #[cfg(not(target_os = "linux"))]
    fn resident_bytes(&self) -> Option<u64> {
        None
    }
}

/// Aborts a long running operation when the process grows past a memory budget.
///
/// Poll [`ResourceMonitor::check_memory_usage`] once per chunk. When the platform
/// cannot report memory the monitor never fails.
#[derive(Clone)]
pub struct ResourceMonitor {
    sampler: Arc<dyn MemorySampler>,
    baseline: Option<u64>,
    max_memory_bytes: u64,
}

impl ResourceMonitor {
    /// The default allowed growth.
    pub const DEFAULT_MAX_MEMORY_BYTES: u64 = 256 * 1024 * 1024; // 256 MiB

    /// Start monitoring the current process.
    pub fn start(max_memory_bytes: u64) -> Self {
        Self::with_sampler(max_memory_bytes, Arc::new(ProcessMemory))
    }

    /// Start monitoring with a custom sampler.
    pub fn with_sampler(max_memory_bytes: u64, sampler: Arc<dyn MemorySampler>) -> Self {
        let baseline = sampler.resident_bytes();
        if baseline.is_none() {
            debug!("Process memory is unavailable, memory checks are disabled");
        }

        Self {
            sampler,
            baseline,
            max_memory_bytes,
        }
    }

    /// If memory is actually being checked.
    pub fn is_active(&self) -> bool {
        self.baseline.is_some()
    }

    /// The resident memory when monitoring started.
    pub fn baseline(&self) -> Option<u64> {
        self.baseline
    }

    /// Sample memory and fail if growth since the start exceeds the budget.
    ///
    /// Returns the growth in bytes.
    pub fn check_memory_usage(&self) -> Result<u64, MemoryError> {
        let Some(baseline) = self.baseline else {
            return Ok(0);
        };
        let Some(current) = self.sampler.resident_bytes() else {
            return Ok(0);
        };

        let growth = current.saturating_sub(baseline);
        if growth > self.max_memory_bytes {
            let error = MemoryError {
                growth,
                limit: self.max_memory_bytes,
            };
            error!("Aborting operation: {error}");
            return Err(error);
        }

        Ok(growth)
    }
}

impl core::fmt::Debug for ResourceMonitor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ResourceMonitor")
            .field("baseline", &self.baseline)
            .field("max_memory_bytes", &self.max_memory_bytes)
            .finish()
    }
}
