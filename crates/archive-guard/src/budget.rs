/// Counters for one archive operation, handed to progress callbacks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransferBudget {
    /// Files handled so far, including skipped ones.
    pub files_processed: u64,

    /// Files expected in total.
    pub total_files: u64,

    /// Bytes handled so far.
    pub bytes_processed: u64,

    /// Bytes expected in total.
    pub total_bytes: u64,
}

impl TransferBudget {
    /// A budget expecting `total_files` files and `total_bytes` bytes.
    pub fn with_totals(total_files: u64, total_bytes: u64) -> Self {
        Self {
            total_files,
            total_bytes,
            ..Self::default()
        }
    }

    /// Count one processed file of `bytes` bytes.
    pub fn record_file(&mut self, bytes: u64) {
        self.files_processed = self.files_processed.saturating_add(1);
        self.bytes_processed = self.bytes_processed.saturating_add(bytes);
    }

    /// Progress by bytes, `0..=100`.
    pub fn percent_complete(&self) -> u64 {
        if self.total_bytes == 0 {
            return if self.files_processed >= self.total_files {
                100
            } else {
                0
            };
        }

        (self.bytes_processed.saturating_mul(100) / self.total_bytes).min(100)
    }
}

/// When a long running operation reports progress.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProgressPolicy {
    /// Report every this many files.
    pub file_interval: u64,

    /// Report after any single entry larger than this.
    pub large_entry_bytes: u64,
}

impl ProgressPolicy {
    /// If progress should be reported after an entry of `entry_bytes` was processed.
    pub fn should_report(&self, budget: &TransferBudget, entry_bytes: u64) -> bool {
        let interval_reached =
            self.file_interval != 0 && budget.files_processed % self.file_interval == 0;

        interval_reached || entry_bytes > self.large_entry_bytes
    }
}

impl Default for ProgressPolicy {
    fn default() -> Self {
        Self {
            file_interval: 100,
            large_entry_bytes: 50 * 1024 * 1024, // 50 MiB
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_on_interval_and_large_entries() {
        let policy = ProgressPolicy::default();
        let mut budget = TransferBudget::with_totals(250, 0);

        let mut reports = 0;
        for _ in 0..250 {
            budget.record_file(10);
            if policy.should_report(&budget, 10) {
                reports += 1;
            }
        }
        assert_eq!(reports, 2);

        assert!(policy.should_report(&budget, 51 * 1024 * 1024));
    }

    #[test]
    fn percent_is_clamped() {
        let mut budget = TransferBudget::with_totals(1, 10);
        budget.record_file(20);
        assert_eq!(budget.percent_complete(), 100);
    }

    #[test]
    fn empty_budget_is_complete() {
        assert_eq!(TransferBudget::default().percent_complete(), 100);
    }
}
