use std::time::Duration;

/// Reconciliation loop settings.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Delay between reconciliation cycles.
    pub interval: Duration,
    /// Maximum number of open jobs examined per cycle.
    pub batch_size: i64,
    /// Open rows that still have no engine id after this many minutes are
    /// failed. Jobs with an engine id are never timed out here.
    pub stale_after_mins: i32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            batch_size: 50,
            stale_after_mins: 30,
        }
    }
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default |
    /// |---------------------------|---------|
    /// | `RECONCILE_INTERVAL_SECS` | `10`    |
    /// | `RECONCILE_BATCH_SIZE`    | `50`    |
    /// | `JOB_STALE_AFTER_MINS`    | `30`    |
    pub fn from_env() -> Self {
        let interval_secs: u64 = std::env::var("RECONCILE_INTERVAL_SECS")
            .unwrap_or_else(|_| "10".into())
            .parse()
            .expect("RECONCILE_INTERVAL_SECS must be a valid u64");

        let batch_size: i64 = std::env::var("RECONCILE_BATCH_SIZE")
            .unwrap_or_else(|_| "50".into())
            .parse()
            .expect("RECONCILE_BATCH_SIZE must be a valid i64");

        let stale_after_mins: i32 = std::env::var("JOB_STALE_AFTER_MINS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("JOB_STALE_AFTER_MINS must be a valid i32");

        Self {
            interval: Duration::from_secs(interval_secs.max(1)),
            batch_size: batch_size.max(1),
            stale_after_mins: stale_after_mins.max(1),
        }
    }
}
