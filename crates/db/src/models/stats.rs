use serde::Serialize;

/// Platform-wide counters for the admin dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct PlatformStats {
    pub total_users: i64,
    pub total_jobs: i64,
    pub completed_jobs: i64,
    pub failed_jobs: i64,
    pub total_images: i64,
    /// Completed jobs as a percentage of all jobs, rounded to one decimal.
    pub success_rate: f64,
}

impl PlatformStats {
    pub fn from_counts(
        total_users: i64,
        total_jobs: i64,
        completed_jobs: i64,
        failed_jobs: i64,
        total_images: i64,
    ) -> Self {
        let success_rate = if total_jobs > 0 {
            (completed_jobs as f64 / total_jobs as f64 * 1000.0).round() / 10.0
        } else {
            0.0
        };
        Self {
            total_users,
            total_jobs,
            completed_jobs,
            failed_jobs,
            total_images,
            success_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_rate_is_zero_without_jobs() {
        assert_eq!(PlatformStats::from_counts(3, 0, 0, 0, 0).success_rate, 0.0);
    }

    #[test]
    fn success_rate_rounds_to_one_decimal() {
        let stats = PlatformStats::from_counts(1, 3, 2, 1, 2);
        assert_eq!(stats.success_rate, 66.7);
    }
}
