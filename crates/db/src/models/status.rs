//! Job lifecycle status, stored as a SMALLINT referencing `job_statuses`.

/// Primary key type of `job_statuses`.
pub type StatusId = i16;

/// Discriminants equal the seeded `job_statuses.id` values. Transitions
/// only move forward: queued -> processing -> completed | failed.
#[repr(i16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Queued = 1,
    Processing = 2,
    Completed = 3,
    Failed = 4,
}

impl JobStatus {
    pub const ALL: [JobStatus; 4] = [
        JobStatus::Queued,
        JobStatus::Processing,
        JobStatus::Completed,
        JobStatus::Failed,
    ];

    pub fn id(self) -> StatusId {
        self as StatusId
    }

    /// Matches `job_statuses.name`.
    pub fn name(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn from_id(id: StatusId) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.id() == id)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.name() == name)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl From<JobStatus> for StatusId {
    fn from(status: JobStatus) -> Self {
        status.id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_follow_lifecycle_order() {
        let ids: Vec<StatusId> = JobStatus::ALL.iter().map(|s| s.id()).collect();
        assert_eq!(ids, [1, 2, 3, 4]);
    }

    #[test]
    fn status_into_status_id() {
        let id: StatusId = JobStatus::Failed.into();
        assert_eq!(id, 4);
    }

    #[test]
    fn lookup_by_id_and_name() {
        assert_eq!(JobStatus::from_id(2), Some(JobStatus::Processing));
        assert_eq!(JobStatus::from_id(9), None);
        assert_eq!(JobStatus::from_name("completed"), Some(JobStatus::Completed));
        assert_eq!(JobStatus::from_name("cancelled"), None);
        assert_eq!(JobStatus::Queued.name(), "queued");
    }

    #[test]
    fn only_completed_and_failed_are_terminal() {
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }
}
