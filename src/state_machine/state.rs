use super::job::{JobHandle, JobStatus};

/// Effect of observing a status on a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Moved forward to the given status.
    Advanced(JobStatus),
    /// Same status as before.
    Unchanged,
    /// Regression or change after a terminal status; not applied.
    Ignored { from: JobStatus, to: JobStatus },
}

impl JobHandle {
    /// Apply an observed status.
    ///
    /// Statuses only move forward along
    /// `Submitted → Queued → Processing → terminal`. Skipping ahead is
    /// allowed (a fast job can go from `Submitted` straight to
    /// `Completed`); once terminal, nothing changes.
    pub fn observe(&mut self, next: JobStatus) -> Transition {
        if next == self.status {
            return Transition::Unchanged;
        }
        if self.status.is_terminal() || next.rank() < self.status.rank() {
            tracing::debug!(
                job_id = %self.id,
                from = %self.status,
                to = %next,
                "Ignoring out-of-order job status",
            );
            return Transition::Ignored {
                from: self.status,
                to: next,
            };
        }

        self.status_history.push(self.status);
        self.status = next;
        Transition::Advanced(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_walks_all_states() {
        let mut job = JobHandle::submitted("job-1".into());

        assert_eq!(job.observe(JobStatus::Queued), Transition::Advanced(JobStatus::Queued));
        assert_eq!(job.observe(JobStatus::Queued), Transition::Unchanged);
        assert_eq!(
            job.observe(JobStatus::Processing),
            Transition::Advanced(JobStatus::Processing)
        );
        assert_eq!(
            job.observe(JobStatus::Completed),
            Transition::Advanced(JobStatus::Completed)
        );
        assert_eq!(
            job.status_history,
            vec![JobStatus::Submitted, JobStatus::Queued, JobStatus::Processing]
        );
    }

    #[test]
    fn skipping_ahead_is_allowed() {
        let mut job = JobHandle::submitted("job-2".into());
        assert_eq!(job.observe(JobStatus::Failed), Transition::Advanced(JobStatus::Failed));
    }

    #[test]
    fn regressions_are_ignored() {
        let mut job = JobHandle::submitted("job-3".into());
        job.observe(JobStatus::Processing);
        assert_eq!(
            job.observe(JobStatus::Queued),
            Transition::Ignored {
                from: JobStatus::Processing,
                to: JobStatus::Queued
            }
        );
        assert_eq!(job.status, JobStatus::Processing);
    }

    #[test]
    fn terminal_is_final() {
        let mut job = JobHandle::submitted("job-4".into());
        job.observe(JobStatus::TimedOut);
        assert!(matches!(
            job.observe(JobStatus::Completed),
            Transition::Ignored { .. }
        ));
        assert_eq!(job.status, JobStatus::TimedOut);
    }

    #[test]
    fn synchronous_completion() {
        let job = JobHandle::completed("sync".into(), vec!["https://cdn/x.png".into()]);
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.outputs.len(), 1);
    }
}
