//! Job lifecycle state machine and the records it governs.
//!
//! ```text
//! Open ──assign──▶ Assigned ──complete──▶ Completed
//!  │                  │                       │
//!  cancel           dispute                dispute
//!  ▼                  ▼                       ▼
//! Cancelled        Disputed ◀─────────────────┘
//! ```
//!
//! `Cancelled` and `Disputed` are terminal. Dispute resolution happens
//! outside the marketplace.

use chrono::{DateTime, Utc};
use gig_core::{Amount, JobId, PrincipalId};
use serde::{Deserialize, Serialize};

use crate::error::MarketError;

/// The status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    /// Accepting applications.
    Open,
    /// A freelancer has been assigned.
    Assigned,
    /// Work reported complete by either party.
    Completed,
    /// Withdrawn by the client before assignment.
    Cancelled,
    /// A party raised a dispute.
    Disputed,
}

impl JobStatus {
    /// Checks if a transition to the target status is valid.
    #[must_use]
    pub const fn can_transition_to(&self, target: &Self) -> bool {
        use JobStatus::{Assigned, Cancelled, Completed, Disputed, Open};

        matches!(
            (self, target),
            (Open, Assigned) | (Open, Cancelled) | (Assigned, Completed) | (Assigned | Completed, Disputed)
        )
    }

    /// Returns true if no further transition is possible.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Disputed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "Open"),
            Self::Assigned => write!(f, "Assigned"),
            Self::Completed => write!(f, "Completed"),
            Self::Cancelled => write!(f, "Cancelled"),
            Self::Disputed => write!(f, "Disputed"),
        }
    }
}

/// The part a caller plays in a specific job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobRole {
    /// The principal who posted the job.
    Client,
    /// The principal assigned to do the work.
    Freelancer,
}

/// A posted job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Job identifier.
    pub id: JobId,
    /// The client who posted the job.
    pub client: PrincipalId,
    /// Short title.
    pub title: String,
    /// Work description.
    pub description: String,
    /// Agreed price; may drop once to the accepted bid.
    pub price: Amount,
    /// Current lifecycle status.
    pub status: JobStatus,
    /// Assigned freelancer, once assigned.
    pub freelancer: Option<PrincipalId>,
    /// When the job was posted.
    pub created_at: DateTime<Utc>,
    /// When the job was reported complete.
    pub completed_at: Option<DateTime<Utc>>,
    /// Whether escrowed payment has gone to the freelancer.
    pub funds_released: bool,
}

impl Job {
    /// Creates an open job.
    #[must_use]
    pub fn new(
        id: JobId,
        client: PrincipalId,
        title: String,
        description: String,
        price: Amount,
    ) -> Self {
        Self {
            id,
            client,
            title,
            description,
            price,
            status: JobStatus::Open,
            freelancer: None,
            created_at: Utc::now(),
            completed_at: None,
            funds_released: false,
        }
    }

    /// Resolves what `caller` is to this job, if anything.
    ///
    /// A principal who is both client and assigned freelancer resolves to
    /// `Client`.
    #[must_use]
    pub fn role_of(&self, caller: &PrincipalId) -> Option<JobRole> {
        if self.client == *caller {
            Some(JobRole::Client)
        } else if self.freelancer.as_ref() == Some(caller) {
            Some(JobRole::Freelancer)
        } else {
            None
        }
    }

    /// Fails with `InvalidState` unless the job is in `expected`.
    pub fn require_status(&self, expected: JobStatus, action: &'static str) -> Result<(), MarketError> {
        if self.status == expected {
            Ok(())
        } else {
            Err(self.invalid_state(action))
        }
    }

    /// Fails with `Unauthorized` unless `caller` posted the job.
    pub fn require_client(&self, caller: &PrincipalId, action: &'static str) -> Result<(), MarketError> {
        if self.client == *caller {
            Ok(())
        } else {
            Err(MarketError::Unauthorized {
                caller: caller.clone(),
                action,
            })
        }
    }

    /// Fails with `Unauthorized` unless `caller` is the client or the
    /// assigned freelancer.
    pub fn require_party(&self, caller: &PrincipalId, action: &'static str) -> Result<JobRole, MarketError> {
        self.role_of(caller).ok_or_else(|| MarketError::Unauthorized {
            caller: caller.clone(),
            action,
        })
    }

    /// Moves the job to `target` if the state machine allows it.
    pub fn transition_to(&mut self, target: JobStatus, action: &'static str) -> Result<(), MarketError> {
        if self.status.can_transition_to(&target) {
            self.status = target;
            Ok(())
        } else {
            Err(self.invalid_state(action))
        }
    }

    /// Builds the `InvalidState` error for the current status.
    #[must_use]
    pub fn invalid_state(&self, action: &'static str) -> MarketError {
        MarketError::InvalidState {
            job_id: self.id,
            status: self.status,
            action,
        }
    }
}

/// A freelancer's bid on an open job. Immutable once submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    /// The applicant.
    pub freelancer: PrincipalId,
    /// The applicant's resume at submission time.
    pub resume: Option<String>,
    /// Offered price; never above the job price.
    pub bid: Amount,
    /// When the application was submitted.
    pub submitted_at: DateTime<Utc>,
}

/// A registered participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// May post jobs.
    pub is_client: bool,
    /// May apply for jobs.
    pub is_freelancer: bool,
    /// Resume, kept for freelancers only.
    pub resume: Option<String>,
    /// Running average rating, 0 (unrated) to 5.
    pub rating: u8,
    /// Jobs completed as the assigned freelancer.
    pub completed_jobs: u64,
    /// When the profile was registered.
    pub created_at: DateTime<Utc>,
}

impl UserProfile {
    /// Creates a profile with the given roles.
    ///
    /// The resume is discarded unless the profile is a freelancer.
    pub fn new(is_client: bool, is_freelancer: bool, resume: Option<String>) -> Result<Self, MarketError> {
        if !is_client && !is_freelancer {
            return Err(MarketError::InvalidRole);
        }
        Ok(Self {
            is_client,
            is_freelancer,
            resume: resume.filter(|_| is_freelancer),
            rating: 0,
            completed_jobs: 0,
            created_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn principal(id: &str) -> PrincipalId {
        PrincipalId::new(id).expect("principal")
    }

    fn open_job() -> Job {
        Job::new(
            JobId::FIRST,
            principal("client"),
            "Logo".to_string(),
            "Design a logo".to_string(),
            Amount::new(1000),
        )
    }

    #[test_case(JobStatus::Open, JobStatus::Assigned ; "assign")]
    #[test_case(JobStatus::Open, JobStatus::Cancelled ; "cancel")]
    #[test_case(JobStatus::Assigned, JobStatus::Completed ; "complete")]
    #[test_case(JobStatus::Assigned, JobStatus::Disputed ; "dispute assigned")]
    #[test_case(JobStatus::Completed, JobStatus::Disputed ; "dispute completed")]
    fn valid_transitions(from: JobStatus, to: JobStatus) {
        assert!(from.can_transition_to(&to));
    }

    #[test_case(JobStatus::Open, JobStatus::Completed ; "complete unassigned")]
    #[test_case(JobStatus::Open, JobStatus::Disputed ; "dispute unassigned")]
    #[test_case(JobStatus::Assigned, JobStatus::Cancelled ; "cancel assigned")]
    #[test_case(JobStatus::Assigned, JobStatus::Open ; "unassign")]
    #[test_case(JobStatus::Completed, JobStatus::Assigned ; "reopen completed")]
    #[test_case(JobStatus::Completed, JobStatus::Cancelled ; "cancel completed")]
    #[test_case(JobStatus::Cancelled, JobStatus::Open ; "revive cancelled")]
    #[test_case(JobStatus::Disputed, JobStatus::Completed ; "leave dispute")]
    #[test_case(JobStatus::Open, JobStatus::Open ; "self loop")]
    fn invalid_transitions(from: JobStatus, to: JobStatus) {
        assert!(!from.can_transition_to(&to));
    }

    #[test]
    fn terminal_statuses() {
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(JobStatus::Disputed.is_terminal());
        assert!(!JobStatus::Completed.is_terminal());
        assert!(!JobStatus::Open.is_terminal());
    }

    #[test]
    fn new_job_is_open_and_unassigned() {
        let job = open_job();
        assert_eq!(job.status, JobStatus::Open);
        assert!(job.freelancer.is_none());
        assert!(job.completed_at.is_none());
        assert!(!job.funds_released);
    }

    #[test]
    fn role_of_resolves_parties() {
        let mut job = open_job();
        assert_eq!(job.role_of(&principal("client")), Some(JobRole::Client));
        assert_eq!(job.role_of(&principal("dev")), None);

        job.freelancer = Some(principal("dev"));
        assert_eq!(job.role_of(&principal("dev")), Some(JobRole::Freelancer));
        assert_eq!(job.role_of(&principal("stranger")), None);
    }

    #[test]
    fn transition_reports_current_status() {
        let mut job = open_job();
        let err = job.transition_to(JobStatus::Completed, "complete").unwrap_err();
        assert_eq!(
            err,
            MarketError::InvalidState {
                job_id: JobId::FIRST,
                status: JobStatus::Open,
                action: "complete",
            }
        );
        assert_eq!(job.status, JobStatus::Open);

        job.transition_to(JobStatus::Assigned, "assign").expect("assign");
        assert_eq!(job.status, JobStatus::Assigned);
    }

    #[test]
    fn require_client_rejects_others() {
        let job = open_job();
        assert!(job.require_client(&principal("client"), "edit").is_ok());
        assert!(matches!(
            job.require_client(&principal("dev"), "edit"),
            Err(MarketError::Unauthorized { action: "edit", .. })
        ));
    }

    #[test]
    fn profile_requires_a_role() {
        assert_eq!(UserProfile::new(false, false, None), Err(MarketError::InvalidRole));
    }

    #[test]
    fn profile_keeps_resume_for_freelancers_only() {
        let client = UserProfile::new(true, false, Some("cv".to_string())).expect("client");
        assert!(client.resume.is_none());

        let freelancer = UserProfile::new(false, true, Some("cv".to_string())).expect("freelancer");
        assert_eq!(freelancer.resume.as_deref(), Some("cv"));
        assert_eq!(freelancer.rating, 0);
        assert_eq!(freelancer.completed_jobs, 0);
    }

    #[test]
    fn status_serialization() {
        let json = serde_json::to_string(&JobStatus::Assigned).expect("serialize");
        let back: JobStatus = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, JobStatus::Assigned);
    }
}
