//! Record storage and lookup indices.
//!
//! Holds profiles, jobs and applications, plus the indices that answer
//! "which jobs did this principal post / get assigned" and "has this
//! freelancer already applied" without scanning.

use std::collections::{BTreeMap, HashMap, HashSet};

use gig_core::{JobId, PrincipalId};

use crate::error::MarketError;
use crate::lifecycle::{Application, Job, UserProfile};

/// Profiles, jobs, applications and their indices.
#[derive(Debug, Clone)]
pub struct Registry {
    users: HashMap<PrincipalId, UserProfile>,
    jobs: BTreeMap<JobId, Job>,
    applications: HashMap<JobId, Vec<Application>>,
    applicants: HashMap<JobId, HashSet<PrincipalId>>,
    client_jobs: HashMap<PrincipalId, Vec<JobId>>,
    freelancer_jobs: HashMap<PrincipalId, Vec<JobId>>,
    next_job_id: Option<JobId>,
    total_users: u64,
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            users: HashMap::new(),
            jobs: BTreeMap::new(),
            applications: HashMap::new(),
            applicants: HashMap::new(),
            client_jobs: HashMap::new(),
            freelancer_jobs: HashMap::new(),
            next_job_id: Some(JobId::FIRST),
            total_users: 0,
        }
    }
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    /// Stores a new profile and bumps the user counter.
    pub fn insert_user(&mut self, principal: PrincipalId, profile: UserProfile) -> Result<(), MarketError> {
        if self.users.contains_key(&principal) {
            return Err(MarketError::AlreadyRegistered(principal));
        }
        self.users.insert(principal, profile);
        self.total_users += 1;
        Ok(())
    }

    /// Returns a profile.
    #[must_use]
    pub fn user(&self, principal: &PrincipalId) -> Option<&UserProfile> {
        self.users.get(principal)
    }

    /// Returns a mutable profile.
    pub fn user_mut(&mut self, principal: &PrincipalId) -> Option<&mut UserProfile> {
        self.users.get_mut(principal)
    }

    /// Number of registered profiles.
    #[must_use]
    pub const fn total_users(&self) -> u64 {
        self.total_users
    }

    // ------------------------------------------------------------------
    // Jobs
    // ------------------------------------------------------------------

    /// Returns the id the next job will get, without consuming it.
    pub fn peek_job_id(&self) -> Result<JobId, MarketError> {
        self.next_job_id
            .ok_or_else(|| MarketError::InvalidInput("job id space exhausted".into()))
    }

    /// Stores a job under the next id and indexes it under its client.
    ///
    /// The job's own id must be the one returned by [`Self::peek_job_id`].
    pub fn insert_job(&mut self, job: Job) -> Result<JobId, MarketError> {
        let id = self.peek_job_id()?;
        if job.id != id {
            return Err(MarketError::InvalidInput(format!(
                "job id {} does not match next id {id}",
                job.id
            )));
        }
        self.client_jobs.entry(job.client.clone()).or_default().push(id);
        self.jobs.insert(id, job);
        self.next_job_id = id.next();
        Ok(id)
    }

    /// Returns a job.
    pub fn job(&self, job_id: JobId) -> Result<&Job, MarketError> {
        self.jobs.get(&job_id).ok_or(MarketError::JobNotFound(job_id))
    }

    /// Returns a mutable job.
    pub fn job_mut(&mut self, job_id: JobId) -> Result<&mut Job, MarketError> {
        self.jobs.get_mut(&job_id).ok_or(MarketError::JobNotFound(job_id))
    }

    /// Iterates over all jobs in id order.
    pub fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.jobs.values()
    }

    /// Number of jobs ever created.
    #[must_use]
    pub fn total_jobs(&self) -> u64 {
        self.jobs.len() as u64
    }

    // ------------------------------------------------------------------
    // Applications
    // ------------------------------------------------------------------

    /// Returns true if `freelancer` already applied to the job.
    #[must_use]
    pub fn has_applied(&self, job_id: JobId, freelancer: &PrincipalId) -> bool {
        self.applicants
            .get(&job_id)
            .is_some_and(|set| set.contains(freelancer))
    }

    /// Appends an application and marks the applicant. Returns its index.
    pub fn push_application(&mut self, job_id: JobId, application: Application) -> Result<usize, MarketError> {
        if !self.applicants.entry(job_id).or_default().insert(application.freelancer.clone()) {
            return Err(MarketError::AlreadyApplied {
                job_id,
                freelancer: application.freelancer,
            });
        }
        let list = self.applications.entry(job_id).or_default();
        list.push(application);
        Ok(list.len() - 1)
    }

    /// Applications for a job in submission order.
    #[must_use]
    pub fn applications(&self, job_id: JobId) -> &[Application] {
        self.applications.get(&job_id).map_or(&[], Vec::as_slice)
    }

    /// Returns one application by index.
    pub fn application(&self, job_id: JobId, index: usize) -> Result<&Application, MarketError> {
        self.applications(job_id)
            .get(index)
            .ok_or(MarketError::ApplicationNotFound { job_id, index })
    }

    // ------------------------------------------------------------------
    // Indices
    // ------------------------------------------------------------------

    /// Records that `freelancer` was assigned the job.
    pub fn index_assignment(&mut self, job_id: JobId, freelancer: &PrincipalId) {
        self.freelancer_jobs
            .entry(freelancer.clone())
            .or_default()
            .push(job_id);
    }

    /// Jobs posted by a client, in creation order.
    #[must_use]
    pub fn client_jobs(&self, client: &PrincipalId) -> &[JobId] {
        self.client_jobs.get(client).map_or(&[], Vec::as_slice)
    }

    /// Jobs assigned to a freelancer, in assignment order.
    #[must_use]
    pub fn freelancer_jobs(&self, freelancer: &PrincipalId) -> &[JobId] {
        self.freelancer_jobs.get(freelancer).map_or(&[], Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use gig_core::Amount;

    fn principal(id: &str) -> PrincipalId {
        PrincipalId::new(id).expect("principal")
    }

    fn job_for(registry: &Registry, client: &str) -> Job {
        Job::new(
            registry.peek_job_id().expect("id"),
            principal(client),
            "title".to_string(),
            "description".to_string(),
            Amount::new(100),
        )
    }

    fn application(freelancer: &str, bid: u64) -> Application {
        Application {
            freelancer: principal(freelancer),
            resume: None,
            bid: Amount::new(bid),
            submitted_at: Utc::now(),
        }
    }

    #[test]
    fn users_are_unique_and_counted() {
        let mut registry = Registry::new();
        let profile = UserProfile::new(true, false, None).expect("profile");
        registry.insert_user(principal("alice"), profile.clone()).expect("insert");
        assert_eq!(registry.total_users(), 1);

        let err = registry.insert_user(principal("alice"), profile).unwrap_err();
        assert_eq!(err, MarketError::AlreadyRegistered(principal("alice")));
        assert_eq!(registry.total_users(), 1);
    }

    #[test]
    fn job_ids_start_at_one_and_increase() {
        let mut registry = Registry::new();
        let first = registry.insert_job(job_for(&registry, "alice")).expect("insert");
        let second = registry.insert_job(job_for(&registry, "bob")).expect("insert");
        assert_eq!(first.get(), 1);
        assert_eq!(second.get(), 2);
        assert_eq!(registry.total_jobs(), 2);
        assert_eq!(registry.client_jobs(&principal("alice")), &[first]);
        assert_eq!(registry.client_jobs(&principal("bob")), &[second]);
    }

    #[test]
    fn insert_rejects_out_of_sequence_id() {
        let mut registry = Registry::new();
        let mut job = job_for(&registry, "alice");
        job.id = JobId::new(5).expect("id");
        assert!(registry.insert_job(job).is_err());
        assert_eq!(registry.total_jobs(), 0);
    }

    #[test]
    fn missing_job_is_not_found() {
        let registry = Registry::new();
        let id = JobId::new(3).expect("id");
        assert_eq!(registry.job(id).unwrap_err(), MarketError::JobNotFound(id));
    }

    #[test]
    fn applications_are_deduplicated() {
        let mut registry = Registry::new();
        let id = registry.insert_job(job_for(&registry, "alice")).expect("insert");

        assert_eq!(registry.push_application(id, application("dev", 80)).expect("apply"), 0);
        assert_eq!(registry.push_application(id, application("ops", 90)).expect("apply"), 1);
        assert!(registry.has_applied(id, &principal("dev")));

        let err = registry.push_application(id, application("dev", 70)).unwrap_err();
        assert!(matches!(err, MarketError::AlreadyApplied { .. }));
        assert_eq!(registry.applications(id).len(), 2);
        assert_eq!(registry.application(id, 0).expect("app").bid, Amount::new(80));
    }

    #[test]
    fn application_index_out_of_range() {
        let mut registry = Registry::new();
        let id = registry.insert_job(job_for(&registry, "alice")).expect("insert");
        assert_eq!(
            registry.application(id, 0).unwrap_err(),
            MarketError::ApplicationNotFound { job_id: id, index: 0 }
        );
    }

    #[test]
    fn assignment_index_is_append_only() {
        let mut registry = Registry::new();
        let a = registry.insert_job(job_for(&registry, "alice")).expect("insert");
        let b = registry.insert_job(job_for(&registry, "alice")).expect("insert");
        registry.index_assignment(b, &principal("dev"));
        registry.index_assignment(a, &principal("dev"));
        assert_eq!(registry.freelancer_jobs(&principal("dev")), &[b, a]);
        assert!(registry.freelancer_jobs(&principal("nobody")).is_empty());
    }
}
