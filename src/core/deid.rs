//! De-identification export gate
//!
//! The export gear is fire-and-forget: submission returns before the export
//! finishes, so completion is detected on a later run by comparing the
//! acquisition labels of each pre-deid session with its counterpart in the
//! de-identified project. Sessions found complete are tagged `deid` and never
//! looked at again.

use crate::adapters::platform::{FileRef, JobRequest, StoragePlatform, TagTarget};
use crate::config::DeidConfig;
use crate::core::sync::SyncContext;
use crate::domain::errors::{PlatformError, WbhiError};
use crate::domain::ids::ContainerId;
use crate::domain::session::{Project, Session};
use crate::domain::tags;
use crate::domain::Result;
use crate::log_retry_attempt;
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

/// Bounded retry for job submission
///
/// Only transient platform errors are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitPolicy {
    pub attempts: usize,
    pub delay: Duration,
}

impl SubmitPolicy {
    pub fn from_config(config: &DeidConfig) -> Self {
        Self {
            attempts: config.submit_attempts.max(1),
            delay: Duration::from_millis(config.submit_delay_ms),
        }
    }

    pub async fn submit(&self, platform: &dyn StoragePlatform, request: &JobRequest) -> SubmitOutcome {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match platform.submit_job(request).await {
                Ok(job_id) => {
                    tracing::debug!(job_id = %job_id, attempt, "Submitted job");
                    return SubmitOutcome::Submitted {
                        job_id,
                        attempts: attempt,
                    };
                }
                Err(e) => {
                    let transient = matches!(&e, WbhiError::Platform(p) if p.is_transient());
                    if !transient || attempt >= self.attempts {
                        return SubmitOutcome::GaveUp {
                            attempts: attempt,
                            last_error: e.to_string(),
                        };
                    }
                    log_retry_attempt!(attempt, self.attempts, e);
                    tokio::time::sleep(self.delay).await;
                }
            }
        }
    }
}

/// Result of a job submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Submitted { job_id: String, attempts: usize },
    GaveUp { attempts: usize, last_error: String },
}

/// What the gate decided for one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeidDecision {
    /// Tagged `deid` on an earlier run
    AlreadyTagged,
    /// Same acquisition labels already in the de-identified project
    AlreadyExported,
    /// Export needed
    Export,
}

/// Counts for one pass over the pre-deid project
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeidReport {
    pub checked: usize,
    pub already_tagged: usize,
    pub newly_tagged: usize,
    pub submitted: usize,
    pub gave_up: Vec<ContainerId>,
}

/// Idempotent export pass over the pre-deid project
pub struct DeidGate<'a> {
    ctx: &'a SyncContext,
    policy: SubmitPolicy,
}

impl<'a> DeidGate<'a> {
    pub fn new(ctx: &'a SyncContext) -> Self {
        Self {
            ctx,
            policy: SubmitPolicy::from_config(&ctx.config.deid),
        }
    }

    /// Runs the pass
    ///
    /// # Errors
    ///
    /// Fails when the pre-deid project, the profile file's project or the
    /// export gear cannot be found. Submission failures are counted, not
    /// returned.
    pub async fn run(&self) -> Result<DeidReport> {
        let config = &self.ctx.config.deid;
        let platform = self.ctx.platform.as_ref();
        let pre_deid = require_project(platform, &config.pre_deid_project).await?;
        let deid = platform.lookup_project(&config.deid_project).await?;
        if deid.is_none() {
            tracing::warn!(project = %config.deid_project, "De-identified project not found");
        }
        let gear = platform
            .lookup_gear(&config.gear_path)
            .await?
            .ok_or_else(|| PlatformError::NotFound(format!("gear {}", config.gear_path)))?;

        let mut report = DeidReport::default();
        for session in platform.list_sessions(&pre_deid.id).await? {
            report.checked += 1;
            match self.inspect(&session, deid.as_ref()).await? {
                DeidDecision::AlreadyTagged => report.already_tagged += 1,
                DeidDecision::AlreadyExported => {
                    self.mark_exported(&session).await?;
                    report.newly_tagged += 1;
                }
                DeidDecision::Export => {
                    if self.ctx.dry_run {
                        tracing::info!(session_id = %session.id, "[dry-run] Would submit export");
                        continue;
                    }
                    let request = self.job_request(&gear, &pre_deid, &session);
                    match self.policy.submit(platform, &request).await {
                        SubmitOutcome::Submitted { job_id, .. } => {
                            tracing::info!(session_id = %session.id, job_id = %job_id, "Submitted de-identification export");
                            report.submitted += 1;
                        }
                        SubmitOutcome::GaveUp {
                            attempts,
                            last_error,
                        } => {
                            tracing::error!(
                                session_id = %session.id,
                                attempts,
                                error = %last_error,
                                "Gave up submitting de-identification export"
                            );
                            report.gave_up.push(session.id.clone());
                        }
                    }
                }
            }
        }

        tracing::info!(
            checked = report.checked,
            already_tagged = report.already_tagged,
            newly_tagged = report.newly_tagged,
            submitted = report.submitted,
            gave_up = report.gave_up.len(),
            "De-identification pass finished"
        );
        Ok(report)
    }

    /// Decides whether `session` still needs exporting
    pub async fn inspect(&self, session: &Session, deid: Option<&Project>) -> Result<DeidDecision> {
        if session.has_tag(tags::DEID) {
            return Ok(DeidDecision::AlreadyTagged);
        }
        let Some(deid) = deid else {
            return Ok(DeidDecision::Export);
        };

        let platform = self.ctx.platform.as_ref();
        let subject = platform.get_subject(&session.subject).await?;
        let Some(dst_subject) = platform.find_subject(&deid.id, &subject.label).await? else {
            return Ok(DeidDecision::Export);
        };
        let Some(dst_session) = platform.find_session(&dst_subject.id, &session.label).await? else {
            return Ok(DeidDecision::Export);
        };

        let source = acquisition_labels(platform, &session.id).await?;
        let exported = acquisition_labels(platform, &dst_session.id).await?;
        if source == exported {
            Ok(DeidDecision::AlreadyExported)
        } else {
            Ok(DeidDecision::Export)
        }
    }

    async fn mark_exported(&self, session: &Session) -> Result<()> {
        if self.ctx.dry_run {
            tracing::info!(session_id = %session.id, "[dry-run] Would tag session deid");
            return Ok(());
        }
        self.ctx
            .platform
            .add_tag(&TagTarget::Session(session.id.clone()), tags::DEID)
            .await
    }

    fn job_request(&self, gear: &ContainerId, pre_deid: &Project, session: &Session) -> JobRequest {
        let config = &self.ctx.config.deid;
        let mut inputs = BTreeMap::new();
        inputs.insert(
            "deid_profile".to_string(),
            FileRef {
                container_type: "project".to_string(),
                container_id: pre_deid.id.clone(),
                name: config.profile_file.clone(),
            },
        );
        JobRequest {
            gear_id: gear.clone(),
            destination: session.id.clone(),
            inputs,
            config: json!({
                "project_path": config.deid_project,
                "overwrite_files": "Skip",
                "debug": false,
            }),
        }
    }
}

async fn acquisition_labels(
    platform: &dyn StoragePlatform,
    session: &ContainerId,
) -> Result<BTreeSet<String>> {
    Ok(platform
        .list_acquisitions(session)
        .await?
        .into_iter()
        .map(|a| a.label)
        .collect())
}

async fn require_project(platform: &dyn StoragePlatform, path: &str) -> Result<Project> {
    platform
        .lookup_project(path)
        .await?
        .ok_or_else(|| PlatformError::NotFound(format!("project {path}")).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::platform::MemoryPlatform;
    use crate::adapters::registry::MemoryRegistry;
    use crate::core::test_support::context;
    use std::sync::Arc;

    struct Fixture {
        platform: Arc<MemoryPlatform>,
        registry: Arc<MemoryRegistry>,
        pre_deid: ContainerId,
        deid: ContainerId,
    }

    fn fixture() -> Fixture {
        let platform = Arc::new(MemoryPlatform::new());
        let registry = Arc::new(MemoryRegistry::new(Vec::new()));
        let pre_deid = platform.add_project("wbhi", "pre-deid");
        let deid = platform.add_project("wbhi", "deid");
        platform.add_gear("gears/deid-export");
        Fixture {
            platform,
            registry,
            pre_deid,
            deid,
        }
    }

    fn session_with(platform: &MemoryPlatform, project: &ContainerId, acqs: &[&str], tags: &[&str]) -> ContainerId {
        let subject = platform.add_subject(project, "UAB12CD");
        let session = platform.add_session(&subject, "ses01", None, tags);
        for label in acqs {
            platform.add_acquisition(&session, label, None, Vec::new());
        }
        session
    }

    #[tokio::test]
    async fn test_equal_label_sets_are_not_resubmitted() {
        let fx = fixture();
        let ctx = context(&fx.platform, &fx.registry);
        let session = session_with(&fx.platform, &fx.pre_deid, &["T1w", "BOLD"], &[]);
        session_with(&fx.platform, &fx.deid, &["BOLD", "T1w"], &[]);

        let report = DeidGate::new(&ctx).run().await.unwrap();

        assert_eq!(report.newly_tagged, 1);
        assert_eq!(report.submitted, 0);
        assert!(fx.platform.submitted_jobs().is_empty());
        assert!(fx.platform.session(&session).unwrap().has_tag("deid"));
    }

    #[tokio::test]
    async fn test_partial_export_is_submitted() {
        let fx = fixture();
        let ctx = context(&fx.platform, &fx.registry);
        let session = session_with(&fx.platform, &fx.pre_deid, &["T1w", "BOLD"], &[]);
        session_with(&fx.platform, &fx.deid, &["T1w"], &[]);

        let report = DeidGate::new(&ctx).run().await.unwrap();

        assert_eq!(report.submitted, 1);
        let jobs = fx.platform.submitted_jobs();
        assert_eq!(jobs[0].destination, session);
        assert_eq!(jobs[0].inputs["deid_profile"].name, "deid_profile.yaml");
        assert_eq!(jobs[0].config["project_path"], "wbhi/deid");
        assert_eq!(jobs[0].config["overwrite_files"], "Skip");
    }

    #[tokio::test]
    async fn test_tagged_sessions_are_skipped() {
        let fx = fixture();
        let ctx = context(&fx.platform, &fx.registry);
        session_with(&fx.platform, &fx.pre_deid, &["T1w"], &["deid"]);

        let report = DeidGate::new(&ctx).run().await.unwrap();

        assert_eq!(report.already_tagged, 1);
        assert_eq!(fx.platform.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let fx = fixture();
        let ctx = context(&fx.platform, &fx.registry);
        session_with(&fx.platform, &fx.pre_deid, &["T1w"], &[]);
        fx.platform.fail_next_submissions(2);

        let report = DeidGate::new(&ctx).run().await.unwrap();

        assert_eq!(report.submitted, 1);
        assert!(report.gave_up.is_empty());
    }

    #[tokio::test]
    async fn test_gives_up_after_attempts() {
        let fx = fixture();
        let ctx = context(&fx.platform, &fx.registry);
        let session = session_with(&fx.platform, &fx.pre_deid, &["T1w"], &[]);
        fx.platform.fail_next_submissions(3);

        let report = DeidGate::new(&ctx).run().await.unwrap();

        assert_eq!(report.submitted, 0);
        assert_eq!(report.gave_up, vec![session]);
    }

    #[tokio::test]
    async fn test_missing_gear_is_an_error() {
        let platform = Arc::new(MemoryPlatform::new());
        let registry = Arc::new(MemoryRegistry::new(Vec::new()));
        platform.add_project("wbhi", "pre-deid");
        let ctx = context(&platform, &registry);

        let err = DeidGate::new(&ctx).run().await.unwrap_err();
        assert!(matches!(err, WbhiError::Platform(PlatformError::NotFound(_))));
    }
}
