//! Synchronized copy between projects
//!
//! The platform's smart copy can only create a new project, so copying into
//! an existing one goes through a temporary project:
//!
//! 1. tag every requested acquisition `to_copy_<dst>`
//! 2. snapshot the destination with one view read
//! 3. rename source subjects that would merge with a different person
//! 4. smart-copy the tagged acquisitions into `<temp_group>/<dst group>_<dst label>`
//! 5. poll until the copy completes, fails or times out
//! 6. move the copied sessions into the destination
//! 7. verify the acquisitions arrived and mark them `copied_<dst>`
//! 8. delete the temporary project
//!
//! Every step checks what is already there, so a run that died half-way is
//! finished by the next one.

use crate::adapters::platform::{ConflictMode, ProjectCopyRequest, TagTarget};
use crate::core::copy::duplicates::DestinationIndex;
use crate::core::copy::report::{MissingItem, MoveFailure, SubjectRename, SyncReport};
use crate::core::sync::SyncContext;
use crate::domain::errors::{CopyJobError, PlatformError, WbhiError};
use crate::domain::ids::ContainerId;
use crate::domain::session::{Acquisition, CopyStatus, Project, Session, Subject};
use crate::domain::tags;
use crate::domain::Result;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::time::Instant;

/// Runs synchronized copies
pub struct CopyOrchestrator<'a> {
    ctx: &'a SyncContext,
}

impl<'a> CopyOrchestrator<'a> {
    pub fn new(ctx: &'a SyncContext) -> Self {
        Self { ctx }
    }

    /// Path of the temporary project used for copies into `destination`
    pub fn temp_project_label(destination: &Project) -> String {
        format!("{}_{}", destination.group, destination.label)
    }

    /// Copies `items` from `source` into `destination`
    ///
    /// # Errors
    ///
    /// Returns [`CopyJobError`] when the smart copy fails or does not finish
    /// in time; nothing is marked copied in that case. Platform errors on
    /// individual session moves are recorded in the report instead.
    pub async fn synchronize(
        &self,
        items: &[Acquisition],
        source: &Project,
        destination: &Project,
    ) -> Result<SyncReport> {
        let started = Instant::now();
        let to_copy_tag = tags::to_copy(&destination.label);
        let mut report = SyncReport::new(destination.path(), items.len());

        tracing::info!(
            source = %source.path(),
            destination = %destination.path(),
            acquisitions = items.len(),
            "Starting synchronized copy"
        );

        if items.is_empty() {
            return Ok(report);
        }

        for item in items.iter().filter(|a| !a.has_tag(&to_copy_tag)) {
            self.add_tag(&TagTarget::Acquisition(item.id.clone()), &to_copy_tag)
                .await?;
        }

        let mut index =
            DestinationIndex::from_rows(&self.ctx.platform.read_view(&destination.id).await?);
        let mut lookup = ParentLookup::default();
        self.rename_duplicate_subjects(items, &mut index, &mut lookup, &mut report)
            .await?;

        if self.ctx.dry_run {
            tracing::info!(
                destination = %destination.path(),
                acquisitions = items.len(),
                "[dry-run] Would smart-copy acquisitions"
            );
            return Ok(report);
        }

        let temp = self.start_copy(source, destination, &to_copy_tag).await?;
        self.wait_for_copy(&temp).await?;
        self.move_sessions(&temp, destination, &mut report).await?;
        self.verify(items, destination, &mut lookup, &mut report)
            .await?;
        self.ctx.platform.delete_project(&temp.id).await?;
        tracing::debug!(project = %temp.path(), "Deleted temporary project");

        report.set_duration(started.elapsed().as_millis() as u64);
        report.log();
        Ok(report)
    }

    async fn rename_duplicate_subjects(
        &self,
        items: &[Acquisition],
        index: &mut DestinationIndex,
        lookup: &mut ParentLookup,
        report: &mut SyncReport,
    ) -> Result<()> {
        let mut renamed: HashSet<ContainerId> = HashSet::new();

        // Any item of a subject can collide, so every item is checked and
        // each subject is renamed at most once.
        for item in items {
            let session = lookup.session(self.ctx, &item.session).await?;
            let subject = lookup.subject(self.ctx, &session.subject).await?;
            if renamed.contains(&subject.id) {
                continue;
            }
            if !index.has_subject(&subject.label)
                || !index.has_conflicting_session(&subject.label, &session.label, session.date())
            {
                continue;
            }

            let new_label = index.next_duplicate_label(&subject.label);
            tracing::info!(
                subject_id = %subject.id,
                from = %subject.label,
                to = %new_label,
                "Renaming subject that collides with a different destination subject"
            );
            if !self.ctx.dry_run {
                self.ctx
                    .platform
                    .rename_subject(&subject.id, &new_label)
                    .await?;
            }
            index.reserve_subject(&new_label);
            report.record_rename(SubjectRename {
                subject: subject.id.clone(),
                from: subject.label.clone(),
                to: new_label.clone(),
            });
            lookup.relabel_subject(&subject.id, &new_label);
            renamed.insert(subject.id.clone());
        }
        Ok(())
    }

    async fn start_copy(
        &self,
        source: &Project,
        destination: &Project,
        include_tag: &str,
    ) -> Result<Project> {
        let group = &self.ctx.config.copy.temp_group;
        let label = Self::temp_project_label(destination);

        if let Some(stale) = self
            .ctx
            .platform
            .lookup_project(&format!("{group}/{label}"))
            .await?
        {
            tracing::info!(project = %stale.path(), "Deleting leftover temporary project");
            self.ctx.platform.delete_project(&stale.id).await?;
        }

        let request = ProjectCopyRequest {
            group: group.clone(),
            label,
            include_tag: include_tag.to_string(),
        };
        let id = self
            .ctx
            .platform
            .start_project_copy(&source.id, &request)
            .await?;
        tracing::info!(
            project_id = %id,
            tag = %include_tag,
            "Smart copy submitted to {}/{}",
            request.group,
            request.label
        );
        self.ctx.platform.get_project(&id).await
    }

    async fn wait_for_copy(&self, temp: &Project) -> Result<()> {
        let poll = Duration::from_secs(self.ctx.config.copy.poll_interval_seconds);
        let timeout = Duration::from_secs(self.ctx.config.copy.wait_timeout_seconds);
        let started = Instant::now();
        let mut status = temp.copy_status;

        loop {
            match status {
                CopyStatus::Completed => return Ok(()),
                CopyStatus::Failed => {
                    return Err(CopyJobError::Failed {
                        project: temp.path(),
                    }
                    .into())
                }
                CopyStatus::InProgress | CopyStatus::None => {}
            }
            if started.elapsed() >= timeout {
                return Err(CopyJobError::TimedOut {
                    project: temp.path(),
                    waited_secs: timeout.as_secs(),
                }
                .into());
            }
            tracing::debug!(project = %temp.path(), "Smart copy still running");
            tokio::time::sleep(poll).await;
            status = self.ctx.platform.get_project(&temp.id).await?.copy_status;
        }
    }

    async fn move_sessions(
        &self,
        temp: &Project,
        destination: &Project,
        report: &mut SyncReport,
    ) -> Result<()> {
        for session in self.ctx.platform.list_sessions(&temp.id).await? {
            if self
                .ctx
                .platform
                .list_acquisitions(&session.id)
                .await?
                .is_empty()
            {
                continue;
            }
            if let Err(e) = self.move_session(&session, destination).await {
                let path = format!("{}/{}", temp.path(), session.label);
                tracing::error!(
                    session_id = %session.id,
                    path = %path,
                    destination = %destination.path(),
                    error = %e,
                    "Failed to move session"
                );
                report.record_move_failure(MoveFailure {
                    session: session.id.clone(),
                    path,
                    reason: e.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Moves one session, merging into an existing destination subject on conflict
    pub async fn move_session(&self, session: &Session, destination: &Project) -> Result<()> {
        match self
            .ctx
            .platform
            .move_session(&session.id, &destination.id)
            .await
        {
            Ok(()) => Ok(()),
            Err(WbhiError::Platform(PlatformError::Conflict(reason))) => {
                let subject = self.ctx.platform.get_subject(&session.subject).await?;
                let existing = self
                    .ctx
                    .platform
                    .find_subject(&destination.id, &subject.label)
                    .await?
                    .ok_or_else(|| {
                        PlatformError::Conflict(format!(
                            "{reason}; subject {} not found in {}",
                            subject.label,
                            destination.path()
                        ))
                    })?;
                tracing::info!(
                    session_id = %session.id,
                    subject = %subject.label,
                    "Subject exists in destination, merging with skip on conflict"
                );
                self.ctx
                    .platform
                    .bulk_move_sessions(
                        std::slice::from_ref(&session.id),
                        &existing.id,
                        ConflictMode::Skip,
                    )
                    .await
            }
            Err(e) => Err(e),
        }
    }

    async fn verify(
        &self,
        items: &[Acquisition],
        destination: &Project,
        lookup: &mut ParentLookup,
        report: &mut SyncReport,
    ) -> Result<()> {
        let index =
            DestinationIndex::from_rows(&self.ctx.platform.read_view(&destination.id).await?);
        let to_copy_tag = tags::to_copy(&destination.label);
        let copied_tag = tags::copied(&destination.label);

        for item in items {
            let session = lookup.session(self.ctx, &item.session).await?;
            let subject = lookup.subject(self.ctx, &session.subject).await?;

            if !index.contains_acquisition(&subject.label, &session.label, &item.label) {
                report.record_missing(MissingItem {
                    acquisition: item.id.clone(),
                    path: format!("{}/{}/{}", subject.label, session.label, item.label),
                });
                continue;
            }

            let acquisition = TagTarget::Acquisition(item.id.clone());
            self.ctx.platform.delete_tag(&acquisition, &to_copy_tag).await?;
            self.ctx.platform.add_tag(&acquisition, &copied_tag).await?;
            self.ctx
                .platform
                .add_tag(&TagTarget::Session(session.id.clone()), &copied_tag)
                .await?;
            report.record_verified();
        }
        Ok(())
    }

    async fn add_tag(&self, target: &TagTarget, tag: &str) -> Result<()> {
        if self.ctx.dry_run {
            tracing::info!(target = %target, tag = %tag, "[dry-run] Would add tag");
            return Ok(());
        }
        self.ctx.platform.add_tag(target, tag).await
    }
}

/// Memoised parent lookups for the items of one copy
#[derive(Default)]
struct ParentLookup {
    sessions: HashMap<ContainerId, Session>,
    subjects: HashMap<ContainerId, Subject>,
}

impl ParentLookup {
    async fn session(&mut self, ctx: &SyncContext, id: &ContainerId) -> Result<Session> {
        if let Some(session) = self.sessions.get(id) {
            return Ok(session.clone());
        }
        let session = ctx.platform.get_session(id).await?;
        self.sessions.insert(id.clone(), session.clone());
        Ok(session)
    }

    async fn subject(&mut self, ctx: &SyncContext, id: &ContainerId) -> Result<Subject> {
        if let Some(subject) = self.subjects.get(id) {
            return Ok(subject.clone());
        }
        let subject = ctx.platform.get_subject(id).await?;
        self.subjects.insert(id.clone(), subject.clone());
        Ok(subject)
    }

    fn relabel_subject(&mut self, id: &ContainerId, label: &str) {
        if let Some(subject) = self.subjects.get_mut(id) {
            subject.label = label.to_string();
        }
    }
}
