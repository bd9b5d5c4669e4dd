//! Sync coordinator - main driver of a run
//!
//! Per site the coordinator runs the PI-routed copy pass and then the
//! registry match-and-move pass; the de-identification pass runs once after
//! all sites. A failure in one site's pass is recorded and the next pass or
//! site goes ahead.

use crate::config::SiteConfig;
use crate::core::copy::CopyOrchestrator;
use crate::core::deid::DeidGate;
use crate::core::header::HeaderExtractor;
use crate::core::identity::{IdentityGenerator, PendingAssignments, WorkingIdSet};
use crate::core::matching::{MatchEngine, RegistrySnapshot};
use crate::core::state::{eligibility, Eligibility, RetryScheduler, SessionState};
use crate::core::sync::context::SyncContext;
use crate::core::sync::summary::{RunError, RunErrorType, RunSummary, Severity};
use crate::domain::errors::{PlatformError, RegistryError, WbhiError};
use crate::domain::ids::{SiteId, WbhiId};
use crate::domain::session::{first_acquisition, Acquisition, Project, Session};
use crate::domain::tags;
use crate::domain::Result;
use crate::{log_error_with_context, log_session_skipped};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeMap;
use std::time::Instant;
use tokio::sync::watch;
use tracing::Instrument;

/// Project label used for acquisitions whose PI token is not alphanumeric
pub const OTHER_PI_PROJECT: &str = "other";

/// What a `sync` run covers
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Sites to process; empty means every configured site
    pub sites: Vec<SiteId>,
    /// Skip the de-identification pass
    pub skip_deid: bool,
}

/// One row of a manual-match file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManualMatchRow {
    pub site: SiteId,
    pub participant_id: String,
    pub subject_label: String,
}

impl ManualMatchRow {
    /// Parses `site,participant_id,subject_label`
    ///
    /// The subject label is the rest of the line and may contain commas.
    pub fn parse(line: &str) -> std::result::Result<Self, String> {
        let mut parts = line.splitn(3, ',').map(str::trim);
        let (Some(site), Some(participant_id), Some(subject_label)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(format!("expected site,participant_id,subject_label in '{line}'"));
        };
        if participant_id.is_empty() || subject_label.is_empty() {
            return Err(format!("empty participant or subject in '{line}'"));
        }
        Ok(Self {
            site: SiteId::new(site)?,
            participant_id: participant_id.to_string(),
            subject_label: subject_label.to_string(),
        })
    }
}

/// Matching state of one inbound session, for `status`
#[derive(Debug, Clone)]
pub struct SessionStatus {
    pub site: SiteId,
    pub subject: String,
    pub session: String,
    pub state: SessionState,
    pub eligibility: Eligibility,
}

/// Project an acquisition with PI token `token` is copied into
pub fn pi_project_label(token: &str) -> String {
    if !token.is_empty() && token.chars().all(char::is_alphanumeric) {
        token.to_string()
    } else {
        OTHER_PI_PROJECT.to_string()
    }
}

/// Sync coordinator
pub struct SyncCoordinator {
    ctx: SyncContext,
    generator: IdentityGenerator,
    rng: StdRng,
    shutdown: Option<watch::Receiver<bool>>,
}

impl SyncCoordinator {
    pub fn new(ctx: SyncContext) -> Self {
        let generator = IdentityGenerator::new(ctx.config.matching.id_suffix_length);
        Self {
            ctx,
            generator,
            rng: StdRng::from_entropy(),
            shutdown: None,
        }
    }

    /// Stops between sites once `true` is sent on `signal`
    pub fn with_shutdown(mut self, signal: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(signal);
        self
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Makes identifier generation reproducible
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn context(&self) -> &SyncContext {
        &self.ctx
    }

    /// Runs the full sync
    ///
    /// # Errors
    ///
    /// Returns an error when the site filter names an unknown site or the
    /// registry export fails. Everything after that is recorded in the
    /// summary.
    pub async fn run(&mut self, options: &SyncOptions) -> Result<RunSummary> {
        let start_time = Instant::now();
        let mut summary = RunSummary::new();
        let sites = self.selected_sites(&options.sites)?;

        tracing::info!(
            run_id = %summary.run_id,
            sites = sites.len(),
            dry_run = self.ctx.dry_run,
            "Starting sync"
        );

        let mut snapshot = RegistrySnapshot::new(self.ctx.registry.export_records().await?);
        let mut working = WorkingIdSet::from_snapshot(&snapshot);
        tracing::info!(
            records = snapshot.len(),
            known_ids = working.len(),
            "Exported consent registry"
        );

        for site in &sites {
            if self.shutdown_requested() {
                tracing::warn!(site = %site.id, "Shutdown requested, stopping before site");
                summary.interrupted = true;
                break;
            }
            summary.sites += 1;
            let span = tracing::info_span!("site", site = %site.id);

            if let Err(e) = self
                .pi_copy(site, &mut summary)
                .instrument(span.clone())
                .await
            {
                log_error_with_context!(e, "PI copy pass failed");
                summary.add_error(
                    RunError::from_error(&e, Severity::Fatal)
                        .with_context(format!("site={}, pass=pi_copy", site.id)),
                );
            }

            if let Err(e) = self
                .match_and_move(site, &mut snapshot, &mut working, &mut summary)
                .instrument(span)
                .await
            {
                log_error_with_context!(e, "Registry match pass failed");
                summary.add_error(
                    RunError::from_error(&e, Severity::Fatal)
                        .with_context(format!("site={}, pass=match_and_move", site.id)),
                );
            }
        }

        if !options.skip_deid && !summary.interrupted {
            self.deid_pass(&mut summary).await;
        }

        summary = summary.with_duration(start_time.elapsed());
        summary.log_summary();
        Ok(summary)
    }

    /// Copies each site's new acquisitions into per-PI projects
    pub async fn pi_copy(&self, site: &SiteConfig, summary: &mut RunSummary) -> Result<()> {
        let platform = self.ctx.platform.as_ref();
        let inbound = self.require_project(&site.inbound_path()).await?;
        let extractor = HeaderExtractor::new(site)?;

        let mut batches: BTreeMap<String, Vec<Acquisition>> = BTreeMap::new();
        for session in platform.list_sessions(&inbound.id).await? {
            if tags::has_any_copied(&session.tags) {
                continue;
            }
            for acquisition in platform.list_acquisitions(&session.id).await? {
                let fields = match extractor.extract(&acquisition) {
                    Ok(fields) => fields,
                    Err(e) => {
                        tracing::debug!(
                            acquisition_id = %acquisition.id,
                            reason = e.code(),
                            "Acquisition not routable yet"
                        );
                        continue;
                    }
                };
                let pi = pi_project_label(&fields.pi_id);
                if acquisition.has_tag(&tags::copied(&pi)) {
                    continue;
                }
                batches.entry(pi).or_default().push(acquisition);
            }
        }

        if batches.is_empty() {
            tracing::info!("No acquisitions to copy");
            return Ok(());
        }

        let orchestrator = CopyOrchestrator::new(&self.ctx);
        for (pi, items) in batches {
            let path = format!("{}/{}", site.id, pi);
            let destination = match self.pi_project(site, &pi).await {
                Ok(Some(project)) => project,
                Ok(None) => continue,
                Err(e) => {
                    summary.add_error(
                        RunError::from_error(&e, Severity::Fatal).with_context(format!("project={path}")),
                    );
                    continue;
                }
            };

            match orchestrator.synchronize(&items, &inbound, &destination).await {
                Ok(report) => {
                    for failure in &report.move_failures {
                        summary.add_error(
                            RunError::new(RunErrorType::Platform, Severity::Partial, failure.reason.clone())
                                .with_context(format!("project={path}, session={}", failure.path)),
                        );
                    }
                    if !report.missing.is_empty() {
                        summary.add_error(
                            RunError::new(
                                RunErrorType::Platform,
                                Severity::Partial,
                                format!("{} acquisition(s) missing after copy", report.missing.len()),
                            )
                            .with_context(format!("project={path}")),
                        );
                    }
                    summary.add_copy(report);
                }
                Err(e) => {
                    tracing::error!(project = %path, error = %e, "Synchronized copy failed");
                    summary.add_error(
                        RunError::from_error(&e, Severity::Fatal).with_context(format!("project={path}")),
                    );
                }
            }
        }
        Ok(())
    }

    /// Looks up or creates `<site>/<pi>`; `None` in dry-run when it does not exist
    async fn pi_project(&self, site: &SiteConfig, pi: &str) -> Result<Option<Project>> {
        let path = format!("{}/{}", site.id, pi);
        if let Some(project) = self.ctx.platform.lookup_project(&path).await? {
            return Ok(Some(project));
        }
        if self.ctx.dry_run {
            tracing::info!(project = %path, "[dry-run] Would create PI project");
            return Ok(None);
        }
        tracing::info!(project = %path, "Creating PI project");
        self.ctx
            .platform
            .create_project(site.id.as_str(), pi)
            .await
            .map(Some)
    }

    /// Matches eligible inbound sessions against the registry and moves
    /// matched ones to the pre-deid project
    ///
    /// # Errors
    ///
    /// [`RegistryError::ImportCountMismatch`] when the registry acknowledges
    /// a different number of records than submitted; no session is touched
    /// in that case.
    pub async fn match_and_move(
        &mut self,
        site: &SiteConfig,
        snapshot: &mut RegistrySnapshot,
        working: &mut WorkingIdSet,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let ctx = &self.ctx;
        let platform = ctx.platform.as_ref();
        let inbound = self.require_project(&site.inbound_path()).await?;
        let pre_deid = self.require_project(&ctx.config.deid.pre_deid_project).await?;
        let extractor = HeaderExtractor::new(site)?;
        let engine = MatchEngine::new(ctx.sites().iter().map(|s| s.id.clone()));
        let scheduler = RetryScheduler::new(ctx);
        let orchestrator = CopyOrchestrator::new(ctx);

        let (resumable, candidates): (Vec<Session>, Vec<Session>) = platform
            .list_sessions(&inbound.id)
            .await?
            .into_iter()
            .partition(|s| s.has_tag(tags::MATCHED));

        for session in &resumable {
            tracing::info!(session_id = %session.id, "Resuming move of matched session");
            if ctx.dry_run {
                continue;
            }
            if let Err(e) = orchestrator.move_session(session, &pre_deid).await {
                summary.add_error(
                    RunError::from_error(&e, Severity::Partial)
                        .with_context(format!("session={}", session.id)),
                );
            }
        }

        let eligible = scheduler.select(candidates);
        if eligible.is_empty() {
            tracing::info!(project = %inbound.path(), "No sessions to check against the registry");
            return Ok(());
        }

        let mut pending = PendingAssignments::new();
        let mut matched: Vec<(Session, WbhiId)> = Vec::new();

        for session in eligible {
            summary.sessions_checked += 1;
            let acquisitions = platform.list_acquisitions(&session.id).await?;
            let Some(first) = first_acquisition(&acquisitions) else {
                log_session_skipped!(session.id, "NO_ACQUISITIONS");
                summary.extraction_skips += 1;
                continue;
            };
            let fields = match extractor.extract(first) {
                Ok(fields) => fields,
                Err(e) => {
                    log_session_skipped!(session.id, e.code());
                    summary.extraction_skips += 1;
                    continue;
                }
            };

            let indices = engine.find_matches(&fields, snapshot);
            if indices.is_empty() {
                match scheduler.record_failure(&session).await {
                    Ok(_) => summary.sessions_deferred += 1,
                    Err(e) => summary.add_error(
                        RunError::from_error(&e, Severity::Partial)
                            .with_context(format!("session={}", session.id)),
                    ),
                }
                continue;
            }

            let known = working.len();
            let id = self.generator.assign_for_batch(
                &indices,
                snapshot,
                &mut pending,
                site,
                working,
                &mut self.rng,
            );
            if working.len() > known {
                summary.ids_generated += 1;
            }
            tracing::info!(session_id = %session.id, wbhi_id = %id, records = indices.len(), "Session matched");
            matched.push((session, id));
        }

        if pending.is_empty() {
            tracing::info!("No registry matches found");
            return Ok(());
        }

        let records = pending.records_for_import(snapshot);
        if self.ctx.dry_run {
            tracing::info!(
                records = records.len(),
                sessions = matched.len(),
                "[dry-run] Would import records and move matched sessions"
            );
            summary.sessions_matched += matched.len();
            return Ok(());
        }

        let response = self.ctx.registry.import_records(&records).await?;
        if response.count != records.len() {
            return Err(RegistryError::ImportCountMismatch {
                submitted: records.len(),
                imported: response.count,
            }
            .into());
        }
        pending.commit(snapshot);
        tracing::info!(records = records.len(), "Imported identifiers into registry");

        for (session, id) in &matched {
            match self.finalize_match(session, id, &pre_deid).await {
                Ok(()) => summary.sessions_matched += 1,
                Err(e) => {
                    tracing::error!(session_id = %session.id, wbhi_id = %id, error = %e, "Failed to finalize match");
                    summary.add_error(
                        RunError::from_error(&e, Severity::Partial)
                            .with_context(format!("session={}, wbhi_id={id}", session.id)),
                    );
                }
            }
        }
        Ok(())
    }

    /// Renames the subject, marks the session matched and moves it
    ///
    /// The rename comes first so a run interrupted after tagging can resume
    /// with a plain move.
    async fn finalize_match(&self, session: &Session, id: &WbhiId, pre_deid: &Project) -> Result<()> {
        self.ctx
            .platform
            .rename_subject(&session.subject, id.as_str())
            .await?;
        RetryScheduler::new(&self.ctx).mark_matched(session).await?;
        CopyOrchestrator::new(&self.ctx)
            .move_session(session, pre_deid)
            .await
    }

    /// Applies operator-supplied matches, then runs the de-identification pass
    ///
    /// `csv` holds one `site,participant_id,subject_label` row per line.
    /// Rows that fail are logged, recorded and skipped.
    pub async fn manual_match(&mut self, csv: &str, skip_deid: bool) -> Result<RunSummary> {
        let start_time = Instant::now();
        let mut summary = RunSummary::new();
        let mut snapshot = RegistrySnapshot::new(self.ctx.registry.export_records().await?);
        let mut working = WorkingIdSet::from_snapshot(&snapshot);
        let pre_deid = self.require_project(&self.ctx.config.deid.pre_deid_project).await?;

        for (line_no, line) in csv.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            if self.shutdown_requested() {
                tracing::warn!(line = line_no + 1, "Shutdown requested, stopping manual match");
                summary.interrupted = true;
                break;
            }
            let result = match ManualMatchRow::parse(line) {
                Ok(row) => {
                    self.manual_match_row(&row, &mut snapshot, &mut working, &pre_deid)
                        .await
                }
                Err(e) => Err(WbhiError::Validation(e)),
            };
            match result {
                Ok(()) => summary.sessions_matched += 1,
                Err(e) => {
                    tracing::error!(line = line_no + 1, error = %e, "Manual match failed");
                    summary.add_error(
                        RunError::from_error(&e, Severity::Partial)
                            .with_context(format!("line={}", line_no + 1)),
                    );
                }
            }
        }

        if !skip_deid && !summary.interrupted {
            self.deid_pass(&mut summary).await;
        }

        summary = summary.with_duration(start_time.elapsed());
        summary.log_summary();
        Ok(summary)
    }

    async fn manual_match_row(
        &mut self,
        row: &ManualMatchRow,
        snapshot: &mut RegistrySnapshot,
        working: &mut WorkingIdSet,
        pre_deid: &Project,
    ) -> Result<()> {
        let site = self
            .ctx
            .site(&row.site)
            .cloned()
            .ok_or_else(|| WbhiError::Validation(format!("unknown site '{}'", row.site)))?;
        let inbound = self.require_project(&site.inbound_path()).await?;
        let subject = self
            .ctx
            .platform
            .find_subject(&inbound.id, &row.subject_label)
            .await?
            .ok_or_else(|| {
                PlatformError::NotFound(format!("subject {} in {}", row.subject_label, inbound.path()))
            })?;
        let idx = snapshot
            .find_by_participant(&row.participant_id)
            .ok_or_else(|| RegistryError::RecordNotFound(row.participant_id.clone()))?;
        let mut record = snapshot
            .record(idx)
            .cloned()
            .ok_or_else(|| RegistryError::RecordNotFound(row.participant_id.clone()))?;

        let id = self
            .generator
            .assign_id(&[&record], &site, working, &mut self.rng);
        record.set_rid(&id);

        let sessions: Vec<Session> = self
            .ctx
            .platform
            .list_sessions(&inbound.id)
            .await?
            .into_iter()
            .filter(|s| s.subject == subject.id)
            .collect();

        if self.ctx.dry_run {
            tracing::info!(
                participant_id = %row.participant_id,
                subject = %row.subject_label,
                wbhi_id = %id,
                sessions = sessions.len(),
                "[dry-run] Would apply manual match"
            );
            return Ok(());
        }

        let response = self
            .ctx
            .registry
            .import_records(std::slice::from_ref(&record))
            .await?;
        if response.count != 1 {
            return Err(RegistryError::ImportCountMismatch {
                submitted: 1,
                imported: response.count,
            }
            .into());
        }
        snapshot.set_rid(idx, &id);

        self.ctx
            .platform
            .rename_subject(&subject.id, id.as_str())
            .await?;
        let scheduler = RetryScheduler::new(&self.ctx);
        let orchestrator = CopyOrchestrator::new(&self.ctx);
        for session in &sessions {
            scheduler.mark_matched(session).await?;
            orchestrator.move_session(session, pre_deid).await?;
        }
        tracing::info!(
            participant_id = %row.participant_id,
            wbhi_id = %id,
            sessions = sessions.len(),
            "Applied manual match"
        );
        Ok(())
    }

    /// Reports the matching state of every inbound session
    pub async fn status(&self, sites: &[SiteId]) -> Result<Vec<SessionStatus>> {
        let min_age = self.ctx.config.matching.ignore_until_n_days_old;
        let mut rows = Vec::new();
        for site in self.selected_sites(sites)? {
            let inbound = self.require_project(&site.inbound_path()).await?;
            for session in self.ctx.platform.list_sessions(&inbound.id).await? {
                let subject = self.ctx.platform.get_subject(&session.subject).await?;
                rows.push(SessionStatus {
                    site: site.id.clone(),
                    subject: subject.label,
                    state: SessionState::from_tags(&session.tags),
                    eligibility: eligibility(&session, &self.ctx.clock, min_age),
                    session: session.label,
                });
            }
        }
        Ok(rows)
    }

    async fn deid_pass(&self, summary: &mut RunSummary) {
        match DeidGate::new(&self.ctx).run().await {
            Ok(report) => {
                for session in &report.gave_up {
                    summary.add_error(
                        RunError::new(
                            RunErrorType::Platform,
                            Severity::Partial,
                            "export job submission gave up".to_string(),
                        )
                        .with_context(format!("session={session}")),
                    );
                }
                summary.deid = Some(report);
            }
            Err(e) => {
                log_error_with_context!(e, "De-identification pass failed");
                summary.add_error(
                    RunError::from_error(&e, Severity::Fatal).with_context("pass=deid".to_string()),
                );
            }
        }
    }

    fn selected_sites(&self, filter: &[SiteId]) -> Result<Vec<SiteConfig>> {
        if filter.is_empty() {
            return Ok(self.ctx.sites().to_vec());
        }
        filter
            .iter()
            .map(|id| {
                self.ctx.site(id).cloned().ok_or_else(|| {
                    WbhiError::Configuration(format!("site '{id}' is not configured"))
                })
            })
            .collect()
    }

    async fn require_project(&self, path: &str) -> Result<Project> {
        self.ctx
            .platform
            .lookup_project(path)
            .await?
            .ok_or_else(|| PlatformError::NotFound(format!("project {path}")).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("smith", "smith" ; "alphanumeric token")]
    #[test_case("jones2", "jones2" ; "digits allowed")]
    #[test_case("o'brien", "other" ; "punctuation routes to other")]
    #[test_case("van der berg", "other" ; "spaces route to other")]
    #[test_case("", "other" ; "empty routes to other")]
    fn test_pi_project_label(token: &str, expected: &str) {
        assert_eq!(pi_project_label(token), expected);
    }

    #[test]
    fn test_manual_row_keeps_commas_in_label() {
        let row = ManualMatchRow::parse("ucsd, 101 ,Doe, Jane\r").unwrap();
        assert_eq!(row.site.as_str(), "ucsd");
        assert_eq!(row.participant_id, "101");
        assert_eq!(row.subject_label, "Doe, Jane");
    }

    #[test]
    fn test_manual_row_rejects_short_lines() {
        assert!(ManualMatchRow::parse("ucsd,101").is_err());
        assert!(ManualMatchRow::parse("ucsd,,sub").is_err());
        assert!(ManualMatchRow::parse(",101,sub").is_err());
    }
}
