//! Retry scheduling
//!
//! Decides which inbound sessions are tried this run and persists the result
//! of each attempt as session tags.

use crate::adapters::platform::TagTarget;
use crate::core::state::session_state::{transition, MatchOutcome, SessionState, TagPlan};
use crate::core::sync::{RunClock, SyncContext};
use crate::domain::session::Session;
use crate::domain::tags;
use crate::domain::Result;
use crate::{log_session_skipped, log_state_transition};
use chrono::{Duration, NaiveDate};

/// Why a session is or is not tried this run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    Eligible(SessionState),
    /// Carries a skip marker
    Skipped(&'static str),
    /// Younger than the configured age floor
    TooRecent,
    /// Retry marker dated in the future
    NotDue(NaiveDate),
    /// Already matched
    Matched,
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Eligibility::Eligible(_))
    }
}

impl std::fmt::Display for Eligibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Eligibility::Eligible(_) => write!(f, "eligible"),
            Eligibility::Skipped(marker) => write!(f, "skipped ({marker})"),
            Eligibility::TooRecent => write!(f, "too recent"),
            Eligibility::NotDue(date) => write!(f, "next check {date}"),
            Eligibility::Matched => write!(f, "matched"),
        }
    }
}

/// Selection predicate for registry matching
///
/// Sessions without a timestamp are not held back by the age floor.
pub fn eligibility(session: &Session, clock: &RunClock, min_age_days: i64) -> Eligibility {
    if let Some(marker) = tags::SKIP_MARKERS.into_iter().find(|m| session.has_tag(m)) {
        return Eligibility::Skipped(marker);
    }

    if let Some(ts) = session.timestamp {
        let too_recent = Duration::try_days(min_age_days)
            .map_or(true, |floor| clock.now() - ts < floor);
        if too_recent {
            return Eligibility::TooRecent;
        }
    }

    let state = SessionState::from_tags(&session.tags);
    match state {
        SessionState::Matched => Eligibility::Matched,
        SessionState::Retry { next_check, .. } if !state.is_due(clock.today()) => {
            Eligibility::NotDue(next_check)
        }
        _ => Eligibility::Eligible(state),
    }
}

/// Applies matching outcomes to sessions
pub struct RetryScheduler<'a> {
    ctx: &'a SyncContext,
}

impl<'a> RetryScheduler<'a> {
    pub fn new(ctx: &'a SyncContext) -> Self {
        Self { ctx }
    }

    /// Keeps the sessions that should be matched this run
    pub fn select(&self, sessions: Vec<Session>) -> Vec<Session> {
        let min_age = self.ctx.config.matching.ignore_until_n_days_old;
        sessions
            .into_iter()
            .filter(|session| match eligibility(session, &self.ctx.clock, min_age) {
                Eligibility::Eligible(_) => true,
                Eligibility::Skipped(marker) => {
                    log_session_skipped!(session.id, marker);
                    false
                }
                Eligibility::NotDue(date) => {
                    tracing::debug!(session_id = %session.id, next_check = %date, "Retry not due");
                    false
                }
                Eligibility::TooRecent | Eligibility::Matched => false,
            })
            .collect()
    }

    /// Replaces the session's retry marker with the next one
    pub async fn record_failure(&self, session: &Session) -> Result<SessionState> {
        let t = transition(&session.tags, MatchOutcome::NoMatch, self.ctx.clock.today());
        self.apply(session, &t.plan).await?;
        log_state_transition!(session.id, SessionState::from_tags(&session.tags), t.next);
        Ok(t.next)
    }

    /// Marks a session matched
    ///
    /// `wbhi` goes on the session, each of its acquisitions and each of their
    /// files. Retry markers are removed.
    pub async fn mark_matched(&self, session: &Session) -> Result<()> {
        let t = transition(&session.tags, MatchOutcome::Matched, self.ctx.clock.today());
        self.apply(session, &t.plan).await?;

        for acquisition in self.ctx.platform.list_acquisitions(&session.id).await? {
            if !acquisition.has_tag(tags::MATCHED) {
                self.tag(&TagTarget::Acquisition(acquisition.id.clone()))
                    .await?;
            }
            for file in acquisition.files.iter().filter(|f| !f.has_tag(tags::MATCHED)) {
                self.tag(&TagTarget::File {
                    acquisition: acquisition.id.clone(),
                    name: file.name.clone(),
                })
                .await?;
            }
        }

        log_state_transition!(session.id, SessionState::from_tags(&session.tags), t.next);
        Ok(())
    }

    async fn tag(&self, target: &TagTarget) -> Result<()> {
        if self.ctx.dry_run {
            tracing::info!(target = %target, tag = tags::MATCHED, "[dry-run] Would add tag");
            return Ok(());
        }
        self.ctx.platform.add_tag(target, tags::MATCHED).await
    }

    async fn apply(&self, session: &Session, plan: &TagPlan) -> Result<()> {
        let target = TagTarget::Session(session.id.clone());
        if self.ctx.dry_run {
            tracing::info!(
                session_id = %session.id,
                add = ?plan.add,
                remove = ?plan.remove,
                "[dry-run] Would update session tags"
            );
            return Ok(());
        }
        // Add before removing so an interrupted run never loses the attempt count
        for tag in &plan.add {
            self.ctx.platform.add_tag(&target, tag).await?;
        }
        for tag in &plan.remove {
            self.ctx.platform.delete_tag(&target, tag).await?;
        }
        Ok(())
    }
}
