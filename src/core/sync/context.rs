//! Run context shared by every pass

use crate::adapters::platform::StoragePlatform;
use crate::adapters::registry::ConsentRegistry;
use crate::config::{SiteConfig, WbhiConfig};
use crate::domain::ids::SiteId;
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;

/// Wall-clock reading taken once at the start of a run
///
/// Every age and retry-date decision in a run uses the same instant, in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunClock {
    now: DateTime<Utc>,
}

impl RunClock {
    pub fn system() -> Self {
        Self { now: Utc::now() }
    }

    pub fn fixed(now: DateTime<Utc>) -> Self {
        Self { now }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn today(&self) -> NaiveDate {
        self.now.date_naive()
    }
}

/// Collaborators and settings for one run
///
/// Passed by reference into every component instead of living in globals.
#[derive(Clone)]
pub struct SyncContext {
    pub platform: Arc<dyn StoragePlatform>,
    pub registry: Arc<dyn ConsentRegistry>,
    pub config: WbhiConfig,
    pub clock: RunClock,
    /// Reads happen, mutations are logged and skipped
    pub dry_run: bool,
}

impl SyncContext {
    pub fn new(
        platform: Arc<dyn StoragePlatform>,
        registry: Arc<dyn ConsentRegistry>,
        config: WbhiConfig,
    ) -> Self {
        let dry_run = config.application.dry_run;
        Self {
            platform,
            registry,
            config,
            clock: RunClock::system(),
            dry_run,
        }
    }

    pub fn with_clock(mut self, clock: RunClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn sites(&self) -> &[SiteConfig] {
        &self.config.sites
    }

    pub fn site(&self, id: &SiteId) -> Option<&SiteConfig> {
        self.config.site(id)
    }
}

impl std::fmt::Debug for SyncContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncContext")
            .field("sites", &self.config.sites.len())
            .field("clock", &self.clock)
            .field("dry_run", &self.dry_run)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_fixed_clock_today_is_utc() {
        let clock = RunClock::fixed(Utc.with_ymd_and_hms(2024, 3, 1, 23, 59, 0).unwrap());
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
    }
}
