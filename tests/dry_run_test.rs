//! Integration tests for dry-run mode
//!
//! A dry run reads both systems and logs what it would do; neither the
//! platform nor the registry may see a single write.

mod common;

use common::*;
use wbhi_sync::core::sync::{SyncContext, SyncCoordinator, SyncOptions};
use wbhi_sync::domain::consent::{ConsentRecord, FIELD_PARTICIPANT_ID, FIELD_RID};

#[test]
fn test_context_takes_dry_run_from_config() {
    let fx = Fixture::new(Vec::new());
    let mut config = config();
    assert!(!config.application.dry_run);

    config.application.dry_run = true;
    let ctx = SyncContext::new(fx.platform.clone(), fx.registry.clone(), config);
    assert!(ctx.dry_run);
    assert!(!ctx.with_dry_run(false).dry_run);
}

#[tokio::test]
async fn test_sync_dry_run_changes_nothing() {
    let fx = Fixture::new(vec![consent("P1", "SUB-1", "smith")]);
    let (_, session) = fx.scanned_session("SUB-1", "ses-1", "Smith^John", "093000");
    let (_, unmatched) = fx.scanned_session("SUB-2", "ses-2", "Smith^John", "093000");

    let ctx = fx.context().with_dry_run(true);
    let summary = SyncCoordinator::new(ctx)
        .run(&SyncOptions::default())
        .await
        .unwrap();

    assert_eq!(summary.sessions_checked, 2);
    assert_eq!(summary.sessions_matched, 1);
    assert_eq!(fx.platform.mutation_count(), 0);
    assert!(fx.registry.imports().is_empty());
    assert!(fx.registry.record("P1").unwrap().rid().is_none());
    assert!(fx.platform.project_by_path("ucsd/smith").is_none());
    assert!(fx.platform.session(&session).unwrap().tags.is_empty());
    assert!(fx.platform.session(&unmatched).unwrap().tags.is_empty());
}

#[tokio::test]
async fn test_dry_run_into_existing_pi_project_plans_only() {
    let fx = Fixture::new(Vec::new());
    fx.platform.add_project("ucsd", "smith");
    fx.scanned_session("SUB-1", "ses-1", "Smith^John", "093000");

    let summary = SyncCoordinator::new(fx.context().with_dry_run(true))
        .run(&SyncOptions::default())
        .await
        .unwrap();

    assert!(summary.is_successful(), "{:?}", summary.errors);
    assert_eq!(fx.platform.mutation_count(), 0);
    assert!(fx.platform.copy_requests().is_empty());
}

#[tokio::test]
async fn test_manual_match_dry_run_changes_nothing() {
    let record = ConsentRecord::new()
        .with_field(FIELD_PARTICIPANT_ID, "P9")
        .with_field(FIELD_RID, "");
    let fx = Fixture::new(vec![record]);
    let (subject, _) = fx.scanned_session("odd-label", "ses-1", "Smith^John", "093000");

    let summary = SyncCoordinator::new(fx.context().with_dry_run(true))
        .manual_match("ucsd,P9,odd-label", false)
        .await
        .unwrap();

    assert_eq!(summary.sessions_matched, 1);
    assert_eq!(fx.platform.mutation_count(), 0);
    assert!(fx.registry.imports().is_empty());
    assert_eq!(fx.platform.subject(&subject).unwrap().label, "odd-label");
}

#[tokio::test]
async fn test_deid_dry_run_does_not_submit() {
    let fx = Fixture::new(Vec::new());
    let subject = fx.platform.add_subject(&fx.pre_deid, "UABC123");
    let session = fx.platform.add_session(&subject, "ses-1", None, &["wbhi"]);
    fx.platform.add_acquisition(&session, "T1w", None, Vec::new());

    let summary = SyncCoordinator::new(fx.context().with_dry_run(true))
        .run(&SyncOptions::default())
        .await
        .unwrap();

    let deid = summary.deid.unwrap();
    assert_eq!(deid.checked, 1);
    assert_eq!(deid.submitted, 0);
    assert!(fx.platform.submitted_jobs().is_empty());
}
