//! End-to-end runs of the sync coordinator against in-memory backends

mod common;

use common::*;
use wbhi_sync::adapters::platform::CopyBehaviour;
use wbhi_sync::core::sync::{RunClock, RunErrorType, SyncCoordinator, SyncOptions};
use wbhi_sync::domain::consent::{ConsentRecord, FIELD_PARTICIPANT_ID, FIELD_RID};

fn without_deid() -> SyncOptions {
    SyncOptions {
        skip_deid: true,
        ..SyncOptions::default()
    }
}

#[tokio::test]
async fn test_matched_session_is_identified_copied_and_exported() {
    let fx = Fixture::new(vec![consent("P1", "SUB-1", "smith")]);
    let (subject, session) = fx.scanned_session("SUB-1", "ses-1", "Smith^John", "093000");

    let mut coordinator = SyncCoordinator::new(fx.context()).with_seed(7);
    let summary = coordinator.run(&SyncOptions::default()).await.unwrap();

    assert!(summary.is_successful(), "{:?}", summary.errors);
    assert_eq!(summary.sessions_checked, 1);
    assert_eq!(summary.sessions_matched, 1);
    assert_eq!(summary.ids_generated, 1);

    let id = fx.registry.record("P1").unwrap().rid().expect("id written back");
    assert_eq!(id.prefix(), 'U');
    assert_eq!(id.suffix().len(), 6);

    assert_eq!(fx.platform.subject(&subject).unwrap().label, id.as_str());
    let moved = fx.platform.session(&session).unwrap();
    assert_eq!(moved.project, fx.pre_deid);
    assert!(moved.has_tag("wbhi"));
    assert!(moved.has_tag("copied_smith"));
    for acquisition in fx.platform.acquisitions_of(&session) {
        assert!(acquisition.has_tag("wbhi"));
        assert!(acquisition.has_tag("copied_smith"));
        assert!(!acquisition.has_tag("to_copy_smith"));
    }

    let pi_project = fx.platform.project_by_path("ucsd/smith").unwrap();
    let copies = fx.platform.sessions_in(&pi_project.id);
    assert_eq!(copies.len(), 1);
    assert_eq!(fx.platform.acquisitions_of(&copies[0].id).len(), 1);

    let jobs = fx.platform.submitted_jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].destination, session);
    assert_eq!(summary.deid.unwrap().submitted, 1);
}

#[tokio::test]
async fn test_unmatched_session_backs_off_exponentially() {
    let fx = Fixture::new(vec![consent("P1", "SUB-9", "smith")]);
    let (_, session) = fx.scanned_session("SUB-1", "ses-1", "Smith^John", "093000");

    let mut coordinator = SyncCoordinator::new(fx.context());
    let summary = coordinator.run(&without_deid()).await.unwrap();
    assert_eq!(summary.sessions_deferred, 1);
    assert!(fx.platform.session(&session).unwrap().has_tag("retry_1_20240321"));

    // Same day: the marker is not due yet
    let summary = coordinator.run(&without_deid()).await.unwrap();
    assert_eq!(summary.sessions_checked, 0);

    let next_day = fx
        .context()
        .with_clock(RunClock::fixed(at(2024, 3, 21, 12)));
    let summary = SyncCoordinator::new(next_day)
        .run(&without_deid())
        .await
        .unwrap();
    assert_eq!(summary.sessions_deferred, 1);

    let tags = fx.platform.session(&session).unwrap().tags;
    assert!(tags.contains(&"retry_2_20240323".to_string()));
    assert!(!tags.iter().any(|t| t.starts_with("retry_1_")));
    assert_eq!(fx.platform.session(&session).unwrap().project, fx.inbound);
}

#[tokio::test]
async fn test_two_sessions_of_one_participant_share_one_id() {
    let fx = Fixture::new(vec![consent("P1", "SUB-1", "smith")]);
    let (subject, first) = fx.scanned_session("SUB-1", "ses-a", "Smith^John", "093000");
    let second = fx.session_for(&subject, "ses-b", "Smith^John", "101500");

    let summary = SyncCoordinator::new(fx.context())
        .run(&without_deid())
        .await
        .unwrap();
    assert!(summary.is_successful(), "{:?}", summary.errors);
    assert_eq!(summary.sessions_matched, 2);
    assert_eq!(summary.ids_generated, 1);

    let imports = fx.registry.imports();
    assert_eq!(imports.len(), 1);
    assert_eq!(imports[0].len(), 1);

    let subjects = fx.platform.subjects_in(&fx.pre_deid);
    assert_eq!(subjects.len(), 1);
    for session in [first, second] {
        let moved = fx.platform.session(&session).unwrap();
        assert_eq!(moved.project, fx.pre_deid);
        assert_eq!(moved.subject, subjects[0].id);
    }
}

#[tokio::test]
async fn test_import_count_mismatch_leaves_sessions_untouched() {
    let fx = Fixture::new(vec![consent("P1", "SUB-1", "smith")]);
    let (subject, session) = fx.scanned_session("SUB-1", "ses-1", "Smith^John", "093000");
    fx.registry.force_import_count(0);

    let summary = SyncCoordinator::new(fx.context())
        .run(&without_deid())
        .await
        .unwrap();
    assert!(summary.has_fatal_errors());
    assert_eq!(summary.worst_error().unwrap().error_type, RunErrorType::Registry);
    assert_eq!(summary.sessions_matched, 0);

    let untouched = fx.platform.session(&session).unwrap();
    assert_eq!(untouched.project, fx.inbound);
    assert!(!untouched.has_tag("wbhi"));
    assert_eq!(fx.platform.subject(&subject).unwrap().label, "SUB-1");

    assert!(fx.registry.record("P1").unwrap().rid().is_none());

    // The next run with a healthy registry finishes the match
    fx.registry.force_import_count(1);
    let summary = SyncCoordinator::new(fx.context())
        .run(&without_deid())
        .await
        .unwrap();
    assert!(summary.is_successful(), "{:?}", summary.errors);
    assert_eq!(summary.sessions_matched, 1);
    assert_eq!(fx.registry.imports().len(), 2);
    assert_eq!(fx.platform.session(&session).unwrap().project, fx.pre_deid);
}

#[tokio::test(start_paused = true)]
async fn test_copy_timeout_then_rerun_completes() {
    let fx = Fixture::new(Vec::new());
    let (_, session) = fx.scanned_session("SUB-1", "ses-1", "Smith^John", "093000");
    fx.platform.set_copy_behaviour(CopyBehaviour::NeverComplete);

    let summary = SyncCoordinator::new(fx.context())
        .run(&without_deid())
        .await
        .unwrap();
    assert_eq!(summary.worst_error().unwrap().error_type, RunErrorType::CopyJob);
    assert!(!fx.platform.session(&session).unwrap().has_tag("copied_smith"));

    fx.platform.set_copy_behaviour(CopyBehaviour::Complete);
    let summary = SyncCoordinator::new(fx.context())
        .run(&without_deid())
        .await
        .unwrap();
    assert!(summary.is_successful(), "{:?}", summary.errors);
    assert_eq!(summary.copies.len(), 1);
    assert!(summary.copies[0].is_complete());

    assert!(fx.platform.session(&session).unwrap().has_tag("copied_smith"));
    let pi_project = fx.platform.project_by_path("ucsd/smith").unwrap();
    assert_eq!(fx.platform.sessions_in(&pi_project.id).len(), 1);
}

#[tokio::test]
async fn test_already_exported_session_is_tagged_not_resubmitted() {
    let fx = Fixture::new(Vec::new());
    let subject = fx.platform.add_subject(&fx.pre_deid, "UABC123");
    let session = fx.platform.add_session(&subject, "ses-1", Some(at(2024, 3, 10, 9)), &["wbhi"]);
    fx.platform.add_acquisition(&session, "T1w", None, Vec::new());

    let exported_subject = fx.platform.add_subject(&fx.deid, "UABC123");
    let exported = fx
        .platform
        .add_session(&exported_subject, "ses-1", None, &[]);
    fx.platform.add_acquisition(&exported, "T1w", None, Vec::new());

    let summary = SyncCoordinator::new(fx.context())
        .run(&SyncOptions::default())
        .await
        .unwrap();
    let deid = summary.deid.unwrap();
    assert_eq!(deid.newly_tagged, 1);
    assert_eq!(deid.submitted, 0);
    assert!(fx.platform.session(&session).unwrap().has_tag("deid"));

    let summary = SyncCoordinator::new(fx.context())
        .run(&SyncOptions::default())
        .await
        .unwrap();
    assert_eq!(summary.deid.unwrap().already_tagged, 1);
    assert!(fx.platform.submitted_jobs().is_empty());
}

#[tokio::test]
async fn test_manual_match_assigns_and_moves() {
    let record = ConsentRecord::new()
        .with_field(FIELD_PARTICIPANT_ID, "P9")
        .with_field(FIELD_RID, "");
    let fx = Fixture::new(vec![record]);
    let (subject, session) = fx.scanned_session("odd-label", "ses-1", "Smith^John", "093000");

    let summary = SyncCoordinator::new(fx.context())
        .manual_match("ucsd,P9,odd-label\n\nucsd,P404,odd-label\n", true)
        .await
        .unwrap();

    assert_eq!(summary.sessions_matched, 1);
    assert_eq!(summary.errors.len(), 1);
    assert_eq!(summary.errors[0].error_type, RunErrorType::Registry);

    let id = fx.registry.record("P9").unwrap().rid().unwrap();
    assert_eq!(fx.platform.subject(&subject).unwrap().label, id.as_str());
    let moved = fx.platform.session(&session).unwrap();
    assert_eq!(moved.project, fx.pre_deid);
    assert!(moved.has_tag("wbhi"));
}

#[tokio::test]
async fn test_status_reports_state_and_eligibility() {
    let fx = Fixture::new(Vec::new());
    fx.scanned_session("SUB-1", "ses-1", "Smith^John", "093000");
    let skipped = fx.platform.add_subject(&fx.inbound, "SUB-2");
    fx.platform
        .add_session(&skipped, "ses-2", Some(at(2024, 3, 1, 9)), &["skip_redcap"]);

    let rows = SyncCoordinator::new(fx.context()).status(&[]).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows[0].eligibility.is_eligible());
    assert_eq!(rows[1].eligibility.to_string(), "skipped (skip_redcap)");
}

#[tokio::test]
async fn test_unknown_site_filter_is_rejected() {
    let fx = Fixture::new(Vec::new());
    let options = SyncOptions {
        sites: vec!["nowhere".parse().unwrap()],
        skip_deid: true,
    };
    let err = SyncCoordinator::new(fx.context()).run(&options).await.unwrap_err();
    assert!(err.to_string().contains("nowhere"));
}
