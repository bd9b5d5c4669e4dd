//! Integration tests for graceful shutdown
//!
//! A shutdown signal stops the run between sites. Everything done so far is
//! already recorded as tags, so the next run picks up where this one stopped.

mod common;

use common::*;
use tokio::sync::watch;
use wbhi_sync::core::sync::{RunSummary, SyncCoordinator, SyncOptions};

#[tokio::test]
async fn test_shutdown_signal_propagation() {
    let (shutdown_tx, shutdown_rx1) = watch::channel(false);
    let shutdown_rx2 = shutdown_rx1.clone();

    assert!(!*shutdown_rx1.borrow());
    assert!(!*shutdown_rx2.borrow());

    shutdown_tx.send(true).unwrap();

    assert!(*shutdown_rx1.borrow());
    assert!(*shutdown_rx2.borrow());
}

#[test]
fn test_summary_not_interrupted_by_default() {
    let summary = RunSummary::new();
    assert!(!summary.interrupted);
}

#[tokio::test]
async fn test_shutdown_before_first_site_stops_run() {
    let fx = Fixture::new(vec![consent("P1", "SUB-1", "smith")]);
    let (_, session) = fx.scanned_session("SUB-1", "ses-1", "Smith^John", "093000");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    shutdown_tx.send(true).unwrap();

    let summary = SyncCoordinator::new(fx.context())
        .with_shutdown(shutdown_rx)
        .run(&SyncOptions::default())
        .await
        .unwrap();

    assert!(summary.interrupted);
    assert_eq!(summary.sites, 0);
    assert!(summary.deid.is_none());
    assert_eq!(fx.platform.mutation_count(), 0);
    assert_eq!(fx.platform.session(&session).unwrap().project, fx.inbound);
}

#[tokio::test]
async fn test_rerun_after_interruption_completes() {
    let fx = Fixture::new(vec![consent("P1", "SUB-1", "smith")]);
    let (_, session) = fx.scanned_session("SUB-1", "ses-1", "Smith^John", "093000");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    shutdown_tx.send(true).unwrap();
    let interrupted = SyncCoordinator::new(fx.context())
        .with_shutdown(shutdown_rx)
        .run(&SyncOptions::default())
        .await
        .unwrap();
    assert!(interrupted.interrupted);

    let (_tx, shutdown_rx) = watch::channel(false);
    let summary = SyncCoordinator::new(fx.context())
        .with_shutdown(shutdown_rx)
        .run(&SyncOptions::default())
        .await
        .unwrap();
    assert!(!summary.interrupted);
    assert_eq!(summary.sessions_matched, 1);
    assert_eq!(fx.platform.session(&session).unwrap().project, fx.pre_deid);
}

#[tokio::test]
async fn test_shutdown_stops_manual_match() {
    let fx = Fixture::new(Vec::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    shutdown_tx.send(true).unwrap();

    let summary = SyncCoordinator::new(fx.context())
        .with_shutdown(shutdown_rx)
        .manual_match("ucsd,P1,SUB-1\n", false)
        .await
        .unwrap();

    assert!(summary.interrupted);
    assert_eq!(summary.sessions_matched, 0);
    assert!(summary.errors.is_empty());
    assert!(summary.deid.is_none());
}
