//! Orchestrator tests

use std::sync::atomic::Ordering;
use std::time::Duration;

use keeper::deploy::deployer::ROLLBACK_ACTOR;
use keeper::deploy::orchestrator::{Orchestrator, OrchestratorOptions};
use keeper::errors::KeeperError;
use keeper::models::deployment::DeploymentStatus;
use openapi_client::models::LifecycleEvent;

use crate::fakes::{fast_validation, Harness};

#[tokio::test]
async fn test_start_records_pending_deployment() {
    let harness = Harness::new(false).await;

    let record = harness
        .orchestrator
        .start("abc1234ff", "refs/heads/main", "alice")
        .await
        .unwrap();

    assert_eq!(record.status, DeploymentStatus::Pending);
    assert_eq!(record.revision, "abc1234");
    assert_eq!(record.git_ref, "refs/heads/main");
    assert_eq!(record.initiated_by, "alice");
    assert_eq!(record.previous_id, None);
    assert_eq!(record.health_check_passed, None);
    assert!(harness.orchestrator.current().await.is_err());
    assert_eq!(
        harness.notifier.events(),
        vec![(record.id.clone(), LifecycleEvent::Started)]
    );
    // no deploy action runs on start
    assert!(harness.deployer.deploys().is_empty());

    harness.cleanup().await;
}

#[tokio::test]
async fn test_start_links_to_current_release() {
    let harness = Harness::new(false).await;
    let a = harness.release("aaaaaaa").await;

    let b = harness
        .orchestrator
        .start("bbbbbbb", "refs/heads/main", "bob")
        .await
        .unwrap();
    assert_eq!(b.previous_id, Some(a.id.clone()));
    assert_eq!(harness.orchestrator.current().await.unwrap().id, a.id);
    assert_eq!(harness.orchestrator.list_all().await.len(), 2);
    assert_eq!(harness.orchestrator.get(&b.id).await.unwrap(), b);

    harness.cleanup().await;
}

#[tokio::test]
async fn test_health_check_of_superseded_deployment_keeps_current() {
    let harness = Harness::new(false).await;
    harness.release("aaaaaaa").await;

    let b = harness
        .orchestrator
        .start("bbbbbbb", "refs/heads/main", "bob")
        .await
        .unwrap();
    harness.probe.set_healthy(false);
    assert!(!harness.orchestrator.health_check(&b.id).await.unwrap());

    let c = harness.release("ccccccc").await;

    // the probe answer is still reported, but b stays failed
    assert!(harness.orchestrator.health_check(&b.id).await.unwrap());
    let b = harness.orchestrator.get(&b.id).await.unwrap();
    assert_eq!(b.status, DeploymentStatus::Failed);
    assert_eq!(harness.orchestrator.current().await.unwrap().id, c.id);

    harness.cleanup().await;
}

#[tokio::test]
async fn test_start_rejects_empty_revision() {
    let harness = Harness::new(false).await;

    let err = harness
        .orchestrator
        .start("   ", "refs/heads/main", "alice")
        .await
        .unwrap_err();
    assert!(matches!(err, KeeperError::PreconditionFailed(_)));
    assert!(harness.orchestrator.list_all().await.is_empty());

    harness.cleanup().await;
}

#[tokio::test]
async fn test_execute_deploys_and_validates() {
    let harness = Harness::new(true).await;
    let record = harness
        .orchestrator
        .start("abc1234ff", "refs/heads/main", "alice")
        .await
        .unwrap();

    assert!(harness.orchestrator.execute(&record.id).await.unwrap());

    let record = harness.orchestrator.get(&record.id).await.unwrap();
    assert_eq!(record.status, DeploymentStatus::Success);
    assert_eq!(harness.deployer.checkouts(), vec!["abc1234".to_string()]);
    assert_eq!(harness.deployer.deploys()[0].initiated_by, "alice");

    let events: Vec<LifecycleEvent> = harness
        .notifier
        .events()
        .into_iter()
        .map(|(_, event)| event)
        .collect();
    assert_eq!(
        events,
        vec![
            LifecycleEvent::Started,
            LifecycleEvent::Deploying,
            LifecycleEvent::Completed
        ]
    );

    harness.cleanup().await;
}

#[tokio::test]
async fn test_execute_deploy_failure_marks_failed() {
    let harness = Harness::new(false).await;
    let record = harness
        .orchestrator
        .start("abc1234ff", "refs/heads/main", "alice")
        .await
        .unwrap();
    harness.deployer.fail_deploy.store(true, Ordering::SeqCst);

    assert!(!harness.orchestrator.execute(&record.id).await.unwrap());

    let record = harness.orchestrator.get(&record.id).await.unwrap();
    assert_eq!(record.status, DeploymentStatus::Failed);
    assert_eq!(harness.probe.calls(), 0);
    assert_eq!(harness.notifier.critical_alerts(), 1);

    harness.cleanup().await;
}

#[tokio::test]
async fn test_execute_rolls_back_unhealthy_release() {
    let harness = Harness::new(true).await;
    let a = harness.release("aaaaaaa").await;
    let b = harness
        .orchestrator
        .start("bbbbbbb", "refs/heads/main", "bob")
        .await
        .unwrap();
    harness.probe.set_healthy(false);
    harness.deployer.heal_on_rollback(harness.probe.clone());

    assert!(!harness.orchestrator.execute(&b.id).await.unwrap());

    assert_eq!(
        harness.orchestrator.get(&b.id).await.unwrap().status,
        DeploymentStatus::RolledBack
    );
    let current = harness.orchestrator.current().await.unwrap();
    assert_eq!(current.revision, a.revision);
    assert_eq!(current.previous_id.as_deref(), Some(b.id.as_str()));
    assert_eq!(current.initiated_by, ROLLBACK_ACTOR);
    assert_eq!(
        harness.deployer.checkouts(),
        vec!["bbbbbbb".to_string(), "aaaaaaa".to_string()]
    );

    harness.cleanup().await;
}

#[tokio::test]
async fn test_execute_unknown_id() {
    let harness = Harness::new(true).await;

    assert!(matches!(
        harness.orchestrator.execute("missing").await,
        Err(KeeperError::NotFound(_))
    ));
    assert!(harness.deployer.checkouts().is_empty());

    harness.cleanup().await;
}

#[tokio::test]
async fn test_report_stuck_alerts_on_old_in_flight_records() {
    let harness = Harness::new(false).await;
    let pending = harness
        .orchestrator
        .start("abc1234", "refs/heads/main", "alice")
        .await
        .unwrap();
    harness.release("bbbbbbb").await;

    // everything is older than a zero cutoff
    let eager = Orchestrator::new(
        harness.store.clone(),
        harness.probe.clone(),
        harness.deployer.clone(),
        harness.notifier.clone(),
        OrchestratorOptions {
            auto_rollback: false,
            validation: fast_validation(),
            stuck_after: Duration::ZERO,
        },
    );
    tokio::time::sleep(Duration::from_millis(5)).await;

    let stuck = eager.report_stuck().await;
    assert_eq!(stuck.len(), 1);
    assert_eq!(stuck[0].id, pending.id);
    assert_eq!(harness.notifier.alerts().len(), 1);

    assert!(harness.orchestrator.report_stuck().await.is_empty());

    harness.cleanup().await;
}
