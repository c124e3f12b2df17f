//! Record store tests

use chrono::{Duration as ChronoDuration, Utc};
use keeper::errors::KeeperError;
use keeper::filesys::dir::Dir;
use keeper::models::deployment::{DeploymentRecord, DeploymentStatus};
use keeper::storage::records::RecordStore;

use crate::fakes::temp_store;

fn record(revision: &str, previous_id: Option<String>) -> DeploymentRecord {
    DeploymentRecord::new(
        revision,
        "refs/heads/main",
        "alice",
        DeploymentStatus::Pending,
        previous_id,
    )
}

#[tokio::test]
async fn test_append_orders_most_recent_first() {
    let (dir, store) = temp_store("keeper-store").await;

    let a = store.append(record("aaaaaaa1", None)).await.unwrap();
    let b = store.append(record("bbbbbbb2", Some(a.id.clone()))).await.unwrap();
    let c = store.append(record("ccccccc3", Some(b.id.clone()))).await.unwrap();

    let records = store.list().await;
    let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec![c.id.as_str(), b.id.as_str(), a.id.as_str()]);

    for pair in records.windows(2) {
        assert!(pair[0].created_at > pair[1].created_at);
    }

    // previousId always points at an older record
    for (i, r) in records.iter().enumerate() {
        if let Some(previous_id) = &r.previous_id {
            let pos = records.iter().position(|p| &p.id == previous_id).unwrap();
            assert!(pos > i);
        }
    }

    dir.delete().await.unwrap();
}

#[tokio::test]
async fn test_revision_is_canonicalized() {
    let (dir, store) = temp_store("keeper-store").await;

    let r = store
        .append(record("  0123456789abcdef ", None))
        .await
        .unwrap();
    assert_eq!(r.revision, "0123456");

    dir.delete().await.unwrap();
}

#[tokio::test]
async fn test_append_rejects_unknown_predecessor() {
    let (dir, store) = temp_store("keeper-store").await;

    let err = store
        .append(record("aaaaaaa", Some("missing".to_string())))
        .await
        .unwrap_err();
    assert!(matches!(err, KeeperError::PreconditionFailed(_)));
    assert!(store.list().await.is_empty());

    dir.delete().await.unwrap();
}

#[tokio::test]
async fn test_current_follows_success_and_flips_eligibility_once() {
    let (dir, store) = temp_store("keeper-store").await;
    assert!(matches!(store.current().await, Err(KeeperError::NotFound(_))));

    let a = store.append(record("aaaaaaa", None)).await.unwrap();
    store
        .update_status(&a.id, DeploymentStatus::Success, Some(true))
        .await
        .unwrap();
    assert_eq!(store.current().await.unwrap().id, a.id);
    assert!(!store.get(&a.id).await.unwrap().rollback_eligible);

    // a pending successor does not change current
    let b = store.append(record("bbbbbbb", Some(a.id.clone()))).await.unwrap();
    assert_eq!(store.current().await.unwrap().id, a.id);

    let b = store
        .update_status(&b.id, DeploymentStatus::Success, Some(true))
        .await
        .unwrap();
    assert_eq!(store.current().await.unwrap().id, b.id);
    assert!(!b.rollback_eligible);

    let records = store.list().await;
    let eligible: Vec<&str> = records
        .iter()
        .filter(|r| r.rollback_eligible)
        .map(|r| r.id.as_str())
        .collect();
    assert_eq!(eligible, vec![a.id.as_str()]);

    dir.delete().await.unwrap();
}

#[tokio::test]
async fn test_superseded_record_cannot_become_success() {
    let (dir, store) = temp_store("keeper-store").await;

    let a = store.append(record("aaaaaaa", None)).await.unwrap();
    store
        .update_status(&a.id, DeploymentStatus::Success, Some(true))
        .await
        .unwrap();
    let b = store.append(record("bbbbbbb", Some(a.id.clone()))).await.unwrap();
    store
        .update_status(&b.id, DeploymentStatus::Failed, Some(false))
        .await
        .unwrap();
    let c = store.append(record("ccccccc", Some(a.id.clone()))).await.unwrap();
    store
        .update_status(&c.id, DeploymentStatus::Success, Some(true))
        .await
        .unwrap();

    // b recovering later must not displace c
    let err = store
        .update_status(&b.id, DeploymentStatus::Success, Some(true))
        .await
        .unwrap_err();
    assert!(matches!(err, KeeperError::InvalidTransition(_)));

    let b = store.get(&b.id).await.unwrap();
    assert_eq!(b.status, DeploymentStatus::Failed);
    assert_eq!(b.health_check_passed, Some(false));
    assert_eq!(store.current().await.unwrap().id, c.id);

    // a newer record still promotes normally once the current one fails
    store
        .update_status(&c.id, DeploymentStatus::Failed, Some(false))
        .await
        .unwrap();
    store
        .update_status(&b.id, DeploymentStatus::Success, Some(true))
        .await
        .unwrap();
    assert_eq!(store.current().await.unwrap().id, b.id);

    dir.delete().await.unwrap();
}

#[tokio::test]
async fn test_update_status_errors() {
    let (dir, store) = temp_store("keeper-store").await;

    let err = store
        .update_status("nope", DeploymentStatus::Success, None)
        .await
        .unwrap_err();
    assert!(matches!(err, KeeperError::NotFound(_)));

    let a = store.append(record("aaaaaaa", None)).await.unwrap();
    store
        .update_status(&a.id, DeploymentStatus::RolledBack, None)
        .await
        .unwrap();
    let err = store
        .update_status(&a.id, DeploymentStatus::Success, Some(true))
        .await
        .unwrap_err();
    assert!(matches!(err, KeeperError::InvalidTransition(_)));

    let a = store.get(&a.id).await.unwrap();
    assert_eq!(a.status, DeploymentStatus::RolledBack);
    assert_eq!(a.health_check_passed, None);

    dir.delete().await.unwrap();
}

#[tokio::test]
async fn test_history_survives_reopen() {
    let (dir, store) = temp_store("keeper-store").await;

    let a = store.append(record("aaaaaaa", None)).await.unwrap();
    store
        .update_status(&a.id, DeploymentStatus::Success, Some(true))
        .await
        .unwrap();
    let b = store.append(record("bbbbbbb", Some(a.id.clone()))).await.unwrap();
    store
        .update_status(&b.id, DeploymentStatus::Success, Some(true))
        .await
        .unwrap();
    let before = store.list().await;
    drop(store);

    let reopened = RecordStore::open(dir.file("deployments.json")).await;
    assert_eq!(reopened.list().await, before);
    assert_eq!(reopened.current().await.unwrap().id, b.id);

    let document: serde_json::Value = dir.file("deployments.json").read_json().await.unwrap();
    assert_eq!(document["schemaVersion"], 1);
    assert_eq!(document["deployments"][0]["ref"], "refs/heads/main");
    assert_eq!(document["deployments"][1]["rollbackEligible"], true);

    dir.delete().await.unwrap();
}

#[tokio::test]
async fn test_missing_or_corrupt_history_starts_empty() {
    let dir = Dir::create_temp_dir("keeper-store").await.unwrap();

    let store = RecordStore::open(dir.file("absent.json")).await;
    assert!(store.list().await.is_empty());

    let corrupt = dir.file("corrupt.json");
    corrupt.write_atomic(b"{ not json").await.unwrap();
    let store = RecordStore::open(corrupt).await;
    assert!(store.list().await.is_empty());

    dir.delete().await.unwrap();
}

#[tokio::test]
async fn test_corrupt_history_is_kept_aside() {
    let dir = Dir::create_temp_dir("keeper-store").await.unwrap();
    let history = dir.file("deployments.json");
    history.write_atomic(b"{ not json").await.unwrap();

    let store = RecordStore::open(history.clone()).await;
    store.append(record("aaaaaaa", None)).await.unwrap();

    let files = dir.list_files().await.unwrap();
    assert_eq!(files.len(), 2);
    let kept = files
        .iter()
        .find(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("deployments.json.corrupt-"))
        })
        .unwrap();
    assert_eq!(tokio::fs::read(kept).await.unwrap(), b"{ not json");

    let reopened = RecordStore::open(history).await;
    assert_eq!(reopened.list().await.len(), 1);

    dir.delete().await.unwrap();
}

#[tokio::test]
async fn test_legacy_array_history_loads() {
    let dir = Dir::create_temp_dir("keeper-store").await.unwrap();
    let file = dir.file("deployments.json");

    let mut old = record("aaaaaaa", None);
    old.status = DeploymentStatus::Success;
    file.write_json_atomic(&vec![old.clone()]).await.unwrap();

    let store = RecordStore::open(file).await;
    assert_eq!(store.current().await.unwrap().id, old.id);

    dir.delete().await.unwrap();
}

#[tokio::test]
async fn test_failed_persist_keeps_memory_state() {
    let dir = Dir::create_temp_dir("keeper-store").await.unwrap();
    // a non-empty directory where the history file should be
    let blocked = Dir::new(dir.path().join("deployments.json"));
    blocked.create().await.unwrap();
    blocked.file("keep").write_atomic(b"x").await.unwrap();

    let store = RecordStore::open(dir.file("deployments.json")).await;
    let r = record("aaaaaaa", None);
    let err = store.append(r.clone()).await.unwrap_err();
    assert!(matches!(err, KeeperError::PersistenceFailed(_)));
    assert_eq!(store.get(&r.id).await.unwrap().revision, "aaaaaaa");

    dir.delete().await.unwrap();
}

#[tokio::test]
async fn test_stuck_reports_old_in_flight_records() {
    let (dir, store) = temp_store("keeper-store").await;

    let a = store.append(record("aaaaaaa", None)).await.unwrap();
    let b = store.append(record("bbbbbbb", None)).await.unwrap();
    store
        .update_status(&b.id, DeploymentStatus::Success, Some(true))
        .await
        .unwrap();

    let stuck = store.stuck(Utc::now() + ChronoDuration::seconds(1)).await;
    let ids: Vec<&str> = stuck.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec![a.id.as_str()]);

    assert!(store.stuck(Utc::now() - ChronoDuration::hours(1)).await.is_empty());

    dir.delete().await.unwrap();
}
