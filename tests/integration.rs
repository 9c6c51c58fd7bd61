use std::ops::Deref;
use std::time::Duration;

use shardq::audit::AuditAction;
use shardq::config::Config;
use shardq::message::AckToken;
use shardq::queue::QueueRequest;
use shardq::service::{Service, Status};
use shardq::uuids;
use tempfile::TempDir;

struct TmpService {
    svc: Service,
    _tmpdir: TempDir,
}

impl Deref for TmpService {
    type Target = Service;

    fn deref(&self) -> &Self::Target {
        &self.svc
    }
}

async fn setup_with(mut config: Config) -> TmpService {
    let path = tempfile::tempdir().unwrap();

    if config.db_path.is_none() {
        config.db_path = Some(path.path().join("shardq.db").to_string_lossy().to_string());
    }
    // Keep background sweeps fast enough for test-sized timeouts.
    if config.reaper_interval_ms.is_none() {
        config.reaper_interval_ms = Some(50);
    }

    TmpService {
        svc: Service::connect_with(config).await.unwrap(),
        _tmpdir: path,
    }
}

async fn setup() -> TmpService {
    setup_with(Config::default()).await
}

#[tokio::test]
async fn round_trip_with_audit_history() {
    let service = setup().await;

    service
        .create_queue(QueueRequest::new("q1"))
        .await
        .unwrap();

    let message_id = service
        .send_message("q1", "text/plain", "hi".as_bytes(), None)
        .await
        .unwrap();

    let mut delivered = service.get_next_messages("q1", 1).await.unwrap();
    assert_eq!(delivered.len(), 1);
    let message = delivered.pop().unwrap();
    assert_eq!(message.message_id, message_id);
    assert_eq!(message.content_type, "text/plain");
    assert_eq!(message.body, b"hi");

    let status = service.ack_message("q1", &message.ack_token).await;
    assert_eq!(status, Status::Success);

    let history: Vec<AuditAction> = service
        .get_audit_logs(&message_id)
        .await
        .unwrap()
        .into_iter()
        .map(|entry| entry.action)
        .collect();
    assert_eq!(
        history,
        vec![AuditAction::Send, AuditAction::Get, AuditAction::Ack]
    );
}

#[tokio::test]
async fn ack_of_unknown_message_is_a_bad_request() {
    let service = setup().await;

    service
        .create_queue(QueueRequest::new("q2"))
        .await
        .unwrap();

    let bogus = uuids::time_uuid();
    let token = AckToken::new(service.config().region_local(), bogus);
    let status = service.ack_message("q2", &token).await;
    assert_eq!(status, Status::BadRequest);

    // A rejected ack leaves no trace in the audit log.
    assert!(service.get_audit_logs(&bogus).await.unwrap().is_empty());
}

#[tokio::test]
async fn double_ack_is_a_bad_request() {
    let service = setup().await;

    service
        .create_queue(QueueRequest::new("q2b"))
        .await
        .unwrap();
    service
        .send_message("q2b", "text/plain", "once".as_bytes(), None)
        .await
        .unwrap();

    let message = service
        .get_next_messages("q2b", 1)
        .await
        .unwrap()
        .pop()
        .unwrap();

    assert_eq!(
        service.ack_message("q2b", &message.ack_token).await,
        Status::Success
    );
    assert_eq!(
        service.ack_message("q2b", &message.ack_token).await,
        Status::BadRequest
    );
}

#[tokio::test]
async fn expired_lease_is_redelivered() {
    let service = setup().await;

    service
        .create_queue(QueueRequest::new("q3").with_inflight_timeout_ms(100))
        .await
        .unwrap();

    let message_id = service
        .send_message("q3", "text/plain", "x".as_bytes(), None)
        .await
        .unwrap();

    let first = service.get_next_messages("q3", 1).await.unwrap();
    assert_eq!(first.len(), 1);

    // Nothing to lease while the first delivery is still inflight.
    assert!(service.get_next_messages("q3", 1).await.unwrap().is_empty());

    tokio::time::sleep(Duration::from_millis(400)).await;

    let second = service.get_next_messages("q3", 1).await.unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].message_id, message_id);

    // Both lease cycles stay in the history, in order.
    let history: Vec<AuditAction> = service
        .get_audit_logs(&message_id)
        .await
        .unwrap()
        .into_iter()
        .map(|entry| entry.action)
        .collect();
    assert_eq!(
        history,
        vec![
            AuditAction::Send,
            AuditAction::Get,
            AuditAction::Timeout,
            AuditAction::Get,
        ]
    );
}

#[tokio::test]
async fn messages_are_delivered_in_send_order() {
    let service = setup().await;

    service
        .create_queue(QueueRequest::new("q4"))
        .await
        .unwrap();

    for body in ["first", "second", "third"] {
        service
            .send_message("q4", "text/plain", body.as_bytes(), None)
            .await
            .unwrap();
    }

    let delivered = service.get_next_messages("q4", 3).await.unwrap();
    let bodies: Vec<&[u8]> = delivered.iter().map(|m| m.body.as_slice()).collect();
    assert_eq!(bodies, vec![b"first".as_slice(), b"second", b"third"]);
}

#[tokio::test]
async fn full_shards_roll_over() {
    let service = setup_with(Config {
        shard_max_size: Some(2),
        ..Config::default()
    })
    .await;

    service
        .create_queue(QueueRequest::new("q5"))
        .await
        .unwrap();

    for n in 0..4u8 {
        service
            .send_message("q5", "text/plain", vec![n], None)
            .await
            .unwrap();
    }

    let shards: i64 = sqlx::query_scalar(
        "SELECT COUNT(DISTINCT shard_id) FROM messages_available WHERE queue_name = 'q5'",
    )
    .fetch_one(service.db())
    .await
    .unwrap();
    assert!(shards >= 2, "expected a shard rollover, saw {shards} shard(s)");

    // Rollover must not lose or reorder anything.
    let delivered = service.get_next_messages("q5", 4).await.unwrap();
    let bodies: Vec<&[u8]> = delivered.iter().map(|m| m.body.as_slice()).collect();
    assert_eq!(bodies, vec![[0u8].as_slice(), &[1], &[2], &[3]]);
}

#[tokio::test]
async fn pointers_replicate_to_every_region() {
    let tmpdir = tempfile::tempdir().unwrap();
    let db_path = tmpdir.path().join("shared.db").to_string_lossy().to_string();

    let east = Service::connect_with(Config {
        db_path: Some(db_path.clone()),
        region_local: Some("east".to_owned()),
        regions_replicated: Some(vec!["east".to_owned(), "west".to_owned()]),
        ..Config::default()
    })
    .await
    .unwrap();

    let west = Service::connect_with(Config {
        db_path: Some(db_path),
        region_local: Some("west".to_owned()),
        ..Config::default()
    })
    .await
    .unwrap();

    east.create_queue(QueueRequest::new("q6")).await.unwrap();

    let message_id = east
        .send_message("q6", "application/octet-stream", vec![1, 2, 3], None)
        .await
        .unwrap();

    // Each region leases its own pointer to the shared body.
    let via_west = west.get_next_messages("q6", 1).await.unwrap();
    assert_eq!(via_west.len(), 1);
    assert_eq!(via_west[0].message_id, message_id);
    assert_eq!(via_west[0].body, vec![1, 2, 3]);
    assert_eq!(via_west[0].ack_token.region, "west");

    let via_east = east.get_next_messages("q6", 1).await.unwrap();
    assert_eq!(via_east.len(), 1);
    assert_eq!(via_east[0].message_id, message_id);

    assert_eq!(
        west.ack_message("q6", &via_west[0].ack_token).await,
        Status::Success
    );
}

#[tokio::test]
async fn create_queue_is_idempotent() {
    let service = setup().await;

    let first = service
        .create_queue(QueueRequest::new("dup").with_inflight_timeout_ms(1234))
        .await
        .unwrap();
    let second = service
        .create_queue(QueueRequest::new("dup").with_inflight_timeout_ms(9999))
        .await
        .unwrap();

    // The existing definition wins.
    assert_eq!(first.inflight_timeout_ms, 1234);
    assert_eq!(second.inflight_timeout_ms, 1234);
    assert_eq!(service.list_queues().await.unwrap().len(), 1);
}

#[tokio::test]
async fn delete_queue_removes_shards_and_pointers() {
    let service = setup().await;

    service
        .create_queue(QueueRequest::new("gone"))
        .await
        .unwrap();
    service
        .send_message("gone", "text/plain", "pending".as_bytes(), None)
        .await
        .unwrap();

    service.delete_queue("gone").await.unwrap();

    for table in ["messages_available", "messages_inflight", "shards"] {
        let rows: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table} WHERE queue_name = 'gone'"))
                .fetch_one(service.db())
                .await
                .unwrap();
        assert_eq!(rows, 0, "{table} still has rows");
    }

    assert!(matches!(
        service.get_next_messages("gone", 1).await,
        Err(shardq::Error::NotFound { .. })
    ));
}

#[tokio::test]
async fn statistics_track_pointer_states() {
    let service = setup().await;

    service
        .create_queue(QueueRequest::new("stats"))
        .await
        .unwrap();
    for body in ["a", "b"] {
        service
            .send_message("stats", "text/plain", body.as_bytes(), None)
            .await
            .unwrap();
    }
    service.get_next_messages("stats", 1).await.unwrap();

    let stats = service.queue_statistics("stats").await.unwrap();
    assert_eq!(stats.available, 1);
    assert_eq!(stats.inflight, 1);
}

#[tokio::test]
async fn delayed_messages_stay_hidden_until_due() {
    let service = setup().await;

    service
        .create_queue(QueueRequest::new("slow"))
        .await
        .unwrap();
    service
        .send_message("slow", "text/plain", "later".as_bytes(), Some(300))
        .await
        .unwrap();

    assert!(service.get_next_messages("slow", 1).await.unwrap().is_empty());

    tokio::time::sleep(Duration::from_millis(400)).await;

    let delivered = service.get_next_messages("slow", 1).await.unwrap();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].body, b"later");
}
