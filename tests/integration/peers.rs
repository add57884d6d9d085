use crate::*;
use hive_services::{OrchestrationError, PeerSubstrate};

#[tokio::test]
async fn unknown_validator_is_purged() {
    let (substrate, _outbox) = MemorySubstrate::new(USER);
    // VALIDATOR is configured but never added to the lookup table.
    let node = UserNode::new(
        substrate.clone(),
        ReputationLedger::new(),
        NodeSettings {
            validators: vec![VALIDATOR],
            liaison: quick_liaison(1),
            ..NodeSettings::default()
        },
    );

    let result = node.orchestrator.submit_job(1, 1, one_module(4)).await;
    assert!(matches!(result, Err(OrchestrationError::ValidatorNotFound(v)) if v == VALIDATOR));
    assert!(substrate.was_forgotten(&VALIDATOR));
    assert_eq!(node.jobs.len().await, 0);
}

#[tokio::test]
async fn unreachable_validator_is_purged() {
    let (substrate, mut outbox) = MemorySubstrate::new(USER);
    substrate.add_unreachable_peer(VALIDATOR, "10.0.0.1", 5026);
    let node = UserNode::new(
        substrate.clone(),
        ReputationLedger::new(),
        NodeSettings {
            validators: vec![VALIDATOR],
            liaison: quick_liaison(1),
            ..NodeSettings::default()
        },
    );

    let result = node.orchestrator.submit_job(1, 1, one_module(4)).await;
    assert!(matches!(result, Err(OrchestrationError::ConnectFailed(v)) if v == VALIDATOR));
    assert!(substrate.was_forgotten(&VALIDATOR));
    assert!(outbox.try_recv().is_err());
}

#[tokio::test]
async fn no_validators_is_reported() {
    let h = Harness::new(&[], quick_liaison(1));
    let result = h.node.orchestrator.submit_job(1, 1, one_module(4)).await;
    assert!(matches!(result, Err(OrchestrationError::NoValidators)));
}

#[tokio::test]
async fn ping_is_answered_not_counted() {
    let mut h = Harness::single_validator();
    assert!(h.substrate.connect(&VALIDATOR, "10.0.0.1", 5026).await);

    assert_eq!(h.deliver_raw(VALIDATOR, b"PING").await, Disposition::Base);
    let out = h.outbox.recv().await.unwrap();
    assert_eq!(&out.payload[..], b"PONG");
    assert_eq!(h.deliver_raw(VALIDATOR, b"PONG").await, Disposition::Base);
    assert_eq!(h.node.reputation.total(), 0);
}

#[tokio::test]
async fn every_violation_counts_once() {
    let h = Harness::single_validator();

    // Unknown tag.
    assert_eq!(h.deliver_raw(STRANGER, b"STATUS?").await, Disposition::Ghost);
    // Known tag, garbage body.
    assert_eq!(h.deliver_raw(STRANGER, b"WORKERS{not json").await, Disposition::Ghost);
    // Well formed, but only a User sends these.
    assert_eq!(h.deliver(STRANGER, Message::UserGetWorkers).await, Disposition::Ghost);

    assert_eq!(h.node.reputation.ghosts(&STRANGER), 3);
    assert_eq!(h.node.reputation.ghosts(&VALIDATOR), 0);
    assert_eq!(h.node.reputation.total(), 3);
    assert_eq!(h.node.reputation.list().len(), 1);
}

#[tokio::test]
async fn dispatcher_loop_drains_inbound() {
    let h = Harness::single_validator();
    let (inbound_tx, inbound_rx) = mpsc::channel(8);
    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
    let task = tokio::spawn(h.node.dispatcher.clone().run(inbound_rx, shutdown_rx));

    for _ in 0..2 {
        inbound_tx
            .send(hive_services::InboundMessage {
                peer: STRANGER,
                payload: b"NONSENSE".to_vec().into(),
            })
            .await
            .unwrap();
    }
    drop(inbound_tx);
    task.await.unwrap();
    drop(shutdown_tx);

    assert_eq!(h.node.reputation.ghosts(&STRANGER), 2);
}

#[tokio::test]
async fn status_reports_connections_and_ghosts() {
    let h = Harness::new(&[VALIDATOR, OTHER_VALIDATOR], quick_liaison(1));
    h.deliver_raw(STRANGER, b"NONSENSE").await;
    assert_eq!(h.node.orchestrator.request_worker_info().await, 2);

    let info = h.node.self_info().await;
    assert_eq!(info.node_id, USER);
    assert_eq!(info.validators, vec![VALIDATOR, OTHER_VALIDATOR]);
    assert_eq!(info.connected_peers.len(), 2);
    assert_eq!(info.ghosts_total, 1);
    assert_eq!(info.pending_announcements, 0);
}
