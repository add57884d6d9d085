use crate::*;
use hive_services::{command_channel, Command};
use serde_json::json;
use std::collections::BTreeMap;

fn broadcast(entries: &[(NodeId, serde_json::Value)]) -> Message {
    Message::Workers(entries.iter().cloned().collect::<BTreeMap<_, _>>())
}

#[tokio::test]
async fn worker_request_reaches_every_validator() {
    let mut h = Harness::new(&[VALIDATOR, OTHER_VALIDATOR], quick_liaison(1));

    assert_eq!(h.node.orchestrator.request_worker_info().await, 2);

    let sent = h.drain_sent();
    assert_eq!(tags(&sent), vec![Tag::UserGetWorkers; 2]);
    let mut targets: Vec<NodeId> = sent.iter().map(|(to, _)| *to).collect();
    targets.sort();
    assert_eq!(targets, vec![VALIDATOR, OTHER_VALIDATOR]);
}

#[tokio::test]
async fn unreachable_validator_is_skipped_for_worker_request() {
    let (substrate, _outbox) = MemorySubstrate::new(USER);
    substrate.add_peer(VALIDATOR, "10.0.0.1", 5026);
    substrate.add_unreachable_peer(OTHER_VALIDATOR, "10.0.0.2", 5026);
    let node = UserNode::new(
        substrate.clone(),
        ReputationLedger::new(),
        NodeSettings {
            validators: vec![VALIDATOR, OTHER_VALIDATOR],
            ..NodeSettings::default()
        },
    );

    assert_eq!(node.orchestrator.request_worker_info().await, 1);
    assert!(substrate.was_forgotten(&OTHER_VALIDATOR));
}

#[tokio::test]
async fn broadcasts_from_several_validators_merge() {
    let h = Harness::new(&[VALIDATOR, OTHER_VALIDATOR], quick_liaison(1));
    let second = NodeId([0x0d; 32]);

    let first = broadcast(&[(WORKER, json!({"gpu": "a100", "ram": 80}))]);
    assert_eq!(h.deliver(VALIDATOR, first).await, Disposition::Workers);
    let other = broadcast(&[
        (WORKER, json!({"gpu": "a100", "ram": 40})),
        (second, json!({"gpu": "h100"})),
    ]);
    assert_eq!(h.deliver(OTHER_VALIDATOR, other).await, Disposition::Workers);

    let all = h.node.workers.get_all();
    assert_eq!(all.len(), 2);
    // Latest report wins.
    assert_eq!(all[&WORKER]["ram"], 40);
    assert_eq!(h.node.workers.get(&WORKER).unwrap().reported_by, OTHER_VALIDATOR);
    assert_eq!(h.node.reputation.total(), 0);
}

/// request_workers then check_workers through the command loop, with the
/// validator answering in between.
#[tokio::test(start_paused = true)]
async fn worker_commands_round_trip() {
    let mut h = Harness::single_validator();
    let (commands, rx) = command_channel(8);
    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
    let processor = tokio::spawn(h.node.command_processor().run(rx, shutdown_rx));

    let asking = {
        let commands = commands.clone();
        tokio::spawn(async move { commands.request(Command::RequestWorkers).await })
    };

    match h.next_sent().await {
        (to, Message::UserGetWorkers) => assert_eq!(to, VALIDATOR),
        (_, other) => panic!("expected USER-GET-WORKERS, got {:?}", other.tag()),
    }
    h.deliver(VALIDATOR, broadcast(&[(WORKER, json!({"ram": 16}))]))
        .await;

    let asked = asking.await.unwrap().unwrap();
    assert!(asked.is_success());

    let checked = commands.request(Command::CheckWorkers).await.unwrap();
    assert!(checked.is_success());
    assert_eq!(checked.ret[WORKER.to_string()]["ram"], 16);

    shutdown_tx.send(()).unwrap();
    processor.await.unwrap();
}
