use crate::*;
use hive_core::JobAllocation;
use hive_services::{Command, OrchestrationError};
use tokio::task::JoinHandle;

fn submit(h: &Harness, n_pipelines: u32, spec: DistributionSpec) -> JoinHandle<Result<JobAllocation, OrchestrationError>> {
    let orchestrator = h.node.orchestrator.clone();
    tokio::spawn(async move { orchestrator.submit_job(n_pipelines, 1, spec).await })
}

/// One module of size 4, one pipeline, one worker: the allocation names
/// exactly that module with exactly that worker.
#[tokio::test]
async fn job_is_bound_end_to_end() {
    let mut h = Harness::single_validator();
    h.substrate.allow_connect(WORKER);

    let task = submit(&h, 1, one_module(4));
    let job_id = h.expect_job_request(VALIDATOR).await;
    assert_eq!(h.accept(VALIDATOR, job_id, "A", &[WORKER]).await, Disposition::Accepted);

    let allocation = task.await.unwrap().unwrap();
    assert_eq!(allocation.job_id, job_id);
    assert_eq!(allocation.modules.len(), 1);
    assert_eq!(allocation.modules["A"].descriptor.workers, vec![WORKER]);
    assert!(allocation.unallocated_modules().is_empty());

    let job = h.node.jobs.get(&job_id).await.unwrap();
    assert!(job.active);
    assert_eq!(job.capacity, 4);
    assert_eq!(job.workers[0].get(&WORKER).map(String::as_str), Some("A"));
    assert_eq!(h.node.ledger.total(), 0);
}

#[tokio::test]
async fn local_modules_are_never_announced() {
    let mut h = Harness::single_validator();
    h.substrate.allow_connect(WORKER);

    let task = submit(&h, 2, mixed_modules());
    let (_, announced) = h.next_sent().await;
    let Message::JobRequest(job) = announced else {
        panic!("expected JOB-REQ");
    };
    assert_eq!(job.distribution.keys().collect::<Vec<_>>(), vec!["A"]);
    assert_eq!(job.capacity, 8);
    assert_eq!(job.n_workers, 2);

    h.accept(VALIDATOR, job.id, "A", &[WORKER]).await;
    let allocation = task.await.unwrap().unwrap();
    assert!(!allocation.modules.contains_key("L"));
}

#[tokio::test]
async fn status_update_follows_successful_binding() {
    let mut h = Harness::single_validator();
    h.substrate.allow_connect(WORKER);

    let task = submit(&h, 1, one_module(4));
    let job_id = h.expect_job_request(VALIDATOR).await;
    h.accept(VALIDATOR, job_id, "A", &[WORKER]).await;
    task.await.unwrap().unwrap();

    match h.next_sent().await {
        (to, Message::JobUpdate(job)) => {
            assert_eq!(to, VALIDATOR);
            assert_eq!(job.id, job_id);
            assert!(job.active);
            assert_eq!(job.distribution["A"].workers, vec![WORKER]);
        }
        (_, other) => panic!("expected JOB-UPDATE, got {:?}", other.tag()),
    }
}

#[tokio::test]
async fn unreachable_worker_leaves_module_unallocated() {
    let mut h = Harness::single_validator();
    // WORKER is never made connectable.

    let task = submit(&h, 1, one_module(4));
    let job_id = h.expect_job_request(VALIDATOR).await;
    h.accept(VALIDATOR, job_id, "A", &[WORKER]).await;

    let allocation = task.await.unwrap().unwrap();
    assert_eq!(allocation.unallocated_modules(), vec!["A"]);
    assert_eq!(allocation.worker_count(), 0);
    // The announcement still resolved.
    assert_eq!(h.node.ledger.total(), 0);
}

#[tokio::test]
async fn workers_fill_pipeline_slots_in_order() {
    let mut h = Harness::single_validator();
    let second = NodeId([0x0d; 32]);
    h.substrate.allow_connect(WORKER);
    h.substrate.allow_connect(second);

    let task = submit(&h, 2, one_module(4));
    let job_id = h.expect_job_request(VALIDATOR).await;
    h.accept(VALIDATOR, job_id, "A", &[WORKER, second]).await;
    task.await.unwrap().unwrap();

    let job = h.node.jobs.get(&job_id).await.unwrap();
    assert!(job.workers[0].contains_key(&WORKER));
    assert!(job.workers[1].contains_key(&second));
    assert_eq!(job.bound_workers(), 2);
}

#[tokio::test]
async fn rejected_requests_never_reach_a_validator() {
    let mut h = Harness::single_validator();

    let zero = submit(&h, 0, one_module(4)).await.unwrap();
    assert!(matches!(zero, Err(OrchestrationError::InvalidRequest(_))));

    let mut local_only = DistributionSpec::new();
    local_only.insert("L".to_string(), ModuleDescriptor::new(ModuleType::Local, 1));
    let none = submit(&h, 1, local_only).await.unwrap();
    assert!(matches!(none, Err(OrchestrationError::InvalidRequest(_))));

    assert!(h.drain_sent().is_empty());
    assert_eq!(h.node.jobs.len().await, 0);
}

#[tokio::test]
async fn oversized_requests_are_rejected() {
    let mut h = Harness::single_validator();

    for (n_pipelines, dp_factor) in [(u32::MAX, 1), (1, u32::MAX), (1, 0)] {
        let orchestrator = h.node.orchestrator.clone();
        let result = orchestrator.submit_job(n_pipelines, dp_factor, one_module(4)).await;
        assert!(matches!(result, Err(OrchestrationError::InvalidRequest(_))));
    }

    assert!(h.drain_sent().is_empty());
    assert_eq!(h.node.jobs.len().await, 0);
}

#[tokio::test]
async fn job_request_through_command_loop() {
    let mut h = Harness::single_validator();
    h.substrate.allow_connect(WORKER);

    let (commands, rx) = hive_services::command_channel(8);
    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
    let processor = tokio::spawn(h.node.command_processor().run(rx, shutdown_rx));

    let request = tokio::spawn(async move {
        commands
            .request(Command::RequestJob {
                n_pipelines: 1,
                dp_factor: 1,
                distribution: one_module(4),
            })
            .await
    });

    let job_id = h.expect_job_request(VALIDATOR).await;
    h.accept(VALIDATOR, job_id, "A", &[WORKER]).await;

    let response = request.await.unwrap().unwrap();
    assert!(response.is_success());
    assert_eq!(response.ret["job_id"], serde_json::json!(job_id.to_string()));
    assert_eq!(
        response.ret["modules"]["A"]["workers"],
        serde_json::json!([WORKER.to_string()])
    );

    shutdown_tx.send(()).unwrap();
    processor.await.unwrap();
}
