use crate::*;
use hive_services::OrchestrationError;

/// Silence from the validator: exactly `max_attempts` JOB-REQ sends, then
/// the request fails and nothing stays pending.
#[tokio::test(start_paused = true)]
async fn silent_validator_gets_bounded_retries() {
    let mut h = Harness::new(&[VALIDATOR], quick_liaison(3));

    let orchestrator = h.node.orchestrator.clone();
    let result = orchestrator.submit_job(1, 1, one_module(4)).await;

    match result {
        Err(OrchestrationError::AnnounceExhausted {
            validator,
            attempts,
            last_decline,
            ..
        }) => {
            assert_eq!(validator, VALIDATOR);
            assert_eq!(attempts, 3);
            assert!(last_decline.is_none());
        }
        other => panic!("expected exhaustion, got {other:?}"),
    }

    let sent = h.drain_sent();
    assert_eq!(tags(&sent), vec![Tag::JobRequest; 3]);
    assert!(sent.iter().all(|(to, _)| *to == VALIDATOR));
    assert_eq!(h.node.ledger.total(), 0);
    // A failed announcement sends no status update.
    assert!(!tags(&sent).contains(&Tag::JobUpdate));
}

#[tokio::test(start_paused = true)]
async fn retries_resend_the_same_job() {
    let mut h = Harness::new(&[VALIDATOR], quick_liaison(2));

    let orchestrator = h.node.orchestrator.clone();
    let task = tokio::spawn(async move { orchestrator.submit_job(1, 1, one_module(4)).await });

    let first = h.expect_job_request(VALIDATOR).await;
    // Let the first attempt time out, then answer the second.
    let second = h.expect_job_request(VALIDATOR).await;
    assert_eq!(first, second);

    h.substrate.allow_connect(WORKER);
    h.accept(VALIDATOR, second, "A", &[WORKER]).await;
    let allocation = task.await.unwrap().unwrap();
    assert_eq!(allocation.modules["A"].descriptor.workers, vec![WORKER]);
}

/// A decline from the seed validator is recorded but does not end the wait;
/// the reason is reported once retries run out.
#[tokio::test(start_paused = true)]
async fn decline_keeps_job_pending_and_surfaces_reason() {
    let mut h = Harness::new(&[VALIDATOR], quick_liaison(1));

    let orchestrator = h.node.orchestrator.clone();
    let task = tokio::spawn(async move { orchestrator.submit_job(1, 1, one_module(4)).await });

    let job_id = h.expect_job_request(VALIDATOR).await;
    let declined = h
        .deliver(
            VALIDATOR,
            Message::DeclineJob {
                reason: "no capacity".to_string(),
            },
        )
        .await;
    assert_eq!(declined, Disposition::Declined);
    assert!(h.node.ledger.is_pending(&VALIDATOR, &job_id));
    assert_eq!(h.node.reputation.ghosts(&VALIDATOR), 0);

    match task.await.unwrap() {
        Err(OrchestrationError::AnnounceExhausted { last_decline, .. }) => {
            assert_eq!(last_decline.as_deref(), Some("no capacity"));
        }
        other => panic!("expected exhaustion, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn decline_after_decline_then_accept_succeeds() {
    let mut h = Harness::new(&[VALIDATOR], quick_liaison(3));
    h.substrate.allow_connect(WORKER);

    let orchestrator = h.node.orchestrator.clone();
    let task = tokio::spawn(async move { orchestrator.submit_job(1, 1, one_module(4)).await });

    let job_id = h.expect_job_request(VALIDATOR).await;
    let busy = Message::DeclineJob {
        reason: "busy".to_string(),
    };
    assert_eq!(h.deliver(VALIDATOR, busy).await, Disposition::Declined);

    // Retry comes in; this time the validator accepts.
    assert_eq!(h.expect_job_request(VALIDATOR).await, job_id);
    h.accept(VALIDATOR, job_id, "A", &[WORKER]).await;

    assert!(task.await.unwrap().is_ok());
    assert!(h.node.ledger.last_decline(&job_id).is_none());
}

/// Accept and decline are not symmetric: only a seed validator of the job
/// may send either, anything else is a ghost.
#[tokio::test]
async fn accept_from_non_seed_peer_is_a_ghost() {
    let mut h = Harness::new(&[VALIDATOR], quick_liaison(3));
    h.substrate.allow_connect(WORKER);

    let orchestrator = h.node.orchestrator.clone();
    let task = tokio::spawn(async move { orchestrator.submit_job(1, 1, one_module(4)).await });
    let job_id = h.expect_job_request(VALIDATOR).await;

    assert_eq!(h.accept(STRANGER, job_id, "A", &[WORKER]).await, Disposition::Ghost);
    assert_eq!(h.node.reputation.ghosts(&STRANGER), 1);
    assert!(h.node.ledger.is_pending(&VALIDATOR, &job_id));

    let decline = Message::DeclineJob {
        reason: "not yours".to_string(),
    };
    assert_eq!(h.deliver(STRANGER, decline).await, Disposition::Ghost);
    assert_eq!(h.node.reputation.ghosts(&STRANGER), 2);
    assert!(h.node.ledger.last_decline(&job_id).is_none());

    h.accept(VALIDATOR, job_id, "A", &[WORKER]).await;
    assert!(task.await.unwrap().is_ok());
}

#[tokio::test]
async fn accept_for_unknown_job_is_a_ghost() {
    let h = Harness::single_validator();
    let unknown = JobId([0x77; 32]);

    assert_eq!(h.accept(VALIDATOR, unknown, "A", &[WORKER]).await, Disposition::Ghost);
    assert_eq!(h.node.reputation.ghosts(&VALIDATOR), 1);
}

#[tokio::test(start_paused = true)]
async fn late_accept_after_exhaustion_binds_nothing() {
    let mut h = Harness::new(&[VALIDATOR], quick_liaison(1));
    h.substrate.allow_connect(WORKER);

    let orchestrator = h.node.orchestrator.clone();
    let task = tokio::spawn(async move { orchestrator.submit_job(1, 1, one_module(4)).await });
    let job_id = h.expect_job_request(VALIDATOR).await;
    assert!(task.await.unwrap().is_err());

    // Still a seed validator of a known job, so not a ghost, but the
    // binding finds nothing pending.
    assert_eq!(h.accept(VALIDATOR, job_id, "A", &[WORKER]).await, Disposition::Accepted);
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(h.node.reputation.ghosts(&VALIDATOR), 0);
    // The failed job's module entries are gone, nothing was bound.
    assert!(h.node.jobs.module(&job_id, "A").is_none());
    let job = h.node.jobs.get(&job_id).await.unwrap();
    assert!(!job.active);
    assert_eq!(job.bound_workers(), 0);
}

/// A second accept arriving while the first binding is still dialling is
/// ignored, and the announcement waits for the slow binding rather than
/// timing out or re-sending.
#[tokio::test(start_paused = true)]
async fn repeated_accept_during_slow_binding_binds_once() {
    let mut h = Harness::new(&[VALIDATOR], quick_liaison(1));
    let second = NodeId([0x0d; 32]);
    h.substrate.allow_connect(WORKER);
    h.substrate.allow_connect(second);

    let orchestrator = h.node.orchestrator.clone();
    let task = tokio::spawn(async move { orchestrator.submit_job(1, 1, one_module(4)).await });
    let job_id = h.expect_job_request(VALIDATOR).await;

    // Dialling both workers takes longer than one attempt.
    h.substrate.set_dial_delay(h.node.orchestrator.liaison().settings().attempt_timeout);
    assert_eq!(h.accept(VALIDATOR, job_id, "A", &[WORKER, second]).await, Disposition::Accepted);
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(h.accept(VALIDATOR, job_id, "A", &[WORKER, second]).await, Disposition::Accepted);

    let allocation = task.await.unwrap().unwrap();
    assert_eq!(allocation.modules["A"].descriptor.workers, vec![WORKER, second]);
    let job = h.node.jobs.get(&job_id).await.unwrap();
    assert_eq!(job.bound_workers(), 2);
    assert_eq!(h.node.reputation.ghosts(&VALIDATOR), 0);

    // One JOB-REQ, then the status update.
    assert_eq!(tags(&h.drain_sent()), vec![Tag::JobUpdate]);
}
