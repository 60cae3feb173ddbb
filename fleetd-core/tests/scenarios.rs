//! End-to-end scenarios (spec.md §8) driven entirely through the RPC
//! [`Dispatcher`], the way a real node agent or `fleetdctl`-style client
//! would exercise the controller over the wire.

use fleetd_config::ControllerConfig;
use fleetd_core::collaborators::{Ed25519CredentialSigner, NullAccountingSink};
use fleetd_core::completion::CompletionOutcome;
use fleetd_core::dispatch::{Dispatcher, Identity, MsgType};
use fleetd_core::error::ControllerError;
use fleetd_core::failover::ControllerRole;
use fleetd_core::model::{JobFlags, JobRequest, JobState, Node, NodeFlags, NodeState, Partition};
use fleetd_core::Controller;
use std::sync::Arc;

type TestController = Controller<NullAccountingSink, Ed25519CredentialSigner>;

async fn cluster(partition: &str, node_names: &[&str], cpus_total: u32) -> Arc<TestController> {
    let controller = Arc::new(Controller::new(
        ControllerConfig::default(),
        Arc::new(NullAccountingSink),
        Arc::new(Ed25519CredentialSigner::new()),
        ControllerRole::Primary,
    ));
    {
        let mut nodes = controller.store.node_write().await;
        for (weight, name) in node_names.iter().enumerate() {
            let mut n = Node::new(name.to_string(), cpus_total, 8192, weight as u32);
            n.partitions.push(partition.to_string());
            n.state = NodeState::Idle;
            n.last_response = Some(fleetd_core::time::now());
            nodes.insert(n);
        }
    }
    {
        let mut partitions = controller.store.partition_write().await;
        partitions.insert(Partition::new(
            partition.to_string(),
            node_names.iter().map(|n| n.to_string()).collect(),
        ));
    }
    controller
}

fn request(partition: &str, min_nodes: u32, max_nodes: u32, cpus_per_task: u32) -> JobRequest {
    JobRequest {
        min_nodes,
        max_nodes,
        cpus_per_task,
        mem_per_cpu_mb: None,
        mem_per_node_mb: None,
        features: vec![],
        gres: vec![],
        partition: partition.to_string(),
        reservation: None,
        time_limit_secs: Some(600),
    }
}

async fn submit(
    dispatcher: &Dispatcher<NullAccountingSink, Ed25519CredentialSigner>,
    owner: &Identity,
    req: JobRequest,
) -> u32 {
    let body = serde_json::to_vec(&fleetd_core::dispatch::requests::JobSubmitRequest {
        request: req,
        batch_script: Some("#!/bin/sh\necho hi\n".to_string()),
        immediate: false,
    })
    .unwrap();
    let resp = dispatcher.dispatch(MsgType::JobSubmit, owner, &body).await.unwrap();
    let submitted: fleetd_core::dispatch::requests::JobSubmitResponse = serde_json::from_slice(&resp).unwrap();
    submitted.job_id
}

/// S1: submit a 2-node batch job into a 4-idle-node partition, walk it all
/// the way through prolog, batch success, and epilog, and confirm both
/// nodes are free again at the end.
#[tokio::test]
async fn s1_submit_run_complete_returns_nodes_to_idle() {
    let controller = cluster("P", &["n1", "n2", "n3", "n4"], 8).await;
    let dispatcher = Dispatcher::new(controller.clone());
    let owner = Identity::user(1000, 1000);
    let agent = Identity::node_agent();

    let job_id = submit(&dispatcher, &owner, request("P", 2, 2, 4)).await;

    let granted_nodes: Vec<String> = {
        let job_table = controller.store.job_read().await;
        let job = job_table.get(job_id).unwrap();
        assert_eq!(job.state, JobState::Running);
        assert!(job.flags.contains(JobFlags::CONFIGURING));
        assert_eq!(job.prolog_pending, 2);
        job.node_bitmap.iter().cloned().collect()
    };
    assert_eq!(granted_nodes.len(), 2);

    for node in &granted_nodes {
        let body = serde_json::to_vec(&fleetd_core::dispatch::requests::PrologCompleteRequest {
            job_id,
            node: node.clone(),
        })
        .unwrap();
        dispatcher.dispatch(MsgType::PrologComplete, &agent, &body).await.unwrap();
    }
    {
        let job_table = controller.store.job_read().await;
        let job = job_table.get(job_id).unwrap();
        assert!(!job.flags.contains(JobFlags::CONFIGURING));
    }

    let batch_body = serde_json::to_vec(&fleetd_core::dispatch::requests::BatchCompleteRequest { job_id, exit_code: 0 }).unwrap();
    let resp = dispatcher.dispatch(MsgType::BatchComplete, &agent, &batch_body).await.unwrap();
    let batch: fleetd_core::dispatch::requests::BatchCompleteResponse = serde_json::from_slice(&resp).unwrap();
    assert_eq!(batch.outcome, CompletionOutcome::Success);
    {
        let job_table = controller.store.job_read().await;
        let job = job_table.get(job_id).unwrap();
        assert_eq!(job.state, JobState::Complete);
        assert!(job.flags.contains(JobFlags::COMPLETING));
    }

    for node in &granted_nodes {
        let body = serde_json::to_vec(&fleetd_core::dispatch::requests::EpilogCompleteRequest {
            job_id,
            node: node.clone(),
            rc: 0,
        })
        .unwrap();
        dispatcher.dispatch(MsgType::EpilogComplete, &agent, &body).await.unwrap();
    }

    let job_table = controller.store.job_read().await;
    let job = job_table.get(job_id).unwrap();
    assert!(job.is_completed());
    assert!(!job.flags.contains(JobFlags::COMPLETING));

    let node_table = controller.store.node_read().await;
    for node in &granted_nodes {
        assert_eq!(node_table.get(node).unwrap().state, NodeState::Idle);
    }
}

/// S2: a batch script that dies to a node-side signal drains its node and
/// requeues the job; once every node's epilog has reported, the job lands
/// back in Pending with restart_cnt incremented.
#[tokio::test]
async fn s2_node_failure_drains_node_and_requeues_job() {
    let controller = cluster("P", &["n1", "n2"], 8).await;
    let dispatcher = Dispatcher::new(controller.clone());
    let owner = Identity::user(1000, 1000);
    let agent = Identity::node_agent();

    let job_id = submit(&dispatcher, &owner, request("P", 2, 2, 4)).await;
    let granted_nodes: Vec<String> = {
        let job_table = controller.store.job_read().await;
        job_table.get(job_id).unwrap().node_bitmap.iter().cloned().collect()
    };

    let batch_body = serde_json::to_vec(&fleetd_core::dispatch::requests::BatchCompleteRequest { job_id, exit_code: -9 }).unwrap();
    let resp = dispatcher.dispatch(MsgType::BatchComplete, &agent, &batch_body).await.unwrap();
    let batch: fleetd_core::dispatch::requests::BatchCompleteResponse = serde_json::from_slice(&resp).unwrap();
    assert_eq!(batch.outcome, CompletionOutcome::DrainNode);

    {
        let node_table = controller.store.node_read().await;
        for node in &granted_nodes {
            assert!(node_table.get(node).unwrap().flags.contains(NodeFlags::DRAIN));
        }
    }
    {
        let job_table = controller.store.job_read().await;
        let job = job_table.get(job_id).unwrap();
        assert_eq!(job.state, JobState::NodeFail);
        assert!(job.is_completing());
        assert_eq!(job.restart_cnt, 0);
    }

    for node in &granted_nodes {
        let body = serde_json::to_vec(&fleetd_core::dispatch::requests::EpilogCompleteRequest {
            job_id,
            node: node.clone(),
            rc: 0,
        })
        .unwrap();
        dispatcher.dispatch(MsgType::EpilogComplete, &agent, &body).await.unwrap();
    }

    let job_table = controller.store.job_read().await;
    let job = job_table.get(job_id).unwrap();
    assert_eq!(job.state, JobState::Pending);
    assert!(!job.is_completing());
    assert_eq!(job.restart_cnt, 1);
}

/// S2b: the batch script itself exits clean, but one node's epilog reports a
/// fatal `rc` — the job must still be requeued and that node drained, purely
/// through the `EpilogComplete` RPC rather than `BatchComplete`'s exit code.
#[tokio::test]
async fn s2b_fatal_epilog_rc_requeues_job_despite_clean_batch_exit() {
    let controller = cluster("P", &["n1", "n2"], 8).await;
    let dispatcher = Dispatcher::new(controller.clone());
    let owner = Identity::user(1000, 1000);
    let agent = Identity::node_agent();

    let job_id = submit(&dispatcher, &owner, request("P", 2, 2, 4)).await;
    let granted_nodes: Vec<String> = {
        let job_table = controller.store.job_read().await;
        job_table.get(job_id).unwrap().node_bitmap.iter().cloned().collect()
    };

    let batch_body = serde_json::to_vec(&fleetd_core::dispatch::requests::BatchCompleteRequest { job_id, exit_code: 0 }).unwrap();
    let resp = dispatcher.dispatch(MsgType::BatchComplete, &agent, &batch_body).await.unwrap();
    let batch: fleetd_core::dispatch::requests::BatchCompleteResponse = serde_json::from_slice(&resp).unwrap();
    assert_eq!(batch.outcome, CompletionOutcome::Success);

    let mut nodes_iter = granted_nodes.iter();
    let failing_node = nodes_iter.next().unwrap();
    let body = serde_json::to_vec(&fleetd_core::dispatch::requests::EpilogCompleteRequest {
        job_id,
        node: failing_node.clone(),
        rc: 1,
    })
    .unwrap();
    dispatcher.dispatch(MsgType::EpilogComplete, &agent, &body).await.unwrap();

    for node in nodes_iter {
        let body = serde_json::to_vec(&fleetd_core::dispatch::requests::EpilogCompleteRequest {
            job_id,
            node: node.clone(),
            rc: 0,
        })
        .unwrap();
        dispatcher.dispatch(MsgType::EpilogComplete, &agent, &body).await.unwrap();
    }

    let job_table = controller.store.job_read().await;
    let job = job_table.get(job_id).unwrap();
    assert_eq!(job.state, JobState::Pending);
    assert_eq!(job.restart_cnt, 1);

    let node_table = controller.store.node_read().await;
    assert!(node_table.get(failing_node).unwrap().flags.contains(NodeFlags::DRAIN));
}

/// S3: the same step-complete range delivered twice must not double-count;
/// the step finalizes on the report that actually empties its pending set
/// and every later duplicate is a harmless no-op.
#[tokio::test]
async fn s3_duplicate_step_complete_is_idempotent() {
    let controller = cluster("P", &["n1", "n2"], 8).await;
    let dispatcher = Dispatcher::new(controller.clone());
    let owner = Identity::user(1000, 1000);
    let agent = Identity::node_agent();

    let job_id = submit(&dispatcher, &owner, request("P", 2, 2, 4)).await;
    for node in ["n1", "n2"] {
        let body = serde_json::to_vec(&fleetd_core::dispatch::requests::PrologCompleteRequest {
            job_id,
            node: node.to_string(),
        })
        .unwrap();
        dispatcher.dispatch(MsgType::PrologComplete, &agent, &body).await.unwrap();
    }

    let create_body = serde_json::to_vec(&fleetd_core::dispatch::requests::StepCreateRequest {
        job_id,
        node_subset: vec!["n1".to_string(), "n2".to_string()],
        cores_per_node: 2,
        mem_limit_mb: None,
    })
    .unwrap();
    let resp = dispatcher.dispatch(MsgType::StepCreate, &owner, &create_body).await.unwrap();
    let created: fleetd_core::dispatch::requests::StepCreateResponse = serde_json::from_slice(&resp).unwrap();

    let complete = |nodes: Vec<String>| {
        serde_json::to_vec(&fleetd_core::dispatch::requests::StepCompleteRequest {
            job_id,
            step_id: created.step_id,
            nodes,
        })
        .unwrap()
    };

    let r1 = dispatcher.dispatch(MsgType::StepComplete, &agent, &complete(vec!["n1".to_string()])).await.unwrap();
    let r1: fleetd_core::dispatch::requests::StepCompleteResponse = serde_json::from_slice(&r1).unwrap();
    assert!(!r1.step_finalized);

    let r2 = dispatcher.dispatch(MsgType::StepComplete, &agent, &complete(vec!["n2".to_string()])).await.unwrap();
    let r2: fleetd_core::dispatch::requests::StepCompleteResponse = serde_json::from_slice(&r2).unwrap();
    assert!(r2.step_finalized);

    // Redelivering the already-cleared n1 range is a no-op: step stays
    // finalized, no error, no further state change.
    let r3 = dispatcher.dispatch(MsgType::StepComplete, &agent, &complete(vec!["n1".to_string()])).await.unwrap();
    let r3: fleetd_core::dispatch::requests::StepCompleteResponse = serde_json::from_slice(&r3).unwrap();
    assert!(r3.step_finalized);
}

/// S4: an immediate allocate against a fully-allocated cluster fails
/// outright and leaves no job record behind.
#[tokio::test]
async fn s4_immediate_allocate_with_no_capacity_keeps_no_job_record() {
    let controller = cluster("P", &["n1"], 4).await;
    let dispatcher = Dispatcher::new(controller.clone());
    let owner = Identity::user(1000, 1000);

    // Saturate the only node first.
    let _ = submit(&dispatcher, &owner, request("P", 1, 1, 4)).await;

    let body = serde_json::to_vec(&fleetd_core::dispatch::requests::JobSubmitRequest {
        request: request("P", 1, 1, 4),
        batch_script: None,
        immediate: true,
    })
    .unwrap();
    let result = dispatcher.dispatch(MsgType::JobSubmit, &owner, &body).await;
    assert!(matches!(result, Err(ControllerError::CanNotStartImmediately)));

    let job_table = controller.store.job_read().await;
    assert_eq!(job_table.iter().count(), 1); // only the first, successful submit
}

/// S5: cancelling a running job moves it to Cancelled with Completing set,
/// queues an outbound kill message for every granted node, and bumps the
/// per-message-type telemetry counter for JobCancel by one.
#[tokio::test]
async fn s5_cancel_propagates_kill_messages_and_telemetry() {
    let controller = cluster("P", &["n1", "n2"], 8).await;
    let rx_n1 = controller.agent_queue.register("n1");
    let rx_n2 = controller.agent_queue.register("n2");
    let dispatcher = Dispatcher::new(controller.clone());
    let owner = Identity::user(1000, 1000);

    let job_id = submit(&dispatcher, &owner, request("P", 2, 2, 4)).await;

    let body = serde_json::to_vec(&fleetd_core::dispatch::requests::JobCancelRequest { job_id }).unwrap();
    let resp = dispatcher.dispatch(MsgType::JobCancel, &owner, &body).await.unwrap();
    let cancelled: fleetd_core::dispatch::requests::JobCancelResponse = serde_json::from_slice(&resp).unwrap();
    assert!(cancelled.cancelled);

    {
        let job_table = controller.store.job_read().await;
        let job = job_table.get(job_id).unwrap();
        assert_eq!(job.state, JobState::Cancelled);
        assert!(job.is_completing());
    }

    let kill_n1 = rx_n1.try_recv().expect("n1 should have received a kill message");
    let parsed: fleetd_core::dispatch::requests::NodeKillRequest = serde_json::from_slice(&kill_n1.payload).unwrap();
    assert_eq!(parsed.job_id, job_id);
    let kill_n2 = rx_n2.try_recv().expect("n2 should have received a kill message");
    let parsed: fleetd_core::dispatch::requests::NodeKillRequest = serde_json::from_slice(&kill_n2.payload).unwrap();
    assert_eq!(parsed.job_id, job_id);

    let by_type = controller.telemetry.dump_by_type();
    let cancel_stat = by_type.iter().find(|(ty, _)| *ty == MsgType::JobCancel).unwrap();
    assert_eq!(cancel_stat.1.count, 1);
}

/// S6: reconfigure under concurrent submit load waits for the config write
/// lock, lets every in-flight submit finish, and kicks the scheduler
/// afterward without losing any job.
#[tokio::test]
async fn s6_reconfigure_under_load_kicks_scheduler_without_losing_jobs() {
    use fleetd_core::admin::AdminOps;

    let controller = cluster("P", &["n1", "n2", "n3", "n4"], 8).await;
    let dispatcher = Arc::new(Dispatcher::new(controller.clone()));

    let mut submits = Vec::new();
    for uid in 0..50u32 {
        let dispatcher = dispatcher.clone();
        submits.push(tokio::spawn(async move {
            let owner = Identity::user(2000 + uid, 2000 + uid);
            submit(&dispatcher, &owner, request("P", 1, 1, 1)).await
        }));
    }

    let reconfigure_controller = controller.clone();
    let reconfigure = tokio::spawn(async move { reconfigure_controller.reconfigure().await });

    let mut job_ids = Vec::new();
    for handle in submits {
        job_ids.push(handle.await.unwrap());
    }
    reconfigure.await.unwrap().unwrap();

    job_ids.sort_unstable();
    job_ids.dedup();
    assert_eq!(job_ids.len(), 50);

    let job_table = controller.store.job_read().await;
    for id in job_ids {
        assert!(job_table.is_live(id));
    }
}

/// `JobUpdate` hold/release round trip: a held pending job is skipped by
/// `kick`, a redundant update is rejected as a no-op, and releasing it lets
/// the next kick start it.
#[tokio::test]
async fn job_update_hold_release_round_trip_through_dispatcher() {
    let controller = cluster("P", &["n1"], 4).await;
    let dispatcher = Dispatcher::new(controller.clone());
    let owner = Identity::user(1000, 1000);

    let busy = submit(&dispatcher, &owner, request("P", 1, 1, 4)).await;
    let waiting = submit(&dispatcher, &owner, request("P", 1, 1, 2)).await;
    {
        let job_table = controller.store.job_read().await;
        assert_eq!(job_table.get(waiting).unwrap().state, JobState::Pending);
    }

    let hold_body = serde_json::to_vec(&fleetd_core::dispatch::requests::JobUpdateRequest {
        job_id: waiting,
        hold: Some(true),
        time_limit_secs: None,
    })
    .unwrap();
    dispatcher.dispatch(MsgType::JobUpdate, &owner, &hold_body).await.unwrap();

    let redundant = dispatcher.dispatch(MsgType::JobUpdate, &owner, &hold_body).await;
    assert!(matches!(redundant, Err(ControllerError::NoChangeInData)));

    let allocate_body = serde_json::to_vec(&fleetd_core::dispatch::requests::JobAllocateRequest { job_id: waiting }).unwrap();
    let result = dispatcher.dispatch(MsgType::JobAllocate, &owner, &allocate_body).await;
    assert!(matches!(result, Err(ControllerError::JobHeld)));

    controller.completion.cancel_job(busy).await.unwrap();
    for node in ["n1"] {
        let body = serde_json::to_vec(&fleetd_core::dispatch::requests::EpilogCompleteRequest {
            job_id: busy,
            node: node.to_string(),
            rc: 0,
        })
        .unwrap();
        dispatcher.dispatch(MsgType::EpilogComplete, &Identity::node_agent(), &body).await.unwrap();
    }

    let release_body = serde_json::to_vec(&fleetd_core::dispatch::requests::JobUpdateRequest {
        job_id: waiting,
        hold: Some(false),
        time_limit_secs: None,
    })
    .unwrap();
    dispatcher.dispatch(MsgType::JobUpdate, &owner, &release_body).await.unwrap();

    let result = dispatcher.dispatch(MsgType::JobAllocate, &owner, &allocate_body).await.unwrap();
    let result: fleetd_core::dispatch::requests::JobAllocateResponse = serde_json::from_slice(&result).unwrap();
    assert!(result.started);
}
