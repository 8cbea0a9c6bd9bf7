mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{Harness, observer};
use dojo_sim::{NoOpObserver, RunStatus, SimulatorError, driver::wait_for_status};
use tokio::time::sleep;

#[tokio::test(start_paused = true)]
async fn cancel_stops_future_progress() {
    let h = Harness::new();
    let run = h.client.submit("repo-1").await.unwrap();

    h.driver.start(&run.id, Arc::new(NoOpObserver)).await.unwrap();
    assert!(h.driver.is_active(&run.id));
    assert!(h.driver.cancel(&run.id));
    assert!(!h.driver.cancel(&run.id));

    sleep(Duration::from_secs(60)).await;

    // 已持久化的状态不回滚
    let after = h.client.run(&run.id).await.unwrap().unwrap();
    assert_eq!(after.status, RunStatus::Running);
    assert_eq!(after.current_step, 1);
    assert_eq!(h.client.events(&run.id).await.unwrap().len(), 1);
    assert_eq!(h.driver.active_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancel_mid_flight_keeps_reached_step() {
    let h = Harness::new();
    let run = h.client.submit("repo-1").await.unwrap();

    h.driver.start(&run.id, Arc::new(NoOpObserver)).await.unwrap();
    // 第 2 步在 1.5s 处理，第 3 步要等到 3.5s
    sleep(Duration::from_millis(2000)).await;
    assert!(h.driver.cancel(&run.id));
    sleep(Duration::from_secs(60)).await;

    let after = h.client.run(&run.id).await.unwrap().unwrap();
    assert_eq!(after.current_step, 2);
    assert_eq!(h.client.events(&run.id).await.unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn cancel_all_only_touches_active_runs() {
    let h = Harness::new();
    let r1 = h.client.submit("repo-1").await.unwrap();
    let r2 = h.client.submit("repo-2").await.unwrap();
    let r3 = h.client.submit("repo-3").await.unwrap();

    h.driver.start(&r1.id, Arc::new(NoOpObserver)).await.unwrap();
    h.driver.start(&r2.id, Arc::new(NoOpObserver)).await.unwrap();
    assert_eq!(h.driver.active_count(), 2);

    assert_eq!(h.driver.cancel_all(), 2);
    assert_eq!(h.driver.active_count(), 0);
    assert_eq!(h.driver.metrics().active_runs, 0);

    let untouched = h.client.run(&r3.id).await.unwrap().unwrap();
    assert_eq!(untouched.status, RunStatus::Queued);
}

#[tokio::test(start_paused = true)]
async fn removed_run_stops_silently() {
    let h = Harness::new();
    let run = h.client.submit("repo-1").await.unwrap();

    h.driver.start(&run.id, Arc::new(NoOpObserver)).await.unwrap();
    assert!(h.client.remove(&run.id).await.unwrap());

    sleep(Duration::from_secs(60)).await;

    assert!(h.client.run(&run.id).await.unwrap().is_none());
    assert!(h.client.events(&run.id).await.unwrap().is_empty());
    assert!(!h.driver.is_active(&run.id));
}

#[tokio::test(start_paused = true)]
async fn resume_after_cancel_at_gate_is_allowed() {
    let h = Harness::new();
    let run = h.client.submit("repo-1").await.unwrap();
    let (obs, mut rx) = observer();

    h.driver.start(&run.id, obs.clone()).await.unwrap();
    wait_for_status(&mut rx, &run.id, RunStatus::AwaitingApproval)
        .await
        .unwrap();
    // Gate 处没有挂起的计时器
    assert!(!h.driver.cancel(&run.id));

    h.driver.resume(&run.id, obs.clone()).await.unwrap();
    let err = h.driver.resume(&run.id, obs.clone()).await.unwrap_err();
    assert!(matches!(err, SimulatorError::RunAlreadyActive(_)));

    let done = wait_for_status(&mut rx, &run.id, RunStatus::Completed)
        .await
        .unwrap();
    assert_eq!(done.current_step, 10);
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_everything_and_rejects_new_work() {
    let h = Harness::new();
    let r1 = h.client.submit("repo-1").await.unwrap();
    let r2 = h.client.submit("repo-2").await.unwrap();

    h.driver.start(&r1.id, Arc::new(NoOpObserver)).await.unwrap();
    h.driver.shutdown();

    let err = h
        .driver
        .start(&r2.id, Arc::new(NoOpObserver))
        .await
        .unwrap_err();
    assert!(matches!(err, SimulatorError::DriverShutdown));

    sleep(Duration::from_secs(60)).await;
    let stopped = h.client.run(&r1.id).await.unwrap().unwrap();
    assert_eq!(stopped.current_step, 1);
    assert_eq!(h.driver.active_count(), 0);
}
