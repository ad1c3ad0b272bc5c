#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::time::{sleep, Duration, Instant};

use coproguard_core::{ErrorKind, GuardError, InvocationState, PluginError};
use coproguard_runtime::obs::{GuardMetrics, MetricsSink};
use coproguard_runtime::policy::{
    LoggingPolicy, MetricsPolicy, NoBypassOrCompletePolicy, TimeoutPolicy,
};
use coproguard_runtime::PolicyVerifierAdapter;

use common::fresh_ctx;

fn stock_guard(metrics: &Arc<GuardMetrics>) -> PolicyVerifierAdapter<()> {
    PolicyVerifierAdapter::builder()
        .adaptee(Arc::new(()))
        .policy(TimeoutPolicy::new(Duration::from_secs(2)))
        .policy(LoggingPolicy::new())
        .policy(MetricsPolicy::new(
            Arc::clone(metrics) as Arc<dyn MetricsSink>,
            "Coprocessors",
        ))
        .policy(NoBypassOrCompletePolicy::new())
        .build()
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn slow_action_times_out_at_the_bound() {
    let metrics = Arc::new(GuardMetrics::new());
    let guard = stock_guard(&metrics);
    let finished = Arc::new(AtomicBool::new(false));
    let finished_in_action = Arc::clone(&finished);

    let ctx = fresh_ctx();
    let started = Instant::now();
    let err = guard
        .run_with_policies("start", &ctx, move |_| async move {
            sleep(Duration::from_secs(3)).await;
            finished_in_action.store(true, Ordering::SeqCst);
            Ok::<_, PluginError>(42)
        })
        .await
        .expect_err("must time out");
    let waited = started.elapsed();

    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(matches!(err, GuardError::Timeout { bound, .. } if bound == Duration::from_secs(2)));
    assert!(waited >= Duration::from_secs(2) && waited < Duration::from_secs(3), "waited {waited:?}");
    assert!(ctx.is_cancelled());
    assert_eq!(ctx.state(), InvocationState::Done);

    let stats = metrics.operation_stats("Coprocessors", "start");
    assert_eq!(stats.timeout, 1);
    assert_eq!(stats.success, 0);

    // The detached action still completes in the background; nothing is recorded for it.
    sleep(Duration::from_secs(2)).await;
    assert!(finished.load(Ordering::SeqCst));
    let stats = metrics.operation_stats("Coprocessors", "start");
    assert_eq!(stats.success, 0);
    assert_eq!(stats.total(), 1);
}

#[tokio::test(start_paused = true)]
async fn fast_action_succeeds_under_the_bound() {
    let metrics = Arc::new(GuardMetrics::new());
    let guard = stock_guard(&metrics);

    let out = guard
        .run_with_policies("start", &fresh_ctx(), |_| async {
            sleep(Duration::from_millis(500)).await;
            Ok::<_, PluginError>(42)
        })
        .await
        .expect("within bound");

    assert_eq!(out, 42);
    assert_eq!(metrics.operation_stats("Coprocessors", "start").success, 1);
}

#[tokio::test(start_paused = true)]
async fn tightest_deadline_wins() {
    let guard = PolicyVerifierAdapter::builder()
        .adaptee(Arc::new(()))
        .policy(TimeoutPolicy::new(Duration::from_secs(5)))
        .policy(TimeoutPolicy::from_millis(100))
        .build()
        .unwrap();

    let ctx = fresh_ctx();
    let err = guard
        .run_with_policies("stop", &ctx, |_| async {
            sleep(Duration::from_secs(1)).await;
            Ok::<_, PluginError>(())
        })
        .await
        .expect_err("must time out");

    assert!(matches!(err, GuardError::Timeout { bound, .. } if bound == Duration::from_millis(100)));
    assert_eq!(ctx.deadline(), Some(Duration::from_millis(100)));
}

#[tokio::test(start_paused = true)]
async fn cancellation_is_signalled_to_cooperative_actions() {
    let guard = PolicyVerifierAdapter::builder()
        .adaptee(Arc::new(()))
        .policy(TimeoutPolicy::from_millis(50))
        .build()
        .unwrap();
    let observed = Arc::new(AtomicBool::new(false));
    let observed_in_action = Arc::clone(&observed);

    let err = guard
        .run_with_policies("start", &fresh_ctx(), move |ctx| async move {
            tokio::select! {
                _ = ctx.cancellation().cancelled() => {
                    observed_in_action.store(true, Ordering::SeqCst);
                    Err::<(), PluginError>("cancelled".into())
                }
                _ = sleep(Duration::from_secs(60)) => Ok(()),
            }
        })
        .await
        .expect_err("must time out");

    assert_eq!(err.kind(), ErrorKind::Timeout);
    sleep(Duration::from_millis(1)).await;
    assert!(observed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn blocking_action_times_out_without_waiting_for_it() {
    let guard = PolicyVerifierAdapter::builder()
        .adaptee(Arc::new(()))
        .policy(TimeoutPolicy::from_millis(50))
        .build()
        .unwrap();

    let started = std::time::Instant::now();
    let err = guard
        .run_blocking_with_policies("start", &fresh_ctx(), |_| {
            std::thread::sleep(std::time::Duration::from_millis(400));
            Ok::<_, PluginError>(1)
        })
        .await
        .expect_err("must time out");

    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(started.elapsed() < std::time::Duration::from_millis(350));
}

#[tokio::test]
async fn no_timeout_policy_means_no_deadline() {
    let guard = PolicyVerifierAdapter::builder()
        .adaptee(Arc::new(()))
        .policy(LoggingPolicy::new())
        .build()
        .unwrap();

    let ctx = fresh_ctx();
    let out = guard
        .run_blocking_with_policies("start", &ctx, |_| {
            std::thread::sleep(std::time::Duration::from_millis(20));
            Ok::<_, PluginError>("done")
        })
        .await
        .unwrap();

    assert_eq!(out, "done");
    assert_eq!(ctx.deadline(), None);
}
