#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

mod common;

use std::error::Error as _;
use std::sync::Arc;

use coproguard_core::{ErrorKind, InvocationState, PluginError, PluginResult};
use coproguard_runtime::obs::{GuardMetrics, MetricsSink};
use coproguard_runtime::policy::{LoggingPolicy, MetricsPolicy, NoBypassOrCompletePolicy};
use coproguard_runtime::policy::no_bypass::MUTUALLY_EXCLUSIVE_REASON;
use coproguard_runtime::PolicyVerifierAdapter;

use common::{fresh_ctx, PluginBroke};

fn guard() -> PolicyVerifierAdapter<()> {
    PolicyVerifierAdapter::builder()
        .adaptee(Arc::new(()))
        .policy(LoggingPolicy::new())
        .policy(NoBypassOrCompletePolicy::new())
        .build()
        .unwrap()
}

#[tokio::test]
async fn plugin_error_is_wrapped_with_its_cause() {
    let ctx = fresh_ctx();
    let err = guard()
        .run_with_policies("start", &ctx, |_| async {
            Err::<(), PluginError>(Box::new(PluginBroke("region offline".into())))
        })
        .await
        .expect_err("failure");

    assert_eq!(err.kind(), ErrorKind::AdapteeFailure);
    assert_eq!(err.operation(), Some("start"));
    let cause = err.cause().expect("cause attached");
    assert!(!cause.is_panic());
    let original = cause.downcast_ref::<PluginBroke>().expect("original type kept");
    assert_eq!(original.0, "region offline");
    assert!(err.source().is_some());
    assert_eq!(ctx.state(), InvocationState::Done);
}

#[tokio::test]
async fn async_panic_becomes_adaptee_failure() {
    let err = guard()
        .run_with_policies("start", &fresh_ctx(), |_| async {
            if true {
                panic!("plugin bug");
            }
            Ok::<_, PluginError>(())
        })
        .await
        .expect_err("panic contained");

    assert_eq!(err.kind(), ErrorKind::AdapteeFailure);
    let cause = err.cause().unwrap();
    assert!(cause.is_panic());
    assert!(cause.to_string().contains("plugin bug"));
}

#[tokio::test]
async fn blocking_panic_becomes_adaptee_failure() {
    let err = guard()
        .run_blocking_with_policies("stop", &fresh_ctx(), |_| -> Result<(), PluginError> {
            panic!("blocking plugin bug {}", 7)
        })
        .await
        .expect_err("panic contained");

    assert_eq!(err.kind(), ErrorKind::AdapteeFailure);
    assert!(err.cause().unwrap().to_string().contains("blocking plugin bug 7"));
}

#[tokio::test]
async fn bypass_and_complete_together_are_rejected() {
    let ctx = fresh_ctx();
    let err = guard()
        .run_with_policies("pre_put", &ctx, |ctx| async move {
            ctx.set_bypass();
            ctx.set_complete();
            Ok::<_, PluginError>(42)
        })
        .await
        .expect_err("mutually exclusive");

    assert_eq!(err.kind(), ErrorKind::PolicyRejected);
    assert_eq!(err.policy_name(), Some("no_bypass_or_complete"));
    assert!(err.to_string().contains(MUTUALLY_EXCLUSIVE_REASON));
    assert!(ctx.bypass() && ctx.complete());
    assert_eq!(ctx.state(), InvocationState::Done);
}

#[tokio::test]
async fn a_single_completion_signal_is_fine() {
    for set_bypass in [true, false] {
        let ctx = fresh_ctx();
        let out = guard()
            .run_with_policies("pre_put", &ctx, move |ctx| async move {
                if set_bypass {
                    ctx.set_bypass();
                } else {
                    ctx.set_complete();
                }
                Ok::<_, PluginError>(set_bypass)
            })
            .await
            .expect("one flag only");

        assert_eq!(out, set_bypass);
        assert_eq!(ctx.bypass(), set_bypass);
        assert_eq!(ctx.complete(), !set_bypass);
    }
}

#[tokio::test]
async fn both_flags_on_a_failed_call_keep_the_failure() {
    let err = guard()
        .run_with_policies("pre_put", &fresh_ctx(), |ctx| async move {
            ctx.set_bypass();
            ctx.set_complete();
            Err::<(), PluginError>("write failed".into())
        })
        .await
        .expect_err("failure");

    assert_eq!(err.kind(), ErrorKind::AdapteeFailure);
}

#[tokio::test]
async fn panic_while_building_the_future_is_contained_and_counted() {
    let metrics = Arc::new(GuardMetrics::new());
    let guard = PolicyVerifierAdapter::builder()
        .adaptee(Arc::new(()))
        .policy(LoggingPolicy::new())
        .policy(MetricsPolicy::new(
            Arc::clone(&metrics) as Arc<dyn MetricsSink>,
            "Coprocessors",
        ))
        .build()
        .unwrap();

    let ctx = fresh_ctx();
    let caller = {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            guard
                .run_with_policies(
                    "start",
                    &ctx,
                    |_| -> std::future::Ready<PluginResult<()>> {
                        panic!("plugin factory exploded")
                    },
                )
                .await
        })
    };
    let err = caller
        .await
        .expect("caller task must not see the panic")
        .expect_err("failure");

    assert_eq!(err.kind(), ErrorKind::AdapteeFailure);
    let cause = err.cause().unwrap();
    assert!(cause.is_panic());
    assert!(cause.to_string().contains("plugin factory exploded"));
    assert_eq!(ctx.state(), InvocationState::Done);

    let stats = metrics.operation_stats("Coprocessors", "start");
    assert_eq!(stats.failure, 1);
    assert_eq!(stats.total(), 1);
}
