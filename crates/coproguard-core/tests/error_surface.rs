#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::error::Error as _;
use std::time::Duration;

use coproguard_core::{
    AdapteeCause, ErrorKind, GuardError, InvocationState, Outcome, OutcomeKind, PanicCause,
    PolicyError,
};

#[derive(Debug, thiserror::Error)]
#[error("region {0} is offline")]
struct RegionOffline(u32);

#[test]
fn outcomes_translate_to_one_error_type() {
    assert!(Outcome::Success.into_error("start").is_none());

    let err = Outcome::Timeout {
        bound: Duration::from_secs(2),
    }
    .into_error("start")
    .unwrap();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert_eq!(err.operation(), Some("start"));
    assert!(err.cause().is_none());
    assert!(err.policy_name().is_none());

    let err = Outcome::rejected("no_bypass_or_complete", "both set")
        .into_error("pre_put")
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::PolicyRejected);
    assert_eq!(err.policy_name(), Some("no_bypass_or_complete"));
    assert_eq!(
        err.to_string(),
        "operation `pre_put` rejected by policy `no_bypass_or_complete`: both set"
    );
}

#[test]
fn adaptee_cause_keeps_the_original_error() {
    let cause = AdapteeCause::new(Box::new(RegionOffline(7)));
    let err = Outcome::AdapteeFailure(cause).into_error("stop").unwrap();

    assert_eq!(err.kind(), ErrorKind::AdapteeFailure);
    let cause = err.cause().unwrap();
    assert_eq!(cause.downcast_ref::<RegionOffline>().unwrap().0, 7);
    assert_eq!(err.source().unwrap().to_string(), "region 7 is offline");
    assert!(!cause.is_panic());
}

#[test]
fn panic_payloads_become_readable_causes() {
    let cause = AdapteeCause::from_panic(Box::new("static message"));
    assert!(cause.is_panic());
    assert_eq!(cause.to_string(), "plugin panicked: static message");

    let cause = AdapteeCause::from_panic(Box::new(format!("formatted {}", 3)));
    assert_eq!(cause.downcast_ref::<PanicCause>().unwrap().message, "formatted 3");

    let cause = AdapteeCause::from_panic(Box::new(42u8));
    assert!(cause.to_string().contains("non-string panic payload"));
}

#[test]
fn kinds_have_stable_labels() {
    assert_eq!(ErrorKind::Timeout.as_str(), "TIMEOUT");
    assert_eq!(ErrorKind::AdapteeFailure.as_str(), "ADAPTEE_FAILURE");
    assert_eq!(ErrorKind::PolicyRejected.as_str(), "POLICY_REJECTED");
    assert_eq!(GuardError::Config("x".into()).kind().as_str(), "CONFIG");
    assert_eq!(serde_json::to_string(&ErrorKind::AdapteeFailure).unwrap(), "\"ADAPTEE_FAILURE\"");

    let labels: Vec<&str> = OutcomeKind::ALL.iter().map(|k| k.as_str()).collect();
    assert_eq!(labels, vec!["success", "failure", "timeout", "rejected"]);
    assert_eq!(serde_json::to_string(&OutcomeKind::Timeout).unwrap(), "\"timeout\"");
}

#[test]
fn policy_errors_carry_their_message() {
    assert_eq!(PolicyError::reject("limit reached").to_string(), "rejected: limit reached");
    assert_eq!(
        PolicyError::internal("sink down").to_string(),
        "policy internal error: sink down"
    );
}

#[test]
fn invocation_state_settles_from_outcome() {
    assert_eq!(InvocationState::settled(&Outcome::Success), InvocationState::Success);
    assert_eq!(
        InvocationState::settled(&Outcome::rejected("p", "r")),
        InvocationState::RejectedAfter
    );
    assert_eq!(InvocationState::from_u8(InvocationState::Done as u8), Some(InvocationState::Done));
    assert_eq!(InvocationState::from_u8(10), None);
    assert!(InvocationState::Done.is_terminal());
    assert!(!InvocationState::RunningAfter.is_terminal());
}
