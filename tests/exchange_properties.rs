//! Property tests for the exchange status machine.

use chrono::Duration;
use proptest::prelude::*;

use exchange_broker::domain::exchange::{
    ActionKind, ActionOutcome, ActionResults, Exchange, ExchangeStatus, Party, Terms,
};
use exchange_broker::domain::foundation::{ContactId, LeaseId, ProfileId, Timestamp};

#[derive(Debug, Clone)]
enum Op {
    Propose(Party, u32),
    Agree,
    Attach,
    Execute(bool),
    Verify(bool),
    Complete,
    Fail,
    TimeOut,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (prop_oneof![Just(Party::Us), Just(Party::Them)], 1u32..4).prop_map(|(p, n)| Op::Propose(p, n)),
        Just(Op::Agree),
        Just(Op::Attach),
        any::<bool>().prop_map(Op::Execute),
        any::<bool>().prop_map(Op::Verify),
        Just(Op::Complete),
        Just(Op::Fail),
        Just(Op::TimeOut),
    ]
}

fn results(done: bool) -> ActionResults {
    ActionResults::new([(ActionKind::Like, ActionOutcome::Flag(done))])
}

fn apply(exchange: &mut Exchange, op: &Op, at: Timestamp) {
    // Rejections are expected; only the resulting state matters.
    let _ = match op {
        Op::Propose(party, n) => {
            exchange.propose(*party, Terms::single(ActionKind::Like, *n).unwrap(), at)
        }
        Op::Agree => exchange.agree(at, Duration::hours(24)).map(|_| ()),
        Op::Attach => exchange.attach_profile(ProfileId::new(), LeaseId::new(), at),
        Op::Execute(done) => exchange.record_execution(results(*done), at).map(|_| ()),
        Op::Verify(done) => exchange.record_verification(results(*done), at).map(|_| ()),
        Op::Complete => exchange.complete(at),
        Op::Fail => exchange.fail("operator", at),
        Op::TimeOut => exchange.time_out(at).map(|_| ()),
    };
}

fn is_terminal(status: ExchangeStatus) -> bool {
    matches!(
        status,
        ExchangeStatus::Completed
            | ExchangeStatus::Failed
            | ExchangeStatus::NoResponse
            | ExchangeStatus::PartnerDidNotComplete
    )
}

proptest! {
    #[test]
    fn terminal_exchanges_never_change(ops in prop::collection::vec(op(), 1..40)) {
        let start = Timestamp::from_unix_secs(1_700_000_000);
        let mut exchange = Exchange::open(ContactId::new(), Party::Them, start.plus_secs(3600), start);
        let mut closed: Option<Exchange> = None;

        for (i, op) in ops.iter().enumerate() {
            apply(&mut exchange, op, start.plus_secs(i as u64 + 1));
            match &closed {
                Some(snapshot) => prop_assert_eq!(&exchange, snapshot),
                None if is_terminal(exchange.status()) => {
                    prop_assert!(exchange.closed_at().is_some());
                    closed = Some(exchange.clone());
                }
                None => prop_assert!(exchange.closed_at().is_none()),
            }
        }
    }

    #[test]
    fn terms_exist_once_agreed(ops in prop::collection::vec(op(), 1..40)) {
        let start = Timestamp::from_unix_secs(1_700_000_000);
        let mut exchange = Exchange::open(ContactId::new(), Party::Us, start.plus_secs(3600), start);

        for (i, op) in ops.iter().enumerate() {
            apply(&mut exchange, op, start.plus_secs(i as u64 + 1));
            if exchange.status().is_agreed() {
                prop_assert!(exchange.terms().is_some());
                prop_assert!(exchange.agreed_at().is_some());
            }
        }
    }
}
