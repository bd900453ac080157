//! Property tests for the fold, store and query invariants.

use autopsy::aggregator::{fold, reduce, Dashboard};
use autopsy::correlate::{find_by_signature, signature};
use autopsy::query::CallStack;
use autopsy::report::{CallSiteKey, DashboardPayload, NewEntry, ReportStore};
use autopsy::stack::{StackFrame, StackTrace};
use autopsy::{QueryResult, Value};
use proptest::prelude::*;

fn payload() -> impl Strategy<Value = DashboardPayload> {
    prop_oneof![
        (0i64..4).prop_map(|v| DashboardPayload::Count { value: Value::Int(v) }),
        prop_oneof![
            (-1e6f64..1e6).boxed(),
            Just(f64::NAN).boxed(),
            Just(f64::INFINITY).boxed(),
        ]
        .prop_map(|value| DashboardPayload::Histogram { value }),
        ((0u8..3), (0.0f64..10.0)).prop_map(|(e, t)| DashboardPayload::Timeline {
            event_name: format!("event{}", e),
            // Coarse timestamps so ties are common
            timestamp: t.floor(),
        }),
        proptest::option::of("[a-c]").prop_map(|message| DashboardPayload::Occurrence { message }),
    ]
}

/// Each kind lives on its own lines so sites never mix kinds
fn site_for(payload: &DashboardPayload, slot: u32) -> CallSiteKey {
    let base = match payload {
        DashboardPayload::Count { .. } => 10,
        DashboardPayload::Histogram { .. } => 20,
        DashboardPayload::Timeline { .. } => 30,
        DashboardPayload::Occurrence { .. } => 40,
    };
    CallSiteKey::new("src/prop.rs", base + slot)
}

fn build(observations: &[(u32, DashboardPayload)]) -> ReportStore {
    let mut store = ReportStore::new();
    for (slot, payload) in observations {
        store
            .append(site_for(payload, *slot), NewEntry::dashboard("f", payload.clone()))
            .unwrap();
    }
    store
}

proptest! {
    #[test]
    fn prop_incremental_fold_equals_batch_reduce(
        observations in prop::collection::vec((0u32..3, payload()), 0..60)
    ) {
        let store = build(&observations);

        let batch = reduce(store.entries());
        let folded = store
            .entries()
            .fold(Dashboard::new(), |d, (site, group)| fold(d, site, group));

        prop_assert_eq!(&batch, store.dashboard());
        prop_assert_eq!(&folded, store.dashboard());
        prop_assert_eq!(batch.observation_count(), store.len() as u64);
    }

    #[test]
    fn prop_log_indices_are_dense_and_stable(
        observations in prop::collection::vec((0u32..3, payload()), 1..40)
    ) {
        let mut store = ReportStore::new();
        let mut seen = Vec::new();
        for (i, (slot, payload)) in observations.iter().enumerate() {
            let idx = store
                .append(site_for(payload, *slot), NewEntry::dashboard("f", payload.clone()))
                .unwrap();
            prop_assert_eq!(idx, i as u64);

            let (_, group) = store.value_group(idx).unwrap();
            seen.push(group.clone());
        }

        for group in &seen {
            let (_, stored) = store.value_group(group.log_index).unwrap();
            prop_assert_eq!(stored, group);
        }
        let order: Vec<u64> = store.entries().map(|(_, g)| g.log_index).collect();
        prop_assert_eq!(order, (0..observations.len() as u64).collect::<Vec<_>>());
    }

    #[test]
    fn prop_snapshot_rebuild_equals_original(
        observations in prop::collection::vec((0u32..3, payload()), 0..40)
    ) {
        let store = build(&observations);
        let mut target = build(&observations[..observations.len() / 2]);

        target.merge_snapshot(store.to_document()).unwrap();
        prop_assert_eq!(target, store);
    }

    #[test]
    fn prop_query_chains_never_panic(
        depth in 0usize..4,
        steps in prop::collection::vec(0u8..3, 0..8),
        target in 0usize..6,
    ) {
        let frames = (0..depth)
            .map(|i| StackFrame::new("src/q.rs", format!("f{}", i), i as u32 + 1).with_variable("x", i))
            .collect();
        let stack = CallStack::new(StackTrace::new(frames));

        let mut result = stack.frame(target);
        let first_error = result.clone().err();
        for step in &steps {
            result = match step {
                0 => result.caller(),
                1 => result.and_then(|f| if f.index() % 2 == 0 { QueryResult::Ok(f) } else { f.caller() }),
                _ => result.map(|f| f),
            };
        }
        let value = result.variable("x");

        if let Some(first) = first_error {
            prop_assert_eq!(value.error(), &first);
        }
        if let QueryResult::Ok(frame) = &result {
            prop_assert_eq!(value, QueryResult::Ok(Value::from(frame.index())));
        }
    }

    #[test]
    fn prop_signature_round_trips(
        observations in prop::collection::vec((0u32..3, payload()), 1..30),
        pick in any::<prop::sample::Index>(),
    ) {
        let store = build(&observations);
        let idx = pick.index(observations.len()) as u64;
        let sig = signature(&store, idx).unwrap();
        prop_assert_eq!(find_by_signature(&store, &sig), Some(idx));
    }
}
