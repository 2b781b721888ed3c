use std::sync::Arc;

use proptest::prelude::*;
use relaybyte_engine::statistics::report::keys;
use relaybyte_engine::{Communication, TaskGroupRegistry};
use relaybyte_types::RunState;

fn state() -> impl Strategy<Value = RunState> {
    prop_oneof![
        Just(RunState::Running),
        Just(RunState::Succeeded),
        Just(RunState::Failed),
        Just(RunState::Killed),
    ]
}

fn communication(state: RunState, records: i64, bytes: i64, messages: &[String]) -> Communication {
    let comm = Communication::with_state(state);
    comm.set_long_counter(keys::READ_SUCCEED_RECORDS, records);
    comm.set_long_counter(keys::READ_SUCCEED_BYTES, bytes);
    for m in messages {
        comm.add_message("note", m.clone());
    }
    comm
}

proptest! {
    #[test]
    fn state_merge_is_commutative_and_associative(a in state(), b in state(), c in state()) {
        prop_assert_eq!(a.merge(b), b.merge(a));
        prop_assert_eq!(a.merge(b).merge(c), a.merge(b.merge(c)));
        prop_assert_ne!(a.merge(b), RunState::Killed);
    }

    #[test]
    fn counter_merge_sums_in_any_order(
        parts in prop::collection::vec((state(), 0_i64..1_000_000, 0_i64..1_000_000), 1..8)
    ) {
        let forward = Communication::with_state(RunState::Succeeded);
        let backward = Communication::with_state(RunState::Succeeded);
        let comms: Vec<Communication> = parts
            .iter()
            .map(|&(s, r, b)| communication(s, r, b, &[]))
            .collect();
        for c in &comms {
            forward.merge_from(c);
        }
        for c in comms.iter().rev() {
            backward.merge_from(c);
        }

        let records: i64 = parts.iter().map(|p| p.1).sum();
        let bytes: i64 = parts.iter().map(|p| p.2).sum();
        prop_assert_eq!(forward.long_counter(keys::READ_SUCCEED_RECORDS), records);
        prop_assert_eq!(backward.long_counter(keys::READ_SUCCEED_BYTES), bytes);
        prop_assert_eq!(forward.state(), backward.state());
        prop_assert_eq!(forward.counters(), backward.counters());

        let any_failure = parts.iter().any(|p| p.0.is_failure());
        prop_assert_eq!(forward.state().is_failure(), any_failure);
    }

    #[test]
    fn job_view_folds_every_group(
        groups in prop::collection::vec((state(), 0_i64..10_000, prop::collection::vec("[a-z]{1,6}", 0..3)), 0..6)
    ) {
        let registry = TaskGroupRegistry::new();
        for (id, (s, r, notes)) in groups.iter().enumerate() {
            let id = u32::try_from(id).unwrap();
            registry.register(id, Arc::new(communication(*s, *r, 0, notes)));
        }
        let job = registry.job_communication();

        let expected_records: i64 = groups.iter().map(|g| g.1).sum();
        let expected_notes: usize = groups.iter().map(|g| g.2.len()).sum();
        let expected_state = groups
            .iter()
            .fold(RunState::Succeeded, |acc, g| acc.merge(g.0));
        prop_assert_eq!(job.long_counter(keys::READ_SUCCEED_RECORDS), expected_records);
        prop_assert_eq!(job.message("note").len(), expected_notes);
        prop_assert_eq!(job.state(), expected_state);
    }
}
