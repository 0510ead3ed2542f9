//! Property-based tests for descriptor lifecycle and status invariants.

use std::collections::BTreeMap;

use proptest::prelude::*;
use tagmux::{
    Config, CtlCommand, CtlOutcome, Permission, TagCommand, TagError, TagExchange,
    ANONYMOUS_KEY,
};

const EUID: u32 = 1000;

fn small_exchange() -> TagExchange {
    TagExchange::new(Config::new(8, 2, 32))
}

proptest! {
    /// Anonymous creates yield distinct descriptors inside the descriptor
    /// space, none of them reachable by key.
    #[test]
    fn prop_anonymous_descriptors_distinct(count in 1usize..8) {
        let ex = small_exchange();
        let mut seen = std::collections::HashSet::new();

        for _ in 0..count {
            let d = ex
                .tag_get(ANONYMOUS_KEY, TagCommand::Create, Permission::Any, EUID)
                .unwrap();
            prop_assert!(d < 8, "descriptor {} outside the space", d);
            prop_assert!(seen.insert(d), "descriptor {} handed out twice", d);
        }

        prop_assert_eq!(ex.live_tags(), count);
        prop_assert_eq!(
            ex.tag_get(ANONYMOUS_KEY, TagCommand::Open, Permission::Any, EUID),
            Err(TagError::Invalid)
        );
    }

    /// The live-tag population never exceeds capacity; creation past the
    /// bound fails with `Capacity` and changes nothing.
    #[test]
    fn prop_capacity_bound(extra in 1usize..8) {
        let ex = small_exchange();
        for key in 1..=8 {
            ex.tag_get(key, TagCommand::Create, Permission::Any, EUID).unwrap();
        }

        for key in 100..100 + extra as i32 {
            prop_assert_eq!(
                ex.tag_get(key, TagCommand::Create, Permission::Any, EUID),
                Err(TagError::Capacity)
            );
        }
        prop_assert_eq!(ex.live_tags(), 8);
    }

    /// A random interleaving of creates and deletes matches a model map:
    /// every create/delete pair restores the prior live-tag set, and open
    /// agrees with the model at every step.
    #[test]
    fn prop_create_delete_tracks_model(ops in prop::collection::vec((1i32..6, prop::bool::ANY), 1..40)) {
        let ex = small_exchange();
        let mut model: BTreeMap<i32, usize> = BTreeMap::new();

        for (key, create) in ops {
            if create {
                match ex.tag_get(key, TagCommand::Create, Permission::Any, EUID) {
                    Ok(d) => {
                        prop_assert!(!model.contains_key(&key));
                        model.insert(key, d);
                    }
                    Err(TagError::Busy) => prop_assert!(model.contains_key(&key)),
                    Err(other) => prop_assert!(false, "unexpected create error: {other}"),
                }
            } else if let Some(d) = model.remove(&key) {
                prop_assert_eq!(ex.tag_ctl(d, CtlCommand::Delete, EUID), Ok(CtlOutcome::Done));
            }

            prop_assert_eq!(ex.live_tags(), model.len());
            for (k, d) in &model {
                prop_assert_eq!(
                    ex.tag_get(*k, TagCommand::Open, Permission::Any, EUID),
                    Ok(*d)
                );
            }
        }
    }

    /// Descriptors are handed out lowest-free-first.
    #[test]
    fn prop_lowest_free_descriptor(removals in prop::collection::btree_set(0usize..8, 1..8)) {
        let ex = small_exchange();
        for key in 1..=8 {
            let d = ex.tag_get(key, TagCommand::Create, Permission::Any, EUID).unwrap();
            prop_assert_eq!(d, (key - 1) as usize);
        }

        for &d in &removals {
            prop_assert_eq!(ex.tag_ctl(d, CtlCommand::Delete, EUID), Ok(CtlOutcome::Done));
        }

        // the next create must take the lowest freed descriptor
        let lowest = *removals.iter().next().unwrap();
        prop_assert_eq!(
            ex.tag_get(50, TagCommand::Create, Permission::Any, EUID),
            Ok(lowest)
        );
    }

    /// Offset reads reassemble the status report byte-for-byte regardless
    /// of chunk size.
    #[test]
    fn prop_status_chunked_reads(chunk in 1usize..64, keys in prop::collection::btree_set(1i32..20, 0..5)) {
        let ex = TagExchange::new(Config::new(32, 2, 32));
        for key in &keys {
            ex.tag_get(*key, TagCommand::Create, Permission::Any, EUID).unwrap();
        }

        let full = ex.status_report();
        let mut assembled = Vec::new();
        let mut buf = vec![0u8; chunk];
        let mut offset = 0;
        loop {
            let n = ex.read_status(offset, &mut buf);
            if n == 0 {
                break;
            }
            assembled.extend_from_slice(&buf[..n]);
            offset += n;
        }

        prop_assert_eq!(assembled, full.into_bytes());
    }
}
