#![cfg(test)]

// Property tests for HandleTable kept inside the crate so they can reach
// the private structural layer.

use crate::handle_table::{HandleTable, InsertError};
use crate::types::TypeHandle;
use proptest::prelude::*;

// Operations address a small pool of type slots; `Reload` swaps the slot's
// type for a freshly loaded one, unloading the previous type.
#[derive(Clone, Debug)]
enum Op {
    Reload(usize),
    Insert(usize, i32),
    Remove(usize),
    Find(usize),
    Drain,
}

fn arb_ops(pool: usize) -> impl Strategy<Value = Vec<Op>> {
    let op = prop_oneof![
        (0..pool).prop_map(Op::Reload),
        (0..pool, any::<i32>()).prop_map(|(i, v)| Op::Insert(i, v)),
        (0..pool).prop_map(Op::Remove),
        (0..pool).prop_map(Op::Find),
        Just(Op::Drain),
    ];
    proptest::collection::vec(op, 1..80)
}

struct Slot {
    ty: TypeHandle,
    value: Option<i32>,
}

// Property: state-machine equivalence against a per-slot model.
// Invariants exercised across random operation sequences:
// - Duplicate identities are rejected; `find` hits iff the model has a value.
// - Reloading a slot never lets the new type observe the old type's entry.
// - Unloaded entries stay counted by `len` until drained; draining returns
//   exactly the values of unloaded entries.
// - After a drain, `len` equals the number of loaded entries.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine(ops in arb_ops(4)) {
        let mut sut: HandleTable<i32> = HandleTable::new();
        let mut slots: Vec<Slot> = (0..4)
            .map(|i| Slot { ty: TypeHandle::load(format!("t{i}")), value: None })
            .collect();
        let mut dead: Vec<i32> = Vec::new();

        for op in ops {
            match op {
                Op::Reload(i) => {
                    let old = std::mem::replace(&mut slots[i], Slot {
                        ty: TypeHandle::load(format!("t{i}")),
                        value: None,
                    });
                    if let Some(v) = old.value {
                        dead.push(v);
                    }
                    prop_assert!(sut.find(&slots[i].ty).is_none());
                }
                Op::Insert(i, v) => {
                    let slot = &mut slots[i];
                    match sut.insert(&slot.ty, v) {
                        Ok(h) => {
                            prop_assert!(slot.value.is_none(), "insert must fail on duplicate");
                            prop_assert_eq!(sut.value(h), Some(&v));
                            slot.value = Some(v);
                        }
                        Err(InsertError::DuplicateKey) => {
                            prop_assert!(slot.value.is_some(), "duplicate only when present");
                        }
                    }
                }
                Op::Remove(i) => {
                    let slot = &mut slots[i];
                    let removed = sut.find(&slot.ty).and_then(|h| sut.remove(h)).map(|(_k, v)| v);
                    prop_assert_eq!(removed, slot.value.take());
                }
                Op::Find(i) => {
                    let slot = &slots[i];
                    let found = sut.find(&slot.ty).and_then(|h| sut.value(h)).copied();
                    prop_assert_eq!(found, slot.value);
                }
                Op::Drain => {
                    let mut drained = sut.drain_unloaded();
                    drained.sort_unstable();
                    dead.sort_unstable();
                    prop_assert_eq!(&drained, &dead);
                    dead.clear();
                    let live = slots.iter().filter(|s| s.value.is_some()).count();
                    prop_assert_eq!(sut.len(), live);
                }
            }
            let live = slots.iter().filter(|s| s.value.is_some()).count();
            prop_assert_eq!(sut.len(), live + dead.len());
            prop_assert_eq!(sut.iter_loaded().count(), live);
        }
    }
}
