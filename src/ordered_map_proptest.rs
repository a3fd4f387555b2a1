#![cfg(test)]

// Property tests for OrderedMap kept inside the crate so they can reach the
// crate-private structural layer.

use crate::error::InsertError;
use crate::fingerprint::{resolve, Fingerprint};
use crate::identity::IdentityRegistry;
use crate::key::{CompositeKey, KeyPart};
use crate::ordered_map::{Handle, OrderedMap};
use proptest::prelude::*;
use std::collections::HashMap;
use std::hash::{BuildHasher, Hasher};

fn fp_of(s: &str) -> Fingerprint {
    resolve(&IdentityRegistry::new(), &[KeyPart::from(s)]).expect("primitives always resolve")
}

fn key_of(s: &str) -> CompositeKey {
    CompositeKey::copy_from(&[KeyPart::from(s)])
}

// Pool-indexed operations to improve shrinking: indices shrink to earlier keys,
// pool length shrinks, and op lists shrink in length.
#[derive(Clone, Debug)]
enum OpI {
    Upsert(usize, i32),
    InsertUnique(usize, i32),
    Remove(usize),
    Find(usize),
    Mutate(usize, i32),
    RetainEven,
    Clear,
    Iterate,
}

fn arb_scenario() -> impl Strategy<Value = (Vec<String>, Vec<OpI>)> {
    proptest::collection::hash_set("[a-z]{0,5}", 1..=8).prop_flat_map(|pool| {
        let pool: Vec<String> = pool.into_iter().collect();
        let idxs: Vec<usize> = (0..pool.len()).collect();
        let idx = proptest::sample::select(idxs);
        let op = prop_oneof![
            4 => (idx.clone(), any::<i32>()).prop_map(|(i, v)| OpI::Upsert(i, v)),
            2 => (idx.clone(), any::<i32>()).prop_map(|(i, v)| OpI::InsertUnique(i, v)),
            2 => idx.clone().prop_map(OpI::Remove),
            2 => idx.clone().prop_map(OpI::Find),
            1 => (idx.clone(), any::<i32>()).prop_map(|(i, d)| OpI::Mutate(i, d)),
            1 => Just(OpI::RetainEven),
            1 => Just(OpI::Clear),
            1 => Just(OpI::Iterate),
        ];
        proptest::collection::vec(op, 1..60).prop_map(move |ops| (pool.clone(), ops))
    })
}

// Model: insertion-ordered Vec of (key, value); overwrites keep position.
fn model_pos(model: &[(String, i32)], k: &str) -> Option<usize> {
    model.iter().position(|(mk, _)| mk == k)
}

fn run_scenario<S: BuildHasher>(
    mut sut: OrderedMap<i32, S>,
    pool: Vec<String>,
    ops: Vec<OpI>,
) -> Result<(), TestCaseError> {
    let mut model: Vec<(String, i32)> = Vec::new();
    let mut live: HashMap<String, Handle> = HashMap::new();
    let mut stale: Vec<Handle> = Vec::new();

    for op in ops {
        match op {
            OpI::Upsert(i, v) => {
                let k = &pool[i];
                let (h, prev) = sut.upsert(fp_of(k), || key_of(k), v);
                match model_pos(&model, k) {
                    Some(p) => {
                        prop_assert_eq!(prev, Some(model[p].1));
                        prop_assert_eq!(Some(&h), live.get(k), "overwrite keeps handle");
                        model[p].1 = v;
                    }
                    None => {
                        prop_assert!(prev.is_none());
                        live.insert(k.clone(), h);
                        model.push((k.clone(), v));
                    }
                }
            }
            OpI::InsertUnique(i, v) => {
                let k = &pool[i];
                let already = model_pos(&model, k).is_some();
                match sut.insert_unique(fp_of(k), || key_of(k), v) {
                    Ok(slot) => {
                        prop_assert!(!already, "insert_unique must fail on duplicate");
                        prop_assert_eq!(*slot, v);
                        let h = sut.find(&fp_of(k)).expect("just inserted");
                        live.insert(k.clone(), h);
                        model.push((k.clone(), v));
                    }
                    Err(InsertError::DuplicateKey) => {
                        prop_assert!(already, "duplicate error only when key exists");
                    }
                }
            }
            OpI::Remove(i) => {
                let k = &pool[i];
                if let Some(h) = live.remove(k) {
                    let (kk, vv) = sut.remove(h).expect("handle valid for removal");
                    prop_assert!(kk == key_of(k));
                    let p = model_pos(&model, k).expect("present in model");
                    let (_, mv) = model.remove(p);
                    prop_assert_eq!(vv, mv);
                    stale.push(h);
                } else {
                    prop_assert!(sut.find(&fp_of(k)).is_none());
                }
            }
            OpI::Find(i) => {
                let k = &pool[i];
                let found = sut.find(&fp_of(k));
                prop_assert_eq!(found.is_some(), model_pos(&model, k).is_some());
                if let Some(h) = found {
                    prop_assert_eq!(Some(&h), live.get(k));
                }
            }
            OpI::Mutate(i, d) => {
                let k = &pool[i];
                if let Some(&h) = live.get(k) {
                    let vr = sut.value_mut(h).expect("live handle should resolve");
                    *vr = vr.wrapping_add(d);
                    let p = model_pos(&model, k).expect("present in model");
                    model[p].1 = model[p].1.wrapping_add(d);
                }
            }
            OpI::RetainEven => {
                sut.retain(|_, v| *v % 2 == 0);
                for (k, _) in model.iter().filter(|(_, v)| *v % 2 != 0) {
                    if let Some(h) = live.remove(k) {
                        stale.push(h);
                    }
                }
                model.retain(|(_, v)| *v % 2 == 0);
            }
            OpI::Clear => {
                sut.clear();
                stale.extend(live.drain().map(|(_, h)| h));
                model.clear();
            }
            OpI::Iterate => {
                let got: Vec<(CompositeKey, i32)> =
                    sut.iter().map(|(k, v)| (k.clone(), *v)).collect();
                let want: Vec<(CompositeKey, i32)> =
                    model.iter().map(|(k, v)| (key_of(k), *v)).collect();
                prop_assert_eq!(got, want);
            }
        }

        // Post-conditions after each op
        for &h in &stale {
            prop_assert!(sut.value(h).is_none());
        }
        prop_assert_eq!(sut.len(), model.len());
        prop_assert_eq!(sut.is_empty(), model.is_empty());
        sut.check_invariants();
    }
    Ok(())
}

// Property: state-machine equivalence against an insertion-ordered model.
// - Upsert overwrites in place (same handle, same position) or appends.
// - Unique inserts reject duplicates without changing the map.
// - Removal returns the stored pair and invalidates the handle.
// - Iteration order equals the model's order after every kind of mutation.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine((pool, ops) in arb_scenario()) {
        let sut: OrderedMap<i32> = OrderedMap::with_capacity_and_hasher(0, Default::default());
        run_scenario(sut, pool, ops)?;
    }
}

// Collision variant using a constant hasher to stress equality resolution.
#[derive(Clone, Default)]
struct ConstBuildHasher;
struct ConstHasher;
impl BuildHasher for ConstBuildHasher {
    type Hasher = ConstHasher;
    fn build_hasher(&self) -> Self::Hasher {
        ConstHasher
    }
}
impl Hasher for ConstHasher {
    fn write(&mut self, _bytes: &[u8]) {}
    fn finish(&self) -> u64 {
        0
    }
}

// Property: same state machine with every fingerprint in one bucket, so the
// index must tell entries apart by fingerprint equality alone.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine_with_collisions((pool, ops) in arb_scenario()) {
        let sut = OrderedMap::with_capacity_and_hasher(0, ConstBuildHasher);
        run_scenario(sut, pool, ops)?;
    }
}
