// Model-based property tests for HashMap, StableHashMap and HashSet.
//
// Every operation is applied to both the map under test and a std HashMap
// model; after each step len() and the looked-up key must agree, and at the
// end the full contents must match.
//
// The pooled variants additionally record the address of each value when it
// is inserted and check that it never moves until the key is removed.
use std::collections::HashMap as ModelMap;
use std::collections::HashSet as ModelSet;
use std::hash::BuildHasher;
use std::hash::BuildHasherDefault;
use std::hash::Hasher;

use proptest::prelude::*;
use robin_hash::HashMap;
use robin_hash::HashSet;
use robin_hash::StableHashMap;
use robin_hash::StableHashSet;
use robin_hash::storage::Pooled;
use robin_hash::storage::StoragePolicy;

/// Hashes every key to the same value, so all keys share one probe run.
#[derive(Default)]
struct ConstantHasher;

impl Hasher for ConstantHasher {
    fn finish(&self) -> u64 {
        0x5555_5555_5555_5555
    }

    fn write(&mut self, _bytes: &[u8]) {}
}

type Colliding = BuildHasherDefault<ConstantHasher>;

#[derive(Debug, Clone)]
enum Op {
    Insert(u16, u32),
    Emplace(u16, u32),
    TryEmplace(u16, u32),
    Remove(u16),
    Get(u16),
    Modify(u16, u32),
    RetainEven,
    Reserve(u8),
    Shrink,
    LoadFactor(f32),
    Clear,
}

fn op_strategy(keys: u16) -> impl Strategy<Value = Op> {
    prop_oneof![
        8 => (0..keys, any::<u32>()).prop_map(|(k, v)| Op::Insert(k, v)),
        3 => (0..keys, any::<u32>()).prop_map(|(k, v)| Op::Emplace(k, v)),
        3 => (0..keys, any::<u32>()).prop_map(|(k, v)| Op::TryEmplace(k, v)),
        6 => (0..keys).prop_map(Op::Remove),
        4 => (0..keys).prop_map(Op::Get),
        2 => (0..keys, any::<u32>()).prop_map(|(k, v)| Op::Modify(k, v)),
        1 => Just(Op::RetainEven),
        1 => any::<u8>().prop_map(Op::Reserve),
        1 => Just(Op::Shrink),
        1 => (0.25f32..=1.0).prop_map(Op::LoadFactor),
        1 => Just(Op::Clear),
    ]
}

fn apply<S: BuildHasher, P: StoragePolicy>(
    map: &mut HashMap<u16, u32, S, P>,
    model: &mut ModelMap<u16, u32>,
    op: &Op,
) -> Result<(), TestCaseError> {
    match *op {
        Op::Insert(k, v) => {
            prop_assert_eq!(map.insert(k, v), model.insert(k, v));
        }
        Op::Emplace(k, v) => {
            let expected = *model.entry(k).or_insert(v);
            prop_assert_eq!(*map.emplace(k, v), expected);
        }
        Op::TryEmplace(k, v) => {
            let inserted = !model.contains_key(&k);
            let expected = *model.entry(k).or_insert(v);
            let (value, was_inserted) = map.try_emplace(k, v);
            prop_assert_eq!((*value, was_inserted), (expected, inserted));
        }
        Op::Remove(k) => {
            prop_assert_eq!(map.remove(&k), model.remove(&k));
        }
        Op::Get(k) => {
            prop_assert_eq!(map.get(&k), model.get(&k));
            prop_assert_eq!(map.contains_key(&k), model.contains_key(&k));
        }
        Op::Modify(k, v) => {
            if let Some(value) = map.get_mut(&k) {
                *value = v;
            }
            if let Some(value) = model.get_mut(&k) {
                *value = v;
            }
        }
        Op::RetainEven => {
            map.retain(|&k, _| k % 2 == 0);
            model.retain(|&k, _| k % 2 == 0);
        }
        Op::Reserve(additional) => {
            map.reserve(additional as usize);
            prop_assert!(map.capacity() >= map.len() + additional as usize);
        }
        Op::Shrink => {
            map.shrink_to_fit();
            prop_assert!(map.capacity() >= map.len());
        }
        Op::LoadFactor(max_load_factor) => {
            map.set_max_load_factor(max_load_factor);
            prop_assert!(map.capacity() >= map.len());
            prop_assert!(map.len() <= map.bucket_capacity());
        }
        Op::Clear => {
            map.clear();
            model.clear();
        }
    }

    prop_assert_eq!(map.len(), model.len());
    Ok(())
}

fn assert_same_contents<S: BuildHasher, P: StoragePolicy>(
    map: &HashMap<u16, u32, S, P>,
    model: &ModelMap<u16, u32>,
) -> Result<(), TestCaseError> {
    prop_assert_eq!(map.len(), model.len());
    prop_assert_eq!(map.iter().len(), model.len());
    let collected: ModelMap<u16, u32> = map.iter().map(|(&k, &v)| (k, v)).collect();
    prop_assert_eq!(&collected, model);
    let reversed: ModelMap<u16, u32> = map.iter().rev().map(|(&k, &v)| (k, v)).collect();
    prop_assert_eq!(&reversed, model);
    for (k, v) in model {
        prop_assert_eq!(map.get(k), Some(v));
    }
    Ok(())
}

proptest! {
    #[test]
    fn prop_flat_map_matches_model(
        ops in proptest::collection::vec(op_strategy(96), 1..400)
    ) {
        let mut map: HashMap<u16, u32> = HashMap::new();
        let mut model = ModelMap::new();
        for op in &ops {
            apply(&mut map, &mut model, op)?;
        }
        assert_same_contents(&map, &model)?;

        let drained: ModelMap<u16, u32> = map.drain().collect();
        prop_assert_eq!(drained, model);
        prop_assert!(map.is_empty());
    }

    #[test]
    fn prop_pooled_map_matches_model(
        ops in proptest::collection::vec(op_strategy(96), 1..400)
    ) {
        let mut map: StableHashMap<u16, u32> = StableHashMap::new_in(Pooled);
        let mut model = ModelMap::new();
        for op in &ops {
            apply(&mut map, &mut model, op)?;
        }
        assert_same_contents(&map, &model)?;

        let owned: ModelMap<u16, u32> = map.into_iter().collect();
        prop_assert_eq!(owned, model);
    }

    #[test]
    fn prop_colliding_map_matches_model(
        ops in proptest::collection::vec(op_strategy(48), 1..200)
    ) {
        let mut map: HashMap<u16, u32, Colliding> = HashMap::with_hasher(Colliding::default());
        let mut model = ModelMap::new();
        for op in &ops {
            apply(&mut map, &mut model, op)?;
        }
        assert_same_contents(&map, &model)?;
    }

    #[test]
    fn prop_pooled_addresses_are_stable(
        ops in proptest::collection::vec((0u8..4u8, 0u16..128u16), 1..400)
    ) {
        let mut map: StableHashMap<u16, u64> = StableHashMap::new_in(Pooled);
        let mut addresses: ModelMap<u16, *const u64> = ModelMap::new();

        for (op, k) in ops {
            match op {
                0 | 1 => {
                    let (value, inserted) = map.try_emplace(k, u64::from(k));
                    let address = value as *const u64;
                    if inserted {
                        addresses.insert(k, address);
                    } else {
                        prop_assert_eq!(addresses.get(&k).copied(), Some(address));
                    }
                }
                2 => {
                    prop_assert_eq!(map.remove(&k).is_some(), addresses.remove(&k).is_some());
                }
                _ => {
                    map.reserve(usize::from(k));
                }
            }
        }

        for (k, address) in &addresses {
            let value = map.get(k);
            prop_assert_eq!(value.copied(), Some(u64::from(*k)));
            prop_assert_eq!(value.map(|v| v as *const u64), Some(*address));
        }
    }

    #[test]
    fn prop_set_operations_match_model(
        left in proptest::collection::vec(0u16..64u16, 0..64),
        right in proptest::collection::vec(0u16..64u16, 0..64),
        removals in proptest::collection::vec(0u16..64u16, 0..32),
    ) {
        let mut a: HashSet<u16> = left.iter().copied().collect();
        let b: StableHashSet<u16> = right.iter().copied().collect();
        let mut model_a: ModelSet<u16> = left.iter().copied().collect();
        let model_b: ModelSet<u16> = right.iter().copied().collect();

        for k in &removals {
            prop_assert_eq!(a.remove(k), model_a.remove(k));
        }
        prop_assert_eq!(a.len(), model_a.len());

        let b_flat: HashSet<u16> = b.iter().copied().collect();
        let union: ModelSet<u16> = a.union(&b_flat).copied().collect();
        let intersection: ModelSet<u16> = a.intersection(&b_flat).copied().collect();
        let difference: ModelSet<u16> = a.difference(&b_flat).copied().collect();
        let symmetric: ModelSet<u16> = a.symmetric_difference(&b_flat).copied().collect();

        prop_assert_eq!(union, &model_a | &model_b);
        prop_assert_eq!(intersection, &model_a & &model_b);
        prop_assert_eq!(difference, &model_a - &model_b);
        prop_assert_eq!(symmetric, &model_a ^ &model_b);
        prop_assert_eq!(a.is_subset(&b_flat), model_a.is_subset(&model_b));
        prop_assert_eq!(a.is_disjoint(&b_flat), model_a.is_disjoint(&model_b));
    }
}
