//! Model-based property tests: a store behaves like a `BTreeMap`.

use mapkv_core::{Config, Store, StoreIdentity, Value};
use proptest::prelude::*;
use std::collections::BTreeMap;
use tempfile::tempdir;

#[derive(Debug, Clone)]
enum Op {
    Set(String, Value),
    Remove(String),
    Trim,
    Clear,
}

fn key() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["", "a", "b", "long.key.name", "ü"]).prop_map(str::to_string)
}

fn value() -> impl Strategy<Value = Value> {
    prop_oneof![
        ".{0,20}".prop_map(Value::from),
        any::<f64>()
            .prop_filter("NaN never equals itself", |n| !n.is_nan())
            .prop_map(Value::from),
        any::<bool>().prop_map(Value::from),
        prop::collection::vec(any::<u8>(), 0..300).prop_map(Value::from),
    ]
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        8 => (key(), value()).prop_map(|(k, v)| Op::Set(k, v)),
        3 => key().prop_map(Op::Remove),
        1 => Just(Op::Trim),
        1 => Just(Op::Clear),
    ]
}

fn apply(store: &Store, model: &mut BTreeMap<String, Value>, op: &Op) {
    match op {
        Op::Set(k, v) => {
            store.set(k, v.clone()).unwrap();
            model.insert(k.clone(), v.clone());
        }
        Op::Remove(k) => {
            assert_eq!(store.remove(k).unwrap(), model.remove(k).is_some());
        }
        Op::Trim => store.trim().unwrap(),
        Op::Clear => {
            store.clear_all().unwrap();
            model.clear();
        }
    }
}

fn assert_matches(store: &Store, model: &BTreeMap<String, Value>) {
    let keys: Vec<String> = model.keys().cloned().collect();
    assert_eq!(store.all_keys().unwrap(), keys);
    for (k, v) in model {
        assert_eq!(store.get(k).unwrap().as_ref(), Some(v));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn in_memory_store_matches_model(ops in prop::collection::vec(op(), 1..60)) {
        let store = Store::open_in_memory(
            "model",
            None,
            Config::new().initial_capacity(256),
        ).unwrap();
        let mut model = BTreeMap::new();
        for op in &ops {
            apply(&store, &mut model, op);
        }
        assert_matches(&store, &model);
    }

    #[test]
    fn reopened_store_matches_model(
        ops in prop::collection::vec(op(), 1..40),
        encrypted in any::<bool>(),
    ) {
        let temp = tempdir().unwrap();
        let mut identity = StoreIdentity::new("model");
        if encrypted {
            identity = identity.with_encryption_key(b"proptest");
        }
        let config = Config::new().initial_capacity(256).sync_on_write(false);

        let mut model = BTreeMap::new();
        {
            let store = Store::open(&identity, temp.path(), config.clone()).unwrap();
            for op in &ops {
                apply(&store, &mut model, op);
            }
        }

        let store = Store::open(&identity, temp.path(), config).unwrap();
        prop_assert_eq!(store.is_encrypted(), encrypted);
        assert_matches(&store, &model);
    }

    #[test]
    fn trim_preserves_contents(ops in prop::collection::vec(op(), 1..60)) {
        let store = Store::open_in_memory("trim", Some(&b"k"[..]), Config::default()).unwrap();
        let mut model = BTreeMap::new();
        for op in &ops {
            apply(&store, &mut model, op);
        }
        let before = store.actual_size().unwrap();

        store.trim().unwrap();
        prop_assert!(store.actual_size().unwrap() <= before);
        assert_matches(&store, &model);
    }
}
