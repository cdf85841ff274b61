//! Two engines on the same files, as two processes would see them.
//!
//! Each registry opens its own mapping and lock handle, so the stores only
//! share state through the files.

use mapkv_core::{Config, FixedPathProvider, Mode, Registry, Store, StoreIdentity};
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

fn pair(dir: &Path, identity: &StoreIdentity) -> (Arc<Store>, Arc<Store>) {
    let first = Registry::new(&FixedPathProvider::new(dir), Config::default());
    let second = Registry::new(&FixedPathProvider::new(dir), Config::default());
    (
        first.acquire(identity).unwrap(),
        second.acquire(identity).unwrap(),
    )
}

fn shared(id: &str) -> StoreIdentity {
    StoreIdentity::new(id).with_mode(Mode::MultiProcess)
}

#[test]
fn appends_are_visible_to_the_other_engine() {
    let temp = tempdir().unwrap();
    let (a, b) = pair(temp.path(), &shared("app"));

    a.set_string("k", "from a").unwrap();
    assert_eq!(b.get_string("k").unwrap().as_deref(), Some("from a"));

    b.set_number("n", 1.0).unwrap();
    b.remove("k").unwrap();
    assert_eq!(a.get_number("n").unwrap(), Some(1.0));
    assert!(!a.contains_key("k").unwrap());
    assert_eq!(a.all_keys().unwrap(), b.all_keys().unwrap());
    assert!(b.stats().reloads >= 1);
}

#[test]
fn growth_is_picked_up() {
    let temp = tempdir().unwrap();
    let (a, b) = pair(temp.path(), &shared("app"));
    b.get("warm").unwrap();

    let payload = vec![1u8; 3000];
    for i in 0..8 {
        a.set(&format!("blob{i}"), payload.clone()).unwrap();
    }
    assert!(a.total_size().unwrap() > 4096);

    assert_eq!(b.count().unwrap(), 8);
    assert_eq!(b.total_size().unwrap(), a.total_size().unwrap());
}

#[test]
fn rewrites_are_picked_up() {
    let temp = tempdir().unwrap();
    let (a, b) = pair(temp.path(), &shared("app"));

    for i in 0..30 {
        a.set_number("counter", f64::from(i)).unwrap();
    }
    a.set_string("other", "x").unwrap();
    assert_eq!(b.get_number("counter").unwrap(), Some(29.0));

    a.trim().unwrap();
    b.set_string("after-trim", "y").unwrap();
    assert_eq!(a.get_string("after-trim").unwrap().as_deref(), Some("y"));
    assert_eq!(b.get_number("counter").unwrap(), Some(29.0));

    b.clear_all().unwrap();
    assert_eq!(a.count().unwrap(), 0);
    a.set_boolean("fresh", true).unwrap();
    assert_eq!(b.all_keys().unwrap(), vec!["fresh"]);
}

#[test]
fn re_key_by_one_engine_is_seen_by_a_keyed_reopen() {
    let temp = tempdir().unwrap();
    let identity = shared("vault").with_encryption_key(b"old");
    let (a, b) = pair(temp.path(), &identity);

    a.set_string("k", "v").unwrap();
    assert_eq!(b.get_string("k").unwrap().as_deref(), Some("v"));

    assert!(a.re_key(b"new"));

    // The other engine still holds the old key: it keeps its snapshot for
    // reads and refuses to write into a file it cannot read.
    assert_eq!(b.get_string("k").unwrap().as_deref(), Some("v"));
    assert!(b.set_string("k", "w").is_err());

    let c = Registry::new(&FixedPathProvider::new(temp.path()), Config::default())
        .acquire(&shared("vault").with_encryption_key(b"new"))
        .unwrap();
    assert_eq!(c.get_string("k").unwrap().as_deref(), Some("v"));
}

#[test]
fn unreadable_change_is_retried_only_after_the_file_moves_again() {
    let temp = tempdir().unwrap();
    let identity = shared("vault").with_encryption_key(b"old");
    let (a, b) = pair(temp.path(), &identity);
    a.set_string("k", "v").unwrap();
    assert_eq!(b.get_string("k").unwrap().as_deref(), Some("v"));

    assert!(a.re_key(b"new"));
    for _ in 0..5 {
        assert_eq!(b.get_string("k").unwrap().as_deref(), Some("v"));
    }
    assert_eq!(b.stats().errors, 1);

    a.set_string("k", "w").unwrap();
    assert_eq!(b.get_string("k").unwrap().as_deref(), Some("v"));
    assert_eq!(b.stats().errors, 2);
}

#[test]
fn read_only_engine_follows_writer() {
    let temp = tempdir().unwrap();
    let writer = Registry::new(&FixedPathProvider::new(temp.path()), Config::default())
        .acquire(&shared("app"))
        .unwrap();
    writer.set_string("k", "1").unwrap();

    let reader = Registry::new(&FixedPathProvider::new(temp.path()), Config::default())
        .acquire(&shared("app").with_read_only(true))
        .unwrap();
    assert_eq!(reader.get_string("k").unwrap().as_deref(), Some("1"));

    writer.set_string("k", "2").unwrap();
    assert_eq!(reader.get_string("k").unwrap().as_deref(), Some("2"));

    writer.trim().unwrap();
    writer.set_string("k", "3").unwrap();
    assert_eq!(reader.get_string("k").unwrap().as_deref(), Some("3"));
}

#[test]
fn interleaved_writers_from_threads() {
    let temp = tempdir().unwrap();
    let (a, b) = pair(temp.path(), &shared("app"));

    let threads: Vec<_> = [a.clone(), b.clone()]
        .into_iter()
        .enumerate()
        .map(|(n, store)| {
            std::thread::spawn(move || {
                for i in 0..100 {
                    store.set_number(&format!("w{n}-{i}"), f64::from(i)).unwrap();
                }
            })
        })
        .collect();
    for thread in threads {
        thread.join().unwrap();
    }

    assert_eq!(a.count().unwrap(), 200);
    assert_eq!(b.count().unwrap(), 200);
    assert_eq!(a.all_keys().unwrap(), b.all_keys().unwrap());
}
