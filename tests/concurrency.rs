// ==============================================
// CONCURRENCY TESTS (integration)
// ==============================================
//
// A zone is one mutex around a single-threaded core, so these tests are
// about serialization soundness, not parallel speedup: concurrent mixed
// traffic must never corrupt the structures, and a keys() scan must see a
// consistent snapshot while writers hammer the same zone.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use zonekit::prelude::*;

#[test]
fn keys_scan_is_consistent_under_concurrent_stores() {
    let zone = Arc::new(Zone::new("scan", 256 * 1024).unwrap());
    let stop = Arc::new(AtomicBool::new(false));

    let writer = {
        let zone = Arc::clone(&zone);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let mut i = 0usize;
            while !stop.load(Ordering::Relaxed) {
                let key = format!("key-{:04}", i % 512);
                zone.set(key.as_bytes(), &Value::Number(i as f64)).unwrap();
                if i % 7 == 0 {
                    zone.delete(key.as_bytes()).unwrap();
                }
                i += 1;
            }
        })
    };

    for _ in 0..200 {
        let keys = zone.keys(0);
        // every returned key is well-formed: the scan never observed a
        // half-written entry
        for key in &keys {
            assert!(key.starts_with(b"key-"), "mangled key {key:?}");
        }
        let limited = zone.keys(10);
        assert!(limited.len() <= 10);
    }

    stop.store(true, Ordering::Relaxed);
    writer.join().unwrap();
}

#[test]
fn mixed_traffic_from_many_threads_stays_sound() {
    let zone = Arc::new(Zone::new("hammer", 128 * 1024).unwrap());
    let threads = 8;
    let rounds = 400;

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let zone = Arc::clone(&zone);
            thread::spawn(move || {
                for i in 0..rounds {
                    let key = format!("k{}", (t * 31 + i) % 64);
                    let key = key.as_bytes();
                    match i % 5 {
                        0 => {
                            zone.set(key, &Value::Number(i as f64)).unwrap();
                        }
                        1 => {
                            // list keys live in their own namespace to
                            // avoid expected TypeMismatch noise
                            let lkey = format!("list-{t}");
                            zone.push(lkey.as_bytes(), ListEnd::Tail, &ListValue::Number(i as f64))
                                .unwrap();
                            zone.pop(lkey.as_bytes(), ListEnd::Head).unwrap();
                        }
                        2 => {
                            let _ = zone.fetch(key);
                        }
                        3 => {
                            let _ = zone.incr(key, 1.0, Some(0.0), TtlPolicy::Preserve);
                        }
                        _ => {
                            zone.delete(key).unwrap();
                        }
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    // the zone is still fully functional afterwards
    zone.set(b"after", &Value::from("ok")).unwrap();
    assert_eq!(
        zone.fetch(b"after").unwrap().unwrap().value,
        Value::from("ok")
    );
    let stats = zone.stats();
    assert!(stats.used <= stats.capacity);
}

#[test]
fn counters_are_atomic_across_threads() {
    let zone = Arc::new(Zone::new("counters", 64 * 1024).unwrap());
    let threads = 8;
    let per_thread = 250;

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let zone = Arc::clone(&zone);
            thread::spawn(move || {
                for _ in 0..per_thread {
                    zone.incr(b"total", 1.0, Some(0.0), TtlPolicy::Preserve).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let total = zone.fetch(b"total").unwrap().unwrap().value;
    assert_eq!(total, Value::Number(f64::from(threads * per_thread)));
}

#[test]
fn independent_zones_do_not_contend_for_data() {
    let registry = Arc::new(ZoneRegistry::new());
    registry.create("left", 64 * 1024).unwrap();
    registry.create("right", 64 * 1024).unwrap();

    let handles: Vec<_> = ["left", "right"]
        .into_iter()
        .map(|name| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                let zone = registry.find(name).unwrap();
                for i in 0..500 {
                    zone.set(format!("{name}-{i}").as_bytes(), &Value::Number(i as f64))
                        .unwrap();
                }
                zone.len()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), 500);
    }
    assert!(registry.find("left").unwrap().fetch(b"right-0").unwrap().is_none());
}
