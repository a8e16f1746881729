//! Tests for concurrent acquire/release

use objects::proc::{implement, interface, object};
use objects::{Object, ObjectRef, SharedRef};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

#[interface("concurrency.IWork")]
pub trait IWork {
    fn work(&self) -> u64;
}

#[object(IWork)]
pub struct Worker {
    units: u64,
    drops: Arc<AtomicUsize>,
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

#[implement(IWork)]
impl Worker {
    fn work(&self) -> u64 {
        self.units
    }
}

fn worker() -> (ObjectRef<Worker>, Arc<AtomicUsize>) {
    let drops = Arc::new(AtomicUsize::new(0));
    let obj = Object::new(Worker {
        vtable_i_work: Worker::VTABLE_I_WORK,
        units: 1,
        drops: Arc::clone(&drops),
    });
    (obj, drops)
}

fn assert_send_sync<T: Send + Sync>() {}

#[test]
fn test_object_ref_is_send_sync() {
    assert_send_sync::<ObjectRef<Worker>>();
    assert_send_sync::<SharedRef<IWork>>();
}

#[test]
fn test_interface_handles_released_on_other_threads() {
    const THREADS: usize = 8;

    let (obj, drops) = worker();
    let handles: Vec<SharedRef<IWork>> = (0..THREADS)
        .map(|_| obj.query_shared::<IWork>().unwrap())
        .collect();
    assert_eq!(obj.ref_count(), THREADS + 1);

    thread::scope(|s| {
        for work in handles {
            s.spawn(move || {
                let again = work.query::<IWork>().unwrap();
                assert!(again.same_object(&work));
                assert_eq!(work.work(), 1);
            });
        }
    });

    assert_eq!(obj.ref_count(), 1);

    // The last reference may be an interface handle dropped elsewhere
    let last = obj.query_shared::<IWork>().unwrap();
    drop(obj);
    thread::spawn(move || drop(last)).join().unwrap();
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn test_concurrent_pairs_converge() {
    for (threads, pairs) in [(2, 1_000), (8, 10_000), (16, 2_000)] {
        let (obj, drops) = worker();
        let barrier = Barrier::new(threads);

        thread::scope(|s| {
            for _ in 0..threads {
                let obj = &obj;
                let barrier = &barrier;
                s.spawn(move || {
                    barrier.wait();
                    for _ in 0..pairs {
                        unsafe {
                            Object::acquire(obj.as_ptr());
                            assert!(Object::release(obj.as_ptr()));
                        }
                    }
                });
            }
        });

        assert_eq!(obj.ref_count(), 1, "T={} K={}", threads, pairs);
        assert_eq!(drops.load(Ordering::SeqCst), 0);
        drop(obj);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }
}

#[test]
fn test_concurrent_clones_converge() {
    const THREADS: usize = 8;
    const PAIRS: usize = 10_000;

    let (obj, drops) = worker();

    thread::scope(|s| {
        for _ in 0..THREADS {
            let obj = &obj;
            s.spawn(move || {
                for _ in 0..PAIRS {
                    let copy = obj.clone();
                    let work = copy.query::<IWork>().unwrap();
                    assert_eq!(work.work(), 1);
                }
            });
        }
    });

    assert_eq!(obj.ref_count(), 1);
    drop(obj);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn test_racing_final_releases_destroy_once() {
    const THREADS: usize = 8;

    for _ in 0..100 {
        let (obj, drops) = worker();
        let barrier = Barrier::new(THREADS);
        let copies: Vec<_> = (0..THREADS).map(|_| obj.clone()).collect();
        drop(obj);

        thread::scope(|s| {
            for copy in copies {
                let barrier = &barrier;
                s.spawn(move || {
                    barrier.wait();
                    drop(copy);
                });
            }
        });

        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }
}
