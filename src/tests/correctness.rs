use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering::Relaxed;
use std::sync::Arc;
use std::thread;

use crate::SuxLock;

#[test]
fn ownership_transfer_round_trip() {
    let lock = Arc::new(SuxLock::new());
    lock.x_lock(true); // release deferred to another thread

    let lock_clone = lock.clone();
    thread::spawn(move || {
        lock_clone.claim_ownership();
        lock_clone.x_unlock(false);
    })
    .join()
    .unwrap();

    assert!(lock.x_lock_try());
    lock.x_unlock(false);
}

#[test]
fn deferred_release_with_claim_flag() {
    let lock = Arc::new(SuxLock::new());
    assert!(lock.u_lock_try(true));

    let lock_clone = lock.clone();
    thread::spawn(move || {
        lock_clone.u_unlock(true);
    })
    .join()
    .unwrap();

    assert!(lock.x_lock_try());
    lock.x_unlock(false);
}

#[test]
fn deferred_exclusive_release() {
    let lock = Arc::new(SuxLock::new());
    lock.x_lock(true);

    let lock_clone = lock.clone();
    thread::spawn(move || {
        lock_clone.x_unlock(true);
    })
    .join()
    .unwrap();

    assert!(lock.x_lock_try());
    lock.x_unlock(false);
}

#[test]
fn try_variants_fail_while_exclusive_held() {
    let lock = Arc::new(SuxLock::new());
    lock.x_lock(false);

    let lock_clone = lock.clone();
    thread::spawn(move || {
        assert!(!lock_clone.s_lock_try());
        assert!(!lock_clone.u_lock_try(false));
        assert!(!lock_clone.u_lock_try(true));
        assert!(!lock_clone.x_lock_try());
    })
    .join()
    .unwrap();

    lock.x_unlock(false);
}

#[cfg_attr(miri, ignore = "thread parking in parking_lot is too slow under Miri")]
#[test]
fn update_permits_concurrent_readers() {
    let num_threads = 16;

    let lock = Arc::new(SuxLock::new());
    let concurrent = Arc::new(AtomicUsize::new(0));

    lock.u_lock();

    // Every reader acquires S while U is held, and none of them leaves
    // before all have arrived.
    let mut threads = Vec::new();
    for _ in 0..num_threads {
        let lock = lock.clone();
        let concurrent = concurrent.clone();
        threads.push(thread::spawn(move || {
            lock.s_lock();
            concurrent.fetch_add(1, Relaxed);
            while concurrent.load(Relaxed) < num_threads {
                thread::yield_now();
            }
            lock.s_unlock();
        }));
    }

    for thread in threads {
        thread.join().unwrap();
    }
    assert_eq!(concurrent.load(Relaxed), num_threads);
    lock.u_unlock(false);
}

#[cfg_attr(miri, ignore = "thread parking in parking_lot is too slow under Miri")]
#[test]
fn contended_acquisition_counts_waits() {
    let lock = Arc::new(SuxLock::new());
    lock.x_lock(false);

    let lock_clone = lock.clone();
    let waiter = thread::spawn(move || {
        lock_clone.x_lock(false);
        lock_clone.x_unlock(false);
    });

    while !lock.is_waiting() {
        thread::yield_now();
    }
    lock.x_unlock(false);
    waiter.join().unwrap();

    assert!(lock.waited() >= 1);
    lock.reset_waited();
    assert_eq!(lock.waited(), 0);
}

#[cfg_attr(miri, ignore = "thread parking in parking_lot is too slow under Miri")]
#[test]
fn mutual_exclusion_chaos() {
    let num_threads = 8;
    let num_iters = 256;

    // Disjoint bit ranges per mode: an X holder must see nobody at all, a
    // U holder must see no other U or X, readers may overlap with one U.
    const S: usize = 1;
    const U: usize = 1 << 24;
    const X: usize = 1 << 48;

    let lock = Arc::new(SuxLock::new());
    let check = Arc::new(AtomicUsize::new(0));

    let mut threads = Vec::new();
    for i in 0..num_threads {
        let lock = lock.clone();
        let check = check.clone();
        threads.push(thread::spawn(move || {
            for j in 0..num_iters {
                match (i + j) % 4 {
                    0 => {
                        lock.x_lock(false);
                        assert_eq!(check.fetch_add(X, Relaxed), 0);
                        check.fetch_sub(X, Relaxed);
                        lock.x_unlock(false);
                    }
                    1 => {
                        lock.u_lock();
                        assert_eq!(check.fetch_add(U, Relaxed) / U, 0);
                        if j % 8 == 1 {
                            lock.u_x_upgrade();
                            // The upgrade drained the readers and excluded
                            // everyone else.
                            assert_eq!(check.load(Relaxed), U);
                            check.fetch_sub(U, Relaxed);
                            lock.x_unlock(false);
                        } else {
                            check.fetch_sub(U, Relaxed);
                            lock.u_unlock(false);
                        }
                    }
                    _ => {
                        lock.s_lock();
                        assert_eq!(check.fetch_add(S, Relaxed) / X, 0);
                        check.fetch_sub(S, Relaxed);
                        lock.s_unlock();
                    }
                }
            }
        }));
    }

    for thread in threads {
        thread.join().unwrap();
    }
    assert_eq!(check.load(Relaxed), 0);
}
