use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use vmreap::exclusive::ExclusiveAccessCoordinator;

#[test]
fn await_clear_returns_immediately_when_not_held() {
    let coordinator = ExclusiveAccessCoordinator::new();
    coordinator.await_clear();
}

#[test]
fn await_clear_blocks_until_matching_release() {
    let coordinator = ExclusiveAccessCoordinator::new();
    let guard = coordinator.acquire();
    let unblocked = AtomicBool::new(false);

    crossbeam::scope(|s| {
        s.spawn(|_| {
            coordinator.await_clear();
            unblocked.store(true, Ordering::SeqCst);
        });

        std::thread::sleep(Duration::from_millis(50));
        assert!(
            !unblocked.load(Ordering::SeqCst),
            "waiter returned while exclusive access was held"
        );

        drop(guard);

        let backoff = crossbeam_utils::Backoff::new();
        while !unblocked.load(Ordering::SeqCst) {
            backoff.snooze();
        }
    })
    .unwrap();
}

#[test]
fn release_wakes_every_waiter() {
    let coordinator = ExclusiveAccessCoordinator::new();
    let guard = coordinator.acquire();
    let woken = AtomicUsize::new(0);

    crossbeam::scope(|s| {
        for _ in 0..4 {
            s.spawn(|_| {
                coordinator.await_clear();
                woken.fetch_add(1, Ordering::SeqCst);
            });
        }

        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(woken.load(Ordering::SeqCst), 0);

        drop(guard);

        let backoff = crossbeam_utils::Backoff::new();
        while woken.load(Ordering::SeqCst) != 4 {
            backoff.snooze();
        }
    })
    .unwrap();
}

#[test]
fn holders_serialize() {
    let coordinator = ExclusiveAccessCoordinator::new();
    let concurrent = AtomicUsize::new(0);

    crossbeam::scope(|s| {
        for _ in 0..4 {
            s.spawn(|_| {
                let _guard = coordinator.acquire();
                let inside = concurrent.fetch_add(1, Ordering::SeqCst);
                assert_eq!(inside, 0, "two actors held exclusive access at once");
                std::thread::sleep(Duration::from_millis(5));
                concurrent.fetch_sub(1, Ordering::SeqCst);
            });
        }
    })
    .unwrap();

    assert!(!coordinator.is_held());
}
