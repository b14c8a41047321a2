//! Multi-threaded use of one cached computation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use kache::{cache, CachedComputation, CallArgs, CallPolicy, MemoryBackend, Signature};

const THREADS: usize = 8;

fn slow_square(policy: CallPolicy, runs: Arc<AtomicUsize>) -> CachedComputation<i64> {
    cache("square", Signature::new().param("x"))
        .backend(Arc::new(MemoryBackend::new()))
        .policy(policy)
        .build(move |p| {
            runs.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(20));
            Ok(p.get_as::<i64>("x")?.pow(2))
        })
        .expect("build should succeed")
}

fn call_from_threads(f: &Arc<CachedComputation<i64>>) -> Vec<i64> {
    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let f = f.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                f.call(&CallArgs::new().arg(7)).expect("call should succeed")
            })
        })
        .collect();
    handles
        .into_iter()
        .map(|h| h.join().expect("thread should not panic"))
        .collect()
}

#[test]
fn test_serialized_computes_once() {
    let runs = Arc::new(AtomicUsize::new(0));
    let f = Arc::new(slow_square(CallPolicy::Serialized, runs.clone()));

    let results = call_from_threads(&f);

    assert!(results.iter().all(|&r| r == 49));
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    let stats = f.stats();
    assert_eq!(stats.computed, 1);
    assert_eq!(stats.cached, (THREADS - 1) as u64);
}

#[test]
fn test_concurrent_counts_every_call() {
    let runs = Arc::new(AtomicUsize::new(0));
    let f = Arc::new(slow_square(CallPolicy::Concurrent, runs.clone()));

    let results = call_from_threads(&f);

    assert!(results.iter().all(|&r| r == 49));
    // Duplicate misses are allowed, but every call is counted exactly once.
    let stats = f.stats();
    assert_eq!(stats.total(), THREADS as u64);
    assert!(stats.computed >= 1);
    assert_eq!(stats.computed as usize, runs.load(Ordering::SeqCst));
}
