//! End-to-end tests against the persistent LMDB backend.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, OnceLock};
use std::thread;
use std::time::Duration;

use kache::{
    cache, BackendConfig, BoxError, CacheOptions, CacheStats, CachedComputation, CallArgs,
    CallPolicy, KacheResult, KeyConfig, LmdbBackend, ParameterSet, Signature, StorageBackend,
};
use tempfile::TempDir;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn f_signature() -> Signature {
    Signature::new().param("a").param_with_default("b", 2)
}

fn multiply(params: &ParameterSet) -> Result<i64, BoxError> {
    Ok(params.get_as::<i64>("a")? * params.get_as::<i64>("b")?)
}

fn lmdb(dir: &TempDir) -> Arc<dyn StorageBackend> {
    Arc::new(LmdbBackend::new(dir.path(), 10).expect("backend should build"))
}

#[test]
fn test_documented_scenario_on_lmdb() {
    init_tracing();
    let dir = TempDir::new().expect("TempDir creation should succeed");
    let f = cache("f", f_signature())
        .backend(lmdb(&dir))
        .build(multiply)
        .expect("build should succeed");

    assert_eq!(f.call(&CallArgs::new().arg(1)).expect("call should succeed"), 2);
    assert_eq!(f.stats(), CacheStats { cached: 0, computed: 1 });
    assert_eq!(f.call(&CallArgs::new().arg(2)).expect("call should succeed"), 4);
    assert_eq!(f.stats(), CacheStats { cached: 0, computed: 2 });
    assert_eq!(f.call(&CallArgs::new().arg(1)).expect("call should succeed"), 2);
    assert_eq!(f.stats(), CacheStats { cached: 1, computed: 2 });
}

#[test]
fn test_results_survive_a_new_handle() {
    let dir = TempDir::new().expect("TempDir creation should succeed");
    {
        let f = cache("f", f_signature())
            .backend(lmdb(&dir))
            .build(multiply)
            .expect("build should succeed");
        f.call(&CallArgs::new().arg(3)).expect("call should succeed");
    }

    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();
    let f = cache("f", f_signature())
        .backend(lmdb(&dir))
        .build(move |params| {
            counter.fetch_add(1, Ordering::SeqCst);
            multiply(params)
        })
        .expect("build should succeed");

    assert_eq!(f.call(&CallArgs::new().arg(3)).expect("call should succeed"), 6);
    assert_eq!(runs.load(Ordering::SeqCst), 0);
    assert_eq!(f.stats(), CacheStats { cached: 1, computed: 0 });
}

#[test]
fn test_failed_computation_leaves_store_reopenable() {
    let dir = TempDir::new().expect("TempDir creation should succeed");
    let backend = lmdb(&dir);
    let failing: CachedComputation<i64> = cache("f", f_signature())
        .backend(backend.clone())
        .build(|_| Err("computation failed".into()))
        .expect("build should succeed");

    let err = failing.call(&CallArgs::new().arg(1)).unwrap_err();
    assert!(err.is_computation());

    // Another thread blocks on the store until every handle is released.
    let f = Arc::new(
        cache("f", f_signature())
            .backend(backend)
            .build(multiply)
            .expect("build should succeed"),
    );
    let worker_f = f.clone();
    let value = within_timeout(move || worker_f.call(&CallArgs::new().arg(1)));
    assert_eq!(value.expect("call should succeed"), 2);
    assert_eq!(f.stats(), CacheStats { cached: 0, computed: 1 });
}

#[test]
fn test_shared_backend_namespaces_computations() {
    let dir = TempDir::new().expect("TempDir creation should succeed");
    let backend = lmdb(&dir);

    let double = cache("double", Signature::new().param("x"))
        .backend(backend.clone())
        .build(|p| Ok(p.get_as::<i64>("x")? * 2))
        .expect("build should succeed");
    let square = cache("square", Signature::new().param("x"))
        .backend(backend)
        .build(|p| Ok(p.get_as::<i64>("x")?.pow(2)))
        .expect("build should succeed");

    assert_eq!(double.call(&CallArgs::new().arg(5)).expect("call should succeed"), 10);
    assert_eq!(square.call(&CallArgs::new().arg(5)).expect("call should succeed"), 25);
    assert_eq!(double.call(&CallArgs::new().arg(5)).expect("call should succeed"), 10);

    assert_eq!(double.stats(), CacheStats { cached: 1, computed: 1 });
    assert_eq!(square.stats(), CacheStats { cached: 0, computed: 1 });
    assert_ne!(double.last_key(), square.last_key());
}

#[test]
fn test_from_toml_options() {
    let dir = TempDir::new().expect("TempDir creation should succeed");
    let toml = format!(
        "policy = \"serialized\"\n\n[backend]\nkind = \"lmdb\"\npath = {:?}\nmap_size_mb = 8\n\n[key]\nkind = \"digest\"\n",
        dir.path().join("store").display().to_string()
    );
    let options = CacheOptions::from_toml_str(&toml).expect("config should parse");
    assert_eq!(options.key, KeyConfig::Digest);

    let f = CachedComputation::from_options("f", f_signature(), &options, multiply)
        .expect("build should succeed");
    assert_eq!(f.policy(), CallPolicy::Serialized);

    assert_eq!(f.call(&CallArgs::new().arg(4)).expect("call should succeed"), 8);
    assert_eq!(f.call(&CallArgs::new().arg(4)).expect("call should succeed"), 8);
    assert_eq!(f.stats(), CacheStats { cached: 1, computed: 1 });

    let key = f.last_key().expect("key should be recorded");
    assert_eq!(key.as_str().len(), "f__".len() + 64);
}

#[test]
fn test_options_with_in_memory_backend() {
    let options = CacheOptions::new().with_backend(BackendConfig::InMemory);
    let f = CachedComputation::from_options("f", f_signature(), &options, multiply)
        .expect("build should succeed");

    f.call(&CallArgs::new().arg(1)).expect("call should succeed");
    assert_eq!(f.backend().location(), "memory");
}

/// Runs `f` on a worker thread and fails instead of hanging if it blocks.
fn within_timeout<T: Send + 'static>(f: impl FnOnce() -> T + Send + 'static) -> T {
    let (tx, rx) = mpsc::channel();
    let worker = thread::spawn(move || {
        let _ = tx.send(f());
    });
    let value = rx
        .recv_timeout(Duration::from_secs(10))
        .expect("call should not block");
    worker.join().expect("worker should not panic");
    value
}

#[test]
fn test_nested_computation_on_shared_store() {
    let dir = TempDir::new().expect("TempDir creation should succeed");
    let backend = lmdb(&dir);

    let inner = Arc::new(
        cache("inner", Signature::new().param("x"))
            .backend(backend.clone())
            .build(|p| Ok(p.get_as::<i64>("x")? + 1))
            .expect("build should succeed"),
    );
    let nested = inner.clone();
    let outer = cache("outer", Signature::new().param("x"))
        .backend(backend)
        .build(move |p| {
            let x = p.get_as::<i64>("x")?;
            Ok(nested.call(&CallArgs::new().arg(x))? * 10)
        })
        .expect("build should succeed");

    let outer = Arc::new(outer);
    let worker_outer = outer.clone();
    let results = within_timeout(move || -> KacheResult<(i64, i64)> {
        let first = worker_outer.call(&CallArgs::new().arg(4))?;
        let second = worker_outer.call(&CallArgs::new().arg(4))?;
        Ok((first, second))
    });

    assert_eq!(results.expect("calls should succeed"), (50, 50));
    assert_eq!(outer.stats(), CacheStats { cached: 1, computed: 1 });
    assert_eq!(inner.stats(), CacheStats { cached: 0, computed: 1 });

    // Both handles were released, so the inner entry is visible to a fresh call.
    assert_eq!(inner.call(&CallArgs::new().arg(4)).expect("call should succeed"), 5);
    assert_eq!(inner.stats(), CacheStats { cached: 1, computed: 1 });
}

#[test]
fn test_serialized_recursion_on_lmdb() {
    let dir = TempDir::new().expect("TempDir creation should succeed");
    let cell: Arc<OnceLock<CachedComputation<u64>>> = Arc::new(OnceLock::new());
    let this = cell.clone();
    let fib = cache("fib", Signature::new().param("n"))
        .backend(lmdb(&dir))
        .policy(CallPolicy::Serialized)
        .build(move |p| {
            let n = p.get_as::<u64>("n")?;
            if n < 2 {
                return Ok(n);
            }
            let fib = this.get().ok_or("fib is not initialised")?;
            Ok(fib.call(&CallArgs::new().arg(n - 1))? + fib.call(&CallArgs::new().arg(n - 2))?)
        })
        .expect("build should succeed");
    let _ = cell.set(fib);

    let worker_cell = cell.clone();
    let value = within_timeout(move || {
        worker_cell
            .get()
            .map(|fib| fib.call(&CallArgs::new().arg(10)))
    });

    let fib = cell.get().expect("fib should be initialised");
    assert_eq!(
        value.expect("fib should be initialised").expect("call should succeed"),
        55
    );
    assert_eq!(fib.stats().computed, 11);
}
