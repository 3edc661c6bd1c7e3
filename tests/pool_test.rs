//! Pool behavior against a real subprocess engine (the stub).

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;

use kiln::{KilnError, WorkerPool};

fn stub_pool(max_concurrency: usize) -> WorkerPool {
    WorkerPool::new(
        max_concurrency,
        env!("CARGO_BIN_EXE_kiln-stub-engine"),
        Vec::<String>::new(),
    )
}

async fn sleep_on(pool: &WorkerPool, ms: u64) {
    pool.submit(|ctx| async move {
        let _: serde_json::Value = ctx
            .channel
            .call("Sleep", &json!({ "ms": ms }))
            .await
            .unwrap();
    })
    .await
    .unwrap();
}

async fn ping(pool: &WorkerPool) -> kiln::Result<serde_json::Value> {
    pool.submit(|ctx| async move { ctx.channel.call("Ping", &json!({ "value": "hi" })).await })
        .await?
}

#[tokio::test]
async fn single_worker_serializes_tasks() {
    let pool = Arc::new(stub_pool(1));
    // Warm up so spawn latency is out of the measurement.
    ping(&pool).await.unwrap();

    let started = Instant::now();
    let a = {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move { sleep_on(&pool, 50).await })
    };
    let b = {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move { sleep_on(&pool, 50).await })
    };
    a.await.unwrap();
    b.await.unwrap();
    let serial = started.elapsed();

    // One worker, one permit: the two 50ms calls cannot overlap.
    assert!(serial >= Duration::from_millis(100), "took {serial:?}");

    // Two independent pools run the same two calls concurrently.
    let pool_a = Arc::new(stub_pool(1));
    let pool_b = Arc::new(stub_pool(1));
    ping(&pool_a).await.unwrap();
    ping(&pool_b).await.unwrap();

    let started = Instant::now();
    let a = {
        let pool = Arc::clone(&pool_a);
        tokio::spawn(async move { sleep_on(&pool, 50).await })
    };
    let b = {
        let pool = Arc::clone(&pool_b);
        tokio::spawn(async move { sleep_on(&pool, 50).await })
    };
    a.await.unwrap();
    b.await.unwrap();
    let parallel = started.elapsed();

    assert!(parallel < serial, "parallel {parallel:?} vs serial {serial:?}");

    pool.close().await.unwrap();
    pool_a.close().await.unwrap();
    pool_b.close().await.unwrap();
}

#[tokio::test]
async fn crash_mid_call_is_transport_error_and_recovers() {
    let pool = stub_pool(1);

    let err = pool
        .submit(|ctx| async move {
            ctx.channel
                .call::<_, serde_json::Value>("Exit", &json!({}))
                .await
        })
        .await
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, KilnError::Transport { .. }));
    assert!(err.is_worker_failure());

    // Wait for the exit watcher to mark the slot dead.
    for _ in 0..200 {
        if pool.worker_pids().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // The dead slot is replaced on the next acquisition.
    let pong = ping(&pool).await.unwrap();
    assert_eq!(pong["value"], "hi");

    pool.close().await.unwrap();
}

#[tokio::test]
async fn close_drains_in_flight_call_then_kills_workers() {
    let pool = Arc::new(stub_pool(1));
    ping(&pool).await.unwrap();

    let task_pool = Arc::clone(&pool);
    let task = tokio::spawn(async move { sleep_on(&task_pool, 150).await });

    // Let the call reach the worker before closing.
    tokio::time::sleep(Duration::from_millis(30)).await;
    let started = Instant::now();
    pool.close().await.unwrap();

    assert!(started.elapsed() >= Duration::from_millis(80));
    task.await.unwrap();
    assert!(pool.worker_pids().is_empty());

    let err = ping(&pool).await.unwrap_err();
    assert!(err.is_pool_closed());
}

#[tokio::test]
async fn stderr_capture_is_bounded() {
    let pool = stub_pool(1).with_stderr_capacity(64);

    let diagnostics = pool
        .submit(|ctx| async move {
            let _: serde_json::Value = ctx
                .channel
                .call("SpewStderr", &json!({ "bytes": 10_000 }))
                .await
                .unwrap();
            ctx.diagnostics
        })
        .await
        .unwrap();

    // The pump may still be catching up; the cap holds regardless.
    for _ in 0..200 {
        if diagnostics.truncated() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(diagnostics.truncated());
    let captured = diagnostics.drain();
    assert_eq!(captured.len(), 64);
    assert!(captured.iter().all(|&b| b == b'x'));

    pool.close().await.unwrap();
}

#[tokio::test]
async fn many_tasks_on_small_pool_all_complete() {
    let pool = Arc::new(stub_pool(2));
    let mut handles = Vec::new();
    for _ in 0..10 {
        let pool = Arc::clone(&pool);
        handles.push(tokio::spawn(async move {
            ping(&pool).await.unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    assert!(pool.worker_pids().len() <= 2);
    pool.close().await.unwrap();
}
