//! End-to-end scenarios for `pqueue`.
//!
//! These tests exercise the scheduler, rate limiter, and task runner as
//! integrated subsystems rather than unit-testing a single module.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pqueue::{Concurrency, QueueOptions, TaskOptions, TaskQueue};
use tokio_util::sync::CancellationToken;

// ═══════════════════════════════════════════════════════════════════════
//  Priority ordering under a single concurrency slot
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn priority_order_with_concurrency_one() {
    let queue: TaskQueue<u32> = TaskQueue::new(
        QueueOptions::new().concurrency(1).auto_start(false),
    )
    .unwrap();

    let order = Arc::new(tokio::sync::Mutex::new(Vec::new()));
    let mut waiters = Vec::new();

    for (label, priority) in [(1u32, 0), (2, 5), (3, 5), (4, 10)] {
        let order = Arc::clone(&order);
        let fut = queue
            .add(
                move |_token| async move {
                    order.lock().await.push(label);
                    Ok::<_, pqueue::TaskError>(label)
                },
                TaskOptions::new().priority(priority),
            )
            .await
            .unwrap();
        waiters.push(fut);
    }

    queue.start().await;
    for fut in waiters {
        fut.await.unwrap();
    }

    let observed = order.lock().await.clone();
    // priority 10 first, then the two priority-5 tasks in submission order,
    // then priority 0 last.
    assert_eq!(observed, vec![4, 2, 3, 1]);
}

// ═══════════════════════════════════════════════════════════════════════
//  Fixed-window throttling
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn fixed_window_throttles_admission() {
    let queue: TaskQueue<u32> = TaskQueue::new(
        QueueOptions::new()
            .interval_cap(1)
            .interval(Duration::from_millis(100)),
    )
    .unwrap();

    let completions = Arc::new(tokio::sync::Mutex::new(Vec::new()));
    let start = tokio::time::Instant::now();

    let mut handles = Vec::new();
    for i in 0..3u32 {
        let completions = Arc::clone(&completions);
        let fut = queue
            .add(
                move |_token| async move {
                    completions.lock().await.push((i, start.elapsed()));
                    Ok::<_, pqueue::TaskError>(i)
                },
                TaskOptions::new(),
            )
            .await
            .unwrap();
        handles.push(fut);
    }

    for h in handles {
        h.await.unwrap();
    }

    let observed = completions.lock().await;
    assert_eq!(observed.len(), 3);
    // each admission after the first must wait for roughly one more window.
    assert!(observed[1].1 >= Duration::from_millis(90));
    assert!(observed[2].1 >= Duration::from_millis(190));
}

// ═══════════════════════════════════════════════════════════════════════
//  Fixed-window throttling admits up to the cap within a single window
//  (regression for a bug where any `interval_cap > 1` still only admitted
//  one task per window)
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn fixed_window_admits_full_cap_per_window() {
    let queue: TaskQueue<u32> = TaskQueue::new(
        QueueOptions::new()
            .interval_cap(3)
            .interval(Duration::from_millis(150)),
    )
    .unwrap();

    let completions = Arc::new(tokio::sync::Mutex::new(Vec::new()));
    let start = tokio::time::Instant::now();

    let mut handles = Vec::new();
    for i in 0..4u32 {
        let completions = Arc::clone(&completions);
        let fut = queue
            .add(
                move |_token| async move {
                    completions.lock().await.push((i, start.elapsed()));
                    Ok::<_, pqueue::TaskError>(i)
                },
                TaskOptions::new(),
            )
            .await
            .unwrap();
        handles.push(fut);
    }

    for h in handles {
        h.await.unwrap();
    }

    let observed = completions.lock().await;
    assert_eq!(observed.len(), 4);
    // the first three share the same window and all admit promptly.
    assert!(observed[0].1 < Duration::from_millis(50));
    assert!(observed[1].1 < Duration::from_millis(50));
    assert!(observed[2].1 < Duration::from_millis(50));
    // the fourth exceeds the cap and must wait for the window to roll over.
    assert!(observed[3].1 >= Duration::from_millis(140));
}

// ═══════════════════════════════════════════════════════════════════════
//  Strict sliding-window throttling
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn strict_window_evicts_on_schedule() {
    let queue: TaskQueue<u32> = TaskQueue::new(
        QueueOptions::new()
            .interval_cap(2)
            .interval(Duration::from_millis(100))
            .strict(true),
    )
    .unwrap();

    let start = tokio::time::Instant::now();
    let completions = Arc::new(tokio::sync::Mutex::new(Vec::new()));

    let mut handles = Vec::new();
    for i in 0..4u32 {
        let completions = Arc::clone(&completions);
        let fut = queue
            .add(
                move |_token| async move {
                    completions.lock().await.push((i, start.elapsed()));
                    Ok::<_, pqueue::TaskError>(i)
                },
                TaskOptions::new(),
            )
            .await
            .unwrap();
        handles.push(fut);
    }

    for h in handles {
        h.await.unwrap();
    }

    let observed = completions.lock().await;
    assert_eq!(observed.len(), 4);
    // the first two admit immediately; the third and fourth must each wait
    // for their corresponding tick to age out of the 100ms window.
    assert!(observed[0].1 < Duration::from_millis(50));
    assert!(observed[1].1 < Duration::from_millis(50));
    assert!(observed[2].1 >= Duration::from_millis(90));
}

// ═══════════════════════════════════════════════════════════════════════
//  Pre-start cancellation frees a slot without consuming the rate limit
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn pre_start_cancellation_frees_admission() {
    let queue: TaskQueue<u32> = TaskQueue::new(
        QueueOptions::new()
            .concurrency(1)
            .auto_start(false),
    )
    .unwrap();

    let cancelled_token = CancellationToken::new();
    cancelled_token.cancel();

    let ran = Arc::new(AtomicU32::new(0));
    let ran2 = Arc::clone(&ran);

    let cancelled_fut = queue
        .add(
            move |_token| async move {
                ran2.fetch_add(1, Ordering::SeqCst);
                Ok::<_, pqueue::TaskError>(0)
            },
            TaskOptions::new().cancel_token(cancelled_token),
        )
        .await
        .unwrap();

    let follow_up = queue
        .add(
            |_token| async { Ok::<_, pqueue::TaskError>(7u32) },
            TaskOptions::new(),
        )
        .await
        .unwrap();

    queue.start().await;

    let cancelled_result = cancelled_fut.await;
    assert!(matches!(cancelled_result, Err(pqueue::TaskError::Cancelled(_))));
    assert_eq!(ran.load(Ordering::SeqCst), 0);

    let follow_up_result = follow_up.await.unwrap();
    assert_eq!(*follow_up_result, 7);
}

// ═══════════════════════════════════════════════════════════════════════
//  Timeout rejects the task and a subsequent one still completes
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn timeout_rejects_task_and_queue_recovers() {
    let queue: TaskQueue<u32> = TaskQueue::new(
        QueueOptions::new()
            .concurrency(1)
            .timeout(Duration::from_millis(20)),
    )
    .unwrap();

    let error_waiter = queue.clone();
    let error_signal = tokio::spawn(async move { error_waiter.on_error().await });

    let slow = queue
        .add(
            |_token| async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok::<_, pqueue::TaskError>(1u32)
            },
            TaskOptions::new(),
        )
        .await
        .unwrap();

    let slow_result = slow.await;
    assert!(matches!(slow_result, Err(pqueue::TaskError::Timeout)));

    let emitted = error_signal.await.unwrap();
    assert!(matches!(*emitted, pqueue::TaskError::Timeout));

    let fast = queue
        .add(
            |_token| async { Ok::<_, pqueue::TaskError>(99u32) },
            TaskOptions::new(),
        )
        .await
        .unwrap();
    let fast_result = fast.await.unwrap();
    assert_eq!(*fast_result, 99);
}

// ═══════════════════════════════════════════════════════════════════════
//  Clearing a rate-limited queue reports the transition
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn clear_during_rate_limit_emits_cleared() {
    let queue: TaskQueue<u32> = TaskQueue::new(
        QueueOptions::new()
            .concurrency(1)
            .interval_cap(1)
            .interval(Duration::from_millis(200)),
    )
    .unwrap();

    let first = queue
        .add(
            |_token| async { Ok::<_, pqueue::TaskError>(1u32) },
            TaskOptions::new(),
        )
        .await
        .unwrap();
    first.await.unwrap();

    // The second task would be blocked by the window; enqueue it, observe
    // the rate-limited flag, then clear.
    let _second = queue
        .add(
            |_token| async { Ok::<_, pqueue::TaskError>(2u32) },
            TaskOptions::new(),
        )
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(queue.is_rate_limited().await);

    queue.clear().await;
    assert_eq!(queue.size().await, 0);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!queue.is_rate_limited().await);
}

// ═══════════════════════════════════════════════════════════════════════
//  Concurrency cap is honoured
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn concurrency_cap_limits_parallel_running() {
    let queue: TaskQueue<()> = TaskQueue::new(QueueOptions::new().concurrency(2)).unwrap();

    let active = Arc::new(AtomicU32::new(0));
    let max_observed = Arc::new(AtomicU32::new(0));

    let mut handles = Vec::new();
    for _ in 0..6 {
        let active = Arc::clone(&active);
        let max_observed = Arc::clone(&max_observed);
        let fut = queue
            .add(
                move |_token| async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    max_observed.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, pqueue::TaskError>(())
                },
                TaskOptions::new(),
            )
            .await
            .unwrap();
        handles.push(fut);
    }

    for h in handles {
        h.await.unwrap();
    }

    assert!(max_observed.load(Ordering::SeqCst) <= 2);
    assert_eq!(queue.concurrency().await, Concurrency::Limited(2));
}

// ═══════════════════════════════════════════════════════════════════════
//  on_idle resolves once both the wait queue and running set are empty
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn on_idle_waits_for_full_drain() {
    let queue: TaskQueue<()> = TaskQueue::new(QueueOptions::new().concurrency(2)).unwrap();

    for _ in 0..4 {
        queue
            .add(
                |_token| async {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok::<_, pqueue::TaskError>(())
                },
                TaskOptions::new(),
            )
            .await
            .unwrap();
    }

    queue.on_idle().await;
    assert_eq!(queue.size().await, 0);
    assert_eq!(queue.pending().await, 0);
}

// ═══════════════════════════════════════════════════════════════════════
//  set_priority re-orders a waiting task without touching running ones
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn set_priority_reorders_waiting_task() {
    let queue: TaskQueue<u32> = TaskQueue::new(
        QueueOptions::new().concurrency(1).auto_start(false),
    )
    .unwrap();

    let order = Arc::new(tokio::sync::Mutex::new(Vec::new()));
    let mut waiters = Vec::new();

    for (label, id) in [(1u32, "a"), (2, "b"), (3, "c")] {
        let order = Arc::clone(&order);
        let fut = queue
            .add(
                move |_token| async move {
                    order.lock().await.push(label);
                    Ok::<_, pqueue::TaskError>(label)
                },
                TaskOptions::new().id(id),
            )
            .await
            .unwrap();
        waiters.push(fut);
    }

    // All three start at priority 0; promote "c" so it runs first.
    queue
        .set_priority(&pqueue::TaskId::Named("c".to_string()), 10)
        .await
        .unwrap();

    queue.start().await;
    for fut in waiters {
        fut.await.unwrap();
    }

    assert_eq!(*order.lock().await, vec![3, 1, 2]);
}

#[tokio::test]
async fn set_priority_unknown_id_errors() {
    let queue: TaskQueue<()> = TaskQueue::new(QueueOptions::new()).unwrap();
    let err = queue
        .set_priority(&pqueue::TaskId::Named("missing".to_string()), 1)
        .await
        .unwrap_err();
    assert!(matches!(err, pqueue::QueueError::TaskNotFound { .. }));
}

// ═══════════════════════════════════════════════════════════════════════
//  Cancelling a large batch before start does not recurse unboundedly and
//  leaves the queue fully drained.
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn ten_thousand_pre_cancelled_tasks_drain_without_overflow() {
    let queue: TaskQueue<()> = TaskQueue::new(
        QueueOptions::new().concurrency(8).auto_start(false),
    )
    .unwrap();

    let mut waiters = Vec::with_capacity(10_000);
    for _ in 0..10_000 {
        let token = CancellationToken::new();
        token.cancel();
        let fut = queue
            .add(
                |_token| async { Ok::<_, pqueue::TaskError>(()) },
                TaskOptions::new().cancel_token(token),
            )
            .await
            .unwrap();
        waiters.push(fut);
    }

    queue.start().await;
    for fut in waiters {
        assert!(matches!(fut.await, Err(pqueue::TaskError::Cancelled(_))));
    }

    queue.on_idle().await;
    assert_eq!(queue.pending().await, 0);
    assert_eq!(queue.size().await, 0);
}

// ═══════════════════════════════════════════════════════════════════════
//  shutdown permanently stops admitting new work without touching tasks
//  already in flight
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn shutdown_rejects_new_submissions() {
    let queue: TaskQueue<u32> = TaskQueue::new(QueueOptions::new().concurrency(1)).unwrap();

    let running = queue
        .add(
            |_token| async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok::<_, pqueue::TaskError>(1u32)
            },
            TaskOptions::new(),
        )
        .await
        .unwrap();

    queue.shutdown().await;
    assert!(queue.is_closed().await);

    let rejected = queue
        .add(
            |_token| async { Ok::<_, pqueue::TaskError>(2u32) },
            TaskOptions::new(),
        )
        .await;
    assert!(matches!(rejected, Err(pqueue::QueueError::Closed)));

    // The task admitted before shutdown still runs to completion.
    let result = running.await.unwrap();
    assert_eq!(*result, 1);
}
