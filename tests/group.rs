use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use taskstream::{BoxError, CancelScope, TaskError, TaskGroup};

#[tokio::test]
async fn empty_group_waits_immediately() {
    let root = CancelScope::new();
    let group = TaskGroup::new(&root);
    group.wait().await.unwrap();
    assert!(group.scope().is_cancelled());
    assert!(group.scope().cause().is_none());
}

#[tokio::test]
async fn all_tasks_succeed() {
    let root = CancelScope::new();
    let group = TaskGroup::new(&root);
    for _ in 0..3 {
        group.spawn(|_| async { Ok(()) }).await;
    }
    group.wait().await.unwrap();
    // Clean termination cancels the scope without a cause.
    assert!(group.scope().cause().is_none());
}

#[tokio::test]
async fn first_error_wins_and_cancels_siblings() {
    let root = CancelScope::new();
    let group = TaskGroup::new(&root);
    group.spawn(|_| async { Err("err1".into()) }).await;
    // The siblings only resolve after the first error cancels the scope,
    // so the winner is deterministic.
    group
        .spawn(|scope| async move {
            scope.cancelled().await;
            Ok(())
        })
        .await;
    group
        .spawn(|scope| async move {
            scope.cancelled().await;
            Err("err2".into())
        })
        .await;

    let err = group.wait().await.unwrap_err();
    assert_eq!(err.to_string(), "err1");
    assert!(matches!(err, TaskError::Failed(_)));
    assert_eq!(group.scope().cause().unwrap().to_string(), "err1");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn limit_bounds_concurrency() {
    const LIMIT: usize = 10;
    let root = CancelScope::new();
    let group = TaskGroup::with_limit(&root, LIMIT);
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    for _ in 0..1025 {
        let active = active.clone();
        let peak = peak.clone();
        group
            .spawn(move |_| async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_micros(1)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            })
            .await;
    }
    group.wait().await.unwrap();

    assert!(peak.load(Ordering::SeqCst) <= LIMIT, "peak {}", peak.load(Ordering::SeqCst));
    assert_eq!(active.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn canceled_spawn_never_runs_the_body() {
    let root = CancelScope::new();
    root.cancel_after(Duration::from_secs(1));
    let group = TaskGroup::with_limit(&root, 1);
    let entered = Arc::new(AtomicUsize::new(0));

    // The first task takes the only permit and parks on the scope; the
    // second spawn waits for a permit until the deadline cancels the root.
    for _ in 0..2 {
        let entered = entered.clone();
        group
            .spawn(move |scope| async move {
                entered.fetch_add(1, Ordering::SeqCst);
                scope.cancelled().await;
                Ok(())
            })
            .await;
    }

    let err = group.wait().await.unwrap_err();
    assert!(matches!(err, TaskError::Canceled));
    assert_eq!(entered.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn panic_becomes_the_group_error() {
    let root = CancelScope::new();
    let group = TaskGroup::new(&root);
    group.spawn(|_| async { panic!("test panic") }).await;

    let err = group.wait().await.unwrap_err();
    assert!(err.to_string().starts_with("panic: test panic"));
    let panic_err = err.as_panic().expect("expected a captured panic");
    assert_eq!(panic_err.recovered_str(), Some("test panic"));
    assert!(!panic_err.stack_frames().is_empty());
    assert!(format!("{panic_err:#}").contains("[recovered]"));
}

#[tokio::test]
async fn panic_with_error_payload_unwraps_to_it() {
    let root = CancelScope::new();
    let group = TaskGroup::new(&root);
    group
        .spawn(|_| async {
            let inner: BoxError = "inner failure".into();
            std::panic::panic_any(inner)
        })
        .await;

    let err = group.wait().await.unwrap_err();
    assert_eq!(err.to_string(), "panic: inner failure");
    let panic_err = err.as_panic().expect("expected a captured panic");
    let source = std::error::Error::source(panic_err).expect("recovered error");
    assert_eq!(source.to_string(), "inner failure");
}

#[tokio::test]
async fn try_spawn_panic_is_captured_too() {
    let root = CancelScope::new();
    let group = TaskGroup::with_limit(&root, 1);
    assert!(group.try_spawn(|_| async { panic!("test panic") }));
    let err = group.wait().await.unwrap_err();
    assert!(err.to_string().starts_with("panic: test panic"));
}

#[tokio::test(flavor = "multi_thread")]
async fn try_spawn_respects_the_limit() {
    let root = CancelScope::new();
    let group = TaskGroup::with_limit(&root, 2);
    let (release, hold) = tokio::sync::watch::channel(false);

    for _ in 0..2 {
        let mut hold = hold.clone();
        assert!(group.try_spawn(move |_| async move {
            hold.wait_for(|go| *go)
                .await
                .map_err(|_| "releaser dropped")?;
            Ok(())
        }));
    }
    // Both permits are taken synchronously, so the third attempt fails.
    assert!(!group.try_spawn(|_| async { Ok(()) }));

    release.send(true).unwrap();
    group.wait().await.unwrap();
}

#[tokio::test]
async fn zero_limit_accepts_no_task() {
    let root = CancelScope::new();
    let group = TaskGroup::with_limit(&root, 0);
    for _ in 0..64 {
        assert!(!group.try_spawn(|_| async { Ok(()) }));
    }
    group.wait().await.unwrap();
}

#[tokio::test]
async fn try_spawn_on_canceled_group_accepts_without_running() {
    let root = CancelScope::new();
    let group = TaskGroup::with_limit(&root, 1);
    root.cancel();

    let entered = Arc::new(AtomicUsize::new(0));
    let seen = entered.clone();
    assert!(group.try_spawn(move |_| async move {
        seen.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }));
    assert_eq!(entered.load(Ordering::SeqCst), 0);

    let err = group.wait().await.unwrap_err();
    assert!(matches!(err, TaskError::Canceled));
}

#[tokio::test]
async fn parent_cancel_cause_becomes_the_group_result() {
    let root = CancelScope::new();
    let group = TaskGroup::new(&root);
    root.cancel_with(TaskError::failed("parent says stop"));

    let entered = Arc::new(AtomicUsize::new(0));
    let seen = entered.clone();
    group
        .spawn(move |_| async move {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await;
    assert_eq!(entered.load(Ordering::SeqCst), 0);

    let err = group.wait().await.unwrap_err();
    assert_eq!(err.to_string(), "parent says stop");
}

#[tokio::test]
async fn spawns_after_wait_are_inert() {
    let root = CancelScope::new();
    let group = TaskGroup::new(&root);
    group.wait().await.unwrap();

    let entered = Arc::new(AtomicUsize::new(0));
    let seen = entered.clone();
    group
        .spawn(move |_| async move {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await;
    let seen = entered.clone();
    group.try_spawn(move |_| async move {
        seen.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    assert_eq!(entered.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn errors_after_the_first_are_dropped() {
    let root = CancelScope::new();
    let group = TaskGroup::new(&root);
    group.spawn(|_| async { Err("first".into()) }).await;
    for _ in 0..16 {
        group
            .spawn(|scope| async move {
                scope.cancelled().await;
                Err("late".into())
            })
            .await;
    }
    let err = group.wait().await.unwrap_err();
    assert_eq!(err.to_string(), "first");
}
