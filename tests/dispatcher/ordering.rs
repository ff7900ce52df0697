//! Listener registry behaviour: priority, once, stop, short-circuit, unsubscribe.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use routed_events::{Context, DispatchError, ListenerError, ListenerResult, SubscribeOptions};

use crate::support::{order_created, sync_dispatcher, CallLog};

#[test]
fn listeners_run_in_priority_order() {
    let dispatcher = sync_dispatcher();
    let log = CallLog::new();

    dispatcher.on_with("order.created", SubscribeOptions::new().priority(10), log.recorder("p10"));
    dispatcher.on_with("order.created", SubscribeOptions::new().priority(-5), log.recorder("p-5"));
    dispatcher.on_with("order.created", SubscribeOptions::new().priority(0), log.recorder("p0"));
    dispatcher.on_with("order.created", SubscribeOptions::new().priority(3), log.recorder("p3"));

    dispatcher
        .dispatch(&Context::background(), order_created("o-1"))
        .unwrap();

    assert_eq!(log.entries(), vec!["p-5", "p0", "p3", "p10"]);
}

#[test]
fn equal_priorities_keep_registration_order() {
    let dispatcher = sync_dispatcher();
    let log = CallLog::new();

    dispatcher.on("order.created", log.recorder("first"));
    dispatcher.on_with("order.created", SubscribeOptions::new().priority(1), log.recorder("late"));
    dispatcher.on("order.created", log.recorder("second"));
    dispatcher.on("order.created", log.recorder("third"));

    dispatcher
        .dispatch(&Context::background(), order_created("o-1"))
        .unwrap();

    assert_eq!(log.entries(), vec!["first", "second", "third", "late"]);
}

#[test]
fn once_listener_fires_exactly_once() {
    let dispatcher = sync_dispatcher();
    let log = CallLog::new();

    let once = dispatcher.on_with("order.created", SubscribeOptions::new().once(), log.recorder("once"));
    dispatcher.on("order.created", log.recorder("always"));
    assert_eq!(dispatcher.listener_count("order.created"), 2);

    let ctx = Context::background();
    dispatcher.dispatch(&ctx, order_created("o-1")).unwrap();
    assert_eq!(dispatcher.listener_count("order.created"), 1);
    assert!(!once.is_active());

    dispatcher.dispatch(&ctx, order_created("o-2")).unwrap();
    assert_eq!(log.entries(), vec!["once", "always", "always"]);
}

#[test]
fn once_listener_is_removed_even_when_it_fails() {
    let dispatcher = sync_dispatcher();
    dispatcher.on_with(
        "order.created",
        SubscribeOptions::new().once(),
        |_, _| -> ListenerResult { Err(ListenerError::Rejected("out of stock".into())) },
    );

    let ctx = Context::background();
    assert!(dispatcher.dispatch(&ctx, order_created("o-1")).is_err());
    assert_eq!(dispatcher.listener_count("order.created"), 0);
    assert!(dispatcher.dispatch(&ctx, order_created("o-2")).is_ok());
}

#[test]
fn once_listener_fires_once_under_concurrent_dispatch() {
    let dispatcher = sync_dispatcher();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    dispatcher.on_with("order.created", SubscribeOptions::new().once(), move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let barrier = Arc::new(Barrier::new(16));
    let handles: Vec<_> = (0..16)
        .map(|i| {
            let dispatcher = dispatcher.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                dispatcher
                    .dispatch(&Context::background(), order_created(&format!("o-{}", i)))
                    .unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(dispatcher.listener_count("order.created"), 0);
}

#[test]
fn stop_propagation_halts_without_error() {
    let dispatcher = sync_dispatcher();
    let log = CallLog::new();

    let first = log.clone();
    dispatcher.on_with("order.created", SubscribeOptions::new().priority(1), move |_, _| {
        first.push("a");
        Err(ListenerError::StopPropagation)
    });
    dispatcher.on_with("order.created", SubscribeOptions::new().priority(2), log.recorder("b"));

    let result = dispatcher.dispatch(&Context::background(), order_created("o-1"));

    assert!(result.is_ok());
    assert_eq!(log.entries(), vec!["a"]);
}

#[test]
fn listener_error_short_circuits() {
    let dispatcher = sync_dispatcher();
    let log = CallLog::new();

    dispatcher.on_with("order.created", SubscribeOptions::new().priority(1), |_, _| {
        Err(ListenerError::Rejected("invalid total".into()))
    });
    dispatcher.on_with("order.created", SubscribeOptions::new().priority(2), log.recorder("b"));

    let err = dispatcher
        .dispatch(&Context::background(), order_created("o-1"))
        .unwrap_err();

    match err {
        DispatchError::Listener { event, source } => {
            assert_eq!(event, "order.created");
            assert!(matches!(source, ListenerError::Rejected(ref reason) if reason == "invalid total"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(log.entries().is_empty());
}

#[test]
fn listeners_only_see_their_event_name() {
    let dispatcher = sync_dispatcher();
    let log = CallLog::new();
    dispatcher.on("order.updated", log.recorder("updated"));

    dispatcher
        .dispatch(&Context::background(), order_created("o-1"))
        .unwrap();

    assert!(log.entries().is_empty());
}

#[test]
fn unsubscribe_twice_removes_one_listener() {
    let dispatcher = sync_dispatcher();
    let log = CallLog::new();

    let sub = dispatcher.on("order.created", log.recorder("a"));
    dispatcher.on("order.created", log.recorder("b"));
    dispatcher.on("order.updated", log.recorder("other"));

    sub.unsubscribe();
    sub.unsubscribe();

    assert_eq!(dispatcher.listener_count("order.created"), 1);
    assert_eq!(dispatcher.listener_count("order.updated"), 1);

    dispatcher
        .dispatch(&Context::background(), order_created("o-1"))
        .unwrap();
    assert_eq!(log.entries(), vec!["b"]);
}

#[test]
fn concurrent_subscribe_loses_nothing() {
    let dispatcher = sync_dispatcher();
    let barrier = Arc::new(Barrier::new(100));

    let handles: Vec<_> = (0..100)
        .map(|_| {
            let dispatcher = dispatcher.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                dispatcher.on("order.created", |_, _| Ok(()))
            })
        })
        .collect();
    let subs: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(dispatcher.listener_count("order.created"), 100);
    assert!(subs.iter().all(|sub| sub.is_active()));
}

#[test]
fn listener_may_subscribe_during_dispatch() {
    let dispatcher = sync_dispatcher();
    let inner = dispatcher.clone();
    let log = CallLog::new();
    let late = log.clone();

    dispatcher.on("order.created", move |_, _| {
        inner.on("order.created", late.recorder("late"));
        Ok(())
    });

    let ctx = Context::background();
    dispatcher.dispatch(&ctx, order_created("o-1")).unwrap();
    // The snapshot taken for the first dispatch did not include it.
    assert!(log.entries().is_empty());
    assert_eq!(dispatcher.listener_count("order.created"), 2);

    dispatcher.dispatch(&ctx, order_created("o-2")).unwrap();
    assert_eq!(log.entries(), vec!["late"]);
}

#[test]
fn listener_may_unsubscribe_itself() {
    let dispatcher = sync_dispatcher();
    let calls = Arc::new(AtomicUsize::new(0));
    let slot: Arc<std::sync::Mutex<Option<routed_events::Subscription>>> = Arc::default();

    let counter = Arc::clone(&calls);
    let own = Arc::clone(&slot);
    let sub = dispatcher.on("order.created", move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
        if let Some(sub) = own.lock().unwrap().as_ref() {
            sub.unsubscribe();
        }
        Ok(())
    });
    *slot.lock().unwrap() = Some(sub);

    let ctx = Context::background();
    dispatcher.dispatch(&ctx, order_created("o-1")).unwrap();
    dispatcher.dispatch(&ctx, order_created("o-2")).unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!dispatcher.has_listeners("order.created"));
}

#[test]
fn event_names_lists_subscribed_names() {
    let dispatcher = sync_dispatcher();
    dispatcher.on("user.login", |_, _| Ok(()));
    dispatcher.on("order.created", |_, _| Ok(()));

    assert_eq!(dispatcher.event_names(), vec!["order.created", "user.login"]);
    assert_eq!(dispatcher.listener_count("unknown"), 0);
}
