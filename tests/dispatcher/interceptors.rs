//! Interceptor chain around in-process delivery.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use routed_events::bus::InMemoryBus;
use routed_events::interceptor::{
    DispatchOutcome, FilterInterceptor, LoggingInterceptor, MetricsInterceptor, MetricsRecorder,
};
use routed_events::{
    Context, DispatchError, Event, ListenerError, ListenerResult, Next,
};

use crate::support::{order_created, routed_dispatcher, sync_dispatcher, user_login, CallLog, UserLogin};

fn tracing_interceptor(
    log: &CallLog,
    label: &'static str,
) -> impl Fn(&Context, &dyn Event, Next<'_>) -> ListenerResult + Send + Sync + 'static {
    let log = log.clone();
    move |ctx: &Context, event: &dyn Event, next: Next<'_>| -> ListenerResult {
        log.push(format!("{}:before", label));
        let result = next.run(ctx, event);
        log.push(format!("{}:after", label));
        result
    }
}

#[test]
fn first_registered_is_outermost() {
    let dispatcher = sync_dispatcher();
    let log = CallLog::new();
    dispatcher.use_fn(tracing_interceptor(&log, "outer"));
    dispatcher.use_fn(tracing_interceptor(&log, "inner"));
    dispatcher.on("order.created", log.recorder("listener"));

    dispatcher
        .dispatch(&Context::background(), order_created("o-1"))
        .unwrap();

    assert_eq!(
        log.entries(),
        vec!["outer:before", "inner:before", "listener", "inner:after", "outer:after"]
    );
}

#[test]
fn interceptor_can_short_circuit() {
    let dispatcher = sync_dispatcher();
    let log = CallLog::new();
    dispatcher.use_fn(|_ctx: &Context, _event: &dyn Event, _next: Next<'_>| -> ListenerResult {
        Ok(())
    });
    dispatcher.on("order.created", log.recorder("listener"));

    dispatcher
        .dispatch(&Context::background(), order_created("o-1"))
        .unwrap();

    assert!(log.entries().is_empty());
}

#[test]
fn interceptor_sees_listener_errors_and_may_replace_them() {
    let dispatcher = sync_dispatcher();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    dispatcher.use_fn(move |ctx: &Context, event: &dyn Event, next: Next<'_>| {
        let result = next.run(ctx, event);
        if let Err(e) = &result {
            sink.lock().unwrap().push(e.to_string());
        }
        match result {
            Err(ListenerError::Rejected(reason)) => Err(ListenerError::other(format!("wrapped: {}", reason))),
            other => other,
        }
    });
    dispatcher.on("order.created", |_, _| -> ListenerResult {
        Err(ListenerError::Rejected("bad total".into()))
    });

    let err = dispatcher
        .dispatch(&Context::background(), order_created("o-1"))
        .unwrap_err();

    assert_eq!(*seen.lock().unwrap(), vec!["rejected: bad total"]);
    match err {
        DispatchError::Listener { source: ListenerError::Other(inner), .. } => {
            assert_eq!(inner.to_string(), "wrapped: bad total");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn stop_propagation_passes_through_interceptors_as_success() {
    let dispatcher = sync_dispatcher();
    let outcomes = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&outcomes);
    dispatcher.use_fn(move |ctx: &Context, event: &dyn Event, next: Next<'_>| {
        let result = next.run(ctx, event);
        sink.lock().unwrap().push(matches!(result, Err(ListenerError::StopPropagation)));
        result
    });
    dispatcher.on("order.created", |_, _| -> ListenerResult { Err(ListenerError::StopPropagation) });

    assert!(dispatcher
        .dispatch(&Context::background(), order_created("o-1"))
        .is_ok());
    assert_eq!(*outcomes.lock().unwrap(), vec![true]);
}

#[test]
fn interceptors_do_not_wrap_external_delivery() {
    let bus = InMemoryBus::new();
    let dispatcher = routed_dispatcher(&bus);
    let log = CallLog::new();
    dispatcher.use_fn(tracing_interceptor(&log, "wrap"));

    dispatcher
        .dispatch(&Context::background(), order_created("o-1"))
        .unwrap();

    assert_eq!(bus.len(), 1);
    assert!(log.entries().is_empty());
}

#[test]
fn filter_interceptor_drops_events() {
    let dispatcher = sync_dispatcher();
    let log = CallLog::new();
    dispatcher.use_interceptor(Arc::new(FilterInterceptor::new(
        |_: &Context, event: &dyn Event| {
            event
                .downcast_ref::<UserLogin>()
                .map_or(true, |login| !login.user_id.starts_with("bot-"))
        },
    )));
    dispatcher.on("user.login", log.recorder("login"));

    let ctx = Context::background();
    dispatcher.dispatch(&ctx, user_login("bot-1")).unwrap();
    dispatcher.dispatch(&ctx, user_login("alice")).unwrap();

    assert_eq!(log.entries(), vec!["login"]);
}

#[derive(Clone, Default)]
struct Recorded(Arc<Mutex<Vec<(String, DispatchOutcome)>>>);

impl MetricsRecorder for Recorded {
    fn record(&self, event_name: &str, outcome: DispatchOutcome, _elapsed: Duration) {
        self.0.lock().unwrap().push((event_name.to_string(), outcome));
    }
}

#[test]
fn metrics_and_logging_interceptors_compose() {
    let dispatcher = sync_dispatcher();
    let recorded = Recorded::default();
    dispatcher.use_interceptor(Arc::new(LoggingInterceptor::new()));
    dispatcher.use_interceptor(Arc::new(MetricsInterceptor::new(recorded.clone())));
    dispatcher.on("order.created", |_, _| Ok(()));
    dispatcher.on("user.login", |_, _| -> ListenerResult {
        Err(ListenerError::Rejected("locked".into()))
    });

    let ctx = Context::background();
    dispatcher.dispatch(&ctx, order_created("o-1")).unwrap();
    assert!(dispatcher.dispatch(&ctx, user_login("u-1")).is_err());

    assert_eq!(
        *recorded.0.lock().unwrap(),
        vec![
            ("order.created".to_string(), DispatchOutcome::Succeeded),
            ("user.login".to_string(), DispatchOutcome::Failed),
        ]
    );
}
