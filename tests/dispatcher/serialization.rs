//! Envelope round trips, the type registry, and broker redelivery.

use std::any::Any;
use std::sync::mpsc::channel;

use chrono::{DateTime, Utc};
use routed_events::bus::InMemoryBus;
use routed_events::codec::{Envelope, RawEvent, RegistryError, TypeRegistry};
use routed_events::{
    Context, DispatchError, DispatchOptions, Dispatcher, Event, ListenerResult, TypedEvent,
};
use serde_json::value::RawValue;

use crate::support::{order_created, recv, sync_dispatcher, OrderCreated, UserLogin};

#[test]
fn registered_type_round_trips_with_trace() {
    let registry = TypeRegistry::new();
    registry.register::<OrderCreated>().unwrap();

    let original = order_created("o-1");
    let bytes = Envelope::seal(&original, Some("trace-1"))
        .unwrap()
        .to_bytes()
        .unwrap();
    let decoded = registry.decode(&Envelope::from_slice(&bytes).unwrap()).unwrap();

    assert_eq!(decoded.event.name(), original.name());
    assert_eq!(decoded.trace_id.as_deref(), Some("trace-1"));
    assert_eq!(decoded.event.downcast_ref::<OrderCreated>(), Some(&original));
}

#[test]
fn unregistered_name_keeps_raw_body() {
    let registry = TypeRegistry::new();
    let original = order_created("o-1");
    let envelope = Envelope::seal(&original, None).unwrap();
    let body = envelope.payload.get().to_string();

    let decoded = registry
        .decode(&Envelope::from_slice(&envelope.to_bytes().unwrap()).unwrap())
        .unwrap();

    let raw = decoded.event.downcast_ref::<RawEvent>().unwrap();
    assert_eq!(raw.name(), "order.created");
    assert_eq!(raw.payload().get(), body);
    assert_eq!(
        serde_json::from_str::<serde_json::Value>(raw.payload().get()).unwrap(),
        serde_json::to_value(&original).unwrap()
    );
    assert!(decoded.trace_id.is_none());
}

#[test]
fn name_collision_is_rejected() {
    #[derive(Debug, serde::Serialize, serde::Deserialize, Event)]
    #[event(name = "order.created")]
    struct LegacyOrderCreated {
        id: u64,
        occurred_at: DateTime<Utc>,
    }

    let dispatcher = sync_dispatcher();
    dispatcher.register_type::<OrderCreated>().unwrap();
    dispatcher.register_type::<OrderCreated>().unwrap();

    let err = dispatcher.register_type::<LegacyOrderCreated>().unwrap_err();
    assert!(matches!(err, RegistryError::NameConflict { .. }));
    assert_eq!(dispatcher.types().names(), vec![OrderCreated::NAME]);
}

#[test]
fn custom_timestamp_field_is_used() {
    let login = UserLogin {
        user_id: "u-1".into(),
        at: "2024-05-01T12:00:00Z".parse().unwrap(),
    };
    assert_eq!(login.occurred_at(), login.at);
    assert_eq!(UserLogin::NAME, "user.login");
}

struct Unencodable {
    occurred_at: DateTime<Utc>,
}

impl Event for Unencodable {
    fn name(&self) -> &str {
        "order.created"
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    fn encode_body(&self) -> Result<Box<RawValue>, serde_json::Error> {
        Err(<serde_json::Error as serde::ser::Error>::custom("not encodable"))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[test]
fn serialization_failure_publishes_nothing() {
    let bus = InMemoryBus::new();
    let dispatcher = Dispatcher::builder()
        .force_sync(true)
        .publisher(bus.clone())
        .build()
        .unwrap();

    for options in [
        DispatchOptions::new().external("orders"),
        DispatchOptions::new().external("orders").asynchronous(),
    ] {
        let err = dispatcher
            .dispatch_with(
                &Context::background(),
                Unencodable {
                    occurred_at: Utc::now(),
                },
                options,
            )
            .unwrap_err();
        assert!(matches!(err, DispatchError::Serialization(_)));
    }
    assert!(bus.is_empty());
}

#[test]
fn receive_redelivers_in_process_only() {
    let bus = InMemoryBus::new();
    // Even with a catch-all route to the broker, received events stay local.
    let dispatcher = crate::support::routed_dispatcher(&bus);
    dispatcher.register_type::<OrderCreated>().unwrap();

    let (tx, rx) = channel();
    dispatcher.on("order.created", move |ctx, event| -> ListenerResult {
        let order = event.downcast_ref::<OrderCreated>().unwrap();
        tx.send((order.order_id.clone(), ctx.trace_id().map(str::to_string)))
            .unwrap();
        Ok(())
    });

    let bytes = Envelope::seal(&order_created("o-5"), Some("trace-5"))
        .unwrap()
        .to_bytes()
        .unwrap();
    dispatcher.receive(&Context::background(), &bytes).unwrap();

    assert_eq!(recv(&rx), ("o-5".to_string(), Some("trace-5".to_string())));
    assert!(bus.is_empty());
}

#[test]
fn receive_rejects_malformed_bytes() {
    let dispatcher = sync_dispatcher();
    let err = dispatcher
        .receive(&Context::background(), b"{\"event_name\":")
        .unwrap_err();
    assert!(matches!(err, DispatchError::Decode(_)));
}

#[test]
fn receive_with_mismatched_registered_body_fails() {
    let dispatcher = sync_dispatcher();
    dispatcher.register_type::<OrderCreated>().unwrap();

    let bytes = br#"{"event_name":"order.created","payload":{"unexpected":true},"timestamp":"2024-01-01T00:00:00Z"}"#;
    let err = dispatcher
        .receive(&Context::background(), bytes)
        .unwrap_err();
    assert!(matches!(err, DispatchError::Decode(_)));
}
