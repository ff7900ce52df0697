mod event;

use proc_macro::TokenStream;

// ============================================================================
// #[derive(Event)]
// ============================================================================

/// Derive `routed_events::Event` and `routed_events::TypedEvent` for a struct.
///
/// The struct must implement `serde::Serialize` and `serde::Deserialize`;
/// the body sent to a broker is the struct's JSON form.
///
/// # Usage
///
/// ```ignore
/// #[derive(Event, Serialize, Deserialize)]
/// #[event(name = "order.created")]
/// struct OrderCreated {
///     order_id: String,
///     #[event(timestamp)]
///     created_at: DateTime<Utc>,
/// }
/// ```
///
/// - `name = "..."`: the addressing key. Defaults to the struct name split on
///   case boundaries and joined with dots (`OrderCreated` -> `order.created`).
/// - `#[event(timestamp)]`: marks the `DateTime<Utc>` field returned by
///   `occurred_at()`. Defaults to a field named `occurred_at`.
#[proc_macro_derive(Event, attributes(event))]
pub fn derive_event(input: TokenStream) -> TokenStream {
    event::derive_event(input)
}
