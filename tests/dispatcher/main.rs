//! Dispatcher integration tests.

mod support;
mod ordering;
mod serialization;
mod interceptors;
