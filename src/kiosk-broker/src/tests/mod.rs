//! Broker tests against an in-memory session engine.

mod lifecycle_tests;
mod service_tests;
