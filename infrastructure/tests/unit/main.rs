//! Unit tests for che-infrastructure
//!
//! These tests use in-memory fakes and run fast without external I/O. Tests
//! needing a live Valkey are ignored by default.

mod converters;
mod idle;
mod middleware;
mod mocks;
mod properties;
mod provisioners;
mod subscriptions;
