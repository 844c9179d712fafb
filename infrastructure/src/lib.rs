//! Che workspace runtime infrastructure: exposes modules for the binary and
//! for integration testing.

#![cfg_attr(test, allow(clippy::expect_used))]

pub mod application;
pub mod domain;
pub mod infra;
