//! Integration tests for inproc_engine
//!
//! Each test bootstraps its own engine root in a temporary directory, so
//! tests are independent and need no external setup.
//! Run with: cargo test --test integration

mod helpers;

mod completion_protocol;
mod engine_lifecycle;
mod statements;
