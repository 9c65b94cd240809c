//! Core types and trait definitions for the HAL business directory.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! The store backend and the HTTP layer both depend on it.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod audit;
pub mod company;
pub mod error;
pub mod moderation;
pub mod review;
pub mod store;
pub mod user;

pub use error::{Error, Result};
