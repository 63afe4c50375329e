//! Core types and trait definitions for the Civitas civil-registry portal.
//!
//! This crate is free of HTTP and database dependencies. Persistence and the
//! payment provider sit behind the [`store::PortalStore`] and
//! [`gateway::PaymentGateway`] traits; the lifecycle rules live in
//! [`gate`], [`synthesis`] and [`workflow`].

// Native `async fn` / `impl Future` in traits; the returned futures carry
// explicit `Send` bounds.
#![allow(async_fn_in_trait)]

pub mod account;
pub mod authz;
pub mod document;
pub mod error;
pub mod gate;
pub mod gateway;
pub mod notification;
pub mod payment;
pub mod request;
pub mod stats;
pub mod status;
pub mod store;
pub mod synthesis;
pub mod workflow;

pub use error::{Error, ErrorKind, Result};
