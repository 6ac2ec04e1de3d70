//! Tollgate - Per-client Token Bucket Admission Control
//!
//! This crate decides whether a client's request should be admitted using a
//! continuous token bucket per client key. Buckets live in a bounded,
//! idle-expiring store. The decision is available as a library call, over
//! gRPC, and as an HTTP endpoint or axum middleware answering 429.

pub mod config;
pub mod error;
pub mod grpc;
pub mod http;
pub mod ratelimit;
