//! HTTP middleware stack: CORS policy and per-request tracing spans.

pub mod cors;
pub mod trace;
