//! Request-independent logic shared by the route handlers.

pub mod catalog;
pub mod persist;
