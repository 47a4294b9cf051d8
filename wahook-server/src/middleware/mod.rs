//! HTTP middleware stack.

pub mod auth;
pub mod cors;
pub mod signature;
pub mod trace;
