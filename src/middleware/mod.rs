//! HTTP middleware for the proxy surface.

pub mod cors;
