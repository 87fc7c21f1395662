//! Crawler pre-render gate for axum applications.
//!
//! Requests from crawler user agents are answered with snapshots produced by
//! a remote prerender service instead of the application's own handlers.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
mod util;
