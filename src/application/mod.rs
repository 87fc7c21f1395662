//! Render backend contract and backend assembly.

pub mod backend;
pub mod error;
pub mod registry;

pub use backend::{BackendError, RenderBackend, RenderError};
pub use registry::{BackendConstructor, BackendRegistry};
