//! Domain layer: render decisions and the request/response values they operate on.

pub mod request;
pub mod response;
pub mod rules;

pub use request::{IncomingRequest, RenderRequest, strip_query};
pub use response::{HeaderFilter, RenderedResponse};
pub use rules::{AnchoredPattern, RuleSet};
