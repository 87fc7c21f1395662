//! axum integration: request adapter and interception middleware.

mod middleware;
mod request;

pub use middleware::{
    PrerenderState, RenderPolicy, UserAgentPolicy, log_failures, prerender_layer,
};

pub(crate) use middleware::{METRIC_INTERCEPT, METRIC_PASSTHROUGH};
