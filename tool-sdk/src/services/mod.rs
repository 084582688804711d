//! Tool invoker implementations
//!
//! - [`http::HttpToolInvoker`]: calls remote capability endpoints
//! - [`local::LocalToolInvoker`]: deterministic in-process stand-ins

pub mod common;
pub mod http;
pub mod local;

pub use common::{InvokerMetrics, UserAgent};
pub use http::HttpToolInvoker;
pub use local::LocalToolInvoker;
