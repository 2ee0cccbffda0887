//! Built-in middlewares (spec §4.4 "Built-ins and their contracts").

pub mod cache;
pub mod cost;
pub mod logging;
pub mod rate_limit;
pub mod redact;
pub mod retry;
pub mod timeout;
pub mod validation;
