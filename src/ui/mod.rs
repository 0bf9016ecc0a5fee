//! Console output helpers
//!
//! Styled status lines on a terminal, plain bracketed prefixes when
//! output is piped or running in CI.

mod context;
mod output;

pub use context::UiContext;
pub use output::{key_value, section, step_info, step_ok, step_ok_detail, step_warn, step_warn_hint};
