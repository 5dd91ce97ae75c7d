//! Session orchestration and per-session context

mod auth;
mod orchestrator;

pub use auth::{AuthContext, AUTH_METHOD_VAR, USER_INFO_VAR};
pub use orchestrator::{Orchestrator, RunRequest, SessionContext, SessionOptions};
