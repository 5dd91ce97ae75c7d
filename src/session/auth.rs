//! Authentication context passed through to executed scripts

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DigyError, Result};

pub const AUTH_METHOD_VAR: &str = "DIGY_AUTH_METHOD";
pub const USER_INFO_VAR: &str = "DIGY_USER_INFO";

/// Who is running the script and how they authenticated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthContext {
    pub method: String,
    pub user_info: Value,
}

impl AuthContext {
    pub fn new(method: impl Into<String>, user_info: Value) -> Self {
        Self {
            method: method.into(),
            user_info,
        }
    }

    /// Build from a method name and an optional JSON user-info document
    pub fn parse(method: &str, user_info: Option<&str>) -> Result<Self> {
        let user_info = match user_info {
            Some(raw) => serde_json::from_str(raw)
                .map_err(|e| DigyError::ConfigError(format!("invalid user info JSON: {}", e)))?,
            None => Value::Object(Default::default()),
        };
        Ok(Self::new(method, user_info))
    }

    /// Environment variables exposing this context to a script
    pub fn env_vars(&self) -> Vec<(String, String)> {
        vec![
            (AUTH_METHOD_VAR.to_string(), self.method.clone()),
            (USER_INFO_VAR.to_string(), self.user_info.to_string()),
        ]
    }
}
