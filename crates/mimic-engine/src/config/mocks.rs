//! Mock definitions loaded from the configuration file.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const SUPPORTED_METHODS: [&str; 6] = ["HEAD", "GET", "POST", "PUT", "DELETE", "PATCH"];

/// A stored mock: which request it answers and the responses it cycles through.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MockDefinition {
    /// Optional identifier; ordering counters fall back to `METHOD path` without it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub method: String,
    pub path: String,
    /// Context path of the owning user; scopes the mock under `/<contextPath>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_path: Option<String>,
    pub responses: Vec<MockReply>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MockReply {
    #[serde(default = "default_status")]
    pub status: u16,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

fn default_status() -> u16 {
    200
}

impl MockDefinition {
    /// Path the mock is served on. User-scoped mocks live under their context path.
    pub fn effective_path(&self) -> String {
        match self.context_path.as_deref().map(|c| c.trim_matches('/')) {
            Some(ctx) if !ctx.is_empty() => format!("/{}{}", ctx, self.path),
            _ => self.path.clone(),
        }
    }

    /// Key used to track response ordering for this mock.
    pub fn ordering_key(&self) -> String {
        self.id
            .clone()
            .unwrap_or_else(|| format!("{} {}", self.method.to_uppercase(), self.effective_path()))
    }

    pub fn validate(&self) -> Result<(), String> {
        if !SUPPORTED_METHODS
            .iter()
            .any(|m| m.eq_ignore_ascii_case(&self.method))
        {
            return Err(format!("unsupported method '{}'", self.method));
        }
        if !self.path.starts_with('/') {
            return Err(format!("path '{}' must start with '/'", self.path));
        }
        if self.responses.is_empty() {
            return Err("at least one response is required".to_string());
        }
        if let Some(reply) = self
            .responses
            .iter()
            .find(|r| !(100..=999).contains(&r.status))
        {
            return Err(format!("invalid status code {}", reply.status));
        }
        Ok(())
    }
}
