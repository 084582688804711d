use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("request text must not be empty")]
    EmptyText,

    #[error("request id must not be empty")]
    EmptyId,
}

/// A single natural-language request driving one workflow.
///
/// Requests are immutable once accepted; the constructor is the only place
/// where validation happens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    id: String,
    raw_text: String,
    created_at: DateTime<Utc>,
}

impl Request {
    /// Build a request, generating an id when none is supplied.
    pub fn new(raw_text: impl Into<String>, id: Option<String>) -> Result<Self, RequestError> {
        let raw_text = raw_text.into();
        if raw_text.trim().is_empty() {
            return Err(RequestError::EmptyText);
        }

        let id = match id {
            Some(id) => {
                let id = id.trim().to_string();
                if id.is_empty() {
                    return Err(RequestError::EmptyId);
                }
                id
            }
            None => generate_request_id(),
        };

        Ok(Self {
            id,
            raw_text,
            created_at: Utc::now(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn raw_text(&self) -> &str {
        &self.raw_text
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Generate a request id of the form `req_<uuid>`.
pub fn generate_request_id() -> String {
    format!("req_{}", Uuid::new_v4().simple())
}
