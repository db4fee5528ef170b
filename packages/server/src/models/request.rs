use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::entity::request;
use crate::error::AppError;
use crate::store::{NewRequest, RequestChanges};

const NAME_MAX_CHARS: usize = 128;
const STATUS_MAX_CHARS: usize = 64;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateRequestBody {
    /// Unique identifier of the resource. 1-128 characters of `[A-Za-z0-9._-]`.
    #[schema(example = "job-1")]
    pub name: String,
    /// Arbitrary JSON document. Defaults to `{}`.
    #[serde(default = "empty_object")]
    #[schema(value_type = Object, example = json!({"priority": 3}))]
    pub payload: Value,
    /// Defaults to `pending`.
    #[schema(example = "pending")]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateRequestBody {
    /// Replaces the stored payload.
    #[schema(value_type = Object, example = json!({"priority": 5}))]
    pub payload: Value,
    /// Left unchanged when omitted.
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RequestResponse {
    #[schema(example = "job-1")]
    pub name: String,
    #[schema(value_type = Object)]
    pub payload: Value,
    #[schema(example = "pending")]
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<request::Model> for RequestResponse {
    fn from(m: request::Model) -> Self {
        Self {
            name: m.name,
            payload: m.payload,
            status: m.status,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

/// Check a resource name, whether from a body or a path segment.
pub fn validate_name(name: &str) -> Result<(), AppError> {
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if name.is_empty() || name.chars().count() > NAME_MAX_CHARS || !valid_chars {
        return Err(AppError::Validation(format!(
            "Name must be 1-{NAME_MAX_CHARS} characters of letters, digits, '.', '_' or '-'"
        )));
    }
    Ok(())
}

fn validate_status(status: Option<&str>) -> Result<(), AppError> {
    if let Some(status) = status {
        let len = status.trim().chars().count();
        if len == 0 || len > STATUS_MAX_CHARS {
            return Err(AppError::Validation(format!(
                "Status must be 1-{STATUS_MAX_CHARS} characters"
            )));
        }
    }
    Ok(())
}

impl CreateRequestBody {
    pub fn validate(self) -> Result<NewRequest, AppError> {
        validate_name(&self.name)?;
        validate_status(self.status.as_deref())?;
        Ok(NewRequest {
            name: self.name,
            payload: self.payload,
            status: self.status.map(|s| s.trim().to_string()),
        })
    }
}

impl UpdateRequestBody {
    pub fn validate(self) -> Result<RequestChanges, AppError> {
        validate_status(self.status.as_deref())?;
        Ok(RequestChanges {
            payload: self.payload,
            status: self.status.map(|s| s.trim().to_string()),
        })
    }
}
