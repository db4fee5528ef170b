use serde::Serialize;

/// Envelope wrapping every response body.
///
/// `data` is `null` on errors and on deletes; on a partial failure (record
/// saved, event not published) it carries the saved record.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ApiResponse<T> {
    #[schema(example = true)]
    pub success: bool,
    #[schema(example = "Request 'job-1' created")]
    pub message: String,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn failure(message: impl Into<String>, data: Option<T>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data,
        }
    }
}

impl ApiResponse<()> {
    /// Successful response without a body, e.g. after a delete.
    pub fn empty(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
        }
    }
}
