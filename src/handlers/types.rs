//! # Common API Types
//!
//! The success envelope shared by every `/api/v1` handler.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::telemetry;

/// Standard API response wrapper
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T> {
    /// Response data
    pub data: T,
    /// Response metadata
    pub meta: ResponseMeta,
}

/// Response metadata
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ResponseMeta {
    /// Request identifier, equal to the `X-Trace-Id` response header
    #[schema(example = "550e8400-e29b-41d4-a716-446655440000")]
    pub request_id: String,
    /// Response timestamp (ISO 8601)
    #[schema(example = "2024-01-15T10:30:00Z")]
    pub timestamp: String,
}

impl<T> ApiResponse<T> {
    /// Wraps `data`, taking the request id from the active trace context.
    pub fn new(data: T) -> Self {
        Self {
            data,
            meta: ResponseMeta {
                request_id: telemetry::current_trace_id()
                    .unwrap_or_else(|| Uuid::new_v4().to_string()),
                timestamp: Utc::now().to_rfc3339(),
            },
        }
    }
}
