//! JSON body extractor with field-level validation errors.
//!
//! Wraps `axum::Json` and turns its rejections into 422 `ValidationError`
//! responses listing the failing fields, e.g.
//! `{"loc": ["body", "price"], "msg": "field required", "type": "value_error.missing"}`.

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request},
    Json,
};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{field_issue, ApiError};
use crate::middleware::validation::JSON_REQUIRED_DETAIL;

/// Deserialized JSON body. Rejections are validation errors.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ValidJson(value)),
            Err(rejection) => Err(rejection_to_error(rejection)),
        }
    }
}

fn rejection_to_error(rejection: JsonRejection) -> ApiError {
    match rejection {
        JsonRejection::JsonDataError(e) => {
            ApiError::validation(vec![data_error_issue(&e.body_text())])
        }
        JsonRejection::JsonSyntaxError(e) => ApiError::validation(vec![field_issue(
            None,
            strip_location(after_prefix(&e.body_text())),
            "value_error.jsondecode",
        )]),
        JsonRejection::MissingJsonContentType(_) => ApiError::bad_request(JSON_REQUIRED_DETAIL),
        other => ApiError::bad_request(other.body_text()),
    }
}

/// Drop axum's fixed lead-in ("Failed to deserialize ...: ").
fn after_prefix(text: &str) -> &str {
    text.split_once("target type: ")
        .or_else(|| text.split_once("JSON body: "))
        .map(|(_, rest)| rest)
        .unwrap_or(text)
}

/// Drop serde's trailing " at line L column C".
fn strip_location(text: &str) -> &str {
    text.rfind(" at line ")
        .map(|idx| &text[..idx])
        .unwrap_or(text)
}

/// Build one issue from a serde data error message.
fn data_error_issue(text: &str) -> Value {
    let message = strip_location(after_prefix(text));

    if let Some(rest) = message.strip_prefix("missing field `") {
        if let Some((field, _)) = rest.split_once('`') {
            return field_issue(Some(field), "field required", "value_error.missing");
        }
    }

    // serde_path_to_error renders "path.to.field: message"
    if let Some((path, msg)) = message.split_once(": ") {
        if !path.is_empty() && !path.contains(' ') && path != "." {
            return field_issue(Some(path), msg, "type_error");
        }
    }

    field_issue(None, message, "type_error")
}
