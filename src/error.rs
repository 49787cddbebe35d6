use rocket::http::Status;
use rocket::response::{self, Responder, Response};
use rocket::serde::json::Json;
use rocket::Request;
use thiserror::Error;

/// Storage Gateway error taxonomy (spec §4.1, §7). Distinguishing these
/// (rather than a single opaque error) is what lets the queue worker and
/// recovery subsystem decide retry vs. dead-letter vs. dependency-repair.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("foreign key violation: {0}")]
    FkViolation(String),
    #[error("validation: {0}")]
    Validation(String),
    #[error("transient: {0}")]
    Transient(String),
    #[error("permanent: {0}")]
    Permanent(String),
}

impl StorageError {
    /// Whether a failure of this kind is worth a bounded retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::Transient(_) | StorageError::FkViolation(_))
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::QueryReturnedNoRows => StorageError::NotFound(e.to_string()),
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                // SQLite doesn't distinguish FK from UNIQUE constraint failures in the
                // error code alone; callers that expect an FK violation check the message.
                let msg = e.to_string();
                if msg.contains("FOREIGN KEY") {
                    StorageError::FkViolation(msg)
                } else {
                    StorageError::Conflict(msg)
                }
            }
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::DatabaseBusy
                    || err.code == rusqlite::ErrorCode::DatabaseLocked =>
            {
                StorageError::Transient(e.to_string())
            }
            _ => StorageError::Permanent(e.to_string()),
        }
    }
}

/// Errors raised while translating a raw webhook payload (spec §4.2, §7).
#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("unknown event type: {0}")]
    UnknownEventType(String),
    #[error("malformed payload: {0}")]
    Malformed(String),
    #[error("unresolvable id: {0}")]
    UnresolvableId(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors raised by the action executor (spec §4.6, §7).
#[derive(Error, Debug)]
pub enum ActionError {
    #[error("nlp parse failed: {0}")]
    ParseFailed(String),
    #[error("no matching rules")]
    NoRules,
    #[error("missing trigger link for update_task_status")]
    MissingTriggerLink,
    #[error("unknown parser: {0}")]
    UnknownParser(String),
    #[error("provider request failed: {0}")]
    Provider(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Wraps any internal error for Rocket route handlers as `(Status, Json)`.
pub struct ApiError {
    pub status: Status,
    pub message: String,
}

impl ApiError {
    pub fn new(status: Status, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        let status = match &e {
            StorageError::NotFound(_) => Status::NotFound,
            StorageError::Conflict(_) => Status::Conflict,
            StorageError::FkViolation(_) => Status::UnprocessableEntity,
            StorageError::Validation(_) => Status::UnprocessableEntity,
            StorageError::Transient(_) => Status::ServiceUnavailable,
            StorageError::Permanent(_) => Status::InternalServerError,
        };
        ApiError::new(status, e.to_string())
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for ApiError {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'o> {
        let body = Json(serde_json::json!({"error": self.message}));
        Response::build_from(body.respond_to(req)?)
            .status(self.status)
            .ok()
    }
}
