use thiserror::Error;

/// Message shown to callers for both missing and foreign objects.
pub const GENERIC_FAILURE: &str = "request failed";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("database error: {0}")]
    Db(#[from] sea_orm::DbErr),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{}", multiline("Not found", .0))]
    NotFound(String),
    #[error("{}", multiline("Forbidden", .0))]
    Forbidden(String),
    #[error("{}", multiline("Invalid input", .0))]
    InvalidInput(String),
    #[error("cascade rolled back: {0}")]
    Cascade(#[source] sea_orm::DbErr),
}

impl AppError {
    /// Text safe to hand to an external caller. Missing and foreign objects
    /// are indistinguishable here.
    pub fn public_message(&self) -> String {
        match self {
            AppError::NotFound(_) | AppError::Forbidden(_) => GENERIC_FAILURE.to_string(),
            AppError::InvalidInput(_) => self.to_string(),
            AppError::Cascade(_) => "operation rolled back; nothing was changed".to_string(),
            AppError::Io(_) | AppError::Db(_) | AppError::Json(_) => "internal error".to_string(),
        }
    }

    /// Re-tags a database failure raised inside a delete/restore cascade.
    pub fn into_cascade(self) -> AppError {
        match self {
            AppError::Db(err) => AppError::Cascade(err),
            other => other,
        }
    }
}

fn multiline(label: &str, message: &str) -> String {
    if message.contains('\n') {
        format!("{label}:\n{message}")
    } else {
        format!("{label}: {message}")
    }
}
