use std::path::PathBuf;

use crate::error::AppError;

pub const DB_ENV: &str = "TASKBOARD_DB";
pub const HOME_ENV: &str = "TASKBOARD_HOME";
pub const USER_ENV: &str = "TASKBOARD_USER";
pub const LOG_ENV: &str = "TASKBOARD_LOG";
pub const DEFAULT_LOG_FILTER: &str = "warn";
const DB_FILE_NAME: &str = "taskboard.db";

#[derive(Clone, Debug)]
pub struct Config {
    pub db_path: PathBuf,
    pub user: String,
}

impl Config {
    /// Flags win over the environment.
    pub fn resolve(db: Option<PathBuf>, user: Option<String>) -> Result<Self, AppError> {
        Ok(Self {
            db_path: resolve_db_path(db)?,
            user: resolve_user(user)?,
        })
    }
}

/// The result is always absolute; relative values resolve against the
/// current directory.
pub fn resolve_db_path(flag: Option<PathBuf>) -> Result<PathBuf, AppError> {
    let path = if let Some(path) = flag {
        path
    } else if let Some(path) = non_blank_env(DB_ENV) {
        PathBuf::from(path)
    } else if let Some(home) = non_blank_env(HOME_ENV) {
        PathBuf::from(home).join(DB_FILE_NAME)
    } else if let Some(home) = non_blank_env("HOME") {
        PathBuf::from(home).join(".taskboard").join(DB_FILE_NAME)
    } else {
        return Err(AppError::InvalidInput(format!(
            "unable to resolve database path; pass --db or set {DB_ENV}"
        )));
    };
    Ok(std::path::absolute(path)?)
}

pub fn resolve_user(flag: Option<String>) -> Result<String, AppError> {
    let value = flag
        .or_else(|| std::env::var(USER_ENV).ok())
        .ok_or_else(|| {
            AppError::InvalidInput(format!("--user is required (or set {USER_ENV})"))
        })?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::InvalidInput("--user is empty".to_string()));
    }
    Ok(trimmed.to_string())
}

pub fn log_filter() -> String {
    non_blank_env(LOG_ENV).unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string())
}

fn non_blank_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}
