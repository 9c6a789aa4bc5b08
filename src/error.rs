use thiserror::Error;

use crate::vk::VkApiError;

/// Application-level failures surfaced to the CLI.
#[derive(Debug, Error)]
pub enum AppError {
    /// An operation that needs a current user ran before one was set.
    /// Distinct from a run that simply found zero matches.
    #[error("no current user is set")]
    NoCurrentUser,

    #[error("no such user: {0}")]
    UserNotFound(String),

    /// The profile exists but is closed or deactivated.
    #[error("the user's profile is unavailable")]
    UserUnavailable,

    #[error("provider request failed")]
    Provider(#[from] VkApiError),

    #[error("storage operation failed")]
    Storage(#[from] sqlx::Error),

    #[error("failed to export matches")]
    Export(#[source] anyhow::Error),
}
