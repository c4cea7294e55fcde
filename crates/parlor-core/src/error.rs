use thiserror::Error;

/// Failure taxonomy for the messaging core.
///
/// Ownership failures deliberately surface as the NotFound variants rather
/// than a Forbidden kind, so non-participants cannot confirm that a chat or
/// message exists. Pair-uniqueness conflicts are absorbed inside
/// `ChatRegistry::get_or_create_chat` and never reach callers.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("User not found")]
    UserNotFound,

    #[error("Chat not found")]
    ChatNotFound,

    #[error("Message not found")]
    MessageNotFound,

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl CoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Stable machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UserNotFound => "user_not_found",
            Self::ChatNotFound => "chat_not_found",
            Self::MessageNotFound => "message_not_found",
            Self::Validation(_) => "validation_error",
            Self::Internal(_) => "internal_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
