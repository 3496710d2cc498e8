use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("channel {0} not found")]
    ChannelNotFound(Uuid),

    #[error("channel #{0} not found")]
    ChannelNameNotFound(String),

    #[error("message {0} not found")]
    MessageNotFound(Uuid),

    #[error("parent message {0} does not exist in this channel")]
    InvalidParent(Uuid),

    #[error("only admins can start new posts in this channel, you can still reply")]
    AdminOnlyChannel,

    #[error("admin access required")]
    AdminRequired,

    #[error("channel name '{0}' is already taken")]
    Conflict(String),

    #[error("{0}")]
    InvalidInput(String),
}

impl CoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ChannelNotFound(_) | Self::ChannelNameNotFound(_) | Self::MessageNotFound(_)
        )
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
