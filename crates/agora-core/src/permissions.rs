use agora_types::models::{Author, Channel};
use uuid::Uuid;

use crate::error::{CoreError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    AdminOnlyChannel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Allowed,
    Denied(DenialReason),
}

impl Permission {
    pub fn is_allowed(self) -> bool {
        self == Self::Allowed
    }

    pub fn into_result(self) -> Result<()> {
        match self {
            Self::Allowed => Ok(()),
            Self::Denied(DenialReason::AdminOnlyChannel) => Err(CoreError::AdminOnlyChannel),
        }
    }
}

/// Decide whether `author` may post in `channel`.
///
/// Open channels accept everything. Admin-only channels accept replies from
/// anyone and top-level posts only from privileged authors.
pub fn can_post(channel: &Channel, author: &Author, parent_id: Option<Uuid>) -> Permission {
    if !channel.is_admin_only || parent_id.is_some() || author.is_privileged {
        Permission::Allowed
    } else {
        Permission::Denied(DenialReason::AdminOnlyChannel)
    }
}

/// Channel provisioning is reserved to privileged users.
pub fn can_manage_channels(author: &Author) -> bool {
    author.is_privileged
}
