//! Entry/exit access policy
//!
//! Pure decision function over a channel and the current occupancy status.
//! All registry mutation happens in the caller after a grant.

use crate::domain::types::Channel;
use serde::Serialize;

/// Outcome of the access policy for one recognition event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    GrantEntry,
    GrantExit,
    DenyAlreadyPresent,
    DenyNotPresent,
    DenyUnknown,
}

impl Decision {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::GrantEntry => "grant_entry",
            Decision::GrantExit => "grant_exit",
            Decision::DenyAlreadyPresent => "deny_already_present",
            Decision::DenyNotPresent => "deny_not_present",
            Decision::DenyUnknown => "deny_unknown",
        }
    }

    #[inline]
    pub fn is_grant(&self) -> bool {
        matches!(self, Decision::GrantEntry | Decision::GrantExit)
    }

    /// Occupancy status the registry must move to when this decision is applied
    #[inline]
    pub fn target_status(&self) -> Option<bool> {
        match self {
            Decision::GrantEntry => Some(true),
            Decision::GrantExit => Some(false),
            _ => None,
        }
    }
}

/// Decide access for a channel given the identity's current status
///
/// `None` means the identity is not in the registry.
pub fn decide(channel: Channel, current_status: Option<bool>) -> Decision {
    match (channel, current_status) {
        (_, None) => Decision::DenyUnknown,
        (Channel::Entry, Some(false)) => Decision::GrantEntry,
        (Channel::Entry, Some(true)) => Decision::DenyAlreadyPresent,
        (Channel::Exit, Some(true)) => Decision::GrantExit,
        (Channel::Exit, Some(false)) => Decision::DenyNotPresent,
    }
}
