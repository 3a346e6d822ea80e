//! # Ownership Resolver
//!
//! ## Responsibility
//! Decide the current user's [`Role`] for a normalized room.
//!
//! ## Precedence
//! 1. Creator profile username *and* email equal the user's.
//! 2. Creator id string-equals the user id (case-sensitive).
//! 3. Host display name equals the username, ignoring ASCII case.
//! 4. The room is joined (ledger or confirmed by the server).
//! 5. Otherwise a stranger.
//!
//! The first matching rule wins. When a later rule disagrees with the winner
//! the mismatch is logged at `debug` and left alone.

use serde::Serialize;
use tracing::debug;

use crate::normalize::RoomView;
use crate::session::CurrentUser;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Member,
    Stranger,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Owner => write!(f, "owner"),
            Role::Member => write!(f, "member"),
            Role::Stranger => write!(f, "stranger"),
        }
    }
}

/// Which ownership heuristic matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OwnerRule {
    Profile,
    CreatorId,
    HostName,
}

fn profile_matches(user: &CurrentUser, view: &RoomView) -> bool {
    view.creator.as_ref().is_some_and(|c| {
        c.username.as_deref() == Some(user.username.as_str())
            && c.email.as_deref() == Some(user.email.as_str())
    })
}

fn creator_id_matches(user: &CurrentUser, view: &RoomView) -> bool {
    !user.id.is_empty() && view.creator_id.as_deref() == Some(user.id.as_str())
}

fn host_matches(user: &CurrentUser, view: &RoomView) -> bool {
    !user.username.is_empty() && view.host.eq_ignore_ascii_case(&user.username)
}

/// Resolve the role of `user` in `view`. Without a signed-in user every
/// room is a stranger's.
pub fn resolve(user: Option<&CurrentUser>, view: &RoomView) -> Role {
    let Some(user) = user else {
        return Role::Stranger;
    };

    let profile = profile_matches(user, view);
    let by_id = creator_id_matches(user, view);
    let by_host = host_matches(user, view);

    let winner = if profile {
        Some(OwnerRule::Profile)
    } else if by_id {
        Some(OwnerRule::CreatorId)
    } else if by_host {
        Some(OwnerRule::HostName)
    } else {
        None
    };

    if let Some(rule) = winner {
        let id_disagrees = view.creator_id.is_some() && !by_id;
        let profile_disagrees = view.creator.is_some() && !profile;
        if id_disagrees || profile_disagrees {
            debug!(
                room_id = %view.room_id,
                rule = ?rule,
                creator_id = ?view.creator_id,
                host = %view.host,
                "ownership heuristics disagree; first match wins"
            );
        }
        return Role::Owner;
    }

    if view.membership.is_member() {
        Role::Member
    } else {
        Role::Stranger
    }
}
