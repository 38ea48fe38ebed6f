//! Inbound event and identity types.
//!
//! This module defines the transport-boundary shape of an inbound chat
//! message. Adapters translate their wire formats into [`MessageEvent`];
//! everything above the transport works with this one representation.

/// A platform identifier for a user, group, or discuss channel.
pub type Id = i64;

/// Classification of the conversation an event originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChatKind {
    /// One-on-one conversation with the endpoint.
    Private,
    /// Group conversation.
    Group,
    /// Discuss (ad-hoc sub-group) conversation.
    Discuss,
    /// Anything the adapter could not classify.
    Other,
}

/// The three identity dimensions a scope can restrict on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentityKind {
    /// The sending user.
    User,
    /// The group the message was posted in.
    Group,
    /// The discuss channel the message was posted in.
    Discuss,
}

/// Where an outbound message should be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    /// Send privately to a user.
    User(Id),
    /// Send into a group.
    Group(Id),
    /// Send into a discuss channel.
    Discuss(Id),
}

/// An inbound chat message as seen by the router.
///
/// Carries the minimum the routing core needs: the originating identity,
/// the optional group/discuss ids, the conversation kind, the raw text,
/// and the endpoint (self) identity the message was delivered to.
#[derive(Debug, Clone)]
pub struct MessageEvent {
    /// Identity of the sending user.
    pub sender: Id,
    /// Group the message was posted in, if any.
    pub group: Option<Id>,
    /// Discuss channel the message was posted in, if any.
    pub discuss: Option<Id>,
    /// Conversation classification.
    pub kind: ChatKind,
    /// Raw message text. Non-text content is expected to have been
    /// degraded to placeholder tokens by the adapter.
    pub text: String,
    /// The endpoint identity this event was delivered to.
    pub self_id: Id,
}

impl MessageEvent {
    /// Creates a private-conversation event.
    pub fn private(sender: Id, self_id: Id, text: impl Into<String>) -> Self {
        Self {
            sender,
            group: None,
            discuss: None,
            kind: ChatKind::Private,
            text: text.into(),
            self_id,
        }
    }

    /// Creates a group-conversation event.
    pub fn group(sender: Id, group: Id, self_id: Id, text: impl Into<String>) -> Self {
        Self {
            sender,
            group: Some(group),
            discuss: None,
            kind: ChatKind::Group,
            text: text.into(),
            self_id,
        }
    }

    /// Creates a discuss-conversation event.
    pub fn discuss(sender: Id, discuss: Id, self_id: Id, text: impl Into<String>) -> Self {
        Self {
            sender,
            group: None,
            discuss: Some(discuss),
            kind: ChatKind::Discuss,
            text: text.into(),
            self_id,
        }
    }

    /// Returns `true` for one-on-one conversations.
    pub fn is_private(&self) -> bool {
        self.kind == ChatKind::Private
    }

    /// Returns this event's id on the given scope axis, if set.
    pub fn axis_id(&self, axis: IdentityKind) -> Option<Id> {
        match axis {
            IdentityKind::User => Some(self.sender),
            IdentityKind::Group => self.group,
            IdentityKind::Discuss => self.discuss,
        }
    }

    /// The target a reply to this event should be sent to.
    ///
    /// Group and discuss messages are answered in place; everything else
    /// goes back to the sender privately.
    pub fn reply_target(&self) -> Target {
        if let Some(discuss) = self.discuss {
            Target::Discuss(discuss)
        } else if let Some(group) = self.group {
            Target::Group(group)
        } else {
            Target::User(self.sender)
        }
    }
}
