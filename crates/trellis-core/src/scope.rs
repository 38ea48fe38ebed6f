//! Three-axis visibility scopes.
//!
//! A [`Scope`] decides which events a context can see. Each of the three
//! axes (user, group, discuss) is either unrestricted, an inclusion set,
//! or an exclusion set of ids. Scopes are immutable once constructed and
//! canonicalize to a stable string key, so two scopes built from the same
//! id sets in any order collide to one registry entry.
//!
//! # Matching policy
//!
//! Inclusion is closed over the axis value: an event that carries no id
//! on an axis does not satisfy an `Include` restriction there, and an
//! empty inclusion set matches nothing at all. Exclusion is open: a
//! missing axis id passes. An unrestricted axis always passes.

use std::collections::BTreeSet;
use std::fmt;

use crate::error::ScopeError;
use crate::event::{Id, IdentityKind, MessageEvent};

/// One axis of a scope: unrestricted, an inclusion set, or an exclusion set.
///
/// The enum shape itself enforces the invariant that an axis is never
/// simultaneously inclusive and exclusive. `BTreeSet` keeps the ids
/// sorted, which makes the canonical key ordering structural rather than
/// a normalization step.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Axis {
    /// No restriction on this axis.
    Any,
    /// The event's id on this axis must be a member.
    Include(BTreeSet<Id>),
    /// The event's id on this axis must not be a member.
    Exclude(BTreeSet<Id>),
}

impl Axis {
    /// Builds an inclusion axis from any iterator of ids.
    ///
    /// Duplicates collapse; order is irrelevant.
    pub fn include(ids: impl IntoIterator<Item = Id>) -> Self {
        Axis::Include(ids.into_iter().collect())
    }

    /// Builds an exclusion axis from any iterator of ids.
    pub fn exclude(ids: impl IntoIterator<Item = Id>) -> Self {
        Axis::Exclude(ids.into_iter().collect())
    }

    /// Whether the given (possibly absent) axis id satisfies this axis.
    fn permits(&self, id: Option<Id>) -> bool {
        match self {
            Axis::Any => true,
            Axis::Include(set) => id.is_some_and(|id| set.contains(&id)),
            Axis::Exclude(set) => id.is_none_or(|id| !set.contains(&id)),
        }
    }

    fn encode(&self, out: &mut String) {
        use fmt::Write;
        match self {
            Axis::Any => out.push('*'),
            Axis::Include(set) => {
                out.push('+');
                for (i, id) in set.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    let _ = write!(out, "{id}");
                }
            }
            Axis::Exclude(set) => {
                out.push('-');
                for (i, id) in set.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    let _ = write!(out, "{id}");
                }
            }
        }
    }

    fn decode(s: &str) -> Result<Self, ScopeError> {
        let mut chars = s.chars();
        let marker = chars
            .next()
            .ok_or_else(|| ScopeError::InvalidKey(s.to_string()))?;
        let rest = chars.as_str();
        let parse_set = |rest: &str| -> Result<BTreeSet<Id>, ScopeError> {
            if rest.is_empty() {
                return Ok(BTreeSet::new());
            }
            rest.split(',')
                .map(|part| {
                    part.parse::<Id>().map_err(|_| ScopeError::InvalidId {
                        value: part.to_string(),
                    })
                })
                .collect()
        };
        match marker {
            '*' if rest.is_empty() => Ok(Axis::Any),
            '+' => Ok(Axis::Include(parse_set(rest)?)),
            '-' => Ok(Axis::Exclude(parse_set(rest)?)),
            _ => Err(ScopeError::InvalidKey(s.to_string())),
        }
    }
}

/// A three-axis visibility scope over (user, group, discuss).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Scope {
    user: Axis,
    group: Axis,
    discuss: Axis,
}

impl Scope {
    /// The universal scope: all three axes unrestricted.
    pub fn any() -> Self {
        Self {
            user: Axis::Any,
            group: Axis::Any,
            discuss: Axis::Any,
        }
    }

    /// Builds a scope from explicit axes.
    pub fn new(user: Axis, group: Axis, discuss: Axis) -> Self {
        Self {
            user,
            group,
            discuss,
        }
    }

    /// Only these users, anywhere.
    pub fn users(ids: impl IntoIterator<Item = Id>) -> Self {
        Scope::any().with_users(ids)
    }

    /// All users except these, anywhere.
    pub fn except_users(ids: impl IntoIterator<Item = Id>) -> Self {
        Scope::any().without_users(ids)
    }

    /// Only these groups.
    pub fn groups(ids: impl IntoIterator<Item = Id>) -> Self {
        Scope::any().with_groups(ids)
    }

    /// All groups except these. Events outside any group still match.
    pub fn except_groups(ids: impl IntoIterator<Item = Id>) -> Self {
        Scope::any().without_groups(ids)
    }

    /// Only these discuss channels.
    pub fn discusses(ids: impl IntoIterator<Item = Id>) -> Self {
        Scope::any().with_discusses(ids)
    }

    /// All discuss channels except these.
    pub fn except_discusses(ids: impl IntoIterator<Item = Id>) -> Self {
        Scope::any().without_discusses(ids)
    }

    /// Replaces the user axis with an inclusion set.
    pub fn with_users(mut self, ids: impl IntoIterator<Item = Id>) -> Self {
        self.user = Axis::include(ids);
        self
    }

    /// Replaces the user axis with an exclusion set.
    pub fn without_users(mut self, ids: impl IntoIterator<Item = Id>) -> Self {
        self.user = Axis::exclude(ids);
        self
    }

    /// Replaces the group axis with an inclusion set.
    pub fn with_groups(mut self, ids: impl IntoIterator<Item = Id>) -> Self {
        self.group = Axis::include(ids);
        self
    }

    /// Replaces the group axis with an exclusion set.
    pub fn without_groups(mut self, ids: impl IntoIterator<Item = Id>) -> Self {
        self.group = Axis::exclude(ids);
        self
    }

    /// Replaces the discuss axis with an inclusion set.
    pub fn with_discusses(mut self, ids: impl IntoIterator<Item = Id>) -> Self {
        self.discuss = Axis::include(ids);
        self
    }

    /// Replaces the discuss axis with an exclusion set.
    pub fn without_discusses(mut self, ids: impl IntoIterator<Item = Id>) -> Self {
        self.discuss = Axis::exclude(ids);
        self
    }

    /// Returns the axis for the given dimension.
    pub fn axis(&self, kind: IdentityKind) -> &Axis {
        match kind {
            IdentityKind::User => &self.user,
            IdentityKind::Group => &self.group,
            IdentityKind::Discuss => &self.discuss,
        }
    }

    /// `true` when no axis restricts anything.
    pub fn is_universal(&self) -> bool {
        self.user == Axis::Any && self.group == Axis::Any && self.discuss == Axis::Any
    }

    /// Whether this scope matches the given event.
    ///
    /// All three axes must pass; see the module docs for the closed/open
    /// policy on missing axis ids.
    pub fn matches(&self, event: &MessageEvent) -> bool {
        self.user.permits(event.axis_id(IdentityKind::User))
            && self.group.permits(event.axis_id(IdentityKind::Group))
            && self.discuss.permits(event.axis_id(IdentityKind::Discuss))
    }

    /// Produces the canonical string key for this scope.
    ///
    /// Stable under input reordering and duplicate ids: axes are sets and
    /// iterate sorted. The format is `u<axis>|g<axis>|d<axis>` where an
    /// axis is `*`, `+id,id,...`, or `-id,id,...`.
    pub fn key(&self) -> String {
        let mut out = String::from("u");
        self.user.encode(&mut out);
        out.push_str("|g");
        self.group.encode(&mut out);
        out.push_str("|d");
        self.discuss.encode(&mut out);
        out
    }

    /// Parses a canonical key back into a scope.
    pub fn parse(key: &str) -> Result<Self, ScopeError> {
        let mut user = None;
        let mut group = None;
        let mut discuss = None;
        for part in key.split('|') {
            let (slot, rest) = match part.as_bytes().first() {
                Some(b'u') => (&mut user, &part[1..]),
                Some(b'g') => (&mut group, &part[1..]),
                Some(b'd') => (&mut discuss, &part[1..]),
                _ => return Err(ScopeError::InvalidKey(key.to_string())),
            };
            if slot.replace(Axis::decode(rest)?).is_some() {
                return Err(ScopeError::InvalidKey(key.to_string()));
            }
        }
        match (user, group, discuss) {
            (Some(user), Some(group), Some(discuss)) => Ok(Scope {
                user,
                group,
                discuss,
            }),
            _ => Err(ScopeError::InvalidKey(key.to_string())),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_stable_under_reordering() {
        let a = Scope::users([3, 1, 2]).with_groups([9, 5]);
        let b = Scope::users([2, 3, 1, 1]).with_groups([5, 9]);
        assert_eq!(a.key(), b.key());
        assert_eq!(a.key(), "u+1,2,3|g+5,9|d*");
    }

    #[test]
    fn parse_round_trips() {
        for key in ["u*|g*|d*", "u+1,2|g-3|d*", "u-5|g*|d+7", "u+|g*|d*"] {
            let scope = Scope::parse(key).unwrap();
            assert_eq!(scope.key(), key);
        }
    }

    #[test]
    fn parse_rejects_malformed_keys() {
        for key in ["", "u*|g*", "u*|g*|d*|x*", "u?|g*|d*", "u+a|g*|d*", "u*|u*|d*"] {
            assert!(Scope::parse(key).is_err(), "accepted {key:?}");
        }
    }

    #[test]
    fn inclusion_requires_membership() {
        let scope = Scope::users([1, 2]);
        assert!(scope.matches(&MessageEvent::private(1, 100, "x")));
        assert!(!scope.matches(&MessageEvent::private(3, 100, "x")));
    }

    #[test]
    fn exclusion_is_open_over_missing_axes() {
        let scope = Scope::except_groups([42]);
        assert!(!scope.matches(&MessageEvent::group(1, 42, 100, "x")));
        assert!(scope.matches(&MessageEvent::group(1, 43, 100, "x")));
        // No group id at all: exclusion passes.
        assert!(scope.matches(&MessageEvent::private(1, 100, "x")));
    }

    #[test]
    fn inclusion_is_closed_over_missing_axes() {
        let scope = Scope::groups([42]);
        assert!(!scope.matches(&MessageEvent::private(1, 100, "x")));
    }

    #[test]
    fn empty_inclusion_matches_nothing() {
        let scope = Scope::users([]);
        assert!(!scope.matches(&MessageEvent::private(1, 100, "x")));
        assert!(!scope.matches(&MessageEvent::group(2, 42, 100, "x")));
    }

    #[test]
    fn all_axes_must_pass() {
        let scope = Scope::users([1]).with_groups([42]);
        assert!(scope.matches(&MessageEvent::group(1, 42, 100, "x")));
        assert!(!scope.matches(&MessageEvent::group(1, 43, 100, "x")));
        assert!(!scope.matches(&MessageEvent::group(2, 42, 100, "x")));
    }
}
