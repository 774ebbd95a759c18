//! Authenticated caller tokens.

use crate::sid::Sid;

/// What the front end knows about an authenticated caller: the user SID and
/// the groups the user belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessToken {
    user: Option<Sid>,
    groups: Vec<Sid>,
}

impl AccessToken {
    pub fn new(user: Sid) -> Self {
        Self {
            user: Some(user),
            groups: Vec::new(),
        }
    }

    /// A token that identifies nobody. Access checks against it fail.
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_group(mut self, group: Sid) -> Self {
        if !self.groups.contains(&group) {
            self.groups.push(group);
        }
        self
    }

    pub fn with_groups(self, groups: impl IntoIterator<Item = Sid>) -> Self {
        groups.into_iter().fold(self, Self::with_group)
    }

    pub fn user(&self) -> Option<&Sid> {
        self.user.as_ref()
    }

    pub fn groups(&self) -> &[Sid] {
        &self.groups
    }

    /// Returns true if an entry naming `sid` applies to this token.
    ///
    /// Everyone matches every identified caller.
    pub fn matches(&self, sid: &Sid) -> bool {
        if self.user.is_none() {
            return false;
        }
        self.user.as_ref() == Some(sid) || self.groups.contains(sid) || *sid == Sid::everyone()
    }
}
