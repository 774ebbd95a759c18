//! Security policy: an ordered access control list over [`Rights`].
//!
//! The persisted form is an SDDL-style DACL string:
//!
//! ```text
//! D:(A;;GA;;;BA)(A;;GR;;;WD)(D;;IA;;;S-1-5-21-1-2-3-1001)
//! ```
//!
//! Only allow and deny entries without inheritance or object types are
//! supported. `D:NO_ACCESS_CONTROL`, or no DACL at all, grants everything;
//! a bare `D:` is an empty DACL and grants nothing.

use std::fmt;
use std::str::FromStr;

use crate::error::{PolicyError, Result};
use crate::rights::{AccessMask, GenericRight};
use crate::sid::Sid;

const NO_ACCESS_CONTROL: &str = "NO_ACCESS_CONTROL";

/// DACL flags that only matter to inheritance and are accepted but ignored.
const IGNORED_DACL_FLAGS: [&str; 3] = ["P", "AI", "AR"];

/// Whether an entry grants or denies its mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AceKind {
    Allow,
    Deny,
}

impl AceKind {
    fn code(self) -> &'static str {
        match self {
            AceKind::Allow => "A",
            AceKind::Deny => "D",
        }
    }
}

/// One access control entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ace {
    pub kind: AceKind,
    pub mask: AccessMask,
    pub sid: Sid,
}

impl Ace {
    pub fn allow(sid: Sid, mask: AccessMask) -> Self {
        Self {
            kind: AceKind::Allow,
            mask,
            sid,
        }
    }

    pub fn deny(sid: Sid, mask: AccessMask) -> Self {
        Self {
            kind: AceKind::Deny,
            mask,
            sid,
        }
    }

    fn parse(body: &str) -> Result<Self> {
        let fields: Vec<&str> = body.split(';').collect();
        if fields.len() != 6 {
            return Err(PolicyError::Parse(format!(
                "entry `({body})` must have 6 fields, found {}",
                fields.len()
            )));
        }

        let kind = match fields[0].trim().to_ascii_uppercase().as_str() {
            "A" => AceKind::Allow,
            "D" => AceKind::Deny,
            other => {
                return Err(PolicyError::Parse(format!(
                    "unsupported entry type `{other}`"
                )));
            }
        };
        for (index, name) in [(1, "flags"), (3, "object type"), (4, "inherited object type")] {
            if !fields[index].trim().is_empty() {
                return Err(PolicyError::Parse(format!(
                    "entry {name} are not supported: `({body})`"
                )));
            }
        }
        let mask = AccessMask::parse(fields[2])?;
        let sid = fields[5].parse::<Sid>()?;

        Ok(Self { kind, mask, sid })
    }
}

impl fmt::Display for Ace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({};;{};;;{})",
            self.kind.code(),
            self.mask,
            self.sid.to_short_string()
        )
    }
}

/// The access control policy the broker evaluates callers against.
///
/// A policy either has no DACL at all, in which case every caller holds
/// every right, or it has a DACL, possibly empty, that is evaluated entry
/// by entry. An empty DACL grants nothing.
///
/// Values are never mutated in place once published; edits produce a new
/// policy that replaces the old one wholesale.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityPolicy {
    dacl: Option<Vec<Ace>>,
}

impl SecurityPolicy {
    /// A policy with a DACL made of `entries`.
    pub fn new(entries: Vec<Ace>) -> Self {
        Self {
            dacl: Some(entries),
        }
    }

    /// A policy without a DACL, granting every right to every caller.
    pub fn unrestricted() -> Self {
        Self::default()
    }

    /// Entries of the DACL; empty both for an empty DACL and for none.
    pub fn entries(&self) -> &[Ace] {
        self.dacl.as_deref().unwrap_or_default()
    }

    /// True if the policy has no DACL.
    pub fn is_unrestricted(&self) -> bool {
        self.dacl.is_none()
    }

    /// Returns a copy with an allow entry for `sid` appended.
    pub fn with_allow(&self, sid: Sid, mask: AccessMask) -> Self {
        let mut entries = self.entries().to_vec();
        entries.push(Ace::allow(sid, mask));
        Self::new(entries)
    }

    /// Returns a copy with a deny entry for `sid` placed first, so it takes
    /// precedence over every existing allow entry.
    pub fn with_deny(&self, sid: Sid, mask: AccessMask) -> Self {
        let mut entries = Vec::with_capacity(self.entries().len() + 1);
        entries.push(Ace::deny(sid, mask));
        entries.extend(self.entries().iter().cloned());
        Self::new(entries)
    }

    /// Returns a copy without any entry naming `sid`.
    ///
    /// Removing the last entry leaves an empty DACL, not an unrestricted
    /// policy.
    pub fn without_sid(&self, sid: &Sid) -> Self {
        Self {
            dacl: self.dacl.as_ref().map(|entries| {
                entries
                    .iter()
                    .filter(|ace| &ace.sid != sid)
                    .cloned()
                    .collect()
            }),
        }
    }

    /// Convenience constructor for a single allow entry of a generic right.
    pub fn granting(sid: Sid, generic: GenericRight) -> Self {
        Self::new(vec![Ace::allow(sid, AccessMask::from_generic(generic))])
    }
}

impl FromStr for SecurityPolicy {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(Self::unrestricted());
        }
        let body = match s.get(..2) {
            Some(prefix) if prefix.eq_ignore_ascii_case("D:") => &s[2..],
            _ => s,
        };

        let (flags, mut rest) = match body.find('(') {
            Some(idx) => (&body[..idx], &body[idx..]),
            None => (body, ""),
        };
        let flags = flags.trim();
        if flags.eq_ignore_ascii_case(NO_ACCESS_CONTROL) {
            if !rest.is_empty() {
                return Err(PolicyError::Parse(format!(
                    "{NO_ACCESS_CONTROL} cannot be combined with entries"
                )));
            }
            return Ok(Self::unrestricted());
        }

        let mut remaining = flags;
        while !remaining.is_empty() {
            let flag = IGNORED_DACL_FLAGS
                .iter()
                .find(|flag| remaining.starts_with(**flag))
                .ok_or_else(|| PolicyError::Parse(format!("unsupported DACL flags `{flags}`")))?;
            remaining = &remaining[flag.len()..];
        }

        let mut entries = Vec::new();
        while !rest.is_empty() {
            let inner = rest
                .strip_prefix('(')
                .ok_or_else(|| PolicyError::Parse(format!("expected `(` at `{rest}`")))?;
            let end = inner
                .find(')')
                .ok_or_else(|| PolicyError::Parse("unterminated entry".to_string()))?;
            entries.push(Ace::parse(&inner[..end])?);
            rest = inner[end + 1..].trim_start();
        }

        Ok(Self::new(entries))
    }
}

impl fmt::Display for SecurityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(entries) = &self.dacl else {
            return write!(f, "D:{NO_ACCESS_CONTROL}");
        };
        write!(f, "D:")?;
        for ace in entries {
            write!(f, "{ace}")?;
        }
        Ok(())
    }
}
