//! Security identifiers.

use std::fmt;
use std::str::FromStr;

use crate::error::PolicyError;

/// Well-known aliases accepted (and emitted) by the descriptor string form.
const WELL_KNOWN: [(&str, &str); 6] = [
    ("WD", "S-1-1-0"),
    ("IU", "S-1-5-4"),
    ("AU", "S-1-5-11"),
    ("SY", "S-1-5-18"),
    ("BA", "S-1-5-32-544"),
    ("BU", "S-1-5-32-545"),
];

const MAX_SUB_AUTHORITIES: usize = 15;
const MAX_AUTHORITY: u64 = (1 << 48) - 1;

/// A stable, comparable caller identifier (`S-1-5-21-...`).
///
/// Immutable once parsed; the broker only compares and hashes it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Sid {
    authority: u64,
    sub_authorities: Vec<u32>,
}

impl Sid {
    /// Builds a SID from its identifier authority and sub-authorities.
    pub fn new(authority: u64, sub_authorities: Vec<u32>) -> Result<Self, PolicyError> {
        if authority > MAX_AUTHORITY {
            return Err(PolicyError::Parse(format!(
                "identifier authority {authority} out of range"
            )));
        }
        if sub_authorities.len() > MAX_SUB_AUTHORITIES {
            return Err(PolicyError::Parse(format!(
                "too many sub-authorities ({})",
                sub_authorities.len()
            )));
        }
        Ok(Self {
            authority,
            sub_authorities,
        })
    }

    /// Everyone (`S-1-1-0`).
    pub fn everyone() -> Self {
        Self {
            authority: 1,
            sub_authorities: vec![0],
        }
    }

    /// Builtin Administrators (`S-1-5-32-544`).
    pub fn administrators() -> Self {
        Self {
            authority: 5,
            sub_authorities: vec![32, 544],
        }
    }

    /// Authenticated Users (`S-1-5-11`).
    pub fn authenticated_users() -> Self {
        Self {
            authority: 5,
            sub_authorities: vec![11],
        }
    }

    /// The two-letter alias for this SID, if it is a well-known one.
    pub fn alias(&self) -> Option<&'static str> {
        let text = self.to_string();
        WELL_KNOWN
            .iter()
            .find(|(_, sid)| *sid == text)
            .map(|(alias, _)| *alias)
    }

    /// Alias when one exists, full form otherwise.
    pub fn to_short_string(&self) -> String {
        self.alias()
            .map_or_else(|| self.to_string(), ToString::to_string)
    }

    fn parse_full(s: &str) -> Result<Self, PolicyError> {
        let bad = || PolicyError::Parse(format!("invalid SID `{s}`"));

        let mut parts = s.split('-');
        if !parts.next().is_some_and(|p| p.eq_ignore_ascii_case("S")) {
            return Err(bad());
        }
        if parts.next() != Some("1") {
            return Err(bad());
        }
        let authority = parts.next().ok_or_else(bad)?;
        let authority = match authority
            .strip_prefix("0x")
            .or_else(|| authority.strip_prefix("0X"))
        {
            Some(hex) => u64::from_str_radix(hex, 16).map_err(|_| bad())?,
            None => authority.parse::<u64>().map_err(|_| bad())?,
        };
        let sub_authorities = parts
            .map(|p| p.parse::<u32>().map_err(|_| bad()))
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(authority, sub_authorities)
    }
}

impl FromStr for Sid {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match WELL_KNOWN
            .iter()
            .find(|(alias, _)| alias.eq_ignore_ascii_case(s))
        {
            Some((_, full)) => Self::parse_full(full),
            None => Self::parse_full(s),
        }
    }
}

impl fmt::Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.authority > u32::MAX as u64 {
            write!(f, "S-1-{:#014X}", self.authority)?;
        } else {
            write!(f, "S-1-{}", self.authority)?;
        }
        for sub in &self.sub_authorities {
            write!(f, "-{sub}")?;
        }
        Ok(())
    }
}
