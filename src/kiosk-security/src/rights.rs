//! Session rights and the generic-right mapping.

use bitflags::bitflags;
use std::fmt;

use crate::error::{PolicyError, Result};

bitflags! {
    /// Operations a caller may perform against the shared session.
    ///
    /// The bit values are part of the persisted descriptor format and must
    /// not change.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Rights: u32 {
        /// Open a transport connection to the session.
        const CONNECT                = 0x01;
        /// Watch the shared desktop.
        const VIEW                   = 0x02;
        /// Send input to the shared desktop.
        const INTERACT               = 0x04;
        /// Have the session connect out to a listening client.
        const CONNECT_TO_CLIENT      = 0x10;
        /// Open named virtual channels.
        const CREATE_VIRTUAL_CHANNEL = 0x20;
    }
}

/// Descriptor code, display name and bit of every right, in canonical order.
static SPECIFIC: [(&str, &str, Rights); 5] = [
    ("CC", "Connect", Rights::CONNECT),
    ("VW", "View", Rights::VIEW),
    ("IA", "Interact", Rights::INTERACT),
    ("CT", "ConnectToClient", Rights::CONNECT_TO_CLIENT),
    ("VC", "CreateVirtualChannel", Rights::CREATE_VIRTUAL_CHANNEL),
];

impl Rights {
    /// Display name used in diagnostics and the CLI.
    pub fn label(self) -> &'static str {
        SPECIFIC
            .iter()
            .find(|(_, _, right)| *right == self)
            .map_or("Combined", |(_, name, _)| *name)
    }

    /// Two-letter descriptor code of a single right.
    pub fn code(self) -> &'static str {
        SPECIFIC
            .iter()
            .find(|(_, _, right)| *right == self)
            .map_or("??", |(code, _, _)| *code)
    }

    /// Every single right, lowest bit first.
    pub fn each() -> impl Iterator<Item = Rights> {
        SPECIFIC.iter().map(|(_, _, right)| *right)
    }

    /// Parses a `|`/`,` separated list of right names (`connect,view`).
    pub fn parse_list(s: &str) -> Result<Rights> {
        let mut rights = Rights::empty();
        for part in s.split(['|', ',']).map(str::trim).filter(|p| !p.is_empty()) {
            let right = Rights::each()
                .find(|r| r.label().eq_ignore_ascii_case(part))
                .or_else(|| GenericRight::from_name(part).map(GenericRight::rights))
                .ok_or_else(|| PolicyError::Parse(format!("unknown right `{part}`")))?;
            rights |= right;
        }
        if rights.is_empty() {
            return Err(PolicyError::Parse("empty rights list".to_string()));
        }
        Ok(rights)
    }
}

impl fmt::Display for Rights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }
        let mut first = true;
        for right in Rights::each().filter(|r| self.contains(*r)) {
            if !first {
                write!(f, "|")?;
            }
            write!(f, "{}", right.label())?;
            first = false;
        }
        Ok(())
    }
}

/// Generic rights as they appear in access control entries.
///
/// Each one expands to a fixed union of [`Rights`] and is never stored on
/// its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenericRight {
    Read,
    Write,
    Execute,
    All,
}

impl GenericRight {
    pub const ALL_VARIANTS: [GenericRight; 4] = [
        GenericRight::Read,
        GenericRight::Write,
        GenericRight::Execute,
        GenericRight::All,
    ];

    /// The concrete rights this generic right stands for.
    pub fn rights(self) -> Rights {
        match self {
            GenericRight::Read => Rights::CONNECT | Rights::VIEW,
            GenericRight::Write => Rights::CONNECT | Rights::VIEW | Rights::INTERACT,
            GenericRight::Execute => Rights::CONNECT | Rights::CREATE_VIRTUAL_CHANNEL,
            GenericRight::All => Rights::all(),
        }
    }

    /// The bit this generic right occupies in an access mask.
    pub fn mask_bit(self) -> u32 {
        match self {
            GenericRight::Read => 0x8000_0000,
            GenericRight::Write => 0x4000_0000,
            GenericRight::Execute => 0x2000_0000,
            GenericRight::All => 0x1000_0000,
        }
    }

    /// Two-letter code in the descriptor string form.
    pub fn code(self) -> &'static str {
        match self {
            GenericRight::Read => "GR",
            GenericRight::Write => "GW",
            GenericRight::Execute => "GX",
            GenericRight::All => "GA",
        }
    }

    /// Accepts the preset names offered to administrators as well as the
    /// plain generic names.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "read" | "view-only" | "viewonly" => Some(GenericRight::Read),
            "write" | "interactive" => Some(GenericRight::Write),
            "execute" => Some(GenericRight::Execute),
            "all" | "full" => Some(GenericRight::All),
            _ => None,
        }
    }
}

/// Raw access mask of an access control entry: specific right bits plus
/// generic bits that still need mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccessMask(u32);

impl AccessMask {
    const GENERIC_BITS: u32 = 0xF000_0000;

    /// Wraps a raw mask without validating it.
    ///
    /// Unknown bits are reported when the mask is mapped.
    pub const fn from_raw(bits: u32) -> Self {
        Self(bits)
    }

    pub fn from_rights(rights: Rights) -> Self {
        Self(rights.bits())
    }

    pub fn from_generic(generic: GenericRight) -> Self {
        Self(generic.mask_bit())
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn union(self, other: AccessMask) -> Self {
        Self(self.0 | other.0)
    }

    /// Returns true if every bit is either a known right or a generic bit.
    pub fn is_valid(self) -> bool {
        self.0 & !(Rights::all().bits() | Self::GENERIC_BITS) == 0
    }

    /// Maps generic bits to their concrete unions and returns the
    /// resulting rights.
    pub fn map_generic(self) -> Result<Rights> {
        if !self.is_valid() {
            return Err(PolicyError::Evaluation(format!(
                "access mask {:#010x} carries unknown bits",
                self.0
            )));
        }
        let mut rights = Rights::from_bits_truncate(self.0);
        for generic in GenericRight::ALL_VARIANTS {
            if self.0 & generic.mask_bit() != 0 {
                rights |= generic.rights();
            }
        }
        Ok(rights)
    }

    /// Parses the rights field of a descriptor entry: either a hex mask
    /// (`0x6`) or a run of two-letter codes (`GRVC`).
    pub fn parse(field: &str) -> Result<Self> {
        let field = field.trim();
        if field.is_empty() {
            return Err(PolicyError::Parse("empty rights field".to_string()));
        }

        let mask = if let Some(hex) = field
            .strip_prefix("0x")
            .or_else(|| field.strip_prefix("0X"))
        {
            let bits = u32::from_str_radix(hex, 16)
                .map_err(|e| PolicyError::Parse(format!("bad rights mask `{field}`: {e}")))?;
            AccessMask(bits)
        } else {
            if field.len() % 2 != 0 || !field.is_ascii() {
                return Err(PolicyError::Parse(format!("bad rights codes `{field}`")));
            }
            let mut bits = 0u32;
            for i in (0..field.len()).step_by(2) {
                let code = &field[i..i + 2];
                bits |= code_bits(code)
                    .ok_or_else(|| PolicyError::Parse(format!("unknown rights code `{code}`")))?;
            }
            AccessMask(bits)
        };

        if mask.0 == 0 {
            return Err(PolicyError::Parse("rights mask grants nothing".to_string()));
        }
        if !mask.is_valid() {
            return Err(PolicyError::Parse(format!(
                "rights mask {:#010x} carries unknown bits",
                mask.0
            )));
        }
        Ok(mask)
    }
}

fn code_bits(code: &str) -> Option<u32> {
    let upper = code.to_ascii_uppercase();
    GenericRight::ALL_VARIANTS
        .iter()
        .find(|g| g.code() == upper)
        .map(|g| g.mask_bit())
        .or_else(|| {
            SPECIFIC
                .iter()
                .find(|(c, _, _)| *c == upper)
                .map(|(_, _, r)| r.bits())
        })
}

impl fmt::Display for AccessMask {
    /// Canonical form: generic codes first, then specific codes. Masks with
    /// unknown bits fall back to hex.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_valid() || self.0 == 0 {
            return write!(f, "{:#x}", self.0);
        }
        for generic in GenericRight::ALL_VARIANTS {
            if self.0 & generic.mask_bit() != 0 {
                write!(f, "{}", generic.code())?;
            }
        }
        for (code, _, right) in &SPECIFIC {
            if self.0 & right.bits() != 0 {
                write!(f, "{code}")?;
            }
        }
        Ok(())
    }
}
