//! Attendee name issuing.

use std::collections::HashSet;

use kiosk_security::Sid;
use parking_lot::Mutex;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Random bytes in every attendee name.
pub const NAME_ENTROPY_BYTES: usize = 32;

/// Bytes of the owner digest prefixed to each name.
const OWNER_TAG_BYTES: usize = 4;

/// Issues unguessable, single-use attendee names.
///
/// Every name ever issued stays in the set, so a name is never handed out
/// twice even after the attendee that used it is gone.
#[derive(Default)]
pub struct NameIssuer {
    issued: Mutex<HashSet<String>>,
}

impl NameIssuer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues a fresh name for an attendee acting on behalf of `owner`.
    ///
    /// The name is `<owner tag>-<random hex>`; the tag only helps correlate
    /// log lines and carries no authority.
    pub fn issue(&self, owner: &Sid) -> String {
        let tag = owner_tag(owner);
        let mut rng = rand::rng();
        loop {
            let mut bytes = [0u8; NAME_ENTROPY_BYTES];
            rng.fill_bytes(&mut bytes);
            let name = format!("{tag}-{}", hex::encode_upper(bytes));
            if self.issued.lock().insert(name.clone()) {
                return name;
            }
        }
    }

    /// Number of names issued so far.
    pub fn issued_count(&self) -> usize {
        self.issued.lock().len()
    }
}

/// Short digest of the owner SID.
pub fn owner_tag(owner: &Sid) -> String {
    let digest = Sha256::digest(owner.to_string().as_bytes());
    hex::encode_upper(&digest[..OWNER_TAG_BYTES])
}
