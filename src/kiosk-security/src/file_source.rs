//! Policy persisted inside a TOML configuration file.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use toml_edit::{DocumentMut, Item, Table};

use crate::error::{PolicyError, Result};
use crate::store::PolicySource;

/// Table holding the descriptor.
pub const SECURITY_SECTION: &str = "security";
/// Key of the descriptor string inside [`SECURITY_SECTION`].
pub const DESCRIPTOR_KEY: &str = "descriptor";

/// Reads and writes `security.descriptor` in a TOML file.
///
/// Writes go through `toml_edit` so comments and every other setting in the
/// file survive a policy change.
#[derive(Debug, Clone)]
pub struct FilePolicySource {
    path: PathBuf,
}

impl FilePolicySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> Result<DocumentMut> {
        let content = fs::read_to_string(&self.path)?;
        content.parse::<DocumentMut>().map_err(|e| {
            PolicyError::Parse(format!("{} is not valid TOML: {e}", self.path.display()))
        })
    }
}

impl PolicySource for FilePolicySource {
    fn modified(&self) -> Result<SystemTime> {
        Ok(fs::metadata(&self.path)?.modified()?)
    }

    fn load(&self) -> Result<String> {
        let doc = self.read_document()?;
        doc.get(SECURITY_SECTION)
            .and_then(|section| section.get(DESCRIPTOR_KEY))
            .and_then(Item::as_str)
            .map(ToString::to_string)
            .ok_or_else(|| {
                PolicyError::MissingDescriptor(format!(
                    "{} ([{SECURITY_SECTION}] {DESCRIPTOR_KEY})",
                    self.path.display()
                ))
            })
    }

    fn store(&self, descriptor: &str) -> Result<()> {
        let mut doc = if self.path.exists() {
            self.read_document()
                .map_err(|e| PolicyError::Persist(e.to_string()))?
        } else {
            DocumentMut::new()
        };

        if !doc.get(SECURITY_SECTION).is_some_and(Item::is_table) {
            doc[SECURITY_SECTION] = Item::Table(Table::new());
        }
        doc[SECURITY_SECTION][DESCRIPTOR_KEY] = toml_edit::value(descriptor);

        // Write beside the target and rename so readers never see a partial file.
        let staging = self.path.with_extension("toml.tmp");
        fs::write(&staging, doc.to_string())
            .and_then(|()| fs::rename(&staging, &self.path))
            .map_err(|e| {
                PolicyError::Persist(format!("cannot write {}: {e}", self.path.display()))
            })
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
