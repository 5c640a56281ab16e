//! Permission modes for stored files and tree directories.
//!
//! Modes are applied with an explicit `chmod` right after each creation, so
//! the result never depends on the process umask and nothing mutates
//! process-wide state.

use std::fmt;
use std::fs::{File, Permissions};
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

const R_OWN: u32 = 0o400;
const R_GRP: u32 = 0o040;
const R_OTH: u32 = 0o004;
const X_OWN: u32 = 0o100;
const X_GRP: u32 = 0o010;
const X_OTH: u32 = 0o001;

/// A Unix permission mode (lower 12 bits), serialized as an octal string.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Mode(u32);

impl Mode {
    /// Default mode for stored files: read/write for owner and group.
    pub const DEFAULT_FILE: Self = Self(0o660);

    /// Build a mode from raw bits.
    pub fn new(bits: u32) -> StoreResult<Self> {
        if bits > 0o7777 {
            return Err(StoreError::Config(format!(
                "mode {bits:#o} has bits outside 0o7777"
            )));
        }
        Ok(Self(bits))
    }

    /// Parse an octal string such as `"0660"`, `"660"` or `"0o660"`.
    pub fn parse(s: &str) -> StoreResult<Self> {
        let digits = s.trim();
        let digits = digits.strip_prefix("0o").unwrap_or(digits);
        if digits.is_empty() {
            return Err(StoreError::Config(format!("invalid mode {s:?}: empty")));
        }
        let bits = u32::from_str_radix(digits, 8).map_err(|_| {
            StoreError::Config(format!("invalid mode {s:?}: expected an octal string"))
        })?;
        Self::new(bits)
    }

    /// The raw permission bits.
    pub fn bits(&self) -> u32 {
        self.0
    }

    /// Directory mode derived from a file mode: execute (search) is added
    /// wherever read is granted.
    pub fn with_search_bits(&self) -> Self {
        let mut bits = self.0;
        if bits & R_OWN != 0 {
            bits |= X_OWN;
        }
        if bits & R_GRP != 0 {
            bits |= X_GRP;
        }
        if bits & R_OTH != 0 {
            bits |= X_OTH;
        }
        Self(bits)
    }

    /// Apply this mode to an open file.
    pub fn apply_to_file(&self, file: &File) -> io::Result<()> {
        file.set_permissions(self.permissions(file.metadata()?.permissions()))
    }

    /// Apply this mode to the entry at `path`.
    pub fn apply_to_path(&self, path: &Path) -> io::Result<()> {
        let current = std::fs::metadata(path)?.permissions();
        std::fs::set_permissions(path, self.permissions(current))
    }

    #[cfg(unix)]
    fn permissions(&self, _current: Permissions) -> Permissions {
        use std::os::unix::fs::PermissionsExt;
        Permissions::from_mode(self.0)
    }

    // Only the owner-write bit maps onto non-Unix permissions.
    #[cfg(not(unix))]
    fn permissions(&self, mut current: Permissions) -> Permissions {
        current.set_readonly(self.0 & 0o200 == 0);
        current
    }
}

impl Default for Mode {
    fn default() -> Self {
        Self::DEFAULT_FILE
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04o}", self.0)
    }
}

impl fmt::Debug for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Mode({:04o})", self.0)
    }
}

impl TryFrom<String> for Mode {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Mode> for String {
    fn from(mode: Mode) -> Self {
        mode.to_string()
    }
}
