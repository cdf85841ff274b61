//! Store configuration and identity.

use crate::crypto::MAX_KEY_LEN;
use crate::dir::META_SUFFIX;
use crate::error::{CoreError, CoreResult};
use mapkv_storage::TEMP_SUFFIX;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use zeroize::Zeroizing;

/// Default initial mapping size, one page.
pub const DEFAULT_INITIAL_CAPACITY: u64 = 4096;

/// Engine tuning shared by every store a registry opens.
#[derive(Debug, Clone)]
pub struct Config {
    /// Size a new data file is created with, and the floor `trim` and
    /// `clear_all` shrink back to.
    pub initial_capacity: u64,

    /// Whether every append is flushed to disk before returning.
    pub sync_on_write: bool,

    /// Whether a full log is compacted in place when live data fits in half
    /// of the mapping, instead of growing the file.
    pub auto_compact: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
            sync_on_write: true,
            auto_compact: true,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the initial mapping size.
    #[must_use]
    pub const fn initial_capacity(mut self, bytes: u64) -> Self {
        self.initial_capacity = bytes;
        self
    }

    /// Sets whether to flush on every append.
    #[must_use]
    pub const fn sync_on_write(mut self, value: bool) -> Self {
        self.sync_on_write = value;
        self
    }

    /// Sets whether full logs are compacted before growing.
    #[must_use]
    pub const fn auto_compact(mut self, value: bool) -> Self {
        self.auto_compact = value;
        self
    }
}

/// How a store's files may be shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Mode {
    /// Only this process opens the files.
    #[default]
    SingleProcess,
    /// Several processes map the same files and coordinate through an
    /// advisory lock on the meta file.
    MultiProcess,
}

impl Mode {
    /// Converts the raw mode flag used by host bindings (1 or 2).
    ///
    /// # Errors
    ///
    /// Returns `InvalidMode` for any other value.
    pub fn from_raw(raw: u32) -> CoreResult<Self> {
        match raw {
            1 => Ok(Self::SingleProcess),
            2 => Ok(Self::MultiProcess),
            other => Err(CoreError::invalid_mode(other.to_string())),
        }
    }

    /// Returns the raw mode flag.
    #[must_use]
    pub const fn as_raw(self) -> u32 {
        match self {
            Self::SingleProcess => 1,
            Self::MultiProcess => 2,
        }
    }

    /// Returns true for [`Mode::MultiProcess`].
    #[must_use]
    pub const fn is_multi_process(self) -> bool {
        matches!(self, Self::MultiProcess)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SingleProcess => f.write_str("single-process"),
            Self::MultiProcess => f.write_str("multi-process"),
        }
    }
}

impl FromStr for Mode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single" | "single-process" => Ok(Self::SingleProcess),
            "multi" | "multi-process" => Ok(Self::MultiProcess),
            other => Err(CoreError::invalid_mode(other)),
        }
    }
}

/// Names a store and how to open it.
///
/// Builder methods consume and return the identity, so a value is never
/// changed after it has been handed to a registry.
///
/// # Example
///
/// ```
/// use mapkv_core::{Mode, StoreIdentity};
///
/// let identity = StoreIdentity::new("settings")
///     .with_mode(Mode::MultiProcess)
///     .with_encryption_key(b"secret");
/// assert!(identity.encryption_key().is_some());
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct StoreIdentity {
    id: String,
    mode: Mode,
    path: Option<PathBuf>,
    encryption_key: Option<Zeroizing<Vec<u8>>>,
    read_only: bool,
}

impl StoreIdentity {
    /// Creates a single-process, writable, unencrypted identity.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            mode: Mode::SingleProcess,
            path: None,
            encryption_key: None,
            read_only: false,
        }
    }

    /// Sets the mode.
    #[must_use]
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets an explicit directory, overriding the registry's defaults.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Sets the encryption key. An empty key means no encryption.
    #[must_use]
    pub fn with_encryption_key(mut self, key: impl AsRef<[u8]>) -> Self {
        let key = key.as_ref();
        self.encryption_key = (!key.is_empty()).then(|| Zeroizing::new(key.to_vec()));
        self
    }

    /// Sets whether the store rejects mutations.
    #[must_use]
    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Returns the store id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the mode.
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Returns the explicit directory, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns the raw encryption key, if any.
    #[must_use]
    pub fn encryption_key(&self) -> Option<&[u8]> {
        self.encryption_key.as_ref().map(|key| key.as_slice())
    }

    /// Returns true if the store is opened read-only.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Checks the id and key limits.
    ///
    /// The id becomes a file name, so it must be non-empty and must not
    /// contain path separators or be a relative path component. Names ending
    /// in `.meta` or `.tmp` belong to another store's side files.
    ///
    /// # Errors
    ///
    /// Returns `InvalidIdentity` or `InvalidKey`.
    pub fn validate(&self) -> CoreResult<()> {
        if self.id.is_empty() {
            return Err(CoreError::invalid_identity("store id is empty"));
        }
        if self.id == "." || self.id == ".." || self.id.contains(['/', '\\', '\0']) {
            return Err(CoreError::invalid_identity(format!(
                "store id {:?} is not a valid file name",
                self.id
            )));
        }
        if let Some(suffix) = [META_SUFFIX, TEMP_SUFFIX]
            .into_iter()
            .find(|suffix| self.id.ends_with(suffix))
        {
            return Err(CoreError::invalid_identity(format!(
                "store id {:?} ends with reserved suffix {suffix:?}",
                self.id
            )));
        }
        if let Some(key) = self.encryption_key() {
            if key.len() > MAX_KEY_LEN {
                return Err(CoreError::invalid_key(key.len(), MAX_KEY_LEN));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for StoreIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreIdentity")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .field("path", &self.path)
            .field(
                "encryption_key",
                &self.encryption_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("read_only", &self.read_only)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.initial_capacity, 4096);
        assert!(config.sync_on_write);
        assert!(config.auto_compact);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .initial_capacity(1024)
            .sync_on_write(false)
            .auto_compact(false);

        assert_eq!(config.initial_capacity, 1024);
        assert!(!config.sync_on_write);
        assert!(!config.auto_compact);
    }

    #[test]
    fn mode_raw_flags() {
        assert_eq!(Mode::from_raw(1).unwrap(), Mode::SingleProcess);
        assert_eq!(Mode::from_raw(2).unwrap(), Mode::MultiProcess);
        assert!(matches!(
            Mode::from_raw(7),
            Err(CoreError::InvalidMode { .. })
        ));
        assert_eq!(Mode::MultiProcess.as_raw(), 2);
    }

    #[test]
    fn mode_from_str() {
        assert_eq!("multi".parse::<Mode>().unwrap(), Mode::MultiProcess);
        assert_eq!(
            "single-process".parse::<Mode>().unwrap(),
            Mode::SingleProcess
        );
        assert!("both".parse::<Mode>().is_err());
    }

    #[test]
    fn identity_builder() {
        let identity = StoreIdentity::new("app")
            .with_mode(Mode::MultiProcess)
            .with_path("/tmp/x")
            .with_encryption_key("k")
            .with_read_only(true);

        assert_eq!(identity.id(), "app");
        assert_eq!(identity.mode(), Mode::MultiProcess);
        assert_eq!(identity.path(), Some(Path::new("/tmp/x")));
        assert_eq!(identity.encryption_key(), Some(&b"k"[..]));
        assert!(identity.is_read_only());
    }

    #[test]
    fn empty_key_means_plaintext() {
        let identity = StoreIdentity::new("app").with_encryption_key(b"");
        assert!(identity.encryption_key().is_none());
    }

    #[test]
    fn validate_rejects_bad_ids() {
        assert!(matches!(
            StoreIdentity::new("").validate(),
            Err(CoreError::InvalidIdentity { .. })
        ));
        assert!(StoreIdentity::new("a/b").validate().is_err());
        assert!(StoreIdentity::new("..").validate().is_err());
        assert!(StoreIdentity::new("app.settings").validate().is_ok());
    }

    #[test]
    fn validate_rejects_side_file_names() {
        for id in ["a.meta", "a.tmp", "a.meta.tmp"] {
            assert!(matches!(
                StoreIdentity::new(id).validate(),
                Err(CoreError::InvalidIdentity { .. })
            ));
        }
        assert!(StoreIdentity::new("a.metadata").validate().is_ok());
        assert!(StoreIdentity::new("tmp").validate().is_ok());
    }

    #[test]
    fn validate_rejects_long_keys() {
        let identity = StoreIdentity::new("app").with_encryption_key([7u8; 20]);
        assert!(matches!(
            identity.validate(),
            Err(CoreError::InvalidKey { len: 20, max: 16 })
        ));
        let identity = StoreIdentity::new("app").with_encryption_key([7u8; 16]);
        assert!(identity.validate().is_ok());
    }

    #[test]
    fn debug_redacts_key() {
        let identity = StoreIdentity::new("app").with_encryption_key("hunter2");
        let rendered = format!("{identity:?}");
        assert!(rendered.contains("REDACTED"));
        assert!(!rendered.contains("hunter2"));
    }
}
