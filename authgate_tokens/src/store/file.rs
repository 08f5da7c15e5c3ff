//! A credential store backed by a local JSON file

use std::{
    collections::BTreeMap,
    fmt,
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};

use parking_lot::Mutex;

use super::{CredentialSlot, CredentialStore};

/// A credential store that persists to a local file
///
/// The file holds a single JSON object keyed by [`CredentialSlot::key()`].
/// Every mutation writes the whole object to a sibling `.tmp` file and renames
/// it over the original, so readers see either the old or the new contents.
/// Keys that do not belong to a credential slot are preserved.
pub struct FileCredentialStore {
    path: PathBuf,
    slots: Mutex<BTreeMap<String, String>>,
}

impl FileCredentialStore {
    /// Opens the store at `path`
    ///
    /// A missing file is treated as an empty store and will be created on
    /// the first write.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, io::Error> {
        let path = path.into();
        let slots = match fs::read_to_string(&path) {
            Ok(data) if data.trim().is_empty() => BTreeMap::new(),
            Ok(data) => serde_json::from_str(&data)?,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no credentials file yet, starting empty");
                BTreeMap::new()
            }
            Err(error) => return Err(error),
        };

        Ok(Self {
            path,
            slots: Mutex::new(slots),
        })
    }

    /// The path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The sibling file a new version is written to before it replaces the original
    fn staging_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn write_slots(&self, slots: &BTreeMap<String, String>) -> Result<(), io::Error> {
        let data = serde_json::to_string_pretty(slots)?;
        let staging = self.staging_path();

        // a leftover from an interrupted write may carry other permissions
        match fs::remove_file(&staging) {
            Err(error) if error.kind() != io::ErrorKind::NotFound => return Err(error),
            _ => {}
        }

        let mut file_opts = OpenOptions::new();

        file_opts.create_new(true).write(true);

        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            file_opts.mode(0o600);
        }

        let mut file = file_opts.open(&staging)?;
        file.write_all(data.as_bytes())?;
        file.sync_all()?;
        drop(file);

        fs::rename(&staging, &self.path)
    }

    fn mutate(&self, slot: CredentialSlot, f: impl FnOnce(&mut BTreeMap<String, String>)) {
        let mut slots = self.slots.lock();
        f(&mut slots);
        match self.write_slots(&slots) {
            Ok(()) => tracing::trace!(slot = slot.key(), "persisted credentials file"),
            Err(error) => tracing::warn!(
                slot = slot.key(),
                path = %self.path.display(),
                error = (&error as &dyn std::error::Error),
                "unable to persist credentials file"
            ),
        }
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self, slot: CredentialSlot) -> Option<String> {
        self.slots.lock().get(slot.key()).cloned()
    }

    fn set(&self, slot: CredentialSlot, value: String) {
        self.mutate(slot, |slots| {
            slots.insert(slot.key().to_owned(), value);
        });
    }

    fn remove(&self, slot: CredentialSlot) {
        self.mutate(slot, |slots| {
            slots.remove(slot.key());
        });
    }
}

impl fmt::Debug for FileCredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("FileCredentialStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}
