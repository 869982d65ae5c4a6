use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::models::{AlarmsFile, CheckpointFile, Settings, Task};

const BACKUP_DIR: &str = "backups";
const BACKUP_LIMIT: usize = 5;

/// The files kept in the data directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataFile {
    Tasks,
    Alarms,
    Checkpoint,
    Settings,
}

impl DataFile {
    pub fn file_name(self) -> &'static str {
        match self {
            DataFile::Tasks => "tasks.json",
            DataFile::Alarms => "alarms.json",
            DataFile::Checkpoint => "last_update.json",
            DataFile::Settings => "settings.json",
        }
    }

    fn stem(self) -> &'static str {
        self.file_name().trim_end_matches(".json")
    }
}

#[derive(Debug)]
pub enum StorageError {
    Io(std::io::Error),
    Json(serde_json::Error),
    /// The file exists but does not parse.
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
    /// A write was refused because the file was found corrupt and not yet acknowledged.
    CorruptPending { path: PathBuf },
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Io(err) => write!(f, "io error: {err}"),
            StorageError::Json(err) => write!(f, "json error: {err}"),
            StorageError::Corrupt { path, source } => {
                write!(f, "corrupt data file {}: {source}", path.display())
            }
            StorageError::CorruptPending { path } => write!(
                f,
                "refusing to overwrite corrupt data file {} until it is acknowledged",
                path.display()
            ),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::Io(err) => Some(err),
            StorageError::Json(err) => Some(err),
            StorageError::Corrupt { source, .. } => Some(source),
            StorageError::CorruptPending { .. } => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(value: std::io::Error) -> Self {
        StorageError::Io(value)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(value: serde_json::Error) -> Self {
        StorageError::Json(value)
    }
}

/// Whole-file JSON persistence rooted at the data directory.
///
/// Missing files read as their default value. A file that fails to parse is
/// remembered as corrupt and every later write to it is refused until
/// [`Storage::acknowledge_corrupt`] moves it aside, or a later read finds it
/// parseable again.
pub struct Storage {
    root: PathBuf,
    corrupt: Mutex<HashSet<DataFile>>,
}

impl Storage {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            corrupt: Mutex::new(HashSet::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_of(&self, file: DataFile) -> PathBuf {
        self.root.join(file.file_name())
    }

    pub fn ensure_dirs(&self) -> Result<(), StorageError> {
        fs::create_dir_all(self.root.join(BACKUP_DIR))?;
        Ok(())
    }

    pub fn load_tasks(&self) -> Result<Vec<Task>, StorageError> {
        self.load_json(DataFile::Tasks)
    }

    pub fn save_tasks(&self, tasks: &[Task]) -> Result<(), StorageError> {
        self.write_atomic(DataFile::Tasks, tasks)
    }

    pub fn load_alarms(&self) -> Result<AlarmsFile, StorageError> {
        self.load_json(DataFile::Alarms)
    }

    pub fn save_alarms(&self, data: &AlarmsFile) -> Result<(), StorageError> {
        self.write_atomic(DataFile::Alarms, data)
    }

    pub fn load_checkpoint(&self) -> Result<CheckpointFile, StorageError> {
        self.load_json(DataFile::Checkpoint)
    }

    pub fn save_checkpoint(&self, data: &CheckpointFile) -> Result<(), StorageError> {
        self.write_atomic(DataFile::Checkpoint, data)
    }

    pub fn load_settings(&self) -> Result<Settings, StorageError> {
        self.load_json(DataFile::Settings)
    }

    pub fn is_corrupt(&self, file: DataFile) -> bool {
        self.corrupt_set().contains(&file)
    }

    /// Moves a corrupt file into `backups/` and lifts the write guard. Returns the
    /// backup path, or `None` if the file was not marked corrupt or has since
    /// been repaired. A repaired file stays where it is.
    pub fn acknowledge_corrupt(&self, file: DataFile) -> Result<Option<PathBuf>, StorageError> {
        if !self.is_corrupt(file) {
            return Ok(None);
        }
        if !self.still_corrupt(file)? {
            self.corrupt_set().remove(&file);
            log::info!("data file was repaired, keeping it file={}", file.file_name());
            return Ok(None);
        }
        let path = self.path_of(file);
        let backup = self.create_backup(&path, &format!("{}-corrupt", file.stem()))?;
        fs::remove_file(&path)?;
        self.corrupt_set().remove(&file);
        log::warn!(
            "corrupt data file acknowledged file={} backup={}",
            file.file_name(),
            backup.display()
        );
        Ok(Some(backup))
    }

    fn corrupt_set(&self) -> std::sync::MutexGuard<'_, HashSet<DataFile>> {
        self.corrupt.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn load_json<T: DeserializeOwned + Default>(&self, file: DataFile) -> Result<T, StorageError> {
        let path = self.path_of(file);
        let Some(bytes) = read_if_exists(&path)? else {
            self.corrupt_set().remove(&file);
            return Ok(T::default());
        };
        match serde_json::from_slice(&bytes) {
            Ok(value) => {
                if self.corrupt_set().remove(&file) {
                    log::info!("data file parses again file={}", file.file_name());
                }
                Ok(value)
            }
            Err(source) => {
                if self.corrupt_set().insert(file) {
                    log::error!("failed to parse {}: {source}", path.display());
                } else {
                    log::debug!("still unparseable {}: {source}", path.display());
                }
                Err(StorageError::Corrupt { path, source })
            }
        }
    }

    /// Whether the file on disk still fails to parse as its record type.
    fn still_corrupt(&self, file: DataFile) -> Result<bool, StorageError> {
        let Some(bytes) = read_if_exists(&self.path_of(file))? else {
            return Ok(false);
        };
        let parsed = match file {
            DataFile::Tasks => serde_json::from_slice::<Vec<Task>>(&bytes).map(drop),
            DataFile::Alarms => serde_json::from_slice::<AlarmsFile>(&bytes).map(drop),
            DataFile::Checkpoint => serde_json::from_slice::<CheckpointFile>(&bytes).map(drop),
            DataFile::Settings => serde_json::from_slice::<Settings>(&bytes).map(drop),
        };
        Ok(parsed.is_err())
    }

    fn write_atomic<T: Serialize + ?Sized>(
        &self,
        file: DataFile,
        data: &T,
    ) -> Result<(), StorageError> {
        let path = self.path_of(file);
        if self.is_corrupt(file) {
            return Err(StorageError::CorruptPending { path });
        }
        let temp_path = path.with_extension("tmp");
        let json = to_vec_indented(data)?;
        {
            let mut handle = File::create(&temp_path)?;
            handle.write_all(&json)?;
            handle.sync_all()?;
        }
        fs::rename(temp_path, path)?;
        Ok(())
    }

    fn create_backup(&self, path: &Path, prefix: &str) -> Result<PathBuf, StorageError> {
        self.ensure_dirs()?;
        let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S").to_string();
        let backup_path = self
            .root
            .join(BACKUP_DIR)
            .join(format!("{prefix}-{timestamp}.json"));
        fs::copy(path, &backup_path)?;
        self.trim_backups()?;
        Ok(backup_path)
    }

    pub fn list_backups(&self) -> Result<Vec<String>, StorageError> {
        let dir = self.root.join(BACKUP_DIR);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut entries: Vec<_> = fs::read_dir(dir)?.filter_map(|entry| entry.ok()).collect();
        entries.sort_by_key(|entry| entry.metadata().and_then(|m| m.modified()).ok());
        Ok(entries
            .into_iter()
            .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
            .collect())
    }

    fn trim_backups(&self) -> Result<(), StorageError> {
        let mut entries: Vec<_> = fs::read_dir(self.root.join(BACKUP_DIR))?
            .filter_map(|entry| entry.ok())
            .collect();
        entries.sort_by_key(|entry| entry.metadata().and_then(|m| m.modified()).ok());
        let to_remove = entries.len().saturating_sub(BACKUP_LIMIT);
        for entry in entries.into_iter().take(to_remove) {
            let _ = fs::remove_file(entry.path());
        }
        Ok(())
    }
}

fn read_if_exists(path: &Path) -> Result<Option<Vec<u8>>, StorageError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// Pretty JSON with four-space indentation, the layout existing data files use.
fn to_vec_indented<T: Serialize + ?Sized>(data: &T) -> Result<Vec<u8>, serde_json::Error> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    data.serialize(&mut serializer)?;
    Ok(buf)
}
