//! File-based storage implementation.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::{FolioError, Result};
use crate::storage::traits::{Storage, StorageError, StorageInput, StorageOutput};

const BUFFER_SIZE: usize = 64 * 1024;

/// A storage rooted at one directory on the local file system.
///
/// Opening a `FileStorage` never creates the directory; the writer calls
/// [`Storage::ensure_exists`] when it first attaches.
#[derive(Debug, Clone)]
pub struct FileStorage {
    directory: PathBuf,
}

impl FileStorage {
    /// Create a storage handle for the given directory.
    pub fn new<P: AsRef<Path>>(directory: P) -> Self {
        FileStorage {
            directory: directory.as_ref().to_path_buf(),
        }
    }

    fn file_path(&self, name: &str) -> PathBuf {
        self.directory.join(name)
    }

    fn map_open_error(name: &str, e: std::io::Error) -> FolioError {
        if e.kind() == ErrorKind::NotFound {
            StorageError::FileNotFound(name.to_string()).into()
        } else {
            StorageError::IoError(format!("{name}: {e}")).into()
        }
    }
}

impl Storage for FileStorage {
    fn location(&self) -> &Path {
        &self.directory
    }

    fn ensure_exists(&self) -> Result<()> {
        if !self.directory.exists() {
            fs::create_dir_all(&self.directory).map_err(|e| {
                FolioError::storage(format!(
                    "Failed to create directory {}: {e}",
                    self.directory.display()
                ))
            })?;
        }

        if !self.directory.is_dir() {
            return Err(
                StorageError::InvalidLocation(self.directory.display().to_string()).into(),
            );
        }

        Ok(())
    }

    fn is_initialized(&self) -> bool {
        match fs::read_dir(&self.directory) {
            Ok(mut entries) => entries.any(|entry| {
                entry
                    .map(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
                    .unwrap_or(false)
            }),
            Err(_) => false,
        }
    }

    fn modification_stamp(&self) -> Result<Option<SystemTime>> {
        match fs::metadata(&self.directory) {
            Ok(metadata) => Ok(metadata.modified().ok()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::IoError(e.to_string()).into()),
        }
    }

    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>> {
        let file = File::open(self.file_path(name)).map_err(|e| Self::map_open_error(name, e))?;
        Ok(Box::new(FileInput::new(file)?))
    }

    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(self.file_path(name))
            .map_err(|e| StorageError::IoError(format!("{name}: {e}")))?;

        Ok(Box::new(FileOutput::new(file)))
    }

    fn file_exists(&self, name: &str) -> bool {
        self.file_path(name).exists()
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        match fs::remove_file(self.file_path(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::IoError(format!("Failed to delete {name}: {e}")).into()),
        }
    }

    fn list_files(&self) -> Result<Vec<String>> {
        let mut files = Vec::new();

        for entry in
            fs::read_dir(&self.directory).map_err(|e| StorageError::IoError(e.to_string()))?
        {
            let entry = entry.map_err(|e| StorageError::IoError(e.to_string()))?;
            let path = entry.path();

            if path.is_file() {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    files.push(name.to_string());
                }
            }
        }

        files.sort();
        Ok(files)
    }

    fn file_size(&self, name: &str) -> Result<u64> {
        let metadata = self
            .file_path(name)
            .metadata()
            .map_err(|e| Self::map_open_error(name, e))?;
        Ok(metadata.len())
    }

    fn rename_file(&self, old_name: &str, new_name: &str) -> Result<()> {
        fs::rename(self.file_path(old_name), self.file_path(new_name)).map_err(|e| {
            StorageError::IoError(format!("Failed to rename {old_name} to {new_name}: {e}"))
        })?;
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        #[cfg(unix)]
        {
            let dir = File::open(&self.directory)
                .map_err(|e| StorageError::IoError(format!("Failed to open directory: {e}")))?;
            dir.sync_all()
                .map_err(|e| StorageError::IoError(format!("Failed to sync directory: {e}")))?;
        }
        Ok(())
    }
}

/// A file input implementation.
#[derive(Debug)]
pub struct FileInput {
    reader: BufReader<File>,
    size: u64,
}

impl FileInput {
    fn new(file: File) -> Result<Self> {
        let size = file
            .metadata()
            .map_err(|e| FolioError::storage(format!("Failed to get file metadata: {e}")))?
            .len();

        Ok(FileInput {
            reader: BufReader::with_capacity(BUFFER_SIZE, file),
            size,
        })
    }
}

impl Read for FileInput {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.reader.read(buf)
    }
}

impl Seek for FileInput {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.reader.seek(pos)
    }
}

impl StorageInput for FileInput {
    fn size(&self) -> Result<u64> {
        Ok(self.size)
    }
}

/// A file output implementation.
#[derive(Debug)]
pub struct FileOutput {
    writer: BufWriter<File>,
    position: u64,
}

impl FileOutput {
    fn new(file: File) -> Self {
        FileOutput {
            writer: BufWriter::with_capacity(BUFFER_SIZE, file),
            position: 0,
        }
    }
}

impl Write for FileOutput {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let written = self.writer.write(buf)?;
        self.position += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

impl StorageOutput for FileOutput {
    fn flush_and_sync(&mut self) -> Result<()> {
        self.writer
            .flush()
            .map_err(|e| FolioError::storage(format!("Failed to flush: {e}")))?;
        self.writer
            .get_ref()
            .sync_all()
            .map_err(|e| FolioError::storage(format!("Failed to sync: {e}")))?;
        Ok(())
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn close(&mut self) -> Result<()> {
        self.flush_and_sync()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_storage() -> (TempDir, FileStorage) {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path());
        (temp_dir, storage)
    }

    #[test]
    fn test_create_and_read_file() {
        let (_temp_dir, storage) = create_test_storage();

        let mut output = storage.create_output("test.bin").unwrap();
        output.write_all(b"Hello, World!").unwrap();
        assert_eq!(output.position(), 13);
        output.close().unwrap();

        let mut input = storage.open_input("test.bin").unwrap();
        let mut buffer = Vec::new();
        input.read_to_end(&mut buffer).unwrap();

        assert_eq!(buffer, b"Hello, World!");
        assert_eq!(input.size().unwrap(), 13);
    }

    #[test]
    fn test_file_operations() {
        let (_temp_dir, storage) = create_test_storage();

        assert!(!storage.file_exists("nonexistent.txt"));
        assert!(!storage.is_initialized());

        let mut output = storage.create_output("segments.json.tmp").unwrap();
        output.write_all(b"{}").unwrap();
        output.close().unwrap();

        assert!(storage.is_initialized());
        assert_eq!(storage.file_size("segments.json.tmp").unwrap(), 2);

        storage
            .rename_file("segments.json.tmp", "segments.json")
            .unwrap();
        assert_eq!(storage.list_files().unwrap(), vec!["segments.json"]);
        storage.sync().unwrap();

        storage.delete_file("segments.json").unwrap();
        storage.delete_file("segments.json").unwrap();
        assert!(!storage.file_exists("segments.json"));
    }

    #[test]
    fn test_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path().join("missing"));

        assert!(!storage.is_initialized());
        assert_eq!(storage.modification_stamp().unwrap(), None);
        assert!(storage.open_input("segments.json").is_err());

        storage.ensure_exists().unwrap();
        assert!(storage.location().is_dir());
        assert!(storage.modification_stamp().unwrap().is_some());
        // An empty directory is not an initialized index
        assert!(!storage.is_initialized());
    }

    #[test]
    fn test_location_is_a_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("plain");
        std::fs::write(&path, b"x").unwrap();

        let storage = FileStorage::new(&path);
        assert!(storage.ensure_exists().is_err());
    }
}
