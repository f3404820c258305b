//! Byte-oriented endpoints that a [`MultiValueStore`](super::MultiValueStore)
//! persists through.

use std::{
    fs::File,
    io::{self, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use parking_lot::Mutex;

use super::{Entries, properties};

/// A read/write endpoint holding a flat string-to-string mapping.
///
/// A `write` that completes before a later `read` of the same resource must
/// be observed by that read.
pub trait Channel {
    /// Reads the full mapping from the underlying resource.
    ///
    /// # Errors
    ///
    /// Returns an error if the resource cannot be opened or its contents
    /// cannot be parsed.
    fn read(&self) -> io::Result<Entries>;

    /// Replaces the contents of the underlying resource with `entries`.
    ///
    /// # Errors
    ///
    /// Returns an error if the resource cannot be written.
    fn write(&self, entries: &Entries) -> io::Result<()>;
}

impl<T: Channel + ?Sized> Channel for &T {
    fn read(&self) -> io::Result<Entries> {
        (**self).read()
    }

    fn write(&self, entries: &Entries) -> io::Result<()> {
        (**self).write(entries)
    }
}

impl<T: Channel + ?Sized> Channel for Arc<T> {
    fn read(&self) -> io::Result<Entries> {
        (**self).read()
    }

    fn write(&self, entries: &Entries) -> io::Result<()> {
        (**self).write(entries)
    }
}

/// A `.properties` file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChannel {
    path: PathBuf,
}

impl FileChannel {
    /// Creates a channel for the file at `path`.
    ///
    /// The file is not touched until the first read or write.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Channel for FileChannel {
    fn read(&self) -> io::Result<Entries> {
        let file = File::open(&self.path)?;
        properties::parse(BufReader::new(file))
    }

    fn write(&self, entries: &Entries) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = File::create(&self.path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(properties::render(entries).as_bytes())?;
        writer.flush()
    }
}

/// An in-memory buffer holding `.properties` text.
///
/// Useful for tests and for stores that never need to reach the disk.
#[derive(Debug, Default)]
pub struct MemoryChannel {
    buffer: Mutex<Vec<u8>>,
}

impl MemoryChannel {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a buffer pre-filled with `text`.
    #[must_use]
    pub fn with_contents(text: impl Into<String>) -> Self {
        Self {
            buffer: Mutex::new(text.into().into_bytes()),
        }
    }

    /// Creates a buffer pre-filled with raw `bytes`, which need not be UTF-8.
    #[must_use]
    pub fn with_bytes(bytes: Vec<u8>) -> Self {
        Self {
            buffer: Mutex::new(bytes),
        }
    }

    /// The current contents of the buffer.
    #[must_use]
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock()).into_owned()
    }
}

impl Channel for MemoryChannel {
    fn read(&self) -> io::Result<Entries> {
        properties::parse(self.buffer.lock().as_slice())
    }

    fn write(&self, entries: &Entries) -> io::Result<()> {
        *self.buffer.lock() = properties::render(entries).into_bytes();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Entries {
        let mut entries = Entries::new();
        entries.insert("colours".to_string(), "red▪green".to_string());
        entries.insert("empty".to_string(), String::new());
        entries
    }

    #[test]
    fn file_channel_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let channel = FileChannel::new(tmp.path().join("nested/store.properties"));

        channel.write(&sample()).unwrap();

        assert_eq!(channel.read().unwrap(), sample());
    }

    #[test]
    fn file_channel_missing_file_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let channel = FileChannel::new(tmp.path().join("missing.properties"));

        let error = channel.read().unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn memory_channel_holds_rendered_text() {
        let channel = MemoryChannel::new();
        channel.write(&sample()).unwrap();

        assert_eq!(channel.contents(), "colours=red▪green\nempty=\n");
        assert_eq!(channel.read().unwrap(), sample());
    }

    #[test]
    fn shared_channel_sees_writes() {
        let channel = Arc::new(MemoryChannel::with_contents("a=1\n"));
        let shared = Arc::clone(&channel);

        shared.write(&sample()).unwrap();

        assert_eq!(Channel::read(&channel).unwrap(), sample());
    }
}
