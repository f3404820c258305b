use std::{
    fs,
    path::{Path, PathBuf},
};

use tracing::debug;

use super::{Document, Error, Format};

/// The directory configuration files are looked up in by
/// [`ConfigSource::in_base_dir`].
pub const DEFAULT_BASE_DIR: &str = "config";

/// Where a configuration document is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// A document bundled with the program, typically via `include_str!`.
    Embedded {
        /// A name for the document, used to pick its format.
        name: String,
        /// The document text.
        contents: &'static str,
    },

    /// A file on disk. It is created empty if it does not exist.
    File(PathBuf),
}

impl ConfigSource {
    /// A bundled document. The format is chosen from `name`'s extension.
    #[must_use]
    pub fn embedded(name: impl Into<String>, contents: &'static str) -> Self {
        Self::Embedded {
            name: name.into(),
            contents,
        }
    }

    /// A file at `path`.
    #[must_use]
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    /// The file `name` inside [`DEFAULT_BASE_DIR`].
    #[must_use]
    pub fn in_base_dir(name: &str) -> Self {
        Self::File(Path::new(DEFAULT_BASE_DIR).join(name))
    }

    /// Prefers a bundled copy of `name` when one exists, falling back to the
    /// file `name` inside [`DEFAULT_BASE_DIR`].
    #[must_use]
    pub fn resolve(name: &str, embedded: Option<&'static str>) -> Self {
        embedded.map_or_else(
            || Self::in_base_dir(name),
            |contents| Self::embedded(name, contents),
        )
    }

    /// The format the document is parsed as.
    #[must_use]
    pub fn format(&self) -> Format {
        match self {
            Self::Embedded { name, .. } => Format::from_path(Path::new(name)),
            Self::File(path) => Format::from_path(path),
        }
    }

    /// Reads and parses the document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if a file source cannot be created or read, and
    /// [`Error::Parse`] if the document is malformed.
    pub fn read(&self) -> Result<Document, Error> {
        match self {
            Self::Embedded { contents, .. } => Document::parse(contents, self.format()),
            Self::File(path) => {
                let text = read_or_create(path).map_err(|source| Error::Io {
                    path: path.clone(),
                    source,
                })?;
                Document::parse(&text, self.format())
            }
        }
    }
}

fn read_or_create(path: &Path) -> std::io::Result<String> {
    if !path.exists() {
        debug!("Creating empty config file at {}", path.display());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::File::create(path)?;
    }
    fs::read_to_string(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_source_is_preferred() {
        let source = ConfigSource::resolve("app.json", Some(r#"{"a":1}"#));
        assert!(matches!(source, ConfigSource::Embedded { .. }));

        let fallback = ConfigSource::resolve("app.json", None);
        assert_eq!(
            fallback,
            ConfigSource::File(Path::new(DEFAULT_BASE_DIR).join("app.json"))
        );
    }

    #[test]
    fn missing_file_is_created_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config/app.json");

        let document = ConfigSource::file(&path).read().unwrap();

        assert_eq!(document, Document::default());
        assert!(path.exists());
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn format_follows_name() {
        assert_eq!(ConfigSource::embedded("app.toml", "").format(), Format::Toml);
        assert_eq!(ConfigSource::file("app.json").format(), Format::Json);
    }

    #[test]
    fn unreadable_file_reports_path() {
        let tmp = tempfile::tempdir().unwrap();

        // A directory cannot be read as a file.
        let error = ConfigSource::file(tmp.path()).read().unwrap_err();

        assert!(matches!(error, Error::Io { ref path, .. } if path == tmp.path()));
    }
}
