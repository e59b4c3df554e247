//! Dictionary loading with builder pattern and fallback chains.
//!
//! A [`Dictionary`] is the ordered set of [`TableDescriptor`]s an application
//! persists. It is loaded once per process from JSON or YAML and then only
//! read. Table order follows the file, and field order inside each table is
//! the column order used by every generated statement.
//!
//! # File shape
//!
//! ```yaml
//! tables:
//!   - name: events
//!     fields:
//!       - { name: id, format: uint, size: 10, roles: { primary_key: true, autoincrement: true } }
//!       - { name: title, format: ascii, size: 200, description: "Title" }
//!       - { name: updsp, format: datetime }
//!     indices:
//!       - { name: title, fields: [title] }
//! ```
//!
//! # Loading patterns
//!
//! ```no_run
//! use rowbind_dict::Dictionary;
//!
//! let dict = Dictionary::from_file("dictionary.yml").unwrap();
//! assert!(dict.get_table("events").is_some());
//!
//! // Fall back to a directory of table files
//! let dict = Dictionary::builder()
//!     .from_file("/etc/app/dictionary.yml")
//!     .from_dir("/usr/share/app/tables/")
//!     .build()
//!     .unwrap();
//! ```

use std::path::{Path, PathBuf};

use rowbind_core::{TableDescriptor, ValidationError, validate_tables};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DictionaryError, Result};

/// Describes where a [`Dictionary`] was loaded from.
#[derive(Debug, Clone)]
pub enum DictionarySource {
    /// Built in memory.
    Inline,
    /// Loaded from a single JSON or YAML file.
    File(PathBuf),
    /// Loaded from a directory of JSON or YAML files.
    Directory(PathBuf),
    /// Loaded via a fallback chain of multiple sources.
    Multiple(Vec<DictionarySource>),
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct DictionaryFile {
    #[serde(default)]
    tables: Vec<TableDescriptor>,
}

/// Ordered collection of table definitions with lookup by name.
///
/// # Examples
///
/// ```
/// use rowbind_dict::Dictionary;
///
/// let yaml = r#"
/// tables:
///   - name: channels
///     fields:
///       - { name: id, format: ascii, size: 50, roles: { primary_key: true } }
///       - { name: name, format: ascii, size: 100 }
/// "#;
/// let dict = Dictionary::from_yaml_str(yaml).unwrap();
/// let table = dict.get_table("CHANNELS").unwrap();
/// assert_eq!(table.fields()[1].name, "name");
/// ```
#[derive(Debug)]
pub struct Dictionary {
    tables: Vec<TableDescriptor>,
    source: DictionarySource,
}

impl Dictionary {
    /// Creates a dictionary from tables built in code.
    pub fn new(tables: Vec<TableDescriptor>) -> Self {
        Self {
            tables,
            source: DictionarySource::Inline,
        }
    }

    /// Returns a new [`DictionaryBuilder`] for configuring a fallback chain.
    pub fn builder() -> DictionaryBuilder {
        DictionaryBuilder::new()
    }

    /// Parses a dictionary from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`DictionaryError::JsonError`] if the text is not a valid
    /// dictionary, including unknown field formats.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let file: DictionaryFile = serde_json::from_str(json)?;
        Ok(Self::new(file.tables))
    }

    /// Parses a dictionary from YAML text.
    ///
    /// # Errors
    ///
    /// Returns [`DictionaryError::YamlError`] if the text is not a valid
    /// dictionary, including unknown field formats.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let file: DictionaryFile = serde_yaml::from_str(yaml)?;
        Ok(Self::new(file.tables))
    }

    /// Loads a dictionary from a `.json`, `.yml` or `.yaml` file.
    ///
    /// # Errors
    ///
    /// Returns [`DictionaryError::IoError`] if the file cannot be read,
    /// [`DictionaryError::UnsupportedFormat`] for other extensions, or the
    /// parse error of the matching format.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let tables = read_tables(path)?;
        debug!(path = %path.display(), tables = tables.len(), "dictionary loaded");

        Ok(Self {
            tables,
            source: DictionarySource::File(path.to_path_buf()),
        })
    }

    /// Loads every JSON/YAML file of a directory, in file name order.
    ///
    /// # Errors
    ///
    /// Returns [`DictionaryError::IoError`] if the directory cannot be read,
    /// or the parse error of the first invalid file.
    pub fn from_dir(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut files = Vec::new();

        for entry in std::fs::read_dir(path)? {
            let file_path = entry?.path();
            if file_kind(&file_path).is_some() {
                files.push(file_path);
            }
        }
        files.sort();

        let mut tables = Vec::new();
        for file in &files {
            tables.extend(read_tables(file)?);
        }
        debug!(path = %path.display(), files = files.len(), tables = tables.len(), "dictionary directory loaded");

        Ok(Self {
            tables,
            source: DictionarySource::Directory(path.to_path_buf()),
        })
    }

    /// Checks the dictionary and returns it unchanged when it is valid.
    ///
    /// # Errors
    ///
    /// Returns [`DictionaryError::Invalid`] with every problem found.
    pub fn validated(self) -> Result<Self> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(self)
        } else {
            Err(DictionaryError::Invalid(errors))
        }
    }

    /// Returns all validation problems of the dictionary.
    pub fn validate(&self) -> Vec<ValidationError> {
        validate_tables(&self.tables)
    }

    /// Looks up a table by name (case-insensitive).
    pub fn get_table(&self, name: &str) -> Option<&TableDescriptor> {
        self.tables
            .iter()
            .find(|table| table.name.eq_ignore_ascii_case(name))
    }

    /// Returns `true` if a table with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.get_table(name).is_some()
    }

    /// Tables in load order.
    pub fn tables(&self) -> &[TableDescriptor] {
        &self.tables
    }

    /// Returns an iterator over table names.
    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(|table| table.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Returns a reference to the source metadata.
    pub fn source(&self) -> &DictionarySource {
        &self.source
    }

    /// Serializes the dictionary as YAML.
    ///
    /// # Errors
    ///
    /// Returns [`DictionaryError::YamlError`] if serialization fails.
    pub fn to_yaml_string(&self) -> Result<String> {
        let file = DictionaryFile {
            tables: self.tables.clone(),
        };
        Ok(serde_yaml::to_string(&file)?)
    }
}

#[derive(Clone, Copy)]
enum FileKind {
    Json,
    Yaml,
}

fn file_kind(path: &Path) -> Option<FileKind> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => Some(FileKind::Json),
        Some("yml" | "yaml") => Some(FileKind::Yaml),
        _ => None,
    }
}

fn read_tables(path: &Path) -> Result<Vec<TableDescriptor>> {
    let kind = file_kind(path)
        .ok_or_else(|| DictionaryError::UnsupportedFormat(path.display().to_string()))?;
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);

    let parsed: DictionaryFile = match kind {
        FileKind::Json => serde_json::from_reader(reader)?,
        FileKind::Yaml => serde_yaml::from_reader(reader)?,
    };
    Ok(parsed.tables)
}

/// Builder for constructing a [`Dictionary`] with a fallback chain.
///
/// Sources are tried in the order they are added. The first successful load
/// wins; if all fail, [`DictionaryError::NoSourcesAvailable`] is returned.
pub struct DictionaryBuilder {
    sources: Vec<DictionarySource>,
}

impl DictionaryBuilder {
    /// Creates a new builder with no sources.
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
        }
    }

    /// Adds a single dictionary file as a source.
    pub fn from_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.sources.push(DictionarySource::File(path.into()));
        self
    }

    /// Adds a directory of dictionary files as a source.
    pub fn from_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.sources.push(DictionarySource::Directory(path.into()));
        self
    }

    /// Attempts to load the dictionary from configured sources in order.
    pub fn build(self) -> Result<Dictionary> {
        if self.sources.is_empty() {
            return Err(DictionaryError::NoSourcesAvailable);
        }

        let all_sources = self.sources.clone();

        for source in &self.sources {
            let result = match source {
                DictionarySource::File(path) => Dictionary::from_file(path),
                DictionarySource::Directory(path) => Dictionary::from_dir(path),
                DictionarySource::Inline | DictionarySource::Multiple(_) => continue,
            };

            match result {
                Ok(mut dict) => {
                    dict.source = DictionarySource::Multiple(all_sources);
                    return Ok(dict);
                }
                Err(err) => debug!(?source, %err, "dictionary source failed"),
            }
        }

        Err(DictionaryError::NoSourcesAvailable)
    }
}

impl Default for DictionaryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowbind_core::FieldFormat;

    const YAML: &str = r#"
tables:
  - name: events
    fields:
      - { name: id, format: uint, size: 10, roles: { primary_key: true, autoincrement: true } }
      - { name: title, format: ascii, size: 200 }
      - { name: zeta, format: int }
      - { name: alpha, format: datetime }
    indices:
      - { name: title, fields: [title] }
"#;

    #[test]
    fn test_yaml_keeps_declaration_order() {
        let dict = Dictionary::from_yaml_str(YAML).unwrap();
        let table = dict.get_table("events").unwrap();
        let names: Vec<&str> = table.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["id", "title", "zeta", "alpha"]);
        assert_eq!(table.fields()[3].index(), 3);
        assert_eq!(table.fields()[3].format, FieldFormat::DateTime);
    }

    #[test]
    fn test_unknown_format_fails_to_load() {
        let json = r#"{"tables": [{"name": "t", "fields": [{"name": "a", "format": "money"}]}]}"#;
        let err = Dictionary::from_json_str(json).unwrap_err();
        assert!(matches!(err, DictionaryError::JsonError(_)));
    }

    #[test]
    fn test_validated_rejects_bad_dictionary() {
        let json = r#"{"tables": [{"name": "t", "fields": [{"name": "a", "format": "int"}]}]}"#;
        let err = Dictionary::from_json_str(json).unwrap().validated().unwrap_err();
        assert!(matches!(err, DictionaryError::Invalid(ref e) if e.len() == 1));
        assert!(err.to_string().contains("has no primary key"));
    }

    #[test]
    fn test_yaml_roundtrip() {
        let dict = Dictionary::from_yaml_str(YAML).unwrap();
        let text = dict.to_yaml_string().unwrap();
        let again = Dictionary::from_yaml_str(&text).unwrap();
        assert_eq!(dict.tables(), again.tables());
    }

    #[test]
    fn test_builder_all_fail() {
        let result = Dictionary::builder()
            .from_file("/nonexistent/dict.yml")
            .from_dir("/nonexistent/dir/")
            .build();
        assert!(matches!(result, Err(DictionaryError::NoSourcesAvailable)));
    }

    #[test]
    fn test_builder_without_sources() {
        assert!(matches!(
            DictionaryBuilder::new().build(),
            Err(DictionaryError::NoSourcesAvailable)
        ));
    }
}
