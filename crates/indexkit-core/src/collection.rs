//! Collections: named sources of raw items and how items become documents.
use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::ServiceError;
use crate::types::{Field, FieldSpec, FieldType, FieldValue, IndexDocument, SourceItem};

pub trait Collection: Send + Sync {
    /// Stable identifier of the collection.
    fn id(&self) -> &str;

    /// Field definitions; document fields follow this order.
    fn fields(&self) -> &[FieldSpec];

    /// Raw items in the collection's natural order.
    fn items(&self) -> Result<Box<dyn Iterator<Item = SourceItem> + '_>>;

    /// Builds the document for one item. Absent or null values are left out;
    /// values that cannot be converted to the declared type are rejected.
    fn build_document(&self, item: &SourceItem) -> Result<IndexDocument, ServiceError> {
        document_from_specs(self.fields(), item)
    }
}

fn document_from_specs(fields: &[FieldSpec], item: &SourceItem) -> Result<IndexDocument, ServiceError> {
    let mut document = IndexDocument::new(&item.id);
    for spec in fields {
        let Some(raw) = item.data.get(&spec.name).filter(|v| !v.is_null()) else { continue };
        let value = FieldValue::from_json(raw, spec.field_type)
            .map_err(|reason| ServiceError::invalid_document(&item.id, format!("field '{}': {reason}", spec.name)))?;
        document.add_field(Field::new(&spec.name, spec.field_type, value))?;
    }
    Ok(document)
}

/// Item key carrying the read error of a file that could not be loaded.
const READ_ERROR: &str = "read_error";

/// A collection held entirely in memory.
#[derive(Debug, Clone)]
pub struct MemoryCollection {
    id: String,
    fields: Vec<FieldSpec>,
    items: Vec<SourceItem>,
}

impl MemoryCollection {
    pub fn new(id: impl Into<String>, fields: Vec<FieldSpec>) -> Self {
        Self { id: id.into(), fields, items: Vec::new() }
    }

    pub fn with_item(mut self, item: SourceItem) -> Self {
        self.items.push(item);
        self
    }

    pub fn push(&mut self, item: SourceItem) {
        self.items.push(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Collection for MemoryCollection {
    fn id(&self) -> &str {
        &self.id
    }

    fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    fn items(&self) -> Result<Box<dyn Iterator<Item = SourceItem> + '_>> {
        Ok(Box::new(self.items.iter().cloned()))
    }
}

/// Plain-text files under a directory, one item per `.txt` file.
///
/// Fields: `title` (file stem), `path`, `category` (parent directory relative
/// to the root, `misc` at the top level) and `body` (file content).
#[derive(Debug, Clone)]
pub struct DirectoryCollection {
    id: String,
    root: PathBuf,
    fields: Vec<FieldSpec>,
    files: Vec<PathBuf>,
}

impl DirectoryCollection {
    pub fn open(id: impl Into<String>, root: &Path) -> Result<Self> {
        if !root.is_dir() {
            anyhow::bail!("{} is not a directory", root.display());
        }
        let files = list_txt_files(root);
        debug!(root = %root.display(), files = files.len(), "opened directory collection");
        Ok(Self {
            id: id.into(),
            root: root.to_path_buf(),
            fields: vec![
                FieldSpec::new("title", FieldType::Text),
                FieldSpec::new("path", FieldType::Text),
                FieldSpec::new("category", FieldType::Text),
                FieldSpec::new("body", FieldType::Text),
            ],
            files,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    fn load(&self, path: &Path) -> SourceItem {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        let content = match fs::read(path) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable file");
                return SourceItem::new(relative.to_string_lossy())
                    .with("path", path.to_string_lossy().to_string())
                    .with(READ_ERROR, e.to_string());
            }
        };
        let category = relative
            .parent()
            .and_then(Path::to_str)
            .filter(|s| !s.is_empty())
            .unwrap_or("misc");
        let title = path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
        SourceItem::new(relative.to_string_lossy())
            .with("title", title)
            .with("path", path.to_string_lossy().to_string())
            .with("category", category)
            .with("body", content)
    }
}

impl Collection for DirectoryCollection {
    fn id(&self) -> &str {
        &self.id
    }

    fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    // Unreadable files still yield an item so the run reports them.
    fn items(&self) -> Result<Box<dyn Iterator<Item = SourceItem> + '_>> {
        Ok(Box::new(self.files.iter().map(move |path| self.load(path))))
    }

    fn build_document(&self, item: &SourceItem) -> Result<IndexDocument, ServiceError> {
        if let Some(err) = item.data.get(READ_ERROR).and_then(|v| v.as_str()) {
            return Err(ServiceError::invalid_document(&item.id, format!("unreadable file: {err}")));
        }
        document_from_specs(&self.fields, item)
    }
}

fn list_txt_files(root: &Path) -> Vec<PathBuf> {
    let mut txt_files: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("txt"))
        .collect();
    txt_files.sort();
    txt_files
}
