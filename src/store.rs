use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::Mutex,
};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

/// A stored record as it lives in a collection file.
pub type Document = Map<String, Value>;

/// Field holding the identifier the store assigns on save.
pub const INTERNAL_ID: &str = "_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Categories,
    Products,
    Comments,
    Users,
}

impl Collection {
    pub const ALL: [Collection; 4] = [
        Collection::Categories,
        Collection::Products,
        Collection::Comments,
        Collection::Users,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Collection::Categories => "categories",
            Collection::Products => "products",
            Collection::Comments => "comments",
            Collection::Users => "users",
        }
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed collection file {}: {source}", .path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("collection file {} must hold an array of objects", .0.display())]
    NotAnArray(PathBuf),

    #[error("record in {collection} does not match its schema: {source}")]
    Schema {
        collection: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("record for {0} did not serialize to an object")]
    NotADocument(&'static str),

    #[error("store lock poisoned")]
    Poisoned,
}

/// Equality match on a single top-level field.
#[derive(Debug, Clone)]
pub struct Filter {
    field: String,
    value: Value,
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn matches(&self, doc: &Document) -> bool {
        match (doc.get(&self.field), &self.value) {
            // 3 and 3.0 are the same key
            (Some(Value::Number(a)), Value::Number(b)) => a.as_f64() == b.as_f64(),
            (Some(found), wanted) => found == wanted,
            (None, _) => false,
        }
    }
}

/// Durable, named collections of JSON documents.
pub trait RecordStore: Send + Sync {
    fn find(&self, collection: Collection) -> Result<Vec<Document>, StoreError>;

    fn find_one(
        &self,
        collection: Collection,
        filter: &Filter,
    ) -> Result<Option<Document>, StoreError> {
        Ok(self
            .find(collection)?
            .into_iter()
            .find(|doc| filter.matches(doc)))
    }

    /// Inserts `doc` and returns it with its generated `_id`.
    fn save(&self, collection: Collection, doc: Document) -> Result<Document, StoreError>;

    /// Deletes the first match, or every match when `multi` is set.
    /// Returns the number of removed documents.
    fn remove(
        &self,
        collection: Collection,
        filter: &Filter,
        multi: bool,
    ) -> Result<usize, StoreError>;
}

pub fn decode<T: DeserializeOwned>(collection: Collection, doc: Document) -> Result<T, StoreError> {
    serde_json::from_value(Value::Object(doc)).map_err(|source| StoreError::Schema {
        collection: collection.name(),
        source,
    })
}

/// Decodes each document on its own; records that no longer fit the schema
/// are logged and skipped so they cannot hide the rest of the collection.
pub fn decode_valid<T: DeserializeOwned>(collection: Collection, docs: Vec<Document>) -> Vec<T> {
    docs.into_iter()
        .filter_map(|doc| {
            let internal_id = doc.get(INTERNAL_ID).cloned();
            match decode(collection, doc) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!("Skipping record {:?}: {}", internal_id, e);
                    None
                }
            }
        })
        .collect()
}

pub fn encode<T: Serialize>(collection: Collection, record: &T) -> Result<Document, StoreError> {
    match serde_json::to_value(record) {
        Ok(Value::Object(doc)) => Ok(doc),
        Ok(_) => Err(StoreError::NotADocument(collection.name())),
        Err(source) => Err(StoreError::Schema {
            collection: collection.name(),
            source,
        }),
    }
}

/// Flat-file store: one `<collection>.json` array per collection.
pub struct FileStore {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    /// Opens `dir`, provisioning an empty file for every missing collection.
    pub fn connect(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            path: dir.clone(),
            source,
        })?;

        let store = FileStore {
            dir,
            lock: Mutex::new(()),
        };
        for collection in Collection::ALL {
            let path = store.path(collection);
            if !path.exists() {
                debug!("Provisioning collection file {}", path.display());
                store.write(collection, &[])?;
            }
        }
        Ok(store)
    }

    fn path(&self, collection: Collection) -> PathBuf {
        self.dir.join(format!("{}.json", collection.name()))
    }

    fn read(&self, collection: Collection) -> Result<Vec<Document>, StoreError> {
        let path = self.path(collection);
        let raw = fs::read_to_string(&path).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }

        let value: Value = serde_json::from_str(&raw).map_err(|source| StoreError::Malformed {
            path: path.clone(),
            source,
        })?;
        match value {
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::Object(doc) => Ok(doc),
                    _ => Err(StoreError::NotAnArray(path.clone())),
                })
                .collect(),
            _ => Err(StoreError::NotAnArray(path)),
        }
    }

    fn write(&self, collection: Collection, docs: &[Document]) -> Result<(), StoreError> {
        let path = self.path(collection);
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_vec(docs).map_err(|source| StoreError::Malformed {
            path: path.clone(),
            source,
        })?;
        fs::write(&tmp, body).map_err(|source| StoreError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| StoreError::Io { path, source })
    }
}

impl RecordStore for FileStore {
    fn find(&self, collection: Collection) -> Result<Vec<Document>, StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        self.read(collection)
    }

    fn save(&self, collection: Collection, mut doc: Document) -> Result<Document, StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        let mut docs = self.read(collection)?;
        doc.insert(
            INTERNAL_ID.to_string(),
            Value::String(Uuid::new_v4().simple().to_string()),
        );
        docs.push(doc.clone());
        self.write(collection, &docs)?;
        Ok(doc)
    }

    fn remove(
        &self,
        collection: Collection,
        filter: &Filter,
        multi: bool,
    ) -> Result<usize, StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        let mut docs = self.read(collection)?;
        let before = docs.len();
        if multi {
            docs.retain(|doc| !filter.matches(doc));
        } else if let Some(index) = docs.iter().position(|doc| filter.matches(doc)) {
            docs.remove(index);
        }

        let removed = before - docs.len();
        if removed > 0 {
            self.write(collection, &docs)?;
        }
        Ok(removed)
    }
}
