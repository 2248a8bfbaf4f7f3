//! Shared, swappable schema snapshots

use std::sync::Arc;

use parking_lot::RwLock;

use super::error::ComposeResult;
use super::schema::SchemaMetadata;

struct Current {
    version: u64,
    schema: Arc<SchemaMetadata>,
}

/// Holds the active [`SchemaMetadata`].
///
/// Readers take an `Arc` snapshot and compose against it for as long as they
/// like; a reload builds and validates the new schema completely before the
/// swap, so a reader never sees a half-loaded schema and a failed reload
/// leaves the active one in place.
pub struct MetadataStore {
    current: RwLock<Current>,
}

impl MetadataStore {
    pub fn new(schema: SchemaMetadata) -> Self {
        Self {
            current: RwLock::new(Current {
                version: 1,
                schema: Arc::new(schema),
            }),
        }
    }

    /// Parse and validate a JSON schema into a new store
    pub fn from_json(source: &str) -> ComposeResult<Self> {
        Ok(Self::new(SchemaMetadata::from_json(source)?))
    }

    /// The active schema
    pub fn snapshot(&self) -> Arc<SchemaMetadata> {
        Arc::clone(&self.current.read().schema)
    }

    /// Version of the active schema, bumped by every swap
    pub fn version(&self) -> u64 {
        self.current.read().version
    }

    /// Swap in a new schema, returning its version
    pub fn replace(&self, schema: SchemaMetadata) -> u64 {
        let schema = Arc::new(schema);
        let mut current = self.current.write();
        current.version += 1;
        current.schema = schema;
        tracing::debug!(
            version = current.version,
            entities = current.schema.len(),
            "schema snapshot replaced"
        );
        current.version
    }

    /// Parse, validate and swap in a JSON schema
    pub fn reload_from_json(&self, source: &str) -> ComposeResult<u64> {
        let schema = SchemaMetadata::from_json(source).map_err(|err| {
            tracing::warn!(error = %err, "schema reload rejected; keeping current snapshot");
            err
        })?;
        Ok(self.replace(schema))
    }
}

impl Default for MetadataStore {
    fn default() -> Self {
        Self::new(SchemaMetadata::default())
    }
}
