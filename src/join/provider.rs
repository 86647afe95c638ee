//! Feature-provider capability (spec §6): the minimum viable interface the
//! join manager requires from the (out-of-scope) feature provider
//! abstraction that actually reads features from PostGIS, GeoJSON files,
//! etc.

use std::collections::{BTreeMap, BTreeSet};

/// Metadata about a field eligible as a `collectionKey`.
#[derive(Debug, Clone, Default)]
pub struct KeyFieldSpec {
    pub type_hint: Option<String>,
    pub default: bool,
}

/// The capability set the join manager consumes from a feature provider.
pub trait FeatureProvider: Send + Sync {
    /// One of `"feature" | "coverage" | ...`. The manager requires `"feature"`.
    fn kind(&self) -> &str;

    /// Fields eligible as `collectionKey`.
    fn key_fields(&self) -> &BTreeMap<String, KeyFieldSpec>;

    /// The full feature-attribute schema, used to exclude colliding `joinFields`.
    fn fields(&self) -> &BTreeSet<String>;
}

/// An in-memory test double standing in for a real provider integration
/// (PostGIS, GeoJSON, ...), which is explicitly out of scope here.
pub struct InMemoryProvider {
    kind: String,
    key_fields: BTreeMap<String, KeyFieldSpec>,
    fields: BTreeSet<String>,
}

impl InMemoryProvider {
    pub fn new(
        kind: &str,
        key_fields: Vec<(&str, bool)>,
        fields: Vec<&str>,
    ) -> Self {
        Self {
            kind: kind.to_string(),
            key_fields: key_fields
                .into_iter()
                .map(|(name, default)| {
                    (
                        name.to_string(),
                        KeyFieldSpec {
                            type_hint: None,
                            default,
                        },
                    )
                })
                .collect(),
            fields: fields.into_iter().map(str::to_string).collect(),
        }
    }
}

impl FeatureProvider for InMemoryProvider {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn key_fields(&self) -> &BTreeMap<String, KeyFieldSpec> {
        &self.key_fields
    }

    fn fields(&self) -> &BTreeSet<String> {
        &self.fields
    }
}
