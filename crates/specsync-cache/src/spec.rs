//! Transform specs
//!
//! A [`TransformSpec`] is the decrypted document stored in the cache for one
//! [`ContentHash`]. It is adapted once into an [`AdaptedSpec`] (defaults
//! filled in, names normalized) and then bound against the artifact set of a
//! session to produce the [`ReflectorSpec`] the host consumes.
//!
//! Document shape (UTF-8 JSON):
//!
//! ```json
//! { "version": 1,
//!   "classes": [ { "name": "Client", "artifact": "client",
//!                  "fields": [ { "name": "loginState", "owner": "ab", "field": "q", "multiplier": -1 } ] } ] }
//! ```

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use specsync_artifact::{ArtifactSet, ContentHash};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Document version understood by [`TransformSpec::adapt`]
pub const SPEC_VERSION: u32 = 1;

/// Errors adapting or binding a spec
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpecError {
    /// Body is not a spec document
    #[error("malformed spec document: {0}")]
    Malformed(String),

    /// Document version is not understood
    #[error("unsupported spec version {0}")]
    UnsupportedVersion(u32),

    /// Two classes share a name
    #[error("duplicate class '{0}'")]
    DuplicateClass(String),

    /// A class or field name is blank
    #[error("blank name in class '{0}'")]
    BlankName(String),

    /// Spec references an artifact the session does not have
    #[error("spec references missing artifact '{0}'")]
    MissingArtifact(String),
}

impl SpecError {
    /// Whether the cached entry simply does not describe the caller's set.
    ///
    /// Stale specs are replaced by re-submitting the artifacts; other errors
    /// are fatal.
    #[inline]
    #[must_use]
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::Malformed(_) | Self::MissingArtifact(_))
    }
}

/// Wire form of a spec
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecDocument {
    /// Format version, only 1 is accepted
    pub version: u32,
    /// Class mappings
    #[serde(default)]
    pub classes: Vec<ClassDocument>,
}

/// Wire form of one class mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassDocument {
    /// Logical class name
    pub name: String,
    /// Artifact that implements it in this build
    pub artifact: String,
    /// Field mappings
    #[serde(default)]
    pub fields: Vec<FieldDocument>,
}

/// Wire form of one field mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDocument {
    /// Logical field name
    pub name: String,
    /// Declaring artifact, when not the class's own
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// Obfuscated field name
    pub field: String,
    /// Value multiplier, 1 when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multiplier: Option<i64>,
}

impl SpecDocument {
    /// Empty current-version document
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            version: SPEC_VERSION,
            classes: Vec::new(),
        }
    }

    /// With an added class
    #[inline]
    #[must_use]
    pub fn with_class(mut self, class: ClassDocument) -> Self {
        self.classes.push(class);
        self
    }

    /// Serialize to the wire encoding
    ///
    /// # Errors
    /// Returns [`SpecError::Malformed`] if serialization fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SpecError> {
        serde_json::to_vec(self).map_err(|e| SpecError::Malformed(e.to_string()))
    }
}

impl Default for SpecDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl ClassDocument {
    /// Class mapped onto `artifact`
    #[must_use]
    pub fn new(name: impl Into<String>, artifact: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            artifact: artifact.into(),
            fields: Vec::new(),
        }
    }

    /// With a field that lives in the class artifact
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, field: impl Into<String>) -> Self {
        self.fields.push(FieldDocument {
            name: name.into(),
            owner: None,
            field: field.into(),
            multiplier: None,
        });
        self
    }
}

/// A spec as fetched from (or published to) the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformSpec {
    hash: ContentHash,
    raw: Bytes,
}

impl TransformSpec {
    /// Parse-check a decrypted body for `hash`.
    ///
    /// # Errors
    /// Returns [`SpecError::Malformed`] if the body is not a spec document.
    pub fn from_decrypted(hash: ContentHash, raw: impl Into<Bytes>) -> Result<Self, SpecError> {
        let spec = Self {
            hash,
            raw: raw.into(),
        };
        spec.document()?;
        Ok(spec)
    }

    /// Hash this spec was stored under
    #[inline]
    #[must_use]
    pub fn hash(&self) -> ContentHash {
        self.hash
    }

    /// Decrypted body bytes
    #[inline]
    #[must_use]
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    /// Decode the document
    ///
    /// # Errors
    /// Returns [`SpecError::Malformed`] for undecodable bodies.
    pub fn document(&self) -> Result<SpecDocument, SpecError> {
        serde_json::from_slice(&self.raw).map_err(|e| SpecError::Malformed(e.to_string()))
    }

    /// Normalize into an [`AdaptedSpec`]: names trimmed, field owners default
    /// to the class artifact and multipliers to `1`.
    ///
    /// # Errors
    /// Returns [`SpecError`] for unknown versions, blank names or duplicate
    /// classes.
    pub fn adapt(&self) -> Result<AdaptedSpec, SpecError> {
        let document = self.document()?;
        if document.version != SPEC_VERSION {
            return Err(SpecError::UnsupportedVersion(document.version));
        }

        let mut classes = BTreeMap::new();
        for class in document.classes {
            let name = class.name.trim().to_string();
            let artifact = class.artifact.trim().to_string();
            if name.is_empty() || artifact.is_empty() {
                return Err(SpecError::BlankName(class.name));
            }

            let mut fields = BTreeMap::new();
            for field in class.fields {
                let field_name = field.name.trim().to_string();
                let member = field.field.trim().to_string();
                if field_name.is_empty() || member.is_empty() {
                    return Err(SpecError::BlankName(name));
                }
                let owner = field
                    .owner
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .unwrap_or_else(|| artifact.clone());
                fields.insert(
                    field_name,
                    FieldRef {
                        owner,
                        field: member,
                        multiplier: field.multiplier.unwrap_or(1),
                    },
                );
            }

            if classes.contains_key(&name) {
                return Err(SpecError::DuplicateClass(name));
            }
            classes.insert(
                name.clone(),
                ClassMap {
                    name,
                    artifact,
                    fields,
                },
            );
        }

        Ok(AdaptedSpec {
            hash: self.hash,
            classes,
        })
    }
}

/// Where a logical field lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRef {
    /// Artifact that declares the field
    pub owner: String,
    /// Field name inside `owner`
    pub field: String,
    /// Value multiplier applied on read
    pub multiplier: i64,
}

/// One logical class and its fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassMap {
    /// Logical class name
    pub name: String,
    /// Artifact that implements it
    pub artifact: String,
    /// Fields by logical name
    pub fields: BTreeMap<String, FieldRef>,
}

/// Normalized spec, shared between sessions of the same hash
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdaptedSpec {
    hash: ContentHash,
    classes: BTreeMap<String, ClassMap>,
}

impl AdaptedSpec {
    /// Hash the spec was stored under
    #[inline]
    #[must_use]
    pub fn hash(&self) -> ContentHash {
        self.hash
    }

    /// Look up a class by logical name
    #[inline]
    #[must_use]
    pub fn class(&self, name: &str) -> Option<&ClassMap> {
        self.classes.get(name)
    }

    /// Classes in name order
    pub fn classes(&self) -> impl Iterator<Item = &ClassMap> {
        self.classes.values()
    }

    /// Number of mapped classes
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Whether no class is mapped
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Every artifact the spec points into
    #[must_use]
    pub fn referenced_artifacts(&self) -> BTreeSet<&str> {
        let mut names = BTreeSet::new();
        for class in self.classes.values() {
            names.insert(class.artifact.as_str());
            names.extend(class.fields.values().map(|f| f.owner.as_str()));
        }
        names
    }
}

/// A spec checked against the artifacts of one session
#[derive(Debug, Clone)]
pub struct ReflectorSpec {
    spec: Arc<AdaptedSpec>,
}

impl ReflectorSpec {
    /// Bind `spec` to `artifacts`.
    ///
    /// # Errors
    /// Returns [`SpecError::MissingArtifact`] (a stale signal) for the first
    /// referenced artifact not present in the set.
    pub fn bind(spec: Arc<AdaptedSpec>, artifacts: &ArtifactSet) -> Result<Self, SpecError> {
        if let Some(missing) = spec
            .referenced_artifacts()
            .into_iter()
            .find(|name| !artifacts.contains(name))
        {
            return Err(SpecError::MissingArtifact(missing.to_string()));
        }
        Ok(Self { spec })
    }

    /// Underlying adapted spec
    #[inline]
    #[must_use]
    pub fn spec(&self) -> &AdaptedSpec {
        &self.spec
    }

    /// Hash of the bound spec
    #[inline]
    #[must_use]
    pub fn hash(&self) -> ContentHash {
        self.spec.hash()
    }

    /// Resolve `class.field`
    #[must_use]
    pub fn field(&self, class: &str, field: &str) -> Option<&FieldRef> {
        self.spec.class(class)?.fields.get(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use specsync_artifact::Artifact;

    const DOC: &str = r#"{
        "version": 1,
        "classes": [
            { "name": " Client ", "artifact": "client",
              "fields": [
                { "name": "loginState", "owner": "ab", "field": "q", "multiplier": -1 },
                { "name": "world", "field": "w" }
              ] },
            { "name": "Npc", "artifact": "zz" }
        ]
    }"#;

    fn spec(doc: &str) -> TransformSpec {
        TransformSpec {
            hash: ContentHash::compute(b"set"),
            raw: Bytes::copy_from_slice(doc.as_bytes()),
        }
    }

    #[test]
    fn adapt_fills_defaults_and_trims() {
        let adapted = spec(DOC).adapt().unwrap();
        assert_eq!(adapted.len(), 2);

        let client = adapted.class("Client").unwrap();
        assert_eq!(
            client.fields["loginState"],
            FieldRef {
                owner: "ab".into(),
                field: "q".into(),
                multiplier: -1
            }
        );
        assert_eq!(
            client.fields["world"],
            FieldRef {
                owner: "client".into(),
                field: "w".into(),
                multiplier: 1
            }
        );
        let referenced: Vec<_> = adapted.referenced_artifacts().into_iter().collect();
        assert_eq!(referenced, vec!["ab", "client", "zz"]);
    }

    #[test]
    fn from_decrypted_rejects_garbage() {
        let err = TransformSpec::from_decrypted(ContentHash::compute(b"x"), &b"\x00\x01"[..]).unwrap_err();
        assert!(err.is_stale());
    }

    #[test]
    fn unknown_version_is_fatal() {
        let err = spec(r#"{"version": 7, "classes": []}"#).adapt().unwrap_err();
        assert_eq!(err, SpecError::UnsupportedVersion(7));
        assert!(!err.is_stale());
    }

    #[test]
    fn duplicate_classes_are_rejected() {
        let doc = r#"{"version":1,"classes":[
            {"name":"A","artifact":"a"},{"name":"A ","artifact":"b"}]}"#;
        assert_eq!(spec(doc).adapt().unwrap_err(), SpecError::DuplicateClass("A".into()));
    }

    #[test]
    fn bind_detects_missing_artifacts() {
        let adapted = Arc::new(spec(DOC).adapt().unwrap());
        let partial: ArtifactSet = vec![Artifact::new("client", &b"c"[..]), Artifact::new("zz", &b"z"[..])]
            .into_iter()
            .collect();
        let err = ReflectorSpec::bind(Arc::clone(&adapted), &partial).unwrap_err();
        assert_eq!(err, SpecError::MissingArtifact("ab".into()));
        assert!(err.is_stale());

        let mut full = partial;
        full.insert(Artifact::new("ab", &b"a"[..]));
        let bound = ReflectorSpec::bind(adapted, &full).unwrap();
        assert_eq!(bound.field("Client", "loginState").unwrap().field, "q");
        assert!(bound.field("Client", "missing").is_none());
    }

    #[test]
    fn builder_document_round_trips_through_adapt() {
        let doc = SpecDocument::new().with_class(ClassDocument::new("Client", "client").with_field("tick", "t"));
        let spec = TransformSpec::from_decrypted(ContentHash::compute(b"x"), doc.to_bytes().unwrap()).unwrap();
        let adapted = spec.adapt().unwrap();
        assert_eq!(adapted.class("Client").unwrap().fields["tick"].owner, "client");
    }
}
