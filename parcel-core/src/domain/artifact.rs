//! Artifact naming
//!
//! Artifacts live in a flat directory and are addressed by generated names.
//! Caller-supplied filenames only ever contribute a sanitised extension, so
//! they cannot collide with each other or escape the artifact root.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

const PROCESSED_MARKER: &str = "_processed";
const MAX_EXTENSION_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid artifact name: {0:?}")]
pub struct InvalidArtifactName(pub String);

/// Name of a file in the artifact store
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ArtifactName(String);

impl ArtifactName {
    /// Validate an existing name
    pub fn parse(name: impl Into<String>) -> Result<Self, InvalidArtifactName> {
        let name = name.into();
        let valid = !name.is_empty()
            && name != "."
            && name != ".."
            && !name.starts_with('.')
            && !name.contains(['/', '\\', '\0']);
        if valid {
            Ok(Self(name))
        } else {
            Err(InvalidArtifactName(name))
        }
    }

    /// Fresh input name for an upload, keeping the suggested file's extension
    pub fn for_upload(suggested_filename: &str) -> Self {
        let id = Uuid::new_v4().simple().to_string();
        match sanitized_extension(suggested_filename) {
            Some(ext) => Self(format!("{}.{}", id, ext)),
            None => Self(id),
        }
    }

    /// Output name derived from this (input) name
    pub fn processed(&self) -> Self {
        let (stem, ext) = split_extension(&self.0);
        match ext {
            Some(ext) => Self(format!("{}{}.{}", stem, PROCESSED_MARKER, ext)),
            None => Self(format!("{}{}", stem, PROCESSED_MARKER)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn extension(&self) -> Option<&str> {
        split_extension(&self.0).1
    }
}

impl fmt::Display for ArtifactName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ArtifactName {
    type Error = InvalidArtifactName;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<ArtifactName> for String {
    fn from(name: ArtifactName) -> Self {
        name.0
    }
}

/// Caller-facing name of the processed output, e.g. `a.txt` -> `a_processed.txt`
pub fn public_result_name(suggested_filename: &str) -> String {
    let base: String = base_name(suggested_filename)
        .chars()
        .filter(|c| !c.is_control() && *c != '"')
        .collect();
    let base = base.trim();
    if base.is_empty() {
        return format!("result{}", PROCESSED_MARKER);
    }

    let (stem, ext) = split_extension(base);
    match ext {
        Some(ext) => format!("{}{}.{}", stem, PROCESSED_MARKER, ext),
        None => format!("{}{}", stem, PROCESSED_MARKER),
    }
}

/// Last path component of a client-supplied filename
pub fn base_name(filename: &str) -> &str {
    filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename)
}

fn sanitized_extension(filename: &str) -> Option<String> {
    let (_, ext) = split_extension(base_name(filename));
    let ext = ext?.to_ascii_lowercase();
    let valid = !ext.is_empty()
        && ext.len() <= MAX_EXTENSION_LEN
        && ext.chars().all(|c| c.is_ascii_alphanumeric());
    valid.then_some(ext)
}

/// Split at the last dot; a leading dot (hidden file) is not an extension
fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(idx) if idx > 0 && idx + 1 < name.len() => (&name[..idx], Some(&name[idx + 1..])),
        _ => (name, None),
    }
}
