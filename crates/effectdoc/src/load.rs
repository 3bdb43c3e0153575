//! Loads the layer-description document from disk and anchors relative asset
//! locators to the document's directory. The document must be fully readable
//! before compositor construction begins: a missing or unparsable file is a
//! fatal startup condition surfaced to the caller, never papered over.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::document::{EffectDocument, LayerDescription, TextureDescriptor};

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("effect document not found at {0}")]
    Missing(PathBuf),

    #[error("failed to parse effect document: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A parsed document plus the directory its relative locators resolve
/// against.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    root: PathBuf,
    document: EffectDocument,
}

impl LoadedDocument {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DocumentError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(DocumentError::Missing(path.to_path_buf()));
        }

        let raw = fs::read_to_string(path)?;
        let document: EffectDocument = serde_json::from_str(&raw)?;

        let issues = document.validate();
        for issue in &issues {
            tracing::warn!(%issue, "effect document validation issue");
        }

        let root = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(Self { root, document })
    }

    pub fn root(&self) -> &Path {
        self.root.as_path()
    }

    pub fn document(&self) -> &EffectDocument {
        &self.document
    }

    pub fn descriptions(&self) -> &[LayerDescription] {
        &self.document.history
    }

    /// Resolves a texture descriptor's source locator against the document
    /// root.
    pub fn asset_path(&self, descriptor: &TextureDescriptor) -> PathBuf {
        self.root.join(&descriptor.src)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_valid_document() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("effects.json");
        fs::write(
            &path,
            r#"{"history": [{
                "kind": "solid",
                "compiledVertexSource": "void main() {}",
                "compiledFragmentSources": ["void main() {}"],
                "texture": {"src": "textures/noise.png", "name": "noiseTex"}
            }]}"#,
        )
        .unwrap();

        let loaded = LoadedDocument::load(&path).expect("load document");
        assert_eq!(loaded.descriptions().len(), 1);
        let descriptor = loaded.descriptions()[0].texture.clone().unwrap();
        assert_eq!(descriptor.uniform_name(), "noiseTex");
        assert_eq!(
            loaded.asset_path(&descriptor),
            temp.path().join("textures/noise.png")
        );
    }

    #[test]
    fn missing_document_is_fatal() {
        let temp = tempfile::tempdir().unwrap();
        let err = LoadedDocument::load(temp.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, DocumentError::Missing(_)));
    }

    #[test]
    fn empty_file_is_fatal() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("effects.json");
        fs::write(&path, "").unwrap();
        let err = LoadedDocument::load(&path).unwrap_err();
        assert!(matches!(err, DocumentError::Parse(_)));
    }

    #[test]
    fn empty_history_loads() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("effects.json");
        fs::write(&path, r#"{"history": []}"#).unwrap();
        let loaded = LoadedDocument::load(&path).expect("load document");
        assert!(loaded.descriptions().is_empty());
    }
}
