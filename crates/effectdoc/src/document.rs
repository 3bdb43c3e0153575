//! Defines the layer-description document schema shared by the loader and the
//! compositor, so renderer construction can walk layers, passes, and uniform
//! declarations without re-parsing raw JSON. The document is the full record
//! an authoring front-end exported; the compositor only consumes the ordered
//! `history` of layer descriptions.
//!
//! Types:
//!
//! - `EffectDocument` holds the ordered `history` consumed by layer
//!   construction.
//! - `LayerDescription` stores per-layer visibility, pass metadata, shader
//!   source texts, uniform declarations, and an optional custom texture.
//! - `UniformDeclaration` keeps the declared type tag and the raw value so
//!   unknown tags can be passed through opaquely.
//! - `TextureDescriptor` pairs a source locator with the sampler name the
//!   loaded texture should be bound under.
//!
//! Functions:
//!
//! - `EffectDocument::validate` returns human-readable issues so the loader
//!   can surface misconfigurations without refusing to start.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Sampler name used when a texture descriptor does not name one.
pub const DEFAULT_TEXTURE_UNIFORM: &str = "customTexture";

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct EffectDocument {
    #[serde(default)]
    pub history: Vec<LayerDescription>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct LayerDescription {
    #[serde(default)]
    pub kind: String,
    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(default)]
    pub passes: Vec<PassDescription>,
    #[serde(default)]
    pub uniform_declarations: BTreeMap<String, UniformDeclaration>,
    #[serde(default)]
    pub compiled_vertex_source: Option<String>,
    #[serde(default)]
    pub compiled_fragment_sources: Vec<Option<String>>,
    #[serde(default)]
    pub texture: Option<TextureDescriptor>,
}

fn default_visible() -> bool {
    true
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct PassDescription {
    #[serde(default)]
    pub name: Option<String>,
}

/// A declared uniform keeps its raw value: known tags (`1f`, `2f`) are
/// interpreted by the compositor, everything else is carried through
/// untouched so new tags can be added without a schema change.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct UniformDeclaration {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: serde_json::Value,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TextureDescriptor {
    pub src: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl TextureDescriptor {
    /// Sampler name the loaded texture is bound under.
    pub fn uniform_name(&self) -> &str {
        self.name.as_deref().unwrap_or(DEFAULT_TEXTURE_UNIFORM)
    }
}

impl LayerDescription {
    /// Label used in diagnostics; falls back to the position in `history`.
    pub fn label(&self, index: usize) -> String {
        if self.kind.is_empty() {
            format!("layer #{index}")
        } else {
            format!("{} (#{index})", self.kind)
        }
    }
}

impl EffectDocument {
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        for (index, layer) in self.history.iter().enumerate() {
            let label = layer.label(index);
            if layer.compiled_vertex_source.is_none() {
                issues.push(format!("{label} has no vertex source and will be skipped"));
            }
            if layer.compiled_fragment_sources.is_empty() {
                issues.push(format!("{label} declares no fragment sources"));
            }
            if !layer.passes.is_empty()
                && layer.passes.len() != layer.compiled_fragment_sources.len()
            {
                issues.push(format!(
                    "{label} declares {} passes but {} fragment sources",
                    layer.passes.len(),
                    layer.compiled_fragment_sources.len()
                ));
            }
            for (name, declaration) in &layer.uniform_declarations {
                if name.is_empty() {
                    issues.push(format!("{label} declares a uniform with an empty name"));
                }
                if declaration.kind.is_empty() {
                    issues.push(format!("{label} uniform '{name}' has an empty type tag"));
                }
            }
        }
        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visible_defaults_to_true() {
        let layer: LayerDescription = serde_json::from_str(r#"{"kind": "solid"}"#).unwrap();
        assert!(layer.visible);
        assert!(layer.compiled_vertex_source.is_none());
        assert!(layer.compiled_fragment_sources.is_empty());
    }

    #[test]
    fn parses_camel_case_fields() {
        let json = r#"{
            "kind": "ripple",
            "visible": false,
            "passes": [{"name": "main"}],
            "uniformDeclarations": {"uSpeed": {"type": "1f", "value": 0.42}},
            "compiledVertexSource": "void main() {}",
            "compiledFragmentSources": ["void main() {}", null],
            "texture": {"src": "noise.png"}
        }"#;
        let layer: LayerDescription = serde_json::from_str(json).unwrap();
        assert!(!layer.visible);
        assert_eq!(layer.passes.len(), 1);
        assert_eq!(layer.compiled_fragment_sources.len(), 2);
        assert!(layer.compiled_fragment_sources[1].is_none());
        let declaration = &layer.uniform_declarations["uSpeed"];
        assert_eq!(declaration.kind, "1f");
        assert_eq!(declaration.value, serde_json::json!(0.42));
        assert_eq!(
            layer.texture.as_ref().unwrap().uniform_name(),
            DEFAULT_TEXTURE_UNIFORM
        );
    }

    #[test]
    fn empty_history_is_valid() {
        let document: EffectDocument = serde_json::from_str(r#"{"history": []}"#).unwrap();
        assert!(document.history.is_empty());
        assert!(document.validate().is_empty());
    }

    #[test]
    fn validate_flags_missing_vertex_and_pass_mismatch() {
        let json = r#"{"history": [{
            "kind": "glitch",
            "passes": [{"name": "a"}, {"name": "b"}],
            "compiledFragmentSources": ["void main() {}"]
        }]}"#;
        let document: EffectDocument = serde_json::from_str(json).unwrap();
        let issues = document.validate();
        assert!(issues.iter().any(|issue| issue.contains("vertex source")));
        assert!(issues.iter().any(|issue| issue.contains("2 passes")));
    }
}
