//! Turns layer descriptions into build plans for the GPU stage.
//!
//! A `LayerPlan` is the CPU-side half of a runtime layer: validated shader
//! sources, the layer's own uniform table, and the derived background flag.
//! Descriptions that cannot contribute anything (no vertex source, or no
//! surviving pass) are dropped here with a log line — a build-time defect is
//! never promoted into a runtime error. GPU realization of the surviving
//! plans happens in `gpu::state`.

use std::path::{Path, PathBuf};

use winit::dpi::PhysicalSize;

use effectdoc::LayerDescription;

use crate::uniforms::{UniformTable, BACKGROUND_IMAGE};

/// One surviving pass: the original pass index and its fragment source.
#[derive(Debug, Clone)]
pub struct PassPlan {
    pub index: usize,
    pub label: String,
    pub fragment_source: String,
}

/// An asynchronous texture load requested by a layer description.
#[derive(Debug, Clone)]
pub struct TextureRequest {
    pub path: PathBuf,
    pub uniform: String,
}

#[derive(Debug, Clone)]
pub struct LayerPlan {
    pub label: String,
    pub visible: bool,
    pub vertex_source: String,
    pub passes: Vec<PassPlan>,
    pub uniforms: UniformTable,
    pub needs_background: bool,
    pub texture: Option<TextureRequest>,
}

/// Builds the ordered plan list from descriptions, in input order.
pub fn build_plans(
    descriptions: &[LayerDescription],
    document_root: &Path,
    surface: PhysicalSize<u32>,
) -> Vec<LayerPlan> {
    let mut plans = Vec::with_capacity(descriptions.len());
    for (index, description) in descriptions.iter().enumerate() {
        let label = description.label(index);
        if let Some(plan) = build_plan(description, &label, document_root, surface) {
            plans.push(plan);
        }
    }
    plans
}

fn build_plan(
    description: &LayerDescription,
    label: &str,
    document_root: &Path,
    surface: PhysicalSize<u32>,
) -> Option<LayerPlan> {
    let Some(vertex_source) = description.compiled_vertex_source.clone() else {
        tracing::warn!(layer = %label, "layer has no vertex source");
        return None;
    };

    let mut passes = Vec::new();
    for (index, fragment) in description.compiled_fragment_sources.iter().enumerate() {
        let pass_label = description
            .passes
            .get(index)
            .and_then(|pass| pass.name.clone())
            .unwrap_or_else(|| format!("pass #{index}"));
        match fragment {
            Some(source) => passes.push(PassPlan {
                index,
                label: pass_label,
                fragment_source: source.clone(),
            }),
            None => {
                tracing::warn!(layer = %label, pass = %pass_label, "pass has no fragment source");
            }
        }
    }
    if passes.is_empty() {
        tracing::warn!(layer = %label, "no surviving passes");
        return None;
    }

    let needs_background = passes
        .iter()
        .any(|pass| pass.fragment_source.contains(BACKGROUND_IMAGE));

    // Each layer gets its own table; defaults are value-constructed, never a
    // shared reference.
    let mut uniforms = UniformTable::with_reserved(surface);
    for (name, declaration) in &description.uniform_declarations {
        uniforms.merge_declaration(name, declaration);
    }

    let texture = description.texture.as_ref().map(|descriptor| {
        let request = TextureRequest {
            path: document_root.join(&descriptor.src),
            uniform: descriptor.uniform_name().to_string(),
        };
        uniforms.insert_custom_texture(&request.uniform);
        request
    });

    Some(LayerPlan {
        label: label.to_string(),
        visible: description.visible,
        vertex_source,
        passes,
        uniforms,
        needs_background,
        texture,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uniforms::{TextureSlot, UniformValue, TIME};

    fn surface() -> PhysicalSize<u32> {
        PhysicalSize::new(1280, 720)
    }

    fn description(json: serde_json::Value) -> LayerDescription {
        serde_json::from_value(json).unwrap()
    }

    fn solid(kind: &str) -> LayerDescription {
        description(serde_json::json!({
            "kind": kind,
            "compiledVertexSource": "void main() { gl_Position = vec4(position, 0.0, 1.0); }",
            "compiledFragmentSources": ["void main() { gl_FragColor = vec4(1.0); }"]
        }))
    }

    #[test]
    fn complete_description_yields_one_pass_per_fragment() {
        let layer = description(serde_json::json!({
            "kind": "blur",
            "compiledVertexSource": "void main() {}",
            "compiledFragmentSources": ["void main() { /* h */ }", "void main() { /* v */ }"]
        }));
        let plans = build_plans(&[layer], Path::new("."), surface());
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].passes.len(), 2);
        assert!(plans[0].visible);
    }

    #[test]
    fn missing_vertex_source_drops_exactly_one_layer() {
        let broken = description(serde_json::json!({
            "kind": "broken",
            "compiledFragmentSources": ["void main() {}"]
        }));
        let layers = vec![solid("first"), broken, solid("last")];
        let plans = build_plans(&layers, Path::new("."), surface());
        assert_eq!(plans.len(), 2);
        assert!(plans[0].label.starts_with("first"));
        assert!(plans[1].label.starts_with("last"));
    }

    #[test]
    fn absent_fragment_sources_skip_passes_preserving_order() {
        let layer = description(serde_json::json!({
            "kind": "partial",
            "passes": [{"name": "a"}, {"name": "b"}, {"name": "c"}],
            "compiledVertexSource": "void main() {}",
            "compiledFragmentSources": ["void main() { /* a */ }", null, "void main() { /* c */ }"]
        }));
        let plans = build_plans(&[layer], Path::new("."), surface());
        assert_eq!(plans.len(), 1);
        let indices: Vec<usize> = plans[0].passes.iter().map(|pass| pass.index).collect();
        assert_eq!(indices, vec![0, 2]);
        assert_eq!(plans[0].passes[1].label, "c");
    }

    #[test]
    fn all_fragments_absent_drops_the_layer() {
        let layer = description(serde_json::json!({
            "kind": "empty",
            "compiledVertexSource": "void main() {}",
            "compiledFragmentSources": [null, null]
        }));
        assert!(build_plans(&[layer], Path::new("."), surface()).is_empty());
    }

    #[test]
    fn background_flag_follows_textual_reference() {
        let with = description(serde_json::json!({
            "kind": "echo",
            "compiledVertexSource": "void main() {}",
            "compiledFragmentSources": [
                "void main() { gl_FragColor = texture(inputImage, vec2(0.5)); }",
                "void main() { gl_FragColor = texture(backgroundImage, vec2(0.5)); }"
            ]
        }));
        let without = solid("plain");
        let plans = build_plans(&[with, without], Path::new("."), surface());
        assert!(plans[0].needs_background);
        assert!(!plans[1].needs_background);
    }

    #[test]
    fn declared_uniform_survives_merge() {
        let layer = description(serde_json::json!({
            "kind": "speedy",
            "uniformDeclarations": {"uSpeed": {"type": "1f", "value": 0.42}},
            "compiledVertexSource": "void main() {}",
            "compiledFragmentSources": ["void main() {}"]
        }));
        let plans = build_plans(&[layer], Path::new("."), surface());
        assert_eq!(
            plans[0].uniforms.get("uSpeed"),
            Some(&UniformValue::Scalar(0.42))
        );
        assert_eq!(plans[0].uniforms.get(TIME), Some(&UniformValue::Scalar(0.0)));
    }

    #[test]
    fn texture_request_resolves_against_document_root() {
        let layer = description(serde_json::json!({
            "kind": "textured",
            "compiledVertexSource": "void main() {}",
            "compiledFragmentSources": ["void main() {}"],
            "texture": {"src": "noise.png", "name": "noiseTex"}
        }));
        let plans = build_plans(&[layer], Path::new("/docs/effects"), surface());
        let request = plans[0].texture.as_ref().unwrap();
        assert_eq!(request.path, Path::new("/docs/effects/noise.png"));
        assert_eq!(request.uniform, "noiseTex");
        assert_eq!(
            plans[0].uniforms.get("noiseTex"),
            Some(&UniformValue::Texture(TextureSlot::Pending))
        );
    }

    #[test]
    fn uniform_tables_are_not_shared_between_layers() {
        let layers = vec![solid("one"), solid("two")];
        let mut plans = build_plans(&layers, Path::new("."), surface());
        plans[0].uniforms.set_time(9.0);
        assert_eq!(plans[1].uniforms.get(TIME), Some(&UniformValue::Scalar(0.0)));
    }
}
