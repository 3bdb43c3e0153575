//! Wraps document shader sources so they compile as Vulkan GLSL.
//!
//! Document sources address their parameters by bare name (`time`,
//! `resolution`, declared uniforms, sampler names). The wrapper strips the
//! declarations the source may carry for those names, prepends a generated
//! header that declares the layer's std140 uniform block and the fixed
//! texture/sampler pairs, and maps every name onto them with `#define`
//! aliases. The block text is generated from the same `UniformLayout` that
//! packs the uniform buffer, so shader offsets always match the bytes.

use std::borrow::Cow;

use wgpu::naga::ShaderStage;

use crate::uniforms::{UniformLayout, BACKGROUND_IMAGE, INPUT_IMAGE};

/// Texture/sampler slots fixed at bind group 1.
const INPUT_TEXTURE_BINDING: u32 = 0;
const BACKGROUND_TEXTURE_BINDING: u32 = 2;
const CUSTOM_TEXTURE_BINDING: u32 = 4;

/// Built-in vertex shader used for layers without special needs and for the
/// fallback indicator. `position` is supplied by the wrapper header.
pub(crate) const DEFAULT_VERTEX_GLSL: &str = r"void main() {
    gl_Position = vec4(position, 0.0, 1.0);
}
";

/// Flat error-indicator draw used when no usable layer exists.
pub(crate) const FALLBACK_FRAGMENT_GLSL: &str = r"void main() {
    gl_FragColor = vec4(0.81, 0.06, 0.35, 1.0);
}
";

/// Compiles a wrapped vertex source through naga's GLSL frontend.
pub(crate) fn compile_vertex_module(device: &wgpu::Device, wrapped: &str) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("layer vertex"),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Owned(wrapped.to_string()),
            stage: ShaderStage::Vertex,
            defines: &[],
        },
    })
}

/// Compiles a wrapped fragment source through naga's GLSL frontend.
pub(crate) fn compile_fragment_module(device: &wgpu::Device, wrapped: &str) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("layer fragment"),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Owned(wrapped.to_string()),
            stage: ShaderStage::Fragment,
            defines: &[],
        },
    })
}

/// Produces a self-contained GLSL fragment shader from a document source.
pub(crate) fn wrap_fragment_source(
    source: &str,
    layout: &UniformLayout,
    custom_uniform: Option<&str>,
) -> String {
    let mut header = String::new();
    header.push_str("#version 450\n");
    header.push_str("layout(location = 0) out vec4 layershade_out_color;\n");
    header.push_str("#define gl_FragColor layershade_out_color\n");
    header.push_str(&uniform_block_glsl(layout));
    header.push_str(&sampler_bindings_glsl(layout, custom_uniform));

    let known = known_names(layout, custom_uniform);
    let sanitized = sanitize(source, &known);
    format!("{header}#line 1\n{sanitized}")
}

/// Produces a self-contained GLSL vertex shader from a document source. The
/// full-screen quad position arrives as the single vertex attribute.
pub(crate) fn wrap_vertex_source(source: &str, layout: &UniformLayout) -> String {
    let mut header = String::new();
    header.push_str("#version 450\n");
    header.push_str("layout(location = 0) in vec2 position;\n");
    header.push_str(&uniform_block_glsl(layout));

    let known = known_names(layout, None);
    let sanitized = sanitize(source, &known);
    format!("{header}#line 1\n{sanitized}")
}

fn known_names(layout: &UniformLayout, custom_uniform: Option<&str>) -> Vec<String> {
    let mut names: Vec<String> = layout
        .fields()
        .iter()
        .map(|field| field.name.clone())
        .collect();
    names.push(INPUT_IMAGE.to_string());
    names.push(BACKGROUND_IMAGE.to_string());
    if let Some(name) = custom_uniform {
        names.push(name.to_string());
    }
    names
}

/// Declares the layer's uniform block and aliases each field back to its
/// bare name. Empty layouts produce no block at all.
fn uniform_block_glsl(layout: &UniformLayout) -> String {
    if layout.is_empty() {
        return String::new();
    }
    let mut block = String::from("layout(std140, set = 0, binding = 0) uniform LayerParams {\n");
    for field in layout.fields() {
        block.push_str(&format!("    {} _{};\n", field.kind.glsl_type(), field.name));
    }
    block.push_str("} layershade_params;\n");
    for field in layout.fields() {
        block.push_str(&format!(
            "#define {name} layershade_params._{name}\n",
            name = field.name
        ));
    }
    block
}

/// Declares the fixed texture/sampler pairs and aliases sampler names onto
/// combined-image constructors, skipping names shadowed by numeric fields.
fn sampler_bindings_glsl(layout: &UniformLayout, custom_uniform: Option<&str>) -> String {
    let mut bindings = String::new();
    let slots = [
        ("layershade_input", INPUT_TEXTURE_BINDING),
        ("layershade_background", BACKGROUND_TEXTURE_BINDING),
        ("layershade_custom", CUSTOM_TEXTURE_BINDING),
    ];
    for (stem, binding) in slots {
        bindings.push_str(&format!(
            "layout(set = 1, binding = {binding}) uniform texture2D {stem}_texture;\n"
        ));
        bindings.push_str(&format!(
            "layout(set = 1, binding = {}) uniform sampler {stem}_sampler;\n",
            binding + 1
        ));
    }

    let mut aliases = vec![
        (INPUT_IMAGE, "layershade_input"),
        (BACKGROUND_IMAGE, "layershade_background"),
    ];
    if let Some(name) = custom_uniform {
        aliases.push((name, "layershade_custom"));
    }
    for (name, stem) in aliases {
        if layout.contains(name) {
            continue;
        }
        bindings.push_str(&format!(
            "#define {name} sampler2D({stem}_texture, {stem}_sampler)\n"
        ));
    }
    bindings
}

/// Strips directives the wrapper replaces: `#version`, `precision`
/// statements, legacy `attribute`/`varying` declarations, and `uniform`
/// declarations naming anything the header now provides.
fn sanitize(source: &str, known_names: &[String]) -> String {
    let mut sanitized = String::new();
    for line in source.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("#version")
            || trimmed.starts_with("precision ")
            || trimmed.starts_with("attribute ")
            || trimmed.starts_with("varying ")
        {
            continue;
        }
        if trimmed.starts_with("uniform ") && known_names.iter().any(|name| trimmed.contains(name.as_str()))
        {
            continue;
        }
        sanitized.push_str(line);
        sanitized.push('\n');
    }
    sanitized
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uniforms::{UniformTable, UniformValue};
    use winit::dpi::PhysicalSize;

    fn layer_layout() -> UniformLayout {
        let mut table = UniformTable::with_reserved(PhysicalSize::new(640, 480));
        table.set("uSpeed", UniformValue::Scalar(0.42));
        UniformLayout::for_table(&table)
    }

    #[test]
    fn wrap_strips_known_uniform_declarations() {
        let source = r#"
            #version 100
            precision mediump float;
            uniform float time;
            uniform vec2 resolution;
            uniform float uSpeed;
            void main() {
                gl_FragColor = vec4(fract(time * uSpeed), 0.0, 0.0, 1.0);
            }
        "#;
        let wrapped = wrap_fragment_source(source, &layer_layout(), None);
        assert!(!wrapped.contains("uniform float time"));
        assert!(!wrapped.contains("uniform vec2 resolution"));
        assert!(!wrapped.contains("uniform float uSpeed"));
        assert!(!wrapped.contains("precision mediump"));
        assert!(wrapped.contains("#define time layershade_params._time"));
        assert!(wrapped.contains("#define uSpeed layershade_params._uSpeed"));
        assert!(wrapped.contains("gl_FragColor"));
    }

    #[test]
    fn wrap_declares_sampler_aliases() {
        let wrapped = wrap_fragment_source("void main() {}", &layer_layout(), Some("noiseTex"));
        assert!(wrapped
            .contains("#define inputImage sampler2D(layershade_input_texture, layershade_input_sampler)"));
        assert!(wrapped.contains(
            "#define backgroundImage sampler2D(layershade_background_texture, layershade_background_sampler)"
        ));
        assert!(wrapped
            .contains("#define noiseTex sampler2D(layershade_custom_texture, layershade_custom_sampler)"));
    }

    #[test]
    fn shadowed_sampler_alias_is_suppressed() {
        let mut table = UniformTable::default();
        table.set(BACKGROUND_IMAGE, UniformValue::Scalar(1.0));
        let layout = UniformLayout::for_table(&table);
        let wrapped = wrap_fragment_source("void main() {}", &layout, None);
        assert!(!wrapped.contains("#define backgroundImage sampler2D"));
        assert!(wrapped.contains("#define backgroundImage layershade_params._backgroundImage"));
    }

    #[test]
    fn empty_layout_omits_the_block() {
        let layout = UniformLayout::for_table(&UniformTable::default());
        let wrapped = wrap_fragment_source(FALLBACK_FRAGMENT_GLSL, &layout, None);
        assert!(!wrapped.contains("LayerParams"));
        assert!(wrapped.contains("void main()"));
    }

    #[test]
    fn vertex_wrap_supplies_position_attribute() {
        let wrapped = wrap_vertex_source(DEFAULT_VERTEX_GLSL, &layer_layout());
        assert!(wrapped.contains("layout(location = 0) in vec2 position;"));
        assert!(wrapped.contains("gl_Position"));
        assert!(!wrapped.contains("sampler2D"));
    }
}
