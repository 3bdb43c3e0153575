//! Uniform tables and their GPU byte layout.
//!
//! Every layer owns one `UniformTable`: the reserved pipeline entries plus
//! whatever the layer description declared, merged per the rules below. The
//! table's numeric entries also determine a `UniformLayout`, the std140
//! layout used both to generate the GLSL uniform block injected into the
//! layer's shaders and to pack values into the layer's uniform buffer each
//! frame. Deriving both sides from the same layout means the shader and the
//! buffer can never disagree about offsets.

use winit::dpi::PhysicalSize;

use effectdoc::UniformDeclaration;

/// Seconds since pipeline start.
pub const TIME: &str = "time";
/// Surface size in physical pixels.
pub const RESOLUTION: &str = "resolution";
/// Normalized pointer position, Y inverted so 0 is the bottom edge.
pub const POINTER: &str = "pointer";
/// The stage's input: the previous stage's output.
pub const INPUT_IMAGE: &str = "inputImage";
/// The captured pre-pipeline image; only meaningful for layers that ask for it.
pub const BACKGROUND_IMAGE: &str = "backgroundImage";

/// Reserved names the compositor rewrites every frame. Layer declarations and
/// custom textures never displace these.
pub const PIPELINE_MANAGED: [&str; 4] = [TIME, RESOLUTION, POINTER, INPUT_IMAGE];

/// State of a texture-typed uniform slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureSlot {
    /// Rebound by the compositor to the current input buffer every pass.
    Input,
    /// The captured pre-pipeline image.
    Background,
    /// A custom texture still decoding; reads resolve to the placeholder.
    Pending,
    /// A custom texture resident on the GPU.
    Ready,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    Scalar(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Texture(TextureSlot),
    /// A declared value whose type tag the compositor does not interpret.
    /// Carried through unmodified so new tags stay a warning, not an error.
    Opaque(serde_json::Value),
}

impl UniformValue {
    /// Interprets a declared uniform. Known tags are `1f` and `2f` (the
    /// latter accepting `[x, y]` or `{x, y}`); anything else passes through
    /// as `Opaque` with a warning.
    pub fn from_declaration(name: &str, declaration: &UniformDeclaration) -> Self {
        match declaration.kind.as_str() {
            "1f" => match declaration.value.as_f64() {
                Some(value) => UniformValue::Scalar(value as f32),
                None => {
                    tracing::warn!(
                        uniform = name,
                        value = %declaration.value,
                        "scalar uniform declaration is not a number; passing through"
                    );
                    UniformValue::Opaque(declaration.value.clone())
                }
            },
            "2f" => match vec2_from_value(&declaration.value) {
                Some(value) => UniformValue::Vec2(value),
                None => {
                    tracing::warn!(
                        uniform = name,
                        value = %declaration.value,
                        "vector2 uniform declaration has an unexpected shape; passing through"
                    );
                    UniformValue::Opaque(declaration.value.clone())
                }
            },
            other => {
                tracing::warn!(
                    uniform = name,
                    declared_type = other,
                    "unhandled uniform declaration type; passing value through"
                );
                UniformValue::Opaque(declaration.value.clone())
            }
        }
    }
}

fn vec2_from_value(value: &serde_json::Value) -> Option<[f32; 2]> {
    if let Some(items) = value.as_array() {
        if items.len() == 2 {
            let x = items[0].as_f64()?;
            let y = items[1].as_f64()?;
            return Some([x as f32, y as f32]);
        }
        return None;
    }
    let object = value.as_object()?;
    let x = object.get("x")?.as_f64()?;
    let y = object.get("y")?.as_f64()?;
    Some([x as f32, y as f32])
}

/// Insertion-ordered name → value map. Order matters: it fixes the field
/// order of the generated uniform block, so it must be stable for the
/// lifetime of the layer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UniformTable {
    slots: Vec<(String, UniformValue)>,
}

impl UniformTable {
    /// Builds a table seeded with the reserved entries. Each layer calls
    /// this independently; tables are never shared between layers.
    pub fn with_reserved(surface: PhysicalSize<u32>) -> Self {
        let mut table = Self::default();
        table.set(RESOLUTION, UniformValue::Vec2([
            surface.width as f32,
            surface.height as f32,
        ]));
        table.set(POINTER, UniformValue::Vec2([0.0, 0.0]));
        table.set(TIME, UniformValue::Scalar(0.0));
        table.set(INPUT_IMAGE, UniformValue::Texture(TextureSlot::Input));
        table.set(
            BACKGROUND_IMAGE,
            UniformValue::Texture(TextureSlot::Background),
        );
        table
    }

    pub fn get(&self, name: &str) -> Option<&UniformValue> {
        self.slots
            .iter()
            .find(|(slot, _)| slot == name)
            .map(|(_, value)| value)
    }

    /// Inserts or updates a slot; updates keep their original position so
    /// the block layout stays stable.
    pub fn set(&mut self, name: &str, value: UniformValue) {
        if let Some(slot) = self.slots.iter_mut().find(|(slot, _)| slot == name) {
            slot.1 = value;
        } else {
            self.slots.push((name.to_string(), value));
        }
    }

    /// Merges one declared uniform. The four pipeline-managed names are
    /// never overwritten.
    pub fn merge_declaration(&mut self, name: &str, declaration: &UniformDeclaration) {
        if PIPELINE_MANAGED.contains(&name) {
            tracing::warn!(
                uniform = name,
                "declaration collides with a pipeline-managed uniform; ignored"
            );
            return;
        }
        self.set(name, UniformValue::from_declaration(name, declaration));
    }

    /// Registers a custom texture slot, overriding a declared uniform of the
    /// same name. Pipeline-managed names stay off limits.
    pub fn insert_custom_texture(&mut self, name: &str) {
        if PIPELINE_MANAGED.contains(&name) {
            tracing::warn!(
                uniform = name,
                "custom texture name collides with a pipeline-managed uniform; ignored"
            );
            return;
        }
        self.set(name, UniformValue::Texture(TextureSlot::Pending));
    }

    pub fn set_time(&mut self, seconds: f32) {
        self.set(TIME, UniformValue::Scalar(seconds));
    }

    pub fn set_resolution(&mut self, width: f32, height: f32) {
        self.set(RESOLUTION, UniformValue::Vec2([width, height]));
    }

    pub fn set_pointer(&mut self, pointer: [f32; 2]) {
        self.set(POINTER, UniformValue::Vec2(pointer));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &UniformValue)> {
        self.slots.iter().map(|(name, value)| (name.as_str(), value))
    }
}

/// Maps a raw pointer position in surface pixels to the normalized `pointer`
/// uniform: X in 0..1 left to right, Y inverted so 0 is the bottom edge.
pub fn normalized_pointer(position: (f64, f64), surface: PhysicalSize<u32>) -> [f32; 2] {
    let width = surface.width.max(1) as f32;
    let height = surface.height.max(1) as f32;
    [
        position.0 as f32 / width,
        1.0 - position.1 as f32 / height,
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericKind {
    Scalar,
    Vec2,
    Vec3,
    Vec4,
}

impl NumericKind {
    fn alignment(self) -> usize {
        match self {
            NumericKind::Scalar => 4,
            NumericKind::Vec2 => 8,
            NumericKind::Vec3 | NumericKind::Vec4 => 16,
        }
    }

    fn size(self) -> usize {
        match self {
            NumericKind::Scalar => 4,
            NumericKind::Vec2 => 8,
            NumericKind::Vec3 => 12,
            NumericKind::Vec4 => 16,
        }
    }

    pub fn glsl_type(self) -> &'static str {
        match self {
            NumericKind::Scalar => "float",
            NumericKind::Vec2 => "vec2",
            NumericKind::Vec3 => "vec3",
            NumericKind::Vec4 => "vec4",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UniformField {
    pub name: String,
    pub kind: NumericKind,
    pub offset: usize,
}

/// std140 layout of a table's numeric entries, in table order.
#[derive(Debug, Clone, PartialEq)]
pub struct UniformLayout {
    fields: Vec<UniformField>,
    size: usize,
}

impl UniformLayout {
    pub fn for_table(table: &UniformTable) -> Self {
        let mut fields = Vec::new();
        let mut offset = 0usize;
        for (name, value) in table.iter() {
            let kind = match value {
                UniformValue::Scalar(_) => NumericKind::Scalar,
                UniformValue::Vec2(_) => NumericKind::Vec2,
                UniformValue::Vec3(_) => NumericKind::Vec3,
                UniformValue::Vec4(_) => NumericKind::Vec4,
                UniformValue::Texture(_) | UniformValue::Opaque(_) => continue,
            };
            if !is_glsl_identifier(name) {
                tracing::warn!(
                    uniform = name,
                    "uniform name is not a valid GLSL identifier; not bound"
                );
                continue;
            }
            offset = align_to(offset, kind.alignment());
            fields.push(UniformField {
                name: name.to_string(),
                kind,
                offset,
            });
            offset += kind.size();
        }
        let size = if fields.is_empty() {
            0
        } else {
            align_to(offset, 16)
        };
        Self { fields, size }
    }

    pub fn fields(&self) -> &[UniformField] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Buffer size in bytes, already rounded up to std140 block alignment.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|field| field.name == name)
    }

    /// Packs the table's current values at this layout's offsets. Slots that
    /// changed numeric shape since the layout was built are left zeroed.
    pub fn pack(&self, table: &UniformTable) -> Vec<u8> {
        let mut bytes = vec![0u8; self.size];
        for field in &self.fields {
            let components: &[f32] = match (table.get(&field.name), field.kind) {
                (Some(UniformValue::Scalar(value)), NumericKind::Scalar) => {
                    std::slice::from_ref(value)
                }
                (Some(UniformValue::Vec2(value)), NumericKind::Vec2) => value,
                (Some(UniformValue::Vec3(value)), NumericKind::Vec3) => value,
                (Some(UniformValue::Vec4(value)), NumericKind::Vec4) => value,
                _ => continue,
            };
            for (index, component) in components.iter().enumerate() {
                let start = field.offset + index * 4;
                bytes[start..start + 4].copy_from_slice(&component.to_le_bytes());
            }
        }
        bytes
    }
}

fn align_to(offset: usize, alignment: usize) -> usize {
    offset.div_ceil(alignment) * alignment
}

pub(crate) fn is_glsl_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn declaration(kind: &str, value: serde_json::Value) -> UniformDeclaration {
        serde_json::from_value(serde_json::json!({ "type": kind, "value": value })).unwrap()
    }

    fn surface() -> PhysicalSize<u32> {
        PhysicalSize::new(800, 600)
    }

    #[test]
    fn reserved_entries_are_seeded() {
        let table = UniformTable::with_reserved(surface());
        assert_eq!(
            table.get(RESOLUTION),
            Some(&UniformValue::Vec2([800.0, 600.0]))
        );
        assert_eq!(table.get(TIME), Some(&UniformValue::Scalar(0.0)));
        assert_eq!(table.get(POINTER), Some(&UniformValue::Vec2([0.0, 0.0])));
        assert_eq!(
            table.get(INPUT_IMAGE),
            Some(&UniformValue::Texture(TextureSlot::Input))
        );
        assert_eq!(
            table.get(BACKGROUND_IMAGE),
            Some(&UniformValue::Texture(TextureSlot::Background))
        );
    }

    #[test]
    fn declared_scalar_merges_without_disturbing_reserved() {
        let mut table = UniformTable::with_reserved(surface());
        table.merge_declaration("uSpeed", &declaration("1f", serde_json::json!(0.42)));
        assert_eq!(table.get("uSpeed"), Some(&UniformValue::Scalar(0.42)));
        assert_eq!(
            table.get(RESOLUTION),
            Some(&UniformValue::Vec2([800.0, 600.0]))
        );
        assert_eq!(table.get(TIME), Some(&UniformValue::Scalar(0.0)));
    }

    #[test]
    fn pipeline_managed_names_are_never_overwritten() {
        let mut table = UniformTable::with_reserved(surface());
        for name in PIPELINE_MANAGED {
            table.merge_declaration(name, &declaration("1f", serde_json::json!(9.0)));
        }
        assert_eq!(
            table.get(RESOLUTION),
            Some(&UniformValue::Vec2([800.0, 600.0]))
        );
        assert_eq!(table.get(TIME), Some(&UniformValue::Scalar(0.0)));
        assert_eq!(
            table.get(INPUT_IMAGE),
            Some(&UniformValue::Texture(TextureSlot::Input))
        );
    }

    #[test]
    fn vector2_accepts_array_and_object_forms() {
        let array = UniformValue::from_declaration(
            "uOffset",
            &declaration("2f", serde_json::json!([0.25, 0.75])),
        );
        assert_eq!(array, UniformValue::Vec2([0.25, 0.75]));

        let object = UniformValue::from_declaration(
            "uOffset",
            &declaration("2f", serde_json::json!({"x": 0.25, "y": 0.75})),
        );
        assert_eq!(object, UniformValue::Vec2([0.25, 0.75]));
    }

    #[test]
    fn unknown_type_passes_value_through() {
        let raw = serde_json::json!({"m": [1, 2, 3, 4]});
        let value = UniformValue::from_declaration("uMatrix", &declaration("mat2", raw.clone()));
        assert_eq!(value, UniformValue::Opaque(raw));
    }

    #[test]
    fn custom_texture_overrides_declared_uniform() {
        let mut table = UniformTable::with_reserved(surface());
        table.merge_declaration("noiseTex", &declaration("1f", serde_json::json!(1.0)));
        table.insert_custom_texture("noiseTex");
        assert_eq!(
            table.get("noiseTex"),
            Some(&UniformValue::Texture(TextureSlot::Pending))
        );
    }

    #[test]
    fn pointer_maps_surface_corners() {
        let surface = PhysicalSize::new(640, 480);
        assert_eq!(normalized_pointer((0.0, 0.0), surface), [0.0, 1.0]);
        assert_eq!(normalized_pointer((640.0, 0.0), surface), [1.0, 1.0]);
        assert_eq!(normalized_pointer((0.0, 480.0), surface), [0.0, 0.0]);
        assert_eq!(normalized_pointer((640.0, 480.0), surface), [1.0, 0.0]);
    }

    #[test]
    fn layout_follows_std140_rules() {
        let mut table = UniformTable::default();
        table.set("a", UniformValue::Vec2([0.0, 0.0]));
        table.set("b", UniformValue::Scalar(0.0));
        table.set("c", UniformValue::Vec3([0.0, 0.0, 0.0]));
        table.set("d", UniformValue::Scalar(0.0));
        let layout = UniformLayout::for_table(&table);

        let offsets: Vec<usize> = layout.fields().iter().map(|field| field.offset).collect();
        // vec2 at 0, float at 8, vec3 aligned to 16, trailing float at 28.
        assert_eq!(offsets, vec![0, 8, 16, 28]);
        assert_eq!(layout.size(), 32);
    }

    #[test]
    fn layout_skips_textures_and_opaque_values() {
        let mut table = UniformTable::with_reserved(surface());
        table.set("uRaw", UniformValue::Opaque(serde_json::json!("?")));
        let layout = UniformLayout::for_table(&table);
        assert!(!layout.contains(INPUT_IMAGE));
        assert!(!layout.contains(BACKGROUND_IMAGE));
        assert!(!layout.contains("uRaw"));
        assert!(layout.contains(TIME));
    }

    #[test]
    fn pack_writes_values_at_field_offsets() {
        let mut table = UniformTable::default();
        table.set("scale", UniformValue::Scalar(2.0));
        table.set("offset", UniformValue::Vec2([0.5, -0.5]));
        let layout = UniformLayout::for_table(&table);
        let bytes = layout.pack(&table);

        assert_eq!(bytes.len(), layout.size());
        assert_eq!(bytes[0..4], 2.0f32.to_le_bytes());
        assert_eq!(bytes[8..12], 0.5f32.to_le_bytes());
        assert_eq!(bytes[12..16], (-0.5f32).to_le_bytes());
    }

    #[test]
    fn empty_layout_has_zero_size() {
        let layout = UniformLayout::for_table(&UniformTable::default());
        assert!(layout.is_empty());
        assert_eq!(layout.size(), 0);
    }

    #[test]
    fn tables_are_independent_per_layer() {
        let first = UniformTable::with_reserved(surface());
        let mut second = UniformTable::with_reserved(surface());
        second.set_time(5.0);
        assert_eq!(first.get(TIME), Some(&UniformValue::Scalar(0.0)));
        assert_eq!(second.get(TIME), Some(&UniformValue::Scalar(5.0)));
    }
}
