mod document;
mod load;

pub use document::{
    EffectDocument, LayerDescription, PassDescription, TextureDescriptor, UniformDeclaration,
    DEFAULT_TEXTURE_UNIFORM,
};
pub use load::{DocumentError, LoadedDocument};
