//! GPU orchestration for the compositing core.
//!
//! - `context` owns wgpu instance/device/surface wiring and reconfigures
//!   swapchain state when the window resizes.
//! - `targets` holds the ping-ponged offscreen pair and the background
//!   capture buffer.
//! - `program` compiles wrapped GLSL into per-pass render pipelines behind
//!   shared bind group layouts.
//! - `textures` materialises placeholder and custom-texture resources and
//!   runs asynchronous image loads.
//! - `state` glues everything together and exposes the `Compositor` API used
//!   by `window`.

mod context;
mod program;
mod state;
mod targets;
mod textures;

pub(crate) use state::Compositor;
