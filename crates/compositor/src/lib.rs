//! Compositing core for layershade.
//!
//! Renders an ordered list of full-screen shader layers, each consuming the
//! previous layer's output, once per displayed frame. The flow:
//!
//! ```text
//!   effect document ──▶ layer::build_plans ──▶ Compositor::new
//!                                                   │
//!   window::run_windowed ──▶ winit event loop ──▶ render()
//!                                                   │
//!                        per frame: uniform refresh ─▶ layer loop over the
//!                        ping-ponged target pair ─▶ final draw to surface
//! ```
//!
//! `layer` validates descriptions into plans, `uniforms` owns the per-layer
//! parameter tables and their std140 layout, `compile` wraps document GLSL
//! for naga, `schedule` fixes the per-frame pass wiring as plain data, and
//! the `gpu` modules realize all of it against wgpu. `window` is the thin
//! frame driver that schedules one compositing pass per redraw.

mod compile;
mod gpu;
pub mod layer;
pub mod schedule;
pub mod uniforms;
pub mod window;

pub use window::{run_windowed, DriverConfig};
