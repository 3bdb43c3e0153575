//! Frame driver: the winit event loop that schedules one compositing pass
//! per redraw and bridges resize/pointer notifications to the `Compositor`.
//! Resizes are applied synchronously before the next frame; pointer updates
//! only store the raw position. The loop itself never blocks between frames
//! beyond the scheduler's `WaitUntil`.

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use winit::dpi::PhysicalSize;
use winit::event::{Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::window::WindowBuilder;

use effectdoc::LayerDescription;

use crate::gpu::Compositor;
use crate::layer;

/// Start-up options for the windowed frame driver.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Window size in physical pixels.
    pub surface_size: (u32, u32),
    /// Optional FPS cap; `None` renders every scheduling callback.
    pub target_fps: Option<f32>,
    pub title: String,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            surface_size: (1280, 720),
            target_fps: None,
            title: "layershade".to_string(),
        }
    }
}

/// Builds the runtime layer list from `descriptions` and runs the frame loop
/// until the window closes.
pub fn run_windowed(
    config: DriverConfig,
    descriptions: &[LayerDescription],
    document_root: &Path,
) -> Result<()> {
    let event_loop =
        EventLoop::new().map_err(|err| anyhow!("failed to create event loop: {err}"))?;
    let window = WindowBuilder::new()
        .with_title(&config.title)
        .with_inner_size(PhysicalSize::new(
            config.surface_size.0.max(1),
            config.surface_size.1.max(1),
        ))
        .build(&event_loop)
        .map_err(|err| anyhow!("failed to create window: {err}"))?;

    let size = window.inner_size();
    let plans = layer::build_plans(descriptions, document_root, size);
    let mut compositor = Compositor::new(&window, size, plans)?;
    tracing::info!(
        layers = compositor.layer_count(),
        width = size.width,
        height = size.height,
        "compositor ready"
    );

    let mut scheduler = FrameScheduler::new(config.target_fps);
    window.request_redraw();

    event_loop
        .run(move |event, elwt| match event {
            Event::WindowEvent { window_id, event } if window_id == window.id() => match event {
                WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                    elwt.exit();
                }
                WindowEvent::CursorMoved { position, .. } => {
                    compositor.set_pointer(position);
                }
                WindowEvent::Resized(new_size) => {
                    compositor.resize(new_size);
                }
                WindowEvent::RedrawRequested => match compositor.render() {
                    Ok(()) => scheduler.mark_rendered(Instant::now()),
                    Err(wgpu::SurfaceError::Lost) | Err(wgpu::SurfaceError::Outdated) => {
                        let size = compositor.size();
                        compositor.resize(size);
                    }
                    Err(wgpu::SurfaceError::OutOfMemory) => {
                        tracing::error!("surface out of memory; stopping");
                        elwt.exit();
                    }
                    Err(err) => {
                        tracing::warn!(error = ?err, "surface error; retrying next frame");
                    }
                },
                _ => {}
            },
            Event::AboutToWait => {
                let now = Instant::now();
                if scheduler.ready_for_frame(now) {
                    window.request_redraw();
                    elwt.set_control_flow(ControlFlow::Wait);
                } else if let Some(deadline) = scheduler.next_deadline() {
                    elwt.set_control_flow(ControlFlow::WaitUntil(deadline));
                } else {
                    elwt.set_control_flow(ControlFlow::Wait);
                }
            }
            _ => {}
        })
        .map_err(|err| anyhow!("window event loop error: {err}"))
}

/// Caps redraws at a target cadence; uncapped when no FPS was requested.
struct FrameScheduler {
    interval: Option<Duration>,
    next_due: Instant,
}

impl FrameScheduler {
    fn new(target_fps: Option<f32>) -> Self {
        let interval = target_fps
            .filter(|fps| *fps > 0.0)
            .map(|fps| Duration::from_secs_f32(1.0 / fps));
        Self {
            interval,
            next_due: Instant::now(),
        }
    }

    fn ready_for_frame(&self, now: Instant) -> bool {
        self.interval.is_none() || now >= self.next_due
    }

    fn mark_rendered(&mut self, now: Instant) {
        if let Some(interval) = self.interval {
            self.next_due = now + interval;
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.interval.map(|_| self.next_due)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uncapped_scheduler_is_always_ready() {
        let mut scheduler = FrameScheduler::new(None);
        let now = Instant::now();
        assert!(scheduler.ready_for_frame(now));
        scheduler.mark_rendered(now);
        assert!(scheduler.ready_for_frame(now));
        assert!(scheduler.next_deadline().is_none());
    }

    #[test]
    fn capped_scheduler_waits_out_the_interval() {
        let mut scheduler = FrameScheduler::new(Some(10.0));
        let now = Instant::now();
        assert!(scheduler.ready_for_frame(now));
        scheduler.mark_rendered(now);
        assert!(!scheduler.ready_for_frame(now + Duration::from_millis(50)));
        assert!(scheduler.ready_for_frame(now + Duration::from_millis(150)));
        let deadline = scheduler.next_deadline().expect("capped scheduler has a deadline");
        assert!(deadline > now + Duration::from_millis(50));
        assert!(deadline <= now + Duration::from_millis(150));
    }

    #[test]
    fn non_positive_fps_means_uncapped() {
        let scheduler = FrameScheduler::new(Some(0.0));
        assert!(scheduler.ready_for_frame(Instant::now()));
        assert!(scheduler.next_deadline().is_none());
    }
}
