use anyhow::{Context, Result};
use compositor::DriverConfig;
use effectdoc::LoadedDocument;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

pub fn run(cli: Cli) -> Result<()> {
    let document = LoadedDocument::load(&cli.document).with_context(|| {
        format!(
            "failed to load effect document at {}",
            cli.document.display()
        )
    })?;
    tracing::debug!(
        document = %cli.document.display(),
        layers = document.descriptions().len(),
        "effect document loaded"
    );

    let mut config = DriverConfig {
        title: cli.title.clone(),
        target_fps: cli.fps.filter(|fps| *fps > 0.0),
        ..DriverConfig::default()
    };
    if let Some(size) = cli.size.as_deref() {
        config.surface_size = parse_surface_size(size)?;
    }

    compositor::run_windowed(config, document.descriptions(), document.root())
}

/// Parses `WIDTHxHEIGHT` into physical pixels.
fn parse_surface_size(raw: &str) -> Result<(u32, u32)> {
    let (width, height) = raw
        .split_once(['x', 'X'])
        .with_context(|| format!("invalid size '{raw}', expected WIDTHxHEIGHT"))?;
    let width: u32 = width
        .trim()
        .parse()
        .with_context(|| format!("invalid width in '{raw}'"))?;
    let height: u32 = height
        .trim()
        .parse()
        .with_context(|| format!("invalid height in '{raw}'"))?;
    if width == 0 || height == 0 {
        anyhow::bail!("size '{raw}' must be non-zero in both dimensions");
    }
    Ok((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_lower_and_upper_separator() {
        assert_eq!(parse_surface_size("1280x720").unwrap(), (1280, 720));
        assert_eq!(parse_surface_size("1920X1080").unwrap(), (1920, 1080));
    }

    #[test]
    fn rejects_malformed_sizes() {
        assert!(parse_surface_size("1280").is_err());
        assert!(parse_surface_size("axb").is_err());
        assert!(parse_surface_size("0x720").is_err());
    }
}
