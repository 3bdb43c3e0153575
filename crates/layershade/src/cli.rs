use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "layershade",
    author,
    version,
    about = "Layered full-screen shader-effect compositor"
)]
pub struct Cli {
    /// Path to the effect document (JSON with a `history` layer list).
    #[arg(value_name = "DOCUMENT")]
    pub document: PathBuf,

    /// Override the window resolution (e.g. `1280x720`).
    #[arg(long, value_name = "WIDTHxHEIGHT")]
    pub size: Option<String>,

    /// Optional FPS cap (0 = render every vsync callback).
    #[arg(long, value_name = "FPS")]
    pub fps: Option<f32>,

    /// Window title.
    #[arg(long, default_value = "layershade")]
    pub title: String,
}

pub fn parse() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_path_is_required() {
        assert!(Cli::try_parse_from(["layershade"]).is_err());
    }

    #[test]
    fn parses_flags() {
        let cli = Cli::try_parse_from([
            "layershade",
            "demos/effects.json",
            "--size",
            "1920x1080",
            "--fps",
            "30",
        ])
        .unwrap();
        assert_eq!(cli.document, PathBuf::from("demos/effects.json"));
        assert_eq!(cli.size.as_deref(), Some("1920x1080"));
        assert_eq!(cli.fps, Some(30.0));
        assert_eq!(cli.title, "layershade");
    }
}
