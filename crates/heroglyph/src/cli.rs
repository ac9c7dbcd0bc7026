use std::path::PathBuf;

use clap::Parser;
use heroconfig::{Theme, VisualMode};
use renderer::SurfaceSize;

#[derive(Parser, Debug)]
#[command(
    name = "heroglyph",
    author,
    version,
    about = "Adaptive particle hero renderer",
    arg_required_else_help = false
)]
pub struct Cli {
    /// Configuration file; defaults to `<config dir>/hero.toml` when present.
    #[arg(long, value_name = "FILE", env = "HEROGLYPH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Colour theme: `light` or `dark`.
    #[arg(long, value_name = "THEME")]
    pub theme: Option<Theme>,

    /// Follow the window system's light/dark setting in preview mode.
    #[arg(long, conflicts_with = "theme")]
    pub system_theme: bool,

    /// Scene flavour: `glyph` or `constellation`.
    #[arg(long, value_name = "MODE")]
    pub mode: Option<VisualMode>,

    /// Overall brightness multiplier.
    #[arg(long, value_name = "FACTOR", value_parser = parse_intensity)]
    pub intensity: Option<f32>,

    /// Freeze animation time at zero.
    #[arg(long)]
    pub reduced_motion: bool,

    /// Shader directory or `http(s)://` base URL.
    #[arg(long, value_name = "DIR|URL")]
    pub shaders: Option<String>,

    /// Logical viewport size (e.g. `1280x720`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_surface_size)]
    pub size: Option<SurfaceSize>,

    /// Run without a window against the bookkeeping backend.
    #[arg(long)]
    pub headless: bool,

    /// Frames to render in headless mode.
    #[arg(long, value_name = "COUNT", default_value_t = 600, requires = "headless")]
    pub frames: u64,

    /// Synthetic frame rate of the headless clock.
    #[arg(
        long,
        value_name = "FPS",
        default_value_t = 60.0,
        value_parser = parse_fps,
        requires = "headless"
    )]
    pub fps: f32,

    /// Adapter name reported by the headless backend (e.g. `Mali-400 MP`).
    #[arg(long, value_name = "NAME", requires = "headless")]
    pub adapter: Option<String>,

    /// Seed for the particle field; random when omitted.
    #[arg(long, value_name = "SEED")]
    pub seed: Option<u64>,

    /// Print governor samples and the run summary as JSON lines.
    #[arg(long)]
    pub stats_json: bool,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_surface_size(spec: &str) -> Result<SurfaceSize, String> {
    let trimmed = spec.trim();
    let (width, height) = trimmed
        .split_once(['x', 'X', '×'])
        .ok_or_else(|| "expected WxH format, e.g. 1280x720".to_string())?;

    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| "invalid width in size specification".to_string())?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| "invalid height in size specification".to_string())?;

    if width == 0 || height == 0 {
        return Err("surface dimensions must be greater than zero".into());
    }

    Ok(SurfaceSize::new(width, height))
}

fn parse_intensity(value: &str) -> Result<f32, String> {
    let parsed: f32 = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid intensity '{value}'"))?;
    if !parsed.is_finite() || parsed < 0.0 {
        return Err("intensity must be a non-negative number".into());
    }
    Ok(parsed)
}

fn parse_fps(value: &str) -> Result<f32, String> {
    let parsed: f32 = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid frame rate '{value}'"))?;
    if !parsed.is_finite() || parsed <= 0.0 {
        return Err("frame rate must be greater than zero".into());
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sizes() {
        assert_eq!(
            parse_surface_size("1920x1080").unwrap(),
            SurfaceSize::new(1920, 1080)
        );
        assert_eq!(
            parse_surface_size(" 800 X 600 ").unwrap(),
            SurfaceSize::new(800, 600)
        );
        assert!(parse_surface_size("0x600").is_err());
        assert!(parse_surface_size("800").is_err());
    }

    #[test]
    fn rejects_bad_rates() {
        assert!(parse_fps("0").is_err());
        assert!(parse_fps("-5").is_err());
        assert_eq!(parse_fps("24").unwrap(), 24.0);
        assert!(parse_intensity("-0.1").is_err());
    }

    #[test]
    fn headless_flags_parse() {
        let cli = Cli::try_parse_from([
            "heroglyph",
            "--headless",
            "--frames",
            "30",
            "--fps",
            "20",
            "--theme",
            "dark",
            "--mode",
            "constellation",
        ])
        .unwrap();
        assert!(cli.headless);
        assert_eq!(cli.frames, 30);
        assert_eq!(cli.theme, Some(Theme::Dark));
        assert_eq!(cli.mode, Some(VisualMode::Constellation));
    }

    #[test]
    fn frames_require_headless() {
        assert!(Cli::try_parse_from(["heroglyph", "--frames", "10"]).is_err());
    }
}
