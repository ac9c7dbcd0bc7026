use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Binary light/dark theme flag observed from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}

impl std::str::FromStr for Theme {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            other => Err(format!("invalid theme '{other}'; expected 'light' or 'dark'")),
        }
    }
}

/// Camera/placement flavour of the hero scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VisualMode {
    /// Flat orthographic view with the particle glyph.
    #[default]
    Glyph,
    /// Perspective view over a scattered particle volume.
    Constellation,
}

impl std::str::FromStr for VisualMode {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "glyph" => Ok(VisualMode::Glyph),
            "constellation" => Ok(VisualMode::Constellation),
            other => Err(format!(
                "invalid mode '{other}'; expected 'glyph' or 'constellation'"
            )),
        }
    }
}

/// How shader sources are fetched while the engine initializes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadStrategy {
    /// Fetch on the calling thread during construction.
    Immediate,
    /// Fetch on a worker thread and poll for completion every tick.
    #[default]
    Threaded,
}

/// Linear RGB color with components in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const fn from_hex(hex: u32) -> Self {
        Self {
            r: ((hex >> 16) & 0xff) as f32 / 255.0,
            g: ((hex >> 8) & 0xff) as f32 / 255.0,
            b: (hex & 0xff) as f32 / 255.0,
        }
    }

    pub fn parse(raw: &str) -> Result<Self, String> {
        let trimmed = raw.trim();
        let digits = trimmed
            .strip_prefix('#')
            .or_else(|| trimmed.strip_prefix("0x"))
            .unwrap_or(trimmed);
        if digits.len() != 6 {
            return Err(format!("invalid color '{raw}'; expected #RRGGBB"));
        }
        u32::from_str_radix(digits, 16)
            .map(Self::from_hex)
            .map_err(|err| format!("invalid color '{raw}': {err}"))
    }

    pub fn to_hex(self) -> u32 {
        let channel = |value: f32| (value.clamp(0.0, 1.0) * 255.0).round() as u32;
        (channel(self.r) << 16) | (channel(self.g) << 8) | channel(self.b)
    }

    pub fn with_alpha(self, alpha: f32) -> [f32; 4] {
        [self.r, self.g, self.b, alpha]
    }
}

impl Serialize for Color {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("#{:06X}", self.to_hex()))
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Helper {
            Str(String),
            Num(u32),
        }

        match Helper::deserialize(deserializer)? {
            Helper::Str(raw) => Color::parse(&raw).map_err(de::Error::custom),
            Helper::Num(value) => {
                if value > 0xff_ff_ff {
                    return Err(de::Error::custom("color value must fit in 0xRRGGBB"));
                }
                Ok(Color::from_hex(value))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct ThemePalette {
    pub primary: Color,
    pub secondary: Color,
    pub accent: Color,
    pub link: Color,
}

impl ThemePalette {
    pub const LIGHT: ThemePalette = ThemePalette {
        primary: Color::from_hex(0x1E40AF),
        secondary: Color::from_hex(0x3B82F6),
        accent: Color::from_hex(0x10B981),
        link: Color::from_hex(0x6366F1),
    };

    pub const DARK: ThemePalette = ThemePalette {
        primary: Color::from_hex(0x0F172A),
        secondary: Color::from_hex(0x1E293B),
        accent: Color::from_hex(0x059669),
        link: Color::from_hex(0x8B5CF6),
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Themes {
    #[serde(default = "default_light")]
    pub light: ThemePalette,
    #[serde(default = "default_dark")]
    pub dark: ThemePalette,
}

impl Themes {
    pub fn palette(&self, theme: Theme) -> ThemePalette {
        match theme {
            Theme::Light => self.light,
            Theme::Dark => self.dark,
        }
    }
}

impl Default for Themes {
    fn default() -> Self {
        Self {
            light: ThemePalette::LIGHT,
            dark: ThemePalette::DARK,
        }
    }
}

fn default_light() -> ThemePalette {
    ThemePalette::LIGHT
}

fn default_dark() -> ThemePalette {
    ThemePalette::DARK
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct GovernorSettings {
    #[serde(default = "default_target_fps")]
    pub target_fps: f32,
    #[serde(default = "default_low_end_target_fps")]
    pub low_end_target_fps: f32,
    #[serde(default = "default_low_end_quality")]
    pub low_end_quality: f32,
    #[serde(
        default = "default_window",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub window: Duration,
    #[serde(default = "default_max_pixel_ratio")]
    pub max_pixel_ratio: f32,
    #[serde(default = "default_low_end_signatures")]
    pub low_end_signatures: Vec<String>,
}

impl Default for GovernorSettings {
    fn default() -> Self {
        Self {
            target_fps: default_target_fps(),
            low_end_target_fps: default_low_end_target_fps(),
            low_end_quality: default_low_end_quality(),
            window: default_window(),
            max_pixel_ratio: default_max_pixel_ratio(),
            low_end_signatures: default_low_end_signatures(),
        }
    }
}

fn default_target_fps() -> f32 {
    60.0
}

fn default_low_end_target_fps() -> f32 {
    30.0
}

fn default_low_end_quality() -> f32 {
    0.5
}

fn default_window() -> Duration {
    Duration::from_millis(1000)
}

fn default_max_pixel_ratio() -> f32 {
    1.5
}

pub fn default_low_end_signatures() -> Vec<String> {
    [
        "PowerVR",
        "Adreno 3",
        "Mali-4",
        "Intel HD Graphics 3000",
        "Intel HD Graphics 4000",
        "GeForce 8",
        "GeForce 9",
        "Software",
        "SwiftShader",
        "llvmpipe",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SceneSettings {
    #[serde(default)]
    pub mode: VisualMode,
    #[serde(default)]
    pub theme: Theme,
    #[serde(default = "default_intensity")]
    pub intensity: f32,
    #[serde(default)]
    pub reduced_motion: bool,
    #[serde(default = "default_link_threshold")]
    pub link_threshold: f32,
}

impl Default for SceneSettings {
    fn default() -> Self {
        Self {
            mode: VisualMode::default(),
            theme: Theme::default(),
            intensity: default_intensity(),
            reduced_motion: false,
            link_threshold: default_link_threshold(),
        }
    }
}

fn default_intensity() -> f32 {
    0.8
}

fn default_link_threshold() -> f32 {
    3.0
}

/// Hand-tuned placement constants for the particle glyph.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FieldSettings {
    #[serde(default = "default_glyph_fraction")]
    pub glyph_fraction: f32,
    #[serde(default = "default_segment_span")]
    pub segment_span: f32,
    #[serde(default = "default_jitter")]
    pub jitter: f32,
    #[serde(default)]
    pub depth_jitter: f32,
    #[serde(default = "default_stroke_offset")]
    pub stroke_offset: f32,
    #[serde(default = "default_stroke_length")]
    pub stroke_length: f32,
    /// Half extents of the scatter box; `None` picks the mode default.
    #[serde(default)]
    pub scatter_extent: Option<[f32; 3]>,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for FieldSettings {
    fn default() -> Self {
        Self {
            glyph_fraction: default_glyph_fraction(),
            segment_span: default_segment_span(),
            jitter: default_jitter(),
            depth_jitter: 0.0,
            stroke_offset: default_stroke_offset(),
            stroke_length: default_stroke_length(),
            scatter_extent: None,
            seed: None,
        }
    }
}

fn default_glyph_fraction() -> f32 {
    0.6
}

fn default_segment_span() -> f32 {
    0.2
}

fn default_jitter() -> f32 {
    0.25
}

fn default_stroke_offset() -> f32 {
    2.0
}

fn default_stroke_length() -> f32 {
    4.0
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct BloomSettings {
    #[serde(default = "default_bloom_strength")]
    pub strength: f32,
    #[serde(default = "default_bloom_radius")]
    pub radius: f32,
    #[serde(default = "default_bloom_threshold")]
    pub threshold: f32,
}

impl Default for BloomSettings {
    fn default() -> Self {
        Self {
            strength: default_bloom_strength(),
            radius: default_bloom_radius(),
            threshold: default_bloom_threshold(),
        }
    }
}

fn default_bloom_strength() -> f32 {
    0.3
}

fn default_bloom_radius() -> f32 {
    0.5
}

fn default_bloom_threshold() -> f32 {
    0.8
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct ShaderSettings {
    /// Directory holding the shader sources (and an optional `shaders.toml`).
    #[serde(default)]
    pub root: Option<PathBuf>,
    /// Remote base URL; takes precedence over `root` when set.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub strategy: LoadStrategy,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HeroConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub governor: GovernorSettings,
    #[serde(default)]
    pub scene: SceneSettings,
    #[serde(default)]
    pub field: FieldSettings,
    #[serde(default)]
    pub bloom: BloomSettings,
    #[serde(default)]
    pub themes: Themes,
    #[serde(default)]
    pub shaders: ShaderSettings,
}

impl Default for HeroConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            governor: GovernorSettings::default(),
            scene: SceneSettings::default(),
            field: FieldSettings::default(),
            bloom: BloomSettings::default(),
            themes: Themes::default(),
            shaders: ShaderSettings::default(),
        }
    }
}

fn default_version() -> u32 {
    1
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Duration::from_secs(v))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs(v as u64))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v.is_nan() || v.is_sign_negative() {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs_f64(v))
        }
    }

    deserializer.deserialize_any(Visitor)
}

fn serialize_duration<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&humantime::format_duration(*value).to_string())
}

impl HeroConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: HeroConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn palette(&self, theme: Theme) -> ThemePalette {
        self.themes.palette(theme)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != 1 {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected 1",
                self.version
            )));
        }

        let governor = &self.governor;
        if !(governor.target_fps > 0.0) || !(governor.low_end_target_fps > 0.0) {
            return Err(ConfigError::Invalid(
                "governor target fps values must be greater than zero".into(),
            ));
        }
        if !(0.3..=1.0).contains(&governor.low_end_quality) {
            return Err(ConfigError::Invalid(format!(
                "governor.low_end_quality {} must lie in [0.3, 1.0]",
                governor.low_end_quality
            )));
        }
        if governor.window.is_zero() {
            return Err(ConfigError::Invalid(
                "governor.window must be greater than zero".into(),
            ));
        }
        if !(governor.max_pixel_ratio > 0.0) {
            return Err(ConfigError::Invalid(
                "governor.max_pixel_ratio must be greater than zero".into(),
            ));
        }
        if governor
            .low_end_signatures
            .iter()
            .any(|signature| signature.trim().is_empty())
        {
            return Err(ConfigError::Invalid(
                "governor.low_end_signatures may not contain empty entries".into(),
            ));
        }

        if !(self.scene.intensity >= 0.0) {
            return Err(ConfigError::Invalid("scene.intensity must be >= 0".into()));
        }
        if !(self.scene.link_threshold > 0.0) {
            return Err(ConfigError::Invalid(
                "scene.link_threshold must be greater than zero".into(),
            ));
        }

        let field = &self.field;
        if !(0.0..=1.0).contains(&field.glyph_fraction) {
            return Err(ConfigError::Invalid(
                "field.glyph_fraction must lie in [0, 1]".into(),
            ));
        }
        if !(field.segment_span > 0.0) || field.segment_span * 3.0 > field.glyph_fraction + 1e-6
        {
            return Err(ConfigError::Invalid(format!(
                "field.segment_span {} must be positive and three segments must fit in glyph_fraction {}",
                field.segment_span, field.glyph_fraction
            )));
        }
        if field.jitter < 0.0 || field.depth_jitter < 0.0 {
            return Err(ConfigError::Invalid("field jitter must be >= 0".into()));
        }
        if let Some(extent) = field.scatter_extent {
            if extent.iter().any(|axis| *axis < 0.0) {
                return Err(ConfigError::Invalid(
                    "field.scatter_extent must be non-negative".into(),
                ));
            }
        }

        let bloom = &self.bloom;
        if bloom.strength < 0.0 || bloom.radius < 0.0 || !(0.0..=1.0).contains(&bloom.threshold)
        {
            return Err(ConfigError::Invalid(
                "bloom strength/radius must be >= 0 and threshold in [0, 1]".into(),
            ));
        }

        if self.shaders.base_url.as_deref().is_some_and(|url| url.trim().is_empty()) {
            return Err(ConfigError::Invalid("shaders.base_url may not be empty".into()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r##"
version = 1

[governor]
target_fps = 60
low_end_target_fps = 30
window = "1s"
low_end_signatures = ["PowerVR", "Mali-4"]

[scene]
mode = "constellation"
theme = "dark"
intensity = 0.6

[bloom]
strength = 0.4

[themes.dark]
primary = "#0F172A"
secondary = "#1E293B"
accent = "#059669"
link = 0x8B5CF6

[shaders]
root = "assets/shaders"
strategy = "immediate"
"##;

    #[test]
    fn parses_sample_config() {
        let config = HeroConfig::from_toml_str(SAMPLE).expect("parse config");
        assert_eq!(config.scene.mode, VisualMode::Constellation);
        assert_eq!(config.scene.theme, Theme::Dark);
        assert_eq!(config.governor.window, Duration::from_secs(1));
        assert_eq!(config.governor.low_end_signatures.len(), 2);
        assert_eq!(config.bloom.strength, 0.4);
        assert_eq!(config.bloom.threshold, 0.8);
        assert_eq!(config.shaders.strategy, LoadStrategy::Immediate);
        assert_eq!(config.palette(Theme::Dark).link.to_hex(), 0x8B5CF6);
        assert_eq!(config.palette(Theme::Light), ThemePalette::LIGHT);
    }

    #[test]
    fn empty_document_uses_defaults() {
        let config = HeroConfig::from_toml_str("").expect("defaults");
        assert_eq!(config, HeroConfig::default());
        assert_eq!(config.scene.link_threshold, 3.0);
        assert_eq!(config.field.glyph_fraction, 0.6);
    }

    #[test]
    fn rejects_unknown_version() {
        let err = HeroConfig::from_toml_str("version = 2").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_bad_color() {
        let err = HeroConfig::from_toml_str(
            r##"
[themes.light]
primary = "#12345"
secondary = "#3B82F6"
accent = "#10B981"
link = "#6366F1"
"##,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn rejects_segments_that_overflow_glyph() {
        let err = HeroConfig::from_toml_str(
            r#"
[field]
glyph_fraction = 0.3
segment_span = 0.2
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn color_hex_round_trips_through_display_form() {
        let color = Color::parse("#10B981").unwrap();
        assert_eq!(color.to_hex(), 0x10B981);
        assert!(Color::parse("nope").is_err());
    }
}
