use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use heroconfig::{HeroConfig, LoadStrategy};
use perfgov::{AdapterDescription, PerformanceGovernor, PerformanceSample};
use renderer::{
    run_preview, EngineOptions, EngineState, GpuBackend, HeadlessBackend, HeroEngine,
    PreviewOptions, SurfaceSize,
};
use serde_json::json;
use shaderpack::{ShaderFetcher, ShaderManifest, ShaderOrigin, ShaderStage};
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::paths::AppPaths;

pub const DEFAULT_FILTER: &str = "warn,heroglyph=info,renderer=info,perfgov=info,wgpu=error,naga=error";
const DEFAULT_VIEWPORT: SurfaceSize = SurfaceSize::new(1280, 720);
/// Real time allowed for a threaded shader load before a headless run gives up.
const LOAD_TIMEOUT: Duration = Duration::from_secs(10);

pub fn initialise_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

pub fn run(cli: Cli) -> Result<()> {
    let paths = AppPaths::discover()?;
    tracing::debug!(
        config = %paths.config_dir().display(),
        data = %paths.data_dir().display(),
        "resolved heroglyph paths"
    );

    let mut config = load_config(cli.config.as_deref(), &paths)?;
    apply_overrides(&mut config, &cli);
    config
        .validate()
        .context("configuration is invalid after applying command-line overrides")?;

    let origin = resolve_origin(&cli, &config, &paths);
    tracing::info!(?origin, "using shader sources");
    let fetcher = origin
        .into_fetcher()
        .context("failed to construct shader fetcher")?;
    let viewport = cli.size.unwrap_or(DEFAULT_VIEWPORT);

    if cli.headless {
        let soak = HeadlessRun {
            frames: cli.frames,
            fps: cli.fps,
            adapter: cli.adapter.clone(),
            stats_json: cli.stats_json,
        };
        let summary = run_headless(&config, fetcher, viewport, cli.seed, &soak)?;
        report_summary(&summary, cli.stats_json)?;
        return Ok(());
    }

    let mut engine = EngineOptions::from_config(&config, viewport, 1.0);
    if cli.seed.is_some() {
        engine.seed = cli.seed;
    }
    run_preview(PreviewOptions {
        title: "heroglyph".into(),
        engine,
        governor: config.governor.clone(),
        fetcher,
        follow_system_theme: cli.system_theme,
    })
}

/// Explicit paths must exist; the default location is optional.
pub fn load_config(explicit: Option<&Path>, paths: &AppPaths) -> Result<HeroConfig> {
    let (path, required) = match explicit {
        Some(path) => (path.to_path_buf(), true),
        None => (paths.config_file(), false),
    };
    if !required && !path.exists() {
        tracing::debug!(path = %path.display(), "no configuration file; using defaults");
        return Ok(HeroConfig::default());
    }

    let text = fs::read_to_string(&path)
        .with_context(|| format!("failed to read configuration at {}", path.display()))?;
    let config = HeroConfig::from_toml_str(&text)
        .with_context(|| format!("failed to load configuration at {}", path.display()))?;
    tracing::info!(path = %path.display(), "loaded configuration");
    Ok(config)
}

pub fn apply_overrides(config: &mut HeroConfig, cli: &Cli) {
    if let Some(theme) = cli.theme {
        config.scene.theme = theme;
    }
    if let Some(mode) = cli.mode {
        config.scene.mode = mode;
    }
    if let Some(intensity) = cli.intensity {
        config.scene.intensity = intensity;
    }
    if cli.reduced_motion {
        config.scene.reduced_motion = true;
    }
    if let Some(seed) = cli.seed {
        config.field.seed = Some(seed);
    }
}

/// CLI flag, then `[shaders]` from the config, then the first search root
/// that holds a shader set.
fn resolve_origin(cli: &Cli, config: &HeroConfig, paths: &AppPaths) -> ShaderOrigin {
    if let Some(input) = cli.shaders.as_deref() {
        return ShaderOrigin::from_input(input);
    }
    if let Some(base) = config.shaders.base_url.as_deref() {
        return ShaderOrigin::Remote(base.to_string());
    }
    if let Some(root) = config.shaders.root.clone() {
        return ShaderOrigin::Directory(root);
    }
    let roots = paths.shader_roots();
    let found = roots.iter().find(|root| looks_like_shader_dir(root)).cloned();
    ShaderOrigin::Directory(found.unwrap_or_else(|| roots.last().cloned().unwrap_or_default()))
}

fn looks_like_shader_dir(root: &Path) -> bool {
    if root.join(shaderpack::MANIFEST_FILE).is_file() {
        return true;
    }
    let defaults = ShaderManifest::default();
    ShaderStage::ALL
        .iter()
        .all(|stage| root.join(defaults.path(*stage)).is_file())
}

#[derive(Debug, Clone)]
pub struct HeadlessRun {
    pub frames: u64,
    pub fps: f32,
    pub adapter: Option<String>,
    pub stats_json: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeadlessSummary {
    pub frames_rendered: u64,
    pub samples: Vec<PerformanceSample>,
    pub final_quality: f32,
    pub low_end: bool,
    pub particles: usize,
    pub links: usize,
    pub bloom: bool,
}

/// Drives the engine against [`HeadlessBackend`] with a synthetic clock that
/// advances exactly one frame interval per tick.
pub fn run_headless(
    config: &HeroConfig,
    fetcher: Arc<dyn ShaderFetcher>,
    viewport: SurfaceSize,
    seed: Option<u64>,
    soak: &HeadlessRun,
) -> Result<HeadlessSummary> {
    let mut backend = HeadlessBackend::new(viewport);
    if let Some(name) = soak.adapter.as_deref() {
        backend = backend.with_adapter(AdapterDescription::new(name));
    }
    let mut options = EngineOptions::from_config(config, viewport, 1.0);
    if seed.is_some() {
        options.seed = seed;
    }
    let threaded = options.load_strategy == LoadStrategy::Threaded;

    let start = Instant::now();
    let governor = PerformanceGovernor::new(config.governor.clone(), start);
    let mut engine = HeroEngine::launch(Ok(backend), governor, fetcher, options, start);

    if threaded {
        let deadline = Instant::now() + LOAD_TIMEOUT;
        while engine.state() == EngineState::Initializing {
            if Instant::now() >= deadline {
                bail!("shader sources did not load within {LOAD_TIMEOUT:?}");
            }
            engine.tick(start);
            std::thread::sleep(Duration::from_millis(2));
        }
    }
    if let Some(err) = engine.last_error() {
        if engine.state() == EngineState::Fallback {
            bail!("engine fell back to the static presentation: {err}");
        }
    }

    let interval = Duration::from_secs_f64(1.0 / f64::from(soak.fps));
    let mut samples = Vec::new();
    for frame in 1..=soak.frames {
        let now = start + interval.mul_f64(frame as f64);
        let report = engine.tick(now);
        if let Some(sample) = report.sample {
            if soak.stats_json {
                println!("{}", serde_json::to_string(&sample)?);
            } else {
                tracing::info!(
                    measured_fps = sample.measured_fps.round(),
                    quality = sample.quality,
                    low_end = sample.is_low_end_device,
                    "governor sample"
                );
            }
            samples.push(sample);
        }
        if engine.state() != EngineState::Running {
            bail!("engine left the running state at frame {frame}: {:?}", engine.state());
        }
    }

    let frames_rendered = engine
        .backend()
        .map(|backend| backend.stats().frames_rendered)
        .unwrap_or(0);
    let summary = HeadlessSummary {
        frames_rendered,
        final_quality: engine.governor().quality(),
        low_end: engine.governor().is_low_end(),
        particles: engine.particles().len(),
        links: engine.links().len(),
        bloom: engine
            .scene()
            .is_some_and(|scene| scene.bloom_handle().is_some()),
        samples,
    };

    engine.destroy();
    let leaked = engine.backend().map_or(0, |backend| backend.live_handles());
    if leaked != 0 {
        bail!("{leaked} GPU handles still live after destroy");
    }
    Ok(summary)
}

fn report_summary(summary: &HeadlessSummary, as_json: bool) -> Result<()> {
    if as_json {
        let line = json!({
            "summary": {
                "frames_rendered": summary.frames_rendered,
                "samples": summary.samples.len(),
                "final_quality": summary.final_quality,
                "low_end": summary.low_end,
                "particles": summary.particles,
                "links": summary.links,
                "bloom": summary.bloom,
            }
        });
        println!("{}", serde_json::to_string(&line)?);
    } else {
        tracing::info!(
            frames = summary.frames_rendered,
            samples = summary.samples.len(),
            quality = summary.final_quality,
            low_end = summary.low_end,
            particles = summary.particles,
            links = summary.links,
            bloom = summary.bloom,
            "headless run finished"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shaderpack::MemoryFetcher;
    use tempfile::TempDir;

    fn fetcher() -> Arc<dyn ShaderFetcher> {
        let source = "#version 450\nvoid main() {}\n";
        Arc::new(
            MemoryFetcher::new()
                .with("background.vert", source)
                .with("background.frag", source)
                .with("particles.vert", source)
                .with("particles.frag", source)
                .with("links.vert", source)
                .with("links.frag", source)
                .with("noise.glsl", "float hero_noise(vec3 p) { return 0.0; }\n"),
        )
    }

    fn soak(frames: u64, fps: f32) -> HeadlessRun {
        HeadlessRun {
            frames,
            fps,
            adapter: None,
            stats_json: false,
        }
    }

    #[test]
    fn steady_rate_keeps_full_quality() {
        let summary = run_headless(
            &HeroConfig::default(),
            fetcher(),
            SurfaceSize::new(640, 360),
            Some(3),
            &soak(180, 60.0),
        )
        .unwrap();
        assert_eq!(summary.frames_rendered, 180);
        assert_eq!(summary.final_quality, 1.0);
        assert_eq!(summary.particles, 100);
        assert!(summary.bloom);
    }

    #[test]
    fn slow_rate_degrades() {
        let summary = run_headless(
            &HeroConfig::default(),
            fetcher(),
            SurfaceSize::new(640, 360),
            Some(3),
            &soak(100, 20.0),
        )
        .unwrap();
        assert!(summary.samples.len() >= 4);
        assert!(summary.final_quality < 1.0);
        assert!(summary
            .samples
            .windows(2)
            .all(|pair| pair[1].quality <= pair[0].quality));
    }

    #[test]
    fn missing_sources_fail_the_run() {
        let empty: Arc<dyn ShaderFetcher> = Arc::new(MemoryFetcher::new());
        let err = run_headless(
            &HeroConfig::default(),
            empty,
            SurfaceSize::new(640, 360),
            None,
            &soak(10, 60.0),
        )
        .unwrap_err();
        assert!(err.to_string().contains("static presentation"));
    }

    #[test]
    fn missing_default_config_is_fine() {
        let dir = TempDir::new().unwrap();
        let paths = AppPaths::from_raw(dir.path().to_path_buf(), dir.path().join("data"));
        assert_eq!(load_config(None, &paths).unwrap(), HeroConfig::default());
        assert!(load_config(Some(&dir.path().join("nope.toml")), &paths).is_err());
    }

    #[test]
    fn config_file_is_parsed() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("hero.toml"),
            "version = 1\n[scene]\ntheme = \"dark\"\nintensity = 0.5\n",
        )
        .unwrap();
        let paths = AppPaths::from_raw(dir.path().to_path_buf(), dir.path().join("data"));
        let config = load_config(None, &paths).unwrap();
        assert_eq!(config.scene.theme, heroconfig::Theme::Dark);
        assert_eq!(config.scene.intensity, 0.5);
    }
}
