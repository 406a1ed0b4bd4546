use clap::Parser;
use spotloc::image::io::load_frame_series;
use spotloc::{
    AcceptanceFilters, Calibration, CompletionHandler, DetectionParams, FitSettings, Localizer,
    LocalizedSpot, Optimizer, Prefilter, Roi, RunSummary, ShapeMode, StopToken, WindowParams,
    WindowPolicy,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const EXAMPLE_JSON: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config.example.json"));

#[derive(Parser, Debug)]
#[command(author, version, about = "spotloc CLI (JSON config driven)")]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(short, long, value_name = "FILE", default_value = "config.json")]
    config: PathBuf,
    /// Print an example config and exit.
    #[arg(long)]
    print_example: bool,
    /// Enable tracing output for the run, planes and workers.
    #[arg(long)]
    trace: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ShapeConfig {
    Circular,
    Elliptical,
    RotatedElliptical,
}

impl From<ShapeConfig> for ShapeMode {
    fn from(value: ShapeConfig) -> Self {
        match value {
            ShapeConfig::Circular => ShapeMode::Circular,
            ShapeConfig::Elliptical => ShapeMode::Elliptical,
            ShapeConfig::RotatedElliptical => ShapeMode::RotatedElliptical,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum OptimizerConfig {
    Simplex,
    LevenbergMarquardt,
    SimplexMle,
}

impl From<OptimizerConfig> for Optimizer {
    fn from(value: OptimizerConfig) -> Self {
        match value {
            OptimizerConfig::Simplex => Optimizer::Simplex,
            OptimizerConfig::LevenbergMarquardt => Optimizer::LevenbergMarquardt,
            OptimizerConfig::SimplexMle => Optimizer::SimplexMle,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum WindowPolicyConfig {
    AveragedCentered,
    DirectionalCentering,
}

impl From<WindowPolicyConfig> for WindowPolicy {
    fn from(value: WindowPolicyConfig) -> Self {
        match value {
            WindowPolicyConfig::AveragedCentered => WindowPolicy::AveragedCentered,
            WindowPolicyConfig::DirectionalCentering => WindowPolicy::DirectionalCentering,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct CalibrationJson {
    pixel_size: f64,
    gain: f64,
    photon_conversion: f64,
    base_level: f64,
}

impl Default for CalibrationJson {
    fn default() -> Self {
        let cal = Calibration::default();
        Self {
            pixel_size: cal.pixel_size,
            gain: cal.gain,
            photon_conversion: cal.photon_conversion,
            base_level: cal.base_level,
        }
    }
}

#[derive(Debug, Deserialize)]
struct BandPassJson {
    narrow_sigma: f32,
    wide_sigma: f32,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct DetectionJson {
    search_half_size: usize,
    snr: f32,
    noise_amplitude: Option<f32>,
    intensity_threshold: f32,
    band_pass: Option<BandPassJson>,
}

impl Default for DetectionJson {
    fn default() -> Self {
        let params = DetectionParams::default();
        Self {
            search_half_size: params.search_half_size,
            snr: params.snr,
            noise_amplitude: params.noise_amplitude,
            intensity_threshold: params.intensity_threshold,
            band_pass: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct WindowingJson {
    policy: WindowPolicyConfig,
    max_half_width: usize,
}

impl Default for WindowingJson {
    fn default() -> Self {
        Self {
            policy: WindowPolicyConfig::AveragedCentered,
            max_half_width: WindowParams::default().max_half_width,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct FiltersJson {
    width_filter: bool,
    width_min: f64,
    width_max: f64,
    photon_filter: bool,
    photons_min: f64,
    photons_max: f64,
}

impl Default for FiltersJson {
    fn default() -> Self {
        let f = AcceptanceFilters::default();
        Self {
            width_filter: f.width_filter,
            width_min: f.width_min,
            width_max: f.width_max,
            photon_filter: f.photon_filter,
            photons_min: f.photons_min,
            photons_max: f.photons_max,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RoiJson {
    x: usize,
    y: usize,
    width: usize,
    height: usize,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct Config {
    frames: Vec<String>,
    output_path: Option<String>,
    roi: Option<RoiJson>,
    calibration: CalibrationJson,
    detection: DetectionJson,
    windowing: WindowingJson,
    filters: FiltersJson,
    shape: ShapeConfig,
    defocus: bool,
    optimizer: OptimizerConfig,
    max_iterations: usize,
    worker_threads: usize,
    queue_soft_cap: usize,
}

impl Default for Config {
    fn default() -> Self {
        let settings = FitSettings::default();
        Self {
            frames: Vec::new(),
            output_path: None,
            roi: None,
            calibration: CalibrationJson::default(),
            detection: DetectionJson::default(),
            windowing: WindowingJson::default(),
            filters: FiltersJson::default(),
            shape: ShapeConfig::Circular,
            defocus: settings.defocus,
            optimizer: OptimizerConfig::LevenbergMarquardt,
            max_iterations: settings.max_iterations,
            worker_threads: settings.worker_threads,
            queue_soft_cap: settings.queue_soft_cap,
        }
    }
}

impl Config {
    fn settings(self) -> FitSettings {
        let prefilter = match self.detection.band_pass {
            Some(bp) => Prefilter::BandPass {
                narrow_sigma: bp.narrow_sigma,
                wide_sigma: bp.wide_sigma,
            },
            None => Prefilter::None,
        };
        FitSettings {
            calibration: Calibration {
                pixel_size: self.calibration.pixel_size,
                gain: self.calibration.gain,
                photon_conversion: self.calibration.photon_conversion,
                base_level: self.calibration.base_level,
            },
            detection: DetectionParams {
                search_half_size: self.detection.search_half_size,
                snr: self.detection.snr,
                noise_amplitude: self.detection.noise_amplitude,
                intensity_threshold: self.detection.intensity_threshold,
                prefilter,
            },
            windowing: WindowParams {
                policy: self.windowing.policy.into(),
                max_half_width: self.windowing.max_half_width,
            },
            filters: AcceptanceFilters {
                width_filter: self.filters.width_filter,
                width_min: self.filters.width_min,
                width_max: self.filters.width_max,
                photon_filter: self.filters.photon_filter,
                photons_min: self.filters.photons_min,
                photons_max: self.filters.photons_max,
            },
            max_iterations: self.max_iterations,
            shape: self.shape.into(),
            defocus: self.defocus,
            optimizer: self.optimizer.into(),
            worker_threads: self.worker_threads,
            queue_soft_cap: self.queue_soft_cap,
        }
    }
}

#[derive(Debug, Serialize)]
struct SpotRecord {
    frame: usize,
    channel: usize,
    slice: usize,
    position: usize,
    x_nm: f64,
    y_nm: f64,
    photons: f64,
    background: f64,
    width_nm: f64,
    sigma_x_nm: f64,
    sigma_y_nm: f64,
    angle_rad: Option<f64>,
    precision_nm: f64,
    photon_precision: f64,
    defocus: Option<f64>,
    converged: bool,
}

impl From<&LocalizedSpot> for SpotRecord {
    fn from(spot: &LocalizedSpot) -> Self {
        Self {
            frame: spot.plane.frame,
            channel: spot.plane.channel,
            slice: spot.plane.slice,
            position: spot.plane.position,
            x_nm: spot.x,
            y_nm: spot.y,
            photons: spot.photons,
            background: spot.background,
            width_nm: spot.width,
            sigma_x_nm: spot.sigma_x,
            sigma_y_nm: spot.sigma_y,
            angle_rad: spot.angle,
            precision_nm: spot.precision,
            photon_precision: spot.photon_precision,
            defocus: spot.defocus,
            converged: spot.converged,
        }
    }
}

#[derive(Debug, Serialize)]
struct SummaryRecord {
    planes: usize,
    candidates: usize,
    windows: usize,
    rejected_windows: usize,
    spots: usize,
    rejected_fits: usize,
    rejected_gate: usize,
    workers: usize,
    failed_workers: usize,
}

impl From<RunSummary> for SummaryRecord {
    fn from(s: RunSummary) -> Self {
        Self {
            planes: s.planes,
            candidates: s.candidates,
            windows: s.windows,
            rejected_windows: s.rejected_windows,
            spots: s.spots,
            rejected_fits: s.rejected_fits,
            rejected_gate: s.rejected_gate,
            workers: s.workers,
            failed_workers: s.failed_workers,
        }
    }
}

#[derive(Debug, Serialize)]
struct Output {
    summary: SummaryRecord,
    spots: Vec<SpotRecord>,
}

/// Collects the final list and logs the end of processing.
#[derive(Default)]
struct Collector {
    spots: Vec<SpotRecord>,
}

impl CompletionHandler for Collector {
    fn list_ready(&mut self, spots: &[LocalizedSpot]) {
        self.spots = spots.iter().map(SpotRecord::from).collect();
    }

    fn processing_ended(&mut self) {
        tracing::info!(spots = self.spots.len(), "processing ended");
    }
}

/// User-facing notice for a run that accepted nothing.
fn run_notice(summary: &RunSummary) -> Option<&'static str> {
    (summary.spots == 0).then_some("no spots found")
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.trace {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env().add_directive("spotloc=info".parse()?))
            .with_target(false)
            .init();
    }

    if cli.print_example {
        println!("{EXAMPLE_JSON}");
        return Ok(());
    }

    let config_text = fs::read_to_string(&cli.config)?;
    let config: Config = serde_json::from_str(&config_text)?;
    if config.frames.is_empty() {
        return Err("frames must list at least one image path".into());
    }

    let mut stack = load_frame_series(&config.frames)?;
    let roi = config
        .roi
        .as_ref()
        .map(|r| Roi::new(r.x, r.y, r.width, r.height));
    let output_path = config.output_path.clone();

    let localizer = Localizer::new(config.settings())?;
    let mut collector = Collector::default();
    let summary = localizer.run(&mut stack, roi, &mut collector, &StopToken::new())?;
    if let Some(notice) = run_notice(&summary) {
        eprintln!("{notice}");
    }

    let output = Output {
        summary: summary.into(),
        spots: collector.spots,
    };
    let json = serde_json::to_string_pretty(&output)?;

    match output_path {
        Some(path) => fs::write(path, json)?,
        None => println!("{json}"),
    }

    Ok(())
}
