use clap::{Args, Parser, Subcommand};
use log::LevelFilter;
use nalgebra::Point2;
use std::path::PathBuf;
use std::process::ExitCode;
use surface_capture::core::{GameLine, GeometryError};
use surface_capture::{
    analyze_corners, save_frame, CalibrationError, CaptureConfig, CaptureLoop, ConfigError,
    ImageSequenceSource, LensCalibration, RecordedDetector, SnapshotReport, SourceError,
    SurfaceReport,
};

#[derive(Parser, Debug)]
#[command(name = "surface-capture", version, about = "Track a marked play surface in camera frames")]
struct Cli {
    /// Log level: off, error, warn, info, debug, trace.
    #[arg(long, global = true, default_value = "warn")]
    log_level: LevelFilter,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate four corner points and print the surface report as JSON.
    Analyze(AnalyzeArgs),
    /// Run recorded frames and detections through the capture loop.
    Replay(ReplayArgs),
    /// Write a config file with every default filled in.
    InitConfig {
        path: PathBuf,
    },
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// Corner candidate as `x,y` (camera pixels). Repeat four times.
    #[arg(long = "corner", value_parser = parse_point, required = true)]
    corners: Vec<Point2<f64>>,
    #[arg(long)]
    config: Option<PathBuf>,
    /// Shortest game line as `x0,y0,x1,y1`; overrides the config.
    #[arg(long, value_parser = parse_line)]
    game_line: Option<GameLine>,
}

#[derive(Args, Debug)]
struct ReplayArgs {
    /// Directory of frame images, replayed in file name order.
    #[arg(long)]
    frames: PathBuf,
    /// JSON array with one list of marker points per frame.
    #[arg(long)]
    detections: PathBuf,
    #[arg(long)]
    config: Option<PathBuf>,
    /// Lens calibration JSON (intrinsics + distortion).
    #[arg(long)]
    calibration: Option<PathBuf>,
    /// Derive the field of view from the calibration intrinsics.
    #[arg(long, requires = "calibration")]
    calibrated_fov: bool,
    /// Write the final frame warped onto the game rectangle.
    #[arg(long)]
    surface_out: Option<PathBuf>,
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Calibration(#[from] CalibrationError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("no committed surface to warp")]
    NoSurface,
}

fn parse_numbers<const N: usize>(raw: &str) -> Result<[f64; N], String> {
    let values: Vec<f64> = raw
        .split(',')
        .map(|v| v.trim().parse::<f64>().map_err(|e| format!("`{v}`: {e}")))
        .collect::<Result<_, _>>()?;
    values
        .try_into()
        .map_err(|v: Vec<f64>| format!("expected {N} comma-separated numbers, got {}", v.len()))
}

fn parse_point(raw: &str) -> Result<Point2<f64>, String> {
    let [x, y] = parse_numbers::<2>(raw)?;
    Ok(Point2::new(x, y))
}

fn parse_line(raw: &str) -> Result<GameLine, String> {
    let [x0, y0, x1, y1] = parse_numbers::<4>(raw)?;
    Ok(GameLine::new(Point2::new(x0, y0), Point2::new(x1, y1)))
}

fn load_config(path: Option<&PathBuf>) -> Result<CaptureConfig, ConfigError> {
    match path {
        Some(path) => CaptureConfig::load_json(path),
        None => Ok(CaptureConfig::default()),
    }
}

fn analyze(args: AnalyzeArgs) -> Result<(), CliError> {
    let mut config = load_config(args.config.as_ref())?;
    if let Some(line) = args.game_line {
        config.shortest_game_line = line;
    }
    let surface = analyze_corners(&args.corners, &config)?;
    let report = SurfaceReport::new(&surface, &config.shortest_game_line);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn replay(args: ReplayArgs) -> Result<(), CliError> {
    let mut config = load_config(args.config.as_ref())?;
    config.run_on_own_thread = false;

    let source = ImageSequenceSource::from_dir(&args.frames)?;
    let frames = source.len();
    let detector = RecordedDetector::load_json(&args.detections)?;
    if detector.remaining() < frames {
        log::warn!(
            "{} detections for {} frames; the rest replay as empty",
            detector.remaining(),
            frames
        );
    }

    let mut capture = CaptureLoop::new(config, source, detector)?;
    if let Some(path) = &args.calibration {
        capture = capture.with_calibration(LensCalibration::load_json(path)?);
    }
    capture.start()?;
    // The capture size is unknown until the first frame.
    let mut fov_pending = args.calibrated_fov;
    while capture.work() {
        if std::mem::take(&mut fov_pending) {
            match capture.use_calibrated_fov() {
                Some(fov) => log::info!("field of view from calibration: {:.4} rad", fov),
                None => log::warn!("calibration gives no usable field of view"),
            }
        }
        let snap = capture.snapshot();
        log::info!("frame {}: {:?}", snap.frame_id, snap.state);
    }
    capture.stop();

    let snapshot = capture.snapshot();
    println!(
        "{}",
        serde_json::to_string_pretty(&SnapshotReport::from(&snapshot))?
    );

    if let Some(path) = &args.surface_out {
        let image = capture.surface_image(None).ok_or(CliError::NoSurface)?;
        save_frame(&image, path)?;
        log::info!("wrote {}", path.display());
    }
    Ok(())
}

fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Command::Analyze(args) => analyze(args),
        Command::Replay(args) => replay(args),
        Command::InitConfig { path } => {
            CaptureConfig::default().write_json(&path)?;
            println!("wrote {}", path.display());
            Ok(())
        }
    }
}

fn init_logging(level: LevelFilter) {
    #[cfg(feature = "tracing")]
    surface_capture::core::init_tracing(level, surface_capture::core::TraceFormat::Pretty);
    #[cfg(not(feature = "tracing"))]
    {
        let _ = surface_capture::core::init_with_level(level);
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_level);
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
