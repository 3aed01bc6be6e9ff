use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use intero_lib::{
    detect_heartbeats,
    filter::bandpass,
    io::{hbd::read_hbd_csv, ppg::read_ppg_csv},
    plot::{figure_from_peaks, figure_from_sync_curve, Figure, Series},
    run_heart_rate_pipeline,
    sensitivity::{build_sync_curve, fit_gaussian, GaussianFit, SyncCurve},
    PipelineConfig, TimeSeries,
};
use intero_run::{
    manifest_path_for, prepare_output, run_accuracy_batch, run_heart_rate_batch,
    run_sensitivity_batch, write_accuracy_table, write_heart_rate_table, write_manifest,
    write_sensitivity_table, BatchContext,
};
use log::{info, warn};
use plotters::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(
    name = "intero",
    version,
    about = "Intero: PPG heart rate and interoception scoring"
)]
struct Cli {
    /// Pipeline settings (TOML); flags below override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// PPG sample rate in Hz instead of inferring it from the time column
    #[arg(long, global = true)]
    fs: Option<f64>,
    /// Add each synchrony point again one resting RR interval later
    #[arg(long, global = true)]
    mirror: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Filter one PPG export and print the detected peak indices as JSON
    FindPeaks {
        #[arg(long)]
        input: PathBuf,
        /// Also render the filtered waveform with peak markers to a PNG
        #[arg(long)]
        plot: Option<PathBuf>,
    },
    /// Peaks, RR intervals and heart-rate samples for one PPG export
    HeartRate {
        #[arg(long)]
        input: PathBuf,
    },
    /// Heart-rate table for a folder of sub-<id>_sess<n>_PPG.csv files
    HrBatch {
        #[arg(long)]
        input_dir: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },
    /// Interoceptive-accuracy table from trial exports and PPG recordings
    IaBatch {
        #[arg(long)]
        ppg_dir: PathBuf,
        #[arg(long)]
        trial_dir: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },
    /// Interoceptive-sensitivity table for a folder of HBD exports
    IsBatch {
        #[arg(long)]
        hbd_dir: PathBuf,
        /// Resting PPG recordings used when an export has no resting_RRI
        #[arg(long)]
        baseline_dir: Option<PathBuf>,
        #[arg(long)]
        out: PathBuf,
    },
    /// Synchrony curve and Gaussian fit for one HBD export as JSON
    SyncCurve {
        #[arg(long)]
        input: PathBuf,
    },
    /// Render the synchrony curve and its fit to a PNG
    SyncPlot {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let cfg = load_config(&cli)?;
    match cli.command {
        Commands::FindPeaks { input, plot } => cmd_find_peaks(&input, plot.as_deref(), &cfg)?,
        Commands::HeartRate { input } => cmd_heart_rate(&input, &cfg)?,
        Commands::HrBatch { input_dir, out } => cmd_hr_batch(&input_dir, &out, &cfg)?,
        Commands::IaBatch {
            ppg_dir,
            trial_dir,
            out,
        } => cmd_ia_batch(&ppg_dir, &trial_dir, &out, &cfg)?,
        Commands::IsBatch {
            hbd_dir,
            baseline_dir,
            out,
        } => cmd_is_batch(&hbd_dir, baseline_dir.as_deref(), &out, &cfg)?,
        Commands::SyncCurve { input } => cmd_sync_curve(&input, &cfg)?,
        Commands::SyncPlot { input, out } => cmd_sync_plot(&input, &out, &cfg)?,
    }
    Ok(())
}

fn load_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut cfg = match &cli.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(fs) = cli.fs {
        cfg.sample_rate_hz = Some(fs);
    }
    if cli.mirror {
        cfg.sync.mirror_by_rri = true;
    }
    cfg.validate().context("invalid pipeline settings")?;
    Ok(cfg)
}

fn load_series(path: &Path, cfg: &PipelineConfig) -> Result<TimeSeries> {
    let recording =
        read_ppg_csv(path).with_context(|| format!("reading PPG export {}", path.display()))?;
    Ok(recording.to_time_series(cfg.sample_rate_hz))
}

fn cmd_find_peaks(input: &Path, plot: Option<&Path>, cfg: &PipelineConfig) -> Result<()> {
    let raw = load_series(input, cfg)?;
    let filtered = bandpass(&raw, &cfg.filter)?;
    let peaks = detect_heartbeats(&filtered, &cfg.peaks);
    if peaks.is_empty() {
        warn!("{}: no peaks detected", input.display());
    }
    if let Some(out) = plot {
        prepare_output(out)?;
        draw_plotters_figure(out, &figure_from_peaks(&filtered, &peaks, 4000))?;
    }
    println!("{}", serde_json::to_string(&peaks)?);
    Ok(())
}

fn cmd_heart_rate(input: &Path, cfg: &PipelineConfig) -> Result<()> {
    let raw = load_series(input, cfg)?;
    let result = run_heart_rate_pipeline(&raw, &cfg.filter, &cfg.peaks, &cfg.heart_rate)
        .with_context(|| format!("heart rate for {}", input.display()))?;
    println!("{}", serde_json::to_string(&result)?);
    Ok(())
}

fn finish_batch(
    ctx: BatchContext,
    inputs: Vec<String>,
    out: &Path,
    rows: usize,
    cfg: &PipelineConfig,
) -> Result<()> {
    ctx.summarize();
    let manifest = ctx.into_manifest(inputs, out, rows, cfg);
    let manifest_path = manifest_path_for(out);
    write_manifest(&manifest_path, &manifest)?;
    info!(
        "wrote {} rows to {} (manifest {})",
        rows,
        out.display(),
        manifest_path.display()
    );
    Ok(())
}

fn cmd_hr_batch(input_dir: &Path, out: &Path, cfg: &PipelineConfig) -> Result<()> {
    prepare_output(out)?;
    let mut ctx = BatchContext::new("hr-batch");
    let rows = run_heart_rate_batch(input_dir, cfg, &mut ctx)?;
    write_heart_rate_table(out, &rows)?;
    finish_batch(ctx, vec![input_dir.display().to_string()], out, rows.len(), cfg)
}

fn cmd_ia_batch(ppg_dir: &Path, trial_dir: &Path, out: &Path, cfg: &PipelineConfig) -> Result<()> {
    prepare_output(out)?;
    let mut ctx = BatchContext::new("ia-batch");
    let rows = run_accuracy_batch(ppg_dir, trial_dir, cfg, &mut ctx)?;
    write_accuracy_table(out, &rows)?;
    let inputs = vec![ppg_dir.display().to_string(), trial_dir.display().to_string()];
    finish_batch(ctx, inputs, out, rows.len(), cfg)
}

fn cmd_is_batch(
    hbd_dir: &Path,
    baseline_dir: Option<&Path>,
    out: &Path,
    cfg: &PipelineConfig,
) -> Result<()> {
    prepare_output(out)?;
    let mut ctx = BatchContext::new("is-batch");
    let rows = run_sensitivity_batch(hbd_dir, baseline_dir, cfg, &mut ctx)?;
    write_sensitivity_table(out, &rows)?;
    let mut inputs = vec![hbd_dir.display().to_string()];
    inputs.extend(baseline_dir.map(|dir| dir.display().to_string()));
    finish_batch(ctx, inputs, out, rows.len(), cfg)
}

#[derive(Serialize)]
struct SyncCurveOutput {
    resting_rri: Option<f64>,
    curve: SyncCurve,
    fit: Option<GaussianFit>,
}

/// Curve plus fit; a curve that cannot be fitted still comes back, with `fit: None`.
fn sync_curve_for(input: &Path, cfg: &PipelineConfig) -> Result<SyncCurveOutput> {
    let record =
        read_hbd_csv(input).with_context(|| format!("reading HBD export {}", input.display()))?;
    let rri_ms = record.resting_rri_s.map(|s| s * 1000.0);
    let curve = build_sync_curve(&record.trials, rri_ms, &cfg.sync);
    let fit = match fit_gaussian(&curve.points, &cfg.fit) {
        Ok(fit) => Some(fit),
        Err(err) if err.is_soft() => {
            warn!("{}: {}", input.display(), err);
            None
        }
        Err(err) => return Err(err.into()),
    };
    Ok(SyncCurveOutput {
        resting_rri: record.resting_rri_s,
        curve,
        fit,
    })
}

fn cmd_sync_curve(input: &Path, cfg: &PipelineConfig) -> Result<()> {
    let output = sync_curve_for(input, cfg)?;
    println!("{}", serde_json::to_string(&output)?);
    Ok(())
}

fn cmd_sync_plot(input: &Path, out: &Path, cfg: &PipelineConfig) -> Result<()> {
    let output = sync_curve_for(input, cfg)?;
    if output.curve.is_empty() {
        return Err(anyhow!("{} has no answered trials to plot", input.display()));
    }
    let fig = figure_from_sync_curve(&output.curve, output.fit.as_ref().map(|f| &f.params));
    prepare_output(out)?;
    draw_plotters_figure(out, &fig)?;
    Ok(())
}

/// Widen a degenerate or tight range so plotters gets a usable axis.
fn padded(lo: f64, hi: f64) -> (f64, f64) {
    let pad = if hi > lo { (hi - lo) * 0.05 } else { 0.5 };
    (lo - pad, hi + pad)
}

fn draw_plotters_figure(path: &Path, fig: &Figure) -> Result<()> {
    let (x_min, x_max, y_min, y_max) = fig
        .bounds()
        .ok_or_else(|| anyhow!("figure has no finite points"))?;
    let (x_min, x_max) = padded(x_min, x_max);
    let (y_min, y_max) = padded(y_min, y_max);

    let backend = BitMapBackend::new(path, (800, 480));
    let root = backend.into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .caption(
            fig.title.clone().unwrap_or_else(|| "Plot".into()),
            ("sans-serif", 24),
        )
        .x_label_area_size(30)
        .y_label_area_size(40)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)?;
    let mut mesh = chart.configure_mesh();
    if let Some(label) = &fig.x.label {
        mesh.x_desc(label.as_str());
    }
    if let Some(label) = &fig.y.label {
        mesh.y_desc(label.as_str());
    }
    mesh.draw()?;

    for series in &fig.series {
        match series {
            Series::Line(line) => {
                let (r, g, b) = line.style.color.rgb();
                let style = RGBColor(r, g, b).stroke_width(line.style.width.round().max(1.0) as u32);
                chart.draw_series(LineSeries::new(
                    line.points
                        .iter()
                        .filter(|p| p[0].is_finite() && p[1].is_finite())
                        .map(|p| (p[0], p[1])),
                    style,
                ))?;
            }
            Series::Scatter(scatter) => {
                let (r, g, b) = scatter.style.color.rgb();
                let radius = scatter.style.width.round().max(1.0) as i32;
                chart.draw_series(
                    scatter
                        .points
                        .iter()
                        .filter(|p| p[0].is_finite() && p[1].is_finite())
                        .map(|p| Circle::new((p[0], p[1]), radius, RGBColor(r, g, b).filled())),
                )?;
            }
        }
    }
    root.present()?;
    Ok(())
}
