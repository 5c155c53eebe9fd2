use std::future::Future;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, error, warn};

mod benchmarks;
mod bgr_image;
mod display;
mod error;
mod gpu;

use benchmarks::cpu_resize::CpuResizeBenchmark;
use benchmarks::gpu_resize::GpuResizeBenchmark;
use benchmarks::{BenchmarkReport, ResizeBenchmark, NUM_REPEAT, SOURCE_PATH, TARGET_SIZE};
use bgr_image::BgrImage;
use display::Viewer;
use error::BenchResult;
use gpu::GpuContext;

/// Compare CPU and GPU image resize latency.
#[derive(Parser)]
#[clap(version, about, long_about = None)]
struct Cli {
    /// Path to source image file
    #[clap(value_parser, default_value = SOURCE_PATH)]
    source_path: PathBuf,

    /// Number of resize calls per device
    #[clap(
        short = 'n',
        long,
        default_value_t = NUM_REPEAT,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    repeat: u32,

    /// Width of the resized image, in pixels
    #[clap(
        long,
        default_value_t = TARGET_SIZE.0,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    width: u32,

    /// Height of the resized image, in pixels
    #[clap(
        long,
        default_value_t = TARGET_SIZE.1,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    height: u32,

    /// Do not open any windows
    #[clap(long, action)]
    no_display: bool,

    /// Accept a software (CPU) adapter for the GPU phase
    #[clap(long, action)]
    allow_software_adapter: bool,

    #[clap(flatten)]
    verbose: clap_verbosity_flag::Verbosity<clap_verbosity_flag::WarnLevel>,
}

async fn run(cli: &Cli) -> Result<()> {
    let src = BgrImage::open(&cli.source_path)
        .with_context(|| format!("Failed to read source image {:?}", cli.source_path))?;
    debug!("Loaded {:?} ({}x{})", cli.source_path, src.width(), src.height());

    let mut viewer = (!cli.no_display).then(Viewer::new);
    show(&mut viewer, "img_src", &src);

    let mut out = std::io::stdout().lock();
    let gpu = GpuContext::new(cli.allow_software_adapter);
    run_phases(cli, &src, gpu, &mut viewer, &mut out).await?;

    if let Some(viewer) = viewer {
        viewer
            .wait_key()
            .with_context(|| "Display window failed")?;
    }

    writeln!(out, "{}", gpu::count_gpu_devices())?;
    Ok(())
}

/// Run the CPU phase, then the GPU phase on the context `gpu` resolves to.
/// A failed GPU phase is logged and skipped. Returns the published modes.
async fn run_phases(
    cli: &Cli,
    src: &BgrImage,
    gpu: impl Future<Output = BenchResult<GpuContext>>,
    viewer: &mut Option<Viewer>,
    out: &mut impl Write,
) -> Result<Vec<String>> {
    let target = (cli.width, cli.height);
    let mut published = Vec::new();

    let mut cpu = CpuResizeBenchmark::new(target);
    let report = cpu
        .run(src, cli.repeat)
        .await
        .with_context(|| "CPU resize benchmark failed")?;
    publish(&report, viewer, out)?;
    published.push(report.mode);

    match gpu_phase(gpu, src, target, cli.repeat).await {
        Ok(report) => {
            publish(&report, viewer, out)?;
            published.push(report.mode);
        }
        Err(e) => error!("GPU phase skipped: {}", error_chain(&e)),
    }
    Ok(published)
}

async fn gpu_phase(
    gpu: impl Future<Output = BenchResult<GpuContext>>,
    src: &BgrImage,
    target: (u32, u32),
    repeat: u32,
) -> BenchResult<BenchmarkReport> {
    let ctx = gpu.await?;
    debug!("GPU adapter: {}", ctx);
    // Buffers are allocated here, outside the timed loop.
    let mut bench = GpuResizeBenchmark::new(ctx, src.dimensions(), target)?;
    bench.log_setup_times();
    bench.run(src, repeat).await
}

fn publish(
    report: &BenchmarkReport,
    viewer: &mut Option<Viewer>,
    out: &mut impl Write,
) -> std::io::Result<()> {
    writeln!(out, "{}", report.latency_line())?;
    report.log_summary();
    show(viewer, &report.mode, &report.output);
    Ok(())
}

fn show(viewer: &mut Option<Viewer>, name: &str, image: &BgrImage) {
    if let Some(v) = viewer {
        if let Err(e) = v.show(name, image) {
            warn!(
                "Cannot open window {}: {}, continuing without display",
                name,
                error_chain(&e)
            );
            *viewer = None;
        }
    }
}

fn error_chain(e: &dyn std::error::Error) -> String {
    let mut msg = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        msg.push_str(": ");
        msg.push_str(&cause.to_string());
        source = cause.source();
    }
    msg
}

fn main() -> Result<()> {
    let cli: Cli = Cli::parse();
    env_logger::Builder::new()
        .filter_level(cli.verbose.log_level_filter())
        .parse_default_env()
        .init();
    pollster::block_on(run(&cli))
}
