use async_trait::async_trait;
use fast_image_resize::images::{Image, ImageRef};
use fast_image_resize::{FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer};
use instant::Instant;
use log::debug;

use super::{check_repeat, BenchmarkReport, ResizeBenchmark};
use crate::bgr_image::BgrImage;
use crate::error::BenchResult;

pub struct CpuResizeBenchmark {
    target: (u32, u32),
    resizer: Resizer,
    options: ResizeOptions,
}

impl CpuResizeBenchmark {
    pub fn new(target: (u32, u32)) -> Self {
        Self {
            target,
            resizer: Resizer::new(),
            options: ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear)),
        }
    }
}

#[async_trait]
impl ResizeBenchmark for CpuResizeBenchmark {
    fn name(&self) -> &str {
        "CPU"
    }

    async fn run(&mut self, src: &BgrImage, repeat: u32) -> BenchResult<BenchmarkReport> {
        check_repeat(repeat)?;
        let (width, height) = self.target;
        let src_view = ImageRef::new(src.width(), src.height(), src.as_bytes(), PixelType::U8x3)?;
        // Overwritten on every iteration, only the last result is kept.
        let mut dst = Image::new(width, height, PixelType::U8x3);

        debug!(
            "CPU: resizing {}x{} -> {}x{}, {} times",
            src.width(),
            src.height(),
            width,
            height,
            repeat
        );
        let start = Instant::now();
        for _ in 0..repeat {
            self.resizer.resize(&src_view, &mut dst, &self.options)?;
        }
        let elapsed = start.elapsed();

        Ok(BenchmarkReport {
            mode: self.name().to_string(),
            repeat,
            elapsed,
            output: BgrImage::from_raw(width, height, dst.into_vec())?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::benchmarks::TARGET_SIZE;
    use crate::bgr_image::gradient;
    use crate::error::BenchError;

    fn run(
        bench: &mut CpuResizeBenchmark,
        src: &BgrImage,
        repeat: u32,
    ) -> BenchResult<BenchmarkReport> {
        pollster::block_on(bench.run(src, repeat))
    }

    #[test]
    fn output_has_target_size_for_any_source() {
        let mut bench = CpuResizeBenchmark::new(TARGET_SIZE);
        for (w, h) in [(512, 512), (64, 48), (300, 300), (1023, 17), (1, 1)] {
            let report = run(&mut bench, &gradient(w, h), 1).unwrap();
            assert_eq!(report.output.shape(), (300, 300, 3), "source {w}x{h}");
            assert_eq!(report.output.as_bytes().len(), 300 * 300 * 3);
        }
    }

    #[test]
    fn latency_is_finite_and_non_negative() {
        let mut bench = CpuResizeBenchmark::new(TARGET_SIZE);
        let report = run(&mut bench, &gradient(128, 96), 3).unwrap();
        assert_eq!(report.repeat, 3);
        assert_eq!(report.mode, "CPU");
        let ms = report.avg_ms();
        assert!(ms.is_finite());
        assert!(ms >= 0.0);
    }

    #[test]
    fn repeated_runs_give_same_pixels() {
        let mut bench = CpuResizeBenchmark::new((40, 30));
        let src = gradient(200, 100);
        let a = run(&mut bench, &src, 1).unwrap();
        let b = run(&mut bench, &src, 5).unwrap();
        assert_eq!(a.output, b.output);
    }

    #[test]
    fn uniform_source_stays_uniform() {
        let src = BgrImage::from_raw(50, 40, [7u8, 128, 250].repeat(50 * 40)).unwrap();
        let mut bench = CpuResizeBenchmark::new((17, 23));
        let report = run(&mut bench, &src, 1).unwrap();
        for px in report.output.as_bytes().chunks_exact(3) {
            // Fixed-point weights may be off by one level.
            assert!(px[0].abs_diff(7) <= 1);
            assert!(px[1].abs_diff(128) <= 1);
            assert!(px[2].abs_diff(250) <= 1);
        }
    }

    #[test]
    fn zero_repeat_is_rejected() {
        let mut bench = CpuResizeBenchmark::new(TARGET_SIZE);
        let err = run(&mut bench, &gradient(8, 8), 0).unwrap_err();
        assert!(matches!(err, BenchError::ZeroRepeat));
    }
}
