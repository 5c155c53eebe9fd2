use std::time::Duration;

use async_trait::async_trait;

use crate::bgr_image::BgrImage;
use crate::error::{BenchError, BenchResult};

pub mod cpu_resize;
pub mod gpu_resize;

pub const NUM_REPEAT: u32 = 10000;
pub const TARGET_SIZE: (u32, u32) = (300, 300);
pub const SOURCE_PATH: &str = "resource/lena.jpg";

// Trait for implementing resize benchmarks
#[async_trait]
pub trait ResizeBenchmark {
    fn name(&self) -> &str;
    async fn run(&mut self, src: &BgrImage, repeat: u32) -> BenchResult<BenchmarkReport>;
}

#[derive(Debug)]
pub struct BenchmarkReport {
    pub mode: String,
    pub repeat: u32,
    pub elapsed: Duration,
    pub output: BgrImage,
}

impl BenchmarkReport {
    /// Average latency of one call in milliseconds.
    pub fn avg_ms(&self) -> f64 {
        average_ms(self.elapsed, self.repeat)
    }

    pub fn latency_line(&self) -> String {
        format!("{} = {:?}[msec]", self.mode, self.avg_ms())
    }

    pub fn log_summary(&self) {
        log::info!("{}", self.mode);
        log::info!("{:-<60}", "");
        log::info!("{:<40} {:>15}", "Operation", "Time (ms)");
        log::info!("{:-<60}", "");
        log::info!(
            "{:<40} {:>15.3}",
            format!("Total ({} calls)", self.repeat),
            self.elapsed.as_secs_f64() * 1000.0
        );
        log::info!("{:<40} {:>15.3}", "Average per call", self.avg_ms());
        log::info!(
            "{:<40} {:>15}",
            "Output shape",
            format!("{:?}", self.output.shape())
        );
        log::info!("{:-<60}", "");
    }
}

pub(crate) fn average_ms(elapsed: Duration, repeat: u32) -> f64 {
    if repeat == 0 {
        return 0.0;
    }
    elapsed.as_secs_f64() * 1000.0 / repeat as f64
}

pub(crate) fn check_repeat(repeat: u32) -> BenchResult<()> {
    if repeat == 0 {
        return Err(BenchError::ZeroRepeat);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bgr_image::gradient;

    fn report(elapsed: Duration, repeat: u32) -> BenchmarkReport {
        BenchmarkReport {
            mode: "CPU".to_string(),
            repeat,
            elapsed,
            output: gradient(2, 2),
        }
    }

    #[test]
    fn average_is_total_over_count() {
        let r = report(Duration::from_secs(5), 10000);
        assert!((r.avg_ms() - 0.5).abs() < 1e-12);
        assert_eq!(average_ms(Duration::from_secs(1), 0), 0.0);
    }

    #[test]
    fn latency_line_format() {
        let r = report(Duration::from_secs(3), 2);
        assert_eq!(r.latency_line(), "CPU = 1500.0[msec]");
        let r = report(Duration::from_secs(5), 10000);
        assert_eq!(r.latency_line(), "CPU = 0.5[msec]");
    }

    #[test]
    fn zero_repeat_rejected() {
        assert!(matches!(check_repeat(0), Err(BenchError::ZeroRepeat)));
        assert!(check_repeat(1).is_ok());
    }
}
