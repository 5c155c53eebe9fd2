use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BenchError {
    #[error("Failed to load image from {path:?}")]
    ImageLoad {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("Image {path:?} has no pixels")]
    EmptyImage { path: PathBuf },
    #[error("Pixel buffer holds {actual} bytes, {width}x{height} BGR needs {expected}")]
    InvalidBuffer {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
    #[error("Source is {actual_width}x{actual_height}, device buffers hold {width}x{height}")]
    SizeMismatch {
        width: u32,
        height: u32,
        actual_width: u32,
        actual_height: u32,
    },
    #[error("Repeat count must be at least 1")]
    ZeroRepeat,
    #[error("CPU resize failed")]
    Resize(#[from] fast_image_resize::ResizeError),
    #[error("Failed to create CPU image container")]
    CpuImageBuffer(#[from] fast_image_resize::ImageBufferError),
    #[error("{what} needs {bytes} bytes, the device allows at most {limit}")]
    BufferTooLarge {
        what: &'static str,
        bytes: u64,
        limit: u64,
    },
    #[error("No suitable GPU adapter found")]
    NoAdapter,
    #[error("GPU device request failed")]
    RequestDevice(#[from] wgpu::RequestDeviceError),
    #[error("Failed to map the readback buffer")]
    BufferMap(#[from] wgpu::BufferAsyncError),
    #[error("Readback channel closed before the buffer was mapped")]
    MapChannelClosed,
    #[error("Display window error")]
    Display(#[from] minifb::Error),
}

pub type BenchResult<T> = Result<T, BenchError>;
