use std::fs;
use std::path::{Path, PathBuf};

use image::RgbImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("frame source unavailable: {0}")]
    Unavailable(String),
    #[error("failed to read frame from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("frame encoding failed: {0}")]
    Encode(#[source] image::ImageError),
}

/// A live video source the loop can pull frames from.
///
/// `grab` is expected to be cheap and synchronous; it must keep up with the
/// polling cadence and return frames with a stable width/height.
pub trait FrameSource: Send {
    /// Human-readable label for logs.
    fn describe(&self) -> String;

    /// Pull the current frame.
    fn grab(&mut self) -> Result<RgbImage, CaptureError>;
}

/// Cycles through the image files of a directory, oldest name first.
///
/// Stands in for a camera when driving a real detection service: point it at
/// a folder of webcam stills and each tick submits the next one.
pub struct ImageDirSource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    cursor: usize,
}

impl ImageDirSource {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, CaptureError> {
        let dir = dir.as_ref().to_path_buf();
        let entries = fs::read_dir(&dir)
            .map_err(|err| CaptureError::Unavailable(format!("{}: {err}", dir.display())))?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                matches!(
                    path.extension().and_then(|ext| ext.to_str()),
                    Some("jpg" | "jpeg" | "png")
                )
            })
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(CaptureError::Unavailable(format!(
                "no image files in {}",
                dir.display()
            )));
        }

        Ok(Self {
            dir,
            files,
            cursor: 0,
        })
    }
}

impl FrameSource for ImageDirSource {
    fn describe(&self) -> String {
        format!("{} ({} frames)", self.dir.display(), self.files.len())
    }

    fn grab(&mut self) -> Result<RgbImage, CaptureError> {
        let path = self.files[self.cursor].clone();
        self.cursor = (self.cursor + 1) % self.files.len();

        let img = image::open(&path).map_err(|source| CaptureError::Read { path, source })?;
        Ok(img.to_rgb8())
    }
}

/// Synthesizes frames with a band that drifts across the image, so
/// consecutive grabs differ the way a live feed would.
pub struct TestPatternSource {
    width: u32,
    height: u32,
    frame_index: u64,
}

impl TestPatternSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            frame_index: 0,
        }
    }
}

impl FrameSource for TestPatternSource {
    fn describe(&self) -> String {
        format!("test pattern {}x{}", self.width, self.height)
    }

    fn grab(&mut self) -> Result<RgbImage, CaptureError> {
        let band = (self.frame_index % u64::from(self.height)) as u32;
        self.frame_index += 1;

        let frame = RgbImage::from_fn(self.width, self.height, |x, y| {
            if y.abs_diff(band) < 4 {
                image::Rgb([230, 230, 230])
            } else {
                image::Rgb([(x % 256) as u8, (y % 256) as u8, 64])
            }
        });
        Ok(frame)
    }
}
