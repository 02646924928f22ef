use crate::overlay::ImageSurface;
use image::RgbImage;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{error, trace};

/// Receives the presented video and the overlay after each render.
pub trait Presenter<S> {
    fn present(&mut self, video: &RgbImage, overlay: &S);
}

/// Writes the composited view to an image file at most once per interval.
pub struct PreviewWriter {
    path: PathBuf,
    interval: Duration,
    last_written: Option<Instant>,
}

impl PreviewWriter {
    pub fn new(path: impl Into<PathBuf>, interval: Duration) -> Self {
        Self {
            path: path.into(),
            interval,
            last_written: None,
        }
    }

    fn due(&self) -> bool {
        self.last_written
            .map_or(true, |at| at.elapsed() >= self.interval)
    }
}

impl Presenter<ImageSurface> for PreviewWriter {
    fn present(&mut self, video: &RgbImage, overlay: &ImageSurface) {
        if !self.due() {
            return;
        }
        self.last_written = Some(Instant::now());
        let composite = overlay.composite(video);
        // write next to the target and rename so readers never see a partial file
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        let format = match image::ImageFormat::from_path(&self.path) {
            Ok(f) => f,
            Err(e) => {
                error!(path = %self.path.display(), "unsupported preview format: {e}");
                return;
            }
        };
        if let Err(e) = composite.save_with_format(&tmp, format) {
            error!("failed to write preview: {e}");
            return;
        }
        if let Err(e) = std::fs::rename(&tmp, &self.path) {
            error!("failed to replace preview: {e}");
            return;
        }
        trace!(path = %self.path.display(), "preview written");
    }
}
