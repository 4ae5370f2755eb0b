//! Image and summary output
//!
//! Debug images are named `<prefix>_<orderIdx>_rank_<rank>.<ext>`, where the
//! order index is the rank's position in the visibility order. The names are
//! a debugging aid; `parse_order_file_name` reads them back.

use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::frame::RgbaFrame;
use crate::telemetry::PhaseTimings;
use crate::visibility::{ProcessRecord, VisibilityOrder};

/// Extension used for every image the pipeline writes
pub const IMAGE_EXTENSION: &str = "png";

/// File name of the coordinator's run summary
pub const SUMMARY_FILE: &str = "composite_summary.json";

/// Which copy of a rank's frame an image holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    /// As rendered on the owning rank
    Partial,
    /// As received by the coordinator
    Received,
}

impl ImageKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            ImageKind::Partial => "partial_order",
            ImageKind::Received => "received_order",
        }
    }
}

/// `partial_order_<orderIdx>_rank_<rank>.<ext>` / `received_order_...`
pub fn order_file_name(kind: ImageKind, order_index: usize, rank: usize, ext: &str) -> String {
    format!("{}_{}_rank_{}.{}", kind.prefix(), order_index, rank, ext)
}

/// Parse a name produced by [`order_file_name`] into (kind, order index, rank)
pub fn parse_order_file_name(name: &str) -> Option<(ImageKind, usize, usize)> {
    let stem = name.rsplit_once('.').map_or(name, |(stem, _)| stem);
    for kind in [ImageKind::Partial, ImageKind::Received] {
        let Some(rest) = stem.strip_prefix(kind.prefix()).and_then(|r| r.strip_prefix('_')) else {
            continue;
        };
        let (order, rank) = rest.split_once("_rank_")?;
        return Some((kind, order.parse().ok()?, rank.parse().ok()?));
    }
    None
}

/// Output-related errors
#[derive(Debug)]
pub enum OutputError {
    Io(std::io::Error),
    Image(image::ImageError),
    Json(serde_json::Error),
    /// Frame buffer did not match its dimensions
    Encode(String),
}

impl std::fmt::Display for OutputError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputError::Io(e) => write!(f, "IO error: {}", e),
            OutputError::Image(e) => write!(f, "Image error: {}", e),
            OutputError::Json(e) => write!(f, "JSON error: {}", e),
            OutputError::Encode(msg) => write!(f, "Encode error: {}", msg),
        }
    }
}

impl std::error::Error for OutputError {}

impl From<std::io::Error> for OutputError {
    fn from(e: std::io::Error) -> Self {
        OutputError::Io(e)
    }
}

impl From<image::ImageError> for OutputError {
    fn from(e: image::ImageError) -> Self {
        OutputError::Image(e)
    }
}

impl From<serde_json::Error> for OutputError {
    fn from(e: serde_json::Error) -> Self {
        OutputError::Json(e)
    }
}

/// Write a frame as an 8-bit RGBA image; the format follows the extension
pub fn save_frame(frame: &RgbaFrame, path: &Path) -> Result<(), OutputError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let image = image::RgbaImage::from_raw(frame.width(), frame.height(), frame.to_rgba8())
        .ok_or_else(|| OutputError::Encode(format!("buffer does not fit {}x{}", frame.width(), frame.height())))?;
    image.save(path)?;
    Ok(())
}

/// Run description written next to the final image
#[derive(Debug, Clone, Serialize)]
pub struct CompositeSummary {
    pub num_processes: usize,
    pub width: u32,
    pub height: u32,
    /// Ranks in compositing order, back first
    pub visibility_order: Vec<ProcessRecord>,
    pub final_image: String,
    pub timings: PhaseTimings,
}

impl CompositeSummary {
    pub fn new(order: &VisibilityOrder, width: u32, height: u32, final_image: String, timings: PhaseTimings) -> Self {
        Self {
            num_processes: order.len(),
            width,
            height,
            visibility_order: order.records().to_vec(),
            final_image,
            timings,
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), OutputError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}
