//! Settings management for shard-compositor
//!
//! Handles loading/saving of run settings as XML. Every rank of a run loads
//! the same file so image size, camera and compositing parameters agree.

use glam::DVec3;
use quick_xml::de::from_str;
use quick_xml::se::to_string;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::compositor::{DEFAULT_ALPHA_EPSILON, DEFAULT_BACKGROUND};
use crate::render::Camera;
use crate::transport::TcpGroupConfig;

/// XYZ triple as stored in settings files
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

impl From<Vector3> for DVec3 {
    fn from(v: Vector3) -> Self {
        DVec3::new(v.x, v.y, v.z)
    }
}

/// Opaque RGB background color
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackgroundColor {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl BackgroundColor {
    pub fn to_array(self) -> [f32; 3] {
        [self.r, self.g, self.b]
    }
}

impl Default for BackgroundColor {
    fn default() -> Self {
        let [r, g, b] = DEFAULT_BACKGROUND;
        Self { r, g, b }
    }
}

/// Settings for one compositing run, stored in XML files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename = "CompositeRun")]
pub struct RunSettings {
    /// Frame width shared by every rank
    #[serde(rename = "imageWidth", default = "default_image_size")]
    pub image_width: u32,

    /// Frame height shared by every rank
    #[serde(rename = "imageHeight", default = "default_image_size")]
    pub image_height: u32,

    /// Demo dataset resolution (blocks per axis, cubed)
    #[serde(rename = "blocksPerAxis", default = "default_blocks_per_axis")]
    pub blocks_per_axis: u32,

    /// Number of ranks the launcher starts
    #[serde(rename = "numProcesses", default = "default_num_processes")]
    pub num_processes: usize,

    #[serde(rename = "cameraPosition", default = "default_camera_position")]
    pub camera_position: Vector3,

    #[serde(rename = "cameraLookAt", default = "default_camera_look_at")]
    pub camera_look_at: Vector3,

    /// Vertical field of view in degrees
    #[serde(rename = "fieldOfView", default = "default_field_of_view")]
    pub field_of_view: f64,

    /// Color blended under translucent pixels in the resolve pass
    #[serde(rename = "background", default)]
    pub background: BackgroundColor,

    /// Source alpha at or below this is skipped while compositing
    #[serde(rename = "alphaEpsilon", default = "default_alpha_epsilon")]
    pub alpha_epsilon: f32,

    /// Address the coordinator listens on
    #[serde(rename = "coordinatorAddress", default = "default_coordinator_address")]
    pub coordinator_address: String,

    /// Seconds to wait for every rank to connect
    #[serde(rename = "connectTimeoutSecs", default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Directory for all output images
    #[serde(rename = "outputDir", default = "default_output_dir")]
    pub output_dir: String,

    /// File name of the final composited image
    #[serde(rename = "finalImage", default = "default_final_image")]
    pub final_image: String,

    /// Whether to write partial_order_* and received_order_* debug images
    #[serde(rename = "savePartials", default = "default_save_partials")]
    pub save_partials: bool,
}

fn default_image_size() -> u32 {
    1024
}

fn default_blocks_per_axis() -> u32 {
    4
}

fn default_num_processes() -> usize {
    4
}

fn default_camera_position() -> Vector3 {
    Vector3::new(1.5, 1.5, 1.5)
}

fn default_camera_look_at() -> Vector3 {
    Vector3::new(0.5, 0.5, 0.5)
}

fn default_field_of_view() -> f64 {
    60.0
}

fn default_alpha_epsilon() -> f32 {
    DEFAULT_ALPHA_EPSILON
}

fn default_coordinator_address() -> String {
    "127.0.0.1:7878".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_output_dir() -> String {
    ".".to_string()
}

fn default_final_image() -> String {
    "volume_mpi.png".to_string()
}

fn default_save_partials() -> bool {
    true
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            image_width: default_image_size(),
            image_height: default_image_size(),
            blocks_per_axis: default_blocks_per_axis(),
            num_processes: default_num_processes(),
            camera_position: default_camera_position(),
            camera_look_at: default_camera_look_at(),
            field_of_view: default_field_of_view(),
            background: BackgroundColor::default(),
            alpha_epsilon: default_alpha_epsilon(),
            coordinator_address: default_coordinator_address(),
            connect_timeout_secs: default_connect_timeout_secs(),
            output_dir: default_output_dir(),
            final_image: default_final_image(),
            save_partials: default_save_partials(),
        }
    }
}

impl RunSettings {
    /// Load settings from an XML file and validate them
    pub fn load_from_file(path: &Path) -> Result<Self, SettingsError> {
        let contents = fs::read_to_string(path).map_err(SettingsError::Io)?;
        let settings: Self = from_str(&contents).map_err(SettingsError::XmlParse)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Save settings to an XML file
    pub fn save_to_file(&self, path: &Path) -> Result<(), SettingsError> {
        let xml = to_string(self).map_err(SettingsError::XmlWrite)?;
        let formatted = format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{}", xml);
        fs::write(path, formatted).map_err(SettingsError::Io)?;
        Ok(())
    }

    /// Reject values no run can work with
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.image_width == 0 || self.image_height == 0 {
            return Err(SettingsError::Invalid(format!(
                "image size must be non-zero (got {}x{})",
                self.image_width, self.image_height
            )));
        }
        if self.num_processes == 0 {
            return Err(SettingsError::Invalid("numProcesses must be at least 1".to_string()));
        }
        if !(0.0..1.0).contains(&self.alpha_epsilon) {
            return Err(SettingsError::Invalid(format!(
                "alphaEpsilon must be in [0, 1) (got {})",
                self.alpha_epsilon
            )));
        }
        if !(self.field_of_view > 0.0 && self.field_of_view < 180.0) {
            return Err(SettingsError::Invalid(format!(
                "fieldOfView must be in (0, 180) degrees (got {})",
                self.field_of_view
            )));
        }
        Ok(())
    }

    /// Camera shared by every rank
    pub fn camera(&self) -> Camera {
        Camera {
            position: self.camera_position.into(),
            look_at: self.camera_look_at.into(),
            fov_y_degrees: self.field_of_view,
            ..Camera::default()
        }
    }

    /// How ranks reach the coordinator
    pub fn group_config(&self) -> TcpGroupConfig {
        TcpGroupConfig {
            coordinator_address: self.coordinator_address.clone(),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
        }
    }

    pub fn output_path(&self, file_name: &str) -> PathBuf {
        Path::new(&self.output_dir).join(file_name)
    }

    pub fn final_image_path(&self) -> PathBuf {
        self.output_path(&self.final_image)
    }
}

/// Settings-related errors
#[derive(Debug)]
pub enum SettingsError {
    Io(std::io::Error),
    XmlParse(quick_xml::DeError),
    XmlWrite(quick_xml::SeError),
    Invalid(String),
}

impl std::fmt::Display for SettingsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettingsError::Io(e) => write!(f, "IO error: {}", e),
            SettingsError::XmlParse(e) => write!(f, "XML parse error: {}", e),
            SettingsError::XmlWrite(e) => write!(f, "XML write error: {}", e),
            SettingsError::Invalid(msg) => write!(f, "Invalid settings: {}", msg),
        }
    }
}

impl std::error::Error for SettingsError {}
