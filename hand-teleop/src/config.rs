//! The `hand-teleop` configuration file.
//!
//! ```toml
//! [calibration]
//! dir = "~/calibration"
//!
//! [cameras]
//! camera_0_detections = "front.jsonl"
//! camera_1_detections = "side.jsonl"
//!
//! [arm]
//! mode = "position-and-orientation"
//! ```
//!
//! Every other value has a default. Relative paths are relative to the
//! directory containing the configuration file and may start with `~` or
//! contain environment variables.
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use arm_ik::{ArmGeometry, ArmMode, IkSolver, JointLimits, TargetFrame, Workspace};
use hand_mvg::CalibrationFileNames;

use crate::{Error, Result};

/// The default value for [CamerasConfig::frame_width].
pub const DEFAULT_FRAME_WIDTH: u32 = 640;
/// The default value for [CamerasConfig::frame_height].
pub const DEFAULT_FRAME_HEIGHT: u32 = 480;
/// The default value for [ControlConfig::tick_hz].
pub const DEFAULT_TICK_HZ: f64 = 30.0;

fn default_calibration_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_p0_fname() -> PathBuf {
    CalibrationFileNames::default().camera_0
}
fn default_p1_fname() -> PathBuf {
    CalibrationFileNames::default().camera_1
}
fn default_frame_width() -> u32 {
    DEFAULT_FRAME_WIDTH
}
fn default_frame_height() -> u32 {
    DEFAULT_FRAME_HEIGHT
}
fn default_tick_hz() -> f64 {
    DEFAULT_TICK_HZ
}
fn default_link() -> f64 {
    ArmGeometry::default().d1
}
fn default_joint_limits() -> Vec<[f64; 2]> {
    JointLimits::default().to_pairs()
}

/// Location of the two projection matrix files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CalibrationConfig {
    #[serde(default = "default_calibration_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_p0_fname")]
    pub p0_fname: PathBuf,
    #[serde(default = "default_p1_fname")]
    pub p1_fname: PathBuf,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            dir: default_calibration_dir(),
            p0_fname: default_p0_fname(),
            p1_fname: default_p1_fname(),
        }
    }
}

impl CalibrationConfig {
    pub fn file_names(&self) -> CalibrationFileNames {
        CalibrationFileNames {
            camera_0: self.p0_fname.clone(),
            camera_1: self.p1_fname.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CamerasConfig {
    /// Width in pixels of the frames the detections were made on.
    #[serde(default = "default_frame_width")]
    pub frame_width: u32,
    #[serde(default = "default_frame_height")]
    pub frame_height: u32,
    /// JSON lines file replayed as camera 0's detection stream.
    pub camera_0_detections: PathBuf,
    pub camera_1_detections: PathBuf,
    /// Replay rate of the detection files. Defaults to the tick rate.
    #[serde(default)]
    pub replay_hz: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArmConfig {
    #[serde(default)]
    pub mode: ArmMode,
    #[serde(default = "default_link")]
    pub d1: f64,
    #[serde(default = "default_link")]
    pub a2: f64,
    #[serde(default = "default_link")]
    pub d4: f64,
    /// `[min, max]` in radians for each of the six joints.
    #[serde(default = "default_joint_limits")]
    pub joint_limits: Vec<[f64; 2]>,
    #[serde(default)]
    pub workspace: Workspace,
    #[serde(default)]
    pub target_frame: TargetFrame,
}

impl Default for ArmConfig {
    fn default() -> Self {
        let geometry = ArmGeometry::default();
        Self {
            mode: ArmMode::default(),
            d1: geometry.d1,
            a2: geometry.a2,
            d4: geometry.d4,
            joint_limits: default_joint_limits(),
            workspace: Workspace::default(),
            target_frame: TargetFrame::default(),
        }
    }
}

impl ArmConfig {
    pub fn geometry(&self) -> ArmGeometry {
        ArmGeometry {
            d1: self.d1,
            a2: self.a2,
            d4: self.d4,
        }
    }

    pub fn joint_limits(&self) -> Result<JointLimits> {
        Ok(JointLimits::from_pairs(&self.joint_limits)?)
    }

    pub fn ik_solver(&self) -> Result<IkSolver> {
        Ok(IkSolver::new(
            self.geometry(),
            self.workspace.clone(),
            self.joint_limits()?,
        )?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ControlConfig {
    #[serde(default = "default_tick_hz")]
    pub tick_hz: f64,
    /// Write joint targets as JSON lines here. `-` is stdout. When absent,
    /// joint targets are only logged.
    #[serde(default)]
    pub joint_targets_output: Option<PathBuf>,
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            tick_hz: DEFAULT_TICK_HZ,
            joint_targets_output: None,
            log_file: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TeleopConfig {
    #[serde(default)]
    pub calibration: CalibrationConfig,
    pub cameras: CamerasConfig,
    #[serde(default)]
    pub arm: ArmConfig,
    #[serde(default)]
    pub control: ControlConfig,
}

impl TeleopConfig {
    /// Parse without resolving relative paths.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let cfg: TeleopConfig = toml::from_str(contents)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cameras.frame_width == 0 || self.cameras.frame_height == 0 {
            return Err(Error::InvalidConfig(format!(
                "frame size must be positive, got {}x{}",
                self.cameras.frame_width, self.cameras.frame_height
            )));
        }
        period_from_hz("tick_hz", self.control.tick_hz)?;
        if let Some(hz) = self.cameras.replay_hz {
            period_from_hz("replay_hz", hz)?;
        }
        self.arm.target_frame.validate()?;
        // Checks link lengths, workspace bounds and joint limits.
        self.arm.ik_solver()?;
        Ok(())
    }

    pub fn tick_period(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(1.0 / self.control.tick_hz)
    }

    pub fn replay_period(&self) -> std::time::Duration {
        let hz = self.cameras.replay_hz.unwrap_or(self.control.tick_hz);
        std::time::Duration::from_secs_f64(1.0 / hz)
    }

    /// Serialize as TOML, the way it would be read back.
    pub fn to_toml_string(&self) -> Result<String> {
        // Going through `toml::Value` orders tables after plain values.
        let value = toml::Value::try_from(self)?;
        Ok(toml::to_string_pretty(&value)?)
    }

    /// For all paths which are relative, make them relative to the config
    /// file location.
    fn fixup_relative_paths(&mut self, orig_path: &Path) -> Result<()> {
        let dirname = config_dirname(orig_path);

        fixup_relative_path(&mut self.calibration.dir, &dirname)?;
        fixup_relative_path(&mut self.cameras.camera_0_detections, &dirname)?;
        fixup_relative_path(&mut self.cameras.camera_1_detections, &dirname)?;
        if let Some(path) = self.control.joint_targets_output.as_mut() {
            if path.as_os_str() != "-" {
                fixup_relative_path(path, &dirname)?;
            }
        }
        if let Some(path) = self.control.log_file.as_mut() {
            fixup_relative_path(path, &dirname)?;
        }
        Ok(())
    }
}

/// The period of a rate in Hz. Fails unless the period is a non-zero
/// [std::time::Duration].
fn period_from_hz(name: &str, hz: f64) -> Result<std::time::Duration> {
    if !hz.is_finite() || hz <= 0.0 {
        return Err(Error::InvalidConfig(format!(
            "{name} must be positive, got {hz}"
        )));
    }
    match std::time::Duration::try_from_secs_f64(1.0 / hz) {
        Ok(period) if !period.is_zero() => Ok(period),
        _ => Err(Error::InvalidConfig(format!(
            "{name} of {hz} has no usable period"
        ))),
    }
}

/// The directory holding the config file `path`.
fn config_dirname(path: &Path) -> PathBuf {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// If `path` is relative, make it relative to `dirname`.
///
/// `path` must be utf-8 encoded and can start with a tilde, which is expanded
/// to the home directory.
fn fixup_relative_path(path: &mut PathBuf, dirname: &Path) -> Result<()> {
    let pathstr = path
        .as_os_str()
        .to_str()
        .ok_or_else(|| Error::InvalidConfig(format!("path {} is not UTF-8", path.display())))?;
    let expanded = shellexpand::full(pathstr)?;
    *path = PathBuf::from(expanded.to_string());

    if path.is_relative() {
        *path = dirname.join(&path);
    }
    Ok(())
}

/// Parse a `.toml` file and return a [TeleopConfig].
pub fn parse_config_file<P: AsRef<Path>>(fname: P) -> Result<TeleopConfig> {
    let contents = std::fs::read_to_string(fname.as_ref())?;
    let mut cfg: TeleopConfig = toml::from_str(&contents)?;
    cfg.fixup_relative_paths(fname.as_ref())?;
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [cameras]
        camera_0_detections = "cam0.jsonl"
        camera_1_detections = "cam1.jsonl"
    "#;

    #[test]
    fn test_minimal_uses_defaults() {
        let cfg = TeleopConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(cfg.cameras.frame_width, 640);
        assert_eq!(cfg.cameras.frame_height, 480);
        assert_eq!(cfg.control.tick_hz, 30.0);
        assert_eq!(cfg.arm.mode, ArmMode::Position);
        assert_eq!(cfg.arm.geometry(), ArmGeometry::default());
        assert_eq!(cfg.calibration.file_names(), CalibrationFileNames::default());
        assert_eq!(cfg.replay_period(), cfg.tick_period());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let contents = format!("{MINIMAL}\n[control]\ntick_rate = 10\n");
        assert!(matches!(
            TeleopConfig::from_toml_str(&contents),
            Err(Error::TomlDeError { .. })
        ));
    }

    #[test]
    fn test_relative_paths_follow_config_file() -> eyre::Result<()> {
        let tempdir = tempfile::tempdir()?;
        let cfg_path = tempdir.path().join("teleop.toml");
        let contents = format!(
            "{MINIMAL}\n[control]\njoint_targets_output = \"-\"\nlog_file = \"/tmp/teleop.log\"\n"
        );
        std::fs::write(&cfg_path, contents)?;
        let cfg = parse_config_file(&cfg_path)?;
        assert_eq!(cfg.cameras.camera_0_detections, tempdir.path().join("cam0.jsonl"));
        assert_eq!(cfg.calibration.dir, tempdir.path().join("."));
        assert_eq!(cfg.control.joint_targets_output, Some(PathBuf::from("-")));
        assert_eq!(cfg.control.log_file, Some(PathBuf::from("/tmp/teleop.log")));
        Ok(())
    }

    #[test]
    fn test_roundtrip_through_toml() {
        let cfg = TeleopConfig::from_toml_str(MINIMAL).unwrap();
        let buf = cfg.to_toml_string().unwrap();
        assert_eq!(TeleopConfig::from_toml_str(&buf).unwrap(), cfg);
    }
}
