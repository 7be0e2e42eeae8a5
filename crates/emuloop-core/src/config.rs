//! Configuration for the emuloop orchestrator.
//!
//! Loaded from `emuloop.yml`; every field has a default so an empty file (or
//! no file at all) produces a working configuration targeting the Commander
//! X16 toolchain the defaults describe.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Configuration load/validation failure.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    /// The YAML could not be parsed.
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    /// The parsed values are unusable.
    #[error("invalid config: {0}")]
    Validation(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmuloopConfig {
    /// Build tool invocation.
    #[serde(default)]
    pub build: BuildConfig,

    /// Emulator invocation and lifecycle bounds.
    #[serde(default)]
    pub emulator: EmulatorConfig,

    /// Capture utility and schedule.
    #[serde(default)]
    pub capture: CaptureConfig,

    /// Iteration loop settings.
    #[serde(default, rename = "loop")]
    pub iteration: LoopConfig,

    /// Directory layout.
    #[serde(default)]
    pub paths: PathsConfig,
}

/// Build tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Build tool binary.
    #[serde(default = "default_build_command")]
    pub command: String,
    /// Arguments; `{target}` expands to the build target name.
    #[serde(default = "default_build_args")]
    pub args: Vec<String>,
    /// Default target name.
    #[serde(default = "default_target")]
    pub target: String,
    /// Hard bound on one build invocation.
    #[serde(default = "default_build_timeout")]
    pub timeout_secs: u64,
}

impl BuildConfig {
    /// Expands `{target}` placeholders in the argument list.
    pub fn args_for(&self, target: &str) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| arg.replace("{target}", target))
            .collect()
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            command: default_build_command(),
            args: default_build_args(),
            target: default_target(),
            timeout_secs: default_build_timeout(),
        }
    }
}

/// Emulator invocation and lifecycle bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmulatorConfig {
    /// Emulator binary.
    #[serde(default = "default_emulator_command")]
    pub command: String,
    /// Flag introducing the program path.
    #[serde(default = "default_program_flag")]
    pub program_flag: String,
    /// Flag asking the emulator to auto-run the program.
    #[serde(default = "default_run_flag")]
    pub run_flag: String,
    /// Explicit program artifact; unset derives `<target>.prg`.
    #[serde(default)]
    pub program: Option<String>,
    /// Flag introducing the self-recording output path; unset disables
    /// recording.
    #[serde(default = "default_gif_flag")]
    pub gif_flag: Option<String>,
    /// Seconds to wait after spawn before the first liveness probe.
    #[serde(default = "default_grace_delay")]
    pub grace_delay_secs: u64,
    /// Bound on graceful termination before force kill.
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_secs: u64,
    /// Bound on draining remaining output after the schedule.
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout_secs: u64,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            command: default_emulator_command(),
            program_flag: default_program_flag(),
            run_flag: default_run_flag(),
            program: None,
            gif_flag: default_gif_flag(),
            grace_delay_secs: default_grace_delay(),
            stop_timeout_secs: default_stop_timeout(),
            drain_timeout_secs: default_drain_timeout(),
        }
    }
}

/// Capture utility and schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Capture binary; receives the output path as its last argument.
    #[serde(default = "default_capture_command")]
    pub command: String,
    /// Arguments preceding the output path.
    #[serde(default = "default_capture_args")]
    pub args: Vec<String>,
    /// Bound on one capture invocation.
    #[serde(default = "default_capture_timeout")]
    pub timeout_secs: u64,
    /// Capture offsets in seconds from session start, strictly increasing.
    #[serde(default = "default_offsets")]
    pub offsets: Vec<u64>,
    /// Total session duration in seconds.
    #[serde(default = "default_duration")]
    pub duration_secs: u64,
    /// Optional window-activation command `[binary, args...]`; unset is a
    /// no-op.
    #[serde(default)]
    pub activate_command: Option<Vec<String>>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            command: default_capture_command(),
            args: default_capture_args(),
            timeout_secs: default_capture_timeout(),
            offsets: default_offsets(),
            duration_secs: default_duration(),
            activate_command: None,
        }
    }
}

/// Iteration loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopConfig {
    /// Maximum Build -> Session -> Analyze cycles per run.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Fixed delay between iterations.
    #[serde(default = "default_loop_delay")]
    pub delay_secs: u64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            delay_secs: default_loop_delay(),
        }
    }
}

/// Directory layout for the project and diagnostic artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Project root; build and emulator run here.
    #[serde(default = "default_project_dir")]
    pub project_dir: PathBuf,
    /// Screenshot directory, relative to the project root.
    #[serde(default = "default_screenshots_dir")]
    pub screenshots_dir: PathBuf,
    /// Diagnostic log directory, relative to the project root.
    #[serde(default = "default_logs_dir")]
    pub logs_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            project_dir: default_project_dir(),
            screenshots_dir: default_screenshots_dir(),
            logs_dir: default_logs_dir(),
        }
    }
}

impl EmuloopConfig {
    /// Loads configuration from a YAML file and validates it.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        debug!(path = ?path.as_ref(), "Loaded config");
        Ok(config)
    }

    /// Checks invariants the rest of the system relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.build.command.trim().is_empty() {
            return Err(ConfigError::Validation(
                "build.command must not be empty".to_string(),
            ));
        }
        if self.emulator.command.trim().is_empty() {
            return Err(ConfigError::Validation(
                "emulator.command must not be empty".to_string(),
            ));
        }
        if self.capture.duration_secs == 0 {
            return Err(ConfigError::Validation(
                "capture.duration_secs must be non-zero".to_string(),
            ));
        }
        for pair in self.capture.offsets.windows(2) {
            if pair[1] <= pair[0] {
                return Err(ConfigError::Validation(format!(
                    "capture.offsets must be strictly increasing, found {} after {}",
                    pair[1], pair[0]
                )));
            }
        }
        if self.iteration.max_iterations == 0 {
            return Err(ConfigError::Validation(
                "loop.max_iterations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Program artifact handed to the emulator for `target`.
    pub fn program_name(&self, target: &str) -> String {
        self.emulator
            .program
            .clone()
            .unwrap_or_else(|| format!("{target}.prg"))
    }

    /// Screenshot directory resolved against the project root.
    pub fn screenshots_dir(&self) -> PathBuf {
        self.paths.project_dir.join(&self.paths.screenshots_dir)
    }

    /// Log directory resolved against the project root.
    pub fn logs_dir(&self) -> PathBuf {
        self.paths.project_dir.join(&self.paths.logs_dir)
    }
}

fn default_build_command() -> String {
    "make".to_string()
}

fn default_build_args() -> Vec<String> {
    vec!["GAME={target}".to_string()]
}

fn default_target() -> String {
    "pacman".to_string()
}

fn default_build_timeout() -> u64 {
    30
}

fn default_emulator_command() -> String {
    "x16emu".to_string()
}

fn default_program_flag() -> String {
    "-prg".to_string()
}

fn default_run_flag() -> String {
    "-run".to_string()
}

fn default_gif_flag() -> Option<String> {
    Some("-gif".to_string())
}

fn default_grace_delay() -> u64 {
    5
}

fn default_stop_timeout() -> u64 {
    5
}

fn default_drain_timeout() -> u64 {
    2
}

fn default_capture_command() -> String {
    "screencapture".to_string()
}

fn default_capture_args() -> Vec<String> {
    vec!["-x".to_string()]
}

fn default_capture_timeout() -> u64 {
    10
}

fn default_offsets() -> Vec<u64> {
    vec![1, 3, 5, 8, 10]
}

fn default_duration() -> u64 {
    10
}

fn default_max_iterations() -> u32 {
    3
}

fn default_loop_delay() -> u64 {
    5
}

fn default_project_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_screenshots_dir() -> PathBuf {
    PathBuf::from("dev_screenshots")
}

fn default_logs_dir() -> PathBuf {
    PathBuf::from("dev_logs")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_yaml_gives_defaults() {
        let config: EmuloopConfig = serde_yaml::from_str("{}").unwrap();
        config.validate().unwrap();
        assert_eq!(config.build.command, "make");
        assert_eq!(config.emulator.command, "x16emu");
        assert_eq!(config.capture.offsets, vec![1, 3, 5, 8, 10]);
        assert_eq!(config.capture.duration_secs, 10);
        assert_eq!(config.iteration.max_iterations, 3);
    }

    #[test]
    fn target_placeholder_expands() {
        let config = BuildConfig::default();
        assert_eq!(config.args_for("pacman"), vec!["GAME=pacman".to_string()]);
    }

    #[test]
    fn program_name_derives_from_target() {
        let mut config = EmuloopConfig::default();
        assert_eq!(config.program_name("pacman"), "pacman.prg");
        config.emulator.program = Some("demo.bin".to_string());
        assert_eq!(config.program_name("pacman"), "demo.bin");
    }

    #[test]
    fn non_increasing_offsets_are_rejected() {
        let yaml = r"
capture:
  offsets: [1, 3, 3]
";
        let config: EmuloopConfig = serde_yaml::from_str(yaml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn zero_duration_is_rejected() {
        let yaml = r"
capture:
  duration_secs: 0
";
        let config: EmuloopConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn nested_overrides_parse() {
        let yaml = r"
build:
  command: cargo
  args: [build, --release]
emulator:
  command: mednafen
  gif_flag: null
loop:
  max_iterations: 7
";
        let config: EmuloopConfig = serde_yaml::from_str(yaml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.build.command, "cargo");
        assert_eq!(config.emulator.command, "mednafen");
        assert_eq!(config.emulator.gif_flag, None);
        assert_eq!(config.iteration.max_iterations, 7);
    }
}
