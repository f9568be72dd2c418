//! Static configuration: TOML file, environment and defaults.
//!
//! Resolution order is CLI argument > environment variable > TOML file >
//! compiled default. The CLI layer is applied by the binary; this module
//! handles the other three.

use crate::errors::{NeuroflowError, Result};
use crate::pipeline::{CleanupPolicy, FailureMode};
use crate::utils::absolutize;
use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Config file read when no path is given and the file exists.
pub const DEFAULT_CONFIG_PATH: &str = "/workspace/neuroflow.toml";

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "NEUROFLOW_CONFIG";
/// Environment override for `input_dir`.
pub const INPUT_DIR_ENV: &str = "NEUROFLOW_INPUT_DIR";
/// Environment override for `output_dir`.
pub const OUTPUT_DIR_ENV: &str = "NEUROFLOW_OUTPUT_DIR";
/// Environment override for `work_dir`.
pub const WORK_DIR_ENV: &str = "NEUROFLOW_WORK_DIR";
/// Environment override for `failure_mode`.
pub const FAILURE_MODE_ENV: &str = "NEUROFLOW_FAILURE_MODE";

/// Top-level configuration: directories plus the pipeline settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NeuroflowConfig {
    /// Directory of raw `.nii.gz` scans.
    pub input_dir: PathBuf,
    /// Directory receiving `<subject>_mask.nii.gz`.
    pub output_dir: PathBuf,
    /// Everything the orchestrator needs besides the two directories.
    #[serde(flatten)]
    pub pipeline: PipelineConfig,
}

impl Default for NeuroflowConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("/workspace/input"),
            output_dir: PathBuf::from("/workspace/output"),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl NeuroflowConfig {
    /// Loads configuration from a TOML file.
    ///
    /// With `Some(path)` the file must exist. With `None` the default
    /// location is tried and compiled defaults are used if it is absent.
    ///
    /// # Errors
    ///
    /// Returns [`NeuroflowError::Config`] if the file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
        };

        if !path.exists() {
            if required {
                return Err(NeuroflowError::config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path).map_err(|e| {
            NeuroflowError::config(format!("Failed to read {}: {e}", path.display()))
        })?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`NeuroflowError::Config`] on malformed TOML or unknown values.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Applies overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`NeuroflowError::Config`] if an override value is invalid.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from `lookup`, which maps a variable name to its value.
    ///
    /// Empty values are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`NeuroflowError::Config`] if an override value is invalid.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(dir) = get(INPUT_DIR_ENV) {
            debug!("{INPUT_DIR_ENV} overrides input_dir");
            self.input_dir = PathBuf::from(dir);
        }
        if let Some(dir) = get(OUTPUT_DIR_ENV) {
            debug!("{OUTPUT_DIR_ENV} overrides output_dir");
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(dir) = get(WORK_DIR_ENV) {
            debug!("{WORK_DIR_ENV} overrides work_dir");
            self.pipeline.work_dir = Some(PathBuf::from(dir));
        }
        if let Some(mode) = get(FAILURE_MODE_ENV) {
            self.pipeline.failure_mode = mode
                .parse()
                .map_err(|e: String| NeuroflowError::config(format!("{FAILURE_MODE_ENV}: {e}")))?;
        }
        Ok(())
    }
}

/// Locations of the external tools.
///
/// Bare names (no path separator) are looked up on `PATH`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPaths {
    /// ROBEX launcher script.
    pub robex: PathBuf,
    /// `antsRegistrationSyN.sh`.
    pub ants_registration: PathBuf,
    /// ANTs `ImageMath`.
    pub image_math: PathBuf,
    /// `nnUNetv2_predict`.
    pub nnunet_predict: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            robex: PathBuf::from("./ROBEX/runROBEX.sh"),
            ants_registration: PathBuf::from("/usr/local/bin/antsRegistrationSyN.sh"),
            image_math: PathBuf::from("ImageMath"),
            nnunet_predict: PathBuf::from("nnUNetv2_predict"),
        }
    }
}

impl ToolPaths {
    /// Resolves every tool to an existing file.
    ///
    /// # Errors
    ///
    /// Returns [`NeuroflowError::Config`] listing every tool that was not found.
    pub fn resolve(&self) -> Result<Self> {
        self.resolve_with_path(std::env::var_os("PATH").as_deref())
    }

    fn resolve_with_path(&self, path_var: Option<&OsStr>) -> Result<Self> {
        let mut missing = Vec::new();
        let mut find = |key: &str, program: &Path| {
            resolve_program(program, path_var).unwrap_or_else(|| {
                missing.push(format!("{key} ({})", program.display()));
                program.to_path_buf()
            })
        };
        let resolved = Self {
            robex: find("robex", &self.robex),
            ants_registration: find("ants_registration", &self.ants_registration),
            image_math: find("image_math", &self.image_math),
            nnunet_predict: find("nnunet_predict", &self.nnunet_predict),
        };
        if !missing.is_empty() {
            return Err(NeuroflowError::config(format!(
                "Tool not found: {}",
                missing.join(", ")
            )));
        }
        Ok(resolved)
    }
}

/// Finds `program` either as a path or on the given `PATH` value.
fn resolve_program(program: &Path, path_var: Option<&OsStr>) -> Option<PathBuf> {
    if program.components().count() > 1 || program.is_absolute() {
        return program.is_file().then(|| absolutize(program));
    }
    std::env::split_paths(path_var?)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

/// Settings for atlas registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    /// Fixed image all scans are registered to.
    pub atlas: PathBuf,
    /// Transform type passed as `-t`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transform: Option<String>,
    /// Thread count passed as `-n`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threads: Option<u32>,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            atlas: PathBuf::from("/workspace/data/atlas/SRI24_atlas.nii"),
            transform: None,
            threads: None,
        }
    }
}

/// Settings for nnU-Net inference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Trained model folder, exported as `nnUNet_results`. Inherited from
    /// the environment when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weights_dir: Option<PathBuf>,
    /// Dataset id (`-d`).
    pub dataset_id: u32,
    /// Trained configuration (`-c`).
    pub configuration: String,
    /// Folds to ensemble (`-f`).
    pub folds: Vec<String>,
    /// Inference device (`-device`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            weights_dir: None,
            dataset_id: 15,
            configuration: "3d_fullres".to_string(),
            folds: vec!["all".to_string()],
            device: None,
        }
    }
}

/// Everything the orchestrator needs besides the input and output directories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Root for intermediates; defaults to the output directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub work_dir: Option<PathBuf>,
    /// What a scan failure does to the rest of the run.
    pub failure_mode: FailureMode,
    /// Which intermediates are removed after a scan succeeds.
    pub cleanup: CleanupPolicy,
    /// Scans processed at once.
    pub max_concurrent_scans: usize,
    /// Write `run_report.json` to the output directory.
    pub write_report: bool,
    /// External tool locations.
    pub tools: ToolPaths,
    /// Registration settings.
    pub registration: RegistrationConfig,
    /// Segmentation settings.
    pub segmentation: SegmentationConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            work_dir: None,
            failure_mode: FailureMode::default(),
            cleanup: CleanupPolicy::default(),
            max_concurrent_scans: 1,
            write_report: true,
            tools: ToolPaths::default(),
            registration: RegistrationConfig::default(),
            segmentation: SegmentationConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Returns the work directory for a run writing to `output_dir`.
    #[must_use]
    pub fn work_dir_for(&self, output_dir: &Path) -> PathBuf {
        self.work_dir.clone().unwrap_or_else(|| output_dir.to_path_buf())
    }

    /// Checks every setting and returns a copy with absolute paths and
    /// resolved tool locations.
    ///
    /// # Errors
    ///
    /// Returns [`NeuroflowError::Config`] for invalid values, a missing
    /// atlas, a missing weights directory or an unresolvable tool.
    pub fn resolve(&self) -> Result<Self> {
        self.check_values()?;

        let atlas = absolutize(&self.registration.atlas);
        if !atlas.is_file() {
            return Err(NeuroflowError::config(format!(
                "Atlas not found: {}",
                atlas.display()
            )));
        }
        let weights_dir = match self.segmentation.weights_dir {
            Some(ref dir) => {
                let dir = absolutize(dir);
                if !dir.is_dir() {
                    return Err(NeuroflowError::config(format!(
                        "Weights directory not found: {}",
                        dir.display()
                    )));
                }
                Some(dir)
            }
            None => None,
        };

        Ok(Self {
            work_dir: self.work_dir.as_deref().map(absolutize),
            tools: self.tools.resolve()?,
            registration: RegistrationConfig {
                atlas,
                ..self.registration.clone()
            },
            segmentation: SegmentationConfig {
                weights_dir,
                ..self.segmentation.clone()
            },
            ..self.clone()
        })
    }

    /// Runs [`PipelineConfig::resolve`] and discards the result.
    ///
    /// # Errors
    ///
    /// See [`PipelineConfig::resolve`].
    pub fn validate(&self) -> Result<()> {
        self.resolve().map(|_| ())
    }

    fn check_values(&self) -> Result<()> {
        if self.max_concurrent_scans == 0 {
            return Err(NeuroflowError::config("max_concurrent_scans must be at least 1"));
        }
        let folds = &self.segmentation.folds;
        if folds.is_empty() || folds.iter().any(|f| f.trim().is_empty()) {
            return Err(NeuroflowError::config(
                "segmentation.folds must be non-empty and contain no blank entries",
            ));
        }
        if self.segmentation.configuration.trim().is_empty() {
            return Err(NeuroflowError::config(
                "segmentation.configuration must not be empty",
            ));
        }
        if self.registration.threads == Some(0) {
            return Err(NeuroflowError::config("registration.threads must be at least 1"));
        }
        Ok(())
    }
}
