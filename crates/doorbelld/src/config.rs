use doorbell_core::classifier::DEFAULT_OCCUPATION_LABELS;
use doorbell_core::CascadePolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Camera,
    Fixtures,
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "camera" => Ok(SourceKind::Camera),
            "fixtures" => Ok(SourceKind::Fixtures),
            other => Err(format!("unknown frame source {other:?} (expected camera or fixtures)")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Tcp,
    Log,
}

impl FromStr for ChannelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(ChannelKind::Tcp),
            "log" => Ok(ChannelKind::Log),
            other => Err(format!("unknown alert channel {other:?} (expected tcp or log)")),
        }
    }
}

/// Daemon configuration.
///
/// Layered as defaults, then an optional TOML file, then `DOORBELL_*`
/// environment variables, then command-line flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub frame_source: SourceKind,
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    pub fixture_dir: PathBuf,
    /// Frames discarded after each stream start (camera AGC/AE stabilization).
    pub warmup_frames: usize,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Enrolled identities, one sub-directory of images per name.
    pub gallery_dir: PathBuf,
    pub channel: ChannelKind,
    pub channel_addr: String,
    /// Longest a single alert write may block.
    pub channel_write_timeout_ms: u64,
    pub face_confidence: f32,
    pub person_score: f32,
    pub person_max_results: usize,
    /// Cosine distance below which a gallery match is accepted.
    pub match_distance: f32,
    pub occupation_confidence: f32,
    pub occupation_labels: Vec<String>,
    pub known_cooldown_secs: u64,
    pub visitor_cooldown_secs: u64,
    pub idle_delay_secs: u64,
    pub capture_retry_secs: u64,
    pub model_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = default_data_dir();
        Self {
            frame_source: SourceKind::Camera,
            camera_device: "/dev/video0".to_string(),
            fixture_dir: PathBuf::from("fixtures"),
            warmup_frames: 4,
            model_dir: data_dir.join("models"),
            gallery_dir: data_dir.join("gallery"),
            channel: ChannelKind::Tcp,
            channel_addr: "127.0.0.1:5000".to_string(),
            channel_write_timeout_ms: 5000,
            face_confidence: 0.5,
            person_score: 0.25,
            person_max_results: 5,
            match_distance: 0.4,
            occupation_confidence: 0.7,
            occupation_labels: DEFAULT_OCCUPATION_LABELS.iter().map(|s| s.to_string()).collect(),
            known_cooldown_secs: 10,
            visitor_cooldown_secs: 5,
            idle_delay_secs: 5,
            capture_retry_secs: 5,
            model_timeout_ms: 2000,
        }
    }
}

fn default_data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("doorbell")
}

impl Config {
    /// Resolve every layer below the command line: defaults, the TOML file
    /// named by `path` or `DOORBELL_CONFIG`, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let env_path = std::env::var("DOORBELL_CONFIG").ok().map(PathBuf::from);
        let mut config = match path.map(Path::to_path_buf).or(env_path) {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    /// Overlay `DOORBELL_*` variables read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = &lookup;
        env_parse(lookup, "DOORBELL_FRAME_SOURCE", &mut self.frame_source);
        env_parse(lookup, "DOORBELL_CAMERA_DEVICE", &mut self.camera_device);
        env_parse(lookup, "DOORBELL_FIXTURE_DIR", &mut self.fixture_dir);
        env_parse(lookup, "DOORBELL_WARMUP_FRAMES", &mut self.warmup_frames);
        env_parse(lookup, "DOORBELL_MODEL_DIR", &mut self.model_dir);
        env_parse(lookup, "DOORBELL_GALLERY_DIR", &mut self.gallery_dir);
        env_parse(lookup, "DOORBELL_CHANNEL", &mut self.channel);
        env_parse(lookup, "DOORBELL_CHANNEL_ADDR", &mut self.channel_addr);
        env_parse(lookup, "DOORBELL_CHANNEL_WRITE_TIMEOUT_MS", &mut self.channel_write_timeout_ms);
        env_parse(lookup, "DOORBELL_FACE_CONFIDENCE", &mut self.face_confidence);
        env_parse(lookup, "DOORBELL_PERSON_SCORE", &mut self.person_score);
        env_parse(lookup, "DOORBELL_PERSON_MAX_RESULTS", &mut self.person_max_results);
        env_parse(lookup, "DOORBELL_MATCH_DISTANCE", &mut self.match_distance);
        env_parse(lookup, "DOORBELL_OCCUPATION_CONFIDENCE", &mut self.occupation_confidence);
        env_parse(lookup, "DOORBELL_KNOWN_COOLDOWN_SECS", &mut self.known_cooldown_secs);
        env_parse(lookup, "DOORBELL_VISITOR_COOLDOWN_SECS", &mut self.visitor_cooldown_secs);
        env_parse(lookup, "DOORBELL_IDLE_DELAY_SECS", &mut self.idle_delay_secs);
        env_parse(lookup, "DOORBELL_CAPTURE_RETRY_SECS", &mut self.capture_retry_secs);
        env_parse(lookup, "DOORBELL_MODEL_TIMEOUT_MS", &mut self.model_timeout_ms);

        // Comma-separated, e.g. "Fireman,Police Officer,Delivery Person".
        if let Some(labels) = lookup("DOORBELL_OCCUPATION_LABELS") {
            self.occupation_labels = labels
                .split(',')
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty())
                .collect();
        }
    }

    /// Point the daemon at a fixture directory instead of the camera.
    pub fn use_fixtures(&mut self, dir: PathBuf) {
        self.frame_source = SourceKind::Fixtures;
        self.fixture_dir = dir;
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let unit = |name: &str, v: f32| {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(ConfigError::Invalid(format!("{name} must be within 0..=1, got {v}")))
            }
        };
        unit("face_confidence", self.face_confidence)?;
        unit("person_score", self.person_score)?;
        unit("occupation_confidence", self.occupation_confidence)?;

        if !(self.match_distance > 0.0 && self.match_distance <= 2.0) {
            return Err(ConfigError::Invalid(format!(
                "match_distance must be within (0, 2], got {}",
                self.match_distance
            )));
        }
        if self.person_max_results == 0 {
            return Err(ConfigError::Invalid("person_max_results must be at least 1".into()));
        }
        if self.occupation_labels.is_empty() || self.occupation_labels.iter().any(|l| l.trim().is_empty()) {
            return Err(ConfigError::Invalid("occupation_labels must be non-empty names".into()));
        }
        if self.model_timeout_ms == 0 {
            return Err(ConfigError::Invalid("model_timeout_ms must be positive".into()));
        }
        if self.channel_write_timeout_ms == 0 {
            return Err(ConfigError::Invalid("channel_write_timeout_ms must be positive".into()));
        }
        if self.frame_source == SourceKind::Fixtures && !self.fixture_dir.is_dir() {
            return Err(ConfigError::Invalid(format!(
                "fixture_dir {} is not a directory",
                self.fixture_dir.display()
            )));
        }
        if self.channel == ChannelKind::Tcp && self.channel_addr.trim().is_empty() {
            return Err(ConfigError::Invalid("channel_addr is required for the tcp channel".into()));
        }
        Ok(())
    }

    pub fn policy(&self) -> CascadePolicy {
        CascadePolicy {
            match_distance: self.match_distance,
            occupation_confidence: self.occupation_confidence,
            known_cooldown: Duration::from_secs(self.known_cooldown_secs),
            visitor_cooldown: Duration::from_secs(self.visitor_cooldown_secs),
            idle_delay: Duration::from_secs(self.idle_delay_secs),
        }
    }

    pub fn capture_retry(&self) -> Duration {
        Duration::from_secs(self.capture_retry_secs)
    }

    pub fn model_timeout(&self) -> Duration {
        Duration::from_millis(self.model_timeout_ms)
    }

    pub fn channel_write_timeout(&self) -> Duration {
        Duration::from_millis(self.channel_write_timeout_ms)
    }

    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> PathBuf {
        self.model_dir.join("det_10g.onnx")
    }

    /// Path to the YOLO object detection model.
    pub fn yolo_model_path(&self) -> PathBuf {
        self.model_dir.join("yolov8n.onnx")
    }

    /// Path to the ArcFace recognition model.
    pub fn arcface_model_path(&self) -> PathBuf {
        self.model_dir.join("w600k_r50.onnx")
    }

    /// Path to the occupation classification model.
    pub fn occupation_model_path(&self) -> PathBuf {
        self.model_dir.join("occupation.onnx")
    }
}

/// Replace `slot` with the parsed value of `key`, keeping the current value
/// (with a warning) when the variable does not parse.
fn env_parse<T>(lookup: &dyn Fn(&str) -> Option<String>, key: &str, slot: &mut T)
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse() {
        Ok(value) => *slot = value,
        Err(e) => tracing::warn!(key, value = %raw, error = %e, "ignoring unparsable environment variable"),
    }
}
