//! TOML configuration file loading
//!
//! Supports `~/.config/ferris/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::PathBuf;

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct FerrisConfigFile {
    /// Skills root directory
    #[serde(default)]
    pub skills_dir: Option<String>,

    /// Enable spoken built-in commands
    #[serde(default)]
    pub enable_builtins: Option<bool>,

    /// Per-event skill handler timeout in milliseconds
    #[serde(default)]
    pub handler_timeout_ms: Option<u64>,

    /// Wake word configuration
    #[serde(default)]
    pub wake: WakeFileConfig,

    /// Recognition gating configuration
    #[serde(default)]
    pub recognition: RecognitionFileConfig,

    /// Speech synthesis configuration
    #[serde(default)]
    pub speech: SpeechFileConfig,
}

/// Wake word configuration
#[derive(Debug, Default, Deserialize)]
pub struct WakeFileConfig {
    /// Wake phrase (empty disables wake handling)
    pub phrase: Option<String>,

    /// Wake timeout in milliseconds
    pub timeout_ms: Option<u64>,

    /// Phrase spoken on wake (empty disables)
    pub reply: Option<String>,
}

/// Recognition gating configuration
#[derive(Debug, Default, Deserialize)]
pub struct RecognitionFileConfig {
    pub noise_threshold: Option<f64>,
    pub match_threshold: Option<i32>,
    pub stable_after_ms: Option<u64>,
    pub restart_after_ms: Option<u64>,
    pub listen_while_speaking: Option<bool>,
}

/// Speech synthesis configuration
#[derive(Debug, Default, Deserialize)]
pub struct SpeechFileConfig {
    /// Command line, e.g. `"espeak -m"`
    pub command: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `FerrisConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> FerrisConfigFile {
    let Some(path) = config_file_path() else {
        return FerrisConfigFile::default();
    };

    if !path.exists() {
        return FerrisConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                FerrisConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            FerrisConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/ferris/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("ferris").join("config.toml"))
}
