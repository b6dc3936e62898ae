//! Environment constants and path utilities for MATist.
//!
//! This module centralizes environment variable names, directory names and
//! built-in defaults used throughout the application, making them easier to
//! maintain and modify.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main application directory name (hidden directory like .git, .vscode)
pub const MATIST_DIR_NAME: &str = ".matist";

/// Configuration file name
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Configuration file name looked up directly in the current directory
pub const LOCAL_CONFIG_FILE_NAME: &str = "matist.toml";

/// Directory holding persisted practical records
pub const RECORDS_DIR_NAME: &str = "records";

/// Environment variable names read at startup
pub mod vars {
    /// Primary provider credential
    pub const GEMINI_API_KEY: &str = "GEMINI_API_KEY";

    /// Primary provider model override
    pub const GEMINI_MODEL: &str = "GEMINI_MODEL";

    /// Fallback provider credential
    pub const OPENROUTER_API_KEY: &str = "OPENROUTER_API_KEY";

    /// Comma-separated fallback model candidates
    pub const OPENROUTER_MODEL: &str = "OPENROUTER_MODEL";

    /// Referer sent to the fallback provider
    pub const SITE_URL: &str = "SITE_URL";

    /// Result cache capacity override
    pub const CACHE_CAPACITY: &str = "MATIST_CACHE_CAPACITY";
}

/// Built-in defaults
pub mod defaults {
    use super::Duration;

    pub const PRIMARY_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
    pub const PRIMARY_MODEL: &str = "gemini-2.0-flash";
    pub const FALLBACK_BASE_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
    pub const FALLBACK_MODELS: &str = "google/gemini-2.0-flash-001";
    pub const SITE_URL: &str = "https://localhost:3000";
    pub const APP_TITLE: &str = "MATist";
    pub const COMPILER_URL: &str = "https://latexonline.cc/compile";

    pub const MAX_TOKENS: u32 = 8192;
    pub const TEMPERATURE: f32 = 0.7;

    pub const PRIMARY_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
    pub const PRIMARY_STREAM_TIMEOUT: Duration = Duration::from_secs(60);
    /// Wall-clock cap on all primary attempts plus backoff. Together with
    /// [`FALLBACK_REQUEST_TIMEOUT`] it must fit inside [`JOIN_TIMEOUT`].
    pub const PRIMARY_RETRY_BUDGET: Duration = Duration::from_secs(12);
    pub const FALLBACK_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
    pub const FALLBACK_STREAM_TIMEOUT: Duration = Duration::from_secs(60);
    pub const COMPILE_TIMEOUT: Duration = Duration::from_secs(45);

    pub const MAX_ATTEMPTS: u32 = 3;
    pub const BACKOFF_BASE: Duration = Duration::from_millis(500);
    pub const BACKOFF_MAX: Duration = Duration::from_secs(8);

    pub const JOIN_TIMEOUT: Duration = Duration::from_secs(30);
    pub const MIN_THEORY_CHARS: usize = 50;
    pub const MIN_THEORY_WORDS: usize = 20;
    pub const MIN_CODE_CHARS: usize = 20;
    pub const CACHE_CAPACITY: usize = 50;

    pub const TUTOR_MAX_MESSAGES: usize = 10;
    pub const TUTOR_CONTEXT_MESSAGES: usize = 5;
}

/// Test-related constants
pub mod test {
    /// Topic used across end-to-end tests
    pub const SAMPLE_TOPIC: &str = "Linear Convolution";
}

/// Build the main .matist directory path from a workspace root
pub fn matist_dir_path(workspace_root: &Path) -> PathBuf {
    workspace_root.join(MATIST_DIR_NAME)
}

/// Build the records directory path from a workspace root
pub fn records_dir_path(workspace_root: &Path) -> PathBuf {
    matist_dir_path(workspace_root).join(RECORDS_DIR_NAME)
}

/// Build a record file path
pub fn record_file_path(records_dir: &Path, record_id: &str) -> PathBuf {
    records_dir.join(format!("{}.json", record_id))
}

/// Build config directory path in user's home directory
pub fn user_config_dir_path(home_dir: &Path) -> PathBuf {
    home_dir.join(MATIST_DIR_NAME)
}

/// Build config file path in user's home directory
pub fn user_config_file_path(home_dir: &Path) -> PathBuf {
    user_config_dir_path(home_dir).join(CONFIG_FILE_NAME)
}

/// Build local config file path in current directory
pub fn local_config_file_path(current_dir: &Path) -> PathBuf {
    current_dir.join(MATIST_DIR_NAME).join(CONFIG_FILE_NAME)
}
