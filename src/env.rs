//! Environment constants and path utilities for the LLM client layer.
//!
//! This module centralizes the configuration file names, environment variable
//! names and shared-store key layout used throughout the crate, making them
//! easier to maintain and modify.

use std::path::{Path, PathBuf};

/// Application directory name (hidden directory like .git, .vscode)
pub const FINTRACK_DIR_NAME: &str = ".fintrack";

/// Configuration file name inside the application directory
pub const CONFIG_FILE_NAME: &str = "llm.toml";

/// Configuration file name looked up in the current directory
pub const LOCAL_CONFIG_FILE_NAME: &str = "fintrack-llm.toml";

/// Environment variables that override file configuration
pub mod vars {
    /// Name of the default provider
    pub const PROVIDER: &str = "FINTRACK_LLM_PROVIDER";

    pub const OLLAMA_BASE_URL: &str = "OLLAMA_BASE_URL";
    pub const OLLAMA_MODEL: &str = "OLLAMA_MODEL";

    pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";
    pub const OPENAI_BASE_URL: &str = "OPENAI_BASE_URL";
    pub const OPENAI_MODEL: &str = "OPENAI_MODEL";
}

/// Key layout in the shared key-value store
pub mod keys {
    /// Prefix for per-provider circuit state
    pub const CIRCUIT_BREAKER_PREFIX: &str = "circuit_breaker";

    /// Prefix for per-(provider, subject) rate windows
    pub const RATE_LIMIT_PREFIX: &str = "rate_limit";

    /// Prefix for cached generations
    pub const RESPONSE_CACHE_PREFIX: &str = "llm:response";

    /// Subject used when the caller does not identify one
    pub const ANONYMOUS_SUBJECT: &str = "anonymous";

    pub fn circuit_key(provider: &str) -> String {
        format!("{}:{}", CIRCUIT_BREAKER_PREFIX, provider)
    }

    pub fn rate_limit_key(provider: &str, subject: &str) -> String {
        format!("{}:{}:{}", RATE_LIMIT_PREFIX, provider, subject)
    }

    pub fn response_cache_key(fingerprint: &str) -> String {
        format!("{}:{}", RESPONSE_CACHE_PREFIX, fingerprint)
    }
}

/// Build the application directory path from a base directory
pub fn fintrack_dir_path(base: &Path) -> PathBuf {
    base.join(FINTRACK_DIR_NAME)
}

/// Build config file path in user's home directory
pub fn user_config_file_path(home_dir: &Path) -> PathBuf {
    fintrack_dir_path(home_dir).join(CONFIG_FILE_NAME)
}

/// Build local config file path in the application directory of `current_dir`
pub fn local_config_file_path(current_dir: &Path) -> PathBuf {
    fintrack_dir_path(current_dir).join(CONFIG_FILE_NAME)
}

/// Build system-wide config file path
#[cfg(unix)]
pub fn system_config_file_path() -> PathBuf {
    PathBuf::from("/etc/fintrack").join(CONFIG_FILE_NAME)
}
