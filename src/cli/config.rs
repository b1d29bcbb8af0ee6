//! Configuration discovery and loading
//!
//! This module handles the configuration discovery hierarchy:
//! 1. Current directory: ./fintrack-llm.toml or ./.fintrack/llm.toml
//! 2. User config: ~/.fintrack/llm.toml
//! 3. System config: /etc/fintrack/llm.toml
//! 4. Built-in defaults
//!
//! Environment variables are applied on top of whichever source wins.

use crate::env::{self, vars};
use crate::llm::{LlmConfig, ProviderConfig, ProviderKind};
use anyhow::{Context, Result};
use std::env as std_env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

impl LlmConfig {
    /// Load configuration from a TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        Self::from_toml_str(&content).with_context(|| format!("Invalid config file {:?}", path))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: LlmConfig = toml::from_str(content).context("Failed to parse TOML config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    /// Save configuration to a TOML file
    pub fn to_toml_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = self.to_toml_string()?;
        fs::write(path.as_ref(), content)
            .with_context(|| format!("Failed to write config file {:?}", path.as_ref()))?;
        Ok(())
    }

    /// Reject configurations no client could be built from.
    pub fn validate(&self) -> Result<()> {
        self.provider
            .parse::<ProviderKind>()
            .with_context(|| format!("Invalid default provider '{}'", self.provider))?;
        for name in self.providers.keys() {
            name.parse::<ProviderKind>()
                .with_context(|| format!("Unknown provider section [providers.{}]", name))?;
        }
        if self.rate_limit.window.is_zero() {
            anyhow::bail!("rate_limit.window_minutes must be greater than zero");
        }
        Ok(())
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std_env::var(name).ok());
    }

    /// Apply overrides from `lookup`; blank values are ignored.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(provider) = get(vars::PROVIDER) {
            debug!("Default provider overridden by {}", vars::PROVIDER);
            self.provider = provider.trim().to_lowercase();
        }

        let overrides: [(ProviderKind, &str, fn(&mut ProviderConfig, String)); 5] = [
            (
                ProviderKind::Ollama,
                vars::OLLAMA_BASE_URL,
                |c: &mut ProviderConfig, v: String| c.base_url = Some(v),
            ),
            (
                ProviderKind::Ollama,
                vars::OLLAMA_MODEL,
                |c: &mut ProviderConfig, v: String| c.model = Some(v),
            ),
            (
                ProviderKind::OpenAI,
                vars::OPENAI_API_KEY,
                |c: &mut ProviderConfig, v: String| c.api_key = Some(v),
            ),
            (
                ProviderKind::OpenAI,
                vars::OPENAI_BASE_URL,
                |c: &mut ProviderConfig, v: String| c.base_url = Some(v),
            ),
            (
                ProviderKind::OpenAI,
                vars::OPENAI_MODEL,
                |c: &mut ProviderConfig, v: String| c.model = Some(v),
            ),
        ];
        for (kind, name, apply) in overrides {
            if let Some(value) = get(name) {
                debug!("[providers.{}] overridden by {}", kind, name);
                apply(self.providers.entry(kind.as_str().to_string()).or_default(), value);
            }
        }
    }
}

/// Configuration discovery system
pub struct ConfigDiscovery;

impl ConfigDiscovery {
    /// Load `explicit` if given, otherwise discover through the hierarchy,
    /// then apply environment overrides.
    pub fn load(explicit: Option<&Path>) -> Result<LlmConfig> {
        let mut config = match explicit {
            Some(path) => {
                info!("Loading configuration from: {:?}", path);
                LlmConfig::from_toml_file(path)?
            }
            None => Self::discover_config()?,
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Discover and load configuration using the hierarchy
    pub fn discover_config() -> Result<LlmConfig> {
        if let Some(config_path) = Self::find_config_file() {
            info!("Loading configuration from: {:?}", config_path);
            return LlmConfig::from_toml_file(config_path);
        }

        info!("No configuration file found, using defaults");
        Ok(LlmConfig::default())
    }

    /// Find configuration file using discovery hierarchy
    pub fn find_config_file() -> Option<PathBuf> {
        Self::first_existing(Self::get_config_candidates())
    }

    fn first_existing(candidates: Vec<PathBuf>) -> Option<PathBuf> {
        for candidate in candidates {
            debug!("Checking for config file: {:?}", candidate);
            if candidate.is_file() {
                debug!("Found config file: {:?}", candidate);
                return Some(candidate);
            }
        }

        debug!("No config file found in discovery hierarchy");
        None
    }

    /// Get list of configuration file candidates in priority order
    fn get_config_candidates() -> Vec<PathBuf> {
        Self::candidates_for(
            std_env::current_dir().ok().as_deref(),
            Self::get_home_dir().as_deref(),
        )
    }

    fn candidates_for(current_dir: Option<&Path>, home_dir: Option<&Path>) -> Vec<PathBuf> {
        let mut candidates = Vec::new();

        if let Some(current_dir) = current_dir {
            candidates.push(current_dir.join(env::LOCAL_CONFIG_FILE_NAME));
            candidates.push(env::local_config_file_path(current_dir));
        }

        if let Some(home_dir) = home_dir {
            candidates.push(env::user_config_file_path(home_dir));
        }

        #[cfg(unix)]
        candidates.push(env::system_config_file_path());

        candidates
    }

    /// Get home directory path
    fn get_home_dir() -> Option<PathBuf> {
        std_env::var("HOME")
            .ok()
            .or_else(|| std_env::var("USERPROFILE").ok())
            .map(PathBuf::from)
    }

    /// Create a default config file in the user's home directory
    pub fn create_default_user_config() -> Result<PathBuf> {
        let home_dir = Self::get_home_dir().context("Could not determine home directory")?;
        Self::create_default_config_in(&home_dir)
    }

    fn create_default_config_in(home_dir: &Path) -> Result<PathBuf> {
        let config_dir = env::fintrack_dir_path(home_dir);
        let config_path = env::user_config_file_path(home_dir);

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create {:?}", config_dir))?;
            info!("Created configuration directory: {:?}", config_dir);
        }

        if !config_path.exists() {
            LlmConfig::default().to_toml_file(&config_path)?;
            info!("Created default configuration file: {:?}", config_path);
        } else {
            warn!("Configuration file already exists: {:?}", config_path);
        }

        Ok(config_path)
    }

    /// Show configuration discovery information for debugging
    pub fn show_discovery_info() {
        println!("Configuration Discovery Hierarchy:");
        println!();

        let candidates = Self::get_config_candidates();
        for (i, candidate) in candidates.iter().enumerate() {
            let status = if candidate.exists() {
                if candidate.is_file() {
                    "✓ EXISTS"
                } else {
                    "✗ NOT A FILE"
                }
            } else {
                "✗ NOT FOUND"
            };

            println!("  {}. {:?} - {}", i + 1, candidate, status);
        }

        println!();
        if let Some(found) = Self::find_config_file() {
            println!("Active configuration: {:?}", found);
        } else {
            println!("Active configuration: Built-in defaults");
        }

        println!();
        println!("Environment overrides:");
        for name in [
            vars::PROVIDER,
            vars::OLLAMA_BASE_URL,
            vars::OLLAMA_MODEL,
            vars::OPENAI_API_KEY,
            vars::OPENAI_BASE_URL,
            vars::OPENAI_MODEL,
        ] {
            let state = if std_env::var(name).is_ok_and(|v| !v.trim().is_empty()) {
                "set"
            } else {
                "unset"
            };
            println!("  {} - {}", name, state);
        }
    }
}
