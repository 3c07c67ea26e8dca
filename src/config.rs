use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

fn default_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    pub backend: BackendConfig,
    pub window: WindowConfig,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct BackendConfig {
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub min_width: u32,
    pub min_height: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            backend: BackendConfig {
                base_url: "http://localhost:8000".to_string(),
                timeout_secs: 120,
            },
            window: WindowConfig {
                width: 1100,
                height: 760,
                min_width: 640,
                min_height: 480,
            },
        }
    }
}

impl Config {
    pub fn load() -> Self {
        let config_path = Self::get_config_path();

        if config_path.exists() {
            match fs::read_to_string(&config_path) {
                Ok(contents) => {
                    match toml::from_str(&contents) {
                        Ok(config) => return config,
                        Err(e) => eprintln!("Error parsing config.toml: {}. Using defaults.", e),
                    }
                }
                Err(e) => eprintln!("Error reading config.toml: {}. Using defaults.", e),
            }
        } else {
            // Create config directory if it doesn't exist
            if let Some(parent) = config_path.parent() {
                let _ = fs::create_dir_all(parent);
            }
        }

        Config::default()
    }

    pub fn get_config_path() -> PathBuf {
        if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home).join(".config/ragdesk/config.toml")
        } else {
            PathBuf::from("config.toml")
        }
    }

    #[allow(dead_code)]
    pub fn get_config_dir() -> PathBuf {
        if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home).join(".config/ragdesk")
        } else {
            PathBuf::from(".")
        }
    }
}
