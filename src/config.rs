use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::{fs, io};

use crate::fs_utils::get_partfetch_dir;

/// Persistent fetcher configuration. Fields are optional so that
/// unspecified values can fall back to code defaults.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Directory that downloaded files are placed in.
    pub base_dir: Option<PathBuf>,
    /// Manifest path or URL, used when none is given on the command line.
    pub manifest: Option<String>,
    pub required_groups: Option<Vec<String>>,
    pub max_attempts: Option<u32>,
    /// wait between retries in seconds (can be fractional)
    pub wait_between_retries_secs: Option<f64>,
    /// connect timeout in seconds (can be fractional)
    pub connect_timeout_secs: Option<f64>,
    /// longest wait for a single chunk, in seconds
    pub read_timeout_secs: Option<f64>,
    pub chunk_size: Option<usize>,
    pub user_agent: Option<String>,
    pub proxy: Option<String>,
    pub fail_fast: Option<bool>,
    pub verify_checksums: Option<bool>,
}

impl Config {
    /// Path to the config file inside the provided dir.
    pub fn config_path_for_dir<P: AsRef<Path>>(dir: P) -> PathBuf {
        let mut p = dir.as_ref().to_path_buf();
        p.push("config.toml");
        p
    }

    /// Load configuration from a TOML file.
    /// If file does not exist, returns Ok(Default::default()).
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Config, io::Error> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Config::default());
        }
        let s = fs::read_to_string(path)?;
        let cfg: Config =
            toml::from_str(&s).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(cfg)
    }

    /// Load configuration from the given directory's `config.toml`.
    pub fn load_from_dir<P: AsRef<Path>>(dir: P) -> Result<Config, io::Error> {
        Config::load_from_path(Config::config_path_for_dir(dir))
    }

    /// Explicit `path` if given, otherwise the per-user config in the data dir.
    pub fn load(path: Option<&Path>) -> Result<Config, io::Error> {
        match path {
            Some(path) => {
                if !path.exists() {
                    return Err(io::Error::new(
                        io::ErrorKind::NotFound,
                        format!("config file {} does not exist", path.display()),
                    ));
                }
                Config::load_from_path(path)
            }
            None => Config::load_from_dir(get_partfetch_dir()),
        }
    }

    /// Save configuration to `dir/config.toml`. Creates parent dir if needed.
    pub fn save_to_dir<P: AsRef<Path>>(&self, dir: P) -> Result<(), io::Error> {
        let cfg_path = Config::config_path_for_dir(dir);
        if let Some(p) = cfg_path.parent() {
            fs::create_dir_all(p)?;
        }
        let s = toml::to_string_pretty(&self).map_err(io::Error::other)?;
        fs::write(cfg_path, s)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        assert_eq!(Config::load_from_dir(dir.path()).unwrap(), Config::default());
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        let err = Config::load(Some(dir.path().join("nope.toml").as_path())).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let cfg = Config {
            base_dir: Some(PathBuf::from("/data/scannetpp")),
            required_groups: Some(vec!["Apartment_seq136".to_string()]),
            max_attempts: Some(5),
            wait_between_retries_secs: Some(2.5),
            fail_fast: Some(true),
            ..Default::default()
        };
        cfg.save_to_dir(dir.path().join("nested")).unwrap();
        let loaded = Config::load_from_dir(dir.path().join("nested")).unwrap();
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn test_partial_toml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        fs::write(&path, "max_attempts = 7\nread_timeout_secs = 60.0\n").unwrap();
        let cfg = Config::load(Some(path.as_path())).unwrap();
        assert_eq!(cfg.max_attempts, Some(7));
        assert_eq!(cfg.read_timeout_secs, Some(60.0));
        assert!(cfg.base_dir.is_none());
    }

    #[test]
    fn test_invalid_toml() {
        let dir = tempdir().unwrap();
        fs::write(Config::config_path_for_dir(dir.path()), "max_attempts = \"many\"").unwrap();
        let err = Config::load_from_dir(dir.path()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
