//! Optional TOML configuration for the indexer CLI.
//!
//! ```toml
//! [clang]
//! args = ["-DFOO=1"]
//! include_paths = ["vendor/include"]
//!
//! [output]
//! db = "cf.db"
//! ```
//!
//! Everything is optional; command-line flags win over the file.

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub clang: ClangConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Default, Deserialize)]
pub struct ClangConfig {
    /// Extra front-end arguments applied to every compile (e.g. `-DFOO`).
    #[serde(default)]
    pub args: Vec<String>,
    /// Directories injected as `-I` flags, resolved relative to the config
    /// file's directory when not absolute.
    #[serde(default)]
    pub include_paths: Vec<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OutputConfig {
    /// Default database path.
    pub db: Option<PathBuf>,
}

impl Config {
    /// Flatten the front-end settings into an argument list.
    pub fn clang_args(&self, base_dir: &Path) -> Vec<String> {
        let mut args = self.clang.args.clone();
        for inc in &self.clang.include_paths {
            let dir = if inc.is_absolute() {
                inc.clone()
            } else {
                base_dir.join(inc)
            };
            let flag = format!("-I{}", dir.display());
            if !args.contains(&flag) {
                args.push(flag);
            }
        }
        args
    }
}

/// Load and parse a configuration file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let config: Config = toml::from_str(&content)
        .map_err(|e| anyhow::anyhow!("failed to parse config file {}: {}", path.display(), e))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_config() {
        let config: Config = toml::from_str(
            r#"
            [clang]
            args = ["-DFOO=1"]
            include_paths = ["/usr/include/odd", "vendor"]

            [output]
            db = "out.db"
            "#,
        )
        .unwrap();

        let args = config.clang_args(Path::new("/proj"));
        assert_eq!(
            args,
            vec!["-DFOO=1", "-I/usr/include/odd", "-I/proj/vendor"]
        );
        assert_eq!(config.output.db, Some(PathBuf::from("out.db")));
    }

    #[test]
    fn empty_config_is_fine() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.clang_args(Path::new(".")).is_empty());
        assert!(config.output.db.is_none());
    }

    #[test]
    fn load_reports_missing_file() {
        assert!(load_config(Path::new("/no/such/cdex.toml")).is_err());
    }
}
