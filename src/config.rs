// src/config.rs

//! Configuration loading
//!
//! The configuration is a JSON document with an `options` object and a
//! `repository` array. Each repository names a pacman-style mirrorlist from
//! which the mirror and server URLs are derived.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "/etc/archdeps/config.json";

/// Contributed-source RPC endpoint
pub const AUR_RPC_URL: &str = "https://aur.archlinux.org/rpc/v5";

fn default_arch() -> String {
    "x86_64".to_string()
}

fn default_parallel() -> usize {
    4
}

fn default_retry() -> u32 {
    3
}

fn default_timeout() -> u64 {
    30
}

fn default_db() -> PathBuf {
    PathBuf::from("/var/lib/pacman/sync")
}

fn default_local() -> PathBuf {
    PathBuf::from("/var/lib/pacman/local")
}

/// The `options` object
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Options {
    #[serde(default = "default_arch")]
    pub arch: String,

    /// Worker threads in the sync pool
    #[serde(default = "default_parallel")]
    pub parallel: usize,

    /// Attempts per network request
    #[serde(default = "default_retry")]
    pub retry: u32,

    /// Seconds before a network request gives up
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Query the contributed source during search
    #[serde(default)]
    pub aur: bool,

    /// Directory holding the cached `<repo>.db` archives
    #[serde(default = "default_db")]
    pub db: PathBuf,

    /// Installed-package tree
    #[serde(default = "default_local")]
    pub local: PathBuf,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            arch: default_arch(),
            parallel: default_parallel(),
            retry: default_retry(),
            timeout: default_timeout(),
            aur: false,
            db: default_db(),
            local: default_local(),
        }
    }
}

impl Options {
    /// Bounded job-queue capacity
    pub fn queue_capacity(&self) -> usize {
        self.parallel.max(1) * 2
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

/// One entry of the `repository` array as written in the file
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RepositoryEntry {
    pub name: String,
    /// Mirrorlist file
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    options: Options,
    #[serde(default)]
    repository: Vec<RepositoryEntry>,
}

/// A configured upstream repository with its mirrors resolved
#[derive(Debug, Clone, PartialEq)]
pub struct Repository {
    pub name: String,
    /// Directory URLs with `$repo` and `$arch` substituted
    pub mirrors: Vec<String>,
    /// Mirror roots, each URL cut before its first variable
    pub servers: Vec<String>,
}

impl Repository {
    /// URL of `file` on the mirror at `index`
    pub fn mirror_url(&self, index: usize, file: &str) -> Option<String> {
        self.mirrors
            .get(index)
            .map(|m| format!("{}/{}", m.trim_end_matches('/'), file))
    }
}

/// Fully loaded configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub options: Options,
    pub repositories: Vec<Repository>,
}

impl Config {
    /// Load the configuration file, prefixing every directory with `root`
    pub fn load(path: &Path, root: Option<&Path>) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            Error::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let mut config = Self::from_json(&text)?;
        if let Some(root) = root {
            config.options.db = with_root(root, &config.options.db);
            config.options.local = with_root(root, &config.options.local);
        }
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse a configuration document and read every mirrorlist it names
    pub fn from_json(text: &str) -> Result<Self> {
        let raw: RawConfig = serde_json::from_str(text)
            .map_err(|e| Error::ConfigError(format!("Invalid configuration: {}", e)))?;

        let mut options = raw.options;
        if options.parallel == 0 {
            return Err(Error::ConfigError("options.parallel must be at least 1".to_string()));
        }
        options.db = expand_home(&options.db)?;
        options.local = expand_home(&options.local)?;

        let repositories = raw
            .repository
            .iter()
            .map(|entry| {
                let path = expand_home(&entry.path)?;
                let text = fs::read_to_string(&path).map_err(|e| {
                    Error::ConfigError(format!(
                        "Unable to open mirrorlist {} for {}: {}",
                        path.display(),
                        entry.name,
                        e
                    ))
                })?;
                parse_mirrorlist(&text, &entry.name, &options.arch)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            options,
            repositories,
        })
    }
}

/// Read the `Server = <url>` lines of a mirrorlist
pub fn parse_mirrorlist(text: &str, repo: &str, arch: &str) -> Result<Repository> {
    let mut mirrors = Vec::new();
    let mut servers = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        if line.starts_with('#') {
            continue;
        }
        let Some(rest) = line.strip_prefix("Server") else {
            continue;
        };
        let Some(url) = rest.trim_start().strip_prefix('=') else {
            continue;
        };
        let url = url.trim();

        mirrors.push(substitute(url, repo, arch)?);
        servers.push(server_root(url)?);
    }

    Ok(Repository {
        name: repo.to_string(),
        mirrors,
        servers,
    })
}

fn substitute(url: &str, repo: &str, arch: &str) -> Result<String> {
    let mut out = String::with_capacity(url.len());
    let mut rest = url;
    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let var = &rest[pos..];
        if let Some(tail) = var.strip_prefix("$repo") {
            out.push_str(repo);
            rest = tail;
        } else if let Some(tail) = var.strip_prefix("$arch") {
            out.push_str(arch);
            rest = tail;
        } else {
            return Err(Error::ConfigError(format!("Unknown variable in mirror {}", url)));
        }
    }
    out.push_str(rest);
    Ok(out)
}

fn server_root(url: &str) -> Result<String> {
    match url.find('$') {
        Some(pos) if pos > 1 => Ok(url[..pos].trim_end_matches('/').to_string()),
        _ => Err(Error::ConfigError(format!("Mirror {} has no repository variable", url))),
    }
}

fn expand_home(path: &Path) -> Result<PathBuf> {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .ok_or_else(|| Error::ConfigError("Cannot determine home directory".to_string())),
        Err(_) => Ok(path.to_path_buf()),
    }
}

fn with_root(root: &Path, path: &Path) -> PathBuf {
    root.join(path.strip_prefix("/").unwrap_or(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    const MIRRORLIST: &str = "\
## Worldwide
#Server = https://disabled.example.org/$repo/os/$arch
Server = https://geo.mirror.pkgbuild.com/$repo/os/$arch
  Server=https://mirror.example.net/archlinux/$repo/os/$arch

Include = /etc/pacman.d/other
";

    #[test]
    fn test_parse_mirrorlist() {
        let repo = parse_mirrorlist(MIRRORLIST, "core", "x86_64").unwrap();
        assert_eq!(
            repo.mirrors,
            vec![
                "https://geo.mirror.pkgbuild.com/core/os/x86_64",
                "https://mirror.example.net/archlinux/core/os/x86_64",
            ]
        );
        assert_eq!(
            repo.servers,
            vec!["https://geo.mirror.pkgbuild.com", "https://mirror.example.net/archlinux"]
        );
        assert_eq!(
            repo.mirror_url(1, "core.db").as_deref(),
            Some("https://mirror.example.net/archlinux/core/os/x86_64/core.db")
        );
        assert_eq!(repo.mirror_url(2, "core.db"), None);
    }

    #[test]
    fn test_unknown_variable() {
        let err = parse_mirrorlist("Server = https://m.org/$repo/$branch", "core", "x86_64");
        assert!(matches!(err, Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_json("{}").unwrap();
        assert_eq!(config.options.parallel, 4);
        assert_eq!(config.options.queue_capacity(), 8);
        assert_eq!(config.options.retry, 3);
        assert_eq!(config.options.timeout(), Duration::from_secs(30));
        assert!(!config.options.aur);
        assert!(config.repositories.is_empty());
    }

    #[test]
    fn test_pacman_style_keys_ignored() {
        let text = r#"{ "options": { "cache": "/var/cache/pacman/pkg", "db": "/srv/sync" } }"#;
        let config = Config::from_json(text).unwrap();
        assert_eq!(config.options.db, PathBuf::from("/srv/sync"));
        assert_eq!(config.options, Options { db: PathBuf::from("/srv/sync"), ..Options::default() });
    }

    #[test]
    fn test_load_with_root() {
        let dir = TempDir::new().unwrap();
        let mirrorlist = dir.path().join("mirrorlist");
        fs::write(&mirrorlist, MIRRORLIST).unwrap();

        let config_path = dir.path().join("config.json");
        let mut file = fs::File::create(&config_path).unwrap();
        write!(
            file,
            r#"{{
                "options": {{ "arch": "aarch64", "parallel": 2, "aur": true, "db": "/var/lib/pacman/sync" }},
                "repository": [ {{ "name": "extra", "path": "{}" }} ]
            }}"#,
            mirrorlist.display()
        )
        .unwrap();

        let config = Config::load(&config_path, Some(Path::new("/mnt/sysroot"))).unwrap();
        assert_eq!(config.options.parallel, 2);
        assert!(config.options.aur);
        assert_eq!(config.options.db, PathBuf::from("/mnt/sysroot/var/lib/pacman/sync"));
        assert_eq!(config.options.local, PathBuf::from("/mnt/sysroot/var/lib/pacman/local"));
        assert_eq!(config.repositories.len(), 1);
        assert_eq!(
            config.repositories[0].mirrors[0],
            "https://geo.mirror.pkgbuild.com/extra/os/aarch64"
        );
    }

    #[test]
    fn test_missing_mirrorlist() {
        let text = r#"{ "repository": [ { "name": "core", "path": "/nonexistent/mirrorlist" } ] }"#;
        assert!(matches!(Config::from_json(text), Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_wrong_type() {
        assert!(Config::from_json(r#"{ "options": { "parallel": "four" } }"#).is_err());
        assert!(Config::from_json(r#"{ "options": { "parallel": 0 } }"#).is_err());
    }

    #[test]
    fn test_home_expansion() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home(Path::new("~/db")).unwrap(), home.join("db"));
        }
        assert_eq!(expand_home(Path::new("/abs")).unwrap(), PathBuf::from("/abs"));
    }
}
