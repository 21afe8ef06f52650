//! Decides which source locations are worth recording

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::runtime::RuntimeLayout;

/// Inclusion policy for traced source files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Trace the runtime's own standard library
    pub include_stdlib: bool,
    /// Trace third-party installed packages
    pub include_site_packages: bool,
    /// Packages that are always traced, whatever the two flags say
    pub include_packages: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            include_stdlib: false,
            include_site_packages: true,
            include_packages: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PathFilter {
    include_dirs: Vec<PathBuf>,
    ignore_dirs: Vec<PathBuf>,
    site_packages_dir: Option<PathBuf>,
    stdlib_dirs: Vec<PathBuf>,
    include_site_packages: bool,
    include_stdlib: bool,
}

impl PathFilter {
    /// Resolve every configured directory once, up front.
    pub fn new(config: &FilterConfig, layout: &RuntimeLayout) -> Self {
        let mut include_dirs = Vec::new();
        for name in &config.include_packages {
            match layout.find_package(name) {
                Some(dir) => {
                    let dir = canonicalize(dir);
                    tracing::debug!(package = %name, dir = %dir.display(), "including package");
                    include_dirs.push(dir);
                }
                None => {
                    tracing::info!(package = %name, "could not find package to include it");
                }
            }
        }

        let ignore_dirs: Vec<PathBuf> = layout
            .instrumentation_dirs
            .iter()
            .map(|dir| canonicalize(dir))
            .collect();
        for dir in &ignore_dirs {
            tracing::debug!(dir = %dir.display(), "ignoring instrumentation directory");
        }

        let stdlib_dirs = if config.include_stdlib {
            tracing::debug!("including stdlib");
            Vec::new()
        } else {
            layout.stdlib_dirs.iter().map(|dir| canonicalize(dir)).collect()
        };

        Self {
            include_dirs,
            ignore_dirs,
            site_packages_dir: layout.site_packages_dir.as_deref().map(canonicalize),
            stdlib_dirs,
            include_site_packages: config.include_site_packages,
            include_stdlib: config.include_stdlib,
        }
    }

    pub fn should_ignore(&self, filename: &str) -> bool {
        if is_synthetic(filename) {
            return true;
        }
        let path = canonicalize(Path::new(filename));

        if self.include_dirs.iter().any(|dir| path.starts_with(dir)) {
            return false;
        }
        if self.ignore_dirs.iter().any(|dir| path.starts_with(dir)) {
            return true;
        }
        // Site-packages usually sits inside a stdlib root, so it is decided
        // here before the stdlib check can claim it.
        if let Some(site) = &self.site_packages_dir {
            if path.starts_with(site) {
                return !self.include_site_packages;
            }
        }
        if !self.include_stdlib && self.stdlib_dirs.iter().any(|dir| path.starts_with(dir)) {
            return true;
        }
        false
    }
}

/// Empty names and interpreter-made locations such as `<string>`
pub fn is_synthetic(filename: &str) -> bool {
    let trimmed = filename.trim();
    trimmed.is_empty() || (trimmed.starts_with('<') && trimmed.ends_with('>'))
}

/// Absolute, symlink-resolved form of a path.
///
/// Paths that do not exist are made absolute and normalized lexically.
pub fn canonicalize(path: &Path) -> PathBuf {
    if let Ok(resolved) = std::fs::canonicalize(path) {
        return resolved;
    }
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    normalize(&absolute)
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
