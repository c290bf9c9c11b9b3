//! Module resolution for loader and config identifiers.
//!
//! Lookups are optional by nature: a module that is not installed resolves to
//! `None` and callers fall back to a bare identifier or skip the entry.

use std::fs;
use std::path::{Component, Path, PathBuf};

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

/// Resolves a module request (`babel-loader`, `@scope/pkg/sub/file`) to a path.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait ModuleResolver: Send + Sync {
    fn resolve(&self, request: &str) -> Option<PathBuf>;
}

/// Node-style resolution: look in `node_modules` of the base directory and
/// each of its ancestors.
#[derive(Debug, Clone)]
pub struct NodeModulesResolver {
    base_dir: PathBuf,
}

impl NodeModulesResolver {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn resolve_in(candidate: &Path) -> Option<PathBuf> {
        if candidate.is_file() {
            return Some(candidate.to_path_buf());
        }
        for ext in ["js", "json"] {
            let with_ext = append_extension(candidate, ext);
            if with_ext.is_file() {
                return Some(with_ext);
            }
        }
        if candidate.is_dir() {
            if let Some(main) = package_main(candidate) {
                let entry = candidate.join(main);
                if entry.is_file() {
                    return Some(entry);
                }
                let with_ext = append_extension(&entry, "js");
                if with_ext.is_file() {
                    return Some(with_ext);
                }
            }
            let index = candidate.join("index.js");
            if index.is_file() {
                return Some(index);
            }
        }
        None
    }
}

impl ModuleResolver for NodeModulesResolver {
    fn resolve(&self, request: &str) -> Option<PathBuf> {
        for dir in self.base_dir.ancestors() {
            let candidate = dir.join("node_modules").join(request);
            if let Some(found) = Self::resolve_in(&candidate) {
                tracing::debug!(request, path = %found.display(), "Resolved module");
                return Some(found);
            }
        }
        tracing::debug!(request, base_dir = %self.base_dir.display(), "Module not found");
        None
    }
}

fn append_extension(path: &Path, ext: &str) -> PathBuf {
    let mut raw = path.as_os_str().to_os_string();
    raw.push(".");
    raw.push(ext);
    PathBuf::from(raw)
}

fn package_main(dir: &Path) -> Option<String> {
    let raw = fs::read_to_string(dir.join("package.json")).ok()?;
    let manifest: serde_json::Value = serde_json::from_str(&raw).ok()?;
    manifest
        .get("main")
        .and_then(|m| m.as_str())
        .map(str::to_string)
}

/// Context directory for the shared-bundle reference plugin.
///
/// `core_dir` is the directory of the installed core package. Inside a
/// `node_modules` tree that is two levels up; in a source checkout the
/// `node_modules` directory two levels up.
pub fn dll_context(core_dir: &Path) -> PathBuf {
    let in_node_modules = core_dir
        .components()
        .any(|c| matches!(c, Component::Normal(name) if name == "node_modules"));
    let root = core_dir.join("..").join("..");
    if in_node_modules {
        root
    } else {
        root.join("node_modules")
    }
}
