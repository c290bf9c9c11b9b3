//! # contract: collaborator interfaces for the project generator
//!
//! The generator never talks to a package registry, spawns a process or
//! touches the filesystem itself. It goes through two traits:
//!
//! - [`PackageManager`]: version resolution and manifest/dependency writes.
//!   Async, implemented for npm and yarn in the `storyforge` crate.
//! - [`ProjectWriter`]: addon registration and template component copies.
//!   Sync, implemented on disk by [`crate::project::FsProject`].
//!
//! ## Mocking & Testing
//! Both traits are annotated for `mockall` (behind the `test-export-mocks`
//! feature) so consumers can assert on call order and arguments.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::config::{Framework, InstallOptions, SupportedLanguage};

/// The project manifest (`package.json`). Keys not modelled here are kept
/// in `extra` in their original order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageJson {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub scripts: Map<String, Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dev_dependencies: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PackageJson {
    /// Declared version range of `package` in either dependency section.
    pub fn declared_version(&self, package: &str) -> Option<&str> {
        self.dependencies
            .get(package)
            .or_else(|| self.dev_dependencies.get(package))
            .map(String::as_str)
    }

    pub fn has_dependency(&self, package: &str) -> bool {
        self.declared_version(package).is_some()
    }
}

/// Split `name@constraint` into its parts. Scoped names keep their leading `@`.
pub fn split_package_spec(spec: &str) -> (&str, Option<&str>) {
    let search_from = usize::from(spec.starts_with('@'));
    match spec[search_from..].find('@') {
        Some(idx) => {
            let at = idx + search_from;
            (&spec[..at], Some(&spec[at + 1..]))
        }
        None => (spec, None),
    }
}

/// Options for the run-script entry added to the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptOptions {
    pub port: u16,
    pub static_folder: Option<String>,
}

#[derive(Debug, Error)]
pub enum PackageManagerError {
    #[error("failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid package.json at {}: {source}", .path.display())]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("`{command}` failed: {detail}")]
    Command { command: String, detail: String },
    #[error("registry lookup for {package} failed: {detail}")]
    Registry { package: String, detail: String },
    #[error("no version of {package} matches {constraint}")]
    NoMatchingVersion { package: String, constraint: String },
}

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Unsupported framework: {0}")]
    UnsupportedFramework(Framework),
}

/// Resolves, installs and records the target project's JS dependencies.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait PackageManager: Send + Sync {
    /// Resolve each package to `name@version`, in input order.
    async fn get_versioned_packages(
        &self,
        packages: &[String],
    ) -> Result<Vec<String>, PackageManagerError>;

    /// Installable version (e.g. `^6.0.21`) of `package` matching `constraint`.
    /// `constraint` is a dist-tag such as `latest`, an exact version or a range.
    async fn get_version(
        &self,
        package: &str,
        constraint: &str,
    ) -> Result<String, PackageManagerError>;

    /// Read the project's current manifest.
    fn retrieve_package_json(&self) -> Result<PackageJson, PackageManagerError>;

    /// Add `dependencies` (`name@version` entries) to the project, either by
    /// running an install or, with `skip_install`, by writing the manifest.
    async fn add_dependencies(
        &self,
        options: &InstallOptions,
        package_json: &PackageJson,
        dependencies: &[String],
    ) -> Result<(), PackageManagerError>;

    /// Add the `storybook` and `build-storybook` scripts to the manifest.
    async fn add_storybook_command_in_scripts(
        &self,
        options: &ScriptOptions,
    ) -> Result<(), PackageManagerError>;
}

/// Writes generated files into the target project.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait ProjectWriter: Send + Sync {
    /// Register `addons` in the project's docs configuration.
    fn configure(&self, framework: Framework, addons: &[String]) -> Result<(), ProjectError>;

    /// Copy the framework's example components in the given language.
    fn copy_components(
        &self,
        framework: Framework,
        language: SupportedLanguage,
    ) -> Result<(), ProjectError>;
}
