//! # Package manager integration (CLI <-> Core)
//!
//! This module wires the [`PackageManager`] trait from `storyforge-core` to a
//! real JavaScript project on disk.
//!
//! - Dist-tags and exact versions are looked up on the registry with `reqwest`
//!   (`GET <registry>/<name>/<tag>`, with a scoped name's `/` sent as `%2f`).
//! - Version ranges are delegated to `npm info` / `yarn info`.
//! - Installs run `npm install` / `yarn add`; with `skip_install` only
//!   `package.json` is rewritten.

use async_trait::async_trait;
use futures::future::try_join_all;
use regex::Regex;
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::OnceLock;
use tokio::process::Command;

use storyforge_core::config::InstallOptions;
use storyforge_core::contract::{
    split_package_spec, PackageJson, PackageManager, PackageManagerError, ScriptOptions,
};

pub const DEFAULT_REGISTRY: &str = "https://registry.npmjs.org";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageManagerKind {
    #[default]
    Npm,
    Yarn,
}

impl PackageManagerKind {
    pub fn executable(&self) -> &'static str {
        match self {
            PackageManagerKind::Npm => "npm",
            PackageManagerKind::Yarn => "yarn",
        }
    }

    fn install_args(&self, dev: bool) -> Vec<&'static str> {
        let mut args = match self {
            PackageManagerKind::Npm => vec!["install"],
            PackageManagerKind::Yarn => vec!["add"],
        };
        if dev {
            args.push("-D");
        }
        args
    }
}

impl fmt::Display for PackageManagerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.executable())
    }
}

impl FromStr for PackageManagerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "npm" => Ok(PackageManagerKind::Npm),
            "yarn" => Ok(PackageManagerKind::Yarn),
            other => Err(format!("unknown package manager: {other}")),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RegistryVersion {
    version: String,
}

/// Dist-tags (`latest`, `next`) and exact versions can be fetched directly;
/// anything else is a range.
fn is_registry_lookup(constraint: &str) -> bool {
    static DIRECT: OnceLock<Regex> = OnceLock::new();
    DIRECT
        .get_or_init(|| {
            Regex::new(r"^(?:[A-Za-z][\w.-]*|\d+\.\d+\.\d+(?:-[0-9A-Za-z.-]+)?)$")
                .expect("valid regex")
        })
        .is_match(constraint)
}

/// Latest version from `npm info --json` output: a single string or a list.
fn version_from_info(stdout: &str) -> Option<String> {
    match serde_json::from_str::<serde_json::Value>(stdout.trim()).ok()? {
        serde_json::Value::String(version) => Some(version),
        serde_json::Value::Array(versions) => versions
            .iter()
            .rev()
            .find_map(|v| v.as_str().map(str::to_string)),
        serde_json::Value::Object(yarn) => yarn
            .get("data")
            .and_then(|d| d.as_str())
            .map(str::to_string),
        _ => None,
    }
}

/// Registry path segment for a package: `@scope/name` becomes `@scope%2fname`.
fn registry_name(package: &str) -> String {
    if package.starts_with('@') {
        package.replacen('/', "%2f", 1)
    } else {
        package.to_string()
    }
}

pub struct JsPackageManager {
    kind: PackageManagerKind,
    project_dir: PathBuf,
    registry: String,
    client: reqwest::Client,
}

impl JsPackageManager {
    pub fn new(
        kind: PackageManagerKind,
        project_dir: impl Into<PathBuf>,
        registry: Option<String>,
    ) -> Self {
        let registry = registry
            .unwrap_or_else(|| DEFAULT_REGISTRY.to_string())
            .trim_end_matches('/')
            .to_string();
        let project_dir = project_dir.into();
        tracing::info!(
            package_manager = %kind,
            project_dir = %project_dir.display(),
            registry = %registry,
            "Initialized package manager"
        );
        Self {
            kind,
            project_dir,
            registry,
            client: reqwest::Client::new(),
        }
    }

    fn package_json_path(&self) -> PathBuf {
        self.project_dir.join("package.json")
    }

    fn write_package_json(&self, manifest: &PackageJson) -> Result<(), PackageManagerError> {
        let path = self.package_json_path();
        let rendered = serde_json::to_string_pretty(manifest).map_err(|source| {
            PackageManagerError::Manifest {
                path: path.clone(),
                source,
            }
        })?;
        std::fs::write(&path, format!("{rendered}\n"))
            .map_err(|source| PackageManagerError::Io { path: path.clone(), source })?;
        tracing::debug!(path = %path.display(), "Wrote package.json");
        Ok(())
    }

    async fn registry_version(
        &self,
        package: &str,
        tag: &str,
    ) -> Result<String, PackageManagerError> {
        let url = format!("{}/{}/{}", self.registry, registry_name(package), tag);
        tracing::debug!(%url, "Querying registry");
        let registry_err = |detail: String| PackageManagerError::Registry {
            package: package.to_string(),
            detail,
        };

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| registry_err(e.to_string()))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(PackageManagerError::NoMatchingVersion {
                package: package.to_string(),
                constraint: tag.to_string(),
            });
        }
        let response = response
            .error_for_status()
            .map_err(|e| registry_err(e.to_string()))?;
        let body: RegistryVersion = response
            .json()
            .await
            .map_err(|e| registry_err(e.to_string()))?;
        Ok(body.version)
    }

    async fn info_version(
        &self,
        package: &str,
        range: &str,
    ) -> Result<String, PackageManagerError> {
        let spec = format!("{package}@{range}");
        let stdout = self.run(&["info", spec.as_str(), "version", "--json"]).await?;
        version_from_info(&stdout).ok_or_else(|| PackageManagerError::NoMatchingVersion {
            package: package.to_string(),
            constraint: range.to_string(),
        })
    }

    async fn run(&self, args: &[&str]) -> Result<String, PackageManagerError> {
        let command = format!("{} {}", self.kind.executable(), args.join(" "));
        tracing::info!(%command, cwd = %self.project_dir.display(), "Running package manager");
        let output = Command::new(self.kind.executable())
            .args(args)
            .current_dir(&self.project_dir)
            .output()
            .await
            .map_err(|source| PackageManagerError::Io {
                path: PathBuf::from(self.kind.executable()),
                source,
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::error!(%command, status = %output.status, "Package manager command failed");
            return Err(PackageManagerError::Command {
                command,
                detail: format!("{}: {}", output.status, stderr.trim()),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl PackageManager for JsPackageManager {
    async fn get_versioned_packages(
        &self,
        packages: &[String],
    ) -> Result<Vec<String>, PackageManagerError> {
        let lookups = packages.iter().map(|spec| async move {
            let (name, constraint) = split_package_spec(spec);
            let version = self.get_version(name, constraint.unwrap_or("latest")).await?;
            Ok::<_, PackageManagerError>(format!("{name}@{version}"))
        });
        try_join_all(lookups).await
    }

    async fn get_version(
        &self,
        package: &str,
        constraint: &str,
    ) -> Result<String, PackageManagerError> {
        let version = if is_registry_lookup(constraint) {
            self.registry_version(package, constraint).await?
        } else {
            self.info_version(package, constraint).await?
        };
        tracing::info!(package, constraint, %version, "Resolved package version");
        Ok(format!("^{version}"))
    }

    fn retrieve_package_json(&self) -> Result<PackageJson, PackageManagerError> {
        let path = self.package_json_path();
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(
                    path = %path.display(),
                    "No package.json yet, starting from an empty manifest"
                );
                return Ok(PackageJson::default());
            }
            Err(source) => return Err(PackageManagerError::Io { path, source }),
        };
        serde_json::from_str(&raw).map_err(|source| PackageManagerError::Manifest { path, source })
    }

    async fn add_dependencies(
        &self,
        options: &InstallOptions,
        package_json: &PackageJson,
        dependencies: &[String],
    ) -> Result<(), PackageManagerError> {
        if options.skip_install {
            let mut manifest = package_json.clone();
            let section = if options.install_as_dev_dependencies {
                &mut manifest.dev_dependencies
            } else {
                &mut manifest.dependencies
            };
            for dependency in dependencies {
                let (name, version) = split_package_spec(dependency);
                section.insert(name.to_string(), version.unwrap_or("latest").to_string());
            }
            tracing::info!(count = dependencies.len(), "Recorded dependencies without installing");
            return self.write_package_json(&manifest);
        }

        let mut args = self.kind.install_args(options.install_as_dev_dependencies);
        args.extend(dependencies.iter().map(String::as_str));
        self.run(&args).await?;
        Ok(())
    }

    async fn add_storybook_command_in_scripts(
        &self,
        options: &ScriptOptions,
    ) -> Result<(), PackageManagerError> {
        let static_parameter = options
            .static_folder
            .as_deref()
            .map(|dir| format!(" -s {dir}"))
            .unwrap_or_default();

        let mut manifest = self.retrieve_package_json()?;
        manifest.scripts.insert(
            "storybook".into(),
            format!("start-storybook -p {}{static_parameter}", options.port).into(),
        );
        manifest.scripts.insert(
            "build-storybook".into(),
            format!("build-storybook{static_parameter}").into(),
        );
        self.write_package_json(&manifest)
    }
}
