//! Base project generator: installs the docs tooling into an existing project.
//!
//! Steps run strictly in order, each one reading what the previous one wrote:
//!   1. resolve framework options over their defaults
//!   2. compute the package list and resolve versions
//!   3. register addons, then copy template components (if enabled)
//!   4. read the manifest and work out transpiler dependencies
//!   5. add all dependencies, then the run scripts (if enabled)
//!
//! # Error Handling
//! Any failing step returns immediately. Nothing is retried and earlier
//! writes (e.g. the addon registration) are not rolled back.

use thiserror::Error;
use tracing::{debug, error, info};

use crate::config::{
    Framework, FrameworkOptions, GeneratorOptions, InstallOptions, ResolvedFrameworkOptions,
};
use crate::contract::{
    PackageJson, PackageManager, PackageManagerError, ProjectError, ProjectWriter, ScriptOptions,
};

/// Addons every generated project registers.
pub const BASE_ADDONS: [&str; 3] = [
    "@storybook/addon-links",
    "@storybook/addon-actions",
    "@storybook/addon-essentials",
];

/// Peer dependencies of the base addons that must be installed explicitly.
pub const PEER_DEPENDENCIES: [&str; 1] = ["react-is"];

pub const STORYBOOK_PORT: u16 = 6006;

const BABEL_LOADER_RANGE: &str = "^8.0.0-0";
const LEGACY_BABEL_LOADER_RANGE: &str = "^7.0.0";

#[derive(Debug, Error)]
pub enum ScaffoldError {
    #[error("package manager: {0}")]
    PackageManager(#[from] PackageManagerError),
    #[error("project files: {0}")]
    Project(#[from] ProjectError),
}

/// What a generator run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaffoldReport {
    pub framework: Framework,
    pub addons: Vec<String>,
    pub dependencies: Vec<String>,
    pub components_copied: bool,
    pub scripts_added: bool,
}

/// Packages to install: the framework package, base addons, extra packages,
/// extra addons and peer dependencies. Empty names are dropped; duplicates
/// are kept.
pub fn required_packages(framework: Framework, options: &ResolvedFrameworkOptions) -> Vec<String> {
    std::iter::once(framework.package_name())
        .chain(BASE_ADDONS.iter().map(|a| a.to_string()))
        .chain(options.extra_packages.iter().cloned())
        .chain(options.extra_addons.iter().cloned())
        .chain(PEER_DEPENDENCIES.iter().map(|p| p.to_string()))
        .filter(|name| !name.is_empty())
        .collect()
}

/// Addons to register in the project configuration.
pub fn registered_addons(options: &ResolvedFrameworkOptions) -> Vec<String> {
    BASE_ADDONS
        .iter()
        .map(|a| a.to_string())
        .chain(options.extra_addons.iter().cloned())
        .collect()
}

fn major_version(range: &str) -> Option<u64> {
    let digits: String = range
        .trim_start_matches(|c: char| !c.is_ascii_digit())
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

/// Transpiler packages the project is missing, as `name@version` entries.
pub async fn babel_dependencies<P>(
    package_manager: &P,
    package_json: &PackageJson,
) -> Result<Vec<String>, PackageManagerError>
where
    P: PackageManager + ?Sized,
{
    let mut dependencies = Vec::new();
    let mut babel_loader_range = BABEL_LOADER_RANGE;

    match package_json.declared_version("babel-core") {
        None => {
            if !package_json.has_dependency("@babel/core") {
                let version = package_manager.get_version("@babel/core", "latest").await?;
                dependencies.push(format!("@babel/core@{version}"));
            }
        }
        Some(declared) => {
            if major_version(declared) == Some(6) {
                debug!(declared, "Babel 6 project, using babel-loader 7");
                babel_loader_range = LEGACY_BABEL_LOADER_RANGE;
            }
        }
    }

    if !package_json.has_dependency("babel-loader") {
        let version = package_manager
            .get_version("babel-loader", babel_loader_range)
            .await?;
        dependencies.push(format!("babel-loader@{version}"));
    }

    Ok(dependencies)
}

/// Run the generator for `framework` against the given collaborators.
pub async fn scaffold<P, W>(
    package_manager: &P,
    project: &W,
    install_options: &InstallOptions,
    generator_options: &GeneratorOptions,
    framework: Framework,
    framework_options: &FrameworkOptions,
) -> Result<ScaffoldReport, ScaffoldError>
where
    P: PackageManager + ?Sized,
    W: ProjectWriter + ?Sized,
{
    info!(%framework, language = ?generator_options.language, "[INIT] Starting generator");
    let options = framework_options.resolve();
    options.trace_loaded();

    let packages = required_packages(framework, &options);
    info!(count = packages.len(), "[INIT] Resolving package versions");
    let versioned = package_manager
        .get_versioned_packages(&packages)
        .await
        .map_err(|e| {
            error!(error = %e, "[INIT][ERROR] Version resolution failed");
            e
        })?;
    debug!(?versioned, "[INIT] Resolved packages");

    let addons = registered_addons(&options);
    project.configure(framework, &addons).map_err(|e| {
        error!(error = %e, "[INIT][ERROR] Registering addons failed");
        e
    })?;
    info!(addons = addons.len(), "[INIT] Registered addons");

    if options.add_components {
        project
            .copy_components(framework, generator_options.language)
            .map_err(|e| {
                error!(error = %e, "[INIT][ERROR] Copying template components failed");
                e
            })?;
        info!("[INIT] Copied template components");
    }

    let package_json = package_manager.retrieve_package_json().map_err(|e| {
        error!(error = %e, "[INIT][ERROR] Reading package.json failed");
        e
    })?;
    let babel = babel_dependencies(package_manager, &package_json)
        .await
        .map_err(|e| {
            error!(error = %e, "[INIT][ERROR] Resolving transpiler dependencies failed");
            e
        })?;
    if !babel.is_empty() {
        info!(?babel, "[INIT] Adding transpiler dependencies");
    }

    let mut dependencies = versioned;
    dependencies.extend(babel);
    package_manager
        .add_dependencies(install_options, &package_json, &dependencies)
        .await
        .map_err(|e| {
            error!(error = %e, "[INIT][ERROR] Adding dependencies failed");
            e
        })?;
    info!(count = dependencies.len(), "[INIT] Dependencies added");

    if options.add_scripts {
        let script = ScriptOptions {
            port: STORYBOOK_PORT,
            static_folder: options.static_dir.clone(),
        };
        package_manager
            .add_storybook_command_in_scripts(&script)
            .await
            .map_err(|e| {
                error!(error = %e, "[INIT][ERROR] Adding run scripts failed");
                e
            })?;
        info!(port = script.port, "[INIT] Added run scripts");
    }

    Ok(ScaffoldReport {
        framework,
        addons,
        dependencies,
        components_copied: options.add_components,
        scripts_added: options.add_scripts,
    })
}
