/// `load_config` module: loads the YAML config file that describes the target
/// project, the generator run and the docs preset options.
///
/// This is the only place where user-supplied YAML is parsed and mapped to the
/// strongly-typed core structs.
///
/// # Environment overrides
/// - `STORYFORGE_PACKAGE_MANAGER`: `npm` or `yarn`, replaces `package_manager`
/// - `STORYFORGE_REGISTRY`: replaces `registry`
///
/// # Errors
/// All errors use `anyhow::Error` and are surfaced at the CLI boundary.
use anyhow::Result;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use storyforge_core::config::{
    Framework, FrameworkOptions, GeneratorOptions, InstallOptions, StoryFormat, SupportedLanguage,
};
use storyforge_core::preset::PresetOptions;

use crate::package_manager::PackageManagerKind;

pub const PACKAGE_MANAGER_ENV: &str = "STORYFORGE_PACKAGE_MANAGER";
pub const REGISTRY_ENV: &str = "STORYFORGE_REGISTRY";

#[derive(Debug, Deserialize)]
pub struct CliConfig {
    #[serde(default = "default_project_dir")]
    pub project_dir: PathBuf,
    #[serde(default)]
    pub package_manager: PackageManagerKind,
    #[serde(default)]
    pub registry: Option<String>,
    #[serde(default = "default_templates_dir")]
    pub templates_dir: PathBuf,
    #[serde(default)]
    pub init: Option<InitSection>,
    #[serde(default)]
    pub preset: PresetOptions,
}

/// The generator run: which framework, in which language, with which switches.
#[derive(Debug, Deserialize)]
pub struct InitSection {
    pub framework: Framework,
    #[serde(default)]
    pub language: SupportedLanguage,
    #[serde(default)]
    pub story_format: StoryFormat,
    #[serde(default)]
    pub install: InstallOptions,
    #[serde(default)]
    pub options: FrameworkOptions,
}

impl InitSection {
    pub fn generator_options(&self) -> GeneratorOptions {
        GeneratorOptions {
            language: self.language,
            story_format: self.story_format,
        }
    }
}

fn default_project_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_templates_dir() -> PathBuf {
    PathBuf::from("templates")
}

/// Loads a YAML config file and applies environment overrides.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let mut config: CliConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    if let Ok(raw) = std::env::var(PACKAGE_MANAGER_ENV) {
        match raw.parse::<PackageManagerKind>() {
            Ok(kind) => {
                info!(package_manager = %kind, "Package manager overridden from environment");
                config.package_manager = kind;
            }
            Err(e) => {
                warn!(error = %e, "Ignoring {PACKAGE_MANAGER_ENV}");
            }
        }
    }
    if let Ok(registry) = std::env::var(REGISTRY_ENV) {
        info!(%registry, "Registry overridden from environment");
        config.registry = Some(registry);
    }

    Ok(config)
}
