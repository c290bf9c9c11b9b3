///
/// This module implements the CLI interface for storyforge: command parsing,
/// argument handling and the async entrypoint used by `main` and the
/// integration tests.
///
/// All preset composition and generator logic lives in `storyforge-core`.
/// This module is strictly CLI glue: it loads the config, builds the concrete
/// collaborators and prints results.
///
/// ## Commands
/// - `init`: run the project generator for the configured framework.
/// - `preset`: print the bundler configuration and entry lists produced by
///   the docs preset.
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;

use storyforge_core::bundler::BundlerConfig;
use storyforge_core::generator::scaffold;
use storyforge_core::preset::{
    config_entries, manager_entries, webpack, webpack_dlls, LoaderPaths,
};
use storyforge_core::project::FsProject;
use storyforge_core::resolve::NodeModulesResolver;

use crate::load_config::load_config;
use crate::package_manager::JsPackageManager;

/// CLI for storyforge: scaffold docs tooling and compose its bundler preset.
#[derive(Parser)]
#[clap(
    name = "storyforge",
    version,
    about = "Scaffold component documentation tooling into a JavaScript project"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Install docs tooling into the project described by the config file
    Init {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Only write package.json, do not run the package manager
        #[clap(long)]
        skip_install: bool,
    },
    /// Print the bundler configuration composed by the docs preset
    Preset {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// JSON file holding the base bundler configuration
        #[clap(long)]
        base: Option<PathBuf>,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Init {
            config,
            skip_install,
        } => {
            let config = load_config(config)?;
            let init = config
                .init
                .as_ref()
                .context("config has no `init` section")?;
            let mut install = init.install.clone();
            install.skip_install |= skip_install;

            let package_manager = JsPackageManager::new(
                config.package_manager,
                &config.project_dir,
                config.registry.clone(),
            );
            let project = FsProject::new(&config.project_dir, &config.templates_dir);

            tracing::info!(command = "init", framework = %init.framework, "Starting generator");
            match scaffold(
                &package_manager,
                &project,
                &install,
                &init.generator_options(),
                init.framework,
                &init.options,
            )
            .await
            {
                Ok(report) => {
                    tracing::info!(command = "init", ?report, "Generator complete");
                    println!("Installed docs tooling for {}.", report.framework);
                    for dependency in &report.dependencies {
                        println!("  + {dependency}");
                    }
                    Ok(())
                }
                Err(e) => {
                    tracing::error!(command = "init", error = %e, "Generator failed");
                    Err(anyhow::Error::new(e).context("init failed"))
                }
            }
        }
        Commands::Preset { config, base } => {
            let config = load_config(config)?;
            let base = match base {
                Some(path) => {
                    let display = path.display();
                    let raw = std::fs::read_to_string(&path)
                        .with_context(|| format!("Failed to read base config {display}"))?;
                    BundlerConfig::from_json_str(&raw)
                        .with_context(|| format!("Failed to parse base config {display}"))?
                }
                None => BundlerConfig::default(),
            };

            let resolver = NodeModulesResolver::new(&config.project_dir);
            let loaders = LoaderPaths::resolve(&resolver);
            let options = &config.preset;
            let composed = webpack(&base, options, &loaders);

            let output = json!({
                "webpack": composed,
                "managerEntries": manager_entries(&[], &loaders),
                "config": config_entries(&[], options.framework.as_deref(), &loaders, &resolver),
                "webpackDlls": webpack_dlls(&[], options),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
            tracing::info!(command = "preset", "Preset composed");
            Ok(())
        }
    }
}
