use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::{Framework, SupportedLanguage};
use crate::contract::{ProjectError, ProjectWriter};

const CONFIG_DIR: &str = ".storybook";
const STORY_EXTENSIONS: [&str; 4] = ["js", "jsx", "ts", "tsx"];

const PREVIEW_PARAMETERS: &str = r#"export const parameters = {
  actions: { argTypesRegex: "^on[A-Z].*" },
}
"#;

const ANGULAR_PREVIEW_PREAMBLE: &str = r#"import { setCompodocJson } from "@storybook/addon-docs/angular";
import docJson from "../documentation.json";
setCompodocJson(docJson);

"#;

/// A project on disk, plus the directory holding component templates
/// (`<templates>/frameworks/<framework>/<js|ts>`).
#[derive(Debug, Clone)]
pub struct FsProject {
    root: PathBuf,
    templates_dir: PathBuf,
}

impl FsProject {
    pub fn new(root: impl Into<PathBuf>, templates_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            templates_dir: templates_dir.into(),
        }
    }

    fn has_src_dir(&self) -> bool {
        self.root.join("src").is_dir()
    }

    fn write(&self, path: &Path, contents: &str) -> Result<(), ProjectError> {
        fs::write(path, contents).map_err(|source| ProjectError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), bytes = contents.len(), "Wrote file");
        Ok(())
    }

    fn ensure_dir(path: &Path) -> Result<(), ProjectError> {
        fs::create_dir_all(path).map_err(|source| ProjectError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    fn configure_main(&self, addons: &[String]) -> Result<(), ProjectError> {
        let prefix = if self.has_src_dir() { "../src" } else { "../stories" };
        let config = json!({
            "stories": [
                format!("{prefix}/**/*.stories.mdx"),
                format!("{prefix}/**/*.stories.@({})", STORY_EXTENSIONS.join("|")),
            ],
            "addons": addons,
        });
        let pretty = serde_json::to_string_pretty(&config).map_err(|e| ProjectError::Io {
            path: self.root.join(CONFIG_DIR).join("main.js"),
            source: e.into(),
        })?;
        self.write(
            &self.root.join(CONFIG_DIR).join("main.js"),
            &format!("module.exports = {pretty}\n"),
        )
    }

    fn configure_preview(&self, framework: Framework) -> Result<(), ProjectError> {
        let path = self.root.join(CONFIG_DIR).join("preview.js");
        if path.exists() {
            info!(path = %path.display(), "Keeping existing preview config");
            return Ok(());
        }
        let preamble = if framework == Framework::Angular {
            ANGULAR_PREVIEW_PREAMBLE
        } else {
            ""
        };
        self.write(&path, &format!("{preamble}{PREVIEW_PARAMETERS}"))
    }

    /// Template directory for the framework: language-specific first, then
    /// the JavaScript templates, then the framework root.
    fn components_path(
        &self,
        framework: Framework,
        language: SupportedLanguage,
    ) -> Result<PathBuf, ProjectError> {
        let framework_dir = self.templates_dir.join("frameworks").join(framework.as_str());
        [
            framework_dir.join(language.template_folder()),
            framework_dir.join(SupportedLanguage::Javascript.template_folder()),
            framework_dir,
        ]
        .into_iter()
        .find(|candidate| candidate.is_dir())
        .ok_or(ProjectError::UnsupportedFramework(framework))
    }
}

fn copy_dir(from: &Path, to: &Path) -> Result<usize, ProjectError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| ProjectError::Io { path, source }
    };
    FsProject::ensure_dir(to)?;
    let mut copied = 0;
    for entry in fs::read_dir(from).map_err(io_err(from))? {
        let entry = entry.map_err(io_err(from))?;
        let source = entry.path();
        let target = to.join(entry.file_name());
        if source.is_dir() {
            copied += copy_dir(&source, &target)?;
        } else {
            fs::copy(&source, &target).map_err(io_err(&target))?;
            copied += 1;
        }
    }
    Ok(copied)
}

impl ProjectWriter for FsProject {
    fn configure(&self, framework: Framework, addons: &[String]) -> Result<(), ProjectError> {
        Self::ensure_dir(&self.root.join(CONFIG_DIR))?;
        self.configure_main(addons)?;
        self.configure_preview(framework)?;
        info!(%framework, addons = addons.len(), "Configured project");
        Ok(())
    }

    fn copy_components(
        &self,
        framework: Framework,
        language: SupportedLanguage,
    ) -> Result<(), ProjectError> {
        let components = self.components_path(framework, language)?;
        let destination = if self.has_src_dir() {
            self.root.join("src").join("stories")
        } else {
            self.root.join("stories")
        };

        let common = self.templates_dir.join("frameworks").join("common");
        let mut copied = 0;
        if common.is_dir() {
            copied += copy_dir(&common, &destination)?;
        }
        copied += copy_dir(&components, &destination)?;
        info!(
            %framework,
            from = %components.display(),
            to = %destination.display(),
            copied,
            "Copied template components"
        );
        Ok(())
    }
}
