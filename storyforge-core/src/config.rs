use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

/// Frameworks the generator knows how to scaffold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Framework {
    React,
    ReactNative,
    Vue,
    Vue3,
    Angular,
    Mithril,
    Riot,
    Ember,
    Marionette,
    Marko,
    Meteor,
    Preact,
    Svelte,
    Rax,
    Aurelia,
    Html,
    WebComponents,
    Server,
}

impl Framework {
    pub fn as_str(&self) -> &'static str {
        match self {
            Framework::React => "react",
            Framework::ReactNative => "react-native",
            Framework::Vue => "vue",
            Framework::Vue3 => "vue3",
            Framework::Angular => "angular",
            Framework::Mithril => "mithril",
            Framework::Riot => "riot",
            Framework::Ember => "ember",
            Framework::Marionette => "marionette",
            Framework::Marko => "marko",
            Framework::Meteor => "meteor",
            Framework::Preact => "preact",
            Framework::Svelte => "svelte",
            Framework::Rax => "rax",
            Framework::Aurelia => "aurelia",
            Framework::Html => "html",
            Framework::WebComponents => "web-components",
            Framework::Server => "server",
        }
    }

    /// The framework's own package, e.g. `@storybook/react`.
    pub fn package_name(&self) -> String {
        format!("@storybook/{}", self.as_str())
    }
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source language of the generated stories and components.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SupportedLanguage {
    #[default]
    Javascript,
    Typescript,
}

impl SupportedLanguage {
    /// Template folder holding components for this language.
    pub fn template_folder(&self) -> &'static str {
        match self {
            SupportedLanguage::Javascript => "js",
            SupportedLanguage::Typescript => "ts",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoryFormat {
    #[default]
    Csf,
    CsfTs,
    Mdx,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratorOptions {
    #[serde(default)]
    pub language: SupportedLanguage,
    #[serde(default)]
    pub story_format: StoryFormat,
}

/// How dependencies get into the target project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallOptions {
    /// Only write the manifest, do not run the package manager.
    #[serde(default)]
    pub skip_install: bool,
    #[serde(default = "default_true")]
    pub install_as_dev_dependencies: bool,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            skip_install: false,
            install_as_dev_dependencies: true,
        }
    }
}

/// Per-framework generator switches as supplied by the caller.
/// Every field is optional; see [`FrameworkOptions::resolve`] for defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameworkOptions {
    #[serde(default)]
    pub extra_packages: Option<Vec<String>>,
    #[serde(default)]
    pub extra_addons: Option<Vec<String>>,
    #[serde(default)]
    pub static_dir: Option<String>,
    #[serde(default)]
    pub add_scripts: Option<bool>,
    #[serde(default)]
    pub add_components: Option<bool>,
}

/// [`FrameworkOptions`] with every default filled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFrameworkOptions {
    pub extra_packages: Vec<String>,
    pub extra_addons: Vec<String>,
    pub static_dir: Option<String>,
    pub add_scripts: bool,
    pub add_components: bool,
}

impl Default for ResolvedFrameworkOptions {
    fn default() -> Self {
        Self {
            extra_packages: Vec::new(),
            extra_addons: Vec::new(),
            static_dir: None,
            add_scripts: true,
            add_components: true,
        }
    }
}

impl FrameworkOptions {
    /// Shallow merge over the defaults: each field the caller set wins.
    pub fn resolve(&self) -> ResolvedFrameworkOptions {
        let defaults = ResolvedFrameworkOptions::default();
        let resolved = ResolvedFrameworkOptions {
            extra_packages: self
                .extra_packages
                .clone()
                .unwrap_or(defaults.extra_packages),
            extra_addons: self.extra_addons.clone().unwrap_or(defaults.extra_addons),
            static_dir: self.static_dir.clone().or(defaults.static_dir),
            add_scripts: self.add_scripts.unwrap_or(defaults.add_scripts),
            add_components: self.add_components.unwrap_or(defaults.add_components),
        };
        debug!(?resolved, "Resolved framework options");
        resolved
    }
}

impl ResolvedFrameworkOptions {
    pub fn trace_loaded(&self) {
        info!(
            extra_packages = self.extra_packages.len(),
            extra_addons = self.extra_addons.len(),
            static_dir = self.static_dir.as_deref().unwrap_or("-"),
            add_scripts = self.add_scripts,
            add_components = self.add_components,
            "Loaded framework options"
        );
    }
}

fn default_true() -> bool {
    true
}
