//! Docs preset: augments a bundler configuration with the transform rules the
//! docs addon needs.
//!
//! Composition is pure. The same base configuration, options and loader paths
//! always yield the same output, and the base configuration is only borrowed.
//!
//! # Rule order
//! 1. caller rules (a `/\.md$/` rule is replaced when markdown transclusion is on)
//! 2. the transcluded markdown rule, if enabled
//! 3. `acorn-jsx` compilation, story MDX, plain MDX
//! 4. the source loader, if enabled

use serde::{Deserialize, Deserializer};
use serde_json::{json, Map, Value};
use std::path::{Path, MAIN_SEPARATOR};
use tracing::{debug, info};

use crate::bundler::{BundlerConfig, Enforce, ModuleRule, Pattern, Plugin, RuleUse};
use crate::resolve::{dll_context, ModuleResolver};

pub const JSX_PLUGIN: &str = "@babel/plugin-transform-react-jsx";
pub const DOCS_DLL_ENTRY: &str = "./sb_dll/storybook_docs_dll.js";

const MARKDOWN_TEST: &str = r"\.md$";
const STORY_MDX_TEST: &str = r"\.(stories|story).mdx$";
const MDX_TEST: &str = r"\.mdx$";
const JS_TEST: &str = r"\.js$";
const STORY_SOURCE_TEST: &str = r"\.(stories|story)\.[tj]sx?$";

/// Whether the source loader runs, and with which options.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum SourceLoaderSetting {
    /// Disabled for react, enabled with empty options for other frameworks.
    #[default]
    FrameworkDefault,
    Disabled,
    Enabled(Map<String, Value>),
}

impl SourceLoaderSetting {
    pub fn resolve(&self, framework: Option<&str>) -> Option<Map<String, Value>> {
        match self {
            SourceLoaderSetting::FrameworkDefault if framework == Some("react") => None,
            SourceLoaderSetting::FrameworkDefault => Some(Map::new()),
            SourceLoaderSetting::Disabled => None,
            SourceLoaderSetting::Enabled(options) => Some(options.clone()),
        }
    }
}

// A present key decodes through here; `null` means explicitly disabled.
impl<'de> Deserialize<'de> for SourceLoaderSetting {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Option::<Map<String, Value>>::deserialize(deserializer)? {
            Some(options) => SourceLoaderSetting::Enabled(options),
            None => SourceLoaderSetting::Disabled,
        })
    }
}

/// Options the docs preset reads.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PresetOptions {
    #[serde(default)]
    pub framework: Option<String>,
    #[serde(default)]
    pub babel_options: Option<Map<String, Value>>,
    #[serde(default)]
    pub mdx_babel_options: Option<Map<String, Value>>,
    #[serde(default = "default_configure_jsx")]
    pub configure_jsx: bool,
    #[serde(default)]
    pub source_loader_options: SourceLoaderSetting,
    #[serde(default)]
    pub transclude_markdown: bool,
    #[serde(default)]
    pub dll: bool,
}

impl Default for PresetOptions {
    fn default() -> Self {
        Self {
            framework: None,
            babel_options: None,
            mdx_babel_options: None,
            configure_jsx: true,
            source_loader_options: SourceLoaderSetting::FrameworkDefault,
            transclude_markdown: false,
            dll: false,
        }
    }
}

fn default_configure_jsx() -> bool {
    true
}

/// Module identifiers placed into rules and entry lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderPaths {
    pub babel_loader: String,
    pub mdx_loader: String,
    pub source_loader: String,
    pub preset_env: String,
    pub mdx_compiler: String,
    pub remark_slug: String,
    pub remark_external_links: String,
    pub docs_config: String,
    pub manager_register: String,
    pub dll_context: String,
    pub dll_manifest: String,
}

const DOCS_PACKAGE: &str = "@storybook/addon-docs";
const CORE_MANIFEST: &str = "@storybook/core/package.json";
const DLL_MANIFEST: &str = "@storybook/core/dll/storybook_docs-manifest.json";

impl Default for LoaderPaths {
    fn default() -> Self {
        Self {
            babel_loader: "babel-loader".into(),
            mdx_loader: "@mdx-js/loader".into(),
            source_loader: "@storybook/source-loader".into(),
            preset_env: "@babel/preset-env".into(),
            mdx_compiler: format!("{DOCS_PACKAGE}/mdx-compiler-plugin"),
            remark_slug: "remark-slug".into(),
            remark_external_links: "remark-external-links".into(),
            docs_config: format!("{DOCS_PACKAGE}/dist/frameworks/common/config"),
            manager_register: format!("{DOCS_PACKAGE}/register"),
            dll_context: "node_modules".into(),
            dll_manifest: DLL_MANIFEST.into(),
        }
    }
}

impl LoaderPaths {
    /// Resolve every identifier, keeping the bare name when a module is absent.
    pub fn resolve<R: ModuleResolver + ?Sized>(resolver: &R) -> Self {
        let defaults = Self::default();
        let lookup = |request: String| -> String {
            resolver
                .resolve(&request)
                .map(|p| p.display().to_string())
                .unwrap_or(request)
        };
        let dll_context = resolver
            .resolve(CORE_MANIFEST)
            .and_then(|manifest| manifest.parent().map(Path::to_path_buf))
            .map(|core_dir| dll_context(&core_dir).display().to_string())
            .unwrap_or(defaults.dll_context);

        Self {
            babel_loader: lookup(defaults.babel_loader),
            mdx_loader: lookup(defaults.mdx_loader),
            source_loader: lookup(defaults.source_loader),
            preset_env: lookup(defaults.preset_env),
            mdx_compiler: lookup(defaults.mdx_compiler),
            remark_slug: lookup(defaults.remark_slug),
            remark_external_links: lookup(defaults.remark_external_links),
            docs_config: lookup(defaults.docs_config),
            manager_register: lookup(defaults.manager_register),
            dll_context,
            dll_manifest: lookup(defaults.dll_manifest),
        }
    }
}

/// Transpiler options for MDX output.
///
/// Priority, lowest first: the no-ambient-config base, `babel_options`,
/// `mdx_babel_options`, then the computed `plugins` list.
pub fn create_transform_options(
    babel_options: Option<&Map<String, Value>>,
    mdx_babel_options: Option<&Map<String, Value>>,
    configure_jsx: bool,
) -> Map<String, Value> {
    let mut plugins = plugins_of(mdx_babel_options)
        .or_else(|| plugins_of(babel_options))
        .cloned()
        .unwrap_or_default();
    if configure_jsx {
        plugins.push(json!([
            JSX_PLUGIN,
            { "pragma": "React.createElement", "pragmaFrag": "React.Fragment" }
        ]));
    }

    let mut options = Map::new();
    options.insert("babelrc".into(), Value::Bool(false));
    options.insert("configFile".into(), Value::Bool(false));
    for source in [babel_options, mdx_babel_options].into_iter().flatten() {
        for (key, value) in source {
            options.insert(key.clone(), value.clone());
        }
    }
    options.insert("plugins".into(), Value::Array(plugins));
    options
}

fn plugins_of(options: Option<&Map<String, Value>>) -> Option<&Vec<Value>> {
    options?.get("plugins")?.as_array()
}

// Only called with sources built in this module.
fn pattern(source: &str) -> Pattern {
    Pattern::new(source).expect("built-in pattern compiles")
}

fn remark_plugins(loaders: &LoaderPaths) -> Value {
    json!([loaders.remark_slug, loaders.remark_external_links])
}

fn mdx_chain(
    transform: &Map<String, Value>,
    loaders: &LoaderPaths,
    mdx_options: Value,
) -> Vec<RuleUse> {
    vec![
        RuleUse::new(&loaders.babel_loader, Value::Object(transform.clone())),
        RuleUse::new(&loaders.mdx_loader, mdx_options),
    ]
}

/// Compose the docs preset into `base`.
pub fn webpack(
    base: &BundlerConfig,
    options: &PresetOptions,
    loaders: &LoaderPaths,
) -> BundlerConfig {
    let transform = create_transform_options(
        options.babel_options.as_ref(),
        options.mdx_babel_options.as_ref(),
        options.configure_jsx,
    );
    let mdx_loader_options = json!({ "remarkPlugins": remark_plugins(loaders) });

    let mut rules: Vec<ModuleRule> = Vec::with_capacity(base.module.rules.len() + 5);
    if options.transclude_markdown {
        let markdown = pattern(MARKDOWN_TEST).to_string();
        let before = base.module.rules.len();
        rules.extend(
            base.module
                .rules
                .iter()
                .filter(|rule| rule.test_literal().as_deref() != Some(markdown.as_str()))
                .cloned(),
        );
        debug!(replaced = before - rules.len(), "Replacing markdown rules");
        rules.push(ModuleRule::chain(
            pattern(MARKDOWN_TEST),
            mdx_chain(&transform, loaders, mdx_loader_options.clone()),
        ));
    } else {
        rules.extend(base.module.rules.iter().cloned());
    }

    let acorn_jsx = format!(
        "node_modules{}acorn-jsx",
        regex::escape(&MAIN_SEPARATOR.to_string())
    );
    rules.push(ModuleRule {
        include: Some(pattern(&acorn_jsx).into()),
        ..ModuleRule::chain(
            pattern(JS_TEST),
            vec![RuleUse::new(
                &loaders.babel_loader,
                json!({ "presets": [[loaders.preset_env, { "modules": "commonjs" }]] }),
            )],
        )
    });

    let compiler = json!({
        "compiler": loaders.mdx_compiler,
        "options": { "framework": options.framework },
    });
    rules.push(ModuleRule::chain(
        pattern(STORY_MDX_TEST),
        mdx_chain(
            &transform,
            loaders,
            json!({
                "compilers": [compiler],
                "remarkPlugins": remark_plugins(loaders),
            }),
        ),
    ));

    rules.push(ModuleRule {
        exclude: Some(pattern(STORY_MDX_TEST).into()),
        ..ModuleRule::chain(
            pattern(MDX_TEST),
            mdx_chain(&transform, loaders, mdx_loader_options),
        )
    });

    if let Some(mut source_options) = options
        .source_loader_options
        .resolve(options.framework.as_deref())
    {
        source_options.insert("inspectLocalDependencies".into(), Value::Bool(true));
        rules.push(ModuleRule {
            test: Some(pattern(STORY_SOURCE_TEST).into()),
            loader: Some(loaders.source_loader.clone()),
            options: Some(Value::Object(source_options)),
            enforce: Some(Enforce::Pre),
            ..Default::default()
        });
    }

    let mut plugins = base.plugins.clone();
    if options.dll {
        plugins.push(Plugin::dll_reference(&loaders.dll_context, &loaders.dll_manifest));
    }

    info!(
        framework = options.framework.as_deref().unwrap_or("-"),
        rules = rules.len(),
        plugins = plugins.len(),
        transclude_markdown = options.transclude_markdown,
        dll = options.dll,
        "Composed docs preset"
    );

    let mut module = base.module.clone();
    module.rules = rules;
    BundlerConfig {
        module,
        plugins,
        extra: base.extra.clone(),
    }
}

/// Shared-bundle entries: the docs bundle is added only when `dll` is set,
/// and without it no entries are returned at all.
pub fn webpack_dlls(dlls: &[String], options: &PresetOptions) -> Vec<String> {
    if !options.dll {
        return Vec::new();
    }
    dlls.iter()
        .cloned()
        .chain(std::iter::once(DOCS_DLL_ENTRY.to_string()))
        .collect()
}

pub fn manager_entries(entry: &[String], loaders: &LoaderPaths) -> Vec<String> {
    let mut entries = entry.to_vec();
    entries.push(loaders.manager_register.clone());
    entries
}

/// Preview config entries: the common docs config, the framework override if
/// one is installed, then the caller's entries.
pub fn config_entries<R: ModuleResolver + ?Sized>(
    entry: &[String],
    framework: Option<&str>,
    loaders: &LoaderPaths,
    resolver: &R,
) -> Vec<String> {
    let mut entries = vec![loaders.docs_config.clone()];
    if let Some(framework) = framework {
        let request = format!("{DOCS_PACKAGE}/dist/frameworks/{framework}/config");
        match resolver.resolve(&request) {
            Some(path) => entries.push(path.display().to_string()),
            None => debug!(framework, "No framework-specific docs config"),
        }
    }
    entries.extend(entry.iter().cloned());
    entries
}
