use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{layer::Context, Layer, Registry};

use storyforge_core::config::{
    Framework, FrameworkOptions, GeneratorOptions, InstallOptions, SupportedLanguage,
};
use storyforge_core::contract::{
    MockPackageManager, MockProjectWriter, PackageJson, PackageManager, PackageManagerError,
    ProjectError, ProjectWriter, ScriptOptions,
};
use storyforge_core::generator::{
    babel_dependencies, required_packages, scaffold, ScaffoldError, STORYBOOK_PORT,
};

/// Fake collaborators that record every call in one shared log.
#[derive(Clone, Default)]
struct Recorder {
    calls: Arc<Mutex<Vec<String>>>,
    manifest: PackageJson,
}

impl Recorder {
    fn log(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PackageManager for Recorder {
    async fn get_versioned_packages(
        &self,
        packages: &[String],
    ) -> Result<Vec<String>, PackageManagerError> {
        self.log("get_versioned_packages");
        Ok(packages.iter().map(|p| format!("{p}@^6.1.0")).collect())
    }

    async fn get_version(
        &self,
        package: &str,
        _constraint: &str,
    ) -> Result<String, PackageManagerError> {
        self.log(format!("get_version {package}"));
        Ok("^1.0.0".to_string())
    }

    fn retrieve_package_json(&self) -> Result<PackageJson, PackageManagerError> {
        self.log("retrieve_package_json");
        Ok(self.manifest.clone())
    }

    async fn add_dependencies(
        &self,
        _options: &InstallOptions,
        _package_json: &PackageJson,
        dependencies: &[String],
    ) -> Result<(), PackageManagerError> {
        self.log(format!("add_dependencies {}", dependencies.len()));
        Ok(())
    }

    async fn add_storybook_command_in_scripts(
        &self,
        options: &ScriptOptions,
    ) -> Result<(), PackageManagerError> {
        self.log(format!("add_storybook_command_in_scripts {}", options.port));
        Ok(())
    }
}

impl ProjectWriter for Recorder {
    fn configure(&self, framework: Framework, addons: &[String]) -> Result<(), ProjectError> {
        self.log(format!("configure {framework} {}", addons.len()));
        Ok(())
    }

    fn copy_components(
        &self,
        framework: Framework,
        language: SupportedLanguage,
    ) -> Result<(), ProjectError> {
        self.log(format!("copy_components {framework} {}", language.template_folder()));
        Ok(())
    }
}

fn typescript() -> GeneratorOptions {
    GeneratorOptions {
        language: SupportedLanguage::Typescript,
        ..Default::default()
    }
}

fn manifest_with(deps: &[(&str, &str)]) -> PackageJson {
    PackageJson {
        dev_dependencies: deps
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<BTreeMap<_, _>>(),
        ..Default::default()
    }
}

#[tokio::test]
async fn steps_run_in_pipeline_order() {
    let recorder = Recorder::default();

    let report = scaffold(
        &recorder,
        &recorder,
        &InstallOptions::default(),
        &typescript(),
        Framework::React,
        &FrameworkOptions::default(),
    )
    .await
    .expect("scaffold succeeds");

    assert_eq!(
        recorder.calls(),
        vec![
            "get_versioned_packages",
            "configure react 3",
            "copy_components react ts",
            "retrieve_package_json",
            "get_version @babel/core",
            "get_version babel-loader",
            "add_dependencies 7",
            "add_storybook_command_in_scripts 6006",
        ]
    );
    assert!(report.components_copied);
    assert!(report.scripts_added);
    assert_eq!(
        report.dependencies.last().map(String::as_str),
        Some("babel-loader@^1.0.0")
    );
}

#[tokio::test]
async fn disabled_stages_are_skipped() {
    let recorder = Recorder {
        manifest: manifest_with(&[("@babel/core", "^7.12.0"), ("babel-loader", "^8.2.0")]),
        ..Default::default()
    };
    let options = FrameworkOptions {
        add_scripts: Some(false),
        add_components: Some(false),
        ..Default::default()
    };

    let report = scaffold(
        &recorder,
        &recorder,
        &InstallOptions::default(),
        &GeneratorOptions::default(),
        Framework::Vue,
        &options,
    )
    .await
    .expect("scaffold succeeds");

    assert_eq!(
        recorder.calls(),
        vec![
            "get_versioned_packages",
            "configure vue 3",
            "retrieve_package_json",
            "add_dependencies 5",
        ]
    );
    assert!(!report.components_copied);
    assert!(!report.scripts_added);
}

#[test]
fn package_list_keeps_duplicates_and_drops_empty_names() {
    let options = FrameworkOptions {
        extra_packages: Some(vec!["p1".into(), "".into()]),
        extra_addons: Some(vec!["p1".into()]),
        ..Default::default()
    }
    .resolve();

    let packages = required_packages(Framework::WebComponents, &options);
    assert_eq!(
        packages,
        vec![
            "@storybook/web-components",
            "@storybook/addon-links",
            "@storybook/addon-actions",
            "@storybook/addon-essentials",
            "p1",
            "p1",
            "react-is",
        ]
    );
    assert_eq!(packages.iter().filter(|p| p.as_str() == "p1").count(), 2);
}

#[test]
fn framework_options_override_defaults_per_field() {
    let resolved = FrameworkOptions {
        static_dir: Some("public".into()),
        add_scripts: Some(false),
        ..Default::default()
    }
    .resolve();

    assert!(resolved.extra_packages.is_empty());
    assert!(resolved.extra_addons.is_empty());
    assert_eq!(resolved.static_dir.as_deref(), Some("public"));
    assert!(!resolved.add_scripts);
    assert!(resolved.add_components);
}

#[tokio::test]
async fn babel_dependencies_for_fresh_project() {
    let mut pm = MockPackageManager::new();
    pm.expect_get_version()
        .withf(|package, constraint| package == "@babel/core" && constraint == "latest")
        .times(1)
        .returning(|_, _| Ok("^7.12.3".to_string()));
    pm.expect_get_version()
        .withf(|package, constraint| package == "babel-loader" && constraint == "^8.0.0-0")
        .times(1)
        .returning(|_, _| Ok("^8.2.1".to_string()));

    let deps = babel_dependencies(&pm, &PackageJson::default()).await.unwrap();
    assert_eq!(deps, vec!["@babel/core@^7.12.3", "babel-loader@^8.2.1"]);
}

#[tokio::test]
async fn babel_dependencies_for_babel_six_project() {
    let mut pm = MockPackageManager::new();
    pm.expect_get_version()
        .withf(|package, constraint| package == "babel-loader" && constraint == "^7.0.0")
        .times(1)
        .returning(|_, _| Ok("^7.1.5".to_string()));

    let manifest = manifest_with(&[("babel-core", "^6.26.0")]);
    let deps = babel_dependencies(&pm, &manifest).await.unwrap();
    assert_eq!(deps, vec!["babel-loader@^7.1.5"]);
}

#[tokio::test]
async fn babel_dependencies_for_configured_project() {
    // No expectations: any registry lookup would panic.
    let pm = MockPackageManager::new();
    let manifest = PackageJson {
        dependencies: [("@babel/core".to_string(), "^7.0.0".to_string())].into(),
        dev_dependencies: [("babel-loader".to_string(), "^8.0.0".to_string())].into(),
        ..Default::default()
    };
    assert!(babel_dependencies(&pm, &manifest).await.unwrap().is_empty());
}

#[tokio::test]
async fn version_resolution_failure_stops_before_any_write() {
    let mut pm = MockPackageManager::new();
    pm.expect_get_versioned_packages().times(1).returning(|_| {
        Err(PackageManagerError::Registry {
            package: "@storybook/react".into(),
            detail: "connection refused".into(),
        })
    });
    let project = MockProjectWriter::new();

    let err = scaffold(
        &pm,
        &project,
        &InstallOptions::default(),
        &GeneratorOptions::default(),
        Framework::React,
        &FrameworkOptions::default(),
    )
    .await
    .unwrap_err();

    assert!(matches!(
        err,
        ScaffoldError::PackageManager(PackageManagerError::Registry { .. })
    ));
}

#[tokio::test]
async fn install_failure_propagates_without_rollback() {
    let mut pm = MockPackageManager::new();
    pm.expect_get_versioned_packages()
        .returning(|packages| Ok(packages.iter().map(|p| format!("{p}@^6.1.0")).collect()));
    pm.expect_retrieve_package_json().returning(|| {
        Ok(manifest_with(&[("@babel/core", "^7.0.0"), ("babel-loader", "^8.0.0")]))
    });
    pm.expect_add_dependencies()
        .withf(|options, _, deps| options.skip_install && deps.len() == 6)
        .times(1)
        .returning(|_, _, _| {
            Err(PackageManagerError::Command {
                command: "npm install -D".into(),
                detail: "exit status: 1".into(),
            })
        });
    pm.expect_add_storybook_command_in_scripts().never();

    let mut project = MockProjectWriter::new();
    project
        .expect_configure()
        .withf(|framework, addons| {
            *framework == Framework::Svelte
                && addons.last().map(String::as_str) == Some("@storybook/addon-a11y")
        })
        .times(1)
        .returning(|_, _| Ok(()));
    project
        .expect_copy_components()
        .times(1)
        .returning(|_, _| Ok(()));

    let install = InstallOptions {
        skip_install: true,
        ..Default::default()
    };
    let options = FrameworkOptions {
        extra_addons: Some(vec!["@storybook/addon-a11y".into()]),
        ..Default::default()
    };
    let err = scaffold(
        &pm,
        &project,
        &install,
        &GeneratorOptions::default(),
        Framework::Svelte,
        &options,
    )
    .await
    .unwrap_err();

    assert!(err.to_string().contains("npm install -D"), "got: {err}");
}

#[tokio::test]
async fn scripts_receive_fixed_port_and_static_dir() {
    let mut pm = MockPackageManager::new();
    pm.expect_get_versioned_packages()
        .returning(|packages| Ok(packages.to_vec()));
    pm.expect_retrieve_package_json().returning(|| {
        Ok(manifest_with(&[("@babel/core", "^7.0.0"), ("babel-loader", "^8.0.0")]))
    });
    pm.expect_add_dependencies().returning(|_, _, _| Ok(()));
    pm.expect_add_storybook_command_in_scripts()
        .withf(|options| {
            *options
                == ScriptOptions {
                    port: STORYBOOK_PORT,
                    static_folder: Some("public".into()),
                }
        })
        .times(1)
        .returning(|_| Ok(()));

    let mut project = MockProjectWriter::new();
    project.expect_configure().returning(|_, _| Ok(()));

    let options = FrameworkOptions {
        static_dir: Some("public".into()),
        add_components: Some(false),
        ..Default::default()
    };
    scaffold(
        &pm,
        &project,
        &InstallOptions::default(),
        &GeneratorOptions::default(),
        Framework::Html,
        &options,
    )
    .await
    .expect("scaffold succeeds");
}

/// Collects formatted events so tests can assert on emitted logs.
struct EventCollector {
    events: Arc<Mutex<Vec<String>>>,
}

impl<S: tracing::Subscriber> Layer<S> for EventCollector {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        self.events.lock().unwrap().push(format!("{:?}", event));
    }
}

#[tokio::test]
async fn failing_steps_log_an_error_before_returning() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let subscriber = Registry::default().with(EventCollector {
        events: events.clone(),
    });
    let _guard = tracing::subscriber::set_default(subscriber);

    let mut pm = MockPackageManager::new();
    pm.expect_get_versioned_packages()
        .returning(|packages| Ok(packages.to_vec()));
    let mut project = MockProjectWriter::new();
    project.expect_configure().returning(|_, _| {
        Err(ProjectError::Io {
            path: ".storybook/main.js".into(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
        })
    });

    let err = scaffold(
        &pm,
        &project,
        &InstallOptions::default(),
        &GeneratorOptions::default(),
        Framework::React,
        &FrameworkOptions::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ScaffoldError::Project(ProjectError::Io { .. })));

    let mut pm = MockPackageManager::new();
    pm.expect_get_versioned_packages()
        .returning(|packages| Ok(packages.to_vec()));
    pm.expect_retrieve_package_json().returning(|| {
        Ok(manifest_with(&[("@babel/core", "^7.0.0"), ("babel-loader", "^8.0.0")]))
    });
    pm.expect_add_dependencies().returning(|_, _, _| Ok(()));
    pm.expect_add_storybook_command_in_scripts().returning(|_| {
        Err(PackageManagerError::Manifest {
            path: "package.json".into(),
            source: serde_json::from_str::<serde_json::Value>("{").unwrap_err(),
        })
    });
    let mut project = MockProjectWriter::new();
    project.expect_configure().returning(|_, _| Ok(()));
    let options = FrameworkOptions {
        add_components: Some(false),
        ..Default::default()
    };

    scaffold(
        &pm,
        &project,
        &InstallOptions::default(),
        &GeneratorOptions::default(),
        Framework::React,
        &options,
    )
    .await
    .unwrap_err();

    let events = events.lock().unwrap();
    for expected in [
        "[INIT][ERROR] Registering addons failed",
        "[INIT][ERROR] Adding run scripts failed",
    ] {
        assert!(
            events.iter().any(|e| e.contains(expected)),
            "missing {expected:?} in {events:?}"
        );
    }
}
