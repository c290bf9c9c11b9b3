use serde_json::{json, Value};
use std::collections::HashMap;
use std::fs;
use std::sync::{Arc, Mutex};
use tempfile::tempdir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use storyforge::package_manager::{JsPackageManager, PackageManagerKind};
use storyforge_core::config::InstallOptions;
use storyforge_core::contract::{PackageManager, PackageManagerError, ScriptOptions};

/// Minimal registry: serves canned JSON bodies by request path, 404 otherwise.
async fn fake_registry(routes: &[(&str, &str)]) -> (String, Arc<Mutex<Vec<String>>>) {
    let routes: HashMap<String, String> = routes
        .iter()
        .map(|(path, body)| (path.to_string(), body.to_string()))
        .collect();
    let routes = Arc::new(routes);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let seen_by_server = seen.clone();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let routes = routes.clone();
            let seen = seen_by_server.clone();
            tokio::spawn(async move {
                let mut buf = vec![0u8; 8192];
                let n = socket.read(&mut buf).await.unwrap_or(0);
                let request = String::from_utf8_lossy(&buf[..n]);
                let path = request.split_whitespace().nth(1).unwrap_or("/").to_string();
                seen.lock().unwrap().push(path.clone());
                let (status, body) = match routes.get(&path) {
                    Some(body) => ("200 OK", body.clone()),
                    None => ("404 Not Found", r#"{"error":"not found"}"#.to_string()),
                };
                let response = format!(
                    "HTTP/1.1 {status}\r\ncontent-type: application/json\r\n\
                     content-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (format!("http://{addr}"), seen)
}

fn read_manifest(dir: &std::path::Path) -> Value {
    serde_json::from_str(&fs::read_to_string(dir.join("package.json")).unwrap()).unwrap()
}

#[tokio::test]
async fn versioned_packages_come_from_registry_in_order() {
    let (registry, seen) = fake_registry(&[
        (
            "/@storybook%2freact/latest",
            r#"{"name":"@storybook/react","version":"6.1.9"}"#,
        ),
        ("/react-is/16.13.1", r#"{"name":"react-is","version":"16.13.1"}"#),
        (
            "/@storybook%2faddon-links/next",
            r#"{"name":"@storybook/addon-links","version":"6.2.0-alpha.1"}"#,
        ),
    ])
    .await;
    let project = tempdir().unwrap();
    let pm = JsPackageManager::new(
        PackageManagerKind::Npm,
        project.path(),
        Some(format!("{registry}/")),
    );

    let packages = vec![
        "@storybook/react".to_string(),
        "react-is@16.13.1".to_string(),
        "@storybook/addon-links@next".to_string(),
    ];
    let versioned = pm
        .get_versioned_packages(&packages)
        .await
        .expect("lookup succeeds");

    assert_eq!(
        versioned,
        vec![
            "@storybook/react@^6.1.9",
            "react-is@^16.13.1",
            "@storybook/addon-links@^6.2.0-alpha.1",
        ]
    );
    let mut seen = seen.lock().unwrap().clone();
    seen.sort();
    assert_eq!(
        seen,
        vec![
            "/@storybook%2faddon-links/next",
            "/@storybook%2freact/latest",
            "/react-is/16.13.1",
        ]
    );
}

#[tokio::test]
async fn unknown_version_is_reported() {
    let (registry, _) = fake_registry(&[]).await;
    let project = tempdir().unwrap();
    let pm = JsPackageManager::new(PackageManagerKind::Npm, project.path(), Some(registry));

    let err = pm.get_version("left-pad", "latest").await.unwrap_err();
    assert!(
        matches!(
            err,
            PackageManagerError::NoMatchingVersion { ref package, .. } if package == "left-pad"
        ),
        "got: {err}"
    );
}

#[tokio::test]
async fn skip_install_merges_into_dev_dependencies() {
    let project = tempdir().unwrap();
    fs::write(
        project.path().join("package.json"),
        r#"{"name":"my-app","private":true,"devDependencies":{"typescript":"^4.0.0"}}"#,
    )
    .unwrap();
    let pm = JsPackageManager::new(PackageManagerKind::Npm, project.path(), None);

    let manifest = pm.retrieve_package_json().unwrap();
    let install = InstallOptions {
        skip_install: true,
        install_as_dev_dependencies: true,
    };
    pm.add_dependencies(
        &install,
        &manifest,
        &["@storybook/react@^6.1.9".to_string(), "react-is@^16.13.1".to_string()],
    )
    .await
    .unwrap();

    let written = read_manifest(project.path());
    assert_eq!(written["name"], json!("my-app"));
    assert_eq!(written["private"], json!(true));
    assert_eq!(
        written["devDependencies"],
        json!({
            "@storybook/react": "^6.1.9",
            "react-is": "^16.13.1",
            "typescript": "^4.0.0",
        })
    );
    assert!(written.get("dependencies").is_none());
}

#[tokio::test]
async fn skip_install_can_target_regular_dependencies() {
    let project = tempdir().unwrap();
    let pm = JsPackageManager::new(PackageManagerKind::Yarn, project.path(), None);

    let manifest = pm.retrieve_package_json().expect("missing manifest starts empty");
    let install = InstallOptions {
        skip_install: true,
        install_as_dev_dependencies: false,
    };
    pm.add_dependencies(&install, &manifest, &["babel-loader@^8.2.1".to_string()])
        .await
        .unwrap();

    let written = read_manifest(project.path());
    assert_eq!(written["dependencies"], json!({ "babel-loader": "^8.2.1" }));
}

#[tokio::test]
async fn run_scripts_are_added_with_port_and_static_dir() {
    let project = tempdir().unwrap();
    fs::write(
        project.path().join("package.json"),
        r#"{"name":"my-app","scripts":{"test":"jest"}}"#,
    )
    .unwrap();
    let pm = JsPackageManager::new(PackageManagerKind::Npm, project.path(), None);

    pm.add_storybook_command_in_scripts(&ScriptOptions {
        port: 6006,
        static_folder: Some("public".to_string()),
    })
    .await
    .unwrap();

    let written = read_manifest(project.path());
    assert_eq!(
        written["scripts"],
        json!({
            "test": "jest",
            "storybook": "start-storybook -p 6006 -s public",
            "build-storybook": "build-storybook -s public",
        })
    );
}

#[tokio::test]
async fn run_scripts_without_static_dir() {
    let project = tempdir().unwrap();
    let pm = JsPackageManager::new(PackageManagerKind::Npm, project.path(), None);

    pm.add_storybook_command_in_scripts(&ScriptOptions {
        port: 6006,
        static_folder: None,
    })
    .await
    .unwrap();

    let written = read_manifest(project.path());
    assert_eq!(written["scripts"]["storybook"], json!("start-storybook -p 6006"));
    assert_eq!(written["scripts"]["build-storybook"], json!("build-storybook"));
}

#[test]
fn corrupt_manifest_is_an_error() {
    let project = tempdir().unwrap();
    fs::write(project.path().join("package.json"), "{ not json").unwrap();
    let pm = JsPackageManager::new(PackageManagerKind::Npm, project.path(), None);

    let err = pm.retrieve_package_json().unwrap_err();
    assert!(matches!(err, PackageManagerError::Manifest { .. }), "got: {err}");
}

#[test]
fn package_manager_kind_parses_names() {
    assert_eq!("npm".parse::<PackageManagerKind>(), Ok(PackageManagerKind::Npm));
    assert_eq!(" Yarn ".parse::<PackageManagerKind>(), Ok(PackageManagerKind::Yarn));
    assert!("bower".parse::<PackageManagerKind>().is_err());
}
