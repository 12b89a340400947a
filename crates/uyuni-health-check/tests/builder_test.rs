//! Integration tests for the ArtifactBuilder component

mod support;

use axum::{Router, http::StatusCode, routing::get};
use common::Error;
use std::io::{Cursor, Write};
use std::net::SocketAddr;
use std::path::Path;
use support::{ScriptedRunner, fail, streamed};
use tokio::net::TcpListener;
use uyuni_health_check::types::ReleaseAsset;
use uyuni_health_check::{ArtifactBuilder, ArtifactSpec, ProcessRunner};

/// Serve the router on an ephemeral local port
async fn serve(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn release_archive() -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut cursor);
        writer
            .start_file("logcli-linux-amd64", zip::write::FileOptions::default())
            .unwrap();
        writer.write_all(b"\x7fELF fake logcli").unwrap();
        writer.finish().unwrap();
    }
    cursor.into_inner()
}

#[tokio::test]
async fn test_build_streams_output_lines() {
    let runner = ScriptedRunner::new().on(
        "podman build",
        streamed(&["STEP 1/3: FROM opensuse/leap", "STEP 2/3: COPY . /opt", "COMMIT exporter"]),
    );
    let builder = ArtifactBuilder::new(&runner, "podman");

    let mut lines = Vec::new();
    builder
        .build_image("exporter", Path::new("/srv/exporter"), &mut |line: &str| {
            lines.push(line.to_string())
        })
        .await
        .unwrap();

    assert_eq!(
        lines,
        vec!["STEP 1/3: FROM opensuse/leap", "STEP 2/3: COPY . /opt", "COMMIT exporter"]
    );
    let calls = runner.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].streaming);
    assert_eq!(calls[0].command, "podman build -t exporter /srv/exporter");
}

#[tokio::test]
async fn test_failed_build_names_the_artifact() {
    let runner = ScriptedRunner::new().on("podman build", fail(1, "Error: no Containerfile\n"));
    let builder = ArtifactBuilder::new(&runner, "podman");

    let err = builder
        .build_image("exporter", Path::new("/srv/exporter"), &mut |_: &str| {})
        .await
        .unwrap_err();

    match err {
        Error::BuildFailed { artifact } => assert_eq!(artifact, "exporter"),
        other => panic!("expected a build failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_runtime_is_infrastructure_missing() {
    let runner = ProcessRunner::new();
    let builder = ArtifactBuilder::new(&runner, "uyuni-hc-no-such-runtime");

    let err = builder
        .build_image("exporter", Path::new("/srv/exporter"), &mut |_: &str| {})
        .await
        .unwrap_err();

    assert!(err.is_infrastructure_missing(), "got {:?}", err);
    assert!(!matches!(err, Error::CommandFailed { .. }));
}

#[tokio::test]
async fn test_process_build_failure() {
    // `false` stands in for a runtime whose build exits non-zero
    let runner = ProcessRunner::new();
    let builder = ArtifactBuilder::new(&runner, "false");

    let err = builder
        .build_image("exporter", Path::new("/srv/exporter"), &mut |_: &str| {})
        .await
        .unwrap_err();

    assert!(matches!(err, Error::BuildFailed { .. }), "got {:?}", err);
}

#[tokio::test]
async fn test_release_is_provisioned_before_build() {
    let addr = serve(Router::new().route(
        "/logcli-linux-amd64.zip",
        get(|| async { release_archive() }),
    ))
    .await;

    let context = tempfile::tempdir().unwrap();
    let spec = ArtifactSpec {
        name: "logcli".to_string(),
        context_dir: context.path().to_path_buf(),
        release: Some(ReleaseAsset {
            url: format!("http://{}/logcli-linux-amd64.zip", addr),
            member: "logcli-linux-amd64".to_string(),
        }),
    };

    let runner = ScriptedRunner::new();
    let builder = ArtifactBuilder::new(&runner, "podman");
    builder.build_artifact(&spec, &mut |_: &str| {}).await.unwrap();

    let binary = context.path().join("logcli-linux-amd64");
    assert_eq!(std::fs::read(&binary).unwrap(), b"\x7fELF fake logcli");
    assert_eq!(runner.count("podman build -t logcli"), 1);
}

#[tokio::test]
async fn test_release_download_failure_skips_build() {
    let addr = serve(Router::new().route(
        "/logcli-linux-amd64.zip",
        get(|| async { StatusCode::NOT_FOUND }),
    ))
    .await;

    let context = tempfile::tempdir().unwrap();
    let spec = ArtifactSpec {
        name: "logcli".to_string(),
        context_dir: context.path().to_path_buf(),
        release: Some(ReleaseAsset {
            url: format!("http://{}/logcli-linux-amd64.zip", addr),
            member: "logcli-linux-amd64".to_string(),
        }),
    };

    let runner = ScriptedRunner::new();
    let builder = ArtifactBuilder::new(&runner, "podman");
    let err = builder.build_artifact(&spec, &mut |_: &str| {}).await.unwrap_err();

    assert!(matches!(err, Error::Download(_)), "got {:?}", err);
    assert!(runner.calls().is_empty());
}
