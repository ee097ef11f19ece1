#![cfg(unix)]

use std::{os::unix::fs::PermissionsExt, path::Path, sync::Arc};

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::{Value, json};
use tower::ServiceExt;
use videosnap::{
    backend::LocalExtractor,
    config::RelayConfig,
    routes::{AppState, build_router},
};

const KEY: &str = "local-key";
const DOWNLOAD_LEN: usize = 20_000;

/// Stand-in for yt-dlp: `-J` prints metadata, anything else writes a `.webm`
/// next to the `-o` template (as a remux to another container would) and
/// prints its path.
const FAKE_YT_DLP: &str = r#"#!/bin/sh
if [ "$1" = "-J" ]; then
  echo '{"title":"Ignored","_filename":"/tmp/My_Clip-Title.webm","thumbnail":"https://i.example/t.jpg","duration":12.5,"formats":[{"vcodec":"none","height":null},{"vcodec":"vp9","height":1080}]}'
  exit 0
fi
while [ $# -gt 0 ]; do
  if [ "$1" = "-o" ]; then
    template="$2"
  fi
  shift
done
out="${template%.*}.webm"
head -c 20000 /dev/zero > "$out"
echo "[download] finished"
echo "$out"
"#;

fn install_fake_binary(dir: &Path) -> String {
    let path = dir.join("fake-yt-dlp");
    std::fs::write(&path, FAKE_YT_DLP).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path.to_string_lossy().into_owned()
}

fn leftover_jobs(transfer_dir: &Path) -> usize {
    std::fs::read_dir(transfer_dir).unwrap().count()
}

#[tokio::test]
async fn test_local_backend_probes_and_relays_printed_file() {
    let bin_dir = tempfile::tempdir().unwrap();
    let transfer_dir = tempfile::tempdir().unwrap();
    let binary = install_fake_binary(bin_dir.path());

    let config = RelayConfig::from_lookup(|name| match name {
        "API_KEY" => Some(KEY.to_string()),
        "BACKEND" => Some("local".to_string()),
        _ => None,
    })
    .unwrap();
    let extractor = Arc::new(LocalExtractor::new(&binary, transfer_dir.path()));
    let router = build_router(AppState::new(&config, extractor), &config.allowed_origins);

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/info")
                .header("x-api-key", KEY)
                .header("content-type", "application/json")
                .body(Body::from(json!({ "url": "https://youtu.be/abc" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let info: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(info["title"], "My Clip Title");
    assert_eq!(info["thumbnail"], "https://i.example/t.jpg");
    assert_eq!(info["duration"], 12.5);
    assert_eq!(info["formats"].as_array().unwrap().len(), 3);

    let response = router
        .oneshot(
            Request::builder()
                .uri("/download?url=https%3A%2F%2Fyoutu.be%2Fabc&format=mp4-1080")
                .header("x-api-key", KEY)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "video/mp4");
    assert_eq!(
        response.headers()["content-disposition"],
        "attachment; filename=\"videosnap.mp4\""
    );
    assert_eq!(leftover_jobs(transfer_dir.path()), 1);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(body.len(), DOWNLOAD_LEN);
    assert!(body.iter().all(|byte| *byte == 0));
    assert_eq!(leftover_jobs(transfer_dir.path()), 0);
}
