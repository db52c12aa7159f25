//! Runs the remux step against shell scripts standing in for ffmpeg.
//!
//! Everything lives in one test: executing a script while another test thread
//! still holds a freshly written one open fails with ETXTBSY.

#![cfg(unix)]

use bpdl::{
    Credential, DALVIK_USER_AGENT, Error, Logger, RemuxError, Remuxer, StreamConfig,
    StreamDownloader,
};
use chrono::Utc;
use mockito::Server;
use std::{
    fs,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    time::Duration,
};

/// Copies its input to its output, like a stream copy of identical containers would.
const COPYING_FFMPEG: &str = r#"#!/bin/sh
prev=""
for arg in "$@"; do
    if [ "$prev" = "-i" ]; then input="$arg"; fi
    prev="$arg"
    output="$arg"
done
cp "$input" "$output"
"#;

/// Leaves a truncated output behind and fails.
const FAILING_FFMPEG: &str = r#"#!/bin/sh
for arg in "$@"; do output="$arg"; done
printf 'partial' > "$output"
echo "Invalid data found when processing input" >&2
exit 1
"#;

/// Starts writing its output, then hangs.
const HANGING_FFMPEG: &str = r#"#!/bin/sh
for arg in "$@"; do output="$arg"; done
printf 'partial' > "$output"
exec sleep 30
"#;

fn script(dir: &Path, name: &str, text: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, text).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[tokio::test]
async fn remux_with_fake_ffmpeg() {
    let dir = tempfile::tempdir().unwrap();
    let copying = script(dir.path(), "ffmpeg-copy", COPYING_FFMPEG);
    let failing = script(dir.path(), "ffmpeg-fail", FAILING_FFMPEG);
    let hanging = script(dir.path(), "ffmpeg-hang", HANGING_FFMPEG);

    // Success: output written, transient file gone.
    let output = dir.path().join("music").join("ok.m4a");
    Remuxer::new(Some(copying.clone()), Logger::silent())
        .unwrap()
        .remux(b"\xff\xf1adts", &output)
        .await
        .unwrap();

    assert_eq!(fs::read(&output).unwrap(), b"\xff\xf1adts");
    assert!(!dir.path().join("music").join("ok.m4a.temp.aac").exists());

    // Failure: neither the partial output nor the transient file survive.
    let output = dir.path().join("broken.m4a");
    let result = Remuxer::new(Some(failing), Logger::silent())
        .unwrap()
        .remux(b"\xff\xf1adts", &output)
        .await;

    match result {
        Err(RemuxError::RemuxFailed { stderr, .. }) => {
            assert!(stderr.contains("Invalid data found"));
        }
        x => panic!("unexpected result: {:?}", x),
    }
    assert!(!output.exists());
    assert!(!dir.path().join("broken.m4a.temp.aac").exists());

    // Missing binary.
    let output = dir.path().join("nothing.m4a");
    let result = Remuxer::new(Some(dir.path().join("no-such-ffmpeg")), Logger::silent())
        .unwrap()
        .remux(b"raw", &output)
        .await;

    assert!(matches!(result, Err(RemuxError::RemuxFailed { .. })));
    assert!(!output.exists());
    assert!(!dir.path().join("nothing.m4a.temp.aac").exists());

    // Whole pipeline, unencrypted stream: the copying ffmpeg exposes the merged bytes.
    let mut server = Server::new_async().await;
    let stream_url = format!("{}/a/b/file.m3u8", server.url());

    server
        .mock("GET", "/v4/catalog/tracks/17/stream/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(serde_json::json!({ "stream_url": stream_url }).to_string())
        .create_async()
        .await;
    server
        .mock("GET", "/a/b/file.m3u8")
        .with_status(200)
        .with_body("#EXTM3U\n#EXT-X-TARGETDURATION:10\n#EXTINF:10.0,\nseg-0.aac\n#EXTINF:10.0,\nseg-1.aac\n#EXT-X-ENDLIST\n")
        .create_async()
        .await;
    server
        .mock("GET", "/a/b/seg-0.aac")
        .with_status(200)
        .with_body("first-")
        .create_async()
        .await;
    server
        .mock("GET", "/a/b/seg-1.aac")
        .with_status(200)
        .with_body("second")
        .create_async()
        .await;

    let config = StreamConfig {
        api_base: format!("{}/v4", server.url()),
        media_user_agent: DALVIK_USER_AGENT.to_owned(),
        ffmpeg: Some(copying),
        ..StreamConfig::default()
    };
    let downloader = StreamDownloader::new(&config, Logger::silent()).unwrap();
    let credential = Credential::new("access", "refresh", 3600, Utc::now());
    let output = dir.path().join("17.m4a");

    let saved = downloader
        .download("17", &credential, &output)
        .await
        .unwrap();

    assert_eq!(saved, output);
    assert_eq!(fs::read(&output).unwrap(), b"first-second");
    assert!(!dir.path().join("17.m4a.temp.aac").exists());

    // Remux failure through the pipeline surfaces as a remux error.
    let config = StreamConfig {
        ffmpeg: Some(dir.path().join("ffmpeg-fail")),
        ..config
    };
    let output = dir.path().join("18.m4a");
    let result = StreamDownloader::new(&config, Logger::silent())
        .unwrap()
        .download("17", &credential, &output)
        .await;

    assert!(matches!(
        result,
        Err(Error::Remux(RemuxError::RemuxFailed { .. }))
    ));
    assert!(!output.exists());

    // Dropping the download while ffmpeg runs removes everything it started.
    let config = StreamConfig {
        ffmpeg: Some(hanging),
        ..config
    };
    let output = dir.path().join("19.m4a");
    let downloader = StreamDownloader::new(&config, Logger::silent()).unwrap();
    let result = tokio::time::timeout(
        Duration::from_millis(1500),
        downloader.download("17", &credential, &output),
    )
    .await;

    assert!(result.is_err());
    assert!(!output.exists());
    assert!(!dir.path().join("19.m4a.temp.aac").exists());
}
