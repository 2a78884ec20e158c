/// File lifecycle tests - a tailed path goes through absence, creation,
/// growth, rotation and deletion while one stream follows it.
use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use tempfile::TempDir;
use tokio::time::timeout;
use tokio_stream::StreamExt;

use livelog::render::{
    NOTICE_CREATED, NOTICE_DISAPPEARED, NOTICE_NOT_YET, NOTICE_RECREATED, notice,
};
use livelog::{Chunks, SourceRegistry, TailSettings};

fn registry(dir: &Path) -> SourceRegistry {
    SourceRegistry::new(dir, "*")
        .unwrap()
        .with_settings(TailSettings {
            poll_interval: Duration::from_millis(10),
            ..TailSettings::default()
        })
}

async fn next(chunks: &mut Chunks) -> String {
    timeout(Duration::from_secs(5), chunks.next())
        .await
        .expect("chunk within timeout")
        .expect("stream still open")
}

/// Collect chunks until `want` has been seen as content.
async fn content_until(chunks: &mut Chunks, want: &str) -> String {
    let mut seen = String::new();
    while !seen.contains(want) {
        let chunk = next(chunks).await;
        assert!(!chunk.contains("khaki"), "unexpected notice {chunk}");
        seen.push_str(&chunk);
    }
    seen
}

fn append(path: &Path, text: &str) {
    let mut f = fs::OpenOptions::new().append(true).open(path).unwrap();
    f.write_all(text.as_bytes()).unwrap();
}

#[tokio::test]
async fn test_missing_created_rotated_deleted() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("app.log");
    let mut chunks = registry(dir.path()).open("app.log").unwrap();

    assert_eq!(next(&mut chunks).await, notice(NOTICE_NOT_YET));

    fs::write(&path, "hello\n").unwrap();
    assert_eq!(next(&mut chunks).await, notice(NOTICE_CREATED));
    assert_eq!(content_until(&mut chunks, "hello").await, "hello<br>");

    append(&path, "ERROR boom\n");
    let seen = content_until(&mut chunks, "boom").await;
    assert!(seen.starts_with(r#"<span style="color: red">"#));

    // Rename over the path so the replacement is a different file instance
    let staged = dir.path().join("app.log.new");
    fs::write(&staged, "world\n").unwrap();
    fs::rename(&staged, &path).unwrap();
    assert_eq!(next(&mut chunks).await, notice(NOTICE_RECREATED));
    assert_eq!(content_until(&mut chunks, "world").await, "world<br>");

    fs::remove_file(&path).unwrap();
    assert_eq!(next(&mut chunks).await, notice(NOTICE_DISAPPEARED));

    fs::write(&path, "again\n").unwrap();
    assert_eq!(next(&mut chunks).await, notice(NOTICE_CREATED));
    assert_eq!(content_until(&mut chunks, "again").await, "again<br>");
}

#[tokio::test]
async fn test_partial_line_is_withheld_until_completed() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("slow.log");
    fs::write(&path, "first\nsec").unwrap();
    let mut chunks = registry(dir.path()).open("slow.log").unwrap();

    assert_eq!(next(&mut chunks).await, "first<br>");
    append(&path, "ond\n");
    assert_eq!(next(&mut chunks).await, "second<br>");
}

#[tokio::test]
async fn test_partial_line_is_flushed_before_disappearing() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cut.log");
    fs::write(&path, "done\nunfinished").unwrap();
    let mut chunks = registry(dir.path()).open("cut.log").unwrap();

    assert_eq!(next(&mut chunks).await, "done<br>");
    fs::remove_file(&path).unwrap();
    assert_eq!(next(&mut chunks).await, "unfinished<br>");
    assert_eq!(next(&mut chunks).await, notice(NOTICE_DISAPPEARED));
}

#[cfg(unix)]
#[tokio::test]
async fn test_symlink_created_after_open_is_not_followed_outside() {
    let dir = TempDir::new().unwrap();
    let outside = TempDir::new().unwrap();
    let secret = outside.path().join("secret.log");
    fs::write(&secret, "TOPSECRET\n").unwrap();
    let path = dir.path().join("late.log");
    let mut chunks = registry(dir.path()).open("late.log").unwrap();

    assert_eq!(next(&mut chunks).await, notice(NOTICE_NOT_YET));

    std::os::unix::fs::symlink(&secret, &path).unwrap();
    let leaked = timeout(Duration::from_millis(300), chunks.next()).await;
    assert!(leaked.is_err(), "unexpected chunk {leaked:?}");

    fs::remove_file(&path).unwrap();
    fs::write(&path, "inside\n").unwrap();
    assert_eq!(next(&mut chunks).await, notice(NOTICE_CREATED));
    let seen = content_until(&mut chunks, "inside").await;
    assert_eq!(seen, "inside<br>");
}
