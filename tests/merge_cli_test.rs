use predicates::prelude::*;
use serde_json::{Value, json};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    fs::write(path, content).expect("write");
}

fn write_archive(root: &Path, generated: &str, tweets: Value, profile_name: &str) {
    let manifest = json!({
        "userInfo": {"accountId": "42", "userName": "alice", "displayName": profile_name},
        "archiveInfo": {"generationDate": generated},
        "dataTypes": {
            "tweets": {
                "files": [{"fileName": "data/tweets.js", "globalName": "YTD.tweets.part0", "count": "0"}],
                "mediaDirectory": "data/tweets_media"
            },
            "profile": {
                "files": [{"fileName": "data/profile.js", "globalName": "YTD.profile.part0", "count": "1"}]
            },
            "tweetsMedia": {"mediaDirectory": "data/tweets_media"}
        }
    });
    write(root, "data/manifest.js", &format!("window.__THAR_CONFIG = {manifest};"));
    write(root, "data/tweets.js", &format!("window.YTD.tweets.part0 = {tweets}"));
    write(
        root,
        "data/profile.js",
        &format!(
            "window.YTD.profile.part0 = {}",
            json!([{"profile": {"description": {"bio": profile_name}}}])
        ),
    );
}

fn payload(path: &Path) -> Value {
    let raw = fs::read_to_string(path).expect("read");
    let start = raw.find('=').expect("assignment") + 1;
    let body = raw[start..].trim().trim_end_matches(';');
    serde_json::from_str(body).expect("json payload")
}

fn merger(home: &Path) -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("archive-merger");
    cmd.current_dir(home)
        .env("MERGE_HOME", home)
        .env("MERGE_CHECK_FREE_SPACE", "false");
    cmd
}

#[test]
fn merge_writes_deduplicated_archive() {
    let tmp = tempdir().expect("tempdir");
    let a = tmp.path().join("2022");
    let b = tmp.path().join("2023");
    let out = tmp.path().join("merged");
    write_archive(
        &a,
        "2022-01-05T12:00:00.000Z",
        json!([{"tweet": {"id_str": "1", "full_text": "hello"}}]),
        "Alice",
    );
    write_archive(
        &b,
        "2023-06-05T12:00:00.000Z",
        json!([
            {"tweet": {"id_str": "1", "full_text": "hello"}},
            {"tweet": {"id_str": "2", "full_text": "world"}}
        ]),
        "Alice Smith",
    );
    write(&b, "data/tweets_media/1-photo.jpg", "jpeg bytes");

    merger(tmp.path())
        .arg("merge")
        .arg(&b)
        .arg(&a)
        .arg("--output")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("merge: ok"))
        .stdout(predicate::str::contains("type=tweets merged=3 kept=2 removed=1"))
        .stdout(predicate::str::contains("duplicates_removed=1"))
        .stdout(predicate::str::contains("snapshots_superseded=1"));

    let tweets = payload(&out.join("data/tweets.js"));
    assert_eq!(tweets.as_array().expect("tweets").len(), 2);
    let profile = payload(&out.join("data/profile.js"));
    assert_eq!(profile[0]["profile"]["description"]["bio"], "Alice Smith");
    assert!(out.join("data/tweets_media/1-photo.jpg").is_file());

    let manifest = payload(&out.join("data/manifest.js"));
    assert_eq!(manifest["dataTypes"]["tweets"]["files"][0]["count"], "2");
    assert_eq!(
        manifest["dataTypes"]["tweetsMedia"]["mediaDirectory"],
        "data/tweets_media"
    );
    assert_eq!(manifest["userInfo"]["displayName"], "Alice Smith");

    let audit = fs::read_to_string(tmp.path().join("logs/audit.log")).expect("audit log");
    assert!(audit.contains("\"status\":\"started\""));
    assert!(audit.contains("\"status\":\"ok\""));
}

#[test]
fn merge_refuses_non_empty_output_without_force() {
    let tmp = tempdir().expect("tempdir");
    let a = tmp.path().join("a");
    let out = tmp.path().join("merged");
    write_archive(
        &a,
        "2022-01-05T12:00:00.000Z",
        json!([{"tweet": {"id_str": "1"}}]),
        "Alice",
    );
    write(&out, "notes.txt", "keep me");

    merger(tmp.path())
        .arg("merge")
        .arg(&a)
        .arg("--output")
        .arg(&out)
        .assert()
        .failure()
        .stdout(predicate::str::contains("not empty"));
    assert!(!out.join("data/manifest.js").exists());

    merger(tmp.path())
        .arg("merge")
        .arg(&a)
        .arg("--output")
        .arg(&out)
        .arg("--force")
        .assert()
        .success();
    assert!(out.join("data/manifest.js").exists());
    assert!(out.join("notes.txt").exists());
}

#[test]
fn merge_with_only_invalid_sources_fails() {
    let tmp = tempdir().expect("tempdir");
    let bogus = tmp.path().join("bogus");
    fs::create_dir_all(&bogus).expect("mkdir");
    let out = tmp.path().join("merged");

    merger(tmp.path())
        .arg("merge")
        .arg(&bogus)
        .arg("--output")
        .arg(&out)
        .arg("--json")
        .assert()
        .failure()
        .stdout(predicate::str::contains("\"ok\": false"))
        .stdout(predicate::str::contains("no valid archives"));
}

#[test]
fn merge_warns_and_skips_invalid_source() {
    let tmp = tempdir().expect("tempdir");
    let good = tmp.path().join("good");
    let bogus = tmp.path().join("bogus");
    fs::create_dir_all(&bogus).expect("mkdir");
    write_archive(
        &good,
        "2022-01-05T12:00:00.000Z",
        json!([{"tweet": {"id_str": "1"}}]),
        "Alice",
    );
    let out = tmp.path().join("merged");

    merger(tmp.path())
        .arg("merge")
        .arg(&bogus)
        .arg(&good)
        .arg("--output")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("archives_skipped=1"))
        .stderr(predicate::str::contains("MERGE_WARN code=INVALID_ARCHIVE"));
}

#[test]
fn media_from_renamed_directories_lands_in_one_place() {
    let tmp = tempdir().expect("tempdir");
    let old = tmp.path().join("2019");
    let new = tmp.path().join("2023");
    let out = tmp.path().join("merged");
    for (root, generated, dir, file) in [
        (&old, "2019-03-01T00:00:00.000Z", "data/direct_message_media", "old.jpg"),
        (&new, "2023-03-01T00:00:00.000Z", "data/direct_messages_media", "new.jpg"),
    ] {
        let manifest = json!({
            "userInfo": {"userName": "alice"},
            "archiveInfo": {"generationDate": generated},
            "dataTypes": {
                "directMessages": {
                    "files": [{
                        "fileName": "data/direct-messages.js",
                        "globalName": "YTD.direct_messages.part0",
                        "count": "1"
                    }],
                    "mediaDirectory": dir
                },
                "directMessagesMedia": {"mediaDirectory": dir}
            }
        });
        write(root, "data/manifest.js", &format!("window.__THAR_CONFIG = {manifest};"));
        write(
            root,
            "data/direct-messages.js",
            &format!(
                "window.YTD.direct_messages.part0 = {}",
                json!([{"dmConversation": {"conversationId": "1-2", "messages": []}}])
            ),
        );
        write(root, &format!("{dir}/{file}"), file);
    }

    merger(tmp.path())
        .arg("merge")
        .arg(&old)
        .arg(&new)
        .arg("--output")
        .arg(&out)
        .assert()
        .success();

    let media = out.join("data/direct_messages_media");
    assert!(media.join("old.jpg").is_file());
    assert!(media.join("new.jpg").is_file());
    assert!(!out.join("data/direct_message_media").exists());

    let manifest = payload(&out.join("data/manifest.js"));
    assert_eq!(
        manifest["dataTypes"]["directMessages"]["mediaDirectory"],
        "data/direct_messages_media"
    );
    assert_eq!(
        manifest["dataTypes"]["directMessagesMedia"]["mediaDirectory"],
        "data/direct_messages_media"
    );
    assert_eq!(manifest["dataTypes"]["directMessages"]["files"][0]["count"], "1");
}
