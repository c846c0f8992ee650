//! End-to-end CLI tests for the thesis-downloader binary.

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;
use thesis_downloader_core::{CacheOutcome, DedupCache, ItemId};

fn cmd(config_home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("thesis-downloader").unwrap();
    cmd.env("XDG_CONFIG_HOME", config_home).env_remove("RUST_LOG");
    cmd
}

async fn seed_cache(path: &Path, ids: &[&str]) {
    let cache = DedupCache::open(path).await.unwrap();
    for id in ids {
        cache
            .set(
                &ItemId::parse(id).unwrap(),
                &CacheOutcome::NotFound {
                    reason: "no-document-link: page had no document link".to_string(),
                },
            )
            .await
            .unwrap();
    }
    cache.close().await;
}

#[test]
fn test_binary_help_displays_usage() {
    let home = TempDir::new().unwrap();
    cmd(home.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Resolve and download thesis documents"));
}

#[test]
fn test_binary_without_subcommand_fails() {
    let home = TempDir::new().unwrap();
    cmd(home.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_run_with_missing_input_fails() {
    let home = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    cmd(home.path())
        .args(["-q", "run", "does-not-exist.txt"])
        .arg(out.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read input file"));
}

#[test]
fn test_run_without_output_dir_fails() {
    let home = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    let input = work.path().join("list.txt");
    std::fs::write(&input, "https://r.org/view?id=1\n").unwrap();
    cmd(home.path())
        .args(["-q", "run"])
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("output"));
}

#[test]
fn test_run_counts_rejected_lines_and_creates_cache() {
    let home = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    let input = work.path().join("list.txt");
    std::fs::write(
        &input,
        "# export\nhttps://r.org/view?id=abc\nhttps://orcid.org/0000?id=5\nnot a url=6\n",
    )
    .unwrap();
    let out = work.path().join("out");

    cmd(home.path())
        .args(["-q", "run"])
        .arg(&input)
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "3 items: 0 saved, 0 already done, 0 not found, 3 rejected (0 retries)",
        ));
    assert!(out.join(".thesis-downloader").join("cache.db").exists());
}

#[test]
fn test_run_rejects_invalid_config() {
    let home = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    let config = work.path().join("config.toml");
    std::fs::write(&config, "concurrency = 0\n").unwrap();
    let input = work.path().join("list.txt");
    std::fs::write(&input, "").unwrap();

    cmd(home.path())
        .args(["-q", "--config"])
        .arg(&config)
        .arg("run")
        .arg(&input)
        .arg(work.path().join("out"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("concurrency"));
}

#[test]
fn test_run_reads_output_dir_from_config() {
    let home = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    let out = work.path().join("from-config");
    let config_dir = home.path().join("thesis-downloader");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(
        config_dir.join("config.toml"),
        format!("output_dir = \"{}\" # documents\n", out.display()),
    )
    .unwrap();
    let input = work.path().join("list.txt");
    std::fs::write(&input, "https://r.org/no-id\n").unwrap();

    cmd(home.path())
        .args(["-q", "run"])
        .arg(&input)
        .assert()
        .success();
    assert!(out.is_dir());
}

#[tokio::test]
async fn test_cache_count_and_forget() {
    let home = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    let db = work.path().join("cache.db");
    seed_cache(&db, &["10", "11"]).await;

    cmd(home.path())
        .args(["-q", "cache", "--cache"])
        .arg(&db)
        .arg("count")
        .assert()
        .success()
        .stdout("2\n");

    cmd(home.path())
        .args(["-q", "cache", "--cache"])
        .arg(&db)
        .args(["forget", "10"])
        .assert()
        .success()
        .stdout(predicate::str::contains("forgot 10"));

    cmd(home.path())
        .args(["-q", "cache", "--cache"])
        .arg(&db)
        .args(["forget", "10"])
        .assert()
        .success()
        .stdout(predicate::str::contains("no record for 10"));

    cmd(home.path())
        .args(["-q", "cache", "--cache"])
        .arg(&db)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("11\tnot_found\t"));
}

#[tokio::test]
async fn test_cache_forget_rejects_non_numeric_id() {
    let home = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    let db = work.path().join("cache.db");
    seed_cache(&db, &[]).await;

    cmd(home.path())
        .args(["-q", "cache", "--cache"])
        .arg(&db)
        .args(["forget", "abc"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no numeric item id"));
}
