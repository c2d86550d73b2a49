use flate2::Compression;
use flate2::write::GzEncoder;
use predicates::prelude::*;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::tempdir;

fn write_sca(root: &Path, year: &str, name: &str, lines: &[&str]) {
    let dir = root.join("sca").join(year);
    fs::create_dir_all(&dir).expect("mkdir");
    let mut enc = GzEncoder::new(fs::File::create(dir.join(name)).expect("create"), Compression::default());
    for line in lines {
        writeln!(enc, "{line}").expect("write");
    }
    enc.finish().expect("finish");
}

fn scx(home: &Path) -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("scx-archive");
    cmd.current_dir(home)
        .env("HOME", home)
        .env("SCX_HOME", home.join("scx"))
        .env("SCX_CONFIG_PATH", home.join("no-config.toml"))
        .env_remove("SCX_USERS_FILE");
    cmd
}

fn seed_archive(root: &Path) {
    write_sca(
        root,
        "2010",
        "sca20100105.log.gz",
        &[
            "L1234 | 10:00 | 四般南喰赤 | ally(+30.0) bob(+10.0) carol(-15.0) dave(-25.0)",
            "L1234 | 11:00 | 三般南喰赤 | bob(+10.0) carol(-5.0) dave(-5.0)",
            "L5555 | 12:00 | 三般南喰赤 | alice(+10.0) carol(-5.0) dave(-5.0)",
        ],
    );
    write_sca(
        root,
        "2010",
        "sca20100301.log.gz",
        &["L1234 | 21:15 | 三般東喰 | carol(+12.5) alice(-2.5) eve(-10.0)"],
    );
}

fn add_alice(home: &Path) {
    scx(home)
        .args(["users", "add", "alice", "ally"])
        .assert()
        .success();
}

#[test]
fn grep_prints_matching_lines_with_canonical_names() {
    let tmp = tempdir().expect("tempdir");
    let root = tmp.path().join("archive");
    seed_archive(&root);
    add_alice(tmp.path());

    scx(tmp.path())
        .arg("--root")
        .arg(&root)
        .args(["grep", "L1234", "-s", "2010-01-01", "-e", "2010-12-31"])
        .assert()
        .success()
        .stdout(
            "L1234 | 10:00 | 四般南喰赤 | alice(+30.0) bob(+10.0) carol(-15.0) dave(-25.0)\n\
             L1234 | 21:15 | 三般東喰 | carol(+12.5) alice(-2.5) eve(-10.0)\n",
        )
        .stderr(predicate::str::contains("matched=2"));
}

#[test]
fn grep_jsonlines_respects_date_range() {
    let tmp = tempdir().expect("tempdir");
    let root = tmp.path().join("archive");
    seed_archive(&root);
    add_alice(tmp.path());

    let output = scx(tmp.path())
        .arg("--root")
        .arg(&root)
        .args(["grep", "L1234", "-s", "2010-02-01", "-e", "2010-03-01", "-f", "jsonlines"])
        .output()
        .expect("run");
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).expect("utf8");
    let lines: Vec<serde_json::Value> = stdout
        .lines()
        .map(|l| serde_json::from_str(l).expect("json line"))
        .collect();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["start"], "2010-03-01T21:15:00+09:00");
    assert_eq!(lines[0]["scores"][0]["score"], 12.5);
}

#[test]
fn grep_reports_missing_year_and_continues() {
    let tmp = tempdir().expect("tempdir");
    let root = tmp.path().join("archive");
    seed_archive(&root);
    add_alice(tmp.path());

    scx(tmp.path())
        .arg("--root")
        .arg(&root)
        .args(["grep", "L1234", "-s", "2009-06-01", "-e", "2010-01-31", "-f", "json"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("[\n"))
        .stdout(predicate::str::contains("\"lobby\":\"L1234\""))
        .stderr(predicate::str::contains("SCX_WARN code=NO_DATA_FOR_YEAR stage=grep"))
        .stderr(predicate::str::contains("no_data_for_year=2009"));
}

#[test]
fn grep_without_users_file_matches_nothing() {
    let tmp = tempdir().expect("tempdir");
    let root = tmp.path().join("archive");
    seed_archive(&root);

    scx(tmp.path())
        .arg("--root")
        .arg(&root)
        .args(["grep", "L1234", "-s", "2010-01-01", "-e", "2010-12-31"])
        .assert()
        .success()
        .stdout("");
}

#[test]
fn grep_rejects_bad_lobby() {
    let tmp = tempdir().expect("tempdir");
    scx(tmp.path())
        .args(["grep", "X12"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid lobby format"));
}

#[test]
fn grep_aborts_on_malformed_line() {
    let tmp = tempdir().expect("tempdir");
    let root = tmp.path().join("archive");
    write_sca(
        &root,
        "2010",
        "sca20100105.log.gz",
        &["L1234 | 25:00 | 三般南喰赤 | alice(+10.0) bob(-5.0) carol(-5.0)"],
    );
    add_alice(tmp.path());

    scx(tmp.path())
        .arg("--root")
        .arg(&root)
        .args(["grep", "L1234", "-s", "2010-01-01", "-e", "2010-12-31"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to parse"))
        .stderr(predicate::str::contains("sca20100105.log.gz"));
}
