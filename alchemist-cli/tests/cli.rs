use alchemist_archive::zip::{self, EndOfCentralDir};
use alchemist_core::entry::Entry;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::tempdir;

fn alchemist(archive: &Path) -> Result<Command, Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("archive-alchemist")?;
    cmd.arg("-f").arg(archive);
    Ok(cmd)
}

#[test]
fn test_cli_add_list_read_cycle() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let archive = dir.path().join("test.zip");

    alchemist(&archive)?
        .args(["add", "../../evil.txt", "--content", "pwned"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Added ../../evil.txt"));
    assert!(archive.exists());

    alchemist(&archive)?
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("../../evil.txt"));

    alchemist(&archive)?
        .args(["read", "../../evil.txt"])
        .assert()
        .success()
        .stdout("pwned");

    Ok(())
}

#[test]
fn test_cli_collision_last_wins() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let archive = dir.path().join("collide.tar");

    alchemist(&archive)?
        .args(["add", "config.txt", "--symlink", "/etc/passwd"])
        .assert()
        .success();
    alchemist(&archive)?
        .args(["add", "config.txt", "--content", "X"])
        .assert()
        .success();

    alchemist(&archive)?
        .args(["read", "config.txt", "-i", "0"])
        .assert()
        .success()
        .stdout("/etc/passwd\n");

    let out = dir.path().join("out");
    alchemist(&archive)?
        .arg("extract")
        .arg("-o")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("Extraction complete"));
    assert_eq!(fs::read(out.join("config.txt"))?, b"X");

    Ok(())
}

#[test]
fn test_cli_setuid_long_listing() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let archive = dir.path().join("suid.tar.gz");

    alchemist(&archive)?
        .args(["add", "bin/tool", "--content", "x", "--mode", "755", "--setuid"])
        .assert()
        .success();

    alchemist(&archive)?
        .args(["list", "-l"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("-rwsr-xr-x")
                .and(predicate::str::contains("4755"))
                .and(predicate::str::contains("Permissions Mode")),
        );

    Ok(())
}

#[test]
fn test_cli_raw_listings() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;

    let zip = dir.path().join("raw.zip");
    alchemist(&zip)?
        .args(["add", "a.txt", "--content", "alpha", "--unicode-path", "b.txt"])
        .assert()
        .success();
    alchemist(&zip)?
        .args(["list", "-ll"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("b.txt (U) a.txt (C) a.txt (L)")
                .and(predicate::str::contains("MATCH"))
                .and(predicate::str::contains("End of central directory")),
        );

    let tar = dir.path().join("raw.tar");
    alchemist(&tar)?
        .args(["add", "a.txt", "--content", "alpha"])
        .assert()
        .success();
    alchemist(&tar)?
        .args(["list", "-ll"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("File: a.txt")
                .and(predicate::str::contains("USTAR format: Yes"))
                .and(predicate::str::contains("VALID")),
        );

    Ok(())
}

#[test]
fn test_cli_json_listing() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let archive = dir.path().join("j.zip");

    alchemist(&archive)?
        .args(["add", "link", "--symlink", "/etc/shadow"])
        .assert()
        .success();

    let output = alchemist(&archive)?.args(["list", "--json"]).output()?;
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(value["format"], "zip");
    assert_eq!(value["entries"][0]["kind"], "symlink");
    assert_eq!(value["entries"][0]["target"], "/etc/shadow");

    Ok(())
}

#[test]
fn test_cli_append_modify_remove() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let archive = dir.path().join("m.tar");

    alchemist(&archive)?
        .args(["add", "dir/log.txt", "--content", "one\n"])
        .assert()
        .success();
    alchemist(&archive)?
        .args(["append", "dir/log.txt", "--content", "two\n"])
        .assert()
        .success();
    alchemist(&archive)?
        .args(["cat", "dir/log.txt"])
        .assert()
        .success()
        .stdout("one\ntwo\n");

    alchemist(&archive)?
        .args(["modify", "dir/log.txt", "--uid", "0", "--gid", "0", "--sticky"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Modified attributes of dir/log.txt"));

    alchemist(&archive)?
        .args(["rm", "dir", "--recursive", "false"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
    alchemist(&archive)?
        .args(["rm", "dir"])
        .assert()
        .success();

    alchemist(&archive)?
        .arg("ls")
        .assert()
        .success()
        .stdout(predicate::str::contains("is empty"));

    Ok(())
}

#[test]
fn test_cli_usage_errors() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let archive = dir.path().join("e.zip");

    alchemist(&archive)?
        .args(["add", "x", "--content", "a", "--content-file", "b"])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "Error: Cannot specify both --content and --content-file",
        ));

    alchemist(&archive)?
        .args(["append", "x"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist").or(predicate::str::contains(
            "Either --content or --content-file must be specified",
        )));

    alchemist(&archive)?
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Archive").and(predicate::str::contains("does not exist")));

    Ok(())
}

#[test]
fn test_cli_polyglot_keeps_archive_readable() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let archive = dir.path().join("poly.zip");

    alchemist(&archive)?
        .args(["add", "payload.txt", "--content", "inside"])
        .assert()
        .success();
    alchemist(&archive)?
        .args(["polyglot", "--content", "GIF89a"])
        .assert()
        .success();

    assert!(fs::read(&archive)?.starts_with(b"GIF89a"));
    alchemist(&archive)?
        .args(["read", "payload.txt"])
        .assert()
        .success()
        .stdout("inside");

    Ok(())
}

#[test]
fn test_cli_traversal_safe_and_vulnerable() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let archive = dir.path().join("trav.tar");
    alchemist(&archive)?
        .args(["add", "../escaped.txt", "--content", "boom"])
        .assert()
        .success();

    let safe = dir.path().join("safe");
    alchemist(&archive)?
        .arg("extract")
        .arg("-o")
        .arg(&safe)
        .assert()
        .success();
    assert!(safe.join("escaped.txt").exists());
    assert!(!dir.path().join("escaped.txt").exists());

    let vuln = dir.path().join("vuln");
    alchemist(&archive)?
        .arg("extract")
        .arg("-o")
        .arg(&vuln)
        .arg("--vulnerable")
        .assert()
        .success();
    assert_eq!(fs::read(dir.path().join("escaped.txt"))?, b"boom");

    Ok(())
}

fn le_u16(bytes: &[u8], at: usize) -> usize {
    u16::from_le_bytes([bytes[at], bytes[at + 1]]) as usize
}

#[test]
fn test_cli_lists_damaged_zip() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let archive = dir.path().join("damaged.zip");
    for (name, content) in [("gone.txt", "lost"), ("crc.txt", "abc")] {
        alchemist(&archive)?
            .args(["add", name, "--content", content])
            .assert()
            .success();
    }

    let mut bytes = fs::read(&archive)?;
    // Break the first local header signature.
    bytes[..4].copy_from_slice(b"XXXX");
    // Flip the first data byte of the second member.
    let second = 30 + le_u16(&bytes, 26) + le_u16(&bytes, 28) + 4;
    let data = second + 30 + le_u16(&bytes, second + 26) + le_u16(&bytes, second + 28);
    bytes[data] = b'X';
    fs::write(&archive, &bytes)?;

    alchemist(&archive)?
        .arg("list")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("crc.txt")
                .and(predicate::str::contains("Warning: skipping gone.txt"))
                .and(predicate::str::contains("Warning: CRC mismatch for crc.txt")),
        );

    alchemist(&archive)?
        .args(["list", "-ll"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("Local header at offset 0 unreadable")
                .and(predicate::str::contains("End of central directory"))
                .and(predicate::str::contains("Warning: skipping gone.txt")),
        );

    Ok(())
}

#[test]
fn test_cli_raw_listing_of_hidden_members() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let archive = dir.path().join("hidden.zip");

    // One member whose central header sits in the EOCD comment, with an
    // empty central directory in front of it.
    let full = zip::serialize(&[Entry::file("hidden.txt", b"secret".to_vec())])?;
    let layout = zip::read_layout(&full)?;
    let mut bytes = full[..layout.eocd.cd_offset as usize].to_vec();
    let mut comment = Vec::new();
    layout.records[0].central.write(&mut comment)?;
    EndOfCentralDir {
        offset: 0,
        disk_number: 0,
        cd_disk: 0,
        entries_on_disk: 0,
        total_entries: 0,
        cd_size: 0,
        cd_offset: bytes.len() as u32,
        comment,
    }
    .write(&mut bytes)?;
    fs::write(&archive, &bytes)?;

    alchemist(&archive)?
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("is empty"));

    alchemist(&archive)?
        .args(["list", "-ll"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("Hidden members")
                .and(predicate::str::contains("hidden.txt"))
                .and(predicate::str::contains("local header at offset 0"))
                .and(predicate::str::contains("(points at 0)"))
                .and(predicate::str::contains("is empty")),
        );

    Ok(())
}
