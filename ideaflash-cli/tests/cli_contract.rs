//! Integration tests for core CLI contract behavior.

use {predicates::prelude::*, std::fs, tempfile::tempdir};

fn cli_cmd() -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("ideaflash");
    // Keep the developer's environment out of the contract
    for var in [
        "IDEAFLASH_PORT",
        "IDEAFLASH_BAUD",
        "IDEAFLASH_FIRMWARE_DIR",
        "IDEAFLASH_NON_INTERACTIVE",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

fn firmware_dir(files: &[&str]) -> tempfile::TempDir {
    let dir = tempdir().expect("tempdir should be created");
    for file in files {
        let path = dir
            .path()
            .join(file);
        fs::create_dir_all(
            path.parent()
                .expect("file has a parent"),
        )
        .expect("create firmware dir");
        fs::write(&path, [0xAAu8; 16]).expect("write firmware");
    }
    dir
}

#[test]
fn help_exits_zero_and_writes_stdout_only() {
    cli_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("ideaflash"))
        .stdout(predicate::str::contains("Usage"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn version_exits_zero_and_writes_stdout_only() {
    cli_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("ideaflash"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn no_arguments_prints_help_as_usage_error() {
    cli_cmd()
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn exit_code_two_for_unknown_command() {
    cli_cmd()
        .arg("falsh")
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("flash"));
}

#[test]
fn exit_code_two_for_invalid_offset() {
    cli_cmd()
        .args(["flash", "--offset", "0xZZ"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("Invalid hex address"));
}

#[test]
fn completions_command_writes_to_stdout() {
    cli_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stderr(predicate::str::is_empty())
        .stdout(predicate::str::contains("_ideaflash()"));
}

#[test]
fn completions_without_shell_is_usage_error() {
    cli_cmd()
        .arg("completions")
        .assert()
        .failure()
        .code(2)
        .stdout(predicate::str::is_empty());
}

#[test]
fn list_ports_json_is_clean_array() {
    let output = cli_cmd()
        .args(["list-ports", "--json"])
        .assert()
        .success()
        .get_output()
        .clone();

    let stdout = String::from_utf8(output.stdout).expect("stdout should be utf-8");
    let parsed: serde_json::Value = serde_json::from_str(&stdout).expect("valid JSON");
    assert!(parsed.is_array());
    assert!(output.stderr.is_empty(), "JSON mode must keep stderr empty");
}

#[test]
fn firmware_json_lists_images_sorted() {
    let dir = firmware_dir(&["zeta.bin", "firmware/ideaboard.bin", "readme.txt"]);

    let output = cli_cmd()
        .arg("--firmware-dir")
        .arg(dir.path())
        .args(["firmware", "--json"])
        .assert()
        .success()
        .get_output()
        .clone();

    let parsed: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("valid JSON");
    let ids: Vec<&str> = parsed
        .as_array()
        .expect("array")
        .iter()
        .filter_map(|entry| entry["id"].as_str())
        .collect();
    assert_eq!(ids, vec!["firmware/ideaboard.bin", "zeta.bin"]);
    assert_eq!(parsed[0]["size"], 16);
}

#[test]
fn firmware_in_empty_dir_shows_default_catalog() {
    let dir = firmware_dir(&[]);
    cli_cmd()
        .env("IDEAFLASH_FIRMWARE_DIR", dir.path())
        .args(["firmware", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("firmware/ideaboardfirmware03202025.bin"))
        .stdout(predicate::str::contains("\"available\": false"));
}

#[test]
fn non_interactive_flash_with_multiple_firmwares_fails_fast() {
    let dir = firmware_dir(&["a.bin", "b.bin"]);
    cli_cmd()
        .current_dir(dir.path())
        .args(["--non-interactive", "flash", "--yes"])
        .assert()
        .failure()
        .code(2)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("multiple"));
}

#[test]
fn non_interactive_flash_without_firmware_is_usage_error() {
    let dir = firmware_dir(&[]);
    cli_cmd()
        .current_dir(dir.path())
        .args(["--non-interactive", "flash", "--yes"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("No firmware images found"));
}

#[test]
fn non_interactive_flash_requires_yes() {
    let dir = firmware_dir(&["firmware/only.bin"]);
    cli_cmd()
        .current_dir(dir.path())
        .args(["--non-interactive", "flash"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("--yes"));
}

#[test]
fn non_interactive_env_requires_yes_for_erase() {
    cli_cmd()
        .env("IDEAFLASH_NON_INTERACTIVE", "true")
        .arg("erase")
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("--yes"));
}

#[test]
fn flash_to_missing_port_fails_with_runtime_error() {
    let dir = firmware_dir(&["firmware/only.bin"]);
    cli_cmd()
        .current_dir(dir.path())
        .args([
            "--non-interactive",
            "--port",
            "INVALID_PORT_NAME_XYZ",
            "flash",
            "--yes",
        ])
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("Connecting failed"));
}

#[test]
fn monitor_on_missing_port_fails() {
    cli_cmd()
        .args(["--port", "INVALID_PORT_NAME_XYZ", "monitor"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("INVALID_PORT_NAME_XYZ"));
}

#[test]
fn session_refuses_non_interactive_mode() {
    cli_cmd()
        .args(["--non-interactive", "session"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("interactive terminal"));
}

#[test]
fn invalid_local_config_is_a_warning() {
    let dir = tempdir().expect("tempdir should be created");
    fs::write(
        dir.path()
            .join("ideaflash.toml"),
        "invalid toml [[[",
    )
    .expect("write invalid config");

    let output = cli_cmd()
        .current_dir(dir.path())
        .arg("list-ports")
        .output()
        .expect("command should execute");
    assert!(output.status.success(), "invalid config must not be fatal");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to parse config file"));
}

#[test]
fn colors_disabled_when_not_tty() {
    let output = cli_cmd()
        .arg("--help")
        .assert()
        .success()
        .get_output()
        .clone();
    let stdout = String::from_utf8(output.stdout).expect("stdout should be utf-8");
    assert!(!stdout.contains("\x1b["));
}
