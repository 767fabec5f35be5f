//! Integration tests for core CLI contract behavior.

use {predicates::prelude::*, std::fs, tempfile::tempdir};

fn cli_cmd() -> assert_cmd::Command {
    assert_cmd::cargo::cargo_bin_cmd!("cuvelink")
}

#[test]
fn help_exits_zero_and_writes_stdout_only() {
    let mut cmd = cli_cmd();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("cuvelink"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn short_help_exits_zero_and_writes_stdout_only() {
    let mut cmd = cli_cmd();
    cmd.arg("-h")
        .assert()
        .success()
        .stdout(predicate::str::contains("cuvelink"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn version_exits_zero_and_writes_stdout_only() {
    let mut cmd = cli_cmd();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("cuvelink"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn short_version_exits_zero_and_writes_stdout_only() {
    let mut cmd = cli_cmd();
    cmd.arg("-V")
        .assert()
        .success()
        .stdout(predicate::str::contains("cuvelink"))
        .stderr(predicate::str::is_empty());
}

// ============================================================================
// Exit Code Tests - Following CLI Standards Contract
// ============================================================================

/// Exit code 0: successful operations
#[test]
fn exit_code_zero_on_success() {
    // --help exits 0
    let mut cmd = cli_cmd();
    cmd.arg("--help")
        .assert()
        .success()
        .code(0);

    // --version exits 0
    let mut cmd = cli_cmd();
    cmd.arg("--version")
        .assert()
        .success()
        .code(0);

    // completions bash exits 0 (doesn't require hardware)
    let mut cmd = cli_cmd();
    cmd.args(["completions", "bash"])
        .assert()
        .success()
        .code(0);
}

/// Exit code 2: usage error (unknown command, invalid arguments)
#[test]
fn exit_code_two_for_usage_error_unknown_command() {
    let mut cmd = cli_cmd();
    cmd.arg("unknown-command-xyz")
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("unrecognized").or(predicate::str::contains("unknown")));
}

#[test]
fn exit_code_two_for_usage_error_invalid_flag() {
    let mut cmd = cli_cmd();
    cmd.arg("--invalid-flag-xyz")
        .assert()
        .failure()
        .code(2);
}

#[test]
fn exit_code_two_for_missing_required_arg() {
    // flash requires the firmware image path
    let mut cmd = cli_cmd();
    cmd.arg("flash")
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("FIRMWARE"));
}

#[test]
fn exit_code_two_for_out_of_range_fan_number() {
    // The analyzer has six fan headers; clap rejects anything outside 1-6
    let mut cmd = cli_cmd();
    cmd.args(["fan", "9", "on"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("invalid value").or(predicate::str::contains("1..=6")));
}

#[test]
fn exit_code_two_for_invalid_switch_state() {
    let mut cmd = cli_cmd();
    cmd.args(["led", "white", "blink"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("possible values").or(predicate::str::contains("invalid value")));
}

/// Exit code 1: generic error fallback
#[test]
fn exit_code_one_for_unreadable_firmware() {
    // flash with a non-existent file fails before touching any port
    let dir = tempdir().expect("tempdir should be created");
    let nonexistent = dir
        .path()
        .join("does_not_exist.bin");

    let mut cmd = cli_cmd();
    cmd.arg("flash")
        .arg(nonexistent.as_os_str())
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("failed to read firmware image"));
}

/// Device errors exit non-zero without needing real hardware
#[test]
fn unopenable_port_exits_nonzero() {
    let mut cmd = cli_cmd();
    let output = cmd
        .arg("-p")
        .arg("INVALID_PORT_NAME_XYZ")
        .arg("--non-interactive")
        .arg("status")
        .output()
        .expect("command should execute");

    // A port that cannot be opened must not report success
    assert!(
        !output
            .status
            .success(),
        "unopenable port should not succeed"
    );
}

// ============================================================================
// Unknown Command/Flag Suggestion Tests
// ============================================================================

#[test]
fn unknown_command_suggests_similar() {
    let mut cmd = cli_cmd();
    cmd.arg("falsh") // typo for flash
        .assert()
        .failure()
        .stderr(predicate::str::contains("flash").or(predicate::str::contains("did you mean")));
}

#[test]
fn unknown_flag_suggests_similar() {
    let mut cmd = cli_cmd();
    cmd.arg("--non-interactiv") // typo for --non-interactive
        .arg("ports")
        .assert()
        .failure()
        .stderr(
            predicate::str::contains("non-interactive").or(predicate::str::contains("did you mean")),
        );
}

// ============================================================================
// stdout/stderr Separation Tests
// ============================================================================

#[test]
fn usage_errors_write_to_stderr_only() {
    // flash without required args should fail fast
    let mut cmd = cli_cmd();
    cmd.arg("flash")
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::is_empty().not());
}

#[test]
fn calibrate_usage_error_keeps_stdout_clean() {
    // calibration refuses to run unattended without --yes
    let mut cmd = cli_cmd();
    cmd.arg("--non-interactive")
        .arg("calibrate")
        .assert()
        .failure()
        .code(2)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("--yes"));
}

#[test]
fn completions_command_writes_to_stdout() {
    let mut cmd = cli_cmd();
    cmd.args(["completions", "bash"])
        .assert()
        .success()
        .stderr(predicate::str::is_empty())
        .stdout(predicate::str::contains("_cuvelink()"));
}

// ============================================================================
// Firmware Preflight Tests
// ============================================================================

#[test]
fn flash_without_yes_fails_fast_in_non_interactive_mode() {
    let dir = tempdir().expect("tempdir should be created");
    let firmware = dir
        .path()
        .join("app.bin");
    fs::write(&firmware, b"dummy").expect("write app.bin");

    let mut cmd = cli_cmd();
    cmd.arg("--non-interactive")
        .arg("flash")
        .arg(firmware.as_os_str())
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("--yes"));
}

#[test]
fn flash_with_empty_image_fails_fast() {
    let dir = tempdir().expect("tempdir should be created");
    let firmware = dir
        .path()
        .join("empty.bin");
    fs::write(&firmware, b"").expect("write empty.bin");

    let mut cmd = cli_cmd();
    cmd.arg("flash")
        .arg(firmware.as_os_str())
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("empty"));
}

// ============================================================================
// -- Option Terminator Tests
// ============================================================================

#[test]
fn option_terminator_allows_dash_prefixed_operand() {
    // -- terminates option parsing, so operands may start with a dash
    let dir = tempdir().expect("tempdir should be created");
    let missing = dir
        .path()
        .join("missing.bin");

    let mut cmd = cli_cmd();
    cmd.arg("flash")
        .arg("--")
        .arg(missing.as_os_str())
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read firmware image"));
}

#[test]
fn option_terminator_with_config_set() {
    let dir = tempdir().expect("tempdir should be created");
    let config = dir
        .path()
        .join("cuvelink.toml");
    let config_arg = config
        .to_str()
        .expect("temp path should be utf-8");

    let mut cmd = cli_cmd();
    cmd.args(["--config", config_arg, "config", "set", "port", "--", "-odd-port-name"])
        .assert()
        .success();

    let saved = fs::read_to_string(&config).expect("config file should be written");
    assert!(saved.contains("-odd-port-name"), "saved port name should survive verbatim");
}

// ============================================================================
// Non-Interactive Mode Tests
// ============================================================================

#[test]
fn non_interactive_flag_is_recognized() {
    // Parses cleanly with no hardware attached
    let mut cmd = cli_cmd();
    cmd.arg("--non-interactive")
        .arg("--version")
        .assert()
        .success();
}

#[test]
fn non_interactive_environment_variable_works() {
    // CUVELINK_NON_INTERACTIVE must be "true", not "1"; calibrate then refuses
    // to prompt and demands --yes
    let mut cmd = cli_cmd();
    cmd.env("CUVELINK_NON_INTERACTIVE", "true")
        .arg("calibrate")
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("--yes"));
}

// ============================================================================
// Configuration File Tests
// ============================================================================

#[test]
fn config_path_prints_the_override_path() {
    let dir = tempdir().expect("tempdir should be created");
    let config = dir
        .path()
        .join("cuvelink.toml");
    let config_arg = config
        .to_str()
        .expect("temp path should be utf-8");

    let mut cmd = cli_cmd();
    cmd.args(["--config", config_arg, "config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains(config_arg));
}

#[test]
fn config_set_and_show_round_trip() {
    let dir = tempdir().expect("tempdir should be created");
    let config = dir
        .path()
        .join("cuvelink.toml");
    let config_arg = config
        .to_str()
        .expect("temp path should be utf-8");

    let mut cmd = cli_cmd();
    cmd.args(["--config", config_arg, "config", "set", "baud", "921600"])
        .assert()
        .success();

    // A fresh invocation reloads the saved file
    let mut cmd = cli_cmd();
    cmd.args(["--config", config_arg, "config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("921600"));
}

#[test]
fn config_set_rejects_unknown_key() {
    let dir = tempdir().expect("tempdir should be created");
    let config = dir
        .path()
        .join("cuvelink.toml");
    let config_arg = config
        .to_str()
        .expect("temp path should be utf-8");

    let mut cmd = cli_cmd();
    cmd.args(["--config", config_arg, "config", "set", "color", "auto"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("unknown configuration key"));
}

#[test]
fn config_set_rejects_non_numeric_baud() {
    let dir = tempdir().expect("tempdir should be created");
    let config = dir
        .path()
        .join("cuvelink.toml");
    let config_arg = config
        .to_str()
        .expect("temp path should be utf-8");

    let mut cmd = cli_cmd();
    cmd.args(["--config", config_arg, "config", "set", "baud", "fast"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("invalid baud rate"));
}

#[test]
fn config_reset_without_a_file_succeeds() {
    let dir = tempdir().expect("tempdir should be created");
    let config = dir
        .path()
        .join("cuvelink.toml");
    let config_arg = config
        .to_str()
        .expect("temp path should be utf-8");

    let mut cmd = cli_cmd();
    cmd.args(["--config", config_arg, "config", "reset"])
        .assert()
        .success();
}

#[test]
fn config_reset_deletes_the_saved_file() {
    let dir = tempdir().expect("tempdir should be created");
    let config = dir
        .path()
        .join("cuvelink.toml");
    let config_arg = config
        .to_str()
        .expect("temp path should be utf-8");

    let mut cmd = cli_cmd();
    cmd.args(["--config", config_arg, "config", "set", "baud", "921600"])
        .assert()
        .success();
    assert!(config.exists(), "config set should create the file");

    let mut cmd = cli_cmd();
    cmd.args(["--config", config_arg, "config", "reset"])
        .assert()
        .success();
    assert!(!config.exists(), "config reset should delete the file");
}

// ============================================================================
// TTY Detection Tests (colors/animations disabled on non-TTY)
// ============================================================================

#[test]
fn colors_disabled_when_not_tty() {
    // When stdout is not a TTY, colors should be disabled
    let mut cmd = cli_cmd();
    let output = cmd
        .arg("--help")
        .assert()
        .success()
        .get_output()
        .clone();

    let stdout = String::from_utf8(output.stdout).expect("stdout should be utf-8");
    // ANSI color codes should NOT appear in non-TTY output
    assert!(
        !stdout.contains("\x1b["),
        "Colors should be disabled in non-TTY mode"
    );
}

// ============================================================================
// Help Examples Test
// ============================================================================

#[test]
fn help_includes_usage_examples() {
    let mut cmd = cli_cmd();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage"));
}
