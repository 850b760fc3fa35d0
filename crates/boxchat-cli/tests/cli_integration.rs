//! CLI Integration Tests
//!
//! These tests verify the CLI commands work correctly end-to-end.
//! They test the "wiring" between the CLI and the core library; nothing here
//! needs a running relay.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const TEST_SEED: &str = "abandon abandon abandon abandon abandon abandon abandon abandon \
abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon \
abandon abandon abandon abandon art";

/// A valid Ed25519 public key (RFC 8032 test 1)
const PEER: &str = "d75a980182b10ab7d54bfed3c964073a0ee172f3daa62325af021a68f707511a";

// ============================================================================
// Test Utilities
// ============================================================================

/// Create a CLI command with a temporary data directory and no ambient env
fn cli_cmd(data_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("boxchat").expect("Failed to find boxchat binary");
    cmd.env_remove("BOXCHAT_SEED")
        .env_remove("BOXCHAT_RELAY_URL")
        .env_remove("RUST_LOG")
        .arg("--data-dir")
        .arg(data_dir.path());
    cmd
}

/// Same, logged in with the test phrase
fn seeded_cmd(data_dir: &TempDir) -> Command {
    let mut cmd = cli_cmd(data_dir);
    cmd.env("BOXCHAT_SEED", TEST_SEED);
    cmd
}

fn stdout_of(cmd: &mut Command) -> String {
    let output = cmd.output().unwrap();
    assert!(output.status.success(), "command failed: {:?}", output);
    String::from_utf8(output.stdout).unwrap()
}

// ============================================================================
// Seed Command Tests
// ============================================================================

#[test]
fn test_seed_generate_prints_24_words() {
    let data_dir = TempDir::new().unwrap();
    let stdout = stdout_of(cli_cmd(&data_dir).args(["seed", "generate"]));
    let phrase = stdout.lines().next().unwrap();
    assert_eq!(phrase.split_whitespace().count(), 24);

    cli_cmd(&data_dir)
        .args(["seed", "validate", phrase])
        .assert()
        .success()
        .stdout(predicate::str::contains("valid"));
}

#[test]
fn test_seed_validate_rejects_bad_checksum() {
    let data_dir = TempDir::new().unwrap();
    let bad = vec!["abandon"; 24].join(" ");
    cli_cmd(&data_dir)
        .args(["seed", "validate", &bad])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid seed phrase"));
}

#[test]
fn test_seed_commands_touch_no_store() {
    let data_dir = TempDir::new().unwrap();
    cli_cmd(&data_dir).args(["seed", "generate"]).assert().success();
    assert!(!data_dir.path().join("boxchat.redb").exists());
}

// ============================================================================
// Identity Command Tests
// ============================================================================

#[test]
fn test_identity_requires_seed() {
    let data_dir = TempDir::new().unwrap();
    cli_cmd(&data_dir)
        .args(["identity", "show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("BOXCHAT_SEED"));
}

#[test]
fn test_identity_show_is_stable() {
    let data_dir = TempDir::new().unwrap();
    let first = stdout_of(seeded_cmd(&data_dir).args(["identity", "show"]));
    let second = stdout_of(seeded_cmd(&data_dir).args(["identity", "show"]));
    assert!(first.contains("Public key: "));
    assert_eq!(first, second);
}

#[test]
fn test_seed_flag_matches_env() {
    let data_dir = TempDir::new().unwrap();
    let from_env = stdout_of(seeded_cmd(&data_dir).args(["identity", "show"]));
    let from_flag = stdout_of(
        cli_cmd(&data_dir)
            .args(["--seed", TEST_SEED])
            .args(["identity", "show"]),
    );
    assert_eq!(from_env, from_flag);
}

#[test]
fn test_relay_url_override_is_shown() {
    let data_dir = TempDir::new().unwrap();
    seeded_cmd(&data_dir)
        .args(["--relay-url", "http://relay.example:8080"])
        .args(["identity", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("http://relay.example:8080"));
}

// ============================================================================
// Contact Command Tests
// ============================================================================

#[test]
fn test_contact_add_and_list() {
    let data_dir = TempDir::new().unwrap();

    seeded_cmd(&data_dir)
        .args(["contact", "add", PEER, "Alice"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Added contact: Alice"));

    seeded_cmd(&data_dir)
        .args(["contact", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Contacts (1):"))
        .stdout(predicate::str::contains(PEER))
        .stdout(predicate::str::contains("Alice"));
}

#[test]
fn test_contact_rename() {
    let data_dir = TempDir::new().unwrap();
    seeded_cmd(&data_dir)
        .args(["contact", "add", PEER, "Alice"])
        .assert()
        .success();
    seeded_cmd(&data_dir)
        .args(["contact", "add", PEER, "Alicia"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Renamed contact: Alicia"));

    let list = stdout_of(seeded_cmd(&data_dir).args(["contact", "list"]));
    assert!(list.contains("Alicia"));
    assert!(list.contains("Contacts (1):"));
}

#[test]
fn test_contact_list_search() {
    let data_dir = TempDir::new().unwrap();
    seeded_cmd(&data_dir)
        .args(["contact", "add", PEER, "Alice"])
        .assert()
        .success();

    seeded_cmd(&data_dir)
        .args(["contact", "list", "--search", "ALI"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Alice"));

    seeded_cmd(&data_dir)
        .args(["contact", "list", "--search", "bob"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No contacts found."));
}

#[test]
fn test_contact_add_rejects_bad_key() {
    let data_dir = TempDir::new().unwrap();
    seeded_cmd(&data_dir)
        .args(["contact", "add", "not-a-key", "Mallory"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid public key"));
}

#[test]
fn test_contact_remove() {
    let data_dir = TempDir::new().unwrap();
    seeded_cmd(&data_dir)
        .args(["contact", "add", PEER, "Alice"])
        .assert()
        .success();

    seeded_cmd(&data_dir)
        .args(["contact", "remove", PEER])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed contact"));

    seeded_cmd(&data_dir)
        .args(["contact", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No contacts found."));
}

#[test]
fn test_contacts_belong_to_identity() {
    let data_dir = TempDir::new().unwrap();
    seeded_cmd(&data_dir)
        .args(["contact", "add", PEER, "Alice"])
        .assert()
        .success();

    let other = stdout_of(cli_cmd(&data_dir).args(["seed", "generate"]));
    let other = other.lines().next().unwrap().to_string();
    cli_cmd(&data_dir)
        .env("BOXCHAT_SEED", other)
        .args(["contact", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No contacts found."));
}

// ============================================================================
// Conversation Command Tests
// ============================================================================

#[test]
fn test_chats_empty() {
    let data_dir = TempDir::new().unwrap();
    seeded_cmd(&data_dir)
        .arg("chats")
        .assert()
        .success()
        .stdout(predicate::str::contains("(no conversations yet)"));
}

#[test]
fn test_chats_lists_named_contact() {
    let data_dir = TempDir::new().unwrap();
    seeded_cmd(&data_dir)
        .args(["contact", "add", PEER, "Alice"])
        .assert()
        .success();
    seeded_cmd(&data_dir)
        .arg("chats")
        .assert()
        .success()
        .stdout(predicate::str::contains("Alice"))
        .stdout(predicate::str::contains(format!("ID: {}", PEER)));
}

#[test]
fn test_messages_empty_conversation() {
    let data_dir = TempDir::new().unwrap();
    seeded_cmd(&data_dir)
        .args(["messages", PEER])
        .assert()
        .success()
        .stdout(predicate::str::contains("Messages: 0"))
        .stdout(predicate::str::contains("(no messages)"));
}

#[test]
fn test_read_unknown_message() {
    let data_dir = TempDir::new().unwrap();
    seeded_cmd(&data_dir)
        .args(["read", "no-such-id"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing to mark"));
}

#[test]
fn test_send_to_unreachable_relay_fails() {
    let data_dir = TempDir::new().unwrap();
    seeded_cmd(&data_dir)
        .args(["--relay-url", "http://127.0.0.1:9"])
        .args(["send", PEER, "hello"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unreachable"));

    // Nothing was stored for the failed send
    seeded_cmd(&data_dir)
        .args(["messages", PEER])
        .assert()
        .success()
        .stdout(predicate::str::contains("Messages: 0"));
}

// ============================================================================
// Logging Tests
// ============================================================================

#[test]
fn test_log_dir_receives_jsonl() {
    let data_dir = TempDir::new().unwrap();
    let log_dir = data_dir.path().join("logs");
    seeded_cmd(&data_dir)
        .arg("-v")
        .arg("--log-dir")
        .arg(&log_dir)
        .args(["contact", "add", PEER, "Alice"])
        .assert()
        .success();

    let files: Vec<_> = std::fs::read_dir(&log_dir).unwrap().collect();
    assert_eq!(files.len(), 1);
    let path = files[0].as_ref().unwrap().path();
    assert!(path.to_string_lossy().ends_with("_cli.jsonl"));
    let content = std::fs::read_to_string(path).unwrap();
    assert!(content.contains("\"instance\":\"cli\""));
}
