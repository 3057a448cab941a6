use predicates::prelude::*;
use std::path::PathBuf;

fn example_config() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .join("config")
        .join("marketplace.example.yaml")
}

/// The shipped example config loads, hashes, and validates. Secrets it names
/// are reported by resolution status, never by value.
#[allow(deprecated)]
#[test]
fn example_config_hashes_and_checks() -> anyhow::Result<()> {
    let path = example_config();
    let path = path.to_str().expect("utf-8 path");

    let mut hash = assert_cmd::Command::cargo_bin("mkp")?;
    hash.args(["config-hash", path]);
    hash.assert()
        .success()
        .stdout(predicate::str::starts_with("config_hash="));

    let mut missing = assert_cmd::Command::cargo_bin("mkp")?;
    missing
        .env_remove("MKP_IDENTITY_CLIENT_SECRET")
        .env_remove("MKP_PAYMENTS_SECRET_KEY")
        .env_remove("MKP_ADMIN_PASSWORD_HASH")
        .args(["config-check", path]);
    missing
        .assert()
        .success()
        .stdout(predicate::str::contains("moderation=true"))
        .stdout(predicate::str::contains("platform_fee_bps=1500"))
        .stdout(predicate::str::contains("identity_client_secret=MISSING"));

    let mut present = assert_cmd::Command::cargo_bin("mkp")?;
    present
        .env("MKP_IDENTITY_CLIENT_SECRET", "s3cr3t-value-never-printed")
        .env_remove("MKP_ADMIN_PASSWORD_HASH")
        .args(["config-check", path]);
    present
        .assert()
        .success()
        .stdout(predicate::str::contains("identity_client_secret=resolved"))
        .stdout(predicate::str::contains("s3cr3t-value-never-printed").not());

    Ok(())
}

/// A literal secret in YAML aborts loading.
#[allow(deprecated)]
#[test]
fn literal_secret_in_config_is_refused() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("secret.yaml");
    std::fs::write(&path, "payments:\n  secret_key: sk_live_abc123\n")?;

    let mut cmd = assert_cmd::Command::cargo_bin("mkp")?;
    cmd.args(["config-hash", path.to_str().expect("utf-8 path")]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("CONFIG_SECRET_DETECTED"))
        .stderr(predicate::str::contains("sk_live_abc123").not());

    Ok(())
}
