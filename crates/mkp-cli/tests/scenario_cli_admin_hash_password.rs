use predicates::prelude::*;

/// `mkp admin hash-password` with a fixed salt prints the stored credential
/// form; a short salt is refused.
#[allow(deprecated)]
#[test]
fn hash_password_prints_stretched_credential() -> anyhow::Result<()> {
    let mut cmd = assert_cmd::Command::cargo_bin("mkp")?;
    cmd.args([
        "admin",
        "hash-password",
        "--password",
        "correct horse",
        "--salt",
        "00112233445566778899aabbccddeeff",
        "--rounds",
        "10000",
    ]);
    let out = cmd.assert().success().get_output().stdout.clone();
    let line = String::from_utf8(out)?;
    let stored = line
        .trim()
        .strip_prefix("admin_password_hash=")
        .expect("admin_password_hash= prefix");

    let cred = mkp_config::admin::AdminCredential::parse(stored)?;
    assert!(cred.verify("correct horse"));
    assert!(stored.starts_with("pbkdf2-sha256$10000$00112233445566778899aabbccddeeff$"));

    let mut short = assert_cmd::Command::cargo_bin("mkp")?;
    short.args([
        "admin",
        "hash-password",
        "--password",
        "x",
        "--salt",
        "0011",
        "--rounds",
        "10000",
    ]);
    short
        .assert()
        .failure()
        .stderr(predicate::str::contains("salt must be at least"));

    let mut weak = assert_cmd::Command::cargo_bin("mkp")?;
    weak.args([
        "admin",
        "hash-password",
        "--password",
        "x",
        "--salt",
        "00112233445566778899aabbccddeeff",
        "--rounds",
        "1",
    ]);
    weak.assert()
        .failure()
        .stderr(predicate::str::contains("rounds must be at least"));

    Ok(())
}
