use predicates::prelude::*;
use uuid::Uuid;

/// `mkp game add` inserts into the catalog and `mkp game list` shows it; a
/// duplicate name is refused.
///
/// DB-backed test, skipped if MKP_DATABASE_URL is not set.
#[allow(deprecated)]
#[tokio::test]
async fn game_add_then_list() -> anyhow::Result<()> {
    let url = match std::env::var(mkp_db::ENV_DB_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: MKP_DATABASE_URL not set");
            return Ok(());
        }
    };

    let pool = match sqlx::postgres::PgPoolOptions::new()
        .max_connections(2)
        .connect(&url)
        .await
    {
        Ok(p) => p,
        Err(e) => {
            eprintln!("SKIP: cannot connect to DB: {e}");
            return Ok(());
        }
    };
    mkp_db::migrate(&pool).await?;

    let name = format!("TEST_GAME_{}", Uuid::new_v4().simple());

    let mut add = assert_cmd::Command::cargo_bin("mkp")?;
    add.env(mkp_db::ENV_DB_URL, &url)
        .args(["game", "add", "--name", &name]);
    add.assert()
        .success()
        .stdout(predicate::str::contains(format!("name={name}")));

    let mut list = assert_cmd::Command::cargo_bin("mkp")?;
    list.env(mkp_db::ENV_DB_URL, &url).args(["game", "list"]);
    list.assert()
        .success()
        .stdout(predicate::str::contains(name.as_str()));

    let mut dup = assert_cmd::Command::cargo_bin("mkp")?;
    dup.env(mkp_db::ENV_DB_URL, &url)
        .args(["game", "add", "--name", &name]);
    dup.assert().failure();

    Ok(())
}
