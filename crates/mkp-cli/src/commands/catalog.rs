//! `mkp game` handlers.

use anyhow::Result;
use sqlx::PgPool;

pub async fn game_add(pool: &PgPool, name: &str, icon_url: Option<&str>) -> Result<()> {
    let game = mkp_db::create_game(pool, name, icon_url).await?;
    println!("game_id={} name={}", game.id, game.name);
    Ok(())
}

pub async fn game_list(pool: &PgPool) -> Result<()> {
    for g in mkp_db::list_games(pool).await? {
        println!(
            "game_id={} name={} icon_url={}",
            g.id,
            g.name,
            g.icon_url.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}
