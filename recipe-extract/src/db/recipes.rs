//! Imported recipe records

use recipe_common::Result;
use sqlx::{Sqlite, Transaction};

use super::{format_timestamp, to_json};
use crate::models::NewRecipe;

/// Insert an imported recipe inside the caller's transaction
pub async fn insert_recipe(tx: &mut Transaction<'_, Sqlite>, recipe: &NewRecipe) -> Result<()> {
    let tags = to_json(&recipe.tags, "tags")?;
    let components = to_json(&recipe.components, "components")?;

    sqlx::query(
        r#"
        INSERT INTO recipes (
            recipe_id, user_id, title, description,
            prep_time_minutes, cook_time_minutes, servings,
            difficulty, category, cuisine, tags, components,
            source_type, source_url, source_video_id,
            source_channel, source_thumbnail_url, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(recipe.recipe_id.to_string())
    .bind(&recipe.user_id)
    .bind(&recipe.title)
    .bind(&recipe.description)
    .bind(recipe.prep_time_minutes.map(i64::from))
    .bind(recipe.cook_time_minutes.map(i64::from))
    .bind(recipe.servings.map(i64::from))
    .bind(&recipe.difficulty)
    .bind(&recipe.category)
    .bind(&recipe.cuisine)
    .bind(tags)
    .bind(components)
    .bind(&recipe.source_type)
    .bind(&recipe.source_url)
    .bind(&recipe.source_video_id)
    .bind(&recipe.source_channel)
    .bind(&recipe.source_thumbnail_url)
    .bind(format_timestamp(recipe.created_at))
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Number of recipes a user has imported
pub async fn count_for_user(pool: &sqlx::SqlitePool, user_id: &str) -> Result<i64> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM recipes WHERE user_id = ?")
        .bind(user_id)
        .fetch_one(pool)
        .await?;
    Ok(count)
}
