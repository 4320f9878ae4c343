use sqlx::SqliteConnection;

use crate::db_types::Beat;

pub async fn fetch_beat(beat_id: &str, conn: &mut SqliteConnection) -> Result<Option<Beat>, sqlx::Error> {
    let beat = sqlx::query_as("SELECT * FROM beats WHERE id = $1").bind(beat_id).fetch_optional(conn).await?;
    Ok(beat)
}
