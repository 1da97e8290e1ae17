use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;
use sqlx::Row;

use crate::domain::help::errors::HelpError;
use crate::domain::help::models::HelpContent;
use crate::domain::help::ports::HelpRepository;
use crate::domain::publication::models::ContentItem;

/// Key of the only row in the `help` table.
const HELP_INDEX: i32 = 1;

pub struct PostgresHelpRepository {
    pool: PgPool,
}

impl PostgresHelpRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn database_error(e: sqlx::Error) -> HelpError {
    HelpError::DatabaseError(e.to_string())
}

#[async_trait]
impl HelpRepository for PostgresHelpRepository {
    async fn find(&self) -> Result<Option<HelpContent>, HelpError> {
        let row = sqlx::query(r#"SELECT data FROM help WHERE "index" = $1"#)
            .bind(HELP_INDEX)
            .fetch_optional(&self.pool)
            .await
            .map_err(database_error)?;

        Ok(row.map(|r| {
            let data: Option<Json<Vec<ContentItem>>> = r.get("data");
            HelpContent::new(data.map(|Json(items)| items).unwrap_or_default())
        }))
    }

    async fn upsert(&self, content: HelpContent) -> Result<HelpContent, HelpError> {
        sqlx::query(
            r#"
            INSERT INTO help ("index", data)
            VALUES ($1, $2)
            ON CONFLICT ("index") DO UPDATE SET data = EXCLUDED.data
            "#,
        )
        .bind(HELP_INDEX)
        .bind(Json(&content.data))
        .execute(&self.pool)
        .await
        .map_err(database_error)?;

        Ok(content)
    }
}
