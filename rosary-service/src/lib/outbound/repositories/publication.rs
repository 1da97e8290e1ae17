use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::PgPool;
use sqlx::Row;

use crate::domain::publication::errors::PublicationError;
use crate::domain::publication::models::ContentItem;
use crate::domain::publication::models::DayIndex;
use crate::domain::publication::models::Mystery;
use crate::domain::publication::models::Publication;
use crate::domain::publication::models::PublicationKey;
use crate::domain::publication::models::RosaryPart;
use crate::domain::publication::ports::PublicationRepository;

pub struct PostgresPublicationRepository {
    pool: PgPool,
}

impl PostgresPublicationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_key(r: &PgRow) -> Result<PublicationKey, PublicationError> {
        Ok(PublicationKey {
            part: r.get::<String, _>("part").parse()?,
            mystery: Mystery::new(i64::from(r.get::<i16, _>("mystery")))?,
            index: DayIndex::new(i64::from(r.get::<i32, _>("day_index")))?,
        })
    }

    fn row_to_publication(r: &PgRow) -> Result<Publication, PublicationError> {
        let Json(data): Json<Vec<ContentItem>> = r.get("data");
        let quote: Option<Json<Vec<ContentItem>>> = r.get("quote");
        let task: Option<Json<Vec<ContentItem>>> = r.get("task");

        Ok(Publication {
            key: Self::row_to_key(r)?,
            title: r.get("title"),
            data,
            quote: quote.map(|Json(items)| items),
            task: task.map(|Json(items)| items),
        })
    }
}

fn database_error(e: sqlx::Error) -> PublicationError {
    PublicationError::DatabaseError(e.to_string())
}

/// Column values of a key as stored.
fn key_columns(key: &PublicationKey) -> Result<(&'static str, i16, i32), PublicationError> {
    let index = i32::try_from(key.index.get())
        .map_err(|_| PublicationError::InvalidIndex(i64::from(key.index.get())))?;
    Ok((key.part.as_str(), i16::from(key.mystery.get()), index))
}

#[async_trait]
impl PublicationRepository for PostgresPublicationRepository {
    async fn create(&self, publication: Publication) -> Result<Publication, PublicationError> {
        let (part, mystery, index) = key_columns(&publication.key)?;

        sqlx::query(
            r#"
            INSERT INTO publications (part, mystery, day_index, title, data, quote, task)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(part)
        .bind(mystery)
        .bind(index)
        .bind(&publication.title)
        .bind(Json(&publication.data))
        .bind(publication.quote.as_ref().map(Json))
        .bind(publication.task.as_ref().map(Json))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let Some(db_err) = e.as_database_error() {
                if db_err.is_unique_violation() {
                    return PublicationError::AlreadyExists(publication.key.to_string());
                }
            }
            database_error(e)
        })?;

        Ok(publication)
    }

    async fn update(&self, publication: Publication) -> Result<Publication, PublicationError> {
        let (part, mystery, index) = key_columns(&publication.key)?;

        let result = sqlx::query(
            r#"
            UPDATE publications
            SET title = $4, data = $5, quote = $6, task = $7
            WHERE part = $1 AND mystery = $2 AND day_index = $3
            "#,
        )
        .bind(part)
        .bind(mystery)
        .bind(index)
        .bind(&publication.title)
        .bind(Json(&publication.data))
        .bind(publication.quote.as_ref().map(Json))
        .bind(publication.task.as_ref().map(Json))
        .execute(&self.pool)
        .await
        .map_err(database_error)?;

        if result.rows_affected() == 0 {
            return Err(PublicationError::NotFound(publication.key.to_string()));
        }

        Ok(publication)
    }

    async fn find(&self, key: &PublicationKey) -> Result<Option<Publication>, PublicationError> {
        let (part, mystery, index) = key_columns(key)?;

        let row = sqlx::query(
            r#"
            SELECT part, mystery, day_index, title, data, quote, task
            FROM publications
            WHERE part = $1 AND mystery = $2 AND day_index = $3
            "#,
        )
        .bind(part)
        .bind(mystery)
        .bind(index)
        .fetch_optional(&self.pool)
        .await
        .map_err(database_error)?;

        row.as_ref().map(Self::row_to_publication).transpose()
    }

    async fn list_keys(&self) -> Result<Vec<PublicationKey>, PublicationError> {
        let rows = sqlx::query("SELECT part, mystery, day_index FROM publications")
            .fetch_all(&self.pool)
            .await
            .map_err(database_error)?;

        rows.iter().map(Self::row_to_key).collect()
    }

    async fn list_indices(
        &self,
        part: RosaryPart,
        mystery: Mystery,
    ) -> Result<Vec<u32>, PublicationError> {
        let rows = sqlx::query(
            r#"
            SELECT day_index
            FROM publications
            WHERE part = $1 AND mystery = $2
            ORDER BY day_index
            "#,
        )
        .bind(part.as_str())
        .bind(i16::from(mystery.get()))
        .fetch_all(&self.pool)
        .await
        .map_err(database_error)?;

        rows.iter()
            .map(|r| {
                let index: i32 = r.get("day_index");
                DayIndex::new(i64::from(index)).map(|index| index.get())
            })
            .collect()
    }
}
