use crate::entities::AlertPriority;
use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct AlertMatchRecord {
    pub id: i64,
    pub alert_id: i64,
    pub article_id: Uuid,
    pub priority: AlertPriority,
    pub matched_at: OffsetDateTime,
    pub notified_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone)]
/// Insert a match unless one already exists for the (alert, article) pair.
///
/// Returns true if a new row was inserted.
pub struct InsertAlertMatch {
    pub alert_id: i64,
    pub article_id: Uuid,
    pub priority: AlertPriority,
    pub matched_at: OffsetDateTime,
}

impl Processor<InsertAlertMatch> for DatabaseProcessor {
    type Output = bool;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:InsertAlertMatch")]
    async fn process(&self, insert: InsertAlertMatch) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO alert_matches (alert_id, article_id, priority, matched_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (alert_id, article_id) DO NOTHING
            "#,
        )
        .bind(insert.alert_id)
        .bind(insert.article_id)
        .bind(insert.priority)
        .bind(insert.matched_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[derive(Debug, Clone)]
/// Stamp `notified_at` on a match that has not been notified yet.
pub struct MarkAlertMatchNotified {
    pub alert_id: i64,
    pub article_id: Uuid,
    pub notified_at: OffsetDateTime,
}

impl Processor<MarkAlertMatchNotified> for DatabaseProcessor {
    type Output = ();
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:MarkAlertMatchNotified")]
    async fn process(&self, update: MarkAlertMatchNotified) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE alert_matches
            SET notified_at = $3
            WHERE alert_id = $1 AND article_id = $2 AND notified_at IS NULL
            "#,
        )
        .bind(update.alert_id)
        .bind(update.article_id)
        .bind(update.notified_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
/// Load every match recorded for an article.
pub struct GetAlertMatchesForArticle {
    pub article_id: Uuid,
}

impl Processor<GetAlertMatchesForArticle> for DatabaseProcessor {
    type Output = Vec<AlertMatchRecord>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetAlertMatchesForArticle")]
    async fn process(
        &self,
        query: GetAlertMatchesForArticle,
    ) -> Result<Vec<AlertMatchRecord>, sqlx::Error> {
        sqlx::query_as::<_, AlertMatchRecord>(
            r#"
            SELECT id, alert_id, article_id, priority, matched_at, notified_at
            FROM alert_matches
            WHERE article_id = $1
            ORDER BY alert_id
            "#,
        )
        .bind(query.article_id)
        .fetch_all(&self.pool)
        .await
    }
}
