use crate::entities::AlertType;
use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;
use uuid::Uuid;

/// A user-defined alert row. Owned by the alert management service; this
/// crate only reads it.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct AlertRecord {
    pub id: i64,
    pub user_id: Uuid,
    pub alert_type: AlertType,
    pub value: String,
    pub active: bool,
}

#[derive(Debug, Clone)]
/// Load every alert that is active right now.
pub struct ListActiveAlerts;

impl Processor<ListActiveAlerts> for DatabaseProcessor {
    type Output = Vec<AlertRecord>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ListActiveAlerts")]
    async fn process(&self, _query: ListActiveAlerts) -> Result<Vec<AlertRecord>, sqlx::Error> {
        sqlx::query_as::<_, AlertRecord>(
            r#"
            SELECT id, user_id, alert_type, value, active
            FROM alerts
            WHERE active
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await
    }
}
