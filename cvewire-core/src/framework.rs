use sqlx::PgPool;

/// Target of the `kanau` query processors in [`crate::entities`].
#[derive(Debug, Clone)]
pub struct DatabaseProcessor {
    pub pool: PgPool,
}
