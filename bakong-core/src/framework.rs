use sqlx::PgPool;

/// Executes database command objects against the connection pool.
///
/// SQL commands are plain structs; each one gets a
/// `kanau::processor::Processor` implementation on this type.
pub struct DatabaseProcessor {
    pub pool: PgPool,
}
