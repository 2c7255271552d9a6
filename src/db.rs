use once_cell::sync::Lazy;
use sqlx::MySqlPool;
use sqlx::mysql::MySqlPoolOptions;

static SCHEMA: &str = include_str!("../migrations/schema.sql");

/// Individual DDL statements; MySQL runs one statement per query.
static SCHEMA_STATEMENTS: Lazy<Vec<String>> = Lazy::new(|| {
    let without_comments: Vec<&str> = SCHEMA
        .lines()
        .filter(|line| !line.trim_start().starts_with("--"))
        .collect();

    without_comments
        .join("\n")
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
});

pub async fn init_db(database_url: &str, max_connections: u32) -> Result<MySqlPool, sqlx::Error> {
    let pool = MySqlPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;

    ensure_schema(&pool).await?;
    Ok(pool)
}

/// Creates missing tables. Every statement is `CREATE TABLE IF NOT EXISTS`.
async fn ensure_schema(pool: &MySqlPool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA_STATEMENTS.iter() {
        sqlx::query(statement.as_str()).execute(pool).await?;
    }
    tracing::info!(tables = SCHEMA_STATEMENTS.len(), "Schema ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_splits_into_create_statements() {
        assert_eq!(SCHEMA_STATEMENTS.len(), 4);
        assert!(
            SCHEMA_STATEMENTS
                .iter()
                .all(|s| s.starts_with("CREATE TABLE IF NOT EXISTS"))
        );
    }
}
