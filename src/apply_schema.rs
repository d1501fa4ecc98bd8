use sqlx::PgPool;
use std::env;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let database_url = env::var("DATABASE_URL")?;
    let pool = PgPool::connect(&database_url).await?;

    let schema = include_str!("../sql/schema.sql");
    let statements: Vec<&str> = schema
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    for statement in &statements {
        sqlx::query(statement).execute(&pool).await?;
    }

    println!("Applied {} schema statements", statements.len());
    Ok(())
}
