use sqlx::Row;

fn database_url() -> String {
    dotenvy::dotenv().ok();

    if let Ok(url) = std::env::var("DATABASE_URL") {
        if !url.trim().is_empty() {
            return url;
        }
    }

    let server = std::env::var("POSTGRES_SERVER").unwrap_or_else(|_| "localhost".into());
    let port = std::env::var("POSTGRES_PORT").unwrap_or_else(|_| "5432".into());
    let user = std::env::var("POSTGRES_USER").unwrap_or_else(|_| "gradesim_test".into());
    let password = std::env::var("POSTGRES_PASSWORD").unwrap_or_else(|_| "gradesim_test".into());
    let db = std::env::var("POSTGRES_DB").unwrap_or_else(|_| "gradesim_test".into());

    format!("postgresql://{user}:{password}@{server}:{port}/{db}")
}

#[tokio::test]
async fn migrations_apply_and_schema_matches() -> anyhow::Result<()> {
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(1)
        .connect(&database_url())
        .await?;

    sqlx::query("DROP SCHEMA IF EXISTS public CASCADE").execute(&pool).await?;
    sqlx::query("CREATE SCHEMA public").execute(&pool).await?;

    let migrations_dir =
        std::env::var("GRADESIM_MIGRATIONS_DIR").unwrap_or_else(|_| "migrations".to_string());
    let migrator = sqlx::migrate::Migrator::new(std::path::Path::new(&migrations_dir)).await?;
    migrator.run(&pool).await?;

    let row = sqlx::query("SELECT to_regclass('submissions')::text").fetch_one(&pool).await?;
    let regclass: Option<String> = row.try_get(0)?;
    assert!(regclass.is_some(), "expected submissions table after migrations");

    let columns = [
        "id",
        "template_id",
        "student_name",
        "student_roll_number",
        "file_path",
        "rendered_path",
        "score",
        "status",
        "score_error",
        "retry_count",
        "scoring_started_at",
        "scored_at",
        "created_at",
        "updated_at",
    ];
    for column in columns {
        let row = sqlx::query(
            "SELECT 1 FROM information_schema.columns \
             WHERE table_schema = 'public' AND table_name = 'submissions' AND column_name = $1",
        )
        .bind(column)
        .fetch_optional(&pool)
        .await?;
        assert!(row.is_some(), "expected submissions.{column} after migrations");
    }

    let labels: Vec<String> = sqlx::query_scalar(
        "SELECT enumlabel FROM pg_enum e \
         JOIN pg_type t ON t.oid = e.enumtypid \
         WHERE t.typname = 'submissionstatus' \
         ORDER BY enumsortorder",
    )
    .fetch_all(&pool)
    .await?;
    assert_eq!(labels, ["pending", "processing", "scored", "failed"]);

    Ok(())
}
