//! Postgres persistence for Leadbase: pool setup, migrations, the per-file
//! import session (upsert contract), and lead read/write helpers.

use async_trait::async_trait;
use sqlx::migrate::Migrator;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{Acquire, PgPool, Postgres, Row, Transaction};
use tracing::info;

use leadbase_core::{DedupeOutcome, Lead, LeadImport, RowOutcome, UploadRun};

mod error;

pub use error::StoreError;

pub const CRATE_NAME: &str = "leadbase-storage";

pub static MIGRATOR: Migrator = sqlx::migrate!();

/// One statement decides insert vs update; `xmax = 0` is true only for a
/// freshly inserted row, so the write itself reports which branch ran.
/// Contact/annotation fields fill only when the incoming value is non-empty.
const UPSERT_LEAD_SQL: &str = r#"
    INSERT INTO leads (
        first_name, last_name, headline, location, current_title,
        current_company, email_address, phone_number, profile_url,
        linkedin_url, active_project, notes, feedback
    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
    ON CONFLICT (profile_url) DO UPDATE SET
        first_name = EXCLUDED.first_name,
        last_name = EXCLUDED.last_name,
        headline = EXCLUDED.headline,
        location = EXCLUDED.location,
        current_title = EXCLUDED.current_title,
        current_company = EXCLUDED.current_company,
        email_address = COALESCE(NULLIF(EXCLUDED.email_address, ''), leads.email_address),
        phone_number = COALESCE(NULLIF(EXCLUDED.phone_number, ''), leads.phone_number),
        linkedin_url = EXCLUDED.linkedin_url,
        active_project = EXCLUDED.active_project,
        notes = COALESCE(NULLIF(EXCLUDED.notes, ''), leads.notes),
        feedback = COALESCE(NULLIF(EXCLUDED.feedback, ''), leads.feedback),
        updated_at = NOW()
    RETURNING (xmax = 0) AS inserted
"#;

const DEDUPE_SQL: &str = "SELECT groups_found, records_removed FROM dedupe_leads()";

pub async fn connect_pool(database_url: &str) -> Result<PgPool, StoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;
    Ok(pool)
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), StoreError> {
    MIGRATOR.run(pool).await?;
    info!("migrations applied");
    Ok(())
}

/// Storage handle the batch importer runs against.
#[async_trait]
pub trait LeadStore: Send + Sync {
    /// Open one logical transaction scope for a whole file.
    async fn begin_import(&self) -> Result<Box<dyn ImportSession>, StoreError>;

    /// Whole-table duplicate collapse outside an import.
    async fn dedupe(&self) -> Result<DedupeOutcome, StoreError>;
}

/// Per-file import scope. Row failures stay local; nothing is visible to
/// other connections until [`ImportSession::commit`].
#[async_trait]
pub trait ImportSession: Send {
    async fn upsert_lead(&mut self, row: &LeadImport) -> Result<RowOutcome, StoreError>;
    async fn record_run(&mut self, run: &UploadRun) -> Result<(), StoreError>;
    async fn dedupe(&mut self) -> Result<DedupeOutcome, StoreError>;
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// Postgres-backed [`LeadStore`].
#[derive(Debug, Clone)]
pub struct PgLeadStore {
    pool: PgPool,
}

impl PgLeadStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl LeadStore for PgLeadStore {
    async fn begin_import(&self) -> Result<Box<dyn ImportSession>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgImportSession { tx }))
    }

    async fn dedupe(&self) -> Result<DedupeOutcome, StoreError> {
        let row = sqlx::query(DEDUPE_SQL).fetch_one(&self.pool).await?;
        dedupe_from_row(&row)
    }
}

struct PgImportSession {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl ImportSession for PgImportSession {
    async fn upsert_lead(&mut self, row: &LeadImport) -> Result<RowOutcome, StoreError> {
        // Savepoint per row so a rejected row doesn't poison the file-level
        // transaction.
        let mut savepoint = self.tx.begin().await?;
        let result = sqlx::query(UPSERT_LEAD_SQL)
            .bind(&row.first_name)
            .bind(&row.last_name)
            .bind(&row.headline)
            .bind(&row.location)
            .bind(&row.current_title)
            .bind(&row.current_company)
            .bind(&row.email_address)
            .bind(&row.phone_number)
            .bind(&row.profile_url)
            .bind(&row.linkedin_url)
            .bind(&row.active_project)
            .bind(&row.notes)
            .bind(&row.feedback)
            .fetch_one(&mut *savepoint)
            .await;

        match result {
            Ok(returned) => {
                savepoint.commit().await?;
                let inserted: bool = returned.try_get("inserted")?;
                Ok(if inserted {
                    RowOutcome::Inserted
                } else {
                    RowOutcome::Updated
                })
            }
            Err(err) => {
                let _ = savepoint.rollback().await;
                Err(err.into())
            }
        }
    }

    async fn record_run(&mut self, run: &UploadRun) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO upload_history (filename, rows_inserted, rows_updated, rows_failed, status, error_message)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&run.filename)
        .bind(run.rows_inserted)
        .bind(run.rows_updated)
        .bind(run.rows_failed)
        .bind(run.status.as_str())
        .bind(&run.error_message)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn dedupe(&mut self) -> Result<DedupeOutcome, StoreError> {
        let row = sqlx::query(DEDUPE_SQL).fetch_one(&mut *self.tx).await?;
        dedupe_from_row(&row)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}

fn dedupe_from_row(row: &PgRow) -> Result<DedupeOutcome, StoreError> {
    Ok(DedupeOutcome {
        groups_found: row.try_get("groups_found")?,
        records_removed: row.try_get("records_removed")?,
    })
}

pub fn lead_from_row(row: &PgRow) -> Result<Lead, sqlx::Error> {
    Ok(Lead {
        id: row.try_get("id")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        headline: row.try_get("headline")?,
        location: row.try_get("location")?,
        current_title: row.try_get("current_title")?,
        current_company: row.try_get("current_company")?,
        email_address: row.try_get("email_address")?,
        phone_number: row.try_get("phone_number")?,
        profile_url: row.try_get("profile_url")?,
        linkedin_url: row.try_get("linkedin_url")?,
        active_project: row.try_get("active_project")?,
        notes: row.try_get("notes")?,
        feedback: row.try_get("feedback")?,
        viewed: row.try_get("viewed")?,
        viewed_at: row.try_get("viewed_at")?,
        viewed_by: row.try_get("viewed_by")?,
        hook: row.try_get("hook")?,
        hook_generated_at: row.try_get("hook_generated_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub async fn lead_count(pool: &PgPool) -> Result<i64, StoreError> {
    let row = sqlx::query("SELECT COUNT(*) AS total FROM leads")
        .fetch_one(pool)
        .await?;
    Ok(row.try_get("total")?)
}

pub async fn get_lead(pool: &PgPool, id: i64) -> Result<Option<Lead>, StoreError> {
    let row = sqlx::query("SELECT * FROM leads WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.map(|r| lead_from_row(&r).map_err(StoreError::from))
        .transpose()
}

/// Leads awaiting hook generation, oldest ids first. With `regenerate`, every
/// lead qualifies.
pub async fn leads_missing_hook(
    pool: &PgPool,
    limit: Option<i64>,
    regenerate: bool,
) -> Result<Vec<Lead>, StoreError> {
    let base = if regenerate {
        "SELECT * FROM leads ORDER BY id"
    } else {
        "SELECT * FROM leads WHERE hook IS NULL OR hook = '' ORDER BY id"
    };
    let rows = match limit {
        Some(n) => {
            sqlx::query(&format!("{base} LIMIT $1"))
                .bind(n)
                .fetch_all(pool)
                .await?
        }
        None => sqlx::query(base).fetch_all(pool).await?,
    };
    rows.iter()
        .map(|r| lead_from_row(r).map_err(StoreError::from))
        .collect()
}

pub async fn save_hook(pool: &PgPool, id: i64, hook: &str) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        UPDATE leads
           SET hook = $2,
               hook_generated_at = NOW(),
               updated_at = NOW()
         WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(hook)
    .execute(pool)
    .await?;
    Ok(())
}

/// Returns false when no lead has that id.
pub async fn mark_viewed(pool: &PgPool, id: i64, viewer: &str) -> Result<bool, StoreError> {
    let result = sqlx::query(
        r#"
        UPDATE leads
           SET viewed = TRUE,
               viewed_at = NOW(),
               viewed_by = $2,
               updated_at = NOW()
         WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(viewer)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn all_leads(pool: &PgPool) -> Result<Vec<Lead>, StoreError> {
    let rows = sqlx::query("SELECT * FROM leads ORDER BY id")
        .fetch_all(pool)
        .await?;
    rows.iter()
        .map(|r| lead_from_row(r).map_err(StoreError::from))
        .collect()
}

pub async fn delete_leads(pool: &PgPool, ids: &[i64]) -> Result<u64, StoreError> {
    if ids.is_empty() {
        return Ok(0);
    }
    let result = sqlx::query("DELETE FROM leads WHERE id = ANY($1)")
        .bind(ids)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_statement_reports_branch_and_fills_contact_fields() {
        // The statement is the contract: one atomic write, branch reported
        // via xmax, fill-if-empty carve-out for contact/annotation fields.
        assert!(UPSERT_LEAD_SQL.contains("ON CONFLICT (profile_url) DO UPDATE"));
        assert!(UPSERT_LEAD_SQL.contains("RETURNING (xmax = 0) AS inserted"));
        for field in ["email_address", "phone_number", "notes", "feedback"] {
            assert!(
                UPSERT_LEAD_SQL.contains(&format!("COALESCE(NULLIF(EXCLUDED.{field}, ''), leads.{field})")),
                "{field} must be fill-if-empty"
            );
        }
        // Descriptive fields overwrite unconditionally.
        assert!(UPSERT_LEAD_SQL.contains("headline = EXCLUDED.headline"));
        assert!(UPSERT_LEAD_SQL.contains("active_project = EXCLUDED.active_project"));
    }

    #[test]
    fn migrations_are_embedded() {
        assert!(!MIGRATOR.migrations.is_empty());
    }
}
