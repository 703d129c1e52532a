//! libSQL storage layer for versioned prompt overrides.
//!
//! The [`Storage`] struct wraps a local libSQL database holding every
//! [`PromptOverride`] version per `(tenant_id, step_name)`.
//!
//! **Invariant:** at most one override per pair is active. Creation and
//! rollback each run as a single IMMEDIATE transaction, serialized within
//! the process by a write lock, and the schema backs the invariant with a
//! partial unique index.

mod migrations;

use std::path::Path;

use chrono::Utc;
use homeviz_shared::{HomeVizError, PromptOverride, Result};
use libsql::{Connection, Database, TransactionBehavior, params};
use tokio::sync::Mutex;
use uuid::Uuid;

const OVERRIDE_COLUMNS: &str =
    "id, tenant_id, step_name, version, prompt_text, is_active, created_by, created_at";

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
    write_lock: Mutex<()>,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| HomeVizError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| HomeVizError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| HomeVizError::Storage(e.to_string()))?;

        let storage = Self {
            db,
            conn,
            readonly: false,
            write_lock: Mutex::new(()),
        };
        storage.set_busy_timeout().await?;
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open a database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| HomeVizError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| HomeVizError::Storage(e.to_string()))?;

        let storage = Self {
            db,
            conn,
            readonly: true,
            write_lock: Mutex::new(()),
        };
        storage.set_busy_timeout().await?;
        Ok(storage)
    }

    /// Wait for other processes' write locks instead of failing with SQLITE_BUSY.
    async fn set_busy_timeout(&self) -> Result<()> {
        self.conn
            .query("PRAGMA busy_timeout = 5000", params![])
            .await
            .map_err(|e| HomeVizError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        HomeVizError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(HomeVizError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Override reads
    // -----------------------------------------------------------------------

    /// The active override for a pair, highest version first if the
    /// invariant was ever violated.
    pub async fn active_override(
        &self,
        tenant_id: &str,
        step_name: &str,
    ) -> Result<Option<PromptOverride>> {
        let sql = format!(
            "SELECT {OVERRIDE_COLUMNS} FROM prompt_overrides
             WHERE tenant_id = ?1 AND step_name = ?2 AND is_active = 1
             ORDER BY version DESC LIMIT 1"
        );
        let mut rows = self
            .conn
            .query(&sql, params![tenant_id, step_name])
            .await
            .map_err(|e| HomeVizError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_override(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(HomeVizError::Storage(e.to_string())),
        }
    }

    /// Every version for a pair, newest first.
    pub async fn list_overrides(
        &self,
        tenant_id: &str,
        step_name: &str,
    ) -> Result<Vec<PromptOverride>> {
        let sql = format!(
            "SELECT {OVERRIDE_COLUMNS} FROM prompt_overrides
             WHERE tenant_id = ?1 AND step_name = ?2
             ORDER BY version DESC"
        );
        let mut rows = self
            .conn
            .query(&sql, params![tenant_id, step_name])
            .await
            .map_err(|e| HomeVizError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| HomeVizError::Storage(e.to_string()))?
        {
            results.push(row_to_override(&row)?);
        }
        Ok(results)
    }

    /// Active overrides across all steps of a tenant, by step name.
    pub async fn list_active_overrides(&self, tenant_id: &str) -> Result<Vec<PromptOverride>> {
        let sql = format!(
            "SELECT {OVERRIDE_COLUMNS} FROM prompt_overrides
             WHERE tenant_id = ?1 AND is_active = 1
             ORDER BY step_name"
        );
        let mut rows = self
            .conn
            .query(&sql, params![tenant_id])
            .await
            .map_err(|e| HomeVizError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| HomeVizError::Storage(e.to_string()))?
        {
            results.push(row_to_override(&row)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Override writes
    // -----------------------------------------------------------------------

    /// Insert the next version for a pair as the only active override.
    ///
    /// Version numbering, deactivation of the predecessor, and the insert
    /// commit together or not at all.
    pub async fn create_override(
        &self,
        tenant_id: &str,
        step_name: &str,
        prompt_text: &str,
        created_by: Option<&str>,
    ) -> Result<PromptOverride> {
        self.check_writable()?;
        let _guard = self.write_lock.lock().await;

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .await
            .map_err(|e| HomeVizError::Storage(e.to_string()))?;

        let mut rows = tx
            .query(
                "SELECT COALESCE(MAX(version), 0) FROM prompt_overrides
                 WHERE tenant_id = ?1 AND step_name = ?2",
                params![tenant_id, step_name],
            )
            .await
            .map_err(|e| HomeVizError::Storage(e.to_string()))?;
        let latest: u32 = match rows
            .next()
            .await
            .map_err(|e| HomeVizError::Storage(e.to_string()))?
        {
            Some(row) => row
                .get::<u32>(0)
                .map_err(|e| HomeVizError::Storage(e.to_string()))?,
            None => 0,
        };
        drop(rows);

        let next_version = latest + 1;

        tx.execute(
            "UPDATE prompt_overrides SET is_active = 0
             WHERE tenant_id = ?1 AND step_name = ?2 AND is_active = 1",
            params![tenant_id, step_name],
        )
        .await
        .map_err(|e| HomeVizError::Storage(e.to_string()))?;

        let created = PromptOverride {
            id: Uuid::now_v7().to_string(),
            tenant_id: tenant_id.to_string(),
            step_name: step_name.to_string(),
            version: next_version,
            prompt_text: prompt_text.to_string(),
            is_active: true,
            created_by: created_by.map(str::to_string),
            created_at: Utc::now(),
        };

        tx.execute(
            "INSERT INTO prompt_overrides
               (id, tenant_id, step_name, version, prompt_text, is_active, created_by, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?7)",
            params![
                created.id.as_str(),
                tenant_id,
                step_name,
                i64::from(next_version),
                prompt_text,
                created_by,
                created.created_at.to_rfc3339(),
            ],
        )
        .await
        .map_err(|e| HomeVizError::Storage(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| HomeVizError::Storage(e.to_string()))?;

        tracing::info!(
            tenant = tenant_id,
            step = step_name,
            version = next_version,
            "created prompt override"
        );
        Ok(created)
    }

    /// Reactivate the version before the newest one.
    ///
    /// Returns `None` without touching anything when the pair has fewer
    /// than two versions. Versions are never deleted or renumbered.
    pub async fn rollback_override(
        &self,
        tenant_id: &str,
        step_name: &str,
    ) -> Result<Option<PromptOverride>> {
        self.check_writable()?;
        let _guard = self.write_lock.lock().await;

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .await
            .map_err(|e| HomeVizError::Storage(e.to_string()))?;

        let sql = format!(
            "SELECT {OVERRIDE_COLUMNS} FROM prompt_overrides
             WHERE tenant_id = ?1 AND step_name = ?2
             ORDER BY version DESC LIMIT 2"
        );
        let mut rows = tx
            .query(&sql, params![tenant_id, step_name])
            .await
            .map_err(|e| HomeVizError::Storage(e.to_string()))?;

        let mut latest_two = Vec::with_capacity(2);
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| HomeVizError::Storage(e.to_string()))?
        {
            latest_two.push(row_to_override(&row)?);
        }
        drop(rows);

        let [current, previous] = match <[PromptOverride; 2]>::try_from(latest_two) {
            Ok(pair) => pair,
            Err(_) => {
                tracing::warn!(
                    tenant = tenant_id,
                    step = step_name,
                    "no previous version to roll back to"
                );
                tx.rollback()
                    .await
                    .map_err(|e| HomeVizError::Storage(e.to_string()))?;
                return Ok(None);
            }
        };

        // Deactivate before activating so the single-active index never trips.
        tx.execute(
            "UPDATE prompt_overrides SET is_active = 0
             WHERE tenant_id = ?1 AND step_name = ?2 AND is_active = 1",
            params![tenant_id, step_name],
        )
        .await
        .map_err(|e| HomeVizError::Storage(e.to_string()))?;

        tx.execute(
            "UPDATE prompt_overrides SET is_active = 1 WHERE id = ?1",
            params![previous.id.as_str()],
        )
        .await
        .map_err(|e| HomeVizError::Storage(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| HomeVizError::Storage(e.to_string()))?;

        tracing::info!(
            tenant = tenant_id,
            step = step_name,
            from = current.version,
            to = previous.version,
            "rolled back prompt override"
        );

        Ok(Some(PromptOverride {
            is_active: true,
            ..previous
        }))
    }
}

/// Convert a database row to a [`PromptOverride`].
fn row_to_override(row: &libsql::Row) -> Result<PromptOverride> {
    Ok(PromptOverride {
        id: row
            .get::<String>(0)
            .map_err(|e| HomeVizError::Storage(e.to_string()))?,
        tenant_id: row
            .get::<String>(1)
            .map_err(|e| HomeVizError::Storage(e.to_string()))?,
        step_name: row
            .get::<String>(2)
            .map_err(|e| HomeVizError::Storage(e.to_string()))?,
        version: row
            .get::<u32>(3)
            .map_err(|e| HomeVizError::Storage(e.to_string()))?,
        prompt_text: row
            .get::<String>(4)
            .map_err(|e| HomeVizError::Storage(e.to_string()))?,
        is_active: row
            .get::<i64>(5)
            .map_err(|e| HomeVizError::Storage(e.to_string()))?
            != 0,
        created_by: row.get::<String>(6).ok(),
        created_at: {
            let s: String = row
                .get(7)
                .map_err(|e| HomeVizError::Storage(e.to_string()))?;
            chrono::DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&chrono::Utc))
                .map_err(|e| HomeVizError::Storage(format!("invalid date: {e}")))?
        },
    })
}
