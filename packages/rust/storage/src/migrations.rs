//! SQL migration definitions for the HomeViz database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: prompt_overrides with single-active index",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Versioned prompt overrides per tenant and step
CREATE TABLE IF NOT EXISTS prompt_overrides (
    id          TEXT PRIMARY KEY,
    tenant_id   TEXT NOT NULL,
    step_name   TEXT NOT NULL,
    version     INTEGER NOT NULL CHECK (version > 0),
    prompt_text TEXT NOT NULL,
    is_active   INTEGER NOT NULL DEFAULT 0,
    created_by  TEXT,
    created_at  TEXT NOT NULL,
    UNIQUE(tenant_id, step_name, version)
);

CREATE INDEX IF NOT EXISTS idx_overrides_pair
    ON prompt_overrides(tenant_id, step_name, version DESC);

-- At most one active override per (tenant, step)
CREATE UNIQUE INDEX IF NOT EXISTS idx_overrides_single_active
    ON prompt_overrides(tenant_id, step_name)
    WHERE is_active = 1;

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
