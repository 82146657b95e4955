//! Document store database schema.

/// SQL to create the documents table.
pub const CREATE_DOCUMENTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS documents (
    owner_id    VARCHAR(255) NOT NULL,
    doc_id      VARCHAR(255) NOT NULL,
    body        JSONB NOT NULL,
    updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    PRIMARY KEY (owner_id, doc_id)
);
";
