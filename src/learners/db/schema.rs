use rusqlite::Connection;

use super::LearnerDbError;
use super::util::map_sql_error;

pub(super) fn apply_schema(connection: &Connection) -> Result<(), LearnerDbError> {
    connection
        .execute_batch(
            "CREATE TABLE IF NOT EXISTS online_learners (
                id TEXT PRIMARY KEY,
                tag TEXT NOT NULL,
                owner TEXT NOT NULL,
                samples_json TEXT NOT NULL DEFAULT '[]',
                positive_sample_count INTEGER NOT NULL DEFAULT 0,
                pretrained INTEGER NOT NULL DEFAULT 0,
                active INTEGER NOT NULL DEFAULT 1,
                deleted INTEGER NOT NULL DEFAULT 0,
                model_pointer TEXT NOT NULL,
                UNIQUE(tag, owner)
             );
             CREATE INDEX IF NOT EXISTS idx_online_learners_owner_tag
                ON online_learners (owner, tag);
             CREATE TABLE IF NOT EXISTS pretrained_learners (
                id TEXT PRIMARY KEY,
                tag TEXT NOT NULL UNIQUE,
                exclusivity TEXT,
                model_pointer TEXT NOT NULL,
                vectorizer_pointer TEXT NOT NULL
             );
             CREATE TABLE IF NOT EXISTS learner_attributes (
                id TEXT PRIMARY KEY,
                parent_id TEXT NOT NULL,
                name TEXT NOT NULL,
                output_range_json TEXT NOT NULL,
                model_pointer TEXT NOT NULL,
                vectorizer_pointer TEXT NOT NULL,
                UNIQUE(parent_id, name),
                FOREIGN KEY(parent_id) REFERENCES pretrained_learners(id) ON DELETE CASCADE
             );",
        )
        .map_err(map_sql_error)?;
    Ok(())
}
