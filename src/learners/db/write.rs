use rusqlite::{Connection, params};

use super::util::{bool_to_sql, map_sql_error};
use super::{LearnerDb, LearnerDbError, LearnerWriteBatch};
use crate::learners::entity::{LearnerAttribute, OnlineLearner, PretrainedLearner};

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(sql_err, _)
            if sql_err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn map_insert_error(err: rusqlite::Error, identity: impl FnOnce() -> String) -> LearnerDbError {
    if is_constraint_violation(&err) {
        LearnerDbError::Duplicate(identity())
    } else {
        map_sql_error(err)
    }
}

fn write_online(connection: &Connection, learner: &OnlineLearner) -> Result<(), LearnerDbError> {
    let samples_json = serde_json::to_string(learner.samples())?;
    let changed = connection
        .prepare_cached(
            "UPDATE online_learners
             SET samples_json = ?2,
                 positive_sample_count = ?3,
                 pretrained = ?4,
                 active = ?5,
                 deleted = ?6,
                 model_pointer = ?7
             WHERE id = ?1",
        )
        .map_err(map_sql_error)?
        .execute(params![
            learner.id.as_str(),
            samples_json,
            learner.positive_sample_count() as i64,
            bool_to_sql(learner.pretrained),
            bool_to_sql(learner.active),
            bool_to_sql(learner.is_deleted()),
            learner.model_pointer,
        ])
        .map_err(map_sql_error)?;
    if changed == 0 {
        return Err(LearnerDbError::Unexpected);
    }
    Ok(())
}

fn write_exclusivity(
    connection: &Connection,
    learner: &PretrainedLearner,
) -> Result<(), LearnerDbError> {
    let changed = connection
        .execute(
            "UPDATE pretrained_learners SET exclusivity = ?2 WHERE id = ?1",
            params![learner.id.as_str(), learner.exclusivity],
        )
        .map_err(map_sql_error)?;
    if changed == 0 {
        return Err(LearnerDbError::Unexpected);
    }
    connection
        .execute(
            "UPDATE online_learners
             SET pretrained = CASE WHEN ?2 IS NULL OR owner = ?2 THEN 1 ELSE 0 END
             WHERE tag = ?1",
            params![learner.tag, learner.exclusivity],
        )
        .map_err(map_sql_error)?;
    Ok(())
}

impl LearnerDb {
    /// Insert a new online learner; `(tag, owner)` must be unused.
    pub fn insert_online(&self, learner: &OnlineLearner) -> Result<(), LearnerDbError> {
        let samples_json = serde_json::to_string(learner.samples())?;
        self.connection
            .execute(
                "INSERT INTO online_learners
                    (id, tag, owner, samples_json, positive_sample_count,
                     pretrained, active, deleted, model_pointer)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    learner.id.as_str(),
                    learner.tag,
                    learner.owner,
                    samples_json,
                    learner.positive_sample_count() as i64,
                    bool_to_sql(learner.pretrained),
                    bool_to_sql(learner.active),
                    bool_to_sql(learner.is_deleted()),
                    learner.model_pointer,
                ],
            )
            .map_err(|err| map_insert_error(err, || format!("{}/{}", learner.tag, learner.owner)))?;
        Ok(())
    }

    /// Persist every mutable column of an existing online learner.
    pub fn update_online(&self, learner: &OnlineLearner) -> Result<(), LearnerDbError> {
        write_online(&self.connection, learner)
    }

    /// Insert a pretrained learner; the tag must be unused.
    pub fn insert_pretrained(&self, learner: &PretrainedLearner) -> Result<(), LearnerDbError> {
        self.connection
            .execute(
                "INSERT INTO pretrained_learners
                    (id, tag, exclusivity, model_pointer, vectorizer_pointer)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    learner.id.as_str(),
                    learner.tag,
                    learner.exclusivity,
                    learner.model_pointer,
                    learner.vectorizer_pointer,
                ],
            )
            .map_err(|err| map_insert_error(err, || learner.tag.clone()))?;
        Ok(())
    }

    /// Store the exclusivity of `learner` and re-evaluate the `pretrained`
    /// flag of every online learner for its tag, in one transaction.
    pub fn set_exclusivity(&self, learner: &PretrainedLearner) -> Result<(), LearnerDbError> {
        let mut batch = self.write_batch()?;
        batch.set_exclusivity(learner)?;
        batch.commit()
    }

    /// Insert an attribute; names are unique per parent.
    pub fn insert_attribute(&self, attribute: &LearnerAttribute) -> Result<(), LearnerDbError> {
        let output_range_json = serde_json::to_string(&attribute.output_range)?;
        self.connection
            .execute(
                "INSERT INTO learner_attributes
                    (id, parent_id, name, output_range_json, model_pointer, vectorizer_pointer)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    attribute.id.as_str(),
                    attribute.parent.as_str(),
                    attribute.name,
                    output_range_json,
                    attribute.model_pointer,
                    attribute.vectorizer_pointer,
                ],
            )
            .map_err(|err| map_insert_error(err, || attribute.name.clone()))?;
        Ok(())
    }

    /// Start a write batch that wraps related mutations in a single transaction.
    pub fn write_batch(&self) -> Result<LearnerWriteBatch<'_>, LearnerDbError> {
        let tx = self
            .connection
            .unchecked_transaction()
            .map_err(map_sql_error)?;
        Ok(LearnerWriteBatch { tx })
    }
}

impl LearnerWriteBatch<'_> {
    pub fn set_exclusivity(&mut self, learner: &PretrainedLearner) -> Result<(), LearnerDbError> {
        write_exclusivity(&self.tx, learner)
    }

    /// Commit all queued writes. Dropping the batch instead rolls them back.
    pub fn commit(self) -> Result<(), LearnerDbError> {
        self.tx.commit().map_err(map_sql_error)
    }
}
