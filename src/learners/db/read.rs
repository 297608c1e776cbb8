use rusqlite::{OptionalExtension, Row, params};

use super::util::{map_sql_error, sql_to_bool};
use super::{LearnerDb, LearnerDbError};
use crate::learners::entity::{
    LearnerAttribute, LearnerId, LearnerState, OnlineLearner, PretrainedLearner, Sample,
};

const ONLINE_COLUMNS: &str =
    "id, tag, owner, samples_json, pretrained, active, deleted, model_pointer";
const PRETRAINED_COLUMNS: &str = "id, tag, exclusivity, model_pointer, vectorizer_pointer";
const ATTRIBUTE_COLUMNS: &str =
    "id, parent_id, name, output_range_json, model_pointer, vectorizer_pointer";

/// Filters for listing online learners. Results are ordered by tag.
#[derive(Debug, Clone, Copy, Default)]
pub struct OnlineQuery<'a> {
    /// Restrict to one owner.
    pub owner: Option<&'a str>,
    /// Skip rows with `active == false`.
    pub active_only: bool,
    /// Keep only rows that are pretrained or reach this many positives.
    pub mature_threshold: Option<usize>,
    /// Include soft-deleted rows.
    pub include_deleted: bool,
}

struct OnlineRow {
    id: String,
    tag: String,
    owner: String,
    samples_json: String,
    pretrained: bool,
    active: bool,
    deleted: bool,
    model_pointer: String,
}

impl OnlineRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            tag: row.get(1)?,
            owner: row.get(2)?,
            samples_json: row.get(3)?,
            pretrained: sql_to_bool(row.get(4)?),
            active: sql_to_bool(row.get(5)?),
            deleted: sql_to_bool(row.get(6)?),
            model_pointer: row.get(7)?,
        })
    }

    fn into_learner(self) -> Result<OnlineLearner, LearnerDbError> {
        let samples: Vec<Sample> = serde_json::from_str(&self.samples_json)?;
        let state = if self.deleted {
            LearnerState::Deleted
        } else {
            LearnerState::Active
        };
        Ok(OnlineLearner::from_parts(
            LearnerId::from_string(self.id),
            self.tag,
            self.owner,
            samples,
            self.pretrained,
            self.active,
            state,
            self.model_pointer,
        ))
    }
}

fn pretrained_from_row(row: &Row<'_>) -> rusqlite::Result<PretrainedLearner> {
    Ok(PretrainedLearner {
        id: LearnerId::from_string(row.get::<_, String>(0)?),
        tag: row.get(1)?,
        exclusivity: row.get(2)?,
        model_pointer: row.get(3)?,
        vectorizer_pointer: row.get(4)?,
    })
}

struct AttributeRow {
    id: String,
    parent_id: String,
    name: String,
    output_range_json: String,
    model_pointer: String,
    vectorizer_pointer: String,
}

impl AttributeRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            parent_id: row.get(1)?,
            name: row.get(2)?,
            output_range_json: row.get(3)?,
            model_pointer: row.get(4)?,
            vectorizer_pointer: row.get(5)?,
        })
    }

    fn into_attribute(self) -> Result<LearnerAttribute, LearnerDbError> {
        Ok(LearnerAttribute {
            id: LearnerId::from_string(self.id),
            name: self.name,
            parent: LearnerId::from_string(self.parent_id),
            output_range: serde_json::from_str(&self.output_range_json)?,
            model_pointer: self.model_pointer,
            vectorizer_pointer: self.vectorizer_pointer,
        })
    }
}

impl LearnerDb {
    /// Look up the online learner for `(tag, owner)`, deleted or not.
    pub fn find_online(
        &self,
        tag: &str,
        owner: &str,
    ) -> Result<Option<OnlineLearner>, LearnerDbError> {
        let sql = format!("SELECT {ONLINE_COLUMNS} FROM online_learners WHERE tag = ?1 AND owner = ?2");
        let row = self
            .connection
            .query_row(&sql, params![tag, owner], OnlineRow::from_row)
            .optional()
            .map_err(map_sql_error)?;
        row.map(OnlineRow::into_learner).transpose()
    }

    pub fn get_online(&self, id: &LearnerId) -> Result<Option<OnlineLearner>, LearnerDbError> {
        let sql = format!("SELECT {ONLINE_COLUMNS} FROM online_learners WHERE id = ?1");
        let row = self
            .connection
            .query_row(&sql, params![id.as_str()], OnlineRow::from_row)
            .optional()
            .map_err(map_sql_error)?;
        row.map(OnlineRow::into_learner).transpose()
    }

    /// List online learners matching `query`, ordered by tag then owner.
    pub fn list_online(&self, query: &OnlineQuery<'_>) -> Result<Vec<OnlineLearner>, LearnerDbError> {
        let sql = format!(
            "SELECT {ONLINE_COLUMNS} FROM online_learners
             WHERE (?1 IS NULL OR owner = ?1)
               AND (?2 = 0 OR active = 1)
               AND (?3 IS NULL OR pretrained = 1 OR positive_sample_count >= ?3)
               AND (?4 = 1 OR deleted = 0)
             ORDER BY tag ASC, owner ASC"
        );
        let mut stmt = self.connection.prepare(&sql).map_err(map_sql_error)?;
        let rows = stmt
            .query_map(
                params![
                    query.owner,
                    i64::from(query.active_only),
                    query.mature_threshold.map(|threshold| threshold as i64),
                    i64::from(query.include_deleted),
                ],
                OnlineRow::from_row,
            )
            .map_err(map_sql_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(map_sql_error)?;
        rows.into_iter().map(OnlineRow::into_learner).collect()
    }

    pub fn find_pretrained(&self, tag: &str) -> Result<Option<PretrainedLearner>, LearnerDbError> {
        let sql = format!("SELECT {PRETRAINED_COLUMNS} FROM pretrained_learners WHERE tag = ?1");
        self.connection
            .query_row(&sql, params![tag], pretrained_from_row)
            .optional()
            .map_err(map_sql_error)
    }

    /// List every pretrained learner, ordered by tag.
    pub fn list_pretrained(&self) -> Result<Vec<PretrainedLearner>, LearnerDbError> {
        let sql = format!("SELECT {PRETRAINED_COLUMNS} FROM pretrained_learners ORDER BY tag ASC");
        let mut stmt = self.connection.prepare(&sql).map_err(map_sql_error)?;
        let rows = stmt
            .query_map([], pretrained_from_row)
            .map_err(map_sql_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(map_sql_error)?;
        Ok(rows)
    }

    /// Attributes of a pretrained learner, ordered by name.
    pub fn list_attributes(
        &self,
        parent: &LearnerId,
    ) -> Result<Vec<LearnerAttribute>, LearnerDbError> {
        let sql = format!(
            "SELECT {ATTRIBUTE_COLUMNS} FROM learner_attributes WHERE parent_id = ?1 ORDER BY name ASC"
        );
        let mut stmt = self.connection.prepare(&sql).map_err(map_sql_error)?;
        let rows = stmt
            .query_map(params![parent.as_str()], AttributeRow::from_row)
            .map_err(map_sql_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(map_sql_error)?;
        rows.into_iter().map(AttributeRow::into_attribute).collect()
    }

    pub fn find_attribute(
        &self,
        parent: &LearnerId,
        name: &str,
    ) -> Result<Option<LearnerAttribute>, LearnerDbError> {
        let sql = format!(
            "SELECT {ATTRIBUTE_COLUMNS} FROM learner_attributes WHERE parent_id = ?1 AND name = ?2"
        );
        let row = self
            .connection
            .query_row(&sql, params![parent.as_str(), name], AttributeRow::from_row)
            .optional()
            .map_err(map_sql_error)?;
        row.map(AttributeRow::into_attribute).transpose()
    }
}
