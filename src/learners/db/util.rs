use std::path::Path;

use super::LearnerDbError;

/// Translate rusqlite errors into friendlier LearnerDbError variants.
pub(super) fn map_sql_error(err: rusqlite::Error) -> LearnerDbError {
    match err {
        rusqlite::Error::SqliteFailure(sql_err, _)
            if sql_err.extended_code == rusqlite::ffi::SQLITE_BUSY =>
        {
            LearnerDbError::Busy
        }
        rusqlite::Error::InvalidQuery
        | rusqlite::Error::InvalidParameterName(_)
        | rusqlite::Error::MultipleStatement => LearnerDbError::Unexpected,
        other => LearnerDbError::Sql(other),
    }
}

pub(super) fn create_parent_if_needed(path: &Path) -> Result<(), LearnerDbError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        std::fs::create_dir_all(parent).map_err(|source| LearnerDbError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}

pub(super) fn bool_to_sql(value: bool) -> i64 {
    i64::from(value)
}

pub(super) fn sql_to_bool(value: i64) -> bool {
    value != 0
}
