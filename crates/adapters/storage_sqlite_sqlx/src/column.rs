//! Column decoding helpers shared by the repositories.

use serde::de::DeserializeOwned;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use nodehook_domain::time::Timestamp;

fn decode_error(err: impl std::error::Error + Send + Sync + 'static) -> sqlx::Error {
    sqlx::Error::Decode(Box::new(err))
}

pub(crate) fn uuid(row: &SqliteRow, column: &str) -> Result<uuid::Uuid, sqlx::Error> {
    row.try_get(column)
}

pub(crate) fn json<T: DeserializeOwned>(row: &SqliteRow, column: &str) -> Result<T, sqlx::Error> {
    let text: String = row.try_get(column)?;
    serde_json::from_str(&text).map_err(decode_error)
}

pub(crate) fn timestamp(row: &SqliteRow, column: &str) -> Result<Timestamp, sqlx::Error> {
    let text: String = row.try_get(column)?;
    parse_timestamp(&text)
}

pub(crate) fn maybe_timestamp(
    row: &SqliteRow,
    column: &str,
) -> Result<Option<Timestamp>, sqlx::Error> {
    let text: Option<String> = row.try_get(column)?;
    text.as_deref().map(parse_timestamp).transpose()
}

fn parse_timestamp(text: &str) -> Result<Timestamp, sqlx::Error> {
    chrono::DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.to_utc())
        .map_err(decode_error)
}

pub(crate) fn format_timestamp(ts: Timestamp) -> String {
    ts.to_rfc3339()
}
