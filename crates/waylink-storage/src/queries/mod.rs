// SPDX-FileCopyrightText: 2026 Waylink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules. All writes go through the single background
//! writer owned by [`crate::Database`].

pub mod accounts;
pub mod conversations;
pub mod jobs;
pub mod messages;
pub mod policies;

/// Parse a TEXT column into a strum-backed enum, surfacing a conversion
/// failure as a rusqlite error so it propagates through `query_row`.
pub(crate) fn parse_text_enum<T>(value: String) -> Result<T, rusqlite::Error>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })
}
