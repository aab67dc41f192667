//! Opaque connection cursors, `base64("arrayconnection:<offset>")`.

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::{Error, Result};

const PREFIX: &str = "arrayconnection:";

pub fn offset_to_cursor(offset: usize) -> String {
    STANDARD.encode(format!("{PREFIX}{offset}"))
}

pub fn cursor_to_offset(cursor: &str) -> Result<usize> {
    let invalid = || Error::InvalidCursor {
        cursor: cursor.to_string(),
    };

    let decoded = STANDARD.decode(cursor).map_err(|_| invalid())?;
    let decoded = String::from_utf8(decoded).map_err(|_| invalid())?;

    decoded
        .strip_prefix(PREFIX)
        .and_then(|offset| offset.parse().ok())
        .ok_or_else(invalid)
}

/// Page metadata for a slice of `count` edges starting at `offset` out of `total`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub start_cursor: Option<String>,
    pub end_cursor: Option<String>,
    pub has_previous_page: bool,
    pub has_next_page: bool,
}

impl PageInfo {
    pub fn new(offset: usize, count: usize, total: usize) -> Self {
        let (start_cursor, end_cursor) = if count == 0 {
            (None, None)
        } else {
            (
                Some(offset_to_cursor(offset)),
                Some(offset_to_cursor(offset + count - 1)),
            )
        };

        Self {
            start_cursor,
            end_cursor,
            has_previous_page: offset > 0,
            has_next_page: offset + count < total,
        }
    }
}
