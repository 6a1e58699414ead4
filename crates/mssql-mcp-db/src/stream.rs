//! Lazy, forward-only row stream.
//!
//! Adapts the driver's item stream (metadata tokens interleaved with rows)
//! into the single-pass capability the execution core works against:
//! `read_next` within the current result set, `next_result_set` to advance,
//! `column_metadata` for the set currently being read. Not restartable.

use futures::TryStreamExt;
use tiberius::{Column, QueryItem, QueryStream, Row};

use crate::value::type_display_name;

/// Name and friendly type of one result column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub type_name: &'static str,
}

fn convert_columns(columns: &[Column]) -> Vec<ColumnInfo> {
    columns
        .iter()
        .map(|c| ColumnInfo {
            name: c.name().to_string(),
            type_name: type_display_name(c.column_type()),
        })
        .collect()
}

/// Single-pass cursor over one or more result sets.
pub struct RowStream<'a> {
    inner: QueryStream<'a>,
    columns: Vec<ColumnInfo>,
    /// Metadata of the next result set, observed while reading the current one.
    pending_columns: Option<Vec<ColumnInfo>>,
    /// A row observed before any metadata token (defensive; the driver sends
    /// metadata first).
    staged_row: Option<Row>,
    finished: bool,
}

impl<'a> RowStream<'a> {
    /// Wrap a driver stream, reading ahead to the first result set's
    /// metadata.
    pub async fn start(mut inner: QueryStream<'a>) -> Result<RowStream<'a>, tiberius::error::Error> {
        let mut columns = Vec::new();
        let mut staged_row = None;
        let mut finished = false;

        match inner.try_next().await? {
            Some(QueryItem::Metadata(meta)) => columns = convert_columns(meta.columns()),
            Some(QueryItem::Row(row)) => {
                columns = convert_columns(row.columns());
                staged_row = Some(row);
            }
            None => finished = true,
        }

        Ok(Self {
            inner,
            columns,
            pending_columns: None,
            staged_row,
            finished,
        })
    }

    /// Columns of the result set currently being read. Empty for statements
    /// that return no rows.
    pub fn column_metadata(&self) -> &[ColumnInfo] {
        &self.columns
    }

    /// Next row of the current result set; `None` once the set is exhausted.
    pub async fn read_next(&mut self) -> Result<Option<Row>, tiberius::error::Error> {
        if let Some(row) = self.staged_row.take() {
            return Ok(Some(row));
        }
        if self.finished || self.pending_columns.is_some() {
            return Ok(None);
        }
        match self.inner.try_next().await? {
            Some(QueryItem::Row(row)) => Ok(Some(row)),
            Some(QueryItem::Metadata(meta)) => {
                self.pending_columns = Some(convert_columns(meta.columns()));
                Ok(None)
            }
            None => {
                self.finished = true;
                Ok(None)
            }
        }
    }

    /// Advance to the next result set, skipping any unread rows of the
    /// current one. Returns `false` when there are no more sets.
    pub async fn next_result_set(&mut self) -> Result<bool, tiberius::error::Error> {
        if let Some(columns) = self.pending_columns.take() {
            self.columns = columns;
            return Ok(true);
        }
        if self.finished {
            return Ok(false);
        }
        loop {
            match self.inner.try_next().await? {
                Some(QueryItem::Row(_)) => continue,
                Some(QueryItem::Metadata(meta)) => {
                    self.columns = convert_columns(meta.columns());
                    return Ok(true);
                }
                None => {
                    self.finished = true;
                    return Ok(false);
                }
            }
        }
    }
}
