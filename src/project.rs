//! Row projection.
//!
//! [`project()`] evaluates a [`CompiledSpec`] against one record. Selectors run
//! in colspec order and their values are concatenated. `Index` and `Range`
//! selectors claim the positions they read; `%` later emits every position
//! that is still unclaimed. Claims live in a [`ClaimedColumns`] set that is
//! created for each record and dropped afterwards, so nothing carries over
//! between rows.
//!
//! Filters run once per selected value, left to right. All filter calls on one
//! record share a [`RowScope`], so row bindings are prepared once per record.

use std::{borrow::Cow, ops::Range};

use crate::{
    colspec::{CompiledSpec, MetadataField, SelectorEntry, SelectorKind},
    error::{ColspecError, RecordPosition},
    expr::{CompiledExpression, EvaluationContext, RowScope},
};

/// Positions of one record already consumed by an `Index` or `Range` selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedColumns {
    claimed: Vec<bool>,
}

impl ClaimedColumns {
    pub fn new(width: usize) -> Self {
        ClaimedColumns {
            claimed: vec![false; width],
        }
    }

    pub fn claim(&mut self, columns: Range<usize>) {
        let end = columns.end.min(self.claimed.len());
        let start = columns.start.min(end);
        self.claimed[start..end].fill(true);
    }

    pub fn is_claimed(&self, column: usize) -> bool {
        self.claimed.get(column).copied().unwrap_or(false)
    }

    /// Unclaimed positions in ascending order.
    pub fn unclaimed(&self) -> impl Iterator<Item = usize> + '_ {
        self.claimed
            .iter()
            .enumerate()
            .filter(|(_, claimed)| !**claimed)
            .map(|(idx, _)| idx)
    }
}

/// Projects one data row. Returns `Ok(None)` for a row without cells, which
/// callers skip without consuming a row index.
///
/// `header_names` enables named bindings for filters; names and cells are
/// paired positionally up to the shorter of the two.
pub fn project(
    spec: &CompiledSpec,
    row: &[String],
    row_index: usize,
    header_names: Option<&[String]>,
) -> Result<Option<Vec<String>>, ColspecError> {
    if row.is_empty() {
        return Ok(None);
    }
    let named_columns = header_names
        .map(|names| {
            names
                .iter()
                .zip(row)
                .map(|(name, cell)| (name.as_str(), cell.as_str()))
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    let projection = RowProjection {
        spec,
        row,
        position: RecordPosition::Row(row_index),
        named_columns: &named_columns,
        scope: RowScope::default(),
    };
    projection.run().map(Some)
}

/// Projects the header row through the same selectors with filters disabled.
/// Metadata selectors emit their own name and computed columns emit their
/// expression text.
pub fn project_header(
    spec: &CompiledSpec,
    header: &[String],
) -> Result<Vec<String>, ColspecError> {
    RowProjection {
        spec,
        row: header,
        position: RecordPosition::Header,
        named_columns: &[],
        scope: RowScope::default(),
    }
    .run()
}

struct RowProjection<'a> {
    spec: &'a CompiledSpec,
    row: &'a [String],
    position: RecordPosition,
    named_columns: &'a [(&'a str, &'a str)],
    scope: RowScope,
}

impl<'a> RowProjection<'a> {
    fn run(&self) -> Result<Vec<String>, ColspecError> {
        let mut claimed = ClaimedColumns::new(self.row.len());
        let mut output = Vec::with_capacity(self.spec.len().max(self.row.len()));
        for entry in self.spec.entries() {
            let values = self.select(entry, &mut claimed)?;
            match self.active_filter(entry) {
                Some(filter) => {
                    for value in values {
                        output.push(self.apply(filter, &value)?);
                    }
                }
                None => output.extend(values.into_iter().map(Cow::into_owned)),
            }
        }
        Ok(output)
    }

    fn select(
        &self,
        entry: &'a SelectorEntry,
        claimed: &mut ClaimedColumns,
    ) -> Result<Vec<Cow<'a, str>>, ColspecError> {
        let row = self.row;
        let values = match entry.kind() {
            SelectorKind::Index(column) => {
                let cell = row.get(column).ok_or_else(|| self.out_of_range(entry))?;
                claimed.claim(column..column + 1);
                vec![Cow::Borrowed(cell.as_str())]
            }
            SelectorKind::Range { start, stop } => {
                let cells = row.get(start..stop).ok_or_else(|| self.out_of_range(entry))?;
                claimed.claim(start..stop);
                cells.iter().map(|cell| Cow::Borrowed(cell.as_str())).collect()
            }
            SelectorKind::All => row.iter().map(|cell| Cow::Borrowed(cell.as_str())).collect(),
            SelectorKind::Complement => claimed
                .unclaimed()
                .map(|column| Cow::Borrowed(row[column].as_str()))
                .collect(),
            SelectorKind::Metadata(field) => vec![self.metadata(field)],
            SelectorKind::Expression => match self.position {
                RecordPosition::Header => vec![Cow::Borrowed(
                    entry.filter().map_or(entry.token(), |filter| filter.source()),
                )],
                RecordPosition::Row(_) => vec![Cow::Borrowed("")],
            },
        };
        Ok(values)
    }

    fn metadata(&self, field: MetadataField) -> Cow<'a, str> {
        match (self.position, field) {
            (RecordPosition::Header, _) => Cow::Borrowed(field.name()),
            (RecordPosition::Row(index), MetadataField::RowNumber) => Cow::Owned(index.to_string()),
            (RecordPosition::Row(_), MetadataField::ColumnCount) => {
                Cow::Owned(self.row.len().to_string())
            }
        }
    }

    fn active_filter(&self, entry: &'a SelectorEntry) -> Option<&'a dyn CompiledExpression> {
        match self.position {
            RecordPosition::Header => None,
            RecordPosition::Row(_) => entry.filter(),
        }
    }

    fn apply(&self, filter: &dyn CompiledExpression, value: &str) -> Result<String, ColspecError> {
        let row_index = match self.position {
            RecordPosition::Row(index) => index,
            RecordPosition::Header => 0,
        };
        let context = EvaluationContext {
            value,
            row: self.row,
            row_index,
            row_length: self.row.len(),
            named_columns: self.named_columns,
            scope: &self.scope,
        };
        filter
            .evaluate(&context)
            .map_err(|err| ColspecError::FilterEvaluation {
                position: self.position,
                expression: filter.source().to_string(),
                message: err.message().to_string(),
            })
    }

    fn out_of_range(&self, entry: &SelectorEntry) -> ColspecError {
        ColspecError::ColumnOutOfRange {
            position: self.position,
            selector: entry.token().to_string(),
            width: self.row.len(),
        }
    }
}
