//! Column specification compiler.
//!
//! A colspec is a single comma-separated record whose fields are selector
//! tokens, for example `id,2-4,"price|to_number(value) * 1.2",%`. Because the
//! colspec is parsed with the same CSV rules as the data, filters containing
//! commas must be quoted.
//!
//! Each token is classified in priority order:
//!
//! 1. `selector|expression` attaches a filter; an empty selector (`|c0 + c1`)
//!    makes a computed column.
//! 2. `a-b` (hyphen not leading) is an inclusive range of indices or names.
//! 3. `*` selects the whole row, `%` the columns no earlier selector claimed.
//! 4. `_csv_rownum` / `_csv_columns` select row metadata.
//! 5. anything else is a numeric index or a header name.

use std::{collections::HashMap, fmt, sync::Arc};

use log::debug;
use serde::Serialize;

use crate::{
    error::ColspecError,
    expr::{CompiledExpression, ExpressionEngine},
};

/// Header name to zero-based position. The first occurrence of a duplicated
/// name wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    positions: HashMap<String, usize>,
}

impl HeaderMap {
    pub fn from_headers<S: AsRef<str>>(headers: &[S]) -> Self {
        let mut positions = HashMap::with_capacity(headers.len());
        for (idx, name) in headers.iter().enumerate() {
            positions.entry(name.as_ref().to_string()).or_insert(idx);
        }
        HeaderMap { positions }
    }

    pub fn get(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataField {
    /// `_csv_rownum`: zero-based index of the current data row.
    RowNumber,
    /// `_csv_columns`: number of cells in the current row.
    ColumnCount,
}

impl MetadataField {
    pub const PREFIX: &'static str = "_csv";

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "_csv_rownum" => Some(MetadataField::RowNumber),
            "_csv_columns" => Some(MetadataField::ColumnCount),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            MetadataField::RowNumber => "_csv_rownum",
            MetadataField::ColumnCount => "_csv_columns",
        }
    }
}

impl fmt::Display for MetadataField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectorKind {
    Index(usize),
    /// Half-open span `[start, stop)`; the textual form `a-b` is inclusive.
    Range { start: usize, stop: usize },
    All,
    Complement,
    Metadata(MetadataField),
    /// Computed column: one value per row, produced entirely by the filter.
    Expression,
}

#[derive(Debug, Clone)]
pub struct SelectorEntry {
    token: String,
    kind: SelectorKind,
    filter: Option<Arc<dyn CompiledExpression>>,
}

impl SelectorEntry {
    pub fn new(
        token: impl Into<String>,
        kind: SelectorKind,
        filter: Option<Arc<dyn CompiledExpression>>,
    ) -> Self {
        SelectorEntry {
            token: token.into(),
            kind,
            filter,
        }
    }

    /// The token as written in the colspec, including any filter.
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn kind(&self) -> SelectorKind {
        self.kind
    }

    pub fn filter(&self) -> Option<&dyn CompiledExpression> {
        self.filter.as_deref()
    }
}

/// Serializable view of one compiled selector, used by `--explain`.
#[derive(Debug, Serialize)]
pub struct SelectorSummary<'a> {
    pub token: &'a str,
    pub selector: SelectorKind,
    pub filter: Option<&'a str>,
}

#[derive(Debug, Clone, Default)]
pub struct CompiledSpec {
    entries: Vec<SelectorEntry>,
}

impl CompiledSpec {
    /// Compiles `text` against an optional header. Every token must compile;
    /// the first failure is returned and nothing is partially compiled.
    pub fn compile(
        text: &str,
        headers: Option<&HeaderMap>,
        engine: &dyn ExpressionEngine,
    ) -> Result<Self, ColspecError> {
        let tokens = tokenize(text)?;
        let mut entries = Vec::with_capacity(tokens.len());
        for (position, token) in tokens.iter().enumerate() {
            let entry = compile_token(token, headers, engine)?;
            debug!(
                "Selector {position}: '{}' -> {:?}{}",
                entry.token(),
                entry.kind(),
                if entry.filter().is_some() {
                    " with filter"
                } else {
                    ""
                }
            );
            entries.push(entry);
        }
        Ok(CompiledSpec { entries })
    }

    pub fn entries(&self) -> &[SelectorEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn has_filters(&self) -> bool {
        self.entries.iter().any(|entry| entry.filter.is_some())
    }

    pub fn describe(&self) -> Vec<SelectorSummary<'_>> {
        self.entries
            .iter()
            .map(|entry| SelectorSummary {
                token: entry.token(),
                selector: entry.kind(),
                filter: entry.filter().map(|filter| filter.source()),
            })
            .collect()
    }
}

fn tokenize(text: &str) -> Result<Vec<String>, ColspecError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());
    let mut record = csv::StringRecord::new();
    let found = reader
        .read_record(&mut record)
        .map_err(|err| ColspecError::malformed(text, err.to_string()))?;
    if !found {
        return Err(ColspecError::malformed(text, "empty column specification"));
    }
    let mut extra = csv::StringRecord::new();
    let has_extra = reader
        .read_record(&mut extra)
        .map_err(|err| ColspecError::malformed(text, err.to_string()))?;
    if has_extra {
        return Err(ColspecError::malformed(
            text,
            "column specification must be a single record",
        ));
    }
    Ok(record.iter().map(str::to_string).collect())
}

fn compile_token(
    raw: &str,
    headers: Option<&HeaderMap>,
    engine: &dyn ExpressionEngine,
) -> Result<SelectorEntry, ColspecError> {
    let (bare, filter_source) = match raw.split_once('|') {
        Some((bare, source)) => (bare.trim(), Some(source.trim())),
        None => (raw.trim(), None),
    };
    let filter = filter_source
        .map(|source| compile_filter(source, engine))
        .transpose()?;
    let kind = match (bare.is_empty(), filter.is_some()) {
        (true, true) => SelectorKind::Expression,
        (true, false) => return Err(ColspecError::malformed(raw, "empty selector")),
        (false, _) => classify(bare, headers)?,
    };
    Ok(SelectorEntry::new(raw.trim(), kind, filter))
}

fn compile_filter(
    source: &str,
    engine: &dyn ExpressionEngine,
) -> Result<Arc<dyn CompiledExpression>, ColspecError> {
    if source.is_empty() {
        return Err(ColspecError::InvalidFilterSyntax {
            expression: source.to_string(),
            message: "filter expression is empty".to_string(),
        });
    }
    engine
        .compile(source)
        .map_err(|err| ColspecError::InvalidFilterSyntax {
            expression: source.to_string(),
            message: err.message().to_string(),
        })
}

fn classify(token: &str, headers: Option<&HeaderMap>) -> Result<SelectorKind, ColspecError> {
    if let Some(range) = parse_range(token, headers)? {
        return Ok(range);
    }
    match token {
        "*" => return Ok(SelectorKind::All),
        "%" => return Ok(SelectorKind::Complement),
        _ => {}
    }
    if token.starts_with(MetadataField::PREFIX) {
        return MetadataField::from_name(token)
            .map(SelectorKind::Metadata)
            .ok_or_else(|| {
                ColspecError::malformed(
                    token,
                    "unknown metadata selector (expected _csv_rownum or _csv_columns)",
                )
            });
    }
    resolve_column(token, headers).map(SelectorKind::Index)
}

fn parse_range(
    token: &str,
    headers: Option<&HeaderMap>,
) -> Result<Option<SelectorKind>, ColspecError> {
    let mut first_error = None;
    for (at, _) in token.match_indices('-').filter(|(at, _)| *at > 0) {
        let start = token[..at].trim();
        let stop = token[at + 1..].trim();
        if start.is_empty() || stop.is_empty() {
            first_error.get_or_insert_with(|| {
                ColspecError::malformed(token, "range is missing a bound on one side")
            });
            continue;
        }
        match (
            resolve_column(start, headers),
            resolve_column(stop, headers),
        ) {
            (Ok(start), Ok(stop)) => return build_range(token, start, stop).map(Some),
            (Err(err), _) | (_, Err(err)) => {
                first_error.get_or_insert(err);
            }
        }
    }
    let Some(err) = first_error else {
        return Ok(None);
    };
    // Header names may contain hyphens themselves.
    match headers.and_then(|map| map.get(token)) {
        Some(index) => Ok(Some(SelectorKind::Index(index))),
        None => Err(err),
    }
}

fn build_range(token: &str, start: usize, stop: usize) -> Result<SelectorKind, ColspecError> {
    if start > stop {
        return Err(ColspecError::malformed(
            token,
            format!("range start {start} comes after range end {stop}"),
        ));
    }
    let stop = stop
        .checked_add(1)
        .ok_or_else(|| ColspecError::malformed(token, "range end is too large"))?;
    Ok(SelectorKind::Range { start, stop })
}

fn resolve_column(token: &str, headers: Option<&HeaderMap>) -> Result<usize, ColspecError> {
    if !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit()) {
        return token
            .parse::<usize>()
            .map_err(|_| ColspecError::malformed(token, "column index is too large"));
    }
    if let Some(index) = headers.and_then(|map| map.get(token)) {
        return Ok(index);
    }
    if token.starts_with('-') && token.parse::<i64>().is_ok() {
        return Err(ColspecError::malformed(
            token,
            "column indices must not be negative",
        ));
    }
    Err(ColspecError::unresolved(token))
}
