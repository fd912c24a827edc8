/// Forward-only, read-only result cursor.
///
/// A `ResultCursor` owns the decoded tuple stream of one result set and the
/// descriptors of its columns. It moves BeforeFirst, OnRow(1), OnRow(2), ...,
/// AfterLast and never back. Typed getters resolve a column by 1-based index or
/// case-insensitive label and hand the value to the coercion rules.
///
/// Requests the cursor cannot honor but that are harmless (reverse fetch
/// direction, fetch size hints) are accepted and leave a warning behind.
use std::collections::HashMap;
use std::io::Cursor;

use bytes::Bytes;
use chrono::{FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use uuid::Uuid;

use crate::coerce::{self, ArrayElements, Coerced, CoercionMode, TargetKind};
use crate::error::{DriverError, Result};
use crate::metadata::{resolve, ResultMetadata};
use crate::models::{CursorConcurrency, CursorType, FetchDirection};
use crate::transport::{MaterializedRows, QueryOutput, TupleStream};
use crate::value::{DecodedValue, Decimal};
use crate::warning::{Warning, WarningChain};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    BeforeFirst,
    OnRow(usize),
    AfterLast,
}

/// A column addressed by 1-based index or by label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnRef {
    Index(usize),
    Name(String),
}

impl From<usize> for ColumnRef {
    fn from(index: usize) -> Self {
        ColumnRef::Index(index)
    }
}

impl From<i32> for ColumnRef {
    fn from(index: i32) -> Self {
        // Non-positive indexes are rejected as out of range on use
        ColumnRef::Index(usize::try_from(index).unwrap_or(0))
    }
}

impl From<&str> for ColumnRef {
    fn from(name: &str) -> Self {
        ColumnRef::Name(name.to_string())
    }
}

impl From<String> for ColumnRef {
    fn from(name: String) -> Self {
        ColumnRef::Name(name)
    }
}

impl From<&String> for ColumnRef {
    fn from(name: &String) -> Self {
        ColumnRef::Name(name.clone())
    }
}

pub struct ResultCursor {
    metadata: ResultMetadata,
    tuples: Box<dyn TupleStream>,
    position: Position,
    current: Option<Vec<DecodedValue>>,
    /// Row pulled early by `is_last`; `Some(None)` means the stream is exhausted.
    lookahead: Option<Option<Vec<DecodedValue>>>,
    last_read: Option<usize>,
    was_null: bool,
    name_index: Option<HashMap<String, usize>>,
    warnings: WarningChain,
    mode: CoercionMode,
    closed: bool,
}

impl std::fmt::Debug for ResultCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCursor")
            .field("position", &self.position)
            .field("columns", &self.metadata.column_count())
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl ResultCursor {
    pub fn new(metadata: ResultMetadata, tuples: Box<dyn TupleStream>) -> Self {
        ResultCursor {
            metadata,
            tuples,
            position: Position::BeforeFirst,
            current: None,
            lookahead: None,
            last_read: None,
            was_null: false,
            name_index: None,
            warnings: WarningChain::default(),
            mode: CoercionMode::default(),
            closed: false,
        }
    }

    /// Build a cursor from a query result, deriving the column descriptors.
    pub fn from_query(output: QueryOutput) -> Result<Self> {
        let metadata = resolve(&output.projection, &output.schemas)?;
        Ok(ResultCursor::new(metadata, output.tuples))
    }

    pub fn metadata(&self) -> &ResultMetadata {
        &self.metadata
    }

    pub fn set_coercion_mode(&mut self, mode: CoercionMode) {
        self.mode = mode;
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(DriverError::Closed("cursor"));
        }
        Ok(())
    }

    fn pull(&mut self) -> Result<Option<Vec<DecodedValue>>> {
        let row = match self.lookahead.take() {
            Some(peeked) => peeked,
            None => self.tuples.next_tuple()?,
        };
        if let Some(values) = &row {
            if values.len() != self.metadata.column_count() {
                return Err(DriverError::Transport(format!(
                    "row has {} values for {} columns",
                    values.len(),
                    self.metadata.column_count()
                )));
            }
        }
        Ok(row)
    }

    /// Advance one row. Returns `false` once the rows are exhausted; further
    /// calls keep returning `false`.
    pub fn next(&mut self) -> Result<bool> {
        self.ensure_open()?;
        let next_number = match self.position {
            Position::AfterLast => return Ok(false),
            Position::BeforeFirst => 1,
            Position::OnRow(n) => n + 1,
        };
        self.last_read = None;
        self.was_null = false;
        match self.pull()? {
            Some(row) => {
                self.current = Some(row);
                self.position = Position::OnRow(next_number);
                Ok(true)
            }
            None => {
                self.current = None;
                self.position = Position::AfterLast;
                tracing::debug!(rows = next_number - 1, "cursor exhausted");
                Ok(false)
            }
        }
    }

    pub fn is_before_first(&self) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.position == Position::BeforeFirst)
    }

    pub fn is_after_last(&self) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.position == Position::AfterLast)
    }

    pub fn is_first(&self) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.position == Position::OnRow(1))
    }

    /// Whether the current row is the final one. Peeks one row ahead.
    pub fn is_last(&mut self) -> Result<bool> {
        self.ensure_open()?;
        if !matches!(self.position, Position::OnRow(_)) {
            return Ok(false);
        }
        if self.lookahead.is_none() {
            let peeked = self.tuples.next_tuple()?;
            self.lookahead = Some(peeked);
        }
        Ok(matches!(self.lookahead, Some(None)))
    }

    /// 1-based number of the current row, 0 when not on a row.
    pub fn row_number(&self) -> Result<usize> {
        self.ensure_open()?;
        Ok(match self.position {
            Position::OnRow(n) => n,
            _ => 0,
        })
    }

    /// Resolve a label to its 1-based column index.
    ///
    /// Matching is case-insensitive against the labels of this result; when two
    /// columns share a label the first one wins. Only valid once the cursor has
    /// been advanced.
    pub fn find_column(&mut self, name: &str) -> Result<usize> {
        self.ensure_open()?;
        if self.position == Position::BeforeFirst {
            return Err(DriverError::NotSupported("column lookup before the first row"));
        }
        let columns = self.metadata.columns();
        let index = self.name_index.get_or_insert_with(|| {
            let mut index = HashMap::with_capacity(columns.len());
            for (i, column) in columns.iter().enumerate() {
                index.entry(column.label().to_lowercase()).or_insert(i + 1);
            }
            index
        });
        index
            .get(&name.to_lowercase())
            .copied()
            .ok_or_else(|| DriverError::EntryNotFound(name.to_string()))
    }

    fn column_index(&mut self, column: ColumnRef) -> Result<usize> {
        match column {
            ColumnRef::Index(index) => {
                self.metadata.column(index)?;
                Ok(index)
            }
            ColumnRef::Name(name) => self.find_column(&name),
        }
    }

    fn read(&mut self, column: ColumnRef) -> Result<&DecodedValue> {
        self.ensure_open()?;
        let index = self.column_index(column)?;
        let row = self.current.as_ref().ok_or(DriverError::InvalidCursorState)?;
        let value = row
            .get(index - 1)
            .ok_or_else(|| DriverError::Transport(format!("row is missing column {index}")))?;
        self.last_read = Some(index);
        self.was_null = value.is_null();
        Ok(value)
    }

    /// Whether the last value read was SQL NULL.
    pub fn was_null(&self) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.last_read.is_some() && self.was_null)
    }

    /// Read the column as any target kind.
    pub fn get(&mut self, column: impl Into<ColumnRef>, target: TargetKind) -> Result<Coerced> {
        let mode = self.mode;
        let value = self.read(column.into())?;
        Ok(coerce::coerce_with(value, target, mode)?.value)
    }

    pub fn get_boolean(&mut self, column: impl Into<ColumnRef>) -> Result<bool> {
        coerce::to_boolean(self.read(column.into())?)
    }

    pub fn get_byte(&mut self, column: impl Into<ColumnRef>) -> Result<i8> {
        let mode = self.mode;
        coerce::to_byte(self.read(column.into())?, mode)
    }

    pub fn get_short(&mut self, column: impl Into<ColumnRef>) -> Result<i16> {
        let mode = self.mode;
        coerce::to_short(self.read(column.into())?, mode)
    }

    pub fn get_int(&mut self, column: impl Into<ColumnRef>) -> Result<i32> {
        let mode = self.mode;
        coerce::to_int(self.read(column.into())?, mode)
    }

    pub fn get_long(&mut self, column: impl Into<ColumnRef>) -> Result<i64> {
        let mode = self.mode;
        coerce::to_long(self.read(column.into())?, mode)
    }

    pub fn get_float(&mut self, column: impl Into<ColumnRef>) -> Result<f32> {
        coerce::to_float(self.read(column.into())?)
    }

    pub fn get_double(&mut self, column: impl Into<ColumnRef>) -> Result<f64> {
        coerce::to_double(self.read(column.into())?)
    }

    pub fn get_decimal(&mut self, column: impl Into<ColumnRef>) -> Result<Decimal> {
        coerce::to_decimal(self.read(column.into())?)
    }

    /// Decimal rounded half-to-even at `scale` fractional digits.
    pub fn get_decimal_scaled(&mut self, column: impl Into<ColumnRef>, scale: i32) -> Result<Decimal> {
        coerce::to_decimal_scaled(self.read(column.into())?, scale)
    }

    pub fn get_string(&mut self, column: impl Into<ColumnRef>) -> Result<String> {
        coerce::to_text(self.read(column.into())?, TargetKind::String)
    }

    pub fn get_character_stream(&mut self, column: impl Into<ColumnRef>) -> Result<Cursor<String>> {
        coerce::to_text(self.read(column.into())?, TargetKind::CharacterStream).map(Cursor::new)
    }

    pub fn get_bytes(&mut self, column: impl Into<ColumnRef>) -> Result<Bytes> {
        coerce::to_bytes(self.read(column.into())?, TargetKind::Bytes)
    }

    pub fn get_binary_stream(&mut self, column: impl Into<ColumnRef>) -> Result<Cursor<Bytes>> {
        coerce::to_bytes(self.read(column.into())?, TargetKind::BinaryStream).map(Cursor::new)
    }

    pub fn get_date(&mut self, column: impl Into<ColumnRef>) -> Result<NaiveDate> {
        coerce::to_date(self.read(column.into())?)
    }

    pub fn get_time(&mut self, column: impl Into<ColumnRef>) -> Result<NaiveTime> {
        coerce::to_time(self.read(column.into())?)
    }

    pub fn get_timestamp(&mut self, column: impl Into<ColumnRef>) -> Result<NaiveDateTime> {
        coerce::to_timestamp(self.read(column.into())?)
    }

    pub fn get_uuid(&mut self, column: impl Into<ColumnRef>) -> Result<Uuid> {
        coerce::to_uuid(self.read(column.into())?)
    }

    pub fn get_array(&mut self, column: impl Into<ColumnRef>) -> Result<ArrayElements> {
        coerce::to_array(self.read(column.into())?)
    }

    pub fn get_object(&mut self, column: impl Into<ColumnRef>) -> Result<DecodedValue> {
        self.read(column.into()).cloned()
    }

    pub fn get_date_in_zone(
        &mut self,
        _column: impl Into<ColumnRef>,
        _zone: FixedOffset,
    ) -> Result<NaiveDate> {
        Err(DriverError::NotSupported("zone-qualified date read"))
    }

    pub fn get_time_in_zone(
        &mut self,
        _column: impl Into<ColumnRef>,
        _zone: FixedOffset,
    ) -> Result<NaiveTime> {
        Err(DriverError::NotSupported("zone-qualified time read"))
    }

    pub fn get_timestamp_in_zone(
        &mut self,
        _column: impl Into<ColumnRef>,
        _zone: FixedOffset,
    ) -> Result<NaiveDateTime> {
        Err(DriverError::NotSupported("zone-qualified timestamp read"))
    }

    pub fn previous(&mut self) -> Result<bool> {
        Err(DriverError::NotSupported("backward scrolling"))
    }

    pub fn first(&mut self) -> Result<bool> {
        Err(DriverError::NotSupported("positioning on the first row"))
    }

    pub fn last(&mut self) -> Result<bool> {
        Err(DriverError::NotSupported("positioning on the last row"))
    }

    pub fn absolute(&mut self, _row: i64) -> Result<bool> {
        Err(DriverError::NotSupported("absolute positioning"))
    }

    pub fn relative(&mut self, _rows: i64) -> Result<bool> {
        Err(DriverError::NotSupported("relative positioning"))
    }

    pub fn before_first(&mut self) -> Result<()> {
        Err(DriverError::NotSupported("rewinding before the first row"))
    }

    pub fn after_last(&mut self) -> Result<()> {
        Err(DriverError::NotSupported("skipping past the last row"))
    }

    pub fn insert_row(&mut self) -> Result<()> {
        Err(DriverError::NotSupported("row insertion"))
    }

    pub fn update_row(&mut self) -> Result<()> {
        Err(DriverError::NotSupported("row update"))
    }

    pub fn delete_row(&mut self) -> Result<()> {
        Err(DriverError::NotSupported("row deletion"))
    }

    pub fn refresh_row(&mut self) -> Result<()> {
        Err(DriverError::NotSupported("row refresh"))
    }

    pub fn move_to_insert_row(&mut self) -> Result<()> {
        Err(DriverError::NotSupported("the insert row"))
    }

    pub fn cursor_type(&self) -> CursorType {
        CursorType::ForwardOnly
    }

    pub fn concurrency(&self) -> CursorConcurrency {
        CursorConcurrency::ReadOnly
    }

    /// Only forward fetching exists; any other direction is ignored with a warning.
    pub fn set_fetch_direction(&mut self, direction: FetchDirection) -> Result<()> {
        self.ensure_open()?;
        if direction != FetchDirection::Forward {
            self.warnings.push(Warning::new(format!(
                "fetch direction {direction:?} ignored, only forward fetching is supported"
            )));
        }
        Ok(())
    }

    pub fn fetch_direction(&self) -> FetchDirection {
        FetchDirection::Forward
    }

    /// Fetch size hints are ignored; a nonzero hint leaves a warning.
    pub fn set_fetch_size(&mut self, rows: usize) -> Result<()> {
        self.ensure_open()?;
        if rows != 0 {
            self.warnings.push(Warning::new(format!(
                "fetch size {rows} ignored, rows are fetched as the server sends them"
            )));
        }
        Ok(())
    }

    pub fn fetch_size(&self) -> usize {
        0
    }

    pub fn warnings(&self) -> &WarningChain {
        &self.warnings
    }

    pub fn clear_warnings(&mut self) {
        self.warnings.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Release the row stream. Closing twice is a no-op.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.current = None;
        self.lookahead = None;
        self.name_index = None;
        self.warnings.clear();
        self.tuples = Box::new(MaterializedRows::default());
    }
}
