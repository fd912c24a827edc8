/// Column catalog: per-column descriptors for a result set
///
/// `resolve` combines the projected expression list of a query with the schemas of
/// the tables it reads and derives one `ColumnDescriptor` per result column. The
/// SQL text itself is never parsed here; the SQL layer hands over the projection.
use std::collections::HashMap;
use std::fmt;

use crate::constants::{ARRAY_INDEX_LABEL, ARRAY_VALUE_LABEL, MAX_DISPLAY_SIZE, ROWID_LABEL};
use crate::error::{DriverError, Result};
use crate::value::ValueKind;

/// Declared column type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SqlType {
    Int,
    BigInt,
    Decimal { precision: u32, scale: u32 },
    Char(u32),
    NChar(u32),
    VarChar(u32),
    NVarChar(u32),
    NText,
    FullText,
    Float,
    DateTime,
    Uuid,
    Image,
    Language,
    Binary(u32),
    Blob,
    NClob,
    Array(Box<SqlType>),
}

/// Value kind a column carries, as seen by the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlKind {
    Integer,
    Decimal,
    Real,
    Text,
    Binary,
    Timestamp,
    Tag,
    ArrayOf(ValueKind),
}

fn width(n: u32) -> i32 {
    i32::try_from(n).unwrap_or(MAX_DISPLAY_SIZE)
}

impl SqlType {
    /// Parse a declared type such as `int`, `decimal(10,5)` or `nvarchar(32) array`.
    ///
    /// Unrecognized names fall back to `NText`.
    pub fn from_declared(declared: &str) -> SqlType {
        let lowered = declared.trim().to_ascii_lowercase();
        if let Some(element) = lowered.strip_suffix("array") {
            let element = element.trim_end();
            if !element.is_empty() {
                return SqlType::Array(Box::new(SqlType::from_declared(element)));
            }
        }

        let (name, args) = match lowered.split_once('(') {
            Some((name, rest)) => {
                let args: Vec<u32> = rest
                    .trim_end_matches(')')
                    .split(',')
                    .filter_map(|arg| arg.trim().parse().ok())
                    .collect();
                (name.trim().to_string(), args)
            }
            None => (lowered.clone(), Vec::new()),
        };
        let first = args.first().copied();

        match name.as_str() {
            "int" | "integer" | "smallint" | "tinyint" | "mediumint" => {
                // SQLite stores every INTEGER as 64-bit
                if name == "integer" && args.is_empty() {
                    SqlType::BigInt
                } else {
                    SqlType::Int
                }
            }
            "bigint" | "int8" => SqlType::BigInt,
            "decimal" | "numeric" => SqlType::Decimal {
                precision: first.unwrap_or(38),
                scale: args.get(1).copied().unwrap_or(0),
            },
            "char" | "character" => SqlType::Char(first.unwrap_or(1)),
            "nchar" => SqlType::NChar(first.unwrap_or(1)),
            "varchar" => first.map_or(SqlType::NText, SqlType::VarChar),
            "nvarchar" => first.map_or(SqlType::NText, SqlType::NVarChar),
            "text" | "ntext" | "clob" => SqlType::NText,
            "fulltext" => SqlType::FullText,
            "float" | "double" | "real" | "double precision" => SqlType::Float,
            "datetime" | "timestamp" | "date" => SqlType::DateTime,
            "uniqueidentifier" | "uuid" => SqlType::Uuid,
            "image" => SqlType::Image,
            "language" => SqlType::Language,
            "binary" | "varbinary" => first.map_or(SqlType::Blob, SqlType::Binary),
            "blob" => SqlType::Blob,
            "nclob" => SqlType::NClob,
            _ => SqlType::NText,
        }
    }

    /// Column type used to describe a value when no declared type is known.
    pub fn for_value_kind(kind: ValueKind) -> SqlType {
        match kind {
            ValueKind::Integer => SqlType::BigInt,
            ValueKind::Decimal => SqlType::Decimal {
                precision: 38,
                scale: 0,
            },
            ValueKind::Real => SqlType::Float,
            ValueKind::Binary => SqlType::Blob,
            ValueKind::Timestamp => SqlType::DateTime,
            ValueKind::Tag => SqlType::Language,
            ValueKind::Null | ValueKind::Text | ValueKind::Array => SqlType::NText,
        }
    }

    pub fn display_size(&self) -> i32 {
        match self {
            SqlType::Int => 10,
            SqlType::BigInt => 19,
            SqlType::Decimal { precision, .. } => width(*precision),
            SqlType::Char(n)
            | SqlType::NChar(n)
            | SqlType::VarChar(n)
            | SqlType::NVarChar(n)
            | SqlType::Binary(n) => width(*n),
            SqlType::Float => 22,
            SqlType::DateTime => 23,
            SqlType::Uuid => 36,
            SqlType::Language => 8,
            SqlType::NText | SqlType::FullText | SqlType::Image | SqlType::Blob | SqlType::NClob => {
                MAX_DISPLAY_SIZE
            }
            SqlType::Array(element) => element.display_size(),
        }
    }

    pub fn precision(&self) -> i32 {
        match self {
            SqlType::Int => 10,
            SqlType::BigInt => 19,
            SqlType::Decimal { precision, .. } => width(*precision),
            SqlType::Array(element) => element.precision(),
            _ => 0,
        }
    }

    pub fn scale(&self) -> i32 {
        match self {
            SqlType::Decimal { scale, .. } => width(*scale),
            SqlType::Array(element) => element.scale(),
            _ => 0,
        }
    }

    pub fn sql_kind(&self) -> SqlKind {
        match self {
            SqlType::Int | SqlType::BigInt => SqlKind::Integer,
            SqlType::Decimal { .. } => SqlKind::Decimal,
            SqlType::Float => SqlKind::Real,
            SqlType::DateTime => SqlKind::Timestamp,
            SqlType::Language => SqlKind::Tag,
            SqlType::Binary(_) | SqlType::Image | SqlType::Blob => SqlKind::Binary,
            SqlType::Char(_)
            | SqlType::NChar(_)
            | SqlType::VarChar(_)
            | SqlType::NVarChar(_)
            | SqlType::NText
            | SqlType::FullText
            | SqlType::Uuid
            | SqlType::NClob => SqlKind::Text,
            SqlType::Array(element) => SqlKind::ArrayOf(element.sql_kind().value_kind()),
        }
    }

    pub fn type_name(&self) -> String {
        let name = match self {
            SqlType::Int => "int",
            SqlType::BigInt => "bigint",
            SqlType::Decimal { .. } => "decimal",
            SqlType::Char(_) => "char",
            SqlType::NChar(_) => "nchar",
            SqlType::VarChar(_) => "varchar",
            SqlType::NVarChar(_) => "nvarchar",
            SqlType::NText => "ntext",
            SqlType::FullText => "fulltext",
            SqlType::Float => "float",
            SqlType::DateTime => "datetime",
            SqlType::Uuid => "uniqueidentifier",
            SqlType::Image => "image",
            SqlType::Language => "language",
            SqlType::Binary(_) => "binary",
            SqlType::Blob => "blob",
            SqlType::NClob => "nclob",
            SqlType::Array(element) => return format!("{} array", element.type_name()),
        };
        name.to_string()
    }

    /// Rust type a plain object read of this column yields.
    pub fn class_tag(&self) -> &'static str {
        match self {
            SqlType::Int => "i32",
            SqlType::BigInt => "i64",
            SqlType::Decimal { .. } => "Decimal",
            SqlType::Float => "f64",
            SqlType::DateTime => "NaiveDateTime",
            SqlType::Binary(_) | SqlType::Image | SqlType::Blob => "Bytes",
            SqlType::Array(_) => "Vec<DecodedValue>",
            _ => "String",
        }
    }
}

impl SqlKind {
    /// Decoded value kind of a single value of this column.
    pub fn value_kind(self) -> ValueKind {
        match self {
            SqlKind::Integer => ValueKind::Integer,
            SqlKind::Decimal => ValueKind::Decimal,
            SqlKind::Real => ValueKind::Real,
            SqlKind::Text => ValueKind::Text,
            SqlKind::Binary => ValueKind::Binary,
            SqlKind::Timestamp => ValueKind::Timestamp,
            SqlKind::Tag => ValueKind::Tag,
            SqlKind::ArrayOf(_) => ValueKind::Array,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Nullability {
    NoNulls,
    Nullable,
    Unknown,
}

/// One column of a table schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSchema {
    pub name: String,
    pub sql_type: SqlType,
    pub not_null: bool,
    pub primary_key: bool,
    pub auto_generated: bool,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        ColumnSchema {
            name: name.into(),
            sql_type,
            not_null: false,
            primary_key: false,
            auto_generated: false,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn auto_generated(mut self) -> Self {
        self.auto_generated = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSchema>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnSchema>) -> Self {
        TableSchema {
            name: name.into(),
            columns,
        }
    }

    /// Case-insensitive column lookup.
    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns
            .iter()
            .find(|column| column.name.eq_ignore_ascii_case(name))
    }
}

/// Table schemas referenced by a query, keyed case-insensitively by table name.
#[derive(Debug, Clone, Default)]
pub struct SchemaCatalog {
    tables: HashMap<String, TableSchema>,
}

impl SchemaCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, table: TableSchema) {
        self.tables.insert(table.name.to_lowercase(), table);
    }

    pub fn with_table(mut self, table: TableSchema) -> Self {
        self.insert(table);
        self
    }

    pub fn table(&self, name: &str) -> Result<&TableSchema> {
        self.tables
            .get(&name.to_lowercase())
            .ok_or_else(|| DriverError::EntryNotFound(name.to_string()))
    }
}

impl FromIterator<TableSchema> for SchemaCatalog {
    fn from_iter<I: IntoIterator<Item = TableSchema>>(iter: I) -> Self {
        let mut catalog = SchemaCatalog::new();
        for table in iter {
            catalog.insert(table);
        }
        catalog
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateFunction {
    Count,
    Max,
    Min,
    Sum,
    Avg,
}

impl AggregateFunction {
    fn name(self) -> &'static str {
        match self {
            AggregateFunction::Count => "count",
            AggregateFunction::Max => "max",
            AggregateFunction::Min => "min",
            AggregateFunction::Sum => "sum",
            AggregateFunction::Avg => "avg",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregateArgument {
    Star,
    Column { table: String, column: String },
}

/// One entry of a query's select list, as handed over by the SQL layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectedExpr {
    Column {
        table: String,
        column: String,
        alias: Option<String>,
    },
    /// `table.*`, expanded in declared column order.
    AllColumns { table: String },
    RowId {
        table: String,
        alias: Option<String>,
    },
    Aggregate {
        function: AggregateFunction,
        argument: AggregateArgument,
        alias: Option<String>,
    },
    /// Deterministic per-row expression whose result type is already known.
    Derived {
        text: String,
        result_type: SqlType,
        alias: Option<String>,
    },
}

impl ProjectedExpr {
    pub fn column(table: impl Into<String>, column: impl Into<String>) -> Self {
        ProjectedExpr::Column {
            table: table.into(),
            column: column.into(),
            alias: None,
        }
    }

    pub fn all_columns(table: impl Into<String>) -> Self {
        ProjectedExpr::AllColumns {
            table: table.into(),
        }
    }

    pub fn row_id(table: impl Into<String>) -> Self {
        ProjectedExpr::RowId {
            table: table.into(),
            alias: None,
        }
    }

    pub fn count_star() -> Self {
        ProjectedExpr::Aggregate {
            function: AggregateFunction::Count,
            argument: AggregateArgument::Star,
            alias: None,
        }
    }

    pub fn aggregate(
        function: AggregateFunction,
        table: impl Into<String>,
        column: impl Into<String>,
    ) -> Self {
        ProjectedExpr::Aggregate {
            function,
            argument: AggregateArgument::Column {
                table: table.into(),
                column: column.into(),
            },
            alias: None,
        }
    }

    pub fn derived(text: impl Into<String>, result_type: SqlType) -> Self {
        ProjectedExpr::Derived {
            text: text.into(),
            result_type,
            alias: None,
        }
    }

    /// Attach an `AS` alias. Has no effect on `AllColumns`.
    pub fn aliased(mut self, name: impl Into<String>) -> Self {
        match &mut self {
            ProjectedExpr::Column { alias, .. }
            | ProjectedExpr::RowId { alias, .. }
            | ProjectedExpr::Aggregate { alias, .. }
            | ProjectedExpr::Derived { alias, .. } => *alias = Some(name.into()),
            ProjectedExpr::AllColumns { .. } => {}
        }
        self
    }

    /// Expression text as it would appear in the select list, without alias.
    pub fn render(&self) -> String {
        match self {
            ProjectedExpr::Column { column, .. } => column.clone(),
            ProjectedExpr::AllColumns { table } => format!("{table}.*"),
            ProjectedExpr::RowId { .. } => ROWID_LABEL.to_string(),
            ProjectedExpr::Aggregate {
                function, argument, ..
            } => match argument {
                AggregateArgument::Star => format!("{}(*)", function.name()),
                AggregateArgument::Column { column, .. } => {
                    format!("{}({column})", function.name())
                }
            },
            ProjectedExpr::Derived { text, .. } => text.clone(),
        }
    }
}

impl fmt::Display for ProjectedExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Metadata of one result column.
///
/// Always satisfies: definitely writable implies writable, and writable implies
/// not auto-generated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    label: String,
    name: String,
    table: Option<String>,
    sql_type: SqlType,
    nullability: Nullability,
    auto_generated: bool,
    searchable: bool,
    writable: bool,
    definitely_writable: bool,
    signed: bool,
}

#[derive(Debug, Clone)]
struct DescriptorFlags {
    nullability: Nullability,
    auto_generated: bool,
    searchable: bool,
    writable: bool,
    definitely_writable: bool,
    signed: bool,
}

impl ColumnDescriptor {
    fn new(
        label: String,
        table: Option<String>,
        sql_type: SqlType,
        flags: DescriptorFlags,
    ) -> Self {
        let writable = flags.writable && !flags.auto_generated;
        ColumnDescriptor {
            name: label.clone(),
            label,
            table,
            sql_type,
            nullability: flags.nullability,
            auto_generated: flags.auto_generated,
            searchable: flags.searchable,
            writable,
            definitely_writable: flags.definitely_writable && writable,
            signed: flags.signed,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Underlying column name; equals the label once an alias is applied.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table_name(&self) -> Option<&str> {
        self.table.as_deref()
    }

    pub fn catalog_name(&self) -> &str {
        ""
    }

    pub fn sql_type(&self) -> &SqlType {
        &self.sql_type
    }

    pub fn sql_kind(&self) -> SqlKind {
        self.sql_type.sql_kind()
    }

    pub fn type_name(&self) -> String {
        self.sql_type.type_name()
    }

    pub fn class_tag(&self) -> &'static str {
        self.sql_type.class_tag()
    }

    pub fn nullability(&self) -> Nullability {
        self.nullability
    }

    pub fn is_auto_generated(&self) -> bool {
        self.auto_generated
    }

    pub fn is_searchable(&self) -> bool {
        self.searchable
    }

    pub fn is_currency(&self) -> bool {
        false
    }

    pub fn is_case_sensitive(&self) -> bool {
        true
    }

    pub fn is_signed(&self) -> bool {
        self.signed
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    pub fn is_read_only(&self) -> bool {
        !self.writable
    }

    pub fn is_definitely_writable(&self) -> bool {
        self.definitely_writable
    }

    pub fn display_size(&self) -> i32 {
        self.sql_type.display_size()
    }

    pub fn precision(&self) -> i32 {
        self.sql_type.precision()
    }

    pub fn scale(&self) -> i32 {
        self.sql_type.scale()
    }
}

/// Ordered column descriptors of one result set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultMetadata {
    columns: Vec<ColumnDescriptor>,
}

impl ResultMetadata {
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// 1-based access.
    pub fn column(&self, index: usize) -> Result<&ColumnDescriptor> {
        index
            .checked_sub(1)
            .and_then(|i| self.columns.get(i))
            .ok_or_else(|| {
                DriverError::bad_argument(format!(
                    "column index {index} out of range 1..={}",
                    self.columns.len()
                ))
            })
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    /// Two-column layout used when an array value is walked as a cursor.
    pub fn for_array(element_kind: Option<ValueKind>) -> Self {
        let index = ColumnDescriptor::new(
            ARRAY_INDEX_LABEL.to_string(),
            None,
            SqlType::Int,
            DescriptorFlags {
                nullability: Nullability::NoNulls,
                auto_generated: false,
                searchable: false,
                writable: false,
                definitely_writable: false,
                signed: false,
            },
        );
        let value = ColumnDescriptor::new(
            ARRAY_VALUE_LABEL.to_string(),
            None,
            SqlType::for_value_kind(element_kind.unwrap_or(ValueKind::Text)),
            DescriptorFlags {
                nullability: Nullability::Nullable,
                auto_generated: false,
                searchable: false,
                writable: false,
                definitely_writable: false,
                signed: true,
            },
        );
        ResultMetadata {
            columns: vec![index, value],
        }
    }
}

/// Derive column descriptors for `projection` against `schemas`.
///
/// Unknown tables or columns raise `EntryNotFound`.
pub fn resolve(projection: &[ProjectedExpr], schemas: &SchemaCatalog) -> Result<ResultMetadata> {
    let mut columns = Vec::with_capacity(projection.len());
    for expr in projection {
        match expr {
            ProjectedExpr::Column {
                table,
                column,
                alias,
            } => {
                let table = schemas.table(table)?;
                let schema = table
                    .column(column)
                    .ok_or_else(|| DriverError::EntryNotFound(column.clone()))?;
                columns.push(table_column(table, schema, alias.as_deref()));
            }
            ProjectedExpr::AllColumns { table } => {
                let table = schemas.table(table)?;
                columns.extend(
                    table
                        .columns
                        .iter()
                        .map(|schema| table_column(table, schema, None)),
                );
            }
            ProjectedExpr::RowId { table, alias } => {
                let table = schemas.table(table)?;
                let label = alias.clone().unwrap_or_else(|| ROWID_LABEL.to_string());
                columns.push(ColumnDescriptor::new(
                    label,
                    Some(table.name.clone()),
                    SqlType::Int,
                    DescriptorFlags {
                        nullability: Nullability::NoNulls,
                        auto_generated: true,
                        searchable: true,
                        writable: false,
                        definitely_writable: false,
                        signed: false,
                    },
                ));
            }
            ProjectedExpr::Aggregate {
                function,
                argument,
                alias,
            } => {
                let sql_type = aggregate_type(*function, argument, schemas)?;
                let label = alias.clone().unwrap_or_else(|| expr.render());
                let is_count = *function == AggregateFunction::Count;
                columns.push(ColumnDescriptor::new(
                    label,
                    None,
                    sql_type,
                    DescriptorFlags {
                        nullability: if is_count {
                            Nullability::NoNulls
                        } else {
                            Nullability::Nullable
                        },
                        auto_generated: false,
                        searchable: false,
                        writable: false,
                        definitely_writable: false,
                        signed: !is_count,
                    },
                ));
            }
            ProjectedExpr::Derived {
                text,
                result_type,
                alias,
            } => {
                let label = alias.clone().unwrap_or_else(|| text.clone());
                columns.push(ColumnDescriptor::new(
                    label,
                    None,
                    result_type.clone(),
                    DescriptorFlags {
                        nullability: Nullability::Nullable,
                        auto_generated: false,
                        searchable: true,
                        writable: false,
                        definitely_writable: false,
                        signed: true,
                    },
                ));
            }
        }
    }
    Ok(ResultMetadata { columns })
}

fn table_column(table: &TableSchema, schema: &ColumnSchema, alias: Option<&str>) -> ColumnDescriptor {
    let constrained = schema.not_null || schema.primary_key;
    let label = alias.unwrap_or(&schema.name).to_string();
    ColumnDescriptor::new(
        label,
        Some(table.name.clone()),
        schema.sql_type.clone(),
        DescriptorFlags {
            nullability: if constrained {
                Nullability::NoNulls
            } else {
                Nullability::Nullable
            },
            auto_generated: schema.auto_generated,
            searchable: true,
            writable: true,
            definitely_writable: !constrained,
            signed: true,
        },
    )
}

fn aggregate_type(
    function: AggregateFunction,
    argument: &AggregateArgument,
    schemas: &SchemaCatalog,
) -> Result<SqlType> {
    let argument_type = match argument {
        AggregateArgument::Star if function == AggregateFunction::Count => None,
        AggregateArgument::Star => {
            return Err(DriverError::bad_argument(format!(
                "{}(*) is not a valid aggregate",
                function.name()
            )));
        }
        AggregateArgument::Column { table, column } => {
            let schema = schemas
                .table(table)?
                .column(column)
                .ok_or_else(|| DriverError::EntryNotFound(column.clone()))?;
            Some(schema.sql_type.clone())
        }
    };

    Ok(match (function, argument_type) {
        (AggregateFunction::Count, _) | (_, None) => SqlType::Int,
        (AggregateFunction::Max | AggregateFunction::Min, Some(sql_type)) => sql_type,
        (AggregateFunction::Sum, Some(SqlType::Int | SqlType::BigInt)) => SqlType::BigInt,
        (AggregateFunction::Sum | AggregateFunction::Avg, Some(decimal @ SqlType::Decimal { .. })) => {
            decimal
        }
        (AggregateFunction::Sum | AggregateFunction::Avg, Some(_)) => SqlType::Float,
    })
}
