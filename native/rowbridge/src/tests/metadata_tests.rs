//! Tests for column catalog resolution

#![allow(clippy::unwrap_used)]

use super::test_utils::{respond, sample_table, scripted_connection};
use crate::error::ErrorCode;
use crate::metadata::*;
use crate::value::{DecodedValue, ValueKind};

fn catalog() -> SchemaCatalog {
    SchemaCatalog::new().with_table(sample_table())
}

#[test]
fn test_count_star_descriptor() {
    let metadata = resolve(&[ProjectedExpr::count_star()], &catalog()).unwrap();
    assert_eq!(metadata.column_count(), 1);

    let column = metadata.column(1).unwrap();
    assert_eq!(column.label(), "count(*)");
    assert!(!column.is_searchable());
    assert_eq!(column.nullability(), Nullability::NoNulls);
    assert_eq!(column.sql_kind(), SqlKind::Integer);
    assert!(!column.is_signed());
    assert!(column.is_read_only());
}

#[test]
fn test_other_aggregates_are_nullable() {
    let projection = [
        ProjectedExpr::aggregate(AggregateFunction::Max, "t1", "f_int2"),
        ProjectedExpr::aggregate(AggregateFunction::Sum, "t1", "f_int2"),
        ProjectedExpr::aggregate(AggregateFunction::Avg, "t1", "f_decimal"),
    ];
    let metadata = resolve(&projection, &catalog()).unwrap();
    for column in metadata.columns() {
        assert_eq!(column.nullability(), Nullability::Nullable, "{}", column.label());
        assert!(!column.is_searchable());
        assert!(!column.is_writable());
    }
    assert_eq!(metadata.column(1).unwrap().sql_type(), &SqlType::Int);
    assert_eq!(metadata.column(2).unwrap().sql_type(), &SqlType::BigInt);
    assert_eq!(metadata.column(3).unwrap().scale(), 5);
}

#[test]
fn test_star_only_valid_for_count() {
    let projection = [ProjectedExpr::Aggregate {
        function: AggregateFunction::Sum,
        argument: AggregateArgument::Star,
        alias: None,
    }];
    let err = resolve(&projection, &catalog()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::BadArgument);
}

#[test]
fn test_aliased_primary_key() {
    let projection = [ProjectedExpr::column("t1", "f_int1").aliased("pk")];
    let metadata = resolve(&projection, &catalog()).unwrap();
    let column = metadata.column(1).unwrap();

    assert_eq!(column.label(), "pk");
    assert_eq!(column.name(), "pk");
    assert_eq!(column.table_name(), Some("t1"));
    assert_eq!(column.nullability(), Nullability::NoNulls);
    assert!(column.is_writable());
    assert!(!column.is_definitely_writable());
}

#[test]
fn test_aliased_column_not_found_by_original_name() {
    let (mut conn, script) = scripted_connection();
    let sql = "select f_int1 as pk from t1";
    respond(
        &script,
        sql,
        vec![ProjectedExpr::column("t1", "f_int1").aliased("pk")],
        vec![vec![DecodedValue::Integer(7)]],
    );

    let mut cursor = conn.query_direct(sql).unwrap();
    assert!(cursor.next().unwrap());
    assert_eq!(cursor.find_column("PK").unwrap(), 1);
    let err = cursor.find_column("f_int1").unwrap_err();
    assert_eq!(err.code(), ErrorCode::EntryNotFound);
}

#[test]
fn test_plain_columns() {
    let metadata = resolve(&[ProjectedExpr::all_columns("T1")], &catalog()).unwrap();
    assert_eq!(metadata.column_count(), sample_table().columns.len());

    let f_int2 = metadata.column(2).unwrap();
    assert_eq!(f_int2.nullability(), Nullability::Nullable);
    assert!(f_int2.is_definitely_writable());
    assert!(f_int2.is_searchable());
    assert!(f_int2.is_signed());
    assert_eq!(f_int2.class_tag(), "i32");

    let f_char8 = metadata.column(3).unwrap();
    assert_eq!(f_char8.nullability(), Nullability::NoNulls);
    assert_eq!(f_char8.display_size(), 8);
    assert_eq!(f_char8.type_name(), "char");

    let f_decimal = metadata.column(5).unwrap();
    assert_eq!(f_decimal.precision(), 10);
    assert_eq!(f_decimal.scale(), 5);
    assert_eq!(f_decimal.sql_kind(), SqlKind::Decimal);
    assert!(!f_decimal.is_currency());
}

#[test]
fn test_auto_generated_column_is_never_writable() {
    let metadata = resolve(&[ProjectedExpr::column("t1", "f_serial")], &catalog()).unwrap();
    let column = metadata.column(1).unwrap();
    assert!(column.is_auto_generated());
    assert!(!column.is_writable());
    assert!(!column.is_definitely_writable());
}

#[test]
fn test_row_id() {
    let metadata = resolve(&[ProjectedExpr::row_id("t1")], &catalog()).unwrap();
    let column = metadata.column(1).unwrap();
    assert_eq!(column.label(), "ROWID");
    assert_eq!(column.table_name(), Some("t1"));
    assert_eq!(column.nullability(), Nullability::NoNulls);
    assert!(column.is_auto_generated());
    assert!(column.is_searchable());
    assert!(column.is_read_only());
    assert_eq!(column.sql_kind(), SqlKind::Integer);
}

#[test]
fn test_derived_expression() {
    let projection = [ProjectedExpr::derived("f_int1 + 1", SqlType::Int).aliased("next")];
    let metadata = resolve(&projection, &catalog()).unwrap();
    let column = metadata.column(1).unwrap();
    assert_eq!(column.label(), "next");
    assert_eq!(column.table_name(), None);
    assert_eq!(column.nullability(), Nullability::Nullable);
    assert!(column.is_searchable());
    assert!(!column.is_writable());
}

#[test]
fn test_unknown_table_or_column() {
    let err = resolve(&[ProjectedExpr::column("t2", "x")], &catalog()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::EntryNotFound);
    let err = resolve(&[ProjectedExpr::column("t1", "missing")], &catalog()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::EntryNotFound);
}

#[test]
fn test_column_index_out_of_range() {
    let metadata = resolve(&[ProjectedExpr::count_star()], &catalog()).unwrap();
    assert_eq!(metadata.column(0).unwrap_err().code(), ErrorCode::BadArgument);
    assert_eq!(metadata.column(2).unwrap_err().code(), ErrorCode::BadArgument);
}

#[test]
fn test_writable_invariants_hold_for_every_descriptor() {
    let projection = [
        ProjectedExpr::all_columns("t1"),
        ProjectedExpr::row_id("t1"),
        ProjectedExpr::count_star(),
        ProjectedExpr::derived("1", SqlType::Int),
    ];
    let metadata = resolve(&projection, &catalog()).unwrap();
    for column in metadata.columns() {
        if column.is_definitely_writable() {
            assert!(column.is_writable(), "{}", column.label());
        }
        if column.is_writable() {
            assert!(!column.is_auto_generated(), "{}", column.label());
        }
        assert_eq!(column.is_read_only(), !column.is_writable());
    }
}

mod declared_types {
    use super::*;

    #[test]
    fn test_from_declared() {
        assert_eq!(SqlType::from_declared("INT"), SqlType::Int);
        assert_eq!(SqlType::from_declared("integer"), SqlType::BigInt);
        assert_eq!(
            SqlType::from_declared("decimal(10, 5)"),
            SqlType::Decimal {
                precision: 10,
                scale: 5
            }
        );
        assert_eq!(SqlType::from_declared("nvarchar(32)"), SqlType::NVarChar(32));
        assert_eq!(SqlType::from_declared("varchar"), SqlType::NText);
        assert_eq!(SqlType::from_declared("something odd"), SqlType::NText);
    }

    #[test]
    fn test_array_types() {
        let declared = SqlType::from_declared("nvarchar(32) array");
        assert_eq!(declared, SqlType::Array(Box::new(SqlType::NVarChar(32))));
        assert_eq!(declared.sql_kind(), SqlKind::ArrayOf(ValueKind::Text));
        assert_eq!(declared.type_name(), "nvarchar array");
        assert_eq!(declared.display_size(), 32);
    }

    #[test]
    fn test_unbounded_display_size() {
        assert_eq!(SqlType::NText.display_size(), i32::MAX);
        assert_eq!(SqlType::Blob.display_size(), i32::MAX);
    }
}
