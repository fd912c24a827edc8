//! Tests for the forward-only result cursor

#![allow(clippy::unwrap_used)]

use bytes::Bytes;
use chrono::FixedOffset;

use crate::coerce::{Coerced, CoercionMode, TargetKind};
use crate::cursor::ResultCursor;
use crate::error::{DriverError, ErrorCode, Result};
use crate::metadata::{resolve, ProjectedExpr, SchemaCatalog, SqlType};
use crate::models::{CursorConcurrency, CursorType, FetchDirection};
use crate::transport::{MaterializedRows, TupleStream};
use crate::value::DecodedValue;

fn cursor(columns: &[(&str, SqlType)], rows: Vec<Vec<DecodedValue>>) -> ResultCursor {
    let projection: Vec<ProjectedExpr> = columns
        .iter()
        .map(|(label, sql_type)| ProjectedExpr::derived(*label, sql_type.clone()))
        .collect();
    let metadata = resolve(&projection, &SchemaCatalog::new()).unwrap();
    ResultCursor::new(metadata, Box::new(MaterializedRows::new(rows)))
}

fn people() -> ResultCursor {
    cursor(
        &[("id", SqlType::Int), ("name", SqlType::NText), ("photo", SqlType::Blob)],
        vec![
            vec![1.into(), "alice".into(), DecodedValue::Binary(Bytes::from_static(b"\x89PNG"))],
            vec![2.into(), DecodedValue::Null, DecodedValue::Null],
            vec![3.into(), "carol".into(), DecodedValue::Null],
        ],
    )
}

mod positioning {
    use super::*;

    #[test]
    fn test_walks_forward_to_after_last() {
        let mut rs = people();
        assert!(rs.is_before_first().unwrap());
        assert_eq!(rs.row_number().unwrap(), 0);

        assert!(rs.next().unwrap());
        assert!(rs.is_first().unwrap());
        assert_eq!(rs.row_number().unwrap(), 1);

        assert!(rs.next().unwrap());
        assert!(!rs.is_first().unwrap());
        assert!(rs.next().unwrap());
        assert_eq!(rs.row_number().unwrap(), 3);

        assert!(!rs.next().unwrap());
        assert!(rs.is_after_last().unwrap());
        assert_eq!(rs.row_number().unwrap(), 0);
        // Stays exhausted
        assert!(!rs.next().unwrap());
    }

    #[test]
    fn test_is_last_peeks_without_losing_rows() {
        let mut rs = people();
        assert!(!rs.is_last().unwrap());
        assert!(rs.next().unwrap());
        assert!(!rs.is_last().unwrap());
        assert!(rs.next().unwrap());
        assert!(!rs.is_last().unwrap());
        assert!(rs.next().unwrap());
        assert!(rs.is_last().unwrap());
        assert_eq!(rs.get_string(2).unwrap(), "carol");
        assert!(!rs.next().unwrap());
    }

    #[test]
    fn test_empty_result() {
        let mut rs = cursor(&[("id", SqlType::Int)], vec![]);
        assert!(!rs.next().unwrap());
        assert!(rs.is_after_last().unwrap());
        assert!(!rs.is_before_first().unwrap());
    }

    #[test]
    fn test_scrolling_is_not_supported() {
        let mut rs = people();
        rs.next().unwrap();
        let results: Vec<Result<()>> = vec![
            rs.previous().map(drop),
            rs.first().map(drop),
            rs.last().map(drop),
            rs.absolute(1).map(drop),
            rs.relative(-1).map(drop),
            rs.before_first(),
            rs.after_last(),
        ];
        for result in results {
            assert_eq!(result.unwrap_err().code(), ErrorCode::NotSupported);
        }
        // Position is unchanged
        assert_eq!(rs.row_number().unwrap(), 1);
    }

    #[test]
    fn test_updates_are_not_supported() {
        let mut rs = people();
        rs.next().unwrap();
        assert_eq!(rs.insert_row().unwrap_err().code(), ErrorCode::NotSupported);
        assert_eq!(rs.update_row().unwrap_err().code(), ErrorCode::NotSupported);
        assert_eq!(rs.delete_row().unwrap_err().code(), ErrorCode::NotSupported);
        assert_eq!(rs.refresh_row().unwrap_err().code(), ErrorCode::NotSupported);
        assert_eq!(rs.move_to_insert_row().unwrap_err().code(), ErrorCode::NotSupported);
        assert_eq!(rs.cursor_type(), CursorType::ForwardOnly);
        assert_eq!(rs.concurrency(), CursorConcurrency::ReadOnly);
    }

    #[test]
    fn test_row_width_mismatch_is_transport_error() {
        let mut rs = cursor(&[("a", SqlType::Int), ("b", SqlType::Int)], vec![vec![1.into()]]);
        assert_eq!(rs.next().unwrap_err().code(), ErrorCode::Transport);
    }

    struct FailingStream;

    impl TupleStream for FailingStream {
        fn next_tuple(&mut self) -> Result<Option<Vec<DecodedValue>>> {
            Err(DriverError::Transport("connection reset".to_string()))
        }
    }

    #[test]
    fn test_stream_failure_surfaces_from_next() {
        let metadata = resolve(&[ProjectedExpr::derived("a", SqlType::Int)], &SchemaCatalog::new()).unwrap();
        let mut rs = ResultCursor::new(metadata, Box::new(FailingStream));
        assert_eq!(rs.next().unwrap_err().code(), ErrorCode::Transport);
    }
}

mod reading {
    use super::*;

    #[test]
    fn test_reads_by_index_and_label() {
        let mut rs = people();
        rs.next().unwrap();
        assert_eq!(rs.get_int(1).unwrap(), 1);
        assert_eq!(rs.get_string("NAME").unwrap(), "alice");
        assert_eq!(rs.get_bytes("photo").unwrap(), Bytes::from_static(b"\x89PNG"));
        assert_eq!(rs.get(1, TargetKind::Long).unwrap(), Coerced::Long(1));
        assert_eq!(rs.get_object("id").unwrap(), DecodedValue::Integer(1));
    }

    #[test]
    fn test_was_null_tracks_last_read() {
        let mut rs = people();
        rs.next().unwrap();
        assert!(!rs.was_null().unwrap());
        rs.next().unwrap();
        assert!(!rs.was_null().unwrap());

        assert_eq!(rs.get_string(2).unwrap(), "");
        assert!(rs.was_null().unwrap());
        assert_eq!(rs.get_long(1).unwrap(), 2);
        assert!(!rs.was_null().unwrap());
        assert!(rs.get_bytes(3).unwrap().is_empty());
        assert!(rs.was_null().unwrap());

        // Moving resets the flag
        rs.next().unwrap();
        assert!(!rs.was_null().unwrap());
    }

    #[test]
    fn test_read_off_row_is_invalid_state() {
        let mut rs = people();
        assert_eq!(rs.get_int(1).unwrap_err().code(), ErrorCode::InvalidCursorState);
        while rs.next().unwrap() {}
        assert_eq!(rs.get_int(1).unwrap_err().code(), ErrorCode::InvalidCursorState);
    }

    #[test]
    fn test_bad_index() {
        let mut rs = people();
        rs.next().unwrap();
        assert_eq!(rs.get_int(0).unwrap_err().code(), ErrorCode::BadArgument);
        assert_eq!(rs.get_int(4).unwrap_err().code(), ErrorCode::BadArgument);
        assert_eq!(rs.get_int(-1).unwrap_err().code(), ErrorCode::BadArgument);
    }

    #[test]
    fn test_label_lookup_rules() {
        let mut rs = cursor(
            &[("dup", SqlType::Int), ("DUP", SqlType::NText)],
            vec![vec![5.into(), "five".into()]],
        );
        let err = rs.find_column("dup").unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotSupported);

        rs.next().unwrap();
        assert_eq!(rs.find_column("Dup").unwrap(), 1);
        assert_eq!(rs.get_int("dup").unwrap(), 5);
        let err = rs.find_column("missing").unwrap_err();
        assert!(matches!(err, DriverError::EntryNotFound(name) if name == "missing"));
    }

    #[test]
    fn test_strict_mode_applies_to_getters() {
        let mut rs = cursor(&[("n", SqlType::BigInt)], vec![vec![DecodedValue::Integer(1000)]]);
        rs.next().unwrap();
        assert_eq!(rs.get_byte(1).unwrap(), -24);
        rs.set_coercion_mode(CoercionMode::Strict);
        assert_eq!(rs.get_byte(1).unwrap_err().code(), ErrorCode::NumericOverflow);
        assert_eq!(rs.get_short(1).unwrap(), 1000);
    }

    #[test]
    fn test_scaled_decimal() {
        let mut rs = cursor(&[("d", SqlType::NText)], vec![vec!["99999.99999".into()]]);
        rs.next().unwrap();
        assert_eq!(rs.get_decimal_scaled(1, 2).unwrap().to_string(), "100000.00");
        assert_eq!(rs.get_decimal(1).unwrap().scale(), 5);
    }

    #[test]
    fn test_zone_qualified_reads_not_supported() {
        let mut rs = cursor(&[("t", SqlType::DateTime)], vec![vec!["2024-01-01 00:00:00".into()]]);
        rs.next().unwrap();
        let zone = FixedOffset::east_opt(3600).unwrap();
        assert_eq!(rs.get_date_in_zone(1, zone).unwrap_err().code(), ErrorCode::NotSupported);
        assert_eq!(rs.get_time_in_zone(1, zone).unwrap_err().code(), ErrorCode::NotSupported);
        assert_eq!(
            rs.get_timestamp_in_zone(1, zone).unwrap_err().code(),
            ErrorCode::NotSupported
        );
        assert_eq!(rs.get_timestamp(1).unwrap().to_string(), "2024-01-01 00:00:00");
    }

    #[test]
    fn test_array_column() {
        let array = DecodedValue::array(vec![1.into(), 2.into()]).unwrap();
        let mut rs = cursor(&[("a", SqlType::from_declared("int array"))], vec![vec![array]]);
        rs.next().unwrap();
        let elements = rs.get_array(1).unwrap();
        assert_eq!(elements.len(), 2);
        let mut nested = elements.into_cursor();
        assert!(nested.next().unwrap());
        assert_eq!(nested.get_int("VALUE").unwrap(), 1);
    }
}

mod hints_and_warnings {
    use super::*;

    #[test]
    fn test_fetch_hints_leave_warnings_in_order() {
        let mut rs = people();
        rs.set_fetch_direction(FetchDirection::Forward).unwrap();
        assert!(rs.warnings().is_empty());

        rs.set_fetch_direction(FetchDirection::Reverse).unwrap();
        rs.set_fetch_size(50).unwrap();
        rs.set_fetch_size(0).unwrap();
        assert_eq!(rs.warnings().len(), 2);
        assert_eq!(rs.fetch_direction(), FetchDirection::Forward);
        assert_eq!(rs.fetch_size(), 0);

        let reasons: Vec<&str> = rs.warnings().iter().map(|w| w.reason()).collect();
        assert!(reasons[0].contains("Reverse"));
        assert!(reasons[1].contains("50"));
        assert_eq!(rs.warnings().first().unwrap().sql_state(), "01000");

        rs.clear_warnings();
        assert!(rs.warnings().is_empty());
    }
}

mod closing {
    use super::*;

    #[test]
    fn test_closed_cursor_rejects_everything() {
        let mut rs = people();
        rs.next().unwrap();
        rs.close();
        assert!(rs.is_closed());
        assert_eq!(rs.next().unwrap_err().code(), ErrorCode::Closed);
        assert_eq!(rs.get_int(1).unwrap_err().code(), ErrorCode::Closed);
        assert_eq!(rs.row_number().unwrap_err().code(), ErrorCode::Closed);
        assert_eq!(rs.set_fetch_size(1).unwrap_err().code(), ErrorCode::Closed);
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut rs = people();
        rs.set_fetch_size(10).unwrap();
        rs.close();
        rs.close();
        assert!(rs.is_closed());
        assert!(rs.warnings().is_empty());
    }
}
