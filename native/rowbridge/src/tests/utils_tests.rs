//! Tests for utils.rs - statement routing, hex rendering and lock helpers

#![allow(clippy::unwrap_used)]

use std::sync::{Arc, Mutex};
use std::thread;

use crate::error::ErrorCode;
use crate::utils::{hex, lock_ignoring_poison, safe_lock, should_use_query};

mod should_use_query_tests {
    use super::*;

    #[test]
    fn test_row_returning_keywords() {
        assert!(should_use_query("SELECT * FROM t1"));
        assert!(should_use_query("select 1"));
        assert!(should_use_query("  \n\tSeLeCt 1"));
        assert!(should_use_query("WITH x AS (SELECT 1) SELECT * FROM x"));
        assert!(should_use_query("VALUES (1), (2)"));
        assert!(should_use_query("PRAGMA table_info(t1)"));
        assert!(should_use_query("SELECT(1)"));
    }

    #[test]
    fn test_xa_recover() {
        assert!(should_use_query("XA RECOVER"));
        assert!(should_use_query("xa   recover"));
        assert!(!should_use_query("XA START X'01',X''"));
        assert!(!should_use_query("XA COMMIT X'01',X'' ONE PHASE"));
        assert!(!should_use_query("XA RECOVERED"));
    }

    #[test]
    fn test_returning_clause() {
        assert!(should_use_query("INSERT INTO t1 (f_int1) VALUES (1) RETURNING f_int1"));
        assert!(should_use_query("UPDATE t1 SET f_int2 = 2\nreturning *"));
        assert!(should_use_query("DELETE FROM t1 RETURNING(f_int1)"));
        assert!(!should_use_query("INSERT INTO returning_log VALUES (1)"));
    }

    #[test]
    fn test_statements_without_rows() {
        assert!(!should_use_query("INSERT INTO t1 VALUES (1)"));
        assert!(!should_use_query("UPDATE t1 SET f_int2 = 0"));
        assert!(!should_use_query("CREATE TABLE selected (id INT)"));
        assert!(!should_use_query("SELECTED"));
        assert!(!should_use_query(""));
        assert!(!should_use_query("   \n"));
    }
}

mod hex_tests {
    use super::*;

    #[test]
    fn test_upper_case_pairs() {
        assert_eq!(hex(b""), "");
        assert_eq!(hex(&[0x00, 0x0f, 0xab, 0xff]), "000FABFF");
        assert_eq!(hex(b"gtrid"), "6774726964");
    }
}

mod locking {
    use super::*;

    fn poisoned() -> Arc<Mutex<u32>> {
        let mutex = Arc::new(Mutex::new(7));
        let shared = Arc::clone(&mutex);
        let _ = thread::spawn(move || {
            let _guard = shared.lock().unwrap();
            panic!("poison the mutex");
        })
        .join();
        mutex
    }

    #[test]
    fn test_safe_lock_healthy() {
        let mutex = Mutex::new(1);
        *safe_lock(&mutex, "test").unwrap() += 1;
        assert_eq!(*safe_lock(&mutex, "test").unwrap(), 2);
    }

    #[test]
    fn test_poisoned_lock_is_internal_error() {
        let mutex = poisoned();
        let err = safe_lock(&mutex, "pool state").unwrap_err();
        assert_eq!(err.code(), ErrorCode::Internal);
        assert!(err.to_string().contains("pool state"));
    }

    #[test]
    fn test_lock_ignoring_poison_recovers_value() {
        let mutex = poisoned();
        assert_eq!(*lock_ignoring_poison(&mutex), 7);
    }
}
