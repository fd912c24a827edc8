//! Tests for connection pooling and the pool registry

#![allow(clippy::unwrap_used)]

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use super::test_utils::{Script, ScriptedDialer, SharedScript};
use crate::decode::decode_options;
use crate::error::ErrorCode;
use crate::models::{Credentials, Endpoint, PoolConfig, PoolKey};
use crate::pool::{ConnectionPool, PoolRegistry};

fn pool(capacity: usize, timeout: Duration) -> (Arc<ConnectionPool>, SharedScript) {
    let script = Script::shared();
    let key = PoolKey::new(Endpoint::local("pool.db"), Credentials::anonymous());
    let pool = ConnectionPool::new(key, PoolConfig::new(capacity, timeout), ScriptedDialer::new(script.clone()));
    (pool, script)
}

/// Poll until `condition` holds, failing the test after two seconds.
fn wait_until(condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn test_capacity_is_clamped() {
    assert_eq!(PoolConfig::new(0, Duration::ZERO).capacity(), 1);
    assert_eq!(PoolConfig::new(1000, Duration::ZERO).capacity(), 100);
    assert_eq!(PoolConfig::default().capacity(), 20);
    assert_eq!(PoolConfig::default().admission_timeout, Duration::from_secs(30));
}

#[test]
fn test_exhaustion_timeout_and_handoff() {
    let (pool, _script) = pool(5, Duration::from_millis(100));

    let mut held: Vec<_> = (0..5).map(|_| pool.acquire().unwrap()).collect();
    let mut sessions: Vec<String> = held.iter().map(|c| c.session_id().to_string()).collect();
    sessions.sort();
    sessions.dedup();
    assert_eq!(sessions.len(), 5);
    assert_eq!(pool.size(), 5);
    assert_eq!(pool.in_use_count(), 5);

    let started = Instant::now();
    let err = pool.acquire().unwrap_err();
    assert_eq!(err.code(), ErrorCode::LockTimeout);
    assert!(started.elapsed() >= Duration::from_millis(100));
    assert_eq!(pool.waiting_count(), 0);

    let waiter = {
        let pool = Arc::clone(&pool);
        thread::spawn(move || {
            pool.acquire_timeout(Duration::from_secs(5))
                .map(|conn| conn.session_id().to_string())
        })
    };
    wait_until(|| pool.waiting_count() == 1);

    let released = held.pop().unwrap();
    let released_session = released.session_id().to_string();
    released.release();

    assert_eq!(waiter.join().unwrap().unwrap(), released_session);
    assert_eq!(pool.size(), 5);
}

#[test]
fn test_unbounded_timeout_waits_without_deadline() {
    let (pool, _script) = pool(1, Duration::MAX);
    let held = pool.acquire_timeout(Duration::MAX).unwrap();

    let waiter = {
        let pool = Arc::clone(&pool);
        thread::spawn(move || pool.acquire().map(|conn| conn.session_id().to_string()))
    };
    wait_until(|| pool.waiting_count() == 1);

    let session = held.session_id().to_string();
    held.release();
    assert_eq!(waiter.join().unwrap().unwrap(), session);
}

#[test]
fn test_huge_keyword_timeout_is_usable() {
    let options = decode_options([("database", "pool.db"), ("timeout_ms", "18446744073709551615")]).unwrap();
    let registry = PoolRegistry::new(PoolConfig::default(), ScriptedDialer::new(Script::shared()));
    let conn = registry.acquire_with_options(&options).unwrap();
    assert!(!conn.is_closed());
}

#[test]
fn test_waiters_are_served_in_arrival_order() {
    let (pool, _script) = pool(1, Duration::from_secs(5));
    let held = pool.acquire().unwrap();
    let (tx, rx) = mpsc::channel();

    let mut handles = Vec::new();
    for (position, name) in ["first", "second", "third"].into_iter().enumerate() {
        let shared = Arc::clone(&pool);
        let tx = tx.clone();
        handles.push(thread::spawn(move || {
            let conn = shared.acquire().unwrap();
            tx.send(name).unwrap();
            thread::sleep(Duration::from_millis(10));
            drop(conn);
        }));
        wait_until(|| pool.waiting_count() == position + 1);
    }

    drop(held);
    let order: Vec<&str> = (0..3).map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap()).collect();
    assert_eq!(order, vec!["first", "second", "third"]);
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(pool.size(), 1);
}

#[test]
fn test_released_connection_is_reused_with_session() {
    let (pool, script) = pool(2, Duration::from_secs(1));
    let conn = pool.acquire().unwrap();
    let session = conn.session_id().to_string();
    drop(conn);
    assert_eq!(pool.idle_count(), 1);

    let again = pool.acquire().unwrap();
    assert_eq!(again.session_id(), session);
    assert_eq!(script.lock().unwrap().dials, 1);
    assert!(script.lock().unwrap().closed_sessions.is_empty());
}

#[test]
fn test_release_resets_connection_state() {
    let (pool, _script) = pool(1, Duration::from_secs(1));
    let mut conn = pool.acquire().unwrap();
    conn.set_read_only(true).unwrap();
    let stmt = conn.create_statement().unwrap();
    conn.release();

    let mut conn = pool.acquire().unwrap();
    assert!(!conn.is_read_only());
    assert_eq!(
        conn.execute_query(&stmt, "SELECT 1").unwrap_err().code(),
        ErrorCode::EntryNotFound
    );
}

#[test]
fn test_failed_dial_frees_its_slot() {
    let (pool, script) = pool(1, Duration::from_millis(50));
    script.lock().unwrap().failing_dials = 1;

    let err = pool.acquire().unwrap_err();
    assert_eq!(err.code(), ErrorCode::Connection);
    assert_eq!(pool.size(), 0);

    let conn = pool.acquire().unwrap();
    assert!(!conn.is_closed());
    assert_eq!(script.lock().unwrap().dials, 2);
}

#[test]
fn test_closed_connection_leaves_pool() {
    let (pool, script) = pool(1, Duration::from_secs(1));
    let mut conn = pool.acquire().unwrap();
    conn.close().unwrap();
    drop(conn);
    assert_eq!(pool.size(), 0);
    assert_eq!(pool.idle_count(), 0);

    let _fresh = pool.acquire().unwrap();
    assert_eq!(script.lock().unwrap().dials, 2);
}

#[test]
fn test_dispose_fails_waiters_and_closes_lent_members_on_return() {
    let (pool, script) = pool(1, Duration::from_secs(5));
    let lent = pool.acquire().unwrap();

    let waiter = {
        let pool = Arc::clone(&pool);
        thread::spawn(move || pool.acquire().map(drop))
    };
    wait_until(|| pool.waiting_count() == 1);

    pool.dispose();
    pool.dispose();
    assert!(pool.is_disposed());
    assert_eq!(waiter.join().unwrap().unwrap_err().code(), ErrorCode::Closed);
    assert_eq!(pool.acquire().unwrap_err().code(), ErrorCode::Closed);

    let session = lent.session_id().to_string();
    drop(lent);
    assert_eq!(pool.size(), 0);
    assert!(script.lock().unwrap().closed_sessions.contains(&session));
}

#[test]
fn test_dispose_closes_idle_members() {
    let (pool, script) = pool(2, Duration::from_secs(1));
    let first = pool.acquire().unwrap();
    let second = pool.acquire().unwrap();
    let sessions = [first.session_id().to_string(), second.session_id().to_string()];
    drop(first);
    drop(second);
    assert_eq!(pool.idle_count(), 2);

    pool.dispose();
    assert_eq!(pool.size(), 0);
    let script = script.lock().unwrap();
    for session in &sessions {
        assert!(script.closed_sessions.contains(session));
    }
}

#[test]
fn test_connection_outliving_pool_is_closed() {
    let (pool, script) = pool(1, Duration::from_secs(1));
    let conn = pool.acquire().unwrap();
    let session = conn.session_id().to_string();
    drop(pool);
    drop(conn);
    assert!(script.lock().unwrap().closed_sessions.contains(&session));
}

mod registry {
    use super::*;

    fn registry() -> (PoolRegistry, SharedScript) {
        let script = Script::shared();
        let registry = PoolRegistry::new(
            PoolConfig::new(3, Duration::from_millis(50)),
            ScriptedDialer::new(script.clone()),
        );
        (registry, script)
    }

    #[test]
    fn test_one_pool_per_key() {
        let (registry, _script) = registry();
        let endpoint = Endpoint::remote("libsql://db.example");
        let alice = Credentials::token("a").with_user("alice");
        let bob = Credentials::token("b").with_user("bob");

        let first = registry.pool(&endpoint, &alice).unwrap();
        let again = registry.pool(&endpoint, &alice).unwrap();
        let other = registry.pool(&endpoint, &bob).unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(registry.len(), 2);
        assert_eq!(first.config().capacity(), 3);
    }

    #[test]
    fn test_acquire_with_options_uses_their_pool_config() {
        let (registry, _script) = registry();
        let options = decode_options([("database", "opts.db"), ("pool_size", "1"), ("timeout_ms", "20")]).unwrap();

        let held = registry.acquire_with_options(&options).unwrap();
        let err = registry.acquire_with_options(&options).unwrap_err();
        assert_eq!(err.code(), ErrorCode::LockTimeout);
        drop(held);

        let key = PoolKey::new(options.endpoint().unwrap(), options.credentials());
        let pool = registry.get(&key).unwrap();
        assert_eq!(pool.config().capacity(), 1);
        assert_eq!(pool.idle_count(), 1);
    }

    #[test]
    fn test_dispose_by_key() {
        let (registry, script) = registry();
        let endpoint = Endpoint::local("reg.db");
        let creds = Credentials::anonymous();
        let conn = registry.acquire(&endpoint, &creds).unwrap();
        let session = conn.session_id().to_string();
        drop(conn);

        let key = PoolKey::new(endpoint.clone(), creds.clone());
        assert!(registry.dispose(&key));
        assert!(!registry.dispose(&key));
        assert!(registry.is_empty());
        assert!(script.lock().unwrap().closed_sessions.contains(&session));

        // A later acquire starts a fresh pool
        let _conn = registry.acquire(&endpoint, &creds).unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_dropping_registry_disposes_pools() {
        let (registry, script) = registry();
        let conn = registry.acquire(&Endpoint::local("drop.db"), &Credentials::anonymous()).unwrap();
        let session = conn.session_id().to_string();
        drop(conn);
        drop(registry);
        assert!(script.lock().unwrap().closed_sessions.contains(&session));
    }
}
