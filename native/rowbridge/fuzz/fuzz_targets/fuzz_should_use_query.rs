#![no_main]
//! Fuzz test for statement routing
//!
//! `should_use_query` sees every SQL string the caller sends, so it must accept
//! any input without panicking. The structured half splices arbitrary text
//! around the keywords that force row-returning routing.

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use rowbridge::should_use_query;

#[derive(Debug, Arbitrary)]
enum Routed<'a> {
    Raw(&'a [u8]),
    /// `XA RECOVER` at the start, after leading whitespace.
    Recover { padding: u8, rest: &'a str },
    /// A DML statement with a `RETURNING` clause.
    Returning { verb: u8, target: &'a str, columns: &'a str },
}

fuzz_target!(|input: Routed<'_>| match input {
    Routed::Raw(data) => {
        if let Ok(sql) = std::str::from_utf8(data) {
            let _ = should_use_query(sql);
        }
    }
    Routed::Recover { padding, rest } => {
        let sql = format!("{}xa recover {rest}", " ".repeat(usize::from(padding % 8)));
        assert!(should_use_query(&sql), "XA RECOVER must route to query: {sql:?}");
    }
    Routed::Returning { verb, target, columns } => {
        let verb = ["INSERT INTO", "UPDATE", "DELETE FROM"][usize::from(verb % 3)];
        let sql = format!("{verb} {target} RETURNING {columns}");
        assert!(should_use_query(&sql), "RETURNING must route to query: {sql:?}");
    }
});
