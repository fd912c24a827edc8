//! Unit and integration tests for rowbridge
//!
//! Tests are grouped by the library module they exercise. Most run against the
//! scripted transport in `test_utils`; `integration_tests` opens real local
//! libsql databases.


mod cursor_tests;
mod metadata_tests;
mod pool_tests;
mod utils_tests;
