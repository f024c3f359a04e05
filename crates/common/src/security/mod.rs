//! Input gates and abuse controls
//!
//! Validators run before any process is spawned or any URL is fetched.

pub mod command;
pub mod rate_limit;
pub mod url;
