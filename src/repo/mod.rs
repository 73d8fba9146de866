//! MySQL access for attendance data. Queries are checked at runtime so the
//! crate builds without a live database.

pub mod attendance;
pub mod employee;
pub mod location;

/// `?, ?, ?` for an `IN (...)` list of `n` values.
pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}
