//! Attendance computations: where an employee is, which shift they are on,
//! how long they worked, and closing the records they forgot about.
//!
//! Everything in here is synchronous and free of I/O. Callers load the
//! reference data and records, call in, and persist what comes back.

pub mod checkin;
pub mod correction;
pub mod error;
pub mod geofence;
pub mod hours;
pub mod policy;
pub mod shift_matcher;
pub mod sweep;

pub use error::AttendanceError;
pub use policy::AttendancePolicy;
