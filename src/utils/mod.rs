pub mod clock;
pub mod location_cache;
pub mod timestamp;
