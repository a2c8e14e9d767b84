//! Integration test modules for syncbeat

pub mod authority;
pub mod clock_sync;
pub mod end_to_end;
pub mod scheduler;
