//! The archiving engine: paging, entity resolution, media capture and pacing.

pub mod admin_log;
pub mod entities;
pub mod history;
pub mod media;
pub mod rate;
#[cfg(test)]
pub mod testing;

pub use admin_log::AdminLogSync;
pub use history::HistorySync;
