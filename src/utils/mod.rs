pub mod cache;
pub mod units;
