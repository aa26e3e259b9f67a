//! SeaORM row shapes (spec.md §3). These are intentionally separate from
//! `crate::domain`: the domain types are what the rest of the crate programs against,
//! these are what SQLite stores, and `From` impls bridge the two at the store boundary.

pub mod asset;
pub mod caption;
pub mod embedding;
pub mod face_detection;
pub mod person;
pub mod task;
