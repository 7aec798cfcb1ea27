// lib/src/store/mod.rs

pub mod record_store;

pub use record_store::RecordStore;
