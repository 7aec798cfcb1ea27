// lib/src/lib.rs
//! Core library for the clinic WhatsApp health bot: field-level encryption
//! with a blind index for equality lookup, the sled record store, boundary
//! adapters for the delivery gateway and text provider, and the inbound
//! message classifier.

pub mod config;
pub mod crypto;
pub mod inbound;
pub mod services;
pub mod store;

pub use config::Config;
pub use crypto::FieldCipher;
pub use store::RecordStore;
