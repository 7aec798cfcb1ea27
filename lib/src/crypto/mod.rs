// lib/src/crypto/mod.rs

pub mod blind_index;
pub mod codec;

pub use codec::FieldCipher;
