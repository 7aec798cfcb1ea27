// lib/src/inbound/mod.rs

pub mod classifier;

pub use classifier::{classify, Decision, InboundEvent};
