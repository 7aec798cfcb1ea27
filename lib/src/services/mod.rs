// lib/src/services/mod.rs

pub mod calendar;
pub mod cards;
pub mod gateway;

pub use cards::{CardProvider, OpenRouterCards};
pub use gateway::{MessageGateway, SendOutcome, WhatsAppGateway};
