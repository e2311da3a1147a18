//! Wire types shared by the Rentchain services, plus optional HTTP clients.
//!
//! Every object in [`objects`] is a plain serde struct. Decoding never rejects
//! unknown fields so that older consumers keep working when a producer adds one.

pub mod objects;

#[cfg(feature = "client")]
pub mod client;
