#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

pub mod calendar;
pub mod config;
pub mod entities;
pub mod events;
pub mod framework;
pub mod processors;
pub mod reservation;
pub mod utils;
pub mod verification;
