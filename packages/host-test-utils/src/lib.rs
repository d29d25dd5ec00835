#![doc = include_str!("../README.md")]
#![deny(clippy::nursery, clippy::pedantic, missing_docs)]
#![warn(unused_crate_dependencies)]

pub mod bank;
pub mod chain;
pub mod contracts;
pub mod coordinator;
pub mod engine;
pub mod ibc_core;
pub mod logging;
pub mod store;

