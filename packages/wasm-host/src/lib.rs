#![doc = include_str!("../README.md")]
#![deny(clippy::nursery, clippy::pedantic, missing_docs)]
#![warn(unused_crate_dependencies)]

pub mod capability;
pub mod channel;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod gas;
pub mod ibc;
pub mod keeper;
pub mod msg;
pub mod port;
pub mod store;
pub mod types;
pub mod vm;

pub use context::Context;
pub use error::{HostError, VmError};
pub use keeper::{Keeper, KeeperBuilder};

#[cfg(test)]
use cw_ibc_host_test_utils as _;
