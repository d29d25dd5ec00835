//! The interface to the bytecode interpreter.
//!
//! The host never runs contract code itself. It hands the interpreter the
//! checksum of the code, the environment, the contract's prefixed store and a
//! gas limit in VM units, and gets back a result plus the VM gas used.

use std::fmt;

use cosmwasm_std::{Binary, IbcAcknowledgement, IbcChannel, IbcPacket};
use serde::{Deserialize, Serialize};

use crate::{
    error::VmError,
    msg::{ChannelOpenResponse, PacketReceiveResponse, Reply, Response},
    store::KvStore,
    types::{Checksum, Env, MessageInfo},
};

/// The contract entry points the host calls.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryPoint {
    /// `instantiate`
    Instantiate,
    /// `execute`
    Execute,
    /// `query`
    Query,
    /// `reply`
    Reply,
    /// `ibc_channel_open`
    IbcChannelOpen,
    /// `ibc_channel_connect`
    IbcChannelConnect,
    /// `ibc_channel_close`
    IbcChannelClose,
    /// `ibc_packet_receive`
    IbcPacketReceive,
    /// `ibc_packet_ack`
    IbcPacketAck,
    /// `ibc_packet_timeout`
    IbcPacketTimeout,
}

impl EntryPoint {
    /// The exported function name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Instantiate => "instantiate",
            Self::Execute => "execute",
            Self::Query => "query",
            Self::Reply => "reply",
            Self::IbcChannelOpen => "ibc_channel_open",
            Self::IbcChannelConnect => "ibc_channel_connect",
            Self::IbcChannelClose => "ibc_channel_close",
            Self::IbcPacketReceive => "ibc_packet_receive",
            Self::IbcPacketAck => "ibc_packet_ack",
            Self::IbcPacketTimeout => "ibc_packet_timeout",
        }
    }
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The result of one VM call plus the VM gas it used.
///
/// Gas is reported for failed calls too; the host charges it either way.
#[derive(Debug)]
pub struct VmOutput<T> {
    /// The entry point result
    pub result: Result<T, VmError>,
    /// VM gas consumed by the call
    pub gas_used: u64,
}

impl<T> VmOutput<T> {
    /// A successful call.
    #[must_use]
    pub const fn ok(value: T, gas_used: u64) -> Self {
        Self {
            result: Ok(value),
            gas_used,
        }
    }

    /// A failed call.
    #[must_use]
    pub const fn err(err: VmError, gas_used: u64) -> Self {
        Self {
            result: Err(err),
            gas_used,
        }
    }
}

/// What the VM reports after accepting new code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CodeAnalysis {
    /// The checksum the code is stored under
    pub checksum: Checksum,
    /// Whether the code exports the IBC entry points
    pub has_ibc_entry_points: bool,
}

/// Everything the VM needs to run one entry point of one contract instance.
pub struct Instance<'a> {
    /// The code to run
    pub checksum: &'a Checksum,
    /// The environment the contract sees
    pub env: &'a Env,
    /// The contract's own storage partition
    pub store: &'a mut dyn KvStore,
    /// Gas limit in VM units
    pub gas_limit: u64,
}

/// An acknowledged packet together with the packet it acknowledges.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketAck {
    /// The acknowledgement written by the counterparty
    pub acknowledgement: IbcAcknowledgement,
    /// The packet this contract sent
    pub original_packet: IbcPacket,
}

/// The bytecode interpreter.
pub trait WasmEngine {
    /// Compile and store code.
    /// # Errors
    /// Returns an error if the code is rejected.
    fn store_code(&self, code: &[u8]) -> Result<CodeAnalysis, VmError>;

    /// Call `instantiate`.
    fn instantiate(&self, instance: Instance<'_>, info: &MessageInfo, msg: &[u8])
        -> VmOutput<Response>;

    /// Call `execute`.
    fn execute(&self, instance: Instance<'_>, info: &MessageInfo, msg: &[u8])
        -> VmOutput<Response>;

    /// Call `query`. The store must not be written to.
    fn query(&self, instance: Instance<'_>, msg: &[u8]) -> VmOutput<Binary>;

    /// Call `reply`.
    fn reply(&self, instance: Instance<'_>, reply: &Reply) -> VmOutput<Response>;

    /// Call `ibc_channel_open`.
    fn ibc_channel_open(
        &self,
        instance: Instance<'_>,
        channel: &IbcChannel,
    ) -> VmOutput<ChannelOpenResponse>;

    /// Call `ibc_channel_connect`.
    fn ibc_channel_connect(&self, instance: Instance<'_>, channel: &IbcChannel)
        -> VmOutput<Response>;

    /// Call `ibc_channel_close`.
    fn ibc_channel_close(&self, instance: Instance<'_>, channel: &IbcChannel) -> VmOutput<Response>;

    /// Call `ibc_packet_receive`.
    fn ibc_packet_receive(
        &self,
        instance: Instance<'_>,
        packet: &IbcPacket,
    ) -> VmOutput<PacketReceiveResponse>;

    /// Call `ibc_packet_ack`.
    fn ibc_packet_ack(&self, instance: Instance<'_>, ack: &PacketAck) -> VmOutput<Response>;

    /// Call `ibc_packet_timeout`.
    fn ibc_packet_timeout(&self, instance: Instance<'_>, packet: &IbcPacket) -> VmOutput<Response>;
}
