//! A [`WasmEngine`] that runs Rust implementations of contracts.

use std::collections::HashMap;

use cosmwasm_std::{Binary, IbcChannel, IbcPacket};
use cw_ibc_host::{
    msg::{ChannelOpenResponse, PacketReceiveResponse, Reply, Response},
    store::KvStore,
    types::{Checksum, Env, MessageInfo},
    vm::{CodeAnalysis, EntryPoint, Instance, PacketAck, VmOutput, WasmEngine},
    VmError,
};

/// VM gas a mock contract burns per call unless it says otherwise.
pub const DEFAULT_VM_GAS_PER_CALL: u64 = 1_000_000;

/// A contract implemented in Rust. Entry points that are not overridden are
/// reported as not exported.
#[allow(unused_variables)]
pub trait MockContract {
    /// Whether the contract exports the IBC entry points.
    fn has_ibc_entry_points(&self) -> bool {
        false
    }

    /// VM gas burned by every call.
    fn gas_per_call(&self) -> u64 {
        DEFAULT_VM_GAS_PER_CALL
    }

    /// `instantiate`
    /// # Errors
    /// Any contract failure.
    fn instantiate(
        &self,
        store: &mut dyn KvStore,
        env: &Env,
        info: &MessageInfo,
        msg: &[u8],
    ) -> Result<Response, VmError> {
        Ok(Response::new())
    }

    /// `execute`
    /// # Errors
    /// Any contract failure.
    fn execute(
        &self,
        store: &mut dyn KvStore,
        env: &Env,
        info: &MessageInfo,
        msg: &[u8],
    ) -> Result<Response, VmError> {
        Err(VmError::Unsupported(EntryPoint::Execute))
    }

    /// `query`
    /// # Errors
    /// Any contract failure.
    fn query(&self, store: &dyn KvStore, env: &Env, msg: &[u8]) -> Result<Binary, VmError> {
        Err(VmError::Unsupported(EntryPoint::Query))
    }

    /// `reply`
    /// # Errors
    /// Any contract failure.
    fn reply(&self, store: &mut dyn KvStore, env: &Env, reply: &Reply) -> Result<Response, VmError> {
        Err(VmError::Unsupported(EntryPoint::Reply))
    }

    /// `ibc_channel_open`
    /// # Errors
    /// Any contract failure.
    fn ibc_channel_open(
        &self,
        store: &mut dyn KvStore,
        env: &Env,
        channel: &IbcChannel,
    ) -> Result<ChannelOpenResponse, VmError> {
        Err(VmError::Unsupported(EntryPoint::IbcChannelOpen))
    }

    /// `ibc_channel_connect`
    /// # Errors
    /// Any contract failure.
    fn ibc_channel_connect(
        &self,
        store: &mut dyn KvStore,
        env: &Env,
        channel: &IbcChannel,
    ) -> Result<Response, VmError> {
        Err(VmError::Unsupported(EntryPoint::IbcChannelConnect))
    }

    /// `ibc_channel_close`
    /// # Errors
    /// Any contract failure.
    fn ibc_channel_close(
        &self,
        store: &mut dyn KvStore,
        env: &Env,
        channel: &IbcChannel,
    ) -> Result<Response, VmError> {
        Err(VmError::Unsupported(EntryPoint::IbcChannelClose))
    }

    /// `ibc_packet_receive`
    /// # Errors
    /// Any contract failure.
    fn ibc_packet_receive(
        &self,
        store: &mut dyn KvStore,
        env: &Env,
        packet: &IbcPacket,
    ) -> Result<PacketReceiveResponse, VmError> {
        Err(VmError::Unsupported(EntryPoint::IbcPacketReceive))
    }

    /// `ibc_packet_ack`
    /// # Errors
    /// Any contract failure.
    fn ibc_packet_ack(
        &self,
        store: &mut dyn KvStore,
        env: &Env,
        ack: &PacketAck,
    ) -> Result<Response, VmError> {
        Err(VmError::Unsupported(EntryPoint::IbcPacketAck))
    }

    /// `ibc_packet_timeout`
    /// # Errors
    /// Any contract failure.
    fn ibc_packet_timeout(
        &self,
        store: &mut dyn KvStore,
        env: &Env,
        packet: &IbcPacket,
    ) -> Result<Response, VmError> {
        Err(VmError::Unsupported(EntryPoint::IbcPacketTimeout))
    }
}

/// Runs registered [`MockContract`]s in place of compiled code.
///
/// Code bytes are only used to tell contracts apart: storing code that was
/// registered returns the checksum of the bytes, anything else is rejected.
#[derive(Default)]
pub struct MockEngine {
    contracts: HashMap<Checksum, Box<dyn MockContract>>,
}

impl MockEngine {
    /// Create an engine without contracts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `contract` as the implementation of `code`.
    #[must_use]
    pub fn with_contract(mut self, code: &[u8], contract: impl MockContract + 'static) -> Self {
        self.contracts
            .insert(Checksum::generate(code), Box::new(contract));
        self
    }

    fn run<T>(
        &self,
        instance: Instance<'_>,
        call: impl FnOnce(&dyn MockContract, &mut dyn KvStore, &Env) -> Result<T, VmError>,
    ) -> VmOutput<T> {
        let Some(contract) = self.contracts.get(instance.checksum) else {
            return VmOutput::err(
                VmError::Execution(format!("no code with checksum {}", instance.checksum)),
                0,
            );
        };

        // A contract that needs more than it was given burns the whole allowance.
        let gas_used = contract.gas_per_call();
        if gas_used > instance.gas_limit {
            return VmOutput::err(VmError::OutOfGas, instance.gas_limit);
        }

        VmOutput {
            result: call(contract.as_ref(), instance.store, instance.env),
            gas_used,
        }
    }
}

impl WasmEngine for MockEngine {
    fn store_code(&self, code: &[u8]) -> Result<CodeAnalysis, VmError> {
        let checksum = Checksum::generate(code);
        let contract = self
            .contracts
            .get(&checksum)
            .ok_or_else(|| VmError::Execution("code failed to compile".to_string()))?;
        Ok(CodeAnalysis {
            checksum,
            has_ibc_entry_points: contract.has_ibc_entry_points(),
        })
    }

    fn instantiate(
        &self,
        instance: Instance<'_>,
        info: &MessageInfo,
        msg: &[u8],
    ) -> VmOutput<Response> {
        self.run(instance, |c, store, env| c.instantiate(store, env, info, msg))
    }

    fn execute(&self, instance: Instance<'_>, info: &MessageInfo, msg: &[u8]) -> VmOutput<Response> {
        self.run(instance, |c, store, env| c.execute(store, env, info, msg))
    }

    fn query(&self, instance: Instance<'_>, msg: &[u8]) -> VmOutput<Binary> {
        self.run(instance, |c, store, env| c.query(store, env, msg))
    }

    fn reply(&self, instance: Instance<'_>, reply: &Reply) -> VmOutput<Response> {
        self.run(instance, |c, store, env| c.reply(store, env, reply))
    }

    fn ibc_channel_open(
        &self,
        instance: Instance<'_>,
        channel: &IbcChannel,
    ) -> VmOutput<ChannelOpenResponse> {
        self.run(instance, |c, store, env| c.ibc_channel_open(store, env, channel))
    }

    fn ibc_channel_connect(
        &self,
        instance: Instance<'_>,
        channel: &IbcChannel,
    ) -> VmOutput<Response> {
        self.run(instance, |c, store, env| c.ibc_channel_connect(store, env, channel))
    }

    fn ibc_channel_close(&self, instance: Instance<'_>, channel: &IbcChannel) -> VmOutput<Response> {
        self.run(instance, |c, store, env| c.ibc_channel_close(store, env, channel))
    }

    fn ibc_packet_receive(
        &self,
        instance: Instance<'_>,
        packet: &IbcPacket,
    ) -> VmOutput<PacketReceiveResponse> {
        self.run(instance, |c, store, env| c.ibc_packet_receive(store, env, packet))
    }

    fn ibc_packet_ack(&self, instance: Instance<'_>, ack: &PacketAck) -> VmOutput<Response> {
        self.run(instance, |c, store, env| c.ibc_packet_ack(store, env, ack))
    }

    fn ibc_packet_timeout(&self, instance: Instance<'_>, packet: &IbcPacket) -> VmOutput<Response> {
        self.run(instance, |c, store, env| c.ibc_packet_timeout(store, env, packet))
    }
}
