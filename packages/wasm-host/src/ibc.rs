//! IBC channel and packet callbacks.
//!
//! The channel layer calls into these when a handshake step or a packet
//! targets a contract port. The contract is recovered from the port id.
//!
//! Channel lifecycle: uninitialized, open pending (after
//! [`Keeper::on_open_channel`]), open (after [`Keeper::on_connect_channel`]).
//! Every packet a contract sends is resolved by exactly one of
//! [`Keeper::on_ack_packet`] or [`Keeper::on_timeout_packet`].

use cosmwasm_std::{Binary, IbcAcknowledgement, IbcChannel, IbcPacket};
use tracing::{info, instrument, warn};

use crate::{
    capability::{channel_capability_path, Capability, CapabilityKeeper},
    channel::{self, ChannelEndpointPair},
    context::Context,
    error::HostError,
    keeper::{contract_store, Keeper},
    port,
    types::{CodeInfo, ContractInfo},
    vm::{EntryPoint, PacketAck},
};

/// The channel layer as seen by the contract host.
pub trait ChannelKeeper {
    /// The sequence the next packet sent on the channel will carry.
    /// # Errors
    /// Returns an error if the channel does not exist.
    fn next_sequence_send(&self, port_id: &str, channel_id: &str) -> Result<u64, HostError>;

    /// Commit an outbound packet. The channel layer checks that `capability`
    /// is the capability of the packet's source channel.
    /// # Errors
    /// Returns an error if the capability does not authenticate or the packet
    /// is rejected.
    fn send_packet(
        &mut self,
        authority: &CapabilityKeeper,
        capability: &Capability,
        packet: IbcPacket,
    ) -> Result<(), HostError>;

    /// Start closing a channel.
    /// # Errors
    /// Returns an error if the capability does not authenticate or the channel
    /// cannot be closed.
    fn close_channel(
        &mut self,
        authority: &CapabilityKeeper,
        capability: &Capability,
        port_id: &str,
        channel_id: &str,
    ) -> Result<(), HostError>;
}

impl Keeper {
    /// A channel handshake proposes a channel on a contract port.
    ///
    /// The contract may reject the channel. If it accepts, the wasm module
    /// takes ownership of `capability`.
    /// # Errors
    /// Returns [`HostError::ChannelOpenRejected`] if the contract rejects the
    /// channel, or an error if the call fails.
    #[instrument(skip_all, fields(port_id = %channel.endpoint.port_id, channel_id = %channel.endpoint.channel_id))]
    pub fn on_open_channel(
        &self,
        ctx: &mut Context<'_>,
        channel: &IbcChannel,
        capability: Capability,
    ) -> Result<(), HostError> {
        let (contract, code) = self.contract_for_port(ctx, &channel.endpoint.port_id)?;
        let load_cost = self.gas_register().instantiate_cost(code.pinned, 0);
        let response = self.call(
            ctx,
            &contract,
            &code,
            EntryPoint::IbcChannelOpen,
            load_cost,
            |vm, instance| vm.ibc_channel_open(instance, channel),
        )?;

        if !response.success {
            warn!(reason = %response.reason, "channel rejected by contract");
            return Err(HostError::ChannelOpenRejected(response.reason));
        }

        let name = channel_capability_path(&channel.endpoint.port_id, &channel.endpoint.channel_id);
        port::claim(ctx, capability, &name)
    }

    /// The channel handshake completed.
    ///
    /// Records the endpoint pair in the contract's storage before the contract
    /// sees the channel, so that it can send packets right away.
    /// # Errors
    /// Returns an error if the call or one of the contract's messages fails.
    #[instrument(skip_all, fields(port_id = %channel.endpoint.port_id, channel_id = %channel.endpoint.channel_id))]
    pub fn on_connect_channel(
        &self,
        ctx: &mut Context<'_>,
        channel: &IbcChannel,
    ) -> Result<(), HostError> {
        let (contract, code) = self.contract_for_port(ctx, &channel.endpoint.port_id)?;
        let pair = ChannelEndpointPair {
            local: channel.endpoint.clone(),
            remote: channel.counterparty_endpoint.clone(),
        };
        if channel::record_pair(&mut contract_store(&mut *ctx.store, &contract.address), pair)? {
            info!("channel connected");
        }

        let load_cost = self.gas_register().instantiate_cost(code.pinned, 0);
        let response = self.call(
            ctx,
            &contract,
            &code,
            EntryPoint::IbcChannelConnect,
            load_cost,
            |vm, instance| vm.ibc_channel_connect(instance, channel),
        )?;
        self.handle_response(ctx, &contract, response)?;
        Ok(())
    }

    /// A channel on a contract port is closing.
    /// # Errors
    /// Returns an error if the call or one of the contract's messages fails.
    #[instrument(skip_all, fields(port_id = %channel.endpoint.port_id, channel_id = %channel.endpoint.channel_id))]
    pub fn on_close_channel(
        &self,
        ctx: &mut Context<'_>,
        channel: &IbcChannel,
    ) -> Result<(), HostError> {
        let (contract, code) = self.contract_for_port(ctx, &channel.endpoint.port_id)?;
        let load_cost = self.gas_register().instantiate_cost(code.pinned, 0);
        let response = self.call(
            ctx,
            &contract,
            &code,
            EntryPoint::IbcChannelClose,
            load_cost,
            |vm, instance| vm.ibc_channel_close(instance, channel),
        )?;
        self.handle_response(ctx, &contract, response)?;
        info!("channel closed");
        Ok(())
    }

    /// A packet arrived for a contract. Returns the acknowledgement.
    ///
    /// The contract answers malformed payloads with an error acknowledgement;
    /// an error returned here aborts the transaction instead.
    /// # Errors
    /// Returns an error if the call or one of the contract's messages fails.
    #[instrument(skip_all, fields(port_id = %packet.dest.port_id, channel_id = %packet.dest.channel_id, sequence = packet.sequence))]
    pub fn on_recv_packet(
        &self,
        ctx: &mut Context<'_>,
        packet: &IbcPacket,
    ) -> Result<Binary, HostError> {
        let (contract, code) = self.contract_for_port(ctx, &packet.dest.port_id)?;
        let load_cost = self
            .gas_register()
            .instantiate_cost(code.pinned, packet.data.len());
        let response = self.call(
            ctx,
            &contract,
            &code,
            EntryPoint::IbcPacketReceive,
            load_cost,
            |vm, instance| vm.ibc_packet_receive(instance, packet),
        )?;

        let (acknowledgement, response) = response.split();
        self.handle_response(ctx, &contract, response)?;
        Ok(acknowledgement)
    }

    /// The counterparty acknowledged a packet a contract sent.
    /// # Errors
    /// Returns an error if the call or one of the contract's messages fails.
    #[instrument(skip_all, fields(port_id = %packet.src.port_id, channel_id = %packet.src.channel_id, sequence = packet.sequence))]
    pub fn on_ack_packet(
        &self,
        ctx: &mut Context<'_>,
        packet: &IbcPacket,
        acknowledgement: IbcAcknowledgement,
    ) -> Result<(), HostError> {
        let (contract, code) = self.contract_for_port(ctx, &packet.src.port_id)?;
        let ack = PacketAck {
            acknowledgement,
            original_packet: packet.clone(),
        };
        let load_cost = self
            .gas_register()
            .instantiate_cost(code.pinned, ack.acknowledgement.data.len());
        let response = self.call(
            ctx,
            &contract,
            &code,
            EntryPoint::IbcPacketAck,
            load_cost,
            |vm, instance| vm.ibc_packet_ack(instance, &ack),
        )?;
        self.handle_response(ctx, &contract, response)?;
        Ok(())
    }

    /// A packet a contract sent timed out.
    /// # Errors
    /// Returns an error if the call or one of the contract's messages fails.
    #[instrument(skip_all, fields(port_id = %packet.src.port_id, channel_id = %packet.src.channel_id, sequence = packet.sequence))]
    pub fn on_timeout_packet(
        &self,
        ctx: &mut Context<'_>,
        packet: &IbcPacket,
    ) -> Result<(), HostError> {
        let (contract, code) = self.contract_for_port(ctx, &packet.src.port_id)?;
        let load_cost = self
            .gas_register()
            .instantiate_cost(code.pinned, packet.data.len());
        let response = self.call(
            ctx,
            &contract,
            &code,
            EntryPoint::IbcPacketTimeout,
            load_cost,
            |vm, instance| vm.ibc_packet_timeout(instance, packet),
        )?;
        self.handle_response(ctx, &contract, response)?;
        info!("packet timed out");
        Ok(())
    }

    fn contract_for_port(
        &self,
        ctx: &Context<'_>,
        port_id: &str,
    ) -> Result<(ContractInfo, CodeInfo), HostError> {
        let id = port::resolve_contract(port_id)?;
        let contract = self.contract_info(&*ctx.store, &id.address()?)?;
        if contract.ibc_port_id.as_deref() != Some(port_id) {
            return Err(HostError::NoIbcPort(contract.address));
        }
        let code = self.code_info(&*ctx.store, contract.id.code_id)?;
        Ok((contract, code))
    }
}
