//! An in-memory channel layer: channel ends, handshake steps, packet
//! commitments and receipts.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::{bail, ensure, Context as _};
use cosmwasm_std::{IbcChannel, IbcEndpoint, IbcOrder, IbcPacket};
use cw_ibc_host::{
    capability::{channel_capability_path, Capability, CapabilityKeeper, IBC_MODULE},
    ibc::ChannelKeeper,
    types::BlockInfo,
    HostError,
};

/// The connection every channel is opened on.
pub const CONNECTION_ID: &str = "connection-0";

/// Handshake state of a channel end.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelState {
    /// Proposed by this side
    Init,
    /// Proposed by the counterparty and accepted by this side
    TryOpen,
    /// Both sides agreed
    Open,
    /// Closed, no more packets
    Closed,
}

/// One end of a channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelEnd {
    /// Handshake state
    pub state: ChannelState,
    /// Packet ordering
    pub order: IbcOrder,
    /// Negotiated version
    pub version: String,
    /// The other end; the channel id is empty until the counterparty answered
    pub counterparty: IbcEndpoint,
    next_sequence_send: u64,
}

/// The channel layer of one chain.
#[derive(Clone, Debug, Default)]
pub struct IbcCore {
    channels: BTreeMap<(String, String), ChannelEnd>,
    next_channel: u64,
    commitments: Vec<IbcPacket>,
    receipts: BTreeSet<(String, String, u64)>,
}

impl IbcCore {
    /// Create a channel layer without channels.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a channel end.
    #[must_use]
    pub fn channel_end(&self, port_id: &str, channel_id: &str) -> Option<&ChannelEnd> {
        self.channels
            .get(&(port_id.to_string(), channel_id.to_string()))
    }

    /// The channel as handed to contracts.
    #[must_use]
    pub fn ibc_channel(&self, port_id: &str, channel_id: &str) -> Option<IbcChannel> {
        self.channel_end(port_id, channel_id).map(|end| {
            IbcChannel::new(
                IbcEndpoint {
                    port_id: port_id.to_string(),
                    channel_id: channel_id.to_string(),
                },
                end.counterparty.clone(),
                end.order.clone(),
                end.version.clone(),
                CONNECTION_ID,
            )
        })
    }

    /// Packets sent and neither acknowledged nor timed out, oldest first.
    #[must_use]
    pub fn pending_packets(&self) -> &[IbcPacket] {
        &self.commitments
    }

    /// `ChanOpenInit`: create a channel end and the channel capability.
    /// # Errors
    /// Returns an error if the capability cannot be minted.
    pub fn open_init(
        &mut self,
        capabilities: &mut CapabilityKeeper,
        port_id: &str,
        counterparty_port_id: &str,
        version: &str,
        order: IbcOrder,
    ) -> anyhow::Result<(IbcChannel, Capability)> {
        let counterparty = IbcEndpoint {
            port_id: counterparty_port_id.to_string(),
            channel_id: String::new(),
        };
        self.new_channel(capabilities, port_id, counterparty, version, order, ChannelState::Init)
    }

    /// `ChanOpenTry`: create a channel end answering a counterparty proposal.
    /// # Errors
    /// Returns an error if the capability cannot be minted.
    pub fn open_try(
        &mut self,
        capabilities: &mut CapabilityKeeper,
        port_id: &str,
        counterparty: IbcEndpoint,
        version: &str,
        order: IbcOrder,
    ) -> anyhow::Result<(IbcChannel, Capability)> {
        self.new_channel(capabilities, port_id, counterparty, version, order, ChannelState::TryOpen)
    }

    /// `ChanOpenAck`: the counterparty accepted our proposal.
    /// # Errors
    /// Returns an error if the channel is not in `Init`.
    pub fn open_ack(
        &mut self,
        port_id: &str,
        channel_id: &str,
        counterparty_channel_id: &str,
    ) -> anyhow::Result<IbcChannel> {
        let end = self.channel_end_mut(port_id, channel_id)?;
        ensure!(end.state == ChannelState::Init, "channel {channel_id} not in init");
        end.state = ChannelState::Open;
        end.counterparty.channel_id = counterparty_channel_id.to_string();
        self.ibc_channel(port_id, channel_id)
            .context("channel vanished")
    }

    /// `ChanOpenConfirm`: the counterparty saw our answer.
    /// # Errors
    /// Returns an error if the channel is not in `TryOpen`.
    pub fn open_confirm(&mut self, port_id: &str, channel_id: &str) -> anyhow::Result<IbcChannel> {
        let end = self.channel_end_mut(port_id, channel_id)?;
        ensure!(end.state == ChannelState::TryOpen, "channel {channel_id} not in try-open");
        end.state = ChannelState::Open;
        self.ibc_channel(port_id, channel_id)
            .context("channel vanished")
    }

    /// Close the channel end after the counterparty closed.
    /// # Errors
    /// Returns an error if the channel does not exist.
    pub fn close_confirm(&mut self, port_id: &str, channel_id: &str) -> anyhow::Result<IbcChannel> {
        self.channel_end_mut(port_id, channel_id)?.state = ChannelState::Closed;
        self.ibc_channel(port_id, channel_id)
            .context("channel vanished")
    }

    /// Check and record the receipt of `packet` on its destination.
    /// # Errors
    /// Returns an error if the channel is not open, the packet timed out or
    /// was received before.
    pub fn receive(&mut self, packet: &IbcPacket, block: &BlockInfo) -> anyhow::Result<()> {
        let end = self
            .channel_end(&packet.dest.port_id, &packet.dest.channel_id)
            .with_context(|| format!("no channel {}", packet.dest.channel_id))?;
        ensure!(end.state == ChannelState::Open, "channel is not open");
        ensure!(!is_expired(packet, block), "packet timed out");

        let receipt = (
            packet.dest.port_id.clone(),
            packet.dest.channel_id.clone(),
            packet.sequence,
        );
        ensure!(
            self.receipts.insert(receipt),
            "packet {} already received",
            packet.sequence
        );
        Ok(())
    }

    /// Remove the commitment of an acknowledged or timed out packet.
    /// # Errors
    /// Returns an error if no such packet is pending.
    pub fn delete_commitment(&mut self, packet: &IbcPacket) -> anyhow::Result<()> {
        let Some(pos) = self.commitments.iter().position(|p| {
            p.src == packet.src && p.sequence == packet.sequence
        }) else {
            bail!("no commitment for packet {}", packet.sequence);
        };
        self.commitments.remove(pos);
        Ok(())
    }

    fn new_channel(
        &mut self,
        capabilities: &mut CapabilityKeeper,
        port_id: &str,
        counterparty: IbcEndpoint,
        version: &str,
        order: IbcOrder,
        state: ChannelState,
    ) -> anyhow::Result<(IbcChannel, Capability)> {
        let channel_id = format!("channel-{}", self.next_channel);
        self.next_channel += 1;

        let capability =
            capabilities.new_capability(IBC_MODULE, &channel_capability_path(port_id, &channel_id))?;
        self.channels.insert(
            (port_id.to_string(), channel_id.clone()),
            ChannelEnd {
                state,
                order,
                version: version.to_string(),
                counterparty,
                next_sequence_send: 1,
            },
        );
        let channel = self
            .ibc_channel(port_id, &channel_id)
            .context("channel vanished")?;
        Ok((channel, capability))
    }

    fn channel_end_mut(&mut self, port_id: &str, channel_id: &str) -> anyhow::Result<&mut ChannelEnd> {
        self.channels
            .get_mut(&(port_id.to_string(), channel_id.to_string()))
            .with_context(|| format!("no channel {channel_id} on port {port_id}"))
    }

    fn authenticate(
        authority: &CapabilityKeeper,
        capability: &Capability,
        port_id: &str,
        channel_id: &str,
    ) -> Result<(), HostError> {
        let name = channel_capability_path(port_id, channel_id);
        if !authority.authenticate(IBC_MODULE, capability, &name) {
            return Err(HostError::CapabilityNotFound(name));
        }
        Ok(())
    }
}

/// Whether `packet` can no longer be received at `block`.
#[must_use]
pub fn is_expired(packet: &IbcPacket, block: &BlockInfo) -> bool {
    let height_passed = packet
        .timeout
        .block()
        .is_some_and(|timeout| block.height >= timeout.height);
    let time_passed = packet
        .timeout
        .timestamp()
        .is_some_and(|timeout| block.time_nanos >= timeout.nanos());
    height_passed || time_passed
}

impl ChannelKeeper for IbcCore {
    fn next_sequence_send(&self, port_id: &str, channel_id: &str) -> Result<u64, HostError> {
        self.channel_end(port_id, channel_id)
            .map(|end| end.next_sequence_send)
            .ok_or_else(|| HostError::ChannelNotFound(channel_id.to_string()))
    }

    fn send_packet(
        &mut self,
        authority: &CapabilityKeeper,
        capability: &Capability,
        packet: IbcPacket,
    ) -> Result<(), HostError> {
        Self::authenticate(authority, capability, &packet.src.port_id, &packet.src.channel_id)?;
        let end = self
            .channels
            .get_mut(&(packet.src.port_id.clone(), packet.src.channel_id.clone()))
            .ok_or_else(|| HostError::ChannelNotFound(packet.src.channel_id.clone()))?;

        if end.state != ChannelState::Open {
            return Err(HostError::SendPacket(format!(
                "channel {} is not open",
                packet.src.channel_id
            )));
        }
        if packet.sequence != end.next_sequence_send {
            return Err(HostError::SendPacket(format!(
                "expected sequence {} got {}",
                end.next_sequence_send, packet.sequence
            )));
        }
        if packet.dest != end.counterparty {
            return Err(HostError::SendPacket(
                "destination does not match channel counterparty".to_string(),
            ));
        }

        end.next_sequence_send += 1;
        self.commitments.push(packet);
        Ok(())
    }

    fn close_channel(
        &mut self,
        authority: &CapabilityKeeper,
        capability: &Capability,
        port_id: &str,
        channel_id: &str,
    ) -> Result<(), HostError> {
        Self::authenticate(authority, capability, port_id, channel_id)?;
        let end = self
            .channels
            .get_mut(&(port_id.to_string(), channel_id.to_string()))
            .ok_or_else(|| HostError::ChannelNotFound(channel_id.to_string()))?;
        end.state = ChannelState::Closed;
        Ok(())
    }
}
