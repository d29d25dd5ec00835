//! Drives the channel handshake and packet relaying between two [`TestChain`]s.

use anyhow::{bail, ensure, Context as _};
use cosmwasm_std::{Binary, IbcAcknowledgement, IbcEndpoint, IbcOrder, IbcPacket};
use tracing::{debug, info};

use crate::{chain::TestChain, ibc_core::is_expired};

/// One of the two chains.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    /// The chain the handshake starts on
    A,
    /// The counterparty chain
    B,
}

impl Side {
    /// The other chain.
    #[must_use]
    pub const fn counterparty(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }
}

/// What one end of a channel proposes during the handshake.
#[derive(Clone, Debug)]
pub struct ChannelSetup<'a> {
    /// The port the channel is opened on
    pub port_id: &'a str,
    /// The version this end proposes
    pub version: &'a str,
}

/// The two endpoints of an open channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpenChannel {
    /// The end on chain A
    pub a: IbcEndpoint,
    /// The end on chain B
    pub b: IbcEndpoint,
}

impl OpenChannel {
    /// The end on `side`.
    #[must_use]
    pub const fn endpoint(&self, side: Side) -> &IbcEndpoint {
        match side {
            Side::A => &self.a,
            Side::B => &self.b,
        }
    }
}

/// Two chains and a relayer between them.
pub struct Coordinator {
    /// The first chain
    pub chain_a: TestChain,
    /// The second chain
    pub chain_b: TestChain,
}

impl Coordinator {
    /// Connect two chains.
    #[must_use]
    pub const fn new(chain_a: TestChain, chain_b: TestChain) -> Self {
        Self { chain_a, chain_b }
    }

    /// The chain on `side`.
    pub fn chain(&mut self, side: Side) -> &mut TestChain {
        match side {
            Side::A => &mut self.chain_a,
            Side::B => &mut self.chain_b,
        }
    }

    /// The chain on `src` and its counterparty.
    fn chains(&mut self, src: Side) -> (&mut TestChain, &mut TestChain) {
        match src {
            Side::A => (&mut self.chain_a, &mut self.chain_b),
            Side::B => (&mut self.chain_b, &mut self.chain_a),
        }
    }

    /// Run the four step channel handshake, starting on chain A.
    /// # Errors
    /// Returns an error if any step fails, including a contract rejecting the
    /// channel. The failing step leaves its chain unchanged.
    pub fn create_channel(
        &mut self,
        a: &ChannelSetup<'_>,
        b: &ChannelSetup<'_>,
        order: IbcOrder,
    ) -> anyhow::Result<OpenChannel> {
        let init = self.chain_a.transact_raw(|keeper, tx| {
            let (channel, capability) =
                tx.ibc
                    .open_init(tx.capabilities, a.port_id, b.port_id, a.version, order.clone())?;
            keeper.on_open_channel(&mut tx.context(), &channel, capability)?;
            anyhow::Ok(channel.endpoint)
        })?;
        debug!(channel_id = %init.channel_id, "open init");

        let try_end = self.chain_b.transact_raw(|keeper, tx| {
            let (channel, capability) =
                tx.ibc
                    .open_try(tx.capabilities, b.port_id, init.clone(), b.version, order.clone())?;
            keeper.on_open_channel(&mut tx.context(), &channel, capability)?;
            anyhow::Ok(channel.endpoint)
        })?;
        debug!(channel_id = %try_end.channel_id, "open try");

        self.chain_a.transact_raw(|keeper, tx| {
            let channel = tx
                .ibc
                .open_ack(&init.port_id, &init.channel_id, &try_end.channel_id)?;
            keeper.on_connect_channel(&mut tx.context(), &channel)?;
            anyhow::Ok(())
        })?;
        self.chain_b.transact_raw(|keeper, tx| {
            let channel = tx.ibc.open_confirm(&try_end.port_id, &try_end.channel_id)?;
            keeper.on_connect_channel(&mut tx.context(), &channel)?;
            anyhow::Ok(())
        })?;

        info!(a = %init.channel_id, b = %try_end.channel_id, "channel open");
        Ok(OpenChannel {
            a: init,
            b: try_end,
        })
    }

    /// Packets sent from `src` still waiting for an acknowledgement or timeout.
    pub fn pending_packets(&mut self, src: Side) -> Vec<IbcPacket> {
        self.chain(src).ibc().pending_packets().to_vec()
    }

    /// Deliver the oldest pending packet from `src`, then hand the
    /// acknowledgement back to the sender. Returns the acknowledgement.
    /// # Errors
    /// Returns an error if nothing is pending, the packet expired or either
    /// side fails.
    pub fn relay_packet(&mut self, src: Side) -> anyhow::Result<Binary> {
        let (src_chain, dst_chain) = self.chains(src);
        let packet = src_chain
            .ibc()
            .pending_packets()
            .first()
            .cloned()
            .with_context(|| format!("no packets pending on chain {src:?}"))?;

        let ack = dst_chain.transact_raw(|keeper, tx| {
            tx.ibc.receive(&packet, &tx.block)?;
            let ack = keeper.on_recv_packet(&mut tx.context(), &packet)?;
            anyhow::Ok(ack)
        })?;
        debug!(sequence = packet.sequence, "packet received");

        src_chain.transact_raw(|keeper, tx| {
            tx.ibc.delete_commitment(&packet)?;
            keeper.on_ack_packet(
                &mut tx.context(),
                &packet,
                IbcAcknowledgement::new(ack.clone()),
            )?;
            anyhow::Ok(())
        })?;
        debug!(sequence = packet.sequence, "packet acknowledged");
        Ok(ack)
    }

    /// Relay every pending packet, alternating sides until both are idle.
    /// Returns the number of packets relayed.
    /// # Errors
    /// Returns the first relay error.
    pub fn relay_all(&mut self, max_packets: usize) -> anyhow::Result<usize> {
        let mut relayed = 0;
        let mut side = Side::A;
        while relayed < max_packets {
            if !self.pending_packets(side).is_empty() {
                self.relay_packet(side)?;
                relayed += 1;
            } else if self.pending_packets(side.counterparty()).is_empty() {
                break;
            }
            side = side.counterparty();
        }
        Ok(relayed)
    }

    /// Report the oldest pending packet from `src` as timed out.
    /// # Errors
    /// Returns an error if nothing is pending, the destination has not reached
    /// the timeout or either side fails.
    pub fn timeout_packet(&mut self, src: Side) -> anyhow::Result<()> {
        let (src_chain, dst_chain) = self.chains(src);
        let packet = src_chain
            .ibc()
            .pending_packets()
            .first()
            .cloned()
            .with_context(|| format!("no packets pending on chain {src:?}"))?;
        ensure!(
            is_expired(&packet, dst_chain.block()),
            "packet {} has not timed out at height {}",
            packet.sequence,
            dst_chain.block().height
        );

        src_chain.transact_raw(|keeper, tx| {
            tx.ibc.delete_commitment(&packet)?;
            keeper.on_timeout_packet(&mut tx.context(), &packet)?;
            anyhow::Ok(())
        })?;
        debug!(sequence = packet.sequence, "packet timed out");
        Ok(())
    }

    /// Close a channel that a contract on `src` closed, notifying both
    /// contracts.
    /// # Errors
    /// Returns an error if the channel is still open on `src` or either
    /// contract fails.
    pub fn close_channel(&mut self, src: Side, channel: &OpenChannel) -> anyhow::Result<()> {
        let local = channel.endpoint(src).clone();
        let remote = channel.endpoint(src.counterparty()).clone();
        let (src_chain, dst_chain) = self.chains(src);

        let Some(end) = src_chain.ibc().channel_end(&local.port_id, &local.channel_id) else {
            bail!("no channel {}", local.channel_id);
        };
        ensure!(
            end.state == crate::ibc_core::ChannelState::Closed,
            "channel {} was not closed by its contract",
            local.channel_id
        );
        let closed = src_chain
            .ibc()
            .ibc_channel(&local.port_id, &local.channel_id)
            .context("channel vanished")?;

        src_chain.transact_raw(|keeper, tx| {
            keeper.on_close_channel(&mut tx.context(), &closed)?;
            anyhow::Ok(())
        })?;
        dst_chain.transact_raw(|keeper, tx| {
            let channel = tx.ibc.close_confirm(&remote.port_id, &remote.channel_id)?;
            keeper.on_close_channel(&mut tx.context(), &channel)?;
            anyhow::Ok(())
        })?;
        info!(channel_id = %local.channel_id, "channel closed");
        Ok(())
    }
}
