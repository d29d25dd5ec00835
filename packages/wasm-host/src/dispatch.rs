//! Routes the messages a contract returns to the handler that performs them.
//!
//! Messages are processed one after the other in the order the contract
//! returned them. The first handler in the chain that recognizes a message
//! performs it. Any failure aborts the remaining messages; undoing the writes
//! of the failed transaction is up to the ledger.

use cosmwasm_std::{Binary, Event, IbcPacket};
use tracing::{debug, info};

use crate::{
    capability::{channel_capability_path, WASM_MODULE},
    channel,
    context::Context,
    error::HostError,
    events::send_packet_event,
    keeper::{contract_store, Keeper},
    msg::{BankMsg, HostMsg, IbcMsg, Reply, ReplyOn, SubMsg, SubMsgResponse, SubMsgResult, WasmMsg},
    types::ContractInfo,
};

/// The outcome of offering a message to one handler.
#[derive(Debug, PartialEq, Eq)]
pub enum Dispatched {
    /// The handler does not route this kind of message
    Skipped,
    /// The handler performed the message
    Done {
        /// Result data of the message
        data: Option<Binary>,
    },
}

/// One link of the dispatch chain.
pub trait MessageHandler {
    /// Perform `msg` on behalf of `sender`, or return [`Dispatched::Skipped`]
    /// to pass it to the next handler.
    /// # Errors
    /// Returns an error if the handler recognized the message but failed to
    /// perform it.
    fn dispatch(
        &self,
        keeper: &Keeper,
        ctx: &mut Context<'_>,
        sender: &ContractInfo,
        msg: &HostMsg,
    ) -> Result<Dispatched, HostError>;
}

/// The ledger's native message router.
pub trait NativeRouter {
    /// Perform a bank message sent by `sender` and return the events it emitted.
    /// # Errors
    /// Returns an error if the ledger rejects the message.
    fn route_bank(&mut self, sender: &str, msg: &BankMsg) -> Result<Vec<Event>, HostError>;
}

/// The default handler chain.
#[must_use]
pub fn default_handlers() -> Vec<Box<dyn MessageHandler>> {
    vec![
        Box::new(WasmHandler),
        Box::new(IbcHandler),
        Box::new(NativeHandler),
    ]
}

/// Dispatch `messages` returned by `sender`, replying where requested.
///
/// Returns the data of the last reply that set some.
pub(crate) fn dispatch_submessages(
    keeper: &Keeper,
    ctx: &mut Context<'_>,
    sender: &ContractInfo,
    messages: Vec<SubMsg>,
) -> Result<Option<Binary>, HostError> {
    let mut data = None;
    for SubMsg { id, msg, reply_on } in messages {
        let start = ctx.events.len();
        debug!(kind = msg.kind(), id, sender = %sender.address, "dispatching message");
        let msg_data = route(keeper, ctx, sender, &msg)?;

        if reply_on == ReplyOn::Success {
            let reply = Reply {
                id,
                result: SubMsgResult::Ok(SubMsgResponse {
                    events: ctx.events_since(start),
                    data: msg_data,
                }),
            };
            if let Some(reply_data) = keeper.reply(ctx, sender, &reply)? {
                data = Some(reply_data);
            }
        }
    }
    Ok(data)
}

/// Offer `msg` to every handler in order until one performs it.
fn route(
    keeper: &Keeper,
    ctx: &mut Context<'_>,
    sender: &ContractInfo,
    msg: &HostMsg,
) -> Result<Option<Binary>, HostError> {
    for handler in keeper.handlers() {
        if let Dispatched::Done { data } = handler.dispatch(keeper, ctx, sender, msg)? {
            return Ok(data);
        }
    }
    Err(HostError::UnrecognizedMessageType(msg.kind().to_string()))
}

/// Routes contract to contract messages back into the keeper.
pub struct WasmHandler;

impl MessageHandler for WasmHandler {
    fn dispatch(
        &self,
        keeper: &Keeper,
        ctx: &mut Context<'_>,
        sender: &ContractInfo,
        msg: &HostMsg,
    ) -> Result<Dispatched, HostError> {
        let HostMsg::Wasm(msg) = msg else {
            return Ok(Dispatched::Skipped);
        };

        let data = match msg {
            WasmMsg::Execute { contract_addr, msg } => {
                keeper.execute(ctx, &sender.address, contract_addr, msg)?
            }
            WasmMsg::Instantiate {
                code_id,
                msg,
                label,
            } => {
                let (address, _) = keeper.instantiate(ctx, &sender.address, *code_id, msg, label)?;
                Some(Binary::from(address.into_bytes()))
            }
        };
        Ok(Dispatched::Done { data })
    }
}

/// Performs IBC messages on the sender's own port.
pub struct IbcHandler;

impl MessageHandler for IbcHandler {
    fn dispatch(
        &self,
        _keeper: &Keeper,
        ctx: &mut Context<'_>,
        sender: &ContractInfo,
        msg: &HostMsg,
    ) -> Result<Dispatched, HostError> {
        let HostMsg::Ibc(msg) = msg else {
            return Ok(Dispatched::Skipped);
        };
        let port_id = sender
            .ibc_port_id
            .as_deref()
            .ok_or_else(|| HostError::NoIbcPort(sender.address.clone()))?;

        match msg {
            IbcMsg::SendPacket {
                channel_id,
                data,
                timeout,
            } => send_packet(ctx, sender, port_id, channel_id, data, timeout)?,
            IbcMsg::CloseChannel { channel_id } => close_channel(ctx, port_id, channel_id)?,
        }
        Ok(Dispatched::Done { data: None })
    }
}

#[tracing::instrument(skip_all, fields(port_id = %port_id, channel_id = %channel_id))]
fn send_packet(
    ctx: &mut Context<'_>,
    sender: &ContractInfo,
    port_id: &str,
    channel_id: &str,
    data: &Binary,
    timeout: &cosmwasm_std::IbcTimeout,
) -> Result<(), HostError> {
    let pair = {
        let store = contract_store(&mut *ctx.store, &sender.address);
        channel::lookup_by_local_channel(&store, channel_id)?
    };

    let name = channel_capability_path(port_id, channel_id);
    let authority = ctx
        .capabilities
        .as_deref()
        .ok_or_else(|| HostError::CapabilityNotFound(name.clone()))?;
    let capability = authority
        .get_capability(WASM_MODULE, &name)
        .ok_or_else(|| HostError::CapabilityNotFound(name.clone()))?;
    let channels = ctx
        .channels
        .as_deref_mut()
        .ok_or_else(|| HostError::SendPacket("no channel keeper installed".to_string()))?;

    let sequence = channels.next_sequence_send(port_id, channel_id)?;
    let packet = IbcPacket::new(
        data.clone(),
        pair.local,
        pair.remote,
        sequence,
        timeout.clone(),
    );
    channels.send_packet(authority, &capability, packet.clone())?;

    ctx.events.push(send_packet_event(&packet));
    info!(sequence, "packet sent");
    Ok(())
}

fn close_channel(ctx: &mut Context<'_>, port_id: &str, channel_id: &str) -> Result<(), HostError> {
    let name = channel_capability_path(port_id, channel_id);
    let authority = ctx
        .capabilities
        .as_deref()
        .ok_or_else(|| HostError::CapabilityNotFound(name.clone()))?;
    let capability = authority
        .get_capability(WASM_MODULE, &name)
        .ok_or_else(|| HostError::CapabilityNotFound(name.clone()))?;
    let channels = ctx
        .channels
        .as_deref_mut()
        .ok_or_else(|| HostError::SendPacket("no channel keeper installed".to_string()))?;

    channels.close_channel(authority, &capability, port_id, channel_id)?;
    info!(port_id, channel_id, "channel close initiated");
    Ok(())
}

/// Hands native messages to the ledger's router.
pub struct NativeHandler;

impl MessageHandler for NativeHandler {
    fn dispatch(
        &self,
        _keeper: &Keeper,
        ctx: &mut Context<'_>,
        sender: &ContractInfo,
        msg: &HostMsg,
    ) -> Result<Dispatched, HostError> {
        let (HostMsg::Bank(msg), Some(router)) = (msg, ctx.native.as_deref_mut()) else {
            return Ok(Dispatched::Skipped);
        };

        let events = router.route_bank(&sender.address, msg)?;
        ctx.events.extend(events);
        Ok(Dispatched::Done { data: None })
    }
}
