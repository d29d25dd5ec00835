//! Builds the events the host emits for contract invocations and outbound
//! packets.

use cosmwasm_std::{Attribute, Event, IbcPacket};

use crate::error::HostError;

/// Type of the event emitted for every contract invocation.
pub const WASM_EVENT: &str = "wasm";
/// Prefix of contract emitted custom event types.
pub const CUSTOM_EVENT_PREFIX: &str = "wasm-";
/// Attribute key carrying the contract address. Reserved for the host.
pub const CONTRACT_ADDRESS_KEY: &str = "_contract_address";
/// Type of the event emitted for every outbound packet.
pub const SEND_PACKET_EVENT: &str = "send_packet";

/// Attribute keys starting with this prefix are reserved for the host.
const RESERVED_PREFIX: char = '_';
/// Minimum length of a custom event type after trimming.
const CUSTOM_EVENT_MIN_LEN: usize = 2;

/// Build the `wasm` event and the `wasm-<type>` events of one invocation.
///
/// Every event carries the contract address as its first attribute.
/// # Errors
/// Returns [`HostError::InvalidEvent`] if the contract used a reserved or
/// empty attribute key, an empty value or a too short custom event type.
pub fn contract_events(
    contract_address: &str,
    attributes: &[Attribute],
    custom: &[Event],
) -> Result<Vec<Event>, HostError> {
    let mut events = Vec::with_capacity(custom.len() + 1);
    events.push(with_contract_address(
        WASM_EVENT.to_string(),
        contract_address,
        attributes,
    )?);

    for event in custom {
        let ty = event.ty.trim();
        if ty.len() < CUSTOM_EVENT_MIN_LEN {
            return Err(HostError::InvalidEvent(format!(
                "event type too short: {:?}",
                event.ty
            )));
        }
        events.push(with_contract_address(
            format!("{CUSTOM_EVENT_PREFIX}{ty}"),
            contract_address,
            &event.attributes,
        )?);
    }

    Ok(events)
}

fn with_contract_address(
    ty: String,
    contract_address: &str,
    attributes: &[Attribute],
) -> Result<Event, HostError> {
    let mut event = Event::new(ty).add_attribute(CONTRACT_ADDRESS_KEY, contract_address);
    for attr in attributes {
        let key = attr.key.trim();
        if key.is_empty() {
            return Err(HostError::InvalidEvent("empty attribute key".to_string()));
        }
        if key.starts_with(RESERVED_PREFIX) {
            return Err(HostError::InvalidEvent(format!(
                "attribute key starts with reserved prefix {RESERVED_PREFIX}: {key:?}"
            )));
        }
        let value = attr.value.trim();
        if value.is_empty() {
            return Err(HostError::InvalidEvent(format!(
                "empty value for attribute {key:?}"
            )));
        }
        event = event.add_attribute(key, value);
    }
    Ok(event)
}

/// Build the event for a packet handed to the channel layer.
#[must_use]
pub fn send_packet_event(packet: &IbcPacket) -> Event {
    let timeout_height = packet
        .timeout
        .block()
        .map_or_else(|| "0-0".to_string(), |b| format!("{}-{}", b.revision, b.height));
    let timeout_timestamp = packet
        .timeout
        .timestamp()
        .map_or(0, |t| t.nanos());

    Event::new(SEND_PACKET_EVENT)
        .add_attribute("packet_data_hex", hex::encode(packet.data.as_slice()))
        .add_attribute("packet_timeout_height", timeout_height)
        .add_attribute("packet_timeout_timestamp", timeout_timestamp.to_string())
        .add_attribute("packet_sequence", packet.sequence.to_string())
        .add_attribute("packet_src_port", &packet.src.port_id)
        .add_attribute("packet_src_channel", &packet.src.channel_id)
        .add_attribute("packet_dst_port", &packet.dest.port_id)
        .add_attribute("packet_dst_channel", &packet.dest.channel_id)
}
