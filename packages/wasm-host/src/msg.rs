//! The messages a contract hands back to the host, and the responses the host
//! hands back to the contract.

use cosmwasm_std::{Attribute, Binary, Event, IbcTimeout};
use serde::{Deserialize, Serialize};

/// Every message kind a contract can ask the host to perform.
///
/// Adding a kind means adding a variant and a handler for it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostMsg {
    /// Native token movements, routed to the ledger.
    Bank(BankMsg),
    /// Calls into other contracts.
    Wasm(WasmMsg),
    /// Outbound IBC actions on the contract's own port.
    Ibc(IbcMsg),
    /// Chain specific messages; only handled if a handler is installed.
    Custom(Binary),
}

impl HostMsg {
    /// Short name of the message kind, used in logs and errors.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Bank(_) => "bank",
            Self::Wasm(WasmMsg::Execute { .. }) => "wasm/execute",
            Self::Wasm(WasmMsg::Instantiate { .. }) => "wasm/instantiate",
            Self::Ibc(IbcMsg::SendPacket { .. }) => "ibc/send_packet",
            Self::Ibc(IbcMsg::CloseChannel { .. }) => "ibc/close_channel",
            Self::Custom(_) => "custom",
        }
    }
}

/// A native coin amount.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    /// Denomination
    pub denom: String,
    /// Amount in the smallest unit
    pub amount: u128,
}

/// Native token messages.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BankMsg {
    /// Send coins from the contract to `to_address`.
    Send {
        /// Recipient
        to_address: String,
        /// Coins to move
        amount: Vec<Coin>,
    },
}

/// Contract to contract messages.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WasmMsg {
    /// Execute another contract.
    Execute {
        /// Address of the contract to call
        contract_addr: String,
        /// The JSON message passed to the contract
        msg: Binary,
    },
    /// Create a new contract instance from stored code.
    Instantiate {
        /// The stored code to instantiate
        code_id: u64,
        /// The JSON init message
        msg: Binary,
        /// Human readable label
        label: String,
    },
}

/// IBC messages a contract can send on its own port.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IbcMsg {
    /// Send a packet over a channel the contract has connected.
    SendPacket {
        /// The local channel
        channel_id: String,
        /// Opaque packet payload
        data: Binary,
        /// When the packet stops being deliverable
        timeout: IbcTimeout,
    },
    /// Start closing a channel.
    CloseChannel {
        /// The local channel
        channel_id: String,
    },
}

/// When the host reports a sub-message result back to its sender.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyOn {
    /// Never call back. A failure aborts the whole transaction.
    #[default]
    Never,
    /// Call back after the message succeeded. A failure aborts the whole transaction.
    Success,
}

/// A message plus the reply policy for it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubMsg {
    /// Echoed back to the contract in the reply
    pub id: u64,
    /// The message to dispatch
    pub msg: HostMsg,
    /// When to reply
    #[serde(default)]
    pub reply_on: ReplyOn,
}

impl SubMsg {
    /// A message without reply.
    #[must_use]
    pub const fn new(msg: HostMsg) -> Self {
        Self {
            id: 0,
            msg,
            reply_on: ReplyOn::Never,
        }
    }

    /// A message that is reported back to the contract on success.
    #[must_use]
    pub const fn reply_on_success(msg: HostMsg, id: u64) -> Self {
        Self {
            id,
            msg,
            reply_on: ReplyOn::Success,
        }
    }
}

impl From<HostMsg> for SubMsg {
    fn from(msg: HostMsg) -> Self {
        Self::new(msg)
    }
}

/// What a contract entry point hands back to the host.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// Messages to dispatch, in order
    pub messages: Vec<SubMsg>,
    /// Attributes for the host's `wasm` event
    pub attributes: Vec<Attribute>,
    /// Custom events, emitted as `wasm-<type>`
    pub events: Vec<Event>,
    /// Result data
    pub data: Option<Binary>,
}

impl Response {
    /// Create an empty response.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message without reply.
    #[must_use]
    pub fn add_message(mut self, msg: impl Into<HostMsg>) -> Self {
        self.messages.push(SubMsg::new(msg.into()));
        self
    }

    /// Append a sub-message.
    #[must_use]
    pub fn add_submessage(mut self, msg: SubMsg) -> Self {
        self.messages.push(msg);
        self
    }

    /// Append an attribute to the `wasm` event.
    #[must_use]
    pub fn add_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push(Attribute::new(key, value));
        self
    }

    /// Append a custom event.
    #[must_use]
    pub fn add_event(mut self, event: Event) -> Self {
        self.events.push(event);
        self
    }

    /// Set the result data.
    #[must_use]
    pub fn set_data(mut self, data: impl Into<Binary>) -> Self {
        self.data = Some(data.into());
        self
    }
}

/// The contract's answer to a channel open proposal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelOpenResponse {
    /// Whether the contract accepts the channel
    pub success: bool,
    /// Why the channel was rejected
    #[serde(default)]
    pub reason: String,
}

impl ChannelOpenResponse {
    /// Accept the channel.
    #[must_use]
    pub const fn accept() -> Self {
        Self {
            success: true,
            reason: String::new(),
        }
    }

    /// Reject the channel with a reason.
    #[must_use]
    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            reason: reason.into(),
        }
    }
}

/// The contract's answer to a received packet.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketReceiveResponse {
    /// Written back to the sender as the packet acknowledgement
    pub acknowledgement: Binary,
    /// Messages to dispatch, in order
    pub messages: Vec<SubMsg>,
    /// Attributes for the host's `wasm` event
    pub attributes: Vec<Attribute>,
    /// Custom events
    pub events: Vec<Event>,
}

impl PacketReceiveResponse {
    /// Create a response carrying `acknowledgement`.
    #[must_use]
    pub fn new(acknowledgement: impl Into<Binary>) -> Self {
        Self {
            acknowledgement: acknowledgement.into(),
            ..Self::default()
        }
    }

    /// Append a message without reply.
    #[must_use]
    pub fn add_message(mut self, msg: impl Into<HostMsg>) -> Self {
        self.messages.push(SubMsg::new(msg.into()));
        self
    }

    /// Append an attribute to the `wasm` event.
    #[must_use]
    pub fn add_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push(Attribute::new(key, value));
        self
    }

    pub(crate) fn split(self) -> (Binary, Response) {
        (
            self.acknowledgement,
            Response {
                messages: self.messages,
                attributes: self.attributes,
                events: self.events,
                data: None,
            },
        )
    }
}

impl From<BankMsg> for HostMsg {
    fn from(msg: BankMsg) -> Self {
        Self::Bank(msg)
    }
}

impl From<WasmMsg> for HostMsg {
    fn from(msg: WasmMsg) -> Self {
        Self::Wasm(msg)
    }
}

impl From<IbcMsg> for HostMsg {
    fn from(msg: IbcMsg) -> Self {
        Self::Ibc(msg)
    }
}

/// The successful result of a dispatched sub-message.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubMsgResponse {
    /// Events emitted while handling the message
    pub events: Vec<Event>,
    /// Result data of the message
    pub data: Option<Binary>,
}

/// The outcome of a sub-message as reported to its sender.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubMsgResult {
    /// The message succeeded
    Ok(SubMsgResponse),
    /// The message failed with the given error text
    Err(String),
}

/// Passed to a contract's `reply` entry point.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    /// The id of the sub-message
    pub id: u64,
    /// The outcome of the sub-message
    pub result: SubMsgResult,
}
