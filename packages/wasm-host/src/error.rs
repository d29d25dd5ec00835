//! Defines the [`HostError`] and [`VmError`] types.

use crate::vm::EntryPoint;

/// Errors surfaced by the host to the transaction submitter.
#[derive(Debug, thiserror::Error)]
#[allow(clippy::module_name_repetitions)]
pub enum HostError {
    /// The endpoint string was not produced by the endpoint derivation
    #[error("invalid endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint {
        /// The rejected endpoint string
        endpoint: String,
        /// Why the endpoint was rejected
        reason: &'static str,
    },

    /// Code or instance id does not fit the 32 bit packing of endpoint ids
    #[error("contract id ({code_id}, {instance_id}) exceeds the 32 bit endpoint encoding")]
    ContractIdOutOfRange {
        /// The code id
        code_id: u64,
        /// The instance id
        instance_id: u64,
    },

    /// A capability name is already bound or claimed
    #[error("capability conflict for {name}: {reason}")]
    CapabilityConflict {
        /// The capability name
        name: String,
        /// Description of the conflict
        reason: String,
    },

    /// The module does not own a capability under the given name
    #[error("capability {0} not owned by module")]
    CapabilityNotFound(String),

    /// The port identifier fails host validation
    #[error("invalid port identifier {0:?}")]
    InvalidPortId(String),

    /// The packet references a local channel the contract never connected
    #[error("channel {0} not found")]
    ChannelNotFound(String),

    /// A cost computation exceeded the representable gas range
    #[error("gas overflow: {0}")]
    GasOverflow(&'static str),

    /// The transaction ran out of ledger gas
    #[error("out of gas in location: {descriptor}; gas wanted: {limit}, gas used: {used}")]
    OutOfGas {
        /// What was being charged
        descriptor: String,
        /// The gas limit of the meter
        limit: u64,
        /// The gas consumed including the failed charge
        used: u64,
    },

    /// No handler in the dispatch chain accepted the message
    #[error("unrecognized message type: {0}")]
    UnrecognizedMessageType(String),

    /// The interpreter failed while running a contract entry point
    #[error("vm execution failed in {entry_point}: {source}")]
    VmExecution {
        /// The entry point that failed
        entry_point: EntryPoint,
        /// The opaque interpreter error
        #[source]
        source: VmError,
    },

    /// The interpreter refused to compile the code
    #[error("code rejected by vm: {0}")]
    CodeRejected(#[source] VmError),

    /// No code stored under the given id
    #[error("code {0} not found")]
    CodeNotFound(u64),

    /// No contract registered under the given address
    #[error("contract {0} not found")]
    ContractNotFound(String),

    /// The contract was instantiated without an IBC port
    #[error("contract {0} has no ibc port")]
    NoIbcPort(String),

    /// The contract rejected a channel handshake
    #[error("channel open rejected: {0}")]
    ChannelOpenRejected(String),

    /// Nested contract calls went deeper than configured
    #[error("max call depth {0} exceeded")]
    CallDepthExceeded(u32),

    /// A contract emitted an attribute or event the host does not accept
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    /// The host configuration is invalid
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The channel transport refused the packet
    #[error("send packet failed: {0}")]
    SendPacket(String),

    /// The native router rejected a message
    #[error("native message failed: {0}")]
    NativeMessage(String),

    /// A contract address could not be bech32 encoded
    #[error("address encoding failed: {0}")]
    AddressEncoding(#[from] bech32::EncodeError),

    /// Serializing or deserializing host records failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors reported by the bytecode interpreter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[allow(clippy::module_name_repetitions)]
pub enum VmError {
    /// The VM gas limit was exhausted
    #[error("vm out of gas")]
    OutOfGas,

    /// The contract aborted or trapped
    #[error("{0}")]
    Execution(String),

    /// The code does not export the requested entry point
    #[error("entry point {0} not exported")]
    Unsupported(EntryPoint),
}
