//! The per-transaction context every host operation runs in.

use cosmwasm_std::Event;

use crate::{
    capability::CapabilityKeeper, dispatch::NativeRouter, gas::GasMeter, ibc::ChannelKeeper,
    store::KvStore, types::BlockInfo,
};

/// Mutable transaction state handed to every host operation.
///
/// The keeper itself is immutable; everything an operation may change lives
/// here. Collaborators that are not installed are `None`: without a
/// capability authority ports are derived but not bound, without a channel
/// keeper IBC messages cannot be sent, and without a native router native
/// messages are not recognized.
pub struct Context<'a> {
    /// The ledger store for this transaction
    pub store: &'a mut dyn KvStore,
    /// Ledger gas meter for this transaction
    pub gas_meter: GasMeter,
    /// The block the transaction runs in
    pub block: BlockInfo,
    /// The capability authority
    pub capabilities: Option<&'a mut CapabilityKeeper>,
    /// The channel layer
    pub channels: Option<&'a mut dyn ChannelKeeper>,
    /// Router for native messages
    pub native: Option<&'a mut dyn NativeRouter>,
    /// Events emitted so far, in order
    pub events: Vec<Event>,
    depth: u32,
}

impl<'a> Context<'a> {
    /// Create a context without optional collaborators.
    pub fn new(store: &'a mut dyn KvStore, gas_meter: GasMeter, block: BlockInfo) -> Self {
        Self {
            store,
            gas_meter,
            block,
            capabilities: None,
            channels: None,
            native: None,
            events: Vec::new(),
            depth: 0,
        }
    }

    /// Install the capability authority.
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: &'a mut CapabilityKeeper) -> Self {
        self.capabilities = Some(capabilities);
        self
    }

    /// Install the channel layer.
    #[must_use]
    pub fn with_channels(mut self, channels: &'a mut dyn ChannelKeeper) -> Self {
        self.channels = Some(channels);
        self
    }

    /// Install the native message router.
    #[must_use]
    pub fn with_native(mut self, native: &'a mut dyn NativeRouter) -> Self {
        self.native = Some(native);
        self
    }

    /// Current contract call depth.
    #[must_use]
    pub const fn depth(&self) -> u32 {
        self.depth
    }

    pub(crate) fn enter(&mut self) {
        self.depth += 1;
    }

    pub(crate) fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Events emitted since `start`.
    pub(crate) fn events_since(&self, start: usize) -> Vec<Event> {
        self.events.get(start..).map(<[Event]>::to_vec).unwrap_or_default()
    }
}
