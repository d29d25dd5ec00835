//! A single in-memory chain running a [`Keeper`].

use cosmwasm_std::{Binary, Event};
use cw_ibc_host::{
    capability::CapabilityKeeper,
    gas::GasMeter,
    store::{KvStore, MemoryStore},
    types::BlockInfo,
    Context, HostError, Keeper,
};
use serde::Serialize;

use crate::{bank::MockBank, ibc_core::IbcCore, store::CachedStore};

/// Gas limit of every transaction unless configured otherwise.
pub const DEFAULT_TX_GAS_LIMIT: u64 = 10_000_000;
/// Height of the first block.
pub const GENESIS_HEIGHT: u64 = 1;
/// Time of the first block, nanoseconds since the unix epoch.
pub const GENESIS_TIME_NANOS: u64 = 1_700_000_000_000_000_000;
/// Time between two blocks.
pub const BLOCK_TIME_NANOS: u64 = 5_000_000_000;

/// The outcome of a committed transaction.
#[derive(Debug)]
pub struct TxOutcome<T> {
    /// What the operation returned
    pub value: T,
    /// Events emitted by the transaction
    pub events: Vec<Event>,
    /// Ledger gas consumed
    pub gas_used: u64,
}

/// Everything a transaction may touch. Writes to `store` are buffered, the
/// other modules are restored from a snapshot if the transaction fails.
pub struct Tx<'a> {
    /// The buffered ledger store
    pub store: CachedStore<'a>,
    /// The capability authority
    pub capabilities: &'a mut CapabilityKeeper,
    /// The channel layer
    pub ibc: &'a mut IbcCore,
    /// The native token ledger
    pub bank: &'a mut MockBank,
    /// The block the transaction runs in
    pub block: BlockInfo,
    gas_limit: u64,
}

impl Tx<'_> {
    /// A host context with every module installed.
    pub fn context(&mut self) -> Context<'_> {
        Context::new(
            &mut self.store,
            GasMeter::new(self.gas_limit),
            self.block.clone(),
        )
        .with_capabilities(&mut *self.capabilities)
        .with_channels(&mut *self.ibc)
        .with_native(&mut *self.bank)
    }
}

/// An in-memory chain: a ledger store, a capability authority, a channel
/// layer and a bank around one [`Keeper`].
pub struct TestChain {
    keeper: Keeper,
    store: MemoryStore,
    capabilities: CapabilityKeeper,
    ibc: IbcCore,
    bank: MockBank,
    block: BlockInfo,
    gas_limit: u64,
}

impl TestChain {
    /// Create a chain at genesis.
    #[must_use]
    pub fn new(chain_id: &str, keeper: Keeper) -> Self {
        Self {
            keeper,
            store: MemoryStore::new(),
            capabilities: CapabilityKeeper::new(),
            ibc: IbcCore::new(),
            bank: MockBank::new(),
            block: BlockInfo {
                height: GENESIS_HEIGHT,
                time_nanos: GENESIS_TIME_NANOS,
                chain_id: chain_id.to_string(),
            },
            gas_limit: DEFAULT_TX_GAS_LIMIT,
        }
    }

    /// Use `gas_limit` for every following transaction.
    #[must_use]
    pub const fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = gas_limit;
        self
    }

    /// The chain id.
    #[must_use]
    pub fn chain_id(&self) -> &str {
        &self.block.chain_id
    }

    /// The current block.
    #[must_use]
    pub const fn block(&self) -> &BlockInfo {
        &self.block
    }

    /// The channel layer.
    #[must_use]
    pub const fn ibc(&self) -> &IbcCore {
        &self.ibc
    }

    /// The capability authority.
    #[must_use]
    pub const fn capabilities(&self) -> &CapabilityKeeper {
        &self.capabilities
    }

    /// The native token ledger.
    #[must_use]
    pub const fn bank(&self) -> &MockBank {
        &self.bank
    }

    /// The native token ledger, for funding accounts outside a transaction.
    pub fn bank_mut(&mut self) -> &mut MockBank {
        &mut self.bank
    }

    /// Advance by `n` blocks.
    pub fn advance_blocks(&mut self, n: u64) {
        self.block.height += n;
        self.block.time_nanos += n * BLOCK_TIME_NANOS;
    }

    /// Run `f` as a transaction with access to every module. Nothing `f`
    /// changed survives if it fails.
    /// # Errors
    /// Returns whatever `f` fails with.
    pub fn transact_raw<T, E>(
        &mut self,
        f: impl FnOnce(&Keeper, &mut Tx<'_>) -> Result<T, E>,
    ) -> Result<T, E> {
        let snapshot = (
            self.capabilities.clone(),
            self.ibc.clone(),
            self.bank.clone(),
        );
        let mut tx = Tx {
            store: CachedStore::new(&mut self.store),
            capabilities: &mut self.capabilities,
            ibc: &mut self.ibc,
            bank: &mut self.bank,
            block: self.block.clone(),
            gas_limit: self.gas_limit,
        };

        match f(&self.keeper, &mut tx) {
            Ok(value) => {
                tx.store.commit();
                Ok(value)
            }
            Err(err) => {
                drop(tx);
                (self.capabilities, self.ibc, self.bank) = snapshot;
                Err(err)
            }
        }
    }

    /// Run a host operation as a transaction.
    /// # Errors
    /// Returns the host error; nothing the operation changed is kept.
    pub fn transact<T>(
        &mut self,
        f: impl FnOnce(&Keeper, &mut Context<'_>) -> Result<T, HostError>,
    ) -> Result<TxOutcome<T>, HostError> {
        self.transact_raw(|keeper, tx| {
            let mut ctx = tx.context();
            let value = f(keeper, &mut ctx)?;
            Ok(TxOutcome {
                value,
                gas_used: ctx.gas_meter.consumed(),
                events: ctx.events,
            })
        })
    }

    /// Run a read only host operation. Writes are discarded.
    /// # Errors
    /// Returns the host error.
    pub fn query<T>(
        &mut self,
        f: impl FnOnce(&Keeper, &mut Context<'_>) -> Result<T, HostError>,
    ) -> Result<T, HostError> {
        let mut store = CachedStore::new(&mut self.store);
        let mut ctx = Context::new(
            &mut store,
            GasMeter::new(self.gas_limit),
            self.block.clone(),
        );
        f(&self.keeper, &mut ctx)
    }

    /// Store code and return its id.
    /// # Errors
    /// Returns the host error.
    pub fn store_code(&mut self, creator: &str, code: &[u8]) -> Result<u64, HostError> {
        self.transact(|keeper, ctx| keeper.store_code(ctx, creator, code))
            .map(|outcome| outcome.value)
    }

    /// Instantiate stored code with a JSON message and return the address.
    /// # Errors
    /// Returns the host error.
    pub fn instantiate(
        &mut self,
        creator: &str,
        code_id: u64,
        msg: &impl Serialize,
        label: &str,
    ) -> Result<String, HostError> {
        let msg = serde_json::to_vec(msg)?;
        self.transact(|keeper, ctx| keeper.instantiate(ctx, creator, code_id, &msg, label))
            .map(|outcome| outcome.value.0)
    }

    /// Execute a contract with a JSON message.
    /// # Errors
    /// Returns the host error.
    pub fn execute(
        &mut self,
        sender: &str,
        contract: &str,
        msg: &impl Serialize,
    ) -> Result<TxOutcome<Option<Binary>>, HostError> {
        let msg = serde_json::to_vec(msg)?;
        self.transact(|keeper, ctx| keeper.execute(ctx, sender, contract, &msg))
    }

    /// Read a big endian counter from a contract's storage.
    /// # Errors
    /// Returns the host error.
    pub fn query_counter(&mut self, contract: &str, key: &str) -> Result<Option<u64>, HostError> {
        let raw = self.query(|keeper, ctx| keeper.query_raw(ctx, contract, key.as_bytes()))?;
        Ok(raw.and_then(|bz| <[u8; 8]>::try_from(bz.as_slice()).ok().map(u64::from_be_bytes)))
    }

    /// Read a raw key from the committed ledger store.
    #[must_use]
    pub fn raw_get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.store.get(key)
    }
}
