//! Defines the [`Keeper`], the entry point of the contract host, and the
//! [`KeeperBuilder`] used to configure it.

use cosmwasm_std::Binary;
use tracing::{debug, info, instrument};

use crate::{
    config::HostConfig,
    context::Context,
    dispatch::{self, default_handlers, MessageHandler},
    error::HostError,
    events::contract_events,
    gas::GasRegister,
    msg::{Reply, Response},
    port,
    store::{increment_u64, KvStore, PrefixStore},
    types::{CodeInfo, ContractId, ContractInfo, Env, MessageInfo},
    vm::{EntryPoint, Instance, VmOutput, WasmEngine},
};

const CODE_SEQUENCE_KEY: &[u8] = b"sequence/code_id";
const INSTANCE_SEQUENCE_KEY: &[u8] = b"sequence/instance_id";

fn code_key(code_id: u64) -> Vec<u8> {
    format!("codes/{code_id}").into_bytes()
}

fn contract_key(address: &str) -> Vec<u8> {
    format!("contracts/{address}").into_bytes()
}

/// The storage partition owned by the contract at `address`.
pub fn contract_store<'a>(store: &'a mut dyn KvStore, address: &str) -> PrefixStore<'a> {
    PrefixStore::new(store, format!("contract/{address}").as_bytes())
}

/// Runs contracts: stores code, instantiates and calls contracts, and feeds
/// their responses through the dispatch chain.
pub struct Keeper {
    engine: Box<dyn WasmEngine>,
    gas: GasRegister,
    config: HostConfig,
    handlers: Vec<Box<dyn MessageHandler>>,
}

/// Builds a [`Keeper`].
#[allow(clippy::module_name_repetitions)]
pub struct KeeperBuilder {
    engine: Box<dyn WasmEngine>,
    config: HostConfig,
    gas: Option<GasRegister>,
    handlers: Vec<Box<dyn MessageHandler>>,
}

impl KeeperBuilder {
    /// Use the given configuration.
    #[must_use]
    pub fn with_config(mut self, config: HostConfig) -> Self {
        self.config = config;
        self
    }

    /// Price with the given register instead of the configured cost model.
    #[must_use]
    pub fn with_gas_register(mut self, gas: GasRegister) -> Self {
        self.gas = Some(gas);
        self
    }

    /// Add a handler that is consulted before the default ones.
    ///
    /// Handlers added earlier are consulted first.
    #[must_use]
    pub fn with_message_handler(mut self, handler: impl MessageHandler + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    /// Build the keeper.
    /// # Errors
    /// Returns [`HostError::InvalidConfig`] if the configuration is invalid.
    pub fn build(self) -> Result<Keeper, HostError> {
        self.config.validate()?;
        let gas = match self.gas {
            Some(gas) => gas,
            None => GasRegister::new(self.config.gas)?,
        };

        let mut handlers = self.handlers;
        handlers.extend(default_handlers());
        Ok(Keeper {
            engine: self.engine,
            gas,
            config: self.config,
            handlers,
        })
    }
}

impl Keeper {
    /// Create a keeper with the default configuration.
    #[must_use]
    pub fn new(engine: impl WasmEngine + 'static) -> Self {
        Self {
            engine: Box::new(engine),
            gas: GasRegister::default(),
            config: HostConfig::default(),
            handlers: default_handlers(),
        }
    }

    /// Start building a keeper around `engine`.
    #[must_use]
    pub fn builder(engine: impl WasmEngine + 'static) -> KeeperBuilder {
        KeeperBuilder {
            engine: Box::new(engine),
            config: HostConfig::default(),
            gas: None,
            handlers: Vec::new(),
        }
    }

    /// The gas register.
    #[must_use]
    pub const fn gas_register(&self) -> &GasRegister {
        &self.gas
    }

    /// The configuration.
    #[must_use]
    pub const fn config(&self) -> &HostConfig {
        &self.config
    }

    pub(crate) fn handlers(&self) -> &[Box<dyn MessageHandler>] {
        &self.handlers
    }

    /// Compile and store code, returning its code id.
    /// # Errors
    /// Returns an error if gas runs out or the VM rejects the code.
    #[instrument(skip_all, fields(creator = %creator, len = wasm.len()))]
    pub fn store_code(
        &self,
        ctx: &mut Context<'_>,
        creator: &str,
        wasm: &[u8],
    ) -> Result<u64, HostError> {
        ctx.gas_meter
            .consume(self.gas.compile_cost(wasm.len())?, "compiling wasm bytecode")?;
        let analysis = self
            .engine
            .store_code(wasm)
            .map_err(HostError::CodeRejected)?;

        let code_id = increment_u64(ctx.store, CODE_SEQUENCE_KEY);
        let info = CodeInfo {
            checksum: analysis.checksum,
            creator: creator.to_string(),
            pinned: false,
            ibc_enabled: analysis.has_ibc_entry_points,
        };
        ctx.store.set(&code_key(code_id), &serde_json::to_vec(&info)?);

        info!(code_id, checksum = %info.checksum, ibc = info.ibc_enabled, "code stored");
        Ok(code_id)
    }

    /// Returns the metadata of stored code.
    /// # Errors
    /// Returns [`HostError::CodeNotFound`] if no code is stored under the id.
    pub fn code_info(&self, store: &dyn KvStore, code_id: u64) -> Result<CodeInfo, HostError> {
        let bz = store
            .get(&code_key(code_id))
            .ok_or(HostError::CodeNotFound(code_id))?;
        Ok(serde_json::from_slice(&bz)?)
    }

    /// Returns the metadata of a contract instance.
    /// # Errors
    /// Returns [`HostError::ContractNotFound`] if no contract has the address.
    pub fn contract_info(
        &self,
        store: &dyn KvStore,
        address: &str,
    ) -> Result<ContractInfo, HostError> {
        let bz = store
            .get(&contract_key(address))
            .ok_or_else(|| HostError::ContractNotFound(address.to_string()))?;
        Ok(serde_json::from_slice(&bz)?)
    }

    /// Keep code loaded so that instances of it are not charged the instance cost.
    /// # Errors
    /// Returns [`HostError::CodeNotFound`] if no code is stored under the id.
    pub fn pin_code(&self, ctx: &mut Context<'_>, code_id: u64) -> Result<(), HostError> {
        self.set_pinned(ctx, code_id, true)
    }

    /// Undo [`Keeper::pin_code`].
    /// # Errors
    /// Returns [`HostError::CodeNotFound`] if no code is stored under the id.
    pub fn unpin_code(&self, ctx: &mut Context<'_>, code_id: u64) -> Result<(), HostError> {
        self.set_pinned(ctx, code_id, false)
    }

    fn set_pinned(&self, ctx: &mut Context<'_>, code_id: u64, pinned: bool) -> Result<(), HostError> {
        let mut info = self.code_info(ctx.store, code_id)?;
        info.pinned = pinned;
        ctx.store.set(&code_key(code_id), &serde_json::to_vec(&info)?);
        info!(code_id, pinned, "code pin state changed");
        Ok(())
    }

    /// Create a contract instance from stored code.
    ///
    /// Returns the new contract address and the data set by the contract.
    /// # Errors
    /// Returns an error if the code does not exist, the port cannot be bound,
    /// gas runs out, the contract fails or one of its messages fails.
    #[instrument(skip_all, fields(code_id = code_id, label = %label))]
    pub fn instantiate(
        &self,
        ctx: &mut Context<'_>,
        creator: &str,
        code_id: u64,
        msg: &[u8],
        label: &str,
    ) -> Result<(String, Option<Binary>), HostError> {
        self.nested(ctx, |ctx| {
            let code = self.code_info(ctx.store, code_id)?;
            let instance_id = increment_u64(ctx.store, INSTANCE_SEQUENCE_KEY);
            let id = ContractId::new(code_id, instance_id);

            let ibc_port_id = if code.ibc_enabled {
                Some(port::ensure_bound(ctx, id)?)
            } else {
                None
            };
            let contract = ContractInfo {
                id,
                address: id.address()?,
                creator: creator.to_string(),
                label: label.to_string(),
                ibc_port_id,
            };
            ctx.store.set(
                &contract_key(&contract.address),
                &serde_json::to_vec(&contract)?,
            );
            info!(
                address = %contract.address,
                port_id = ?contract.ibc_port_id,
                "contract instantiated"
            );

            let info = MessageInfo {
                sender: creator.to_string(),
            };
            let load_cost = self.gas.instantiate_cost(code.pinned, msg.len());
            let response = self.call(
                ctx,
                &contract,
                &code,
                EntryPoint::Instantiate,
                load_cost,
                |vm, instance| vm.instantiate(instance, &info, msg),
            )?;
            let data = self.handle_response(ctx, &contract, response)?;
            Ok((contract.address, data))
        })
    }

    /// Execute a contract.
    ///
    /// Returns the data set by the contract or by the last reply.
    /// # Errors
    /// Returns an error if the contract does not exist, gas runs out, the
    /// contract fails or one of its messages fails.
    #[instrument(skip_all, fields(contract = %contract_addr))]
    pub fn execute(
        &self,
        ctx: &mut Context<'_>,
        sender: &str,
        contract_addr: &str,
        msg: &[u8],
    ) -> Result<Option<Binary>, HostError> {
        self.nested(ctx, |ctx| {
            let contract = self.contract_info(ctx.store, contract_addr)?;
            let code = self.code_info(ctx.store, contract.id.code_id)?;

            let info = MessageInfo {
                sender: sender.to_string(),
            };
            let load_cost = self.gas.instantiate_cost(code.pinned, msg.len());
            let response = self.call(
                ctx,
                &contract,
                &code,
                EntryPoint::Execute,
                load_cost,
                |vm, instance| vm.execute(instance, &info, msg),
            )?;
            self.handle_response(ctx, &contract, response)
        })
    }

    /// Run a contract query.
    /// # Errors
    /// Returns an error if the contract does not exist, gas runs out or the
    /// query fails.
    #[instrument(skip_all, fields(contract = %contract_addr))]
    pub fn query_smart(
        &self,
        ctx: &mut Context<'_>,
        contract_addr: &str,
        msg: &[u8],
    ) -> Result<Binary, HostError> {
        let contract = self.contract_info(ctx.store, contract_addr)?;
        let code = self.code_info(ctx.store, contract.id.code_id)?;
        let load_cost = self.gas.instantiate_cost(code.pinned, msg.len());
        self.call(
            ctx,
            &contract,
            &code,
            EntryPoint::Query,
            load_cost,
            |vm, instance| vm.query(instance, msg),
        )
    }

    /// Read a raw key from a contract's storage.
    /// # Errors
    /// Returns [`HostError::ContractNotFound`] if no contract has the address.
    pub fn query_raw(
        &self,
        ctx: &mut Context<'_>,
        contract_addr: &str,
        key: &[u8],
    ) -> Result<Option<Binary>, HostError> {
        let contract = self.contract_info(ctx.store, contract_addr)?;
        let store = contract_store(&mut *ctx.store, &contract.address);
        Ok(store.get(key).map(Binary::from))
    }

    /// Hand a sub-message result back to the contract that sent it.
    pub(crate) fn reply(
        &self,
        ctx: &mut Context<'_>,
        contract: &ContractInfo,
        reply: &Reply,
    ) -> Result<Option<Binary>, HostError> {
        let code = self.code_info(ctx.store, contract.id.code_id)?;
        // The sender is already loaded in this transaction.
        let load_cost = self.gas.reply_cost(true, reply)?;
        debug!(id = reply.id, contract = %contract.address, "replying");
        let response = self.call(
            ctx,
            contract,
            &code,
            EntryPoint::Reply,
            load_cost,
            |vm, instance| vm.reply(instance, reply),
        )?;
        self.handle_response(ctx, contract, response)
    }

    /// Bound the depth of contracts calling contracts.
    fn nested<T>(
        &self,
        ctx: &mut Context<'_>,
        f: impl FnOnce(&mut Context<'_>) -> Result<T, HostError>,
    ) -> Result<T, HostError> {
        if ctx.depth() >= self.config.max_call_depth {
            return Err(HostError::CallDepthExceeded(self.config.max_call_depth));
        }
        ctx.enter();
        let res = f(ctx);
        ctx.leave();
        res
    }

    /// Run one VM entry point with metering.
    ///
    /// Charges `load_cost`, gives the VM whatever gas is left and charges what
    /// the VM reports, whether or not the call succeeded.
    pub(crate) fn call<T>(
        &self,
        ctx: &mut Context<'_>,
        contract: &ContractInfo,
        code: &CodeInfo,
        entry_point: EntryPoint,
        load_cost: u64,
        run: impl FnOnce(&dyn WasmEngine, Instance<'_>) -> VmOutput<T>,
    ) -> Result<T, HostError> {
        ctx.gas_meter.consume(load_cost, "loading contract")?;
        // An unbounded meter has more gas than the VM can count.
        let gas_limit = self
            .gas
            .to_vm_gas(ctx.gas_meter.remaining())
            .unwrap_or(u64::MAX);
        let env = Env {
            block: ctx.block.clone(),
            contract_address: contract.address.clone(),
        };

        let output = {
            let mut store = contract_store(&mut *ctx.store, &contract.address);
            run(
                self.engine.as_ref(),
                Instance {
                    checksum: &code.checksum,
                    env: &env,
                    store: &mut store,
                    gas_limit,
                },
            )
        };
        debug!(%entry_point, vm_gas = output.gas_used, "vm call finished");

        ctx.gas_meter
            .consume(self.gas.from_vm_gas(output.gas_used), entry_point.as_str())?;
        output
            .result
            .map_err(|source| HostError::VmExecution { entry_point, source })
    }

    /// Charge for and emit the contract's events, then dispatch its messages.
    pub(crate) fn handle_response(
        &self,
        ctx: &mut Context<'_>,
        contract: &ContractInfo,
        response: Response,
    ) -> Result<Option<Binary>, HostError> {
        let mut event_gas = self.gas.event_costs(&response.attributes)?;
        for event in &response.events {
            event_gas = event_gas
                .checked_add(self.gas.event_costs(&event.attributes)?)
                .ok_or(HostError::GasOverflow("contract events"))?;
        }
        ctx.gas_meter.consume(event_gas, "contract events")?;
        ctx.events.extend(contract_events(
            &contract.address,
            &response.attributes,
            &response.events,
        )?);

        let reply_data = dispatch::dispatch_submessages(self, ctx, contract, response.messages)?;
        Ok(reply_data.or(response.data))
    }
}
