//! Contracts and setup shared by the keeper tests.

#![allow(dead_code)]

use std::{cell::RefCell, rc::Rc};

use cosmwasm_std::{from_json, to_json_binary};
use cw_ibc_host::{
    msg::{HostMsg, Response, SubMsg, WasmMsg},
    store::KvStore,
    types::{Env, MessageInfo},
    Keeper, VmError,
};
use cw_ibc_host_test_utils::{
    chain::TestChain,
    contracts::reflect::{Reflect, ReflectExecute, REFLECT_CODE},
    engine::{MockContract, MockEngine},
    logging::init_tracing,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

pub const CREATOR: &str = "creator";
pub const PROBE_CODE: &[u8] = b"probe";
pub const RECURSOR_CODE: &[u8] = b"recursor";
pub const HUNGRY_CODE: &[u8] = b"hungry";

/// Calls observed by the test contracts, in order.
pub type CallLog = Rc<RefCell<Vec<String>>>;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeMsg {
    Write { tag: String },
    Fail {
        tag: String,
        /// A tag an earlier message must already have written.
        #[serde(default)]
        seen: Option<String>,
    },
    Attribute { key: String, value: String },
}

/// Logs every execution and writes a marker into its storage.
pub struct Probe {
    pub log: CallLog,
}

impl MockContract for Probe {
    fn execute(
        &self,
        store: &mut dyn KvStore,
        _env: &Env,
        _info: &MessageInfo,
        msg: &[u8],
    ) -> Result<Response, VmError> {
        match from_json::<ProbeMsg>(msg).map_err(|e| VmError::Execution(e.to_string()))? {
            ProbeMsg::Write { tag } => {
                self.log.borrow_mut().push(tag.clone());
                store.set(format!("tag/{tag}").as_bytes(), b"1");
                Ok(Response::new()
                    .add_attribute("tag", tag.clone())
                    .set_data(format!("probe-{tag}").into_bytes()))
            }
            ProbeMsg::Fail { tag, seen } => {
                self.log.borrow_mut().push(tag.clone());
                if let Some(prev) = seen {
                    if store.get(format!("tag/{prev}").as_bytes()).is_none() {
                        return Err(VmError::Execution(format!("{tag} missing {prev}")));
                    }
                    self.log.borrow_mut().push(format!("{tag} saw {prev}"));
                }
                Err(VmError::Execution(format!("boom {tag}")))
            }
            ProbeMsg::Attribute { key, value } => Ok(Response::new().add_attribute(key, value)),
        }
    }
}

/// Calls itself with the message it received.
pub struct Recursor {
    pub log: CallLog,
}

impl MockContract for Recursor {
    fn execute(
        &self,
        _store: &mut dyn KvStore,
        env: &Env,
        _info: &MessageInfo,
        msg: &[u8],
    ) -> Result<Response, VmError> {
        self.log.borrow_mut().push(env.contract_address.clone());
        Ok(Response::new().add_message(WasmMsg::Execute {
            contract_addr: env.contract_address.clone(),
            msg: msg.to_vec().into(),
        }))
    }
}

/// Needs more VM gas than any transaction has.
pub struct Hungry;

impl MockContract for Hungry {
    fn gas_per_call(&self) -> u64 {
        u64::MAX
    }
}

pub fn engine(log: &CallLog) -> MockEngine {
    MockEngine::new()
        .with_contract(REFLECT_CODE, Reflect)
        .with_contract(PROBE_CODE, Probe { log: log.clone() })
        .with_contract(RECURSOR_CODE, Recursor { log: log.clone() })
        .with_contract(HUNGRY_CODE, Hungry)
}

pub struct Setup {
    pub chain: TestChain,
    pub reflect: String,
    pub probe: String,
    pub log: CallLog,
}

pub fn setup() -> Setup {
    setup_with(|engine| Keeper::new(engine))
}

pub fn setup_with(build: impl FnOnce(MockEngine) -> Keeper) -> Setup {
    init_tracing();
    let log = CallLog::default();
    let mut chain = TestChain::new("chain-a", build(engine(&log)));
    let reflect = deploy(&mut chain, REFLECT_CODE);
    let probe = deploy(&mut chain, PROBE_CODE);
    Setup {
        chain,
        reflect,
        probe,
        log,
    }
}

pub fn deploy(chain: &mut TestChain, code: &[u8]) -> String {
    let code_id = chain.store_code(CREATOR, code).unwrap();
    chain
        .instantiate(CREATOR, code_id, &json!({}), "test")
        .unwrap()
}

pub fn probe_msg(probe: &str, msg: &ProbeMsg) -> HostMsg {
    WasmMsg::Execute {
        contract_addr: probe.to_string(),
        msg: to_json_binary(msg).unwrap(),
    }
    .into()
}

pub fn write(probe: &str, tag: &str) -> SubMsg {
    SubMsg::new(probe_msg(
        probe,
        &ProbeMsg::Write {
            tag: tag.to_string(),
        },
    ))
}

/// Fails after checking that `seen` was written earlier in the transaction.
pub fn fail_after(probe: &str, tag: &str, seen: &str) -> SubMsg {
    SubMsg::new(probe_msg(
        probe,
        &ProbeMsg::Fail {
            tag: tag.to_string(),
            seen: Some(seen.to_string()),
        },
    ))
}

pub fn dispatch(messages: Vec<SubMsg>) -> ReflectExecute {
    ReflectExecute::Dispatch {
        messages,
        data: None,
    }
}

impl Setup {
    pub fn logged(&self) -> Vec<String> {
        self.log.borrow().clone()
    }

    pub fn probe_has(&mut self, tag: &str) -> bool {
        let probe = self.probe.clone();
        self.chain
            .query(|keeper, ctx| keeper.query_raw(ctx, &probe, format!("tag/{tag}").as_bytes()))
            .unwrap()
            .is_some()
    }
}
