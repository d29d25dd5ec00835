//! Sub-message dispatch: ordering, failure, replies and the handler chain.

mod common;

use cosmwasm_std::{from_json, Binary, Event, IbcTimeout, IbcTimeoutBlock};
use cw_ibc_host::{
    dispatch::{Dispatched, MessageHandler},
    events::{CONTRACT_ADDRESS_KEY, WASM_EVENT},
    gas::GasMeter,
    msg::{BankMsg, Coin, HostMsg, IbcMsg, Reply, SubMsg, SubMsgResult},
    store::MemoryStore,
    types::{BlockInfo, ContractInfo},
    Context, HostError, Keeper, VmError,
};
use cw_ibc_host_test_utils::contracts::reflect::{
    reply_data, reply_key, ReflectExecute, REFLECT_CODE, REPLY_COUNT_KEY,
};

use common::{
    dispatch, engine, fail_after, probe_msg, setup, setup_with, write, CallLog, ProbeMsg, CREATOR,
};

const DENOM: &str = "ucosm";

fn bank_send(to: &str, amount: u128) -> SubMsg {
    SubMsg::new(
        BankMsg::Send {
            to_address: to.to_string(),
            amount: vec![Coin {
                denom: DENOM.to_string(),
                amount,
            }],
        }
        .into(),
    )
}

#[test]
fn test_messages_run_in_order() {
    let mut setup = setup();
    let (reflect, probe) = (setup.reflect.clone(), setup.probe.clone());
    setup.chain.bank_mut().mint(&reflect, DENOM, 100);

    let outcome = setup
        .chain
        .execute(
            CREATOR,
            &reflect,
            &dispatch(vec![
                write(&probe, "A"),
                bank_send("alice", 10),
                write(&probe, "C"),
            ]),
        )
        .unwrap();

    assert_eq!(vec!["A", "C"], setup.logged());
    assert_eq!(10, setup.chain.bank().balance("alice", DENOM));
    assert_eq!(90, setup.chain.bank().balance(&reflect, DENOM));

    // The sender's event comes first, then every message's events in order.
    let types: Vec<&str> = outcome.events.iter().map(|e| e.ty.as_str()).collect();
    assert_eq!(vec![WASM_EVENT, WASM_EVENT, "transfer", WASM_EVENT], types);
    let emitter = |event: &Event| event.attributes[0].value.clone();
    assert_eq!(reflect, emitter(&outcome.events[0]));
    assert_eq!(probe, emitter(&outcome.events[1]));
    assert_eq!(probe, emitter(&outcome.events[3]));
    assert_eq!(CONTRACT_ADDRESS_KEY, outcome.events[0].attributes[0].key);
}

#[test]
fn test_failure_aborts_and_rolls_back() {
    let mut setup = setup();
    let (reflect, probe) = (setup.reflect.clone(), setup.probe.clone());
    setup.chain.bank_mut().mint(&reflect, DENOM, 100);

    let err = setup
        .chain
        .execute(
            CREATOR,
            &reflect,
            &dispatch(vec![
                write(&probe, "A"),
                bank_send("alice", 10),
                fail_after(&probe, "B", "A"),
                write(&probe, "C"),
            ]),
        )
        .unwrap_err();

    match err {
        HostError::VmExecution { source, .. } => {
            assert_eq!(VmError::Execution("boom B".to_string()), source);
        }
        other => panic!("unexpected error: {other}"),
    }
    // B read what A wrote, C never ran, and nothing A or the bank transfer
    // did survived.
    assert_eq!(vec!["A", "B", "B saw A"], setup.logged());
    assert!(!setup.probe_has("A"));
    assert_eq!(0, setup.chain.bank().balance("alice", DENOM));
    assert_eq!(100, setup.chain.bank().balance(&reflect, DENOM));
}

#[test]
fn test_insufficient_funds() {
    let mut setup = setup();
    let reflect = setup.reflect.clone();

    let err = setup
        .chain
        .execute(CREATOR, &reflect, &dispatch(vec![bank_send("alice", 1)]))
        .unwrap_err();
    assert!(matches!(err, HostError::NativeMessage(_)));
}

#[test]
fn test_reply_on_success() {
    let mut setup = setup();
    let (reflect, probe) = (setup.reflect.clone(), setup.probe.clone());
    let msg = probe_msg(
        &probe,
        &ProbeMsg::Write {
            tag: "X".to_string(),
        },
    );

    let outcome = setup
        .chain
        .execute(
            CREATOR,
            &reflect,
            &ReflectExecute::Dispatch {
                messages: vec![SubMsg::reply_on_success(msg, 7)],
                data: Some(Binary::from(b"own".to_vec())),
            },
        )
        .unwrap();
    // Data set by the reply replaces the contract's own data.
    assert_eq!(Some(reply_data(7)), outcome.value);

    let stored = setup
        .chain
        .query(|keeper, ctx| keeper.query_raw(ctx, &reflect, reply_key(7).as_bytes()))
        .unwrap()
        .unwrap();
    let reply: Reply = from_json(&stored).unwrap();
    assert_eq!(7, reply.id);
    let SubMsgResult::Ok(response) = reply.result else {
        panic!("expected a successful reply");
    };
    assert_eq!(Some(Binary::from(b"probe-X".to_vec())), response.data);
    assert_eq!(1, response.events.len());
    assert_eq!(WASM_EVENT, response.events[0].ty);
    assert_eq!(probe, response.events[0].attributes[0].value);

    assert_eq!(Some(1), setup.chain.query_counter(&reflect, REPLY_COUNT_KEY).unwrap());
}

#[test]
fn test_no_reply_keeps_own_data() {
    let mut setup = setup();
    let (reflect, probe) = (setup.reflect.clone(), setup.probe.clone());

    let outcome = setup
        .chain
        .execute(
            CREATOR,
            &reflect,
            &ReflectExecute::Dispatch {
                messages: vec![write(&probe, "X")],
                data: Some(Binary::from(b"own".to_vec())),
            },
        )
        .unwrap();
    assert_eq!(Some(Binary::from(b"own".to_vec())), outcome.value);
    assert_eq!(None, setup.chain.query_counter(&reflect, REPLY_COUNT_KEY).unwrap());
}

#[test]
fn test_custom_message_unrecognized_by_default() {
    let mut setup = setup();
    let reflect = setup.reflect.clone();

    let err = setup
        .chain
        .execute(
            CREATOR,
            &reflect,
            &dispatch(vec![SubMsg::new(HostMsg::Custom(Binary::from(b"hi".to_vec())))]),
        )
        .unwrap_err();
    assert!(matches!(err, HostError::UnrecognizedMessageType(ref kind) if kind == "custom"));
}

struct CustomHandler {
    seen: CallLog,
}

impl MessageHandler for CustomHandler {
    fn dispatch(
        &self,
        _keeper: &Keeper,
        ctx: &mut Context<'_>,
        sender: &ContractInfo,
        msg: &HostMsg,
    ) -> Result<Dispatched, HostError> {
        self.seen.borrow_mut().push(msg.kind().to_string());
        let HostMsg::Custom(payload) = msg else {
            return Ok(Dispatched::Skipped);
        };
        ctx.events.push(
            Event::new("custom")
                .add_attribute("sender", &sender.address)
                .add_attribute("payload", String::from_utf8_lossy(payload.as_slice())),
        );
        Ok(Dispatched::Done {
            data: Some(payload.clone()),
        })
    }
}

#[test]
fn test_installed_handler_runs_first() {
    let seen = CallLog::default();
    let handler = CustomHandler { seen: seen.clone() };
    let mut setup = setup_with(|engine| {
        Keeper::builder(engine)
            .with_message_handler(handler)
            .build()
            .unwrap()
    });
    let (reflect, probe) = (setup.reflect.clone(), setup.probe.clone());

    let custom = HostMsg::Custom(Binary::from(b"hello".to_vec()));
    let outcome = setup
        .chain
        .execute(
            CREATOR,
            &reflect,
            &dispatch(vec![
                SubMsg::reply_on_success(custom, 1),
                write(&probe, "A"),
            ]),
        )
        .unwrap();

    assert_eq!(vec!["custom", "wasm/execute"], *seen.borrow());
    assert_eq!(vec!["A"], setup.logged());
    assert!(outcome.events.iter().any(|e| e.ty == "custom"));

    let stored = setup
        .chain
        .query(|keeper, ctx| keeper.query_raw(ctx, &reflect, reply_key(1).as_bytes()))
        .unwrap()
        .unwrap();
    let reply: Reply = from_json(&stored).unwrap();
    let SubMsgResult::Ok(response) = reply.result else {
        panic!("expected a successful reply");
    };
    assert_eq!(Some(Binary::from(b"hello".to_vec())), response.data);
    assert_eq!("custom", response.events[0].ty);
}

#[test]
fn test_ibc_message_needs_a_port() {
    let mut setup = setup();
    let reflect = setup.reflect.clone();
    let send = IbcMsg::SendPacket {
        channel_id: "channel-0".to_string(),
        data: Binary::from(b"{}".to_vec()),
        timeout: IbcTimeout::with_block(IbcTimeoutBlock {
            revision: 0,
            height: 100,
        }),
    };

    let err = setup
        .chain
        .execute(CREATOR, &reflect, &dispatch(vec![SubMsg::new(send.into())]))
        .unwrap_err();
    assert!(matches!(err, HostError::NoIbcPort(ref addr) if *addr == reflect));
}

#[test]
fn test_bank_message_without_native_router() {
    let log = CallLog::default();
    let keeper = Keeper::new(engine(&log));
    let mut store = MemoryStore::new();
    let mut ctx = Context::new(&mut store, GasMeter::new(10_000_000), BlockInfo::default());

    let code_id = keeper.store_code(&mut ctx, CREATOR, REFLECT_CODE).unwrap();
    let (reflect, _) = keeper
        .instantiate(&mut ctx, CREATOR, code_id, b"{}", "reflect")
        .unwrap();
    let msg = serde_json::to_vec(&dispatch(vec![bank_send("alice", 1)])).unwrap();

    let err = keeper
        .execute(&mut ctx, CREATOR, &reflect, &msg)
        .unwrap_err();
    assert!(matches!(err, HostError::UnrecognizedMessageType(ref kind) if kind == "bank"));
}

#[test]
fn test_reserved_attribute_rejected() {
    let mut setup = setup();
    let probe = setup.probe.clone();

    let err = setup
        .chain
        .execute(
            CREATOR,
            &probe,
            &ProbeMsg::Attribute {
                key: "_contract_address".to_string(),
                value: "forged".to_string(),
            },
        )
        .unwrap_err();
    assert!(matches!(err, HostError::InvalidEvent(_)));
}
