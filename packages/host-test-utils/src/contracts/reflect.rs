//! A contract that dispatches whatever messages it is told to, and records the
//! replies it gets for them.

use cosmwasm_std::{from_json, to_json_vec, Binary};
use cw_ibc_host::{
    msg::{Reply, Response, SubMsg},
    store::{increment_u64, KvStore},
    types::{Env, MessageInfo},
    VmError,
};
use serde::{Deserialize, Serialize};

use super::json_error;
use crate::engine::MockContract;

/// Code bytes the reflect contract is usually registered under.
pub const REFLECT_CODE: &[u8] = b"reflect";

/// Number of replies received.
pub const REPLY_COUNT_KEY: &str = "replies";

/// Storage key of the reply for sub-message `id`.
#[must_use]
pub fn reply_key(id: u64) -> String {
    format!("reply/{id}")
}

/// What the reflect contract sets as data when replying to `id`.
#[must_use]
pub fn reply_data(id: u64) -> Binary {
    Binary::from(format!("reply-{id}").into_bytes())
}

/// Execute messages of the reflect contract.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReflectExecute {
    /// Dispatch the messages in order
    Dispatch {
        /// The messages
        messages: Vec<SubMsg>,
        /// Data to return
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Binary>,
    },
}

/// Dispatches messages on request.
#[derive(Clone, Copy, Debug, Default)]
pub struct Reflect;

impl MockContract for Reflect {
    fn execute(
        &self,
        _store: &mut dyn KvStore,
        _env: &Env,
        _info: &MessageInfo,
        msg: &[u8],
    ) -> Result<Response, VmError> {
        let ReflectExecute::Dispatch { messages, data } =
            from_json::<ReflectExecute>(msg).map_err(json_error)?;
        let mut response = messages
            .into_iter()
            .fold(Response::new(), Response::add_submessage)
            .add_attribute("action", "dispatch");
        if let Some(data) = data {
            response = response.set_data(data);
        }
        Ok(response)
    }

    fn reply(&self, store: &mut dyn KvStore, _env: &Env, reply: &Reply) -> Result<Response, VmError> {
        store.set(
            reply_key(reply.id).as_bytes(),
            &to_json_vec(reply).map_err(json_error)?,
        );
        increment_u64(store, REPLY_COUNT_KEY.as_bytes());
        Ok(Response::new().set_data(reply_data(reply.id)))
    }
}
