//! A ping-pong player: each received ball is answered with the next higher
//! ball until the configured maximum is exceeded.

use std::collections::BTreeMap;

use cosmwasm_std::{
    from_json, to_json_binary, Binary, IbcChannel, IbcPacket, IbcTimeout, IbcTimeoutBlock,
};
use cw_ibc_host::{
    msg::{ChannelOpenResponse, IbcMsg, PacketReceiveResponse, Response},
    store::{get_u64, increment_u64, set_u64, KvStore},
    types::{Env, MessageInfo},
    vm::PacketAck,
    VmError,
};
use serde::{Deserialize, Serialize};

use super::json_error;
use crate::engine::MockContract;

/// The player starting the game.
pub const PING: &str = "ping";
/// The player answering.
pub const PONG: &str = "pong";

/// Height at which balls time out unless the game sets its own.
pub const DEFAULT_TIMEOUT_HEIGHT: u64 = 110_000;

/// Stored maximum ball value; no limit when absent.
pub const MAX_VALUE_KEY: &str = "max-value";
/// Value of the last ball this player sent.
pub const LAST_BALL_SENT_KEY: &str = "lastBallSent";
/// Value of the last ball this player received.
pub const LAST_BALL_RECEIVED_KEY: &str = "lastBallReceived";
/// Number of balls sent.
pub const SENT_BALLS_KEY: &str = "sentBalls";
/// Number of balls received.
pub const RECEIVED_BALLS_KEY: &str = "recvBalls";
/// Number of acknowledgements received.
pub const CONFIRMED_BALLS_KEY: &str = "confBalls";
/// Number of sent balls that timed out.
pub const TIMED_OUT_BALLS_KEY: &str = "timedOutBalls";
/// Timeout height of the current game.
const TIMEOUT_HEIGHT_KEY: &str = "timeout-height";

/// Starts a game.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartGame {
    /// The local channel to play on
    pub channel_id: String,
    /// Value of the first ball
    pub value: u64,
    /// Balls above this value are answered with an error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<u64>,
    /// Timeout height of every ball sent in this game
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_height: Option<u64>,
}

/// Execute messages of a player.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerExecute {
    /// Serve the first ball
    StartGame(StartGame),
    /// Close the channel the game is played on
    EndGame {
        /// The local channel
        channel_id: String,
    },
}

/// Queries a player answers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerQuery {
    /// Read one of the counters; absent counters read as zero
    Counter {
        /// The counter key
        key: String,
    },
}

/// A ball in flight: the sending player's actor name mapped to the value.
pub type Hit = BTreeMap<String, u64>;

/// The acknowledgement a player writes for a received ball.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitAcknowledgement {
    /// Why the ball was not played back
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// The ball that was received
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<Hit>,
}

/// One side of the game.
#[derive(Clone, Debug)]
pub struct Player {
    actor: String,
}

impl Player {
    /// A player playing as `actor`.
    #[must_use]
    pub fn new(actor: &str) -> Self {
        Self {
            actor: actor.to_string(),
        }
    }

    /// Code bytes this player is registered under.
    #[must_use]
    pub fn code(&self) -> Vec<u8> {
        format!("player:{}", self.actor).into_bytes()
    }

    /// The actor the other side plays as.
    #[must_use]
    pub fn counterparty(&self) -> &'static str {
        if self.actor == PING {
            PONG
        } else {
            PING
        }
    }

    fn hit(&self, value: u64) -> Result<Binary, VmError> {
        to_json_binary(&Hit::from([(self.actor.clone(), value)])).map_err(json_error)
    }

    fn ball_timeout(store: &dyn KvStore) -> IbcTimeout {
        let height =
            get_u64(store, TIMEOUT_HEIGHT_KEY.as_bytes()).unwrap_or(DEFAULT_TIMEOUT_HEIGHT);
        IbcTimeout::with_block(IbcTimeoutBlock {
            revision: 0,
            height,
        })
    }

    fn error_ack(error: String) -> Result<Binary, VmError> {
        to_json_binary(&HitAcknowledgement {
            error: Some(error),
            success: None,
        })
        .map_err(json_error)
    }
}

impl MockContract for Player {
    fn has_ibc_entry_points(&self) -> bool {
        true
    }

    fn execute(
        &self,
        store: &mut dyn KvStore,
        _env: &Env,
        _info: &MessageInfo,
        msg: &[u8],
    ) -> Result<Response, VmError> {
        let start = match from_json::<PlayerExecute>(msg).map_err(json_error)? {
            PlayerExecute::StartGame(start) => start,
            PlayerExecute::EndGame { channel_id } => {
                return Ok(Response::new()
                    .add_message(IbcMsg::CloseChannel { channel_id })
                    .add_attribute("action", "end_game"));
            }
        };
        if let Some(max_value) = start.max_value {
            set_u64(store, MAX_VALUE_KEY.as_bytes(), max_value);
        }
        if let Some(height) = start.timeout_height {
            set_u64(store, TIMEOUT_HEIGHT_KEY.as_bytes(), height);
        }

        let send = IbcMsg::SendPacket {
            channel_id: start.channel_id,
            data: self.hit(start.value)?,
            timeout: Self::ball_timeout(store),
        };
        increment_u64(store, SENT_BALLS_KEY.as_bytes());
        set_u64(store, LAST_BALL_SENT_KEY.as_bytes(), start.value);

        Ok(Response::new()
            .add_message(send)
            .add_attribute("action", "start_game")
            .add_attribute("value", start.value.to_string()))
    }

    fn query(&self, store: &dyn KvStore, _env: &Env, msg: &[u8]) -> Result<Binary, VmError> {
        let PlayerQuery::Counter { key } = from_json::<PlayerQuery>(msg).map_err(json_error)?;
        to_json_binary(&get_u64(store, key.as_bytes()).unwrap_or_default()).map_err(json_error)
    }

    fn ibc_channel_open(
        &self,
        _store: &mut dyn KvStore,
        _env: &Env,
        channel: &IbcChannel,
    ) -> Result<ChannelOpenResponse, VmError> {
        if channel.version != self.actor {
            return Ok(ChannelOpenResponse::reject(format!(
                "expected {:?} but got {:?}",
                self.actor, channel.version
            )));
        }
        Ok(ChannelOpenResponse::accept())
    }

    fn ibc_channel_connect(
        &self,
        _store: &mut dyn KvStore,
        _env: &Env,
        _channel: &IbcChannel,
    ) -> Result<Response, VmError> {
        Ok(Response::new())
    }

    fn ibc_channel_close(
        &self,
        _store: &mut dyn KvStore,
        _env: &Env,
        _channel: &IbcChannel,
    ) -> Result<Response, VmError> {
        Ok(Response::new())
    }

    fn ibc_packet_receive(
        &self,
        store: &mut dyn KvStore,
        _env: &Env,
        packet: &IbcPacket,
    ) -> Result<PacketReceiveResponse, VmError> {
        let received: Hit = match from_json(&packet.data) {
            Ok(hit) => hit,
            Err(err) => return Ok(PacketReceiveResponse::new(Self::error_ack(err.to_string())?)),
        };
        increment_u64(store, RECEIVED_BALLS_KEY.as_bytes());
        let value = received
            .get(self.counterparty())
            .copied()
            .unwrap_or_default();
        set_u64(store, LAST_BALL_RECEIVED_KEY.as_bytes(), value);

        if let Some(max_value) = get_u64(store, MAX_VALUE_KEY.as_bytes()) {
            if value > max_value {
                let error = format!("max value exceeded: {max_value} got {value}");
                return Ok(PacketReceiveResponse::new(Self::error_ack(error)?));
            }
        }

        let next = get_u64(store, LAST_BALL_SENT_KEY.as_bytes())
            .unwrap_or_default()
            .saturating_add(1);
        let send = IbcMsg::SendPacket {
            channel_id: packet.dest.channel_id.clone(),
            data: self.hit(next)?,
            timeout: Self::ball_timeout(store),
        };
        increment_u64(store, SENT_BALLS_KEY.as_bytes());
        set_u64(store, LAST_BALL_SENT_KEY.as_bytes(), next);

        let ack = to_json_binary(&HitAcknowledgement {
            error: None,
            success: Some(received),
        })
        .map_err(json_error)?;
        Ok(PacketReceiveResponse::new(ack)
            .add_message(send)
            .add_attribute("action", "receive_ball")
            .add_attribute("value", value.to_string()))
    }

    fn ibc_packet_ack(
        &self,
        store: &mut dyn KvStore,
        _env: &Env,
        ack: &PacketAck,
    ) -> Result<Response, VmError> {
        let _sent: Hit = from_json(&ack.original_packet.data).map_err(json_error)?;
        let acknowledgement: HitAcknowledgement =
            from_json(&ack.acknowledgement.data).map_err(json_error)?;
        increment_u64(store, CONFIRMED_BALLS_KEY.as_bytes());

        let outcome = if acknowledgement.error.is_some() {
            "error"
        } else {
            "success"
        };
        Ok(Response::new().add_attribute("ack", outcome))
    }

    fn ibc_packet_timeout(
        &self,
        store: &mut dyn KvStore,
        _env: &Env,
        _packet: &IbcPacket,
    ) -> Result<Response, VmError> {
        increment_u64(store, TIMED_OUT_BALLS_KEY.as_bytes());
        Ok(Response::new())
    }
}
