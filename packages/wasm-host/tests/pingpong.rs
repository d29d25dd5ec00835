//! Two chains playing ping-pong over a channel between two contract ports.

use cosmwasm_std::{from_json, IbcOrder};
use cw_ibc_host::{
    channel::list_pairs,
    events::SEND_PACKET_EVENT,
    keeper::contract_store,
    HostError, Keeper,
};
use cw_ibc_host_test_utils::{
    chain::TestChain,
    contracts::player::{
        HitAcknowledgement, Player, PlayerExecute, PlayerQuery, StartGame, CONFIRMED_BALLS_KEY,
        LAST_BALL_RECEIVED_KEY, LAST_BALL_SENT_KEY, PING, PONG, RECEIVED_BALLS_KEY,
        SENT_BALLS_KEY, TIMED_OUT_BALLS_KEY,
    },
    coordinator::{ChannelSetup, Coordinator, OpenChannel, Side},
    engine::MockEngine,
    ibc_core::ChannelState,
    logging::init_tracing,
};
use serde_json::json;

const CREATOR: &str = "creator";

struct Game {
    coordinator: Coordinator,
    ping: String,
    pong: String,
    ping_port: String,
    pong_port: String,
}

fn player_chain(chain_id: &str, actor: &str) -> (TestChain, String, String) {
    let player = Player::new(actor);
    let engine = MockEngine::new().with_contract(&player.code(), player.clone());
    let mut chain = TestChain::new(chain_id, Keeper::new(engine));

    let code_id = chain.store_code(CREATOR, &player.code()).unwrap();
    let address = chain
        .instantiate(CREATOR, code_id, &json!({}), actor)
        .unwrap();
    let port_id = chain
        .query(|keeper, ctx| keeper.contract_info(ctx.store, &address))
        .unwrap()
        .ibc_port_id
        .unwrap();
    (chain, address, port_id)
}

fn setup_players() -> Game {
    init_tracing();
    let (chain_a, ping, ping_port) = player_chain("chain-a", PING);
    let (chain_b, pong, pong_port) = player_chain("chain-b", PONG);
    Game {
        coordinator: Coordinator::new(chain_a, chain_b),
        ping,
        pong,
        ping_port,
        pong_port,
    }
}

impl Game {
    fn open_channel(&mut self) -> OpenChannel {
        self.coordinator
            .create_channel(
                &ChannelSetup {
                    port_id: &self.ping_port,
                    version: PING,
                },
                &ChannelSetup {
                    port_id: &self.pong_port,
                    version: PONG,
                },
                IbcOrder::Unordered,
            )
            .unwrap()
    }

    fn start(&mut self, start: StartGame) {
        let ping = self.ping.clone();
        self.coordinator
            .chain(Side::A)
            .execute(CREATOR, &ping, &PlayerExecute::StartGame(start))
            .unwrap();
    }

    fn ping_counter(&mut self, key: &str) -> u64 {
        let ping = self.ping.clone();
        counter(self.coordinator.chain(Side::A), &ping, key)
    }

    fn pong_counter(&mut self, key: &str) -> u64 {
        let pong = self.pong.clone();
        counter(self.coordinator.chain(Side::B), &pong, key)
    }
}

fn counter(chain: &mut TestChain, contract: &str, key: &str) -> u64 {
    chain
        .query_counter(contract, key)
        .unwrap()
        .unwrap_or_default()
}

fn start_game(channel_id: &str, value: u64) -> StartGame {
    StartGame {
        channel_id: channel_id.to_string(),
        value,
        max_value: None,
        timeout_height: None,
    }
}

#[test]
fn test_ball_is_played_back() {
    let mut game = setup_players();
    let channel = game.open_channel();

    game.start(start_game(&channel.a.channel_id, 100));
    assert_eq!(1, game.ping_counter(SENT_BALLS_KEY));
    assert_eq!(100, game.ping_counter(LAST_BALL_SENT_KEY));

    let pending = game.coordinator.pending_packets(Side::A);
    assert_eq!(1, pending.len());
    assert_eq!(br#"{"ping":100}"#.as_slice(), pending[0].data.as_slice());
    assert_eq!(channel.b, pending[0].dest);

    let ack = game.coordinator.relay_packet(Side::A).unwrap();
    let ack: HitAcknowledgement = from_json(&ack).unwrap();
    assert_eq!(None, ack.error);
    assert_eq!(Some(100), ack.success.unwrap().get(PING).copied());

    assert_eq!(1, game.pong_counter(RECEIVED_BALLS_KEY));
    assert_eq!(100, game.pong_counter(LAST_BALL_RECEIVED_KEY));
    assert_eq!(1, game.pong_counter(SENT_BALLS_KEY));
    assert_eq!(1, game.pong_counter(LAST_BALL_SENT_KEY));
    assert_eq!(1, game.ping_counter(CONFIRMED_BALLS_KEY));

    let pending = game.coordinator.pending_packets(Side::B);
    assert_eq!(1, pending.len());
    assert_eq!(br#"{"pong":1}"#.as_slice(), pending[0].data.as_slice());

    game.coordinator.relay_packet(Side::B).unwrap();
    assert_eq!(2, game.ping_counter(SENT_BALLS_KEY));
    assert_eq!(101, game.ping_counter(LAST_BALL_SENT_KEY));
    assert_eq!(1, game.ping_counter(LAST_BALL_RECEIVED_KEY));
    assert_eq!(1, game.pong_counter(CONFIRMED_BALLS_KEY));
}

#[test]
fn test_three_rounds() {
    let mut game = setup_players();
    let channel = game.open_channel();
    game.start(start_game(&channel.a.channel_id, 100));

    for _ in 0..3 {
        game.coordinator.relay_packet(Side::A).unwrap();
        game.coordinator.relay_packet(Side::B).unwrap();
    }

    assert_eq!(103, game.ping_counter(LAST_BALL_SENT_KEY));
    assert_eq!(3, game.ping_counter(LAST_BALL_RECEIVED_KEY));
    assert_eq!(4, game.ping_counter(SENT_BALLS_KEY));
    assert_eq!(3, game.ping_counter(RECEIVED_BALLS_KEY));
    assert_eq!(3, game.ping_counter(CONFIRMED_BALLS_KEY));

    assert_eq!(3, game.pong_counter(LAST_BALL_SENT_KEY));
    assert_eq!(102, game.pong_counter(LAST_BALL_RECEIVED_KEY));
    assert_eq!(3, game.pong_counter(SENT_BALLS_KEY));
    assert_eq!(3, game.pong_counter(RECEIVED_BALLS_KEY));
    assert_eq!(3, game.pong_counter(CONFIRMED_BALLS_KEY));

    // The fourth ping ball is still in flight.
    assert_eq!(1, game.coordinator.pending_packets(Side::A).len());
    assert!(game.coordinator.pending_packets(Side::B).is_empty());
}

#[test]
fn test_max_value_ends_the_rally() {
    let mut game = setup_players();
    let channel = game.open_channel();
    game.start(StartGame {
        max_value: Some(1),
        ..start_game(&channel.a.channel_id, 100)
    });

    game.coordinator.relay_packet(Side::A).unwrap();
    game.coordinator.relay_packet(Side::B).unwrap();
    game.coordinator.relay_packet(Side::A).unwrap();
    let ack = game.coordinator.relay_packet(Side::B).unwrap();

    let ack: HitAcknowledgement = from_json(&ack).unwrap();
    assert_eq!(Some("max value exceeded: 1 got 2".to_string()), ack.error);
    assert_eq!(None, ack.success);

    // The error acknowledgement is not answered with another ball.
    assert!(game.coordinator.pending_packets(Side::A).is_empty());
    assert!(game.coordinator.pending_packets(Side::B).is_empty());
    assert_eq!(2, game.ping_counter(RECEIVED_BALLS_KEY));
    assert_eq!(2, game.ping_counter(SENT_BALLS_KEY));
    assert_eq!(2, game.pong_counter(CONFIRMED_BALLS_KEY));
}

#[test]
fn test_relay_all_stops_when_idle() {
    let mut game = setup_players();
    let channel = game.open_channel();
    game.start(StartGame {
        max_value: Some(3),
        ..start_game(&channel.a.channel_id, 100)
    });

    // Pong plays 1, 2, 3 and 4; the fourth ball is refused.
    let relayed = game.coordinator.relay_all(100).unwrap();
    assert_eq!(8, relayed);
    assert_eq!(4, game.ping_counter(LAST_BALL_RECEIVED_KEY));
    assert_eq!(4, game.ping_counter(CONFIRMED_BALLS_KEY));
}

#[test]
fn test_channel_open_rejects_wrong_version() {
    let mut game = setup_players();
    let err = game
        .coordinator
        .create_channel(
            &ChannelSetup {
                port_id: &game.ping_port,
                version: PONG,
            },
            &ChannelSetup {
                port_id: &game.pong_port,
                version: PONG,
            },
            IbcOrder::Unordered,
        )
        .unwrap_err();

    match err.downcast_ref::<HostError>() {
        Some(HostError::ChannelOpenRejected(reason)) => {
            assert_eq!(r#"expected "ping" but got "pong""#, reason);
        }
        other => panic!("unexpected error: {other:?}"),
    }

    // The failed handshake step left nothing behind.
    let chain_a = game.coordinator.chain(Side::A);
    assert!(chain_a.ibc().channel_end(&game.ping_port, "channel-0").is_none());
    assert!(chain_a.ibc().pending_packets().is_empty());
}

#[test]
fn test_open_try_rejects_wrong_version() {
    let mut game = setup_players();
    let err = game
        .coordinator
        .create_channel(
            &ChannelSetup {
                port_id: &game.ping_port,
                version: PING,
            },
            &ChannelSetup {
                port_id: &game.pong_port,
                version: "ping-v2",
            },
            IbcOrder::Unordered,
        )
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<HostError>(),
        Some(HostError::ChannelOpenRejected(reason)) if reason == r#"expected "pong" but got "ping-v2""#
    ));
    // Chain A completed its step before chain B refused.
    let end = game
        .coordinator
        .chain(Side::A)
        .ibc()
        .channel_end(&game.ping_port, "channel-0")
        .cloned()
        .unwrap();
    assert_eq!(ChannelState::Init, end.state);
}

#[test]
fn test_send_packet_event() {
    let mut game = setup_players();
    let channel = game.open_channel();
    let ping = game.ping.clone();

    let outcome = game
        .coordinator
        .chain(Side::A)
        .execute(
            CREATOR,
            &ping,
            &PlayerExecute::StartGame(start_game(&channel.a.channel_id, 7)),
        )
        .unwrap();

    let event = outcome
        .events
        .iter()
        .find(|e| e.ty == SEND_PACKET_EVENT)
        .unwrap();
    let attr = |key: &str| {
        event
            .attributes
            .iter()
            .find(|a| a.key == key)
            .map(|a| a.value.clone())
            .unwrap()
    };
    assert_eq!(hex::encode(br#"{"ping":7}"#), attr("packet_data_hex"));
    assert_eq!("0-110000", attr("packet_timeout_height"));
    assert_eq!("1", attr("packet_sequence"));
    assert_eq!(game.ping_port, attr("packet_src_port"));
    assert_eq!(channel.a.channel_id, attr("packet_src_channel"));
    assert_eq!(game.pong_port, attr("packet_dst_port"));
    assert_eq!(channel.b.channel_id, attr("packet_dst_channel"));
}

#[test]
fn test_send_on_unconnected_channel_rolls_back() {
    let mut game = setup_players();
    game.open_channel();
    let ping = game.ping.clone();

    let err = game
        .coordinator
        .chain(Side::A)
        .execute(
            CREATOR,
            &ping,
            &PlayerExecute::StartGame(start_game("channel-9", 1)),
        )
        .unwrap_err();
    assert!(matches!(err, HostError::ChannelNotFound(ref c) if c == "channel-9"));

    // The counters the contract wrote before the send failed are gone.
    assert_eq!(0, game.ping_counter(SENT_BALLS_KEY));
    assert!(game.coordinator.pending_packets(Side::A).is_empty());
}

#[test]
fn test_timeout() {
    let mut game = setup_players();
    let channel = game.open_channel();
    game.start(StartGame {
        timeout_height: Some(10),
        ..start_game(&channel.a.channel_id, 100)
    });

    let err = game.coordinator.timeout_packet(Side::A).unwrap_err();
    assert!(err.to_string().contains("has not timed out"));

    game.coordinator.chain(Side::B).advance_blocks(20);
    let err = game.coordinator.relay_packet(Side::A).unwrap_err();
    assert!(err.to_string().contains("timed out"));
    assert_eq!(0, game.pong_counter(RECEIVED_BALLS_KEY));

    game.coordinator.timeout_packet(Side::A).unwrap();
    assert_eq!(1, game.ping_counter(TIMED_OUT_BALLS_KEY));
    assert_eq!(0, game.ping_counter(CONFIRMED_BALLS_KEY));
    assert!(game.coordinator.pending_packets(Side::A).is_empty());
}

#[test]
fn test_connect_replay_keeps_one_pair() {
    let mut game = setup_players();
    let channel = game.open_channel();
    let ping = game.ping.clone();
    let chain_a = game.coordinator.chain(Side::A);

    let open = chain_a
        .ibc()
        .ibc_channel(&channel.a.port_id, &channel.a.channel_id)
        .unwrap();
    chain_a
        .transact(|keeper, ctx| keeper.on_connect_channel(ctx, &open))
        .unwrap();

    let pairs = chain_a
        .query(|_, ctx| list_pairs(&contract_store(&mut *ctx.store, &ping)))
        .unwrap();
    assert_eq!(1, pairs.len());
    assert_eq!(channel.a, pairs[0].local);
    assert_eq!(channel.b, pairs[0].remote);
}

#[test]
fn test_end_game_closes_channel() {
    let mut game = setup_players();
    let channel = game.open_channel();
    let ping = game.ping.clone();

    game.coordinator
        .chain(Side::A)
        .execute(
            CREATOR,
            &ping,
            &PlayerExecute::EndGame {
                channel_id: channel.a.channel_id.clone(),
            },
        )
        .unwrap();
    game.coordinator.close_channel(Side::A, &channel).unwrap();

    for (side, end) in [(Side::A, &channel.a), (Side::B, &channel.b)] {
        let state = game
            .coordinator
            .chain(side)
            .ibc()
            .channel_end(&end.port_id, &end.channel_id)
            .map(|end| end.state);
        assert_eq!(Some(ChannelState::Closed), state);
    }

    // No more balls on a closed channel.
    let err = game
        .coordinator
        .chain(Side::A)
        .execute(
            CREATOR,
            &ping,
            &PlayerExecute::StartGame(start_game(&channel.a.channel_id, 1)),
        )
        .unwrap_err();
    assert!(matches!(err, HostError::SendPacket(_)));
}

#[test]
fn test_query_counter() {
    let mut game = setup_players();
    let channel = game.open_channel();
    game.start(start_game(&channel.a.channel_id, 5));
    let ping = game.ping.clone();

    let msg = serde_json::to_vec(&PlayerQuery::Counter {
        key: SENT_BALLS_KEY.to_string(),
    })
    .unwrap();
    let sent = game
        .coordinator
        .chain(Side::A)
        .query(|keeper, ctx| keeper.query_smart(ctx, &ping, &msg))
        .unwrap();
    assert_eq!(1_u64, from_json::<u64>(&sent).unwrap());
}
