//! Persists the local/remote endpoint pair of every channel a contract has
//! connected, in the contract's own storage.

use cosmwasm_std::IbcEndpoint;
use serde::{Deserialize, Serialize};

use crate::{error::HostError, store::KvStore};

/// The key the endpoint pairs are stored under.
pub const ENDPOINTS_KEY: &[u8] = b"ibc-endpoints";

/// A connected channel, seen from the contract.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelEndpointPair {
    /// The contract's own end of the channel
    pub local: IbcEndpoint,
    /// The counterparty end of the channel
    pub remote: IbcEndpoint,
}

/// Returns all stored endpoint pairs, oldest first.
/// # Errors
/// Returns an error if the stored list cannot be decoded.
pub fn list_pairs(store: &dyn KvStore) -> Result<Vec<ChannelEndpointPair>, HostError> {
    store
        .get(ENDPOINTS_KEY)
        .map_or_else(|| Ok(Vec::new()), |bz| Ok(serde_json::from_slice(&bz)?))
}

/// Append `pair` unless a pair for the same local channel is already stored.
///
/// Returns whether the pair was appended.
/// # Errors
/// Returns an error if the stored list cannot be decoded or encoded.
pub fn record_pair(store: &mut dyn KvStore, pair: ChannelEndpointPair) -> Result<bool, HostError> {
    let mut pairs = list_pairs(store)?;
    if pairs
        .iter()
        .any(|p| p.local.channel_id == pair.local.channel_id)
    {
        return Ok(false);
    }

    pairs.push(pair);
    store.set(ENDPOINTS_KEY, &serde_json::to_vec(&pairs)?);
    Ok(true)
}

/// Find the pair whose local channel is `channel_id`.
/// # Errors
/// Returns [`HostError::ChannelNotFound`] if the contract never connected the
/// channel.
pub fn lookup_by_local_channel(
    store: &dyn KvStore,
    channel_id: &str,
) -> Result<ChannelEndpointPair, HostError> {
    list_pairs(store)?
        .into_iter()
        .find(|p| p.local.channel_id == channel_id)
        .ok_or_else(|| HostError::ChannelNotFound(channel_id.to_string()))
}
