//! Contract port identifiers and port binding.
//!
//! Every contract that exports IBC entry points owns exactly one port. The
//! port identifier is derived from the contract id alone, so the contract can
//! be recovered from any port the channel layer hands back.

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use prost::encoding::{decode_varint, encode_varint, encoded_len_varint};
use tracing::{debug, info};

use crate::{
    capability::{port_path, Capability, WASM_MODULE},
    context::Context,
    error::HostError,
    types::ContractId,
};

/// The prefix of every contract port identifier.
pub const ENDPOINT_PREFIX: &str = "wasm";

/// Derive the port identifier of a contract.
///
/// `"wasm" + base64_no_pad(uvarint((code_id << 32) + instance_id))`
/// # Errors
/// Returns [`HostError::ContractIdOutOfRange`] if either id does not fit in
/// 32 bits.
pub fn derive_endpoint(id: ContractId) -> Result<String, HostError> {
    let (Ok(code_id), Ok(instance_id)) = (u32::try_from(id.code_id), u32::try_from(id.instance_id))
    else {
        return Err(HostError::ContractIdOutOfRange {
            code_id: id.code_id,
            instance_id: id.instance_id,
        });
    };

    let packed = (u64::from(code_id) << 32) | u64::from(instance_id);
    let mut buf = Vec::with_capacity(encoded_len_varint(packed));
    encode_varint(packed, &mut buf);
    Ok(format!("{ENDPOINT_PREFIX}{}", STANDARD_NO_PAD.encode(buf)))
}

/// Recover the contract id from a port identifier.
/// # Errors
/// Returns [`HostError::InvalidEndpoint`] if the identifier could not have
/// been produced by [`derive_endpoint`].
pub fn resolve_contract(endpoint: &str) -> Result<ContractId, HostError> {
    let invalid = |reason| HostError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        reason,
    };

    let encoded = endpoint
        .strip_prefix(ENDPOINT_PREFIX)
        .ok_or_else(|| invalid("missing prefix"))?;
    let bytes = STANDARD_NO_PAD
        .decode(encoded)
        .map_err(|_| invalid("invalid base64"))?;

    let mut buf = bytes.as_slice();
    let packed = decode_varint(&mut buf).map_err(|_| invalid("invalid varint"))?;
    if !buf.is_empty() {
        return Err(invalid("trailing bytes after varint"));
    }
    if encoded_len_varint(packed) != bytes.len() {
        return Err(invalid("non-canonical varint"));
    }

    Ok(ContractId::new(packed >> 32, packed & u64::from(u32::MAX)))
}

/// Make sure the contract's port is bound and owned by the wasm module, and
/// return its identifier.
///
/// Binding is idempotent: a port the wasm module already owns is returned
/// as is. Without a capability authority in the context only the derivation
/// is performed.
/// # Errors
/// Returns an error if the id cannot be encoded or the port cannot be bound.
pub fn ensure_bound(ctx: &mut Context<'_>, id: ContractId) -> Result<String, HostError> {
    let port_id = derive_endpoint(id)?;
    let Some(capabilities) = ctx.capabilities.as_deref_mut() else {
        debug!(%port_id, "no capability authority, skipping port binding");
        return Ok(port_id);
    };

    let name = port_path(&port_id);
    if capabilities.has_capability(WASM_MODULE, &name) {
        return Ok(port_id);
    }

    let capability = capabilities.bind_port(&port_id)?;
    capabilities.claim_capability(WASM_MODULE, capability, &name)?;
    info!(%port_id, contract = %id, "bound contract port");
    Ok(port_id)
}

/// Take ownership of `capability` under `name` for the wasm module.
///
/// A no-op without a capability authority in the context.
/// # Errors
/// Returns [`HostError::CapabilityConflict`] if the name is already held.
pub fn claim(ctx: &mut Context<'_>, capability: Capability, name: &str) -> Result<(), HostError> {
    match ctx.capabilities.as_deref_mut() {
        Some(capabilities) => capabilities.claim_capability(WASM_MODULE, capability, name),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::{capability::CapabilityKeeper, gas::GasMeter, store::MemoryStore, types::BlockInfo};

    #[rstest]
    #[case(1, 1)]
    #[case(0, 0)]
    #[case(1, 0)]
    #[case(0, 1)]
    #[case(42, 7)]
    #[case(u64::from(u32::MAX), u64::from(u32::MAX))]
    fn test_endpoint_reversible(#[case] code_id: u64, #[case] instance_id: u64) {
        let id = ContractId::new(code_id, instance_id);
        let endpoint = derive_endpoint(id).unwrap();
        assert!(endpoint.starts_with(ENDPOINT_PREFIX));
        assert_eq!(id, resolve_contract(&endpoint).unwrap());
    }

    #[test]
    fn test_endpoint_known_value() {
        // uvarint(1 << 32 | 1) = 81 80 80 80 10
        assert_eq!(
            "wasmgYCAgBA",
            derive_endpoint(ContractId::new(1, 1)).unwrap()
        );
    }

    #[test]
    fn test_endpoint_injective() {
        let mut seen = std::collections::HashSet::new();
        for code_id in 0..20 {
            for instance_id in 0..20 {
                let endpoint = derive_endpoint(ContractId::new(code_id, instance_id)).unwrap();
                assert!(seen.insert(endpoint), "collision at ({code_id}, {instance_id})");
            }
        }
    }

    #[rstest]
    #[case::code_id(u64::from(u32::MAX) + 1, 1)]
    #[case::instance_id(1, u64::from(u32::MAX) + 1)]
    fn test_endpoint_out_of_range(#[case] code_id: u64, #[case] instance_id: u64) {
        let err = derive_endpoint(ContractId::new(code_id, instance_id)).unwrap_err();
        assert!(matches!(err, HostError::ContractIdOutOfRange { .. }));
    }

    #[rstest]
    #[case::no_prefix("gYCAgBA")]
    #[case::other_prefix("portgYCAgBA")]
    #[case::empty_payload("wasm")]
    #[case::bad_base64("wasm!!!")]
    #[case::padded("wasmAQ==")]
    #[case::truncated_varint("wasmgA")]
    #[case::trailing_bytes("wasmAQE")]
    #[case::non_canonical_varint("wasmgQA")]
    fn test_resolve_invalid(#[case] endpoint: &str) {
        let err = resolve_contract(endpoint).unwrap_err();
        assert!(matches!(err, HostError::InvalidEndpoint { .. }), "{err}");
    }

    #[test]
    fn test_ensure_bound_is_idempotent() {
        let mut store = MemoryStore::new();
        let mut capabilities = CapabilityKeeper::new();
        let mut ctx = Context::new(&mut store, GasMeter::infinite(), BlockInfo::default())
            .with_capabilities(&mut capabilities);

        let id = ContractId::new(1, 1);
        let first = ensure_bound(&mut ctx, id).unwrap();
        let second = ensure_bound(&mut ctx, id).unwrap();
        assert_eq!(first, second);

        assert!(capabilities.has_capability(WASM_MODULE, &port_path(&first)));
        assert!(capabilities.is_port_bound(&first));
    }

    #[rstest]
    #[case::plain(ContractId::new(1, 1), "wasmgYCAgBA")]
    // uvarint(1 << 32 | 127) = ff 80 80 80 10
    #[case::base64_slash(ContractId::new(1, 127), "wasm/4CAgBA")]
    fn test_ensure_bound_binds(#[case] id: ContractId, #[case] expected: &str) {
        let mut store = MemoryStore::new();
        let mut capabilities = CapabilityKeeper::new();
        let mut ctx = Context::new(&mut store, GasMeter::infinite(), BlockInfo::default())
            .with_capabilities(&mut capabilities);

        assert_eq!(expected, ensure_bound(&mut ctx, id).unwrap());
        assert!(capabilities.is_port_bound(expected));
        assert_eq!(id, resolve_contract(expected).unwrap());
    }

    #[test]
    fn test_ensure_bound_port_taken_by_other_module() {
        let mut store = MemoryStore::new();
        let mut capabilities = CapabilityKeeper::new();
        let port_id = derive_endpoint(ContractId::new(3, 4)).unwrap();
        capabilities.bind_port(&port_id).unwrap();

        let mut ctx = Context::new(&mut store, GasMeter::infinite(), BlockInfo::default())
            .with_capabilities(&mut capabilities);
        let err = ensure_bound(&mut ctx, ContractId::new(3, 4)).unwrap_err();
        assert!(matches!(err, HostError::CapabilityConflict { .. }));
    }

    #[test]
    fn test_ensure_bound_without_authority() {
        let mut store = MemoryStore::new();
        let mut ctx = Context::new(&mut store, GasMeter::infinite(), BlockInfo::default());
        let id = ContractId::new(5, 6);
        assert_eq!(
            derive_endpoint(id).unwrap(),
            ensure_bound(&mut ctx, id).unwrap()
        );
    }
}
