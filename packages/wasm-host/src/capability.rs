//! The capability authority: mints unforgeable tokens and tracks which module
//! owns which named capability.
//!
//! A [`Capability`] cannot be cloned or constructed outside this module. A
//! module gets one by minting it, by asking the authority for a name it
//! already owns, or by having it handed over by the module that minted it.
//! Ownership moves only through [`CapabilityKeeper::claim_capability`], which
//! consumes the token.

use std::collections::BTreeMap;

use crate::error::HostError;

/// The module name the contract host owns capabilities under.
pub const WASM_MODULE: &str = "wasm";
/// The module name port capabilities are minted under.
pub const PORT_MODULE: &str = "port";
/// The module name the channel layer owns channel capabilities under.
pub const IBC_MODULE: &str = "ibc";

/// Minimum port identifier length.
pub const PORT_ID_MIN_LEN: usize = 2;
/// Maximum port identifier length.
pub const PORT_ID_MAX_LEN: usize = 128;

/// The capability name of a bound port.
#[must_use]
pub fn port_path(port_id: &str) -> String {
    format!("ports/{port_id}")
}

/// The capability name of a channel on a port.
#[must_use]
pub fn channel_capability_path(port_id: &str, channel_id: &str) -> String {
    format!("capabilities/ports/{port_id}/channels/{channel_id}")
}

/// An unforgeable token granting the right to act on a named resource.
#[derive(Debug, PartialEq, Eq)]
pub struct Capability {
    index: u64,
}

impl Capability {
    /// The authority's index of this capability.
    #[must_use]
    pub const fn index(&self) -> u64 {
        self.index
    }
}

/// Tracks capability ownership per `(module, name)`.
///
/// Clonable so that the ledger can snapshot it together with the store and
/// restore it when a transaction is rolled back.
#[derive(Clone, Debug, Default)]
pub struct CapabilityKeeper {
    next_index: u64,
    owners: BTreeMap<(String, String), u64>,
}

impl CapabilityKeeper {
    /// Create an empty authority.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a new capability owned by `module` under `name`.
    /// # Errors
    /// Returns [`HostError::CapabilityConflict`] if `module` already owns `name`.
    pub fn new_capability(&mut self, module: &str, name: &str) -> Result<Capability, HostError> {
        let key = (module.to_string(), name.to_string());
        if self.owners.contains_key(&key) {
            return Err(HostError::CapabilityConflict {
                name: name.to_string(),
                reason: format!("already owned by module {module}"),
            });
        }

        self.next_index += 1;
        self.owners.insert(key, self.next_index);
        Ok(Capability {
            index: self.next_index,
        })
    }

    /// Returns the capability `module` owns under `name`.
    #[must_use]
    pub fn get_capability(&self, module: &str, name: &str) -> Option<Capability> {
        self.owners
            .get(&(module.to_string(), name.to_string()))
            .map(|&index| Capability { index })
    }

    /// Whether `module` owns some capability under `name`.
    #[must_use]
    pub fn has_capability(&self, module: &str, name: &str) -> bool {
        self.owners
            .contains_key(&(module.to_string(), name.to_string()))
    }

    /// Take ownership of `capability` for `module` under `name`.
    /// # Errors
    /// Returns [`HostError::CapabilityConflict`] if `module` already owns a
    /// capability under `name`, including this one.
    pub fn claim_capability(
        &mut self,
        module: &str,
        capability: Capability,
        name: &str,
    ) -> Result<(), HostError> {
        let key = (module.to_string(), name.to_string());
        if let Some(&owned) = self.owners.get(&key) {
            let reason = if owned == capability.index {
                format!("already claimed by module {module}")
            } else {
                format!("module {module} owns a different capability under this name")
            };
            return Err(HostError::CapabilityConflict {
                name: name.to_string(),
                reason,
            });
        }

        self.owners.insert(key, capability.index);
        Ok(())
    }

    /// Whether `capability` is the one `module` owns under `name`.
    #[must_use]
    pub fn authenticate(&self, module: &str, capability: &Capability, name: &str) -> bool {
        self.owners
            .get(&(module.to_string(), name.to_string()))
            .is_some_and(|&index| index == capability.index)
    }

    /// Whether a port has been bound by any module.
    #[must_use]
    pub fn is_port_bound(&self, port_id: &str) -> bool {
        self.has_capability(PORT_MODULE, &port_path(port_id))
    }

    /// Bind a port and return its capability for the caller to claim.
    /// # Errors
    /// Returns [`HostError::InvalidPortId`] if the identifier fails validation
    /// and [`HostError::CapabilityConflict`] if the port is already bound.
    pub fn bind_port(&mut self, port_id: &str) -> Result<Capability, HostError> {
        validate_port_id(port_id)?;
        self.new_capability(PORT_MODULE, &port_path(port_id))
    }
}

/// Checks a port identifier against the host's identifier rules.
///
/// `/` is allowed because contract ports carry standard base64.
/// # Errors
/// Returns [`HostError::InvalidPortId`] on empty, too short, too long or
/// otherwise malformed identifiers.
pub fn validate_port_id(port_id: &str) -> Result<(), HostError> {
    let valid_len = (PORT_ID_MIN_LEN..=PORT_ID_MAX_LEN).contains(&port_id.len());
    let valid_chars = port_id.chars().all(|c| {
        c.is_ascii_alphanumeric()
            || matches!(c, '.' | '_' | '+' | '-' | '#' | '[' | ']' | '<' | '>' | '/')
    });
    if !valid_len || !valid_chars {
        return Err(HostError::InvalidPortId(port_id.to_string()));
    }
    Ok(())
}
