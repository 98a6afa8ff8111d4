//! Wallet identity and credentials.

use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroizing;

/// Wallet identifier used in ledger keys and lifecycle events.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WalletId(String);

impl WalletId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WalletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque signing credential. Zeroed on drop, never printed.
#[derive(Clone)]
pub struct Credential(Zeroizing<String>);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(Zeroizing::new(secret.into()))
    }

    /// Expose the secret to a signer.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// A wallet taking part in a run. Immutable for the duration of the run.
#[derive(Debug, Clone)]
pub struct Wallet {
    id: WalletId,
    address: String,
    credential: Credential,
    proxy: Option<String>,
    pair_address: Option<String>,
}

impl Wallet {
    /// Create a wallet identified by its address.
    pub fn new(address: impl Into<String>, credential: Credential) -> Self {
        let address = address.into();
        Self {
            id: WalletId::new(address.clone()),
            address,
            credential,
            proxy: None,
            pair_address: None,
        }
    }

    /// Override the identifier (e.g. a human label).
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = WalletId::new(id);
        self
    }

    #[must_use]
    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    /// Destination address on another chain, used by bridge/transfer tasks.
    #[must_use]
    pub fn with_pair_address(mut self, pair_address: impl Into<String>) -> Self {
        self.pair_address = Some(pair_address.into());
        self
    }

    pub fn id(&self) -> &WalletId {
        &self.id
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn proxy(&self) -> Option<&str> {
        self.proxy.as_deref()
    }

    pub fn pair_address(&self) -> Option<&str> {
        self.pair_address.as_deref()
    }
}
