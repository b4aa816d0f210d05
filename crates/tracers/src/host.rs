//! Collaborator interfaces the tracers read from.
//!
//! The tracers never execute code or mutate state. Everything they learn about
//! accounts comes from a [`Database`] view of the live state, and contract
//! addresses for CREATE/CREATE2 come from an [`AddressDerivation`] helper.

use bytes::Bytes;
use ethereum_types::{Address, H256, U256};

use crate::error::DatabaseError;

/// Read-only view of the world state as seen by the interpreter at the time a
/// hook fires.
pub trait Database {
    fn get_balance(&self, address: Address) -> Result<U256, DatabaseError>;
    fn get_nonce(&self, address: Address) -> Result<u64, DatabaseError>;
    fn get_code(&self, address: Address) -> Result<Bytes, DatabaseError>;
    fn get_storage(&self, address: Address, key: H256) -> Result<H256, DatabaseError>;
    fn exists(&self, address: Address) -> Result<bool, DatabaseError>;
    /// EIP-161 emptiness: zero balance, zero nonce and no code.
    fn is_empty(&self, address: Address) -> Result<bool, DatabaseError>;
}

/// Contract address derivation for the two creation opcodes.
pub trait AddressDerivation {
    fn create_address(&self, deployer: Address, nonce: u64) -> Address;
    fn create2_address(&self, deployer: Address, salt: H256, init_code: &[u8]) -> Address;
}

/// Everything a tracer needs from its host.
pub trait Host: Database + AddressDerivation {}

impl<T: Database + AddressDerivation + ?Sized> Host for T {}
