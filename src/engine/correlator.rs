//! Event correlator.
//!
//! Picks the token a factory transaction created out of its receipt logs.
//! The first `Transfer` in emission order is the mint of the new token, so
//! its emitting contract is the token address.

use alloy::primitives::{b256, Address, B256};

use crate::types::LogEntry;

/// `keccak256("Transfer(address,address,uint256)")`
pub const TRANSFER_EVENT_SIGNATURE: B256 =
    b256!("ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef");

/// Address of the first log whose first topic is the Transfer signature.
pub fn find_transfer_token(logs: &[LogEntry]) -> Option<Address> {
    logs.iter()
        .find(|log| log.signature() == Some(TRANSFER_EVENT_SIGNATURE))
        .map(|log| log.address)
}
