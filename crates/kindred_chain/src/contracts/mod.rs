//! # Contract Definitions
//!
//! Solidity interface of the game contract, the call-batch type handed to the
//! transaction executor, and the ABI adapter for the authoritative read.

// The sol! macro generates code that we can't document, so allow missing_docs
#![allow(missing_docs)]

use alloy_primitives::{hex, Address, Bytes};
use alloy_sol_types::{sol, SolCall, SolError};
use async_trait::async_trait;
use kindred_state::StatusVector;

use crate::backend::{AuthoritativeReader, StatusRead};
use crate::error::{CallFailure, ReadError};

sol! {
    /// The game contract. One living creature per owner.
    #[derive(Debug)]
    interface IKindredGame {
        /// Reverted by `getStatus` when the owner has no live entity.
        error NoLiveEntity(address owner);

        /// Ten-word status of the owner's entity.
        function getStatus(address owner) external view returns (uint256[] status);

        /// Feeds the entity.
        function feed(uint256 entityId, uint8 amount) external;

        /// Cleans the entity.
        function clean(uint256 entityId) external;

        /// Plays with the entity.
        function play(uint256 entityId) external;

        /// Puts the entity to sleep or wakes it.
        function toggleSleep(uint256 entityId) external;

        /// Spends energy to start a session.
        function consumeEnergy(uint256 entityId, uint8 amount) external;

        /// Creates a new entity for the caller.
        function spawn(string species, string name) external returns (uint256 entityId);
    }
}

/// One call in a batch submitted to the executor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Call {
    /// Contract address.
    pub target: Address,
    /// Solidity signature, e.g. `feed(uint256,uint8)`.
    pub method: &'static str,
    /// ABI-encoded calldata including the selector.
    pub calldata: Bytes,
}

impl Call {
    /// Encodes a typed contract call.
    #[must_use]
    pub fn new<C: SolCall>(target: Address, call: &C) -> Self {
        Self {
            target,
            method: C::SIGNATURE,
            calldata: Bytes::from(call.abi_encode()),
        }
    }
}

/// Decodes `getStatus` return data through the status parsing boundary.
pub fn decode_status_return(data: &[u8]) -> Result<StatusVector, ReadError> {
    let ret = IKindredGame::getStatusCall::abi_decode_returns(data, true)
        .map_err(|e| ReadError::Decode(e.to_string()))?;
    Ok(StatusVector::from_words(&ret.status)?)
}

/// True when revert data is the distinguished no-entity signal.
#[must_use]
pub fn is_no_entity_revert(data: &[u8]) -> bool {
    data.starts_with(&IKindredGame::NoLiveEntity::SELECTOR)
        && IKindredGame::NoLiveEntity::abi_decode(data, true).is_ok()
}

/// Raw `eth_call` transport.
#[async_trait]
pub trait ContractCaller: Send + Sync {
    /// Executes a read-only call.
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, CallFailure>;
}

/// Authoritative reader backed by the game contract's `getStatus`.
pub struct AbiStatusReader<C> {
    caller: C,
    contract: Address,
}

impl<C: ContractCaller> AbiStatusReader<C> {
    /// Creates a reader for the given contract.
    pub fn new(caller: C, contract: Address) -> Self {
        Self { caller, contract }
    }
}

#[async_trait]
impl<C: ContractCaller> AuthoritativeReader for AbiStatusReader<C> {
    async fn get_status(&self, owner: Address) -> Result<StatusRead, ReadError> {
        let data = IKindredGame::getStatusCall { owner }.abi_encode();
        match self.caller.call(self.contract, Bytes::from(data)).await {
            Ok(ret) => decode_status_return(&ret).map(StatusRead::Vector),
            Err(CallFailure::Revert(data)) if is_no_entity_revert(&data) => Ok(StatusRead::NoEntity),
            Err(CallFailure::Revert(data)) => Err(ReadError::Reverted(hex::encode_prefixed(data))),
            Err(CallFailure::Transport(message)) => Err(ReadError::Transport(message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;
    use kindred_state::Stats;

    /// ABI return for `uint256[]`: head offset, length, words.
    fn encode_words(words: &[U256]) -> Vec<u8> {
        let mut out = Vec::with_capacity(64 + words.len() * 32);
        out.extend_from_slice(&U256::from(32).to_be_bytes::<32>());
        out.extend_from_slice(&U256::from(words.len()).to_be_bytes::<32>());
        for word in words {
            out.extend_from_slice(&word.to_be_bytes::<32>());
        }
        out
    }

    fn sample() -> StatusVector {
        StatusVector {
            owner: Address::repeat_byte(7),
            entity_id: U256::from(42),
            is_alive: true,
            is_awake: true,
            stats: Stats::new(1, 2, 3, 4),
            is_critical: true,
            updated_at: 99,
        }
    }

    struct FixedCaller(Result<Vec<u8>, CallFailure>);

    #[async_trait]
    impl ContractCaller for FixedCaller {
        async fn call(&self, _to: Address, _data: Bytes) -> Result<Bytes, CallFailure> {
            self.0.clone().map(Bytes::from)
        }
    }

    #[test]
    fn test_call_encoding() {
        let call = Call::new(
            Address::repeat_byte(1),
            &IKindredGame::feedCall {
                entityId: U256::from(42),
                amount: 20,
            },
        );
        assert_eq!(call.method, "feed(uint256,uint8)");
        assert_eq!(&call.calldata[..4], IKindredGame::feedCall::SELECTOR.as_slice());
        assert_eq!(call.calldata.len(), 4 + 64);
    }

    #[test]
    fn test_decode_status_return() {
        let data = encode_words(&sample().to_words());
        assert_eq!(decode_status_return(&data).unwrap(), sample());
    }

    #[test]
    fn test_decode_short_vector_is_malformed() {
        let data = encode_words(&sample().to_words()[..9]);
        assert!(matches!(decode_status_return(&data), Err(ReadError::Malformed(_))));
    }

    #[test]
    fn test_no_entity_revert_detection() {
        let revert = IKindredGame::NoLiveEntity {
            owner: Address::repeat_byte(7),
        }
        .abi_encode();
        assert!(is_no_entity_revert(&revert));
        assert!(!is_no_entity_revert(&[0xde, 0xad, 0xbe, 0xef]));
    }

    #[tokio::test]
    async fn test_reader_maps_no_entity() {
        let revert = IKindredGame::NoLiveEntity {
            owner: Address::repeat_byte(7),
        }
        .abi_encode();
        let reader = AbiStatusReader::new(FixedCaller(Err(CallFailure::Revert(revert))), Address::ZERO);

        let read = reader.get_status(Address::repeat_byte(7)).await.unwrap();
        assert_eq!(read, StatusRead::NoEntity);
    }

    #[tokio::test]
    async fn test_reader_decodes_vector() {
        let data = encode_words(&sample().to_words());
        let reader = AbiStatusReader::new(FixedCaller(Ok(data)), Address::ZERO);

        let read = reader.get_status(Address::repeat_byte(7)).await.unwrap();
        assert_eq!(read, StatusRead::Vector(sample()));
    }

    #[tokio::test]
    async fn test_reader_transport_error() {
        let reader = AbiStatusReader::new(
            FixedCaller(Err(CallFailure::Transport("connection reset".into()))),
            Address::ZERO,
        );

        let err = reader.get_status(Address::repeat_byte(7)).await.unwrap_err();
        assert_eq!(err, ReadError::Transport("connection reset".into()));
    }
}
