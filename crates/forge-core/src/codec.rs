// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! CBOR serialization of build results.
//!
//! Results cross node boundaries and land in the on-disk result cache;
//! both trips go through CBOR. Round-trips are value-exact: items compare
//! by `(spec, metadata multiset)` and preserved exceptions by type name
//! and message, so `decode(encode(r)) == r` for every result `r`.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::request::BuildRequestConfiguration;
use crate::result::{BuildResult, TargetResult};

/// Serialization failures.
///
/// The underlying error is flattened to its message so codec errors stay
/// comparable and cheap to ship across threads.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Encoding failed.
    #[error("encode failed: {0}")]
    Encode(String),
    /// Decoding failed (truncated or foreign bytes).
    #[error("decode failed: {0}")]
    Decode(String),
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    let mut bytes = Vec::new();
    ciborium::into_writer(value, &mut bytes).map_err(|e| CodecError::Encode(e.to_string()))?;
    Ok(bytes)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    ciborium::from_reader(bytes).map_err(|e| CodecError::Decode(e.to_string()))
}

/// Encodes a [`BuildResult`].
pub fn encode_build_result(result: &BuildResult) -> Result<Vec<u8>, CodecError> {
    encode(result)
}

/// Decodes a [`BuildResult`].
pub fn decode_build_result(bytes: &[u8]) -> Result<BuildResult, CodecError> {
    decode(bytes)
}

/// Encodes a single [`TargetResult`] (one result-cache file entry).
pub fn encode_target_result(result: &TargetResult) -> Result<Vec<u8>, CodecError> {
    encode(result)
}

/// Decodes a single [`TargetResult`].
pub fn decode_target_result(bytes: &[u8]) -> Result<TargetResult, CodecError> {
    decode(bytes)
}

/// Encodes a [`BuildRequestConfiguration`].
pub fn encode_configuration(
    configuration: &BuildRequestConfiguration,
) -> Result<Vec<u8>, CodecError> {
    encode(configuration)
}

/// Decodes a [`BuildRequestConfiguration`].
pub fn decode_configuration(bytes: &[u8]) -> Result<BuildRequestConfiguration, CodecError> {
    decode(bytes)
}
