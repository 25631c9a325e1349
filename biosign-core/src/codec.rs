//! Hex text encoding for signatures crossing into text channels
// Copyright 2025 Francisco F. Pinochet
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use crate::error::CodecError;

/// Encode bytes as lowercase hex, two digits per byte, no separators
pub fn encode(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Decode a hex string.
///
/// Fails on odd length or any character outside `[0-9a-fA-F]`.
pub fn decode(text: &str) -> Result<Vec<u8>, CodecError> {
    hex::decode(text).map_err(|e| CodecError::InvalidEncoding(e.to_string()))
}
