//! ABI helpers for classification probes
//! Calldata for the standard view functions, return-data decoding, and the
//! scoring used to choose between competing string encodings.

use alloy_primitives::{Address, Bytes, FixedBytes, B256};
use alloy_sol_types::{sol, SolCall};

sol! {
    // ERC-20 / ERC-721 metadata
    function name() external view returns (string);
    function symbol() external view returns (string);
    function decimals() external view returns (uint8);
    function totalSupply() external view returns (uint256);

    // ERC-4626
    function asset() external view returns (address);
    function totalAssets() external view returns (uint256);

    // ERC-165
    function supportsInterface(bytes4 interfaceId) external view returns (bool);

    // Uniswap-style pair
    function token0() external view returns (address);
    function token1() external view returns (address);

    // Safe multisig
    function getThreshold() external view returns (uint256);
    function getOwners() external view returns (address[]);

    // EIP-1967 beacon
    function implementation() external view returns (address);
}

/// Calldata for a call without arguments
pub fn encode_call<C: SolCall>(call: &C) -> Bytes {
    Bytes::from(call.abi_encode())
}

/// Calldata for `supportsInterface(id)`
pub fn encode_supports_interface(interface_id: FixedBytes<4>) -> Bytes {
    encode_call(&supportsInterfaceCall { interfaceId: interface_id })
}

// ============================================
// ADDRESS WORDS
// ============================================

/// Interpret a 32-byte word as an address: the 12-byte padding is ignored,
/// the trailing 20 bytes are used and the zero address is discarded.
pub fn word_to_address(word: &B256) -> Option<Address> {
    let address = Address::from_slice(&word[12..]);
    (!address.is_zero()).then_some(address)
}

/// ABI-encoded address return value (exactly one word)
pub fn decode_address_word(data: &[u8]) -> Option<Address> {
    if data.len() < 32 {
        return None;
    }
    word_to_address(&B256::from_slice(&data[..32]))
}

// ============================================
// STRING DECODING
// ============================================

/// Both readings of a string-returning call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StringCandidates {
    /// Dynamic `string` encoding
    pub dynamic: Option<String>,
    /// Legacy fixed `bytes32` encoding (e.g. MKR, SAI)
    pub fixed: Option<String>,
}

/// Decode return data as `string` and as `bytes32`, keeping whichever parse
pub fn decode_string_candidates(data: &[u8]) -> StringCandidates {
    let dynamic = nameCall::abi_decode_returns(data, false)
        .ok()
        .map(|r| clean_string(&r._0))
        .filter(|s| !s.is_empty());

    let fixed = if data.len() == 32 {
        let trimmed: Vec<u8> = data.iter().copied().take_while(|b| *b != 0).collect();
        String::from_utf8(trimmed).ok().map(|s| clean_string(&s)).filter(|s| !s.is_empty())
    } else {
        None
    };

    StringCandidates { dynamic, fixed }
}

fn clean_string(raw: &str) -> String {
    raw.trim_matches(|c: char| c == '\0' || c.is_whitespace()).to_string()
}

// ============================================
// STRING SCORING
// ============================================

/// Which field a string candidate is for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringField {
    Name,
    Symbol,
}

/// Plausibility score of a token string; higher is better
pub fn score_string(value: &str, field: StringField) -> i32 {
    if value.is_empty() {
        return i32::MIN;
    }

    let len = value.chars().count();
    let mut score = 0;

    if value.chars().any(char::is_control) {
        score -= 5;
    }

    match field {
        StringField::Symbol => {
            if value.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '$' | '-')) {
                score += 3;
            }
            if len <= 8 {
                score += 2;
            }
            if len <= 2 {
                score -= 1;
            }
            if value.chars().any(char::is_whitespace) {
                score -= 2;
            }
        }
        StringField::Name => {
            if len >= 3 {
                score += 2;
            }
            if value.chars().all(|c| !c.is_control()) {
                score += 1;
            }
        }
    }

    score
}

/// Pick the better-looking candidate; a single non-empty candidate wins by default
pub fn pick_string(candidates: StringCandidates, field: StringField) -> Option<String> {
    match (candidates.dynamic, candidates.fixed) {
        (Some(dynamic), Some(fixed)) => {
            if score_string(&fixed, field) > score_string(&dynamic, field) {
                Some(fixed)
            } else {
                Some(dynamic)
            }
        }
        (Some(one), None) | (None, Some(one)) => Some(one),
        (None, None) => None,
    }
}
