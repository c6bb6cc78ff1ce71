//! Network address-format validation.
//!
//! Per-network rules (checksums, charsets, lengths) backed by the `bitcoin`,
//! `bs58` and `alloy-primitives` crates.

use std::str::FromStr;

use alloy_primitives::Address as EvmAddress;

use crate::domain::{AddressValidator, Network};

const LITECOIN_VERSIONS: [u8; 3] = [0x30, 0x32, 0x05];
const DOGECOIN_VERSIONS: [u8; 2] = [0x1e, 0x16];
const TRON_VERSION: u8 = 0x41;

/// Address validator covering every supported settlement network
#[derive(Debug, Clone, Copy, Default)]
pub struct ChainAddressValidator;

impl ChainAddressValidator {
    pub fn new() -> Self {
        Self
    }
}

impl AddressValidator for ChainAddressValidator {
    fn is_valid(&self, network: Network, address: &str) -> bool {
        let address = address.trim();
        if address.is_empty() {
            return false;
        }
        match network {
            Network::Bitcoin => is_bitcoin_address(address),
            Network::Ethereum | Network::BinanceSmartChain => is_evm_address(address),
            Network::Tron => base58check_version(address, 21).is_some_and(|v| v == TRON_VERSION),
            Network::Solana => is_solana_address(address),
            Network::Litecoin => {
                base58check_version(address, 21).is_some_and(|v| LITECOIN_VERSIONS.contains(&v))
                    || is_segwit_address(address, "ltc")
            }
            Network::Dogecoin => {
                base58check_version(address, 21).is_some_and(|v| DOGECOIN_VERSIONS.contains(&v))
            }
        }
    }
}

fn is_bitcoin_address(address: &str) -> bool {
    bitcoin::Address::from_str(address)
        .map(|a| a.require_network(bitcoin::Network::Bitcoin).is_ok())
        .unwrap_or(false)
}

/// Version byte of a Base58Check payload of the given length
fn base58check_version(address: &str, payload_len: usize) -> Option<u8> {
    let payload = bs58::decode(address).with_check(None).into_vec().ok()?;
    (payload.len() == payload_len).then(|| payload[0])
}

fn is_segwit_address(address: &str, expected_hrp: &str) -> bool {
    match bitcoin::bech32::segwit::decode(address) {
        Ok((hrp, _version, _program)) => hrp.to_string().eq_ignore_ascii_case(expected_hrp),
        Err(_) => false,
    }
}

fn is_solana_address(address: &str) -> bool {
    bs58::decode(address)
        .into_vec()
        .map(|bytes| bytes.len() == 32)
        .unwrap_or(false)
}

/// `0x` + 40 hex chars; mixed-case addresses must carry a valid EIP-55 checksum
fn is_evm_address(address: &str) -> bool {
    let Some(body) = address.strip_prefix("0x") else {
        return false;
    };
    let mixed_case = body.chars().any(|c| c.is_ascii_lowercase())
        && body.chars().any(|c| c.is_ascii_uppercase());

    if mixed_case {
        EvmAddress::parse_checksummed(address, None).is_ok()
    } else {
        EvmAddress::from_str(address).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid(network: Network, address: &str) -> bool {
        ChainAddressValidator.is_valid(network, address)
    }

    #[test]
    fn test_bitcoin_addresses() {
        assert!(valid(Network::Bitcoin, "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa"));
        assert!(valid(
            Network::Bitcoin,
            "bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq"
        ));
        // Testnet address is rejected on mainnet
        assert!(!valid(
            Network::Bitcoin,
            "tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx"
        ));
        assert!(!valid(Network::Bitcoin, "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNb"));
    }

    #[test]
    fn test_evm_addresses() {
        // EIP-55 checksummed
        assert!(valid(
            Network::Ethereum,
            "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"
        ));
        // All lowercase carries no checksum
        assert!(valid(
            Network::Ethereum,
            "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed"
        ));
        // Broken checksum
        assert!(!valid(
            Network::Ethereum,
            "0x5AAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"
        ));
        // All uppercase carries no checksum either
        assert!(valid(
            Network::Ethereum,
            "0x5AAEB6053F3E94C9B9A09F33669435E7EF1BEAED"
        ));
        assert!(!valid(Network::Ethereum, "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeA"));
        assert!(!valid(Network::Ethereum, "0xZZaeb6053f3e94c9b9a09f33669435e7ef1beaed"));
        assert!(!valid(Network::Ethereum, "5aaeb6053f3e94c9b9a09f33669435e7ef1beaed"));
        assert!(!valid(Network::BinanceSmartChain, "0x1234"));
    }

    #[test]
    fn test_tron_addresses() {
        assert!(valid(Network::Tron, "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t"));
        assert!(!valid(Network::Tron, "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6u"));
        assert!(!valid(Network::Tron, "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa"));
    }

    #[test]
    fn test_solana_addresses() {
        assert!(valid(
            Network::Solana,
            "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v"
        ));
        assert!(!valid(Network::Solana, "not-base58-0OIl"));
    }

    #[test]
    fn test_litecoin_and_dogecoin_addresses() {
        assert!(valid(Network::Litecoin, "LVg2kJoFNg45Nbpy53h7Fe1wKyeXVRhMH9"));
        assert!(!valid(Network::Litecoin, "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa"));
        assert!(valid(Network::Dogecoin, "DH5yaieqoZN36fDVciNyRueRGvGLR3mr7L"));
        assert!(!valid(Network::Dogecoin, "LVg2kJoFNg45Nbpy53h7Fe1wKyeXVRhMH9"));
    }

    #[test]
    fn test_empty_address_is_invalid() {
        assert!(!valid(Network::Bitcoin, "   "));
    }
}
