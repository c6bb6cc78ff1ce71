//! Destination address policy.

use std::sync::Arc;

use tracing::debug;

use crate::domain::{AddressValidation, AddressValidator, Network};

pub const UNSUPPORTED_NETWORK_MESSAGE: &str = "Unsupported network";

/// Settlement networks a ticker can pay out on. Multi-chain stablecoins list
/// every chain they are accepted on.
pub fn networks_for(ticker: &str) -> Option<&'static [Network]> {
    let networks: &'static [Network] = match ticker.trim().to_ascii_lowercase().as_str() {
        "btc" => &[Network::Bitcoin],
        "eth" | "usdterc20" | "usdcerc20" => &[Network::Ethereum],
        "bnb" | "bsc" | "busdbsc" => &[Network::BinanceSmartChain],
        "trx" | "usdttrc20" => &[Network::Tron],
        "sol" => &[Network::Solana],
        "ltc" => &[Network::Litecoin],
        "doge" => &[Network::Dogecoin],
        "usdt" => &[Network::Ethereum, Network::Tron],
        "usdc" => &[Network::Ethereum, Network::Solana],
        _ => return None,
    };
    Some(networks)
}

/// Validates destination addresses against the ticker's network(s)
pub struct AddressPolicy {
    validator: Arc<dyn AddressValidator>,
}

impl AddressPolicy {
    #[must_use]
    pub fn new(validator: Arc<dyn AddressValidator>) -> Self {
        Self { validator }
    }

    pub fn validate(&self, address: &str, currency: &str) -> AddressValidation {
        let Some(networks) = networks_for(currency) else {
            return AddressValidation::invalid(UNSUPPORTED_NETWORK_MESSAGE);
        };

        if networks
            .iter()
            .any(|network| self.validator.is_valid(*network, address))
        {
            return AddressValidation::valid();
        }

        debug!(currency = %currency, "Address rejected for every candidate network");
        let names: Vec<&str> = networks.iter().map(Network::name).collect();
        AddressValidation::invalid(format!("Invalid {} address", names.join(" or ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::ChainAddressValidator;

    const BTC: &str = "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa";
    const ETH: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";
    const TRON: &str = "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t";
    const SOL: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

    fn policy() -> AddressPolicy {
        AddressPolicy::new(Arc::new(ChainAddressValidator::new()))
    }

    #[test]
    fn test_single_network_tickers() {
        let policy = policy();
        assert!(policy.validate(BTC, "btc").is_valid);
        assert!(policy.validate(ETH, "USDTERC20").is_valid);
        assert!(policy.validate(TRON, "usdttrc20").is_valid);
        assert!(!policy.validate(TRON, "usdterc20").is_valid);
        assert!(!policy.validate(ETH, "btc").is_valid);
    }

    #[test]
    fn test_multi_chain_stablecoin_accepts_any_chain() {
        let policy = policy();
        assert!(policy.validate(ETH, "usdt").is_valid);
        assert!(policy.validate(TRON, "usdt").is_valid);
        assert!(!policy.validate(BTC, "usdt").is_valid);

        assert!(policy.validate(ETH, "usdc").is_valid);
        assert!(policy.validate(SOL, "usdc").is_valid);
        assert!(!policy.validate(TRON, "usdc").is_valid);
    }

    #[test]
    fn test_unknown_ticker_is_unsupported() {
        let result = policy().validate(BTC, "xyz");
        assert!(!result.is_valid);
        assert_eq!(result.message, UNSUPPORTED_NETWORK_MESSAGE);
    }

    #[test]
    fn test_messages() {
        let policy = policy();
        assert_eq!(policy.validate(BTC, "btc").message, "Address is valid");
        assert_eq!(
            policy.validate(BTC, "usdt").message,
            "Invalid ethereum or tron address"
        );
    }
}
