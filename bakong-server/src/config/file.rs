//! TOML file configuration structures.
//!
//! These structs directly map to the `bakong-config.toml` file format.

use bakong_core::entities::Currency;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use url::Url;

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    pub server: ServerConfig,
    pub bakong: BakongConfig,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The address and port to listen on (e.g., "0.0.0.0:8080").
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
}

fn default_listen_addr() -> SocketAddr {
    "0.0.0.0:8080".parse().expect("valid default address")
}

/// Bakong open API configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BakongConfig {
    /// Root URL of the Bakong open API (sandbox or production).
    pub base_url: Url,
    /// Value for the `x-api-key` header.
    pub api_key: String,
    /// Merchant identity assigned by NBC.
    pub merchant_id: String,
    /// Currency newly created payments settle in.
    #[serde(default = "default_currency")]
    pub default_currency: Currency,
    /// Public URL the provider posts settlement callbacks to.
    pub callback_url: Url,
    /// Whether to verify the provider's TLS certificate. Turn off only
    /// against the sandbox, which serves a self-signed certificate.
    #[serde(default = "default_verify_tls")]
    pub verify_tls: bool,
}

fn default_currency() -> Currency {
    Currency::Usd
}

fn default_verify_tls() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_config_parsing() {
        let toml_str = r#"
[server]
listen = "127.0.0.1:3000"

[bakong]
base_url = "https://sandbox.bakong.example/v1/"
api_key = "test-key"
merchant_id = "merchant-1"
default_currency = "KHR"
callback_url = "https://shop.example.com/api/bakong/callback"
verify_tls = false
"#;
        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen.port(), 3000);
        assert_eq!(config.bakong.merchant_id, "merchant-1");
        assert_eq!(config.bakong.default_currency, Currency::Khr);
        assert!(!config.bakong.verify_tls);
    }

    #[test]
    fn test_defaults_apply_when_omitted() {
        let toml_str = r#"
[server]

[bakong]
base_url = "https://api.bakong.example/v1/"
api_key = "prod-key"
merchant_id = "merchant-1"
callback_url = "https://shop.example.com/api/bakong/callback"
"#;
        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen.port(), 8080);
        assert_eq!(config.bakong.default_currency, Currency::Usd);
        assert!(config.bakong.verify_tls);
    }
}
