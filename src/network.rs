//! Known relay and twin-directory proxy endpoints per grid network.

/// Default relay URL on the main network.
pub const MAIN_RELAY_URL: &str = "wss://relay.grid.tf";

/// Relay URL on the test network.
pub const TEST_RELAY_URL: &str = "wss://relay.test.grid.tf";

/// Relay URL on the dev network.
pub const DEV_RELAY_URL: &str = "wss://relay.dev.grid.tf";

/// Relay URL on the QA network.
pub const QA_RELAY_URL: &str = "wss://relay.qa.grid.tf";

/// Default twin-directory proxy on the main network.
pub const MAIN_PROXY_URL: &str = "https://gridproxy.grid.tf";

/// Twin-directory proxy on the test network.
pub const TEST_PROXY_URL: &str = "https://gridproxy.test.grid.tf";

/// Twin-directory proxy on the dev network.
pub const DEV_PROXY_URL: &str = "https://gridproxy.dev.grid.tf";

/// Twin-directory proxy on the QA network.
pub const QA_PROXY_URL: &str = "https://gridproxy.qa.grid.tf";

/// Environment variable overriding the main-network proxy URL.
pub const PROXY_URL_OVERRIDE_ENV: &str = "NO_NINJA_PROXY_URL";

/// The main-network proxy URL, honoring the [`PROXY_URL_OVERRIDE_ENV`]
/// override when set.
pub fn main_proxy_url() -> String {
    std::env::var(PROXY_URL_OVERRIDE_ENV).unwrap_or_else(|_| MAIN_PROXY_URL.to_string())
}
