use std::{sync::OnceLock, time::Duration};

use tracing::debug;

use crate::{Error, Result};

pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            // Another crate may have installed one first.
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Build the `reqwest::Client` shared by the HTTP-based providers.
pub fn build_client(request_timeout: Duration) -> Result<reqwest::Client> {
    install_rustls_provider();

    let mut builder = reqwest::Client::builder()
        .user_agent(concat!("licita-notify/", env!("CARGO_PKG_VERSION")))
        .pool_max_idle_per_host(4);
    if request_timeout > Duration::ZERO {
        builder = builder.timeout(request_timeout);
    }
    builder
        .build()
        .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))
}
