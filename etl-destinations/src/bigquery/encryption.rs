use std::sync::Once;

/// Ensures crypto provider is only initialized once.
static INIT_CRYPTO: Once = Once::new();

/// Installs the default cryptographic provider for BigQuery operations.
///
/// Uses the AWS LC provider. If another provider was installed by the process first, that one
/// is kept.
pub fn install_crypto_provider_for_bigquery() {
    INIT_CRYPTO.call_once(|| {
        if rustls::crypto::aws_lc_rs::default_provider()
            .install_default()
            .is_err()
        {
            tracing::debug!("a default crypto provider was already installed");
        }
    });
}
