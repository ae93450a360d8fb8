use rustls::crypto::CryptoProvider;
use tower::BoxError;

/// Install the process-wide rustls provider used by the Cube client.
pub fn init_crypto_provider() -> Result<(), BoxError> {
    if CryptoProvider::get_default().is_none() {
        return match rustls::crypto::aws_lc_rs::default_provider().install_default() {
            Ok(_) => Ok(()),
            // Lost a race with another installer, which is just as good
            Err(_) if CryptoProvider::get_default().is_some() => Ok(()),
            Err(e) => Err(format!("failed to initialize crypto library: {:?}", e).into()),
        };
    }
    Ok(())
}
