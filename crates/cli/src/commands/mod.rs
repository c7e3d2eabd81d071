pub mod config;
pub mod doctor;
pub mod normalize;
pub mod run;

use anyhow::{Context, Result, bail};
use secrecy::SecretString;

/// Read a secret from the environment variable named in config
pub(crate) fn load_secret(env_var: &str, purpose: &str) -> Result<SecretString> {
    if env_var.trim().is_empty() {
        bail!("No env var configured for {}", purpose);
    }

    let value = std::env::var(env_var)
        .with_context(|| format!("Missing env var {} for {}", env_var, purpose))?;

    if value.trim().is_empty() {
        bail!("Env var {} is empty for {}", env_var, purpose);
    }

    Ok(SecretString::new(value.into()))
}
