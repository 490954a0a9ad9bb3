//! Opaque identifier generation.

use rand::distributions::Alphanumeric;
use rand::Rng;

/// Generates a prefixed random identifier, e.g. `prompt-x4QznR0aB2cD`.
pub fn generate(prefix: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(12)
        .map(char::from)
        .collect();
    format!("{prefix}-{suffix}")
}
