//! Tracing setup shared by the binaries, plus log-safe text ids.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_FILTER: &str = "fake_news_orchestrator=info,warn";

/// Install the global subscriber. `LOG_FORMAT=json` switches to JSON lines.
///
/// Uses `try_init`, so a runtime that already installed a subscriber (Shuttle)
/// keeps its own and this call is a no-op.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    let _ = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
}

/// Short anonymized id for a text: first 6 bytes of SHA-256, hex.
/// Raw article text never goes to the logs; this does.
pub(crate) fn anon_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anon_hash_is_short_and_stable() {
        let a = anon_hash("some article");
        assert_eq!(a.len(), 12);
        assert_eq!(a, anon_hash("some article"));
        assert_ne!(a, anon_hash("some article!"));
    }
}
