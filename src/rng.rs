use rand::{rngs::StdRng, SeedableRng};
use std::sync::atomic::{AtomicU64, Ordering};

static COUNTER: AtomicU64 = AtomicU64::new(0);

/// Base seed taken from the `SEED` environment variable, `0` when unset.
pub fn env_seed() -> u64 {
    std::env::var("SEED")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}

/// Create a [`StdRng`] seeded from the `SEED` environment variable.
///
/// Each call uses a unique seed derived from the base seed and an
/// incrementing counter so layers get distinct but reproducible streams.
pub fn rng_from_env() -> StdRng {
    let idx = COUNTER.fetch_add(1, Ordering::SeqCst);
    StdRng::seed_from_u64(env_seed().wrapping_add(idx))
}
