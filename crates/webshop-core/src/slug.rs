//! Random slug generation for catalog entities.
//!
//! The catalog does not derive slugs from names; entities without a
//! user-supplied slug get a random alphanumeric one. Uniqueness is enforced
//! by the caller (generate, check the table, regenerate on collision).

use rand::distr::Alphanumeric;
use rand::Rng;

/// Length of generated slugs.
pub const SLUG_LEN: usize = 10;

/// Generate a random alphanumeric slug of [`SLUG_LEN`] characters.
#[must_use]
pub fn random_slug() -> String {
    random_slug_of_len(SLUG_LEN)
}

/// Generate a random alphanumeric slug of the given length.
#[must_use]
pub fn random_slug_of_len(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}
