//! Random record identifiers

use rand::Rng;

/// Symbols drawn for generated identifiers.
pub const ID_ALPHABET: &[u8; 62] =
    b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Identifier length used when a kind does not configure one.
pub const DEFAULT_ID_LENGTH: usize = 16;

/// Draw a random identifier of `length` characters from [`ID_ALPHABET`].
///
/// Uniqueness is not checked here; the tiered store probes every enabled
/// tier before assigning a drawn id.
pub fn random_id<G: Rng + ?Sized>(rng: &mut G, length: usize) -> String {
    (0..length)
        .map(|_| ID_ALPHABET[rng.random_range(0..ID_ALPHABET.len())] as char)
        .collect()
}

/// Whether `id` has exactly `length` characters, all from [`ID_ALPHABET`].
pub fn is_valid_id(id: &str, length: usize) -> bool {
    id.len() == length && id.bytes().all(|b| b.is_ascii_alphanumeric())
}
