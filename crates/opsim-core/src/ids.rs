//! Opaque identifier generation.

/// Generate `len` lowercase hex characters from the OS RNG.
///
/// Used for session ids (12 chars) and event ids (32 chars). Identifiers are
/// opaque handles, never parsed.
///
/// # Panics
///
/// Panics if the OS RNG fails; a simulator that cannot mint unique session
/// ids cannot run, and RNG failure indicates an OS-level fault.
#[must_use]
pub fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len.div_ceil(2)];
    #[allow(clippy::expect_used)]
    getrandom::fill(&mut bytes).expect("OS RNG failure is unrecoverable");
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in &bytes {
        out.push_str(&format!("{byte:02x}"));
    }
    out.truncate(len);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_is_exact() {
        assert_eq!(random_hex(12).len(), 12);
        assert_eq!(random_hex(13).len(), 13);
        assert_eq!(random_hex(32).len(), 32);
    }

    #[test]
    fn ids_are_distinct() {
        assert_ne!(random_hex(32), random_hex(32));
    }

    #[test]
    fn ids_are_lowercase_hex() {
        assert!(random_hex(32).bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()));
    }
}
