// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Correlation nonce generation.

/// Generate a fresh nonce for one request.
///
/// Always 12 characters, so it can never collide with the reserved
/// single-character diagnostic nonce `"0"`.
pub(crate) fn make_nonce() -> String {
    nanoid::nanoid!(12)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonces_are_unique_and_never_diagnostic() {
        let mut seen = std::collections::HashSet::new();
        for _ in 0..1000 {
            let nonce = make_nonce();
            assert_ne!(nonce, comphost_wire::DIAGNOSTIC_NONCE);
            assert!(seen.insert(nonce), "nonce collision");
        }
    }
}
