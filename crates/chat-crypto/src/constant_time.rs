//! Constant-time cryptographic operations.
//!
//! Provides timing-safe operations to prevent side-channel attacks.
//! All comparisons and selections are constant-time with respect to
//! secret data.

use subtle::{Choice, ConditionallySelectable, ConstantTimeEq};

/// Constant-time comparison of byte slices.
///
/// Returns `true` if slices are equal, `false` otherwise.
/// Execution time depends only on slice length, not content.
#[must_use]
pub fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.ct_eq(b).into()
}

/// Constant-time conditional copy.
///
/// If `condition` is true, copies `a` to `out`.
/// If `condition` is false, copies `b` to `out`.
///
/// # Panics
///
/// Panics if slice lengths don't match.
pub fn ct_select(condition: bool, a: &[u8], b: &[u8], out: &mut [u8]) {
    assert_eq!(a.len(), b.len());
    assert_eq!(a.len(), out.len());

    let choice = Choice::from(u8::from(condition));

    for i in 0..out.len() {
        out[i] = u8::conditional_select(&b[i], &a[i], choice);
    }
}

/// Timing-safe 32-byte array comparison.
#[must_use]
#[inline(never)]
pub fn verify_32(a: &[u8; 32], b: &[u8; 32]) -> bool {
    ct_eq(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ct_eq_same() {
        let a = [1u8; 32];
        let b = [1u8; 32];
        assert!(ct_eq(&a, &b));
    }

    #[test]
    fn test_ct_eq_different() {
        let a = [1u8; 32];
        let b = [2u8; 32];
        assert!(!ct_eq(&a, &b));
    }

    #[test]
    fn test_ct_eq_different_lengths() {
        let a = [1u8; 32];
        let b = [1u8; 16];
        assert!(!ct_eq(&a, &b));
    }

    #[test]
    fn test_ct_select_true() {
        let a = [1u8; 8];
        let b = [2u8; 8];
        let mut out = [0u8; 8];

        ct_select(true, &a, &b, &mut out);
        assert_eq!(out, a);
    }

    #[test]
    fn test_ct_select_false() {
        let a = [1u8; 8];
        let b = [2u8; 8];
        let mut out = [0u8; 8];

        ct_select(false, &a, &b, &mut out);
        assert_eq!(out, b);
    }

    #[test]
    fn test_verify_32() {
        let a = [0x42u8; 32];
        let b = [0x42u8; 32];
        let c = [0x43u8; 32];

        assert!(verify_32(&a, &b));
        assert!(!verify_32(&a, &c));
    }
}
