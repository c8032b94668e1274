//! Signature, hash type and public key encoding rules.

use crate::{
    error::ScriptError, ScriptFlags, VERIFY_DERSIG, VERIFY_LOW_S, VERIFY_STRICTENC,
    VERIFY_WITNESS_PUBKEYTYPE,
};

/// Sign every input and output.
pub const SIGHASH_ALL: u32 = 0x01;
/// Sign every input and no outputs.
pub const SIGHASH_NONE: u32 = 0x02;
/// Sign every input and the output at the same index.
pub const SIGHASH_SINGLE: u32 = 0x03;
/// Modifier restricting the signed inputs to the one being spent.
pub const SIGHASH_ANYONECANPAY: u32 = 0x80;
/// Bits selecting the base hash type.
pub const SIGHASH_MASK: u32 = 0x1f;

/// Half the order of the secp256k1 group, big-endian.
const HALF_CURVE_ORDER: [u8; 32] = [
    0x7f, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0x5d, 0x57, 0x6e, 0x73, 0x57, 0xa4, 0x50, 0x1d, 0xdf, 0xe9, 0x2f, 0x46, 0x68, 0x1b, 0x20, 0xa0,
];

/// Strict DER layout check for a signature without its hash type byte:
/// `0x30 <len> 0x02 <len R> <R> 0x02 <len S> <S>`.
pub fn is_strict_der(der: &[u8]) -> bool {
    let len = der.len();
    if !(8..=72).contains(&len) {
        return false;
    }
    if der[0] != 0x30 || usize::from(der[1]) != len - 2 {
        return false;
    }

    let len_r = usize::from(der[3]);
    if 5 + len_r >= len {
        return false;
    }
    let len_s = usize::from(der[5 + len_r]);
    if len_r + len_s + 6 != len {
        return false;
    }

    if der[2] != 0x02 || len_r == 0 || der[4] & 0x80 != 0 {
        return false;
    }
    if len_r > 1 && der[4] == 0x00 && der[5] & 0x80 == 0 {
        return false;
    }

    let s = 6 + len_r;
    if der[4 + len_r] != 0x02 || len_s == 0 || der[s] & 0x80 != 0 {
        return false;
    }
    if len_s > 1 && der[s] == 0x00 && der[s + 1] & 0x80 == 0 {
        return false;
    }
    true
}

/// Whether the S component of a strict-DER signature exceeds half the group
/// order. Only meaningful after [`is_strict_der`] accepted `der`.
fn has_high_s(der: &[u8]) -> bool {
    let len_r = usize::from(der[3]);
    let len_s = usize::from(der[5 + len_r]);
    let s = &der[6 + len_r..6 + len_r + len_s];
    let first = s.iter().position(|&b| b != 0).unwrap_or(s.len());
    let s = &s[first..];
    match s.len().cmp(&HALF_CURVE_ORDER.len()) {
        core::cmp::Ordering::Greater => true,
        core::cmp::Ordering::Less => false,
        core::cmp::Ordering::Equal => s > &HALF_CURVE_ORDER[..],
    }
}

pub fn is_compressed_pubkey(pubkey: &[u8]) -> bool {
    pubkey.len() == 33 && matches!(pubkey[0], 0x02 | 0x03)
}

fn is_valid_pubkey_encoding(pubkey: &[u8]) -> bool {
    is_compressed_pubkey(pubkey) || (pubkey.len() == 65 && pubkey[0] == 0x04)
}

/// Rejects undefined hash types under STRICTENC.
pub(crate) fn check_hash_type_encoding(
    flags: ScriptFlags,
    hash_type: u32,
) -> Result<(), ScriptError> {
    if !flags.has(VERIFY_STRICTENC) {
        return Ok(());
    }
    let base = hash_type & !SIGHASH_ANYONECANPAY;
    if !(SIGHASH_ALL..=SIGHASH_SINGLE).contains(&base) {
        return Err(ScriptError::SigHashType);
    }
    Ok(())
}

/// Applies the DER and low-S rules to a signature stripped of its hash type.
pub(crate) fn check_signature_encoding(flags: ScriptFlags, der: &[u8]) -> Result<(), ScriptError> {
    if !flags.has(VERIFY_DERSIG) && !flags.has(VERIFY_LOW_S) && !flags.has(VERIFY_STRICTENC) {
        return Ok(());
    }
    if !is_strict_der(der) {
        return Err(ScriptError::SigDer);
    }
    if flags.has(VERIFY_LOW_S) && has_high_s(der) {
        return Err(ScriptError::SigHighS);
    }
    Ok(())
}

pub(crate) fn check_pubkey_encoding(
    flags: ScriptFlags,
    pubkey: &[u8],
    witness_v0: bool,
) -> Result<(), ScriptError> {
    if witness_v0 && flags.has(VERIFY_WITNESS_PUBKEYTYPE) && !is_compressed_pubkey(pubkey) {
        return Err(ScriptError::WitnessPubkeyType);
    }
    if flags.has(VERIFY_STRICTENC) && !is_valid_pubkey_encoding(pubkey) {
        return Err(ScriptError::PubkeyType);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::VERIFY_NONE;

    // 30 06 02 01 01 02 01 01
    const MINIMAL_DER: [u8; 8] = [0x30, 0x06, 0x02, 0x01, 0x01, 0x02, 0x01, 0x01];

    fn flags(bits: u32) -> ScriptFlags {
        ScriptFlags::from_bits(bits).unwrap()
    }

    fn der_with_s(s: &[u8]) -> Vec<u8> {
        let mut der = vec![0x30, (4 + 1 + s.len()) as u8, 0x02, 0x01, 0x01, 0x02, s.len() as u8];
        der.extend_from_slice(s);
        der
    }

    #[test]
    fn strict_der_layout() {
        assert!(is_strict_der(&MINIMAL_DER));
        let mut bad_tag = MINIMAL_DER;
        bad_tag[0] = 0x31;
        assert!(!is_strict_der(&bad_tag));
        let mut negative_r = MINIMAL_DER;
        negative_r[4] = 0x81;
        assert!(!is_strict_der(&negative_r));
        assert!(!is_strict_der(&der_with_s(&[0x00, 0x01])));
        assert!(is_strict_der(&der_with_s(&[0x00, 0x81])));
        assert!(!is_strict_der(&MINIMAL_DER[..7]));
    }

    #[test]
    fn low_s_boundary() {
        let mut half = HALF_CURVE_ORDER.to_vec();
        assert!(!has_high_s(&der_with_s(&half)));
        half[31] += 1;
        assert!(has_high_s(&der_with_s(&half)));

        let mut high = vec![0x00];
        high.extend_from_slice(&[0xff; 32]);
        assert_eq!(
            check_signature_encoding(flags(VERIFY_LOW_S), &der_with_s(&high)),
            Err(ScriptError::SigHighS)
        );
        assert!(check_signature_encoding(flags(VERIFY_DERSIG), &der_with_s(&high)).is_ok());
    }

    #[test]
    fn encoding_checks_are_flag_gated() {
        assert!(check_signature_encoding(flags(VERIFY_NONE), &[0xde, 0xad]).is_ok());
        assert_eq!(
            check_signature_encoding(flags(VERIFY_DERSIG), &[0xde, 0xad]),
            Err(ScriptError::SigDer)
        );

        assert!(check_hash_type_encoding(flags(VERIFY_NONE), 0x00).is_ok());
        assert_eq!(
            check_hash_type_encoding(flags(VERIFY_STRICTENC), 0x04),
            Err(ScriptError::SigHashType)
        );
        assert!(check_hash_type_encoding(flags(VERIFY_STRICTENC), 0x83).is_ok());
        assert_eq!(
            check_hash_type_encoding(flags(VERIFY_STRICTENC), 0x21),
            Err(ScriptError::SigHashType)
        );
    }

    #[test]
    fn pubkey_encoding_rules() {
        let compressed = [0x02; 33];
        let mut uncompressed = [0x11; 65];
        uncompressed[0] = 0x04;
        let hybrid = {
            let mut key = uncompressed;
            key[0] = 0x06;
            key
        };

        let strict = flags(VERIFY_STRICTENC);
        assert!(check_pubkey_encoding(strict, &compressed, false).is_ok());
        assert!(check_pubkey_encoding(strict, &uncompressed, false).is_ok());
        assert_eq!(
            check_pubkey_encoding(strict, &hybrid, false),
            Err(ScriptError::PubkeyType)
        );
        assert!(check_pubkey_encoding(flags(VERIFY_NONE), &hybrid, false).is_ok());

        let witness = flags(crate::VERIFY_WITNESS | VERIFY_WITNESS_PUBKEYTYPE);
        assert_eq!(
            check_pubkey_encoding(witness, &uncompressed, true),
            Err(ScriptError::WitnessPubkeyType)
        );
        assert!(check_pubkey_encoding(witness, &uncompressed, false).is_ok());
    }
}
