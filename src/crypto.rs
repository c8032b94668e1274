//! CHECKSIG and CHECKMULTISIG.

use std::sync::OnceLock;

use bitcoin::secp256k1::{
    ecdsa::Signature as EcdsaSignature, Message, PublicKey, Secp256k1, VerifyOnly,
};

use crate::{
    encoding::{check_hash_type_encoding, check_pubkey_encoding, check_signature_encoding},
    engine::{Engine, MAX_OPS_PER_SCRIPT, MAX_PUBKEYS_PER_MULTISIG},
    error::ScriptError,
    opcode::unparse_script,
    sighash::{legacy_script_code, legacy_signature_hash, witness_signature_hash},
    VERIFY_DERSIG, VERIFY_NULLDUMMY, VERIFY_NULLFAIL, VERIFY_STRICTENC,
};

type VerificationContext = Secp256k1<VerifyOnly>;

static SECP256K1: OnceLock<VerificationContext> = OnceLock::new();

fn with_secp256k1_verification_ctx<R>(f: impl FnOnce(&VerificationContext) -> R) -> R {
    f(SECP256K1.get_or_init(Secp256k1::verification_only))
}

/// Signature popped by CHECKMULTISIG. Each one is parsed at most once no
/// matter how many keys it is tried against.
struct MultisigSignature {
    raw: Vec<u8>,
    parsed: ParseState,
}

enum ParseState {
    Pending,
    Invalid,
    Parsed(EcdsaSignature, u32),
}

impl Engine<'_> {
    /// Parses a DER signature, strictly when DER rules are enforced.
    fn parse_signature(&self, der: &[u8]) -> Option<EcdsaSignature> {
        let parsed = if self.flags.has(VERIFY_STRICTENC) || self.flags.has(VERIFY_DERSIG) {
            EcdsaSignature::from_der(der)
        } else {
            EcdsaSignature::from_der_lax(der)
        };
        parsed.ok()
    }

    /// Script code committed to by signatures in the executing script.
    /// Legacy signatures do not commit to themselves, so `signatures` are
    /// stripped from it.
    fn script_code(&self, signatures: &[&[u8]]) -> Result<Vec<u8>, ScriptError> {
        let script = self.executing_script()?;
        let sub_script = script.ops_from(self.last_code_sep);
        if self.is_witness_version_active(0) {
            unparse_script(&sub_script)
        } else {
            legacy_script_code(&sub_script, signatures)
        }
    }

    fn signature_hash(&mut self, script_code: &[u8], hash_type: u32) -> Result<[u8; 32], ScriptError> {
        if self.is_witness_version_active(0) {
            let sig_hashes = self.tx_sig_hashes();
            witness_signature_hash(
                script_code,
                &sig_hashes,
                hash_type,
                self.tx,
                self.input_index,
                self.amount,
            )
        } else {
            legacy_signature_hash(script_code, hash_type, self.tx, self.input_index)
        }
    }

    /// Checks `signature` over `sighash`, consulting and filling the
    /// signature cache.
    fn verify_signature(
        &self,
        sighash: &[u8; 32],
        signature: &EcdsaSignature,
        pubkey: &PublicKey,
    ) -> bool {
        if let Some(cache) = self.sig_cache {
            if cache.exists(sighash, signature, pubkey) {
                return true;
            }
        }

        let mut normalized = *signature;
        normalized.normalize_s();
        let message = Message::from_digest(*sighash);
        let valid = with_secp256k1_verification_ctx(|secp| {
            secp.verify_ecdsa(&message, &normalized, pubkey).is_ok()
        });

        if valid {
            if let Some(cache) = self.sig_cache {
                cache.add(sighash, signature, pubkey);
            }
        }
        valid
    }

    pub(crate) fn op_checksig(&mut self) -> Result<(), ScriptError> {
        let pubkey_bytes = self.dstack.pop()?;
        let full_sig = self.dstack.pop()?;

        let Some((&hash_type, der)) = full_sig.split_last() else {
            return self.dstack.push_bool(false);
        };
        let hash_type = u32::from(hash_type);
        check_hash_type_encoding(self.flags, hash_type)?;
        check_signature_encoding(self.flags, der)?;
        check_pubkey_encoding(self.flags, &pubkey_bytes, self.is_witness_version_active(0))?;

        let script_code = self.script_code(&[&full_sig])?;
        let sighash = self.signature_hash(&script_code, hash_type)?;

        // Unparseable keys and signatures are a plain false; NULLFAIL only
        // covers signatures that reached verification.
        let Ok(pubkey) = PublicKey::from_slice(&pubkey_bytes) else {
            return self.dstack.push_bool(false);
        };
        let Some(signature) = self.parse_signature(der) else {
            return self.dstack.push_bool(false);
        };

        let valid = self.verify_signature(&sighash, &signature, &pubkey);
        if !valid && self.flags.has(VERIFY_NULLFAIL) {
            return Err(ScriptError::NullFail);
        }
        self.dstack.push_bool(valid)
    }

    pub(crate) fn op_checkmultisig(&mut self) -> Result<(), ScriptError> {
        let num_keys = self.dstack.pop_num()?.to_i32();
        let num_keys = usize::try_from(num_keys)
            .ok()
            .filter(|&n| n <= MAX_PUBKEYS_PER_MULTISIG)
            .ok_or(ScriptError::InvalidPubKeyCount)?;

        self.num_ops += num_keys;
        if self.num_ops > MAX_OPS_PER_SCRIPT {
            return Err(ScriptError::TooManyOperations);
        }

        let mut pubkeys = Vec::with_capacity(num_keys);
        for _ in 0..num_keys {
            pubkeys.push(self.dstack.pop()?);
        }

        let num_sigs = self.dstack.pop_num()?.to_i32();
        let num_sigs = usize::try_from(num_sigs)
            .ok()
            .filter(|&n| n <= num_keys)
            .ok_or(ScriptError::InvalidSignatureCount)?;

        let mut signatures = Vec::with_capacity(num_sigs);
        for _ in 0..num_sigs {
            signatures.push(MultisigSignature {
                raw: self.dstack.pop()?,
                parsed: ParseState::Pending,
            });
        }

        // One extra item is consumed beyond the signatures.
        let dummy = self.dstack.pop()?;
        if self.flags.has(VERIFY_NULLDUMMY) && !dummy.is_empty() {
            return Err(ScriptError::SigNullDummy);
        }

        let raw_sigs: Vec<&[u8]> = signatures.iter().map(|sig| sig.raw.as_slice()).collect();
        let script_code = self.script_code(&raw_sigs)?;

        let mut success = true;
        let (mut sig_idx, mut key_idx) = (0, 0);
        while sig_idx < signatures.len() {
            // Not enough keys left for the remaining signatures.
            if signatures.len() - sig_idx > pubkeys.len() - key_idx {
                success = false;
                break;
            }

            let pubkey_bytes = &pubkeys[key_idx];
            key_idx += 1;

            let sig = &mut signatures[sig_idx];
            if sig.raw.is_empty() {
                continue;
            }

            if let ParseState::Pending = sig.parsed {
                sig.parsed = match sig.raw.split_last() {
                    Some((&hash_type, der)) => {
                        let hash_type = u32::from(hash_type);
                        check_hash_type_encoding(self.flags, hash_type)?;
                        check_signature_encoding(self.flags, der)?;
                        match self.parse_signature(der) {
                            Some(parsed) => ParseState::Parsed(parsed, hash_type),
                            None => ParseState::Invalid,
                        }
                    }
                    None => ParseState::Invalid,
                };
            }
            let (signature, hash_type) = match sig.parsed {
                ParseState::Parsed(signature, hash_type) => (signature, hash_type),
                _ => continue,
            };

            check_pubkey_encoding(self.flags, pubkey_bytes, self.is_witness_version_active(0))?;
            let Ok(pubkey) = PublicKey::from_slice(pubkey_bytes) else {
                continue;
            };

            let sighash = self.signature_hash(&script_code, hash_type)?;
            if self.verify_signature(&sighash, &signature, &pubkey) {
                sig_idx += 1;
            }
        }

        if !success
            && self.flags.has(VERIFY_NULLFAIL)
            && signatures.iter().any(|sig| !sig.raw.is_empty())
        {
            return Err(ScriptError::NullFail);
        }
        self.dstack.push_bool(success)
    }
}
