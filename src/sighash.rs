//! Signature hash computation.
//!
//! Legacy inputs hash a modified copy of the whole transaction and are
//! delegated to [`bitcoin::sighash::SighashCache`]. Witness v0 inputs use the
//! BIP143 layout, built here on top of [`TxSigHashes`] so that the per
//! transaction hashes can be computed once and shared between inputs.

use bitcoin::{
    consensus,
    hashes::{sha256d, Hash, HashEngine},
    sighash::SighashCache,
    Script, ScriptBuf, Transaction,
};

use crate::{
    encoding::{SIGHASH_ANYONECANPAY, SIGHASH_MASK, SIGHASH_NONE, SIGHASH_SINGLE},
    error::ScriptError,
    opcode::{unparse_script, ParsedOpcode, OP_CODESEPARATOR},
};

/// Per-transaction hashes reused by every witness v0 signature check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxSigHashes {
    pub hash_prevouts: sha256d::Hash,
    pub hash_sequence: sha256d::Hash,
    pub hash_outputs: sha256d::Hash,
}

impl TxSigHashes {
    pub fn new(tx: &Transaction) -> Self {
        Self {
            hash_prevouts: hash_serialized(tx.input.iter().map(|input| &input.previous_output)),
            hash_sequence: hash_serialized(tx.input.iter().map(|input| &input.sequence)),
            hash_outputs: hash_serialized(tx.output.iter()),
        }
    }
}

fn hash_serialized<'a, I, T>(items: I) -> sha256d::Hash
where
    I: IntoIterator<Item = &'a T>,
    T: consensus::Encodable + 'a,
{
    let mut engine = sha256d::Hash::engine();
    for item in items {
        engine.input(&consensus::serialize(item));
    }
    sha256d::Hash::from_engine(engine)
}

/// Removes every canonical push whose data contains `data`.
pub fn remove_opcode_by_data<'a>(
    ops: &[ParsedOpcode<'a>],
    data: &[u8],
) -> Vec<ParsedOpcode<'a>> {
    ops.iter()
        .filter(|op| !op.is_canonical_push() || !contains(op.data(), data))
        .copied()
        .collect()
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|window| window == needle)
}

/// Script code signed by legacy signatures: the subscript without any
/// OP_CODESEPARATOR and without pushes of the signatures being checked.
pub fn legacy_script_code(
    sub_script: &[ParsedOpcode<'_>],
    signatures: &[&[u8]],
) -> Result<Vec<u8>, ScriptError> {
    let mut ops: Vec<ParsedOpcode<'_>> = sub_script
        .iter()
        .filter(|op| op.value() != OP_CODESEPARATOR)
        .copied()
        .collect();
    for sig in signatures {
        ops = remove_opcode_by_data(&ops, sig);
    }
    unparse_script(&ops)
}

/// Legacy signature digest. Handles the SIGHASH_SINGLE out-of-range case by
/// returning the value one.
pub fn legacy_signature_hash(
    script_code: &[u8],
    hash_type: u32,
    tx: &Transaction,
    input_index: usize,
) -> Result<[u8; 32], ScriptError> {
    let cache = SighashCache::new(tx);
    let sighash = cache
        .legacy_signature_hash(input_index, Script::from_bytes(script_code), hash_type)
        .map_err(|_| ScriptError::InvalidIndex)?;
    Ok(sighash.to_byte_array())
}

/// BIP143 signature digest for a witness v0 input.
pub fn witness_signature_hash(
    script_code: &[u8],
    sig_hashes: &TxSigHashes,
    hash_type: u32,
    tx: &Transaction,
    input_index: usize,
    amount: u64,
) -> Result<[u8; 32], ScriptError> {
    let input = tx.input.get(input_index).ok_or(ScriptError::InvalidIndex)?;
    let base_type = hash_type & SIGHASH_MASK;
    let anyone_can_pay = hash_type & SIGHASH_ANYONECANPAY != 0;
    let zero = [0u8; 32];

    let mut engine = sha256d::Hash::engine();
    engine.input(&tx.version.0.to_le_bytes());

    if anyone_can_pay {
        engine.input(&zero);
    } else {
        engine.input(sig_hashes.hash_prevouts.as_byte_array());
    }

    if anyone_can_pay || base_type == SIGHASH_SINGLE || base_type == SIGHASH_NONE {
        engine.input(&zero);
    } else {
        engine.input(sig_hashes.hash_sequence.as_byte_array());
    }

    engine.input(&consensus::serialize(&input.previous_output));
    engine.input(&consensus::serialize(&ScriptBuf::from_bytes(
        script_code.to_vec(),
    )));
    engine.input(&amount.to_le_bytes());
    engine.input(&input.sequence.0.to_le_bytes());

    if base_type != SIGHASH_SINGLE && base_type != SIGHASH_NONE {
        engine.input(sig_hashes.hash_outputs.as_byte_array());
    } else if base_type == SIGHASH_SINGLE && input_index < tx.output.len() {
        let output = sha256d::Hash::hash(&consensus::serialize(&tx.output[input_index]));
        engine.input(output.as_byte_array());
    } else {
        engine.input(&zero);
    }

    engine.input(&tx.lock_time.to_consensus_u32().to_le_bytes());
    engine.input(&hash_type.to_le_bytes());
    Ok(sha256d::Hash::from_engine(engine).to_byte_array())
}
