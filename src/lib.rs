//! Deterministic evaluator for transaction authorization scripts.
//!
//! The crate decides whether an input's unlocking script (and witness, where
//! present) satisfies the locking script of the output it spends. Every rule,
//! including the historical quirks of signature checking, is applied exactly so
//! that all validating parties reach the same verdict.
//!
//! The byte-oriented entry points ([`verify`], [`verify_with_flags`]) take a
//! serialized transaction. [`verify_input`] and [`Engine`] work on a decoded
//! [`bitcoin::Transaction`] and accept the shared [`SigCache`] and
//! [`HashCache`].

mod cache;
mod crypto;
mod encoding;
mod engine;
mod error;
mod locktime;
mod num;
pub mod opcode;
mod ops;
mod sighash;
mod stack;
mod tx;

pub use crate::{
    cache::{HashCache, SigCache},
    encoding::{
        is_compressed_pubkey, is_strict_der, SIGHASH_ALL, SIGHASH_ANYONECANPAY, SIGHASH_MASK,
        SIGHASH_NONE, SIGHASH_SINGLE,
    },
    engine::{
        extract_witness_program, is_pay_to_script_hash, is_witness_program, Engine, EngineState,
        MAX_OPS_PER_SCRIPT, MAX_PUBKEYS_PER_MULTISIG, MAX_SCRIPT_SIZE,
    },
    error::{Error, ScriptError},
    locktime::{
        LOCK_TIME_THRESHOLD, SEQUENCE_LOCKTIME_DISABLE_FLAG, SEQUENCE_LOCKTIME_MASK,
        SEQUENCE_LOCKTIME_TYPE_FLAG,
    },
    num::{
        cast_to_bool, check_minimal_data_encoding, ScriptNum, DEFAULT_SCRIPT_NUM_LEN,
        LOCKTIME_SCRIPT_NUM_LEN,
    },
    opcode::{disasm_string, opcode_by_name, parse_script, unparse_script, ParsedOpcode},
    sighash::{
        legacy_script_code, legacy_signature_hash, remove_opcode_by_data, witness_signature_hash,
        TxSigHashes,
    },
    stack::{ScriptStack, MAX_SCRIPT_ELEMENT_SIZE, MAX_STACK_SIZE},
};

use bitcoin::Transaction;
use tracing::instrument;

use crate::tx::TransactionContext;

/// Do not enable any verification.
pub const VERIFY_NONE: u32 = 0;
/// Evaluate P2SH (BIP16) redeem scripts.
pub const VERIFY_P2SH: u32 = 1 << 0;
/// Enforce strict signature, hash type and public key encodings.
pub const VERIFY_STRICTENC: u32 = 1 << 1;
/// Enforce strict DER (BIP66) signatures.
pub const VERIFY_DERSIG: u32 = 1 << 2;
/// Require signatures to use low-S form.
pub const VERIFY_LOW_S: u32 = 1 << 3;
/// Require the CHECKMULTISIG dummy argument to be empty (BIP147).
pub const VERIFY_NULLDUMMY: u32 = 1 << 4;
/// Require the unlocking script to be push only.
pub const VERIFY_SIGPUSHONLY: u32 = 1 << 5;
/// Require minimal push and number encodings.
pub const VERIFY_MINIMALDATA: u32 = 1 << 6;
/// Fail on NOPs reserved for soft-fork upgrades.
pub const VERIFY_DISCOURAGE_UPGRADABLE_NOPS: u32 = 1 << 7;
/// Require exactly one stack item after evaluation.
pub const VERIFY_CLEANSTACK: u32 = 1 << 8;
/// Enable CHECKLOCKTIMEVERIFY (BIP65).
pub const VERIFY_CHECKLOCKTIMEVERIFY: u32 = 1 << 9;
/// Enable CHECKSEQUENCEVERIFY (BIP112).
pub const VERIFY_CHECKSEQUENCEVERIFY: u32 = 1 << 10;
/// Evaluate witness programs (BIP141).
pub const VERIFY_WITNESS: u32 = 1 << 11;
/// Fail on witness program versions without defined semantics.
pub const VERIFY_DISCOURAGE_UPGRADABLE_WITNESS_PROGRAM: u32 = 1 << 12;
/// Require OP_IF/NOTIF arguments in witness v0 scripts to be empty or `0x01`.
pub const VERIFY_MINIMALIF: u32 = 1 << 13;
/// Require failed signature checks to carry empty signatures (BIP146).
pub const VERIFY_NULLFAIL: u32 = 1 << 14;
/// Require compressed public keys in witness v0 scripts.
pub const VERIFY_WITNESS_PUBKEYTYPE: u32 = 1 << 15;

/// Rules every block must satisfy.
pub const VERIFY_CONSENSUS: u32 = VERIFY_P2SH
    | VERIFY_DERSIG
    | VERIFY_NULLDUMMY
    | VERIFY_CHECKLOCKTIMEVERIFY
    | VERIFY_CHECKSEQUENCEVERIFY
    | VERIFY_WITNESS;

/// Rules applied to transactions accepted for relay.
pub const VERIFY_STANDARD: u32 = VERIFY_CONSENSUS
    | VERIFY_STRICTENC
    | VERIFY_LOW_S
    | VERIFY_MINIMALDATA
    | VERIFY_DISCOURAGE_UPGRADABLE_NOPS
    | VERIFY_CLEANSTACK
    | VERIFY_DISCOURAGE_UPGRADABLE_WITNESS_PROGRAM
    | VERIFY_MINIMALIF
    | VERIFY_NULLFAIL
    | VERIFY_WITNESS_PUBKEYTYPE;

const SUPPORTED_FLAGS: u32 = VERIFY_STANDARD | VERIFY_SIGPUSHONLY;

/// Validated set of verification flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScriptFlags(u32);

impl ScriptFlags {
    /// Rejects unknown bits and applies implied ones (WITNESS implies P2SH).
    pub fn from_bits(bits: u32) -> Result<Self, Error> {
        if bits & !SUPPORTED_FLAGS != 0 {
            return Err(Error::InvalidFlags);
        }
        Ok(Self(Self::apply_implied_bits(bits)))
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn has(self, flag: u32) -> bool {
        self.0 & flag == flag
    }

    fn apply_implied_bits(mut bits: u32) -> u32 {
        if bits & VERIFY_WITNESS != 0 {
            bits |= VERIFY_P2SH;
        }
        bits
    }
}

/// Verifies input `input_index` of a serialized transaction under the
/// consensus flag set.
pub fn verify(
    spent_output: &[u8],
    amount: u64,
    spending_transaction: &[u8],
    input_index: usize,
) -> Result<(), Error> {
    verify_with_flags(
        spent_output,
        amount,
        spending_transaction,
        input_index,
        VERIFY_CONSENSUS,
    )
}

/// Same as [`verify`] but with explicit verification flags.
#[instrument(level = "debug", skip_all, fields(input_index = input_index, flags = flags))]
pub fn verify_with_flags(
    spent_output_script: &[u8],
    amount: u64,
    spending_transaction: &[u8],
    input_index: usize,
    flags: u32,
) -> Result<(), Error> {
    let tx_ctx = TransactionContext::parse(spending_transaction)?;
    tx_ctx.ensure_input_index(input_index)?;
    let flags = ScriptFlags::from_bits(flags)?;

    let sig_hashes = tx_ctx.sig_hashes();
    let mut engine = Engine::new(spent_output_script, tx_ctx.tx(), input_index, flags, amount)?;
    if let Some(hashes) = sig_hashes.as_ref() {
        engine = engine.with_tx_sig_hashes(hashes);
    }
    engine.execute()?;
    Ok(())
}

/// Verifies one input of a decoded transaction, optionally sharing signature
/// and sighash caches with other evaluations.
pub fn verify_input(
    tx: &Transaction,
    input_index: usize,
    script_pubkey: &[u8],
    amount: u64,
    flags: ScriptFlags,
    sig_cache: Option<&SigCache>,
    hash_cache: Option<&HashCache>,
) -> Result<(), ScriptError> {
    let sig_hashes = hash_cache.map(|cache| cache.add_sig_hashes(tx));
    let mut engine = Engine::new(script_pubkey, tx, input_index, flags, amount)?;
    if let Some(cache) = sig_cache {
        engine = engine.with_sig_cache(cache);
    }
    if let Some(hashes) = sig_hashes.as_deref() {
        engine = engine.with_tx_sig_hashes(hashes);
    }
    engine.execute()
}
