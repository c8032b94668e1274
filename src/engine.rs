//! Script execution engine.
//!
//! An [`Engine`] evaluates one transaction input. It runs the unlocking script,
//! then the locking script, and (when P2SH or witness rules apply) a third
//! script taken from the unlocking data. Evaluation can be driven one opcode
//! at a time with [`Engine::step`] or to completion with [`Engine::execute`].

use std::{mem, sync::Arc};

use bitcoin::{
    hashes::{sha256, Hash},
    Transaction,
};
use tracing::{debug, trace};

use crate::{
    cache::SigCache,
    error::ScriptError,
    opcode::{
        is_push_only, ParsedOpcode, ParsedScript, OP_0, OP_1, OP_16, OP_CHECKSIG, OP_DATA_20,
        OP_DUP, OP_EQUAL, OP_EQUALVERIFY, OP_HASH160, OP_PUSHDATA4,
    },
    sighash::TxSigHashes,
    stack::{ScriptStack, MAX_SCRIPT_ELEMENT_SIZE, MAX_STACK_SIZE},
    ScriptFlags, VERIFY_CLEANSTACK, VERIFY_DISCOURAGE_UPGRADABLE_WITNESS_PROGRAM,
    VERIFY_MINIMALDATA, VERIFY_P2SH, VERIFY_SIGPUSHONLY, VERIFY_WITNESS,
};

/// Maximum number of non-push operations per script.
pub const MAX_OPS_PER_SCRIPT: usize = 201;
/// Maximum number of public keys in a CHECKMULTISIG.
pub const MAX_PUBKEYS_PER_MULTISIG: usize = 20;
/// Maximum size in bytes of any script the engine evaluates.
pub const MAX_SCRIPT_SIZE: usize = 10_000;

const WITNESS_V0_KEYHASH_LEN: usize = 20;
const WITNESS_V0_SCRIPTHASH_LEN: usize = 32;

/// Lifecycle of an [`Engine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Constructed, no opcode executed yet.
    Ready,
    /// At least one opcode executed, outcome not yet known.
    Running,
    /// Every script ran and the final stack check passed.
    Succeeded,
    /// Evaluation stopped with an error.
    Failed(ScriptError),
}

/// Entry on the condition stack. `Skip` marks branches nested inside a
/// non-executing branch, whose own condition was never evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Condition {
    True,
    False,
    Skip,
}

/// Whether `script` is the P2SH template `OP_HASH160 <20 bytes> OP_EQUAL`.
pub fn is_pay_to_script_hash(script: &[u8]) -> bool {
    script.len() == 23
        && script[0] == OP_HASH160
        && script[1] == OP_DATA_20
        && script[22] == OP_EQUAL
}

/// Whether `script` is a version byte followed by one push of 2 to 40 bytes.
pub fn is_witness_program(script: &[u8]) -> bool {
    extract_witness_program(script).is_some()
}

/// Splits a witness program into its version and program bytes.
pub fn extract_witness_program(script: &[u8]) -> Option<(u8, &[u8])> {
    if !(4..=42).contains(&script.len()) {
        return None;
    }
    let version = match script[0] {
        OP_0 => 0,
        op @ OP_1..=OP_16 => op - OP_1 + 1,
        _ => return None,
    };
    let push = usize::from(script[1]);
    if push + 2 != script.len() {
        return None;
    }
    Some((version, &script[2..]))
}

fn parse_checked(bytes: Vec<u8>) -> Result<ParsedScript, ScriptError> {
    if bytes.len() > MAX_SCRIPT_SIZE {
        return Err(ScriptError::ScriptSize);
    }
    ParsedScript::parse(bytes)
}

/// Evaluates the scripts guarding one transaction input.
pub struct Engine<'a> {
    pub(crate) tx: &'a Transaction,
    pub(crate) input_index: usize,
    pub(crate) amount: u64,
    pub(crate) flags: ScriptFlags,
    pub(crate) sig_cache: Option<&'a SigCache>,
    sig_hashes: Option<&'a TxSigHashes>,
    own_sig_hashes: Option<TxSigHashes>,
    scripts: Vec<Arc<ParsedScript>>,
    script_idx: usize,
    script_off: usize,
    pub(crate) last_code_sep: usize,
    pub(crate) dstack: ScriptStack,
    pub(crate) astack: ScriptStack,
    pub(crate) cond_stack: Vec<Condition>,
    pub(crate) num_ops: usize,
    bip16: bool,
    saved_first_stack: Vec<Vec<u8>>,
    witness_version: u8,
    witness_program: Option<Vec<u8>>,
    state: EngineState,
}

impl<'a> Engine<'a> {
    /// Prepares evaluation of input `input_index` of `tx` against
    /// `script_pubkey`. `amount` is the value of the spent output and is only
    /// signed over by witness signatures.
    pub fn new(
        script_pubkey: &[u8],
        tx: &'a Transaction,
        input_index: usize,
        flags: ScriptFlags,
        amount: u64,
    ) -> Result<Self, ScriptError> {
        let input = tx.input.get(input_index).ok_or(ScriptError::InvalidIndex)?;
        let script_sig = input.script_sig.as_bytes();
        if script_sig.is_empty() && script_pubkey.is_empty() {
            return Err(ScriptError::EvalFalse);
        }

        if flags.has(VERIFY_CLEANSTACK) && !flags.has(VERIFY_P2SH) && !flags.has(VERIFY_WITNESS) {
            return Err(ScriptError::InvalidFlags);
        }

        let sig_script = parse_checked(script_sig.to_vec())?;
        let pk_script = parse_checked(script_pubkey.to_vec())?;

        let sig_push_only = is_push_only(&sig_script.ops_from(0));
        if flags.has(VERIFY_SIGPUSHONLY) && !sig_push_only {
            return Err(ScriptError::SigPushOnly);
        }

        let bip16 = flags.has(VERIFY_P2SH) && is_pay_to_script_hash(script_pubkey);
        if bip16 && !sig_push_only {
            return Err(ScriptError::SigPushOnly);
        }

        let mut witness_program = None;
        let mut witness_version = 0;
        if flags.has(VERIFY_WITNESS) {
            if is_witness_program(script_pubkey) {
                if !script_sig.is_empty() {
                    return Err(ScriptError::WitnessMalleated);
                }
                witness_program = Some(script_pubkey);
            } else if !input.witness.is_empty() && bip16 {
                // Nested programs must be pushed by a scriptSig holding
                // nothing but that single canonical push.
                match (sig_script.len(), sig_script.get(0)) {
                    (1, Some(op)) if op.is_canonical_push() && is_witness_program(op.data()) => {
                        witness_program = Some(op.data());
                    }
                    _ => return Err(ScriptError::WitnessMalleatedP2SH),
                }
            }

            match witness_program.and_then(extract_witness_program) {
                Some((version, _)) => witness_version = version,
                None if !input.witness.is_empty() => return Err(ScriptError::WitnessUnexpected),
                None => {}
            }
        }
        let witness_program = witness_program
            .and_then(extract_witness_program)
            .map(|(_, program)| program.to_vec());

        let minimal = flags.has(VERIFY_MINIMALDATA);
        let script_idx = usize::from(script_sig.is_empty());

        Ok(Self {
            tx,
            input_index,
            amount,
            flags,
            sig_cache: None,
            sig_hashes: None,
            own_sig_hashes: None,
            scripts: vec![Arc::new(sig_script), Arc::new(pk_script)],
            script_idx,
            script_off: 0,
            last_code_sep: 0,
            dstack: ScriptStack::new(minimal),
            astack: ScriptStack::new(minimal),
            cond_stack: Vec::new(),
            num_ops: 0,
            bip16,
            saved_first_stack: Vec::new(),
            witness_version,
            witness_program,
            state: EngineState::Ready,
        })
    }

    /// Shares a signature cache with other engines.
    pub fn with_sig_cache(mut self, cache: &'a SigCache) -> Self {
        self.sig_cache = Some(cache);
        self
    }

    /// Supplies the witness sighash midstate of the spending transaction.
    /// Without it the engine computes one lazily.
    pub fn with_tx_sig_hashes(mut self, hashes: &'a TxSigHashes) -> Self {
        self.sig_hashes = Some(hashes);
        self
    }

    /// Where the engine is in its run.
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Data stack, bottom to top.
    pub fn stack(&self) -> &[Vec<u8>] {
        self.dstack.items()
    }

    /// Alternate stack, bottom to top.
    pub fn alt_stack(&self) -> &[Vec<u8>] {
        self.astack.items()
    }

    /// Replaces the data stack, bottom to top.
    pub fn set_stack(&mut self, items: Vec<Vec<u8>>) {
        self.dstack.set_items(items);
    }

    /// Replaces the alternate stack, bottom to top.
    pub fn set_alt_stack(&mut self, items: Vec<Vec<u8>>) {
        self.astack.set_items(items);
    }

    /// Runs every remaining opcode and the final stack check.
    pub fn execute(&mut self) -> Result<(), ScriptError> {
        loop {
            match self.step() {
                Ok(true) => break,
                Ok(false) => {}
                Err(err) => {
                    debug!(
                        input = self.input_index,
                        script = self.script_idx,
                        offset = self.script_off,
                        error = %err,
                        "script evaluation failed"
                    );
                    return Err(err);
                }
            }
        }
        let result = self.check_error_condition(true);
        if let Err(err) = result {
            debug!(input = self.input_index, error = %err, "final stack check failed");
        }
        result
    }

    /// Executes the next opcode. Returns `true` once every script has run;
    /// the caller should then invoke [`Engine::check_error_condition`].
    pub fn step(&mut self) -> Result<bool, ScriptError> {
        match self.state {
            EngineState::Succeeded | EngineState::Failed(_) => {
                return Err(ScriptError::InvalidProgramCounter)
            }
            EngineState::Ready => self.state = EngineState::Running,
            EngineState::Running => {}
        }
        let result = self.step_inner();
        if let Err(err) = result {
            self.state = EngineState::Failed(err);
        }
        result
    }

    fn step_inner(&mut self) -> Result<bool, ScriptError> {
        let script = self.current_script()?;
        let op = script
            .get(self.script_off)
            .ok_or(ScriptError::InvalidProgramCounter)?;
        trace!(
            script = self.script_idx,
            offset = self.script_off,
            opcode = %op.opcode(),
            depth = self.dstack.depth(),
            "step"
        );
        self.script_off += 1;

        self.execute_opcode(&op)?;

        if self.dstack.depth() + self.astack.depth() > MAX_STACK_SIZE {
            return Err(ScriptError::StackSize);
        }

        if self.script_off < script.len() {
            return Ok(false);
        }

        if !self.cond_stack.is_empty() {
            return Err(ScriptError::UnbalancedConditional);
        }

        self.astack.clear();
        self.num_ops = 0;
        self.script_off = 0;

        if self.script_idx == 0 && self.bip16 {
            self.script_idx += 1;
            self.saved_first_stack = self.dstack.items().to_vec();
        } else if self.script_idx == 1 && self.bip16 {
            self.script_idx += 1;
            self.check_error_condition(false)?;

            let mut saved = mem::take(&mut self.saved_first_stack);
            let redeem_script = saved.pop().ok_or(ScriptError::EvalFalse)?;
            self.scripts.push(Arc::new(parse_checked(redeem_script)?));
            self.dstack.set_items(saved);
        } else if self.witness_program.is_some()
            && (self.script_idx == 1 || (self.script_idx == 2 && self.bip16))
        {
            self.script_idx += 1;
            self.verify_witness_program()?;
        } else {
            self.script_idx += 1;
        }

        if self
            .scripts
            .get(self.script_idx)
            .is_some_and(|next| next.is_empty())
        {
            self.script_idx += 1;
        }

        self.last_code_sep = 0;
        Ok(self.script_idx >= self.scripts.len())
    }

    /// Checks the stack once evaluation has finished. With `final_script`
    /// the witness and CLEANSTACK depth rules apply as well.
    pub fn check_error_condition(&mut self, final_script: bool) -> Result<(), ScriptError> {
        let result = self.final_stack_check(final_script);
        if final_script {
            self.state = match result {
                Ok(()) => EngineState::Succeeded,
                Err(err) => EngineState::Failed(err),
            };
        }
        result
    }

    fn final_stack_check(&mut self, final_script: bool) -> Result<(), ScriptError> {
        if self.script_idx < self.scripts.len() {
            return Err(ScriptError::ScriptUnfinished);
        }
        if final_script
            && (self.is_witness_version_active(0) || self.flags.has(VERIFY_CLEANSTACK))
            && self.dstack.depth() != 1
        {
            return Err(ScriptError::CleanStack);
        }
        if self.dstack.is_empty() {
            return Err(ScriptError::EvalFalse);
        }
        if !self.dstack.pop_bool()? {
            return Err(ScriptError::EvalFalse);
        }
        Ok(())
    }

    fn current_script(&self) -> Result<Arc<ParsedScript>, ScriptError> {
        let script = self
            .scripts
            .get(self.script_idx)
            .ok_or(ScriptError::InvalidProgramCounter)?;
        if self.script_off >= script.len() {
            return Err(ScriptError::InvalidProgramCounter);
        }
        Ok(Arc::clone(script))
    }

    /// Script currently executing, used for signature script code.
    pub(crate) fn executing_script(&self) -> Result<Arc<ParsedScript>, ScriptError> {
        self.scripts
            .get(self.script_idx)
            .cloned()
            .ok_or(ScriptError::InvalidProgramCounter)
    }

    /// Index within the executing script of the next opcode.
    pub(crate) fn script_offset(&self) -> usize {
        self.script_off
    }

    pub(crate) fn is_witness_version_active(&self, version: u8) -> bool {
        self.witness_program.is_some() && self.witness_version == version
    }

    /// Witness midstate, computed on first use if none was supplied.
    pub(crate) fn tx_sig_hashes(&mut self) -> TxSigHashes {
        if let Some(hashes) = self.sig_hashes {
            return *hashes;
        }
        let tx = self.tx;
        *self
            .own_sig_hashes
            .get_or_insert_with(|| TxSigHashes::new(tx))
    }

    pub(crate) fn is_branch_executing(&self) -> bool {
        matches!(self.cond_stack.last(), None | Some(Condition::True))
    }

    fn execute_opcode(&mut self, op: &ParsedOpcode<'_>) -> Result<(), ScriptError> {
        if op.is_disabled() {
            return Err(ScriptError::DisabledOpcode);
        }
        if op.is_always_illegal() {
            return Err(ScriptError::ReservedOpcode);
        }

        if op.value() > OP_16 {
            self.num_ops += 1;
            if self.num_ops > MAX_OPS_PER_SCRIPT {
                return Err(ScriptError::TooManyOperations);
            }
        } else if op.data().len() > MAX_SCRIPT_ELEMENT_SIZE {
            return Err(ScriptError::ElementSize);
        }

        if !self.is_branch_executing() && !op.is_conditional() {
            return Ok(());
        }

        if self.flags.has(VERIFY_MINIMALDATA) && op.value() <= OP_PUSHDATA4 {
            op.check_minimal_data_push()?;
        }

        self.dispatch(op)
    }

    fn verify_witness_program(&mut self) -> Result<(), ScriptError> {
        let Some(program) = self.witness_program.clone() else {
            return Ok(());
        };
        let witness: Vec<Vec<u8>> = self.tx.input[self.input_index]
            .witness
            .iter()
            .map(<[u8]>::to_vec)
            .collect();

        if self.witness_version != 0 {
            if self.flags.has(VERIFY_DISCOURAGE_UPGRADABLE_WITNESS_PROGRAM) {
                return Err(ScriptError::DiscourageUpgradableWitnessProgram);
            }
            // Unknown versions succeed as long as the program itself is true.
            // Only the version push remains so CLEANSTACK is satisfied.
            if !self.dstack.peek_bool(0)? {
                return Err(ScriptError::EvalFalse);
            }
            let bottom = self.dstack.items()[..1].to_vec();
            self.dstack.set_items(bottom);
            self.witness_program = None;
            return Ok(());
        }

        match program.len() {
            WITNESS_V0_KEYHASH_LEN => {
                if witness.len() != 2 {
                    return Err(ScriptError::WitnessProgramMismatch);
                }
                let mut script = Vec::with_capacity(25);
                script.extend_from_slice(&[OP_DUP, OP_HASH160, OP_DATA_20]);
                script.extend_from_slice(&program);
                script.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
                self.scripts.push(Arc::new(ParsedScript::parse(script)?));
                self.dstack.set_items(witness);
            }
            WITNESS_V0_SCRIPTHASH_LEN => {
                let mut items = witness;
                let witness_script = items
                    .pop()
                    .ok_or(ScriptError::WitnessProgramWitnessEmpty)?;
                if witness_script.len() > MAX_SCRIPT_SIZE {
                    return Err(ScriptError::ScriptSize);
                }
                if sha256::Hash::hash(&witness_script).as_byte_array()[..] != program[..] {
                    return Err(ScriptError::WitnessProgramMismatch);
                }
                self.scripts.push(Arc::new(parse_checked(witness_script)?));
                self.dstack.set_items(items);
            }
            _ => return Err(ScriptError::WitnessProgramWrongLength),
        }

        if self
            .dstack
            .items()
            .iter()
            .any(|item| item.len() > MAX_SCRIPT_ELEMENT_SIZE)
        {
            return Err(ScriptError::ElementSize);
        }
        Ok(())
    }

    /// Disassembles the opcode at the program counter as
    /// `<script>:<offset>: <opcode>`.
    pub fn disasm_pc(&self) -> Result<String, ScriptError> {
        let script = self.current_script()?;
        let op = script
            .get(self.script_off)
            .ok_or(ScriptError::InvalidProgramCounter)?;
        Ok(format!(
            "{:02x}:{:04x}: {}",
            self.script_idx,
            self.script_off,
            op.print(false)
        ))
    }

    /// Disassembles script `idx`, one opcode per line.
    pub fn disasm_script(&self, idx: usize) -> Result<String, ScriptError> {
        let script = self
            .scripts
            .get(idx)
            .ok_or(ScriptError::InvalidProgramCounter)?;
        let mut out = String::new();
        for (offset, op) in script.ops().enumerate() {
            out.push_str(&format!("{idx:02x}:{offset:04x}: {}\n", op.print(false)));
        }
        Ok(out)
    }
}
