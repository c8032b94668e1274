//! Opcode handlers for flow control, stack manipulation, arithmetic and
//! hashing. Signature and locktime opcodes live in their own modules.

use bitcoin::hashes::{hash160, ripemd160, sha1, sha256, sha256d, Hash};

use crate::{
    engine::{Condition, Engine},
    error::ScriptError,
    num::ScriptNum,
    opcode::*,
    VERIFY_DISCOURAGE_UPGRADABLE_NOPS, VERIFY_MINIMALIF,
};

impl Engine<'_> {
    pub(crate) fn dispatch(&mut self, op: &ParsedOpcode<'_>) -> Result<(), ScriptError> {
        match op.opcode().class() {
            OpClass::Push => return self.dstack.push(op.data().to_vec()),
            OpClass::SmallInt => return self.dstack.push_num(small_int(op.value())),
            OpClass::Conditional => return self.op_conditional(op.value()),
            OpClass::Disabled => return Err(ScriptError::DisabledOpcode),
            OpClass::AlwaysIllegal | OpClass::Reserved => return Err(ScriptError::ReservedOpcode),
            OpClass::Invalid => return Err(ScriptError::InvalidOpcode),
            OpClass::UpgradableNop => {
                if self.flags.has(VERIFY_DISCOURAGE_UPGRADABLE_NOPS) {
                    return Err(ScriptError::DiscourageUpgradableNops);
                }
                return Ok(());
            }
            OpClass::Operation => {}
        }

        match op.value() {
            OP_NOP => Ok(()),
            OP_VERIFY => self.abstract_verify(ScriptError::Verify),
            OP_RETURN => Err(ScriptError::EarlyReturn),

            OP_TOALTSTACK => {
                let item = self.dstack.pop()?;
                self.astack.push(item)
            }
            OP_FROMALTSTACK => {
                let item = self.astack.pop()?;
                self.dstack.push(item)
            }
            OP_2DROP => self.dstack.drop_n(2),
            OP_2DUP => self.dstack.dup_n(2),
            OP_3DUP => self.dstack.dup_n(3),
            OP_2OVER => self.dstack.over_n(2),
            OP_2ROT => self.dstack.rot_n(2),
            OP_2SWAP => self.dstack.swap_n(2),
            OP_IFDUP => {
                if self.dstack.peek_bool(0)? {
                    self.dstack.dup_n(1)?;
                }
                Ok(())
            }
            OP_DEPTH => {
                let depth = self.dstack.depth() as i64;
                self.dstack.push_num(ScriptNum::new(depth))
            }
            OP_DROP => self.dstack.drop_n(1),
            OP_DUP => self.dstack.dup_n(1),
            OP_NIP => self.dstack.nip_n(1).map(drop),
            OP_OVER => self.dstack.over_n(1),
            OP_PICK => {
                let n = self.dstack.pop_num()?;
                self.dstack.pick_n(n.to_i32())
            }
            OP_ROLL => {
                let n = self.dstack.pop_num()?;
                self.dstack.roll_n(n.to_i32())
            }
            OP_ROT => self.dstack.rot_n(1),
            OP_SWAP => self.dstack.swap_n(1),
            OP_TUCK => self.dstack.tuck(),
            OP_SIZE => {
                let len = self.dstack.peek(0)?.len() as i64;
                self.dstack.push_num(ScriptNum::new(len))
            }

            OP_EQUAL => self.op_equal(),
            OP_EQUALVERIFY => {
                self.op_equal()?;
                self.abstract_verify(ScriptError::EqualVerify)
            }

            OP_1ADD | OP_1SUB | OP_NEGATE | OP_ABS | OP_NOT | OP_0NOTEQUAL => {
                self.unary_num(op.value())
            }
            OP_ADD | OP_SUB | OP_BOOLAND | OP_BOOLOR | OP_NUMEQUAL | OP_NUMNOTEQUAL
            | OP_LESSTHAN | OP_GREATERTHAN | OP_LESSTHANOREQUAL | OP_GREATERTHANOREQUAL
            | OP_MIN | OP_MAX => self.binary_num(op.value()),
            OP_NUMEQUALVERIFY => {
                self.binary_num(OP_NUMEQUAL)?;
                self.abstract_verify(ScriptError::NumEqualVerify)
            }
            OP_WITHIN => {
                let max = self.dstack.pop_num()?;
                let min = self.dstack.pop_num()?;
                let x = self.dstack.pop_num()?;
                self.dstack.push_bool(min <= x && x < max)
            }

            OP_RIPEMD160 => self.hash_top(|data| ripemd160::Hash::hash(data).to_byte_array().into()),
            OP_SHA1 => self.hash_top(|data| sha1::Hash::hash(data).to_byte_array().into()),
            OP_SHA256 => self.hash_top(|data| sha256::Hash::hash(data).to_byte_array().into()),
            OP_HASH160 => self.hash_top(|data| hash160::Hash::hash(data).to_byte_array().into()),
            OP_HASH256 => self.hash_top(|data| sha256d::Hash::hash(data).to_byte_array().into()),

            OP_CODESEPARATOR => {
                // The offset already points past this opcode.
                self.last_code_sep = self.script_offset();
                Ok(())
            }
            OP_CHECKSIG => self.op_checksig(),
            OP_CHECKSIGVERIFY => {
                self.op_checksig()?;
                self.abstract_verify(ScriptError::CheckSigVerify)
            }
            OP_CHECKMULTISIG => self.op_checkmultisig(),
            OP_CHECKMULTISIGVERIFY => {
                self.op_checkmultisig()?;
                self.abstract_verify(ScriptError::CheckMultiSigVerify)
            }

            OP_CHECKLOCKTIMEVERIFY => self.op_check_lock_time_verify(),
            OP_CHECKSEQUENCEVERIFY => self.op_check_sequence_verify(),

            _ => Err(ScriptError::Internal),
        }
    }

    /// Pops the top item and fails with `err` unless it is true.
    fn abstract_verify(&mut self, err: ScriptError) -> Result<(), ScriptError> {
        if self.dstack.pop_bool()? {
            Ok(())
        } else {
            Err(err)
        }
    }

    fn op_conditional(&mut self, value: u8) -> Result<(), ScriptError> {
        match value {
            OP_IF | OP_NOTIF => {
                let mut condition = Condition::Skip;
                if self.is_branch_executing() {
                    let mut ok = self.pop_if_bool()?;
                    if value == OP_NOTIF {
                        ok = !ok;
                    }
                    condition = if ok { Condition::True } else { Condition::False };
                }
                self.cond_stack.push(condition);
                Ok(())
            }
            OP_ELSE => {
                let top = self
                    .cond_stack
                    .last_mut()
                    .ok_or(ScriptError::UnbalancedConditional)?;
                *top = match *top {
                    Condition::True => Condition::False,
                    Condition::False => Condition::True,
                    Condition::Skip => Condition::Skip,
                };
                Ok(())
            }
            OP_ENDIF => self
                .cond_stack
                .pop()
                .map(drop)
                .ok_or(ScriptError::UnbalancedConditional),
            _ => Err(ScriptError::Internal),
        }
    }

    /// Pops the OP_IF/OP_NOTIF operand. Witness v0 scripts under MINIMALIF
    /// accept only an empty vector or `0x01`.
    fn pop_if_bool(&mut self) -> Result<bool, ScriptError> {
        if !self.is_witness_version_active(0) || !self.flags.has(VERIFY_MINIMALIF) {
            return self.dstack.pop_bool();
        }
        let item = self.dstack.pop()?;
        match item.as_slice() {
            [] => Ok(false),
            [0x01] => Ok(true),
            _ => Err(ScriptError::MinimalIf),
        }
    }

    fn op_equal(&mut self) -> Result<(), ScriptError> {
        let a = self.dstack.pop()?;
        let b = self.dstack.pop()?;
        self.dstack.push_bool(a == b)
    }

    fn unary_num(&mut self, value: u8) -> Result<(), ScriptError> {
        let n = self.dstack.pop_num()?;
        let result = match value {
            OP_1ADD => n + ScriptNum::ONE,
            OP_1SUB => n - ScriptNum::ONE,
            OP_NEGATE => -n,
            OP_ABS => n.abs(),
            OP_NOT => ScriptNum::from(i64::from(n == ScriptNum::ZERO)),
            OP_0NOTEQUAL => ScriptNum::from(i64::from(n != ScriptNum::ZERO)),
            _ => return Err(ScriptError::Internal),
        };
        self.dstack.push_num(result)
    }

    /// Binary operators take the second item as the left operand:
    /// `a b OP_SUB` leaves `a - b`.
    fn binary_num(&mut self, value: u8) -> Result<(), ScriptError> {
        let b = self.dstack.pop_num()?;
        let a = self.dstack.pop_num()?;
        let zero = ScriptNum::ZERO;
        let result = match value {
            OP_ADD => a + b,
            OP_SUB => a - b,
            OP_BOOLAND => ScriptNum::from(i64::from(a != zero && b != zero)),
            OP_BOOLOR => ScriptNum::from(i64::from(a != zero || b != zero)),
            OP_NUMEQUAL => ScriptNum::from(i64::from(a == b)),
            OP_NUMNOTEQUAL => ScriptNum::from(i64::from(a != b)),
            OP_LESSTHAN => ScriptNum::from(i64::from(a < b)),
            OP_GREATERTHAN => ScriptNum::from(i64::from(a > b)),
            OP_LESSTHANOREQUAL => ScriptNum::from(i64::from(a <= b)),
            OP_GREATERTHANOREQUAL => ScriptNum::from(i64::from(a >= b)),
            OP_MIN => a.min(b),
            OP_MAX => a.max(b),
            _ => return Err(ScriptError::Internal),
        };
        self.dstack.push_num(result)
    }

    fn hash_top(&mut self, hash: impl FnOnce(&[u8]) -> Vec<u8>) -> Result<(), ScriptError> {
        let item = self.dstack.pop()?;
        self.dstack.push(hash(&item))
    }
}

fn small_int(value: u8) -> ScriptNum {
    match value {
        OP_1NEGATE => ScriptNum::new(-1),
        _ => ScriptNum::new(i64::from(value - OP_1 + 1)),
    }
}
