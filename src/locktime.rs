//! CHECKLOCKTIMEVERIFY (BIP65) and CHECKSEQUENCEVERIFY (BIP112).

use crate::{
    engine::Engine,
    error::ScriptError,
    num::LOCKTIME_SCRIPT_NUM_LEN,
    VERIFY_CHECKLOCKTIMEVERIFY, VERIFY_CHECKSEQUENCEVERIFY, VERIFY_DISCOURAGE_UPGRADABLE_NOPS,
};

/// Lock times below this value are block heights, at or above it timestamps.
pub const LOCK_TIME_THRESHOLD: u32 = 500_000_000;
/// Sequence bit disabling relative lock time.
pub const SEQUENCE_LOCKTIME_DISABLE_FLAG: u32 = 1 << 31;
/// Sequence bit selecting time-based (rather than height-based) relative locks.
pub const SEQUENCE_LOCKTIME_TYPE_FLAG: u32 = 1 << 22;
/// Sequence bits holding the relative lock value.
pub const SEQUENCE_LOCKTIME_MASK: u32 = 0x0000_ffff;

const SEQUENCE_FINAL: u32 = 0xffff_ffff;

/// Both lock values must be of the same kind and the required one must not
/// exceed the one the transaction commits to.
fn verify_lock_time(tx_lock_time: i64, threshold: i64, lock_time: i64) -> Result<(), ScriptError> {
    let same_kind = (tx_lock_time < threshold && lock_time < threshold)
        || (tx_lock_time >= threshold && lock_time >= threshold);
    if !same_kind || lock_time > tx_lock_time {
        return Err(ScriptError::UnsatisfiedLockTime);
    }
    Ok(())
}

impl Engine<'_> {
    fn upgradable_nop(&self) -> Result<(), ScriptError> {
        if self.flags.has(VERIFY_DISCOURAGE_UPGRADABLE_NOPS) {
            return Err(ScriptError::DiscourageUpgradableNops);
        }
        Ok(())
    }

    /// Reads the lock operand without popping it.
    fn peek_lock_operand(&self) -> Result<i64, ScriptError> {
        let value = self.dstack.peek_num(0, LOCKTIME_SCRIPT_NUM_LEN)?.value();
        if value < 0 {
            return Err(ScriptError::NegativeLockTime);
        }
        Ok(value)
    }

    pub(crate) fn op_check_lock_time_verify(&mut self) -> Result<(), ScriptError> {
        if !self.flags.has(VERIFY_CHECKLOCKTIMEVERIFY) {
            return self.upgradable_nop();
        }

        let lock_time = self.peek_lock_operand()?;
        let tx_lock_time = i64::from(self.tx.lock_time.to_consensus_u32());
        verify_lock_time(tx_lock_time, i64::from(LOCK_TIME_THRESHOLD), lock_time)?;

        // Lock time is not enforced at all for a final input.
        if self.tx.input[self.input_index].sequence.0 == SEQUENCE_FINAL {
            return Err(ScriptError::UnsatisfiedLockTime);
        }
        Ok(())
    }

    pub(crate) fn op_check_sequence_verify(&mut self) -> Result<(), ScriptError> {
        if !self.flags.has(VERIFY_CHECKSEQUENCEVERIFY) {
            return self.upgradable_nop();
        }

        let sequence = self.peek_lock_operand()?;
        if sequence & i64::from(SEQUENCE_LOCKTIME_DISABLE_FLAG) != 0 {
            return Ok(());
        }

        if self.tx.version.0 < 2 {
            return Err(ScriptError::UnsatisfiedLockTime);
        }

        let tx_sequence = i64::from(self.tx.input[self.input_index].sequence.0);
        if tx_sequence & i64::from(SEQUENCE_LOCKTIME_DISABLE_FLAG) != 0 {
            return Err(ScriptError::UnsatisfiedLockTime);
        }

        let mask = i64::from(SEQUENCE_LOCKTIME_TYPE_FLAG | SEQUENCE_LOCKTIME_MASK);
        verify_lock_time(
            tx_sequence & mask,
            i64::from(SEQUENCE_LOCKTIME_TYPE_FLAG),
            sequence & mask,
        )
    }
}
