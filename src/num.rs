//! Stack number codec.
//!
//! Numbers live on the stack as little-endian byte strings with a sign bit in
//! the most significant byte. Operands are limited to 4 bytes by default and
//! to 5 bytes for the locktime opcodes, while results may grow past that limit
//! until they are read back from the stack.

use core::ops::{Add, Neg, Sub};

use crate::error::ScriptError;

/// Maximum encoded length of arithmetic operands.
pub const DEFAULT_SCRIPT_NUM_LEN: usize = 4;
/// Maximum encoded length accepted by CHECKLOCKTIMEVERIFY and CHECKSEQUENCEVERIFY.
pub const LOCKTIME_SCRIPT_NUM_LEN: usize = 5;

/// Signed integer decoded from (or destined for) the stack.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScriptNum(i64);

impl ScriptNum {
    pub const ZERO: ScriptNum = ScriptNum(0);
    pub const ONE: ScriptNum = ScriptNum(1);

    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Decodes `bytes`, rejecting encodings longer than `max_len` and, when
    /// `require_minimal` is set, encodings that are not minimal.
    pub fn from_bytes(
        bytes: &[u8],
        require_minimal: bool,
        max_len: usize,
    ) -> Result<Self, ScriptError> {
        if bytes.len() > max_len {
            return Err(ScriptError::NumberTooBig);
        }
        if require_minimal {
            check_minimal_data_encoding(bytes)?;
        }
        if bytes.is_empty() {
            return Ok(Self::ZERO);
        }

        let mut value: i64 = 0;
        for (i, &byte) in bytes.iter().enumerate() {
            value |= i64::from(byte) << (8 * i);
        }

        let last = bytes[bytes.len() - 1];
        if last & 0x80 != 0 {
            let mask = !(0x80i64 << (8 * (bytes.len() - 1)));
            value = -(value & mask);
        }
        Ok(Self(value))
    }

    /// Minimal encoding of the value. Zero encodes as the empty string.
    pub fn to_bytes(self) -> Vec<u8> {
        if self.0 == 0 {
            return Vec::new();
        }

        let negative = self.0 < 0;
        let mut magnitude = self.0.unsigned_abs();
        let mut out = Vec::with_capacity(9);
        while magnitude > 0 {
            out.push((magnitude & 0xff) as u8);
            magnitude >>= 8;
        }

        // An extra byte carries the sign when the top bit is already used by
        // the magnitude.
        let last = out.len() - 1;
        if out[last] & 0x80 != 0 {
            out.push(if negative { 0x80 } else { 0x00 });
        } else if negative {
            out[last] |= 0x80;
        }
        out
    }

    pub fn value(self) -> i64 {
        self.0
    }

    /// Value clamped into the `i32` range.
    pub fn to_i32(self) -> i32 {
        self.0.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn abs(self) -> Self {
        Self(self.0.wrapping_abs())
    }
}

impl From<i64> for ScriptNum {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

// Operands are bounded to 5 encoded bytes so none of these can overflow.
impl Add for ScriptNum {
    type Output = ScriptNum;

    fn add(self, rhs: Self) -> Self {
        Self(self.0.wrapping_add(rhs.0))
    }
}

impl Sub for ScriptNum {
    type Output = ScriptNum;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0.wrapping_sub(rhs.0))
    }
}

impl Neg for ScriptNum {
    type Output = ScriptNum;

    fn neg(self) -> Self {
        Self(self.0.wrapping_neg())
    }
}

/// Checks that `bytes` is the shortest possible encoding of its value.
pub fn check_minimal_data_encoding(bytes: &[u8]) -> Result<(), ScriptError> {
    let Some(&last) = bytes.last() else {
        return Ok(());
    };

    // The last byte may only be 0x00 or 0x80 when the byte before it has its
    // high bit set, otherwise it could have been dropped.
    if last & 0x7f == 0 && (bytes.len() == 1 || bytes[bytes.len() - 2] & 0x80 == 0) {
        return Err(ScriptError::MinimalData);
    }
    Ok(())
}

/// Interprets a stack item as a boolean. Any encoding of zero, including
/// negative zero, is false.
pub fn cast_to_bool(bytes: &[u8]) -> bool {
    for (i, &byte) in bytes.iter().enumerate() {
        if byte != 0 {
            return !(i == bytes.len() - 1 && byte == 0x80);
        }
    }
    false
}
