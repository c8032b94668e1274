//! Opcode table and script decoder.
//!
//! Every byte value has a descriptor in a table that is built on first use and
//! never modified afterwards. The decoder turns raw script bytes into
//! [`ParsedOpcode`]s that borrow their push data from the script.

use std::{borrow::Cow, collections::HashMap, fmt, ops::Range, sync::OnceLock};

use bitcoin::hex::DisplayHex;

use crate::error::ScriptError;

pub const OP_0: u8 = 0x00;
pub const OP_FALSE: u8 = OP_0;
pub const OP_DATA_1: u8 = 0x01;
pub const OP_DATA_20: u8 = 0x14;
pub const OP_DATA_32: u8 = 0x20;
pub const OP_DATA_75: u8 = 0x4b;
pub const OP_PUSHDATA1: u8 = 0x4c;
pub const OP_PUSHDATA2: u8 = 0x4d;
pub const OP_PUSHDATA4: u8 = 0x4e;
pub const OP_1NEGATE: u8 = 0x4f;
pub const OP_RESERVED: u8 = 0x50;
pub const OP_1: u8 = 0x51;
pub const OP_TRUE: u8 = OP_1;
pub const OP_16: u8 = 0x60;
pub const OP_NOP: u8 = 0x61;
pub const OP_VER: u8 = 0x62;
pub const OP_IF: u8 = 0x63;
pub const OP_NOTIF: u8 = 0x64;
pub const OP_VERIF: u8 = 0x65;
pub const OP_VERNOTIF: u8 = 0x66;
pub const OP_ELSE: u8 = 0x67;
pub const OP_ENDIF: u8 = 0x68;
pub const OP_VERIFY: u8 = 0x69;
pub const OP_RETURN: u8 = 0x6a;
pub const OP_TOALTSTACK: u8 = 0x6b;
pub const OP_FROMALTSTACK: u8 = 0x6c;
pub const OP_2DROP: u8 = 0x6d;
pub const OP_2DUP: u8 = 0x6e;
pub const OP_3DUP: u8 = 0x6f;
pub const OP_2OVER: u8 = 0x70;
pub const OP_2ROT: u8 = 0x71;
pub const OP_2SWAP: u8 = 0x72;
pub const OP_IFDUP: u8 = 0x73;
pub const OP_DEPTH: u8 = 0x74;
pub const OP_DROP: u8 = 0x75;
pub const OP_DUP: u8 = 0x76;
pub const OP_NIP: u8 = 0x77;
pub const OP_OVER: u8 = 0x78;
pub const OP_PICK: u8 = 0x79;
pub const OP_ROLL: u8 = 0x7a;
pub const OP_ROT: u8 = 0x7b;
pub const OP_SWAP: u8 = 0x7c;
pub const OP_TUCK: u8 = 0x7d;
pub const OP_CAT: u8 = 0x7e;
pub const OP_SUBSTR: u8 = 0x7f;
pub const OP_LEFT: u8 = 0x80;
pub const OP_RIGHT: u8 = 0x81;
pub const OP_SIZE: u8 = 0x82;
pub const OP_INVERT: u8 = 0x83;
pub const OP_AND: u8 = 0x84;
pub const OP_OR: u8 = 0x85;
pub const OP_XOR: u8 = 0x86;
pub const OP_EQUAL: u8 = 0x87;
pub const OP_EQUALVERIFY: u8 = 0x88;
pub const OP_RESERVED1: u8 = 0x89;
pub const OP_RESERVED2: u8 = 0x8a;
pub const OP_1ADD: u8 = 0x8b;
pub const OP_1SUB: u8 = 0x8c;
pub const OP_2MUL: u8 = 0x8d;
pub const OP_2DIV: u8 = 0x8e;
pub const OP_NEGATE: u8 = 0x8f;
pub const OP_ABS: u8 = 0x90;
pub const OP_NOT: u8 = 0x91;
pub const OP_0NOTEQUAL: u8 = 0x92;
pub const OP_ADD: u8 = 0x93;
pub const OP_SUB: u8 = 0x94;
pub const OP_MUL: u8 = 0x95;
pub const OP_DIV: u8 = 0x96;
pub const OP_MOD: u8 = 0x97;
pub const OP_LSHIFT: u8 = 0x98;
pub const OP_RSHIFT: u8 = 0x99;
pub const OP_BOOLAND: u8 = 0x9a;
pub const OP_BOOLOR: u8 = 0x9b;
pub const OP_NUMEQUAL: u8 = 0x9c;
pub const OP_NUMEQUALVERIFY: u8 = 0x9d;
pub const OP_NUMNOTEQUAL: u8 = 0x9e;
pub const OP_LESSTHAN: u8 = 0x9f;
pub const OP_GREATERTHAN: u8 = 0xa0;
pub const OP_LESSTHANOREQUAL: u8 = 0xa1;
pub const OP_GREATERTHANOREQUAL: u8 = 0xa2;
pub const OP_MIN: u8 = 0xa3;
pub const OP_MAX: u8 = 0xa4;
pub const OP_WITHIN: u8 = 0xa5;
pub const OP_RIPEMD160: u8 = 0xa6;
pub const OP_SHA1: u8 = 0xa7;
pub const OP_SHA256: u8 = 0xa8;
pub const OP_HASH160: u8 = 0xa9;
pub const OP_HASH256: u8 = 0xaa;
pub const OP_CODESEPARATOR: u8 = 0xab;
pub const OP_CHECKSIG: u8 = 0xac;
pub const OP_CHECKSIGVERIFY: u8 = 0xad;
pub const OP_CHECKMULTISIG: u8 = 0xae;
pub const OP_CHECKMULTISIGVERIFY: u8 = 0xaf;
pub const OP_NOP1: u8 = 0xb0;
pub const OP_CHECKLOCKTIMEVERIFY: u8 = 0xb1;
pub const OP_NOP2: u8 = OP_CHECKLOCKTIMEVERIFY;
pub const OP_CHECKSEQUENCEVERIFY: u8 = 0xb2;
pub const OP_NOP3: u8 = OP_CHECKSEQUENCEVERIFY;
pub const OP_NOP4: u8 = 0xb3;
pub const OP_NOP10: u8 = 0xb9;
pub const OP_INVALIDOPCODE: u8 = 0xff;

/// How an opcode carries push data.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PushKind {
    /// No data follows the opcode byte.
    None,
    /// Exactly this many data bytes follow the opcode byte.
    Direct(u8),
    /// A little-endian length prefix of this width precedes the data.
    Prefixed(u8),
}

/// Behavioural category of an opcode. The engine dispatches on this before it
/// looks at the concrete opcode value.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OpClass {
    /// Pushes bytes carried in the script (OP_0, direct pushes, OP_PUSHDATA*).
    Push,
    /// Pushes a small integer (OP_1NEGATE, OP_1 ..= OP_16).
    SmallInt,
    /// IF/NOTIF/ELSE/ENDIF. Runs even on non-executing branches.
    Conditional,
    /// Fails as soon as it is reached, executing branch or not.
    Disabled,
    /// VERIF/VERNOTIF. Fails as soon as it is reached.
    AlwaysIllegal,
    /// Fails when executed.
    Reserved,
    /// Undefined byte. Fails when executed.
    Invalid,
    /// NOP reserved for future soft forks.
    UpgradableNop,
    /// Any other operation.
    Operation,
}

/// Static description of one opcode byte.
#[derive(Debug)]
pub struct Opcode {
    value: u8,
    name: Cow<'static, str>,
    push: PushKind,
    class: OpClass,
}

impl Opcode {
    pub fn value(&self) -> u8 {
        self.value
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn push_kind(&self) -> PushKind {
        self.push
    }

    pub fn class(&self) -> OpClass {
        self.class
    }

    /// Encoded length in the compact form used by the wire format tables:
    /// `1` for opcodes without data, `1 + n` for direct pushes, and `-1`,
    /// `-2`, `-4` for the length-prefixed pushes.
    pub fn length(&self) -> i32 {
        match self.push {
            PushKind::None => 1,
            PushKind::Direct(n) => 1 + i32::from(n),
            PushKind::Prefixed(width) => -i32::from(width),
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.class == OpClass::Disabled
    }

    pub fn is_always_illegal(&self) -> bool {
        self.class == OpClass::AlwaysIllegal
    }

    pub fn is_conditional(&self) -> bool {
        self.class == OpClass::Conditional
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

static OPCODES: OnceLock<Vec<Opcode>> = OnceLock::new();
static OPCODES_BY_NAME: OnceLock<HashMap<&'static str, u8>> = OnceLock::new();

fn table() -> &'static [Opcode] {
    OPCODES.get_or_init(|| (0..=u8::MAX).map(describe).collect())
}

/// Descriptor for `value`.
pub fn opcode(value: u8) -> &'static Opcode {
    &table()[usize::from(value)]
}

/// Looks up an opcode by its canonical name or one of the aliases
/// `OP_FALSE`, `OP_TRUE`, `OP_NOP2` and `OP_NOP3`.
pub fn opcode_by_name(name: &str) -> Option<u8> {
    OPCODES_BY_NAME
        .get_or_init(|| {
            let mut map: HashMap<&'static str, u8> =
                table().iter().map(|op| (op.name(), op.value)).collect();
            map.insert("OP_FALSE", OP_FALSE);
            map.insert("OP_TRUE", OP_TRUE);
            map.insert("OP_NOP2", OP_NOP2);
            map.insert("OP_NOP3", OP_NOP3);
            map
        })
        .get(name)
        .copied()
}

fn describe(value: u8) -> Opcode {
    let (name, push, class): (Cow<'static, str>, PushKind, OpClass) = match value {
        OP_0 => ("OP_0".into(), PushKind::None, OpClass::Push),
        0x01..=OP_DATA_75 => (
            format!("OP_DATA_{value}").into(),
            PushKind::Direct(value),
            OpClass::Push,
        ),
        OP_PUSHDATA1 => ("OP_PUSHDATA1".into(), PushKind::Prefixed(1), OpClass::Push),
        OP_PUSHDATA2 => ("OP_PUSHDATA2".into(), PushKind::Prefixed(2), OpClass::Push),
        OP_PUSHDATA4 => ("OP_PUSHDATA4".into(), PushKind::Prefixed(4), OpClass::Push),
        OP_1NEGATE => ("OP_1NEGATE".into(), PushKind::None, OpClass::SmallInt),
        OP_1..=OP_16 => (
            format!("OP_{}", value - OP_1 + 1).into(),
            PushKind::None,
            OpClass::SmallInt,
        ),
        0xba..=0xf9 | 0xfc => (
            format!("OP_UNKNOWN{value}").into(),
            PushKind::None,
            OpClass::Invalid,
        ),
        _ => {
            let (name, class) = named(value);
            (name.into(), PushKind::None, class)
        }
    };
    Opcode {
        value,
        name,
        push,
        class,
    }
}

fn named(value: u8) -> (&'static str, OpClass) {
    use OpClass::*;

    match value {
        OP_RESERVED => ("OP_RESERVED", Reserved),
        OP_NOP => ("OP_NOP", Operation),
        OP_VER => ("OP_VER", Reserved),
        OP_IF => ("OP_IF", Conditional),
        OP_NOTIF => ("OP_NOTIF", Conditional),
        OP_VERIF => ("OP_VERIF", AlwaysIllegal),
        OP_VERNOTIF => ("OP_VERNOTIF", AlwaysIllegal),
        OP_ELSE => ("OP_ELSE", Conditional),
        OP_ENDIF => ("OP_ENDIF", Conditional),
        OP_VERIFY => ("OP_VERIFY", Operation),
        OP_RETURN => ("OP_RETURN", Operation),
        OP_TOALTSTACK => ("OP_TOALTSTACK", Operation),
        OP_FROMALTSTACK => ("OP_FROMALTSTACK", Operation),
        OP_2DROP => ("OP_2DROP", Operation),
        OP_2DUP => ("OP_2DUP", Operation),
        OP_3DUP => ("OP_3DUP", Operation),
        OP_2OVER => ("OP_2OVER", Operation),
        OP_2ROT => ("OP_2ROT", Operation),
        OP_2SWAP => ("OP_2SWAP", Operation),
        OP_IFDUP => ("OP_IFDUP", Operation),
        OP_DEPTH => ("OP_DEPTH", Operation),
        OP_DROP => ("OP_DROP", Operation),
        OP_DUP => ("OP_DUP", Operation),
        OP_NIP => ("OP_NIP", Operation),
        OP_OVER => ("OP_OVER", Operation),
        OP_PICK => ("OP_PICK", Operation),
        OP_ROLL => ("OP_ROLL", Operation),
        OP_ROT => ("OP_ROT", Operation),
        OP_SWAP => ("OP_SWAP", Operation),
        OP_TUCK => ("OP_TUCK", Operation),
        OP_CAT => ("OP_CAT", Disabled),
        OP_SUBSTR => ("OP_SUBSTR", Disabled),
        OP_LEFT => ("OP_LEFT", Disabled),
        OP_RIGHT => ("OP_RIGHT", Disabled),
        OP_SIZE => ("OP_SIZE", Operation),
        OP_INVERT => ("OP_INVERT", Disabled),
        OP_AND => ("OP_AND", Disabled),
        OP_OR => ("OP_OR", Disabled),
        OP_XOR => ("OP_XOR", Disabled),
        OP_EQUAL => ("OP_EQUAL", Operation),
        OP_EQUALVERIFY => ("OP_EQUALVERIFY", Operation),
        OP_RESERVED1 => ("OP_RESERVED1", Reserved),
        OP_RESERVED2 => ("OP_RESERVED2", Reserved),
        OP_1ADD => ("OP_1ADD", Operation),
        OP_1SUB => ("OP_1SUB", Operation),
        OP_2MUL => ("OP_2MUL", Disabled),
        OP_2DIV => ("OP_2DIV", Disabled),
        OP_NEGATE => ("OP_NEGATE", Operation),
        OP_ABS => ("OP_ABS", Operation),
        OP_NOT => ("OP_NOT", Operation),
        OP_0NOTEQUAL => ("OP_0NOTEQUAL", Operation),
        OP_ADD => ("OP_ADD", Operation),
        OP_SUB => ("OP_SUB", Operation),
        OP_MUL => ("OP_MUL", Disabled),
        OP_DIV => ("OP_DIV", Disabled),
        OP_MOD => ("OP_MOD", Disabled),
        OP_LSHIFT => ("OP_LSHIFT", Disabled),
        OP_RSHIFT => ("OP_RSHIFT", Disabled),
        OP_BOOLAND => ("OP_BOOLAND", Operation),
        OP_BOOLOR => ("OP_BOOLOR", Operation),
        OP_NUMEQUAL => ("OP_NUMEQUAL", Operation),
        OP_NUMEQUALVERIFY => ("OP_NUMEQUALVERIFY", Operation),
        OP_NUMNOTEQUAL => ("OP_NUMNOTEQUAL", Operation),
        OP_LESSTHAN => ("OP_LESSTHAN", Operation),
        OP_GREATERTHAN => ("OP_GREATERTHAN", Operation),
        OP_LESSTHANOREQUAL => ("OP_LESSTHANOREQUAL", Operation),
        OP_GREATERTHANOREQUAL => ("OP_GREATERTHANOREQUAL", Operation),
        OP_MIN => ("OP_MIN", Operation),
        OP_MAX => ("OP_MAX", Operation),
        OP_WITHIN => ("OP_WITHIN", Operation),
        OP_RIPEMD160 => ("OP_RIPEMD160", Operation),
        OP_SHA1 => ("OP_SHA1", Operation),
        OP_SHA256 => ("OP_SHA256", Operation),
        OP_HASH160 => ("OP_HASH160", Operation),
        OP_HASH256 => ("OP_HASH256", Operation),
        OP_CODESEPARATOR => ("OP_CODESEPARATOR", Operation),
        OP_CHECKSIG => ("OP_CHECKSIG", Operation),
        OP_CHECKSIGVERIFY => ("OP_CHECKSIGVERIFY", Operation),
        OP_CHECKMULTISIG => ("OP_CHECKMULTISIG", Operation),
        OP_CHECKMULTISIGVERIFY => ("OP_CHECKMULTISIGVERIFY", Operation),
        OP_NOP1 => ("OP_NOP1", UpgradableNop),
        OP_CHECKLOCKTIMEVERIFY => ("OP_CHECKLOCKTIMEVERIFY", Operation),
        OP_CHECKSEQUENCEVERIFY => ("OP_CHECKSEQUENCEVERIFY", Operation),
        0xb3 => ("OP_NOP4", UpgradableNop),
        0xb4 => ("OP_NOP5", UpgradableNop),
        0xb5 => ("OP_NOP6", UpgradableNop),
        0xb6 => ("OP_NOP7", UpgradableNop),
        0xb7 => ("OP_NOP8", UpgradableNop),
        0xb8 => ("OP_NOP9", UpgradableNop),
        OP_NOP10 => ("OP_NOP10", UpgradableNop),
        0xfa => ("OP_SMALLINTEGER", Invalid),
        0xfb => ("OP_PUBKEYS", Invalid),
        0xfd => ("OP_PUBKEYHASH", Invalid),
        0xfe => ("OP_PUBKEY", Invalid),
        OP_INVALIDOPCODE => ("OP_INVALIDOPCODE", Invalid),
        _ => ("OP_INVALIDOPCODE", Invalid),
    }
}

/// One decoded instruction: an opcode plus the push data it carries.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ParsedOpcode<'a> {
    opcode: &'static Opcode,
    data: &'a [u8],
}

impl PartialEq for Opcode {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Eq for Opcode {}

impl<'a> ParsedOpcode<'a> {
    /// Builds an instruction for `value` carrying `data`. The data length is
    /// validated when the instruction is serialised.
    pub fn new(value: u8, data: &'a [u8]) -> Self {
        Self {
            opcode: opcode(value),
            data,
        }
    }

    pub fn opcode(&self) -> &'static Opcode {
        self.opcode
    }

    pub fn value(&self) -> u8 {
        self.opcode.value
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn is_disabled(&self) -> bool {
        self.opcode.is_disabled()
    }

    pub fn is_always_illegal(&self) -> bool {
        self.opcode.is_always_illegal()
    }

    pub fn is_conditional(&self) -> bool {
        self.opcode.is_conditional()
    }

    /// Checks that the push used the shortest available encoding.
    pub fn check_minimal_data_push(&self) -> Result<(), ScriptError> {
        let data = self.data;
        let op = self.opcode.value;
        let expected = match data.len() {
            0 => OP_0,
            1 if (1..=16).contains(&data[0]) => OP_1 + data[0] - 1,
            1 if data[0] == 0x81 => OP_1NEGATE,
            len @ 1..=75 => len as u8,
            76..=0xff => OP_PUSHDATA1,
            0x100..=0xffff => OP_PUSHDATA2,
            _ => return Ok(()),
        };
        if op == expected {
            Ok(())
        } else {
            Err(ScriptError::MinimalData)
        }
    }

    /// Whether this push is one a standard script builder would produce.
    /// Non-push opcodes count as canonical.
    pub fn is_canonical_push(&self) -> bool {
        let op = self.opcode.value;
        let len = self.data.len();
        if op > OP_16 {
            return true;
        }
        if op > OP_0 && op < OP_PUSHDATA1 && len == 1 && self.data[0] <= 16 {
            return false;
        }
        match op {
            OP_PUSHDATA1 => len >= usize::from(OP_PUSHDATA1),
            OP_PUSHDATA2 => len > 0xff,
            OP_PUSHDATA4 => len > 0xffff,
            _ => true,
        }
    }

    /// Serialises the instruction back to script bytes.
    pub fn encode_into(&self, out: &mut Vec<u8>) -> Result<(), ScriptError> {
        let len = self.data.len();
        out.push(self.opcode.value);
        match self.opcode.push {
            PushKind::None if len == 0 => {}
            PushKind::Direct(n) if usize::from(n) == len => {}
            PushKind::Prefixed(1) if len <= 0xff => out.push(len as u8),
            PushKind::Prefixed(2) if len <= 0xffff => {
                out.extend_from_slice(&(len as u16).to_le_bytes())
            }
            PushKind::Prefixed(4) if u32::try_from(len).is_ok() => {
                out.extend_from_slice(&(len as u32).to_le_bytes())
            }
            _ => return Err(ScriptError::Internal),
        }
        out.extend_from_slice(self.data);
        Ok(())
    }

    /// Human-readable form. The one-line form prints small integers as numbers
    /// and pushes as bare hex.
    pub fn print(&self, one_line: bool) -> String {
        let op = self.opcode;
        if one_line {
            if op.push == PushKind::None {
                return match op.value {
                    OP_0 => "0".to_string(),
                    OP_1NEGATE => "-1".to_string(),
                    OP_1..=OP_16 => (op.value - OP_1 + 1).to_string(),
                    _ => op.name().to_string(),
                };
            }
            return self.data.to_lower_hex_string();
        }

        match op.push {
            PushKind::None => op.name().to_string(),
            PushKind::Direct(_) => format!("{} 0x{}", op.name(), self.data.to_lower_hex_string()),
            PushKind::Prefixed(width) => {
                let len = match width {
                    1 => format!("0x{:02x}", self.data.len()),
                    2 => format!("0x{:04x}", self.data.len()),
                    _ => format!("0x{:08x}", self.data.len()),
                };
                format!("{} {} 0x{}", op.name(), len, self.data.to_lower_hex_string())
            }
        }
    }
}

impl fmt::Display for ParsedOpcode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.print(false))
    }
}

/// Decodes the instruction starting at `pos`, returning the opcode byte, the
/// range of its push data and the position of the next instruction.
fn decode_at(script: &[u8], pos: usize) -> Result<(u8, Range<usize>, usize), ScriptError> {
    let value = script[pos];
    let rest = script.len() - pos - 1;
    match opcode(value).push {
        PushKind::None => Ok((value, pos + 1..pos + 1, pos + 1)),
        PushKind::Direct(n) => {
            let n = usize::from(n);
            if rest < n {
                return Err(ScriptError::MalformedPush);
            }
            Ok((value, pos + 1..pos + 1 + n, pos + 1 + n))
        }
        PushKind::Prefixed(width) => {
            let width = usize::from(width);
            if rest < width {
                return Err(ScriptError::MalformedPush);
            }
            let prefix = &script[pos + 1..pos + 1 + width];
            let len = prefix
                .iter()
                .rev()
                .fold(0usize, |acc, &byte| (acc << 8) | usize::from(byte));
            let start = pos + 1 + width;
            if len > script.len() - start {
                return Err(ScriptError::MalformedPush);
            }
            Ok((value, start..start + len, start + len))
        }
    }
}

/// Iterator over the instructions of a script. Stops after the first error.
#[derive(Debug, Clone)]
pub struct Instructions<'a> {
    script: &'a [u8],
    pos: usize,
    failed: bool,
}

impl<'a> Instructions<'a> {
    pub fn new(script: &'a [u8]) -> Self {
        Self {
            script,
            pos: 0,
            failed: false,
        }
    }

    /// Byte offset of the next instruction.
    pub fn position(&self) -> usize {
        self.pos
    }
}

impl<'a> Iterator for Instructions<'a> {
    type Item = Result<ParsedOpcode<'a>, ScriptError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.script.len() {
            return None;
        }
        match decode_at(self.script, self.pos) {
            Ok((value, data, next)) => {
                self.pos = next;
                Some(Ok(ParsedOpcode {
                    opcode: opcode(value),
                    data: &self.script[data],
                }))
            }
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

/// Decodes a whole script.
pub fn parse_script(script: &[u8]) -> Result<Vec<ParsedOpcode<'_>>, ScriptError> {
    Instructions::new(script).collect()
}

/// Re-encodes a decoded script.
pub fn unparse_script(ops: &[ParsedOpcode<'_>]) -> Result<Vec<u8>, ScriptError> {
    let mut out = Vec::with_capacity(ops.iter().map(|op| op.data.len() + 1).sum());
    for op in ops {
        op.encode_into(&mut out)?;
    }
    Ok(out)
}

/// One-line disassembly. A decode failure appends `[error]` after the
/// instructions that decoded successfully.
pub fn disasm_string(script: &[u8]) -> String {
    let mut parts = Vec::new();
    for op in Instructions::new(script) {
        match op {
            Ok(op) => parts.push(op.print(true)),
            Err(_) => {
                parts.push("[error]".to_string());
                break;
            }
        }
    }
    parts.join(" ")
}

/// True when every instruction is a push (OP_RESERVED included).
pub fn is_push_only(ops: &[ParsedOpcode<'_>]) -> bool {
    ops.iter().all(|op| op.value() <= OP_16)
}

/// Owned script together with its decoded instruction boundaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedScript {
    bytes: Vec<u8>,
    spans: Vec<(u8, Range<usize>)>,
}

impl ParsedScript {
    pub fn parse(bytes: Vec<u8>) -> Result<Self, ScriptError> {
        let mut spans = Vec::new();
        let mut pos = 0;
        while pos < bytes.len() {
            let (value, data, next) = decode_at(&bytes, pos)?;
            spans.push((value, data));
            pos = next;
        }
        Ok(Self { bytes, spans })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<ParsedOpcode<'_>> {
        self.spans.get(idx).map(|(value, data)| ParsedOpcode {
            opcode: opcode(*value),
            data: &self.bytes[data.clone()],
        })
    }

    pub fn ops(&self) -> impl Iterator<Item = ParsedOpcode<'_>> + '_ {
        (0..self.spans.len()).filter_map(move |idx| self.get(idx))
    }

    /// Instructions from `start` to the end of the script.
    pub fn ops_from(&self, start: usize) -> Vec<ParsedOpcode<'_>> {
        self.ops().skip(start).collect()
    }
}
