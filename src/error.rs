//! Error types reported by the script evaluator.

use thiserror::Error as ThisError;

/// Reason a script evaluation terminated without success.
///
/// Every failure is terminal for the evaluation that produced it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, ThisError)]
pub enum ScriptError {
    #[error("script terminated with a false or empty stack")]
    EvalFalse,
    #[error("OP_RETURN was executed")]
    EarlyReturn,
    #[error("script exceeds the maximum allowed size")]
    ScriptSize,
    #[error("push data exceeds the maximum element size")]
    ElementSize,
    #[error("push instruction runs past the end of the script")]
    MalformedPush,
    #[error("combined stack depth exceeds the limit")]
    StackSize,
    #[error("operation requires more stack items than are present")]
    StackUnderflow,
    #[error("stack index out of range")]
    InvalidStackOperation,
    #[error("script exceeds the maximum number of operations")]
    TooManyOperations,
    #[error("signature count out of range")]
    InvalidSignatureCount,
    #[error("public key count out of range")]
    InvalidPubKeyCount,
    #[error("numeric operand exceeds the allowed encoding length")]
    NumberTooBig,
    #[error("OP_VERIFY failed")]
    Verify,
    #[error("OP_EQUALVERIFY failed")]
    EqualVerify,
    #[error("OP_NUMEQUALVERIFY failed")]
    NumEqualVerify,
    #[error("OP_CHECKSIGVERIFY failed")]
    CheckSigVerify,
    #[error("OP_CHECKMULTISIGVERIFY failed")]
    CheckMultiSigVerify,
    #[error("disabled opcode encountered")]
    DisabledOpcode,
    #[error("reserved opcode executed")]
    ReservedOpcode,
    #[error("invalid opcode executed")]
    InvalidOpcode,
    #[error("conditional is not balanced")]
    UnbalancedConditional,
    #[error("negative locktime")]
    NegativeLockTime,
    #[error("locktime requirement not satisfied")]
    UnsatisfiedLockTime,
    #[error("data push is not minimally encoded")]
    MinimalData,
    #[error("OP_IF/NOTIF argument must be empty or 0x01")]
    MinimalIf,
    #[error("failed signature check carried a non-empty signature")]
    NullFail,
    #[error("upgradable NOP executed")]
    DiscourageUpgradableNops,
    #[error("signature hash type is not defined")]
    SigHashType,
    #[error("signature is not strictly DER encoded")]
    SigDer,
    #[error("signature S value is not in the lower half of the order")]
    SigHighS,
    #[error("public key is neither compressed nor uncompressed")]
    PubkeyType,
    #[error("multisig dummy argument is not empty")]
    SigNullDummy,
    #[error("unlocking script is not push only")]
    SigPushOnly,
    #[error("stack holds more than one item after evaluation")]
    CleanStack,
    #[error("program counter is past the final script")]
    InvalidProgramCounter,
    #[error("error condition checked before the final script finished")]
    ScriptUnfinished,
    #[error("inconsistent verification flags")]
    InvalidFlags,
    #[error("input index out of range")]
    InvalidIndex,
    #[error("unknown witness program version")]
    DiscourageUpgradableWitnessProgram,
    #[error("witness program has an invalid length")]
    WitnessProgramWrongLength,
    #[error("witness program was passed an empty witness")]
    WitnessProgramWitnessEmpty,
    #[error("witness does not match the witness program")]
    WitnessProgramMismatch,
    #[error("witness spend carries a non-empty unlocking script")]
    WitnessMalleated,
    #[error("nested witness program is not a single canonical push")]
    WitnessMalleatedP2SH,
    #[error("witness supplied for a non-witness spend")]
    WitnessUnexpected,
    #[error("witness v0 spend uses an uncompressed public key")]
    WitnessPubkeyType,
    #[error("internal consistency failure")]
    Internal,
}

/// Errors returned by the byte-level verification entry points.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ThisError)]
pub enum Error {
    /// The input index does not exist in the spending transaction.
    #[error("input index out of range")]
    TxIndex,
    /// The transaction bytes re-serialise to a different length.
    #[error("transaction length does not match its serialization")]
    TxSizeMismatch,
    /// The transaction bytes could not be deserialised.
    #[error("transaction could not be deserialized")]
    TxDeserialize,
    /// Unknown bits were set in the verification flags.
    #[error("script verification flags are invalid")]
    InvalidFlags,
    /// Script evaluation failed.
    #[error("script evaluation failed: {0}")]
    Script(#[from] ScriptError),
}
