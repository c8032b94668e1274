//! Transaction parsing for the byte-oriented verification entry points.

use bitcoin::{consensus, Transaction};

use crate::{sighash::TxSigHashes, Error};

/// Decoded spending transaction.
#[derive(Debug, Clone)]
pub struct TransactionContext {
    tx: Transaction,
}

impl TransactionContext {
    /// Decodes `tx_bytes`. Encodings that do not re-serialise to the same
    /// length are rejected.
    pub fn parse(tx_bytes: &[u8]) -> Result<Self, Error> {
        let tx: Transaction =
            consensus::deserialize(tx_bytes).map_err(|_| Error::TxDeserialize)?;

        let canonical = consensus::serialize(&tx);
        if canonical.len() != tx_bytes.len() {
            return Err(Error::TxSizeMismatch);
        }

        Ok(Self { tx })
    }

    pub fn tx(&self) -> &Transaction {
        &self.tx
    }

    pub fn ensure_input_index(&self, input_index: usize) -> Result<(), Error> {
        if input_index >= self.tx.input.len() {
            Err(Error::TxIndex)
        } else {
            Ok(())
        }
    }

    /// Witness sighash midstate, computed only when some input carries a
    /// witness and could therefore need it.
    pub fn sig_hashes(&self) -> Option<TxSigHashes> {
        self.tx
            .input
            .iter()
            .any(|input| !input.witness.is_empty())
            .then(|| TxSigHashes::new(&self.tx))
    }
}
