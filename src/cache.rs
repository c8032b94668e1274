//! Caches shared between concurrent evaluations.
//!
//! Both caches sit behind an [`RwLock`]: lookups take the read lock and only
//! insertions serialise. A poisoned lock is recovered rather than propagated
//! since every entry is written atomically.

use std::{
    collections::HashMap,
    num::NonZeroUsize,
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use bitcoin::{
    secp256k1::{ecdsa::Signature, PublicKey},
    Transaction, Txid,
};
use lru::LruCache;
use tracing::trace;

use crate::sighash::TxSigHashes;

type SigCacheKey = ([u8; 32], [u8; 64], [u8; 33]);

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Remembers `(sighash, signature, pubkey)` triples that verified.
///
/// Only successful verifications are stored. Once `max_entries` is reached the
/// least recently inserted entry is evicted; with `max_entries == 0` the cache
/// never stores anything.
#[derive(Debug)]
pub struct SigCache {
    entries: Option<RwLock<LruCache<SigCacheKey, ()>>>,
}

impl SigCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: NonZeroUsize::new(max_entries).map(|cap| RwLock::new(LruCache::new(cap))),
        }
    }

    fn key(sighash: &[u8; 32], signature: &Signature, pubkey: &PublicKey) -> SigCacheKey {
        (*sighash, signature.serialize_compact(), pubkey.serialize())
    }

    /// Does not refresh recency.
    pub fn exists(&self, sighash: &[u8; 32], signature: &Signature, pubkey: &PublicKey) -> bool {
        self.entries
            .as_ref()
            .is_some_and(|entries| read(entries).contains(&Self::key(sighash, signature, pubkey)))
    }

    pub fn add(&self, sighash: &[u8; 32], signature: &Signature, pubkey: &PublicKey) {
        let Some(entries) = self.entries.as_ref() else {
            return;
        };
        let key = Self::key(sighash, signature, pubkey);
        if let Some((evicted, ())) = write(entries).push(key, ()) {
            if evicted != key {
                trace!("signature cache full, evicted oldest entry");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.as_ref().map_or(0, |entries| read(entries).len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Witness sighash midstates keyed by transaction id.
#[derive(Debug, Default)]
pub struct HashCache {
    entries: RwLock<HashMap<Txid, Arc<TxSigHashes>>>,
}

impl HashCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Computes and stores the midstate for `tx`, returning the shared copy.
    /// An existing entry is reused.
    pub fn add_sig_hashes(&self, tx: &Transaction) -> Arc<TxSigHashes> {
        let txid = tx.compute_txid();
        if let Some(existing) = self.get(&txid) {
            return existing;
        }
        let hashes = Arc::new(TxSigHashes::new(tx));
        Arc::clone(write(&self.entries).entry(txid).or_insert(hashes))
    }

    pub fn contains(&self, txid: &Txid) -> bool {
        read(&self.entries).contains_key(txid)
    }

    pub fn get(&self, txid: &Txid) -> Option<Arc<TxSigHashes>> {
        read(&self.entries).get(txid).cloned()
    }

    pub fn purge(&self, txid: &Txid) {
        write(&self.entries).remove(txid);
    }

    pub fn len(&self) -> usize {
        read(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
