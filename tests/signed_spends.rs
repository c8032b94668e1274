
use bitcoin::{
    absolute::LockTime,
    consensus,
    hashes::{hash160, sha256, Hash},
    secp256k1::{ecdsa::Signature, Message, PublicKey, Secp256k1, SecretKey, SignOnly},
    transaction::Version,
    Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness,
};
use ledger_script::{
    legacy_signature_hash, opcode::*, verify, verify_input, witness_signature_hash, Error,
    HashCache, ScriptError, ScriptFlags, SigCache, TxSigHashes, SIGHASH_ALL, SIGHASH_SINGLE,
    VERIFY_CONSENSUS, VERIFY_LOW_S, VERIFY_NONE, VERIFY_NULLFAIL, VERIFY_P2SH, VERIFY_STANDARD,
    VERIFY_WITNESS, VERIFY_WITNESS_PUBKEYTYPE,
};
use script_asm::push_data;

const AMOUNT: u64 = 50_000;

struct Key {
    secret: SecretKey,
    public: PublicKey,
}

impl Key {
    fn new(seed: u8) -> Self {
        let secret = SecretKey::from_slice(&[seed; 32]).expect("valid secret key");
        let public = PublicKey::from_secret_key(&signer(), &secret);
        Self { secret, public }
    }

    fn compressed(&self) -> Vec<u8> {
        self.public.serialize().to_vec()
    }

    fn uncompressed(&self) -> Vec<u8> {
        self.public.serialize_uncompressed().to_vec()
    }

    fn sign(&self, digest: [u8; 32], hash_type: u32) -> Vec<u8> {
        let signature = signer().sign_ecdsa(&Message::from_digest(digest), &self.secret);
        with_hash_type(&signature, hash_type)
    }
}

fn signer() -> Secp256k1<SignOnly> {
    Secp256k1::signing_only()
}

fn with_hash_type(signature: &Signature, hash_type: u32) -> Vec<u8> {
    let mut out = signature.serialize_der().to_vec();
    out.push(hash_type as u8);
    out
}

fn flags(bits: u32) -> ScriptFlags {
    ScriptFlags::from_bits(bits).unwrap()
}

fn spending_tx(inputs: usize, outputs: usize) -> Transaction {
    Transaction {
        version: Version(2),
        lock_time: LockTime::ZERO,
        input: (0..inputs)
            .map(|i| TxIn {
                previous_output: OutPoint {
                    txid: Txid::from_byte_array([0x42; 32]),
                    vout: i as u32,
                },
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            })
            .collect(),
        output: (0..outputs)
            .map(|_| TxOut {
                value: Amount::from_sat(AMOUNT - 1_000),
                script_pubkey: ScriptBuf::from_bytes(vec![OP_TRUE]),
            })
            .collect(),
    }
}

fn script_sig(items: &[&[u8]]) -> ScriptBuf {
    let mut script = Vec::new();
    for item in items {
        push_data(&mut script, item);
    }
    ScriptBuf::from_bytes(script)
}

fn p2pkh(pubkey: &[u8]) -> Vec<u8> {
    let mut script = vec![OP_DUP, OP_HASH160];
    push_data(&mut script, hash160::Hash::hash(pubkey).as_byte_array());
    script.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
    script
}

fn p2wpkh(pubkey: &[u8]) -> Vec<u8> {
    let mut script = vec![OP_0];
    push_data(&mut script, hash160::Hash::hash(pubkey).as_byte_array());
    script
}

fn p2sh(redeem_script: &[u8]) -> Vec<u8> {
    let mut script = vec![OP_HASH160];
    push_data(&mut script, hash160::Hash::hash(redeem_script).as_byte_array());
    script.push(OP_EQUAL);
    script
}

fn p2wsh(witness_script: &[u8]) -> Vec<u8> {
    let mut script = vec![OP_0];
    push_data(&mut script, sha256::Hash::hash(witness_script).as_byte_array());
    script
}

fn multisig(required: u8, keys: &[&Key]) -> Vec<u8> {
    let mut script = vec![OP_1 + required - 1];
    for key in keys {
        push_data(&mut script, &key.compressed());
    }
    script.push(OP_1 + keys.len() as u8 - 1);
    script.push(OP_CHECKMULTISIG);
    script
}

fn legacy_digest(script_code: &[u8], tx: &Transaction, input_index: usize) -> [u8; 32] {
    legacy_signature_hash(script_code, SIGHASH_ALL, tx, input_index).unwrap()
}

fn witness_digest(script_code: &[u8], tx: &Transaction) -> [u8; 32] {
    let hashes = TxSigHashes::new(tx);
    witness_signature_hash(script_code, &hashes, SIGHASH_ALL, tx, 0, AMOUNT).unwrap()
}

/// Flips a low-S signature into its high-S twin.
fn to_high_s(signature: &Signature) -> Signature {
    const ORDER: [u8; 32] = [
        0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
        0xfe, 0xba, 0xae, 0xdc, 0xe6, 0xaf, 0x48, 0xa0, 0x3b, 0xbf, 0xd2, 0x5e, 0x8c, 0xd0, 0x36,
        0x41, 0x41,
    ];
    let mut compact = signature.serialize_compact();
    let mut borrow = 0i16;
    for i in (0..32).rev() {
        let diff = i16::from(ORDER[i]) - i16::from(compact[32 + i]) - borrow;
        borrow = i16::from(diff < 0);
        compact[32 + i] = (diff + (borrow << 8)) as u8;
    }
    Signature::from_compact(&compact).unwrap()
}

#[test]
fn p2pkh_spend() {
    let key = Key::new(1);
    let script_pubkey = p2pkh(&key.compressed());
    let mut tx = spending_tx(1, 1);
    let sig = key.sign(legacy_digest(&script_pubkey, &tx, 0), SIGHASH_ALL);
    tx.input[0].script_sig = script_sig(&[&sig, &key.compressed()]);

    for bits in [VERIFY_NONE, VERIFY_CONSENSUS, VERIFY_STANDARD] {
        assert_eq!(
            verify_input(&tx, 0, &script_pubkey, AMOUNT, flags(bits), None, None),
            Ok(())
        );
    }

    // Any change to the committed outputs breaks the signature.
    let mut tampered = tx.clone();
    tampered.output[0].value = Amount::from_sat(1);
    assert_eq!(
        verify_input(&tampered, 0, &script_pubkey, AMOUNT, flags(VERIFY_CONSENSUS), None, None),
        Err(ScriptError::EvalFalse)
    );
    assert_eq!(
        verify_input(&tampered, 0, &script_pubkey, AMOUNT, flags(VERIFY_STANDARD), None, None),
        Err(ScriptError::NullFail)
    );
}

#[test]
fn serialized_entry_point() {
    let key = Key::new(2);
    let script_pubkey = p2pkh(&key.compressed());
    let mut tx = spending_tx(1, 1);
    let sig = key.sign(legacy_digest(&script_pubkey, &tx, 0), SIGHASH_ALL);
    tx.input[0].script_sig = script_sig(&[&sig, &key.compressed()]);

    let bytes = consensus::serialize(&tx);
    assert_eq!(verify(&script_pubkey, AMOUNT, &bytes, 0), Ok(()));
    assert_eq!(verify(&script_pubkey, AMOUNT, &bytes, 1), Err(Error::TxIndex));
    assert_eq!(
        verify(&p2pkh(&Key::new(3).compressed()), AMOUNT, &bytes, 0),
        Err(Error::Script(ScriptError::EqualVerify))
    );
}

#[test]
fn checksigverify_and_codeseparator() {
    let key = Key::new(4);
    let mut script_pubkey = Vec::new();
    push_data(&mut script_pubkey, &key.compressed());
    script_pubkey.extend_from_slice(&[OP_CHECKSIGVERIFY, OP_1]);

    let mut tx = spending_tx(1, 1);
    let sig = key.sign(legacy_digest(&script_pubkey, &tx, 0), SIGHASH_ALL);
    tx.input[0].script_sig = script_sig(&[&sig]);
    assert_eq!(
        verify_input(&tx, 0, &script_pubkey, AMOUNT, flags(VERIFY_STANDARD), None, None),
        Ok(())
    );

    tx.input[0].script_sig = script_sig(&[&[]]);
    assert_eq!(
        verify_input(&tx, 0, &script_pubkey, AMOUNT, flags(VERIFY_STANDARD), None, None),
        Err(ScriptError::CheckSigVerify)
    );

    // Only the part after the last separator is signed.
    let mut signed_part = Vec::new();
    push_data(&mut signed_part, &key.compressed());
    signed_part.push(OP_CHECKSIG);
    let mut script_pubkey = vec![OP_NOP, OP_CODESEPARATOR];
    script_pubkey.extend_from_slice(&signed_part);

    let sig = key.sign(legacy_digest(&signed_part, &tx, 0), SIGHASH_ALL);
    tx.input[0].script_sig = script_sig(&[&sig]);
    assert_eq!(
        verify_input(&tx, 0, &script_pubkey, AMOUNT, flags(VERIFY_CONSENSUS), None, None),
        Ok(())
    );

    let sig = key.sign(legacy_digest(&script_pubkey, &tx, 0), SIGHASH_ALL);
    tx.input[0].script_sig = script_sig(&[&sig]);
    assert_eq!(
        verify_input(&tx, 0, &script_pubkey, AMOUNT, flags(VERIFY_CONSENSUS), None, None),
        Err(ScriptError::EvalFalse)
    );
}

#[test]
fn bare_multisig_signature_order() {
    let keys = [Key::new(5), Key::new(6), Key::new(7)];
    let script_pubkey = multisig(2, &[&keys[0], &keys[1], &keys[2]]);
    let mut tx = spending_tx(1, 1);
    let digest = legacy_digest(&script_pubkey, &tx, 0);
    let first = keys[0].sign(digest, SIGHASH_ALL);
    let third = keys[2].sign(digest, SIGHASH_ALL);

    tx.input[0].script_sig = script_sig(&[&[], &first, &third]);
    assert_eq!(
        verify_input(&tx, 0, &script_pubkey, AMOUNT, flags(VERIFY_STANDARD), None, None),
        Ok(())
    );

    // Signatures must follow key order.
    tx.input[0].script_sig = script_sig(&[&[], &third, &first]);
    assert_eq!(
        verify_input(&tx, 0, &script_pubkey, AMOUNT, flags(VERIFY_CONSENSUS), None, None),
        Err(ScriptError::EvalFalse)
    );
    assert_eq!(
        verify_input(
            &tx,
            0,
            &script_pubkey,
            AMOUNT,
            flags(VERIFY_CONSENSUS | VERIFY_NULLFAIL),
            None,
            None
        ),
        Err(ScriptError::NullFail)
    );

    // The dummy is consumed but must be empty under NULLDUMMY.
    tx.input[0].script_sig = script_sig(&[&[0x01], &first, &third]);
    assert_eq!(
        verify_input(&tx, 0, &script_pubkey, AMOUNT, flags(VERIFY_P2SH), None, None),
        Ok(())
    );
    assert_eq!(
        verify_input(&tx, 0, &script_pubkey, AMOUNT, flags(VERIFY_CONSENSUS), None, None),
        Err(ScriptError::SigNullDummy)
    );
}

#[test]
fn p2sh_multisig_spend() {
    let keys = [Key::new(8), Key::new(9), Key::new(10)];
    let redeem_script = multisig(2, &[&keys[0], &keys[1], &keys[2]]);
    let script_pubkey = p2sh(&redeem_script);
    let mut tx = spending_tx(1, 1);
    let digest = legacy_digest(&redeem_script, &tx, 0);
    let first = keys[0].sign(digest, SIGHASH_ALL);
    let second = keys[1].sign(digest, SIGHASH_ALL);

    tx.input[0].script_sig = script_sig(&[&[], &first, &second, &redeem_script]);
    assert_eq!(
        verify_input(&tx, 0, &script_pubkey, AMOUNT, flags(VERIFY_STANDARD), None, None),
        Ok(())
    );

    tx.input[0].script_sig = script_sig(&[&[], &first, &redeem_script]);
    assert_eq!(
        verify_input(&tx, 0, &script_pubkey, AMOUNT, flags(VERIFY_CONSENSUS), None, None),
        Err(ScriptError::EvalFalse)
    );
}

#[test]
fn p2wpkh_spend() {
    let key = Key::new(11);
    let script_pubkey = p2wpkh(&key.compressed());
    let mut tx = spending_tx(1, 1);
    let script_code = p2pkh(&key.compressed());
    let sig = key.sign(witness_digest(&script_code, &tx), SIGHASH_ALL);
    tx.input[0].witness = Witness::from_slice(&[sig.clone(), key.compressed()]);

    assert_eq!(
        verify_input(&tx, 0, &script_pubkey, AMOUNT, flags(VERIFY_STANDARD), None, None),
        Ok(())
    );
    let bytes = consensus::serialize(&tx);
    assert_eq!(verify(&script_pubkey, AMOUNT, &bytes, 0), Ok(()));

    // The spent amount is committed to.
    assert_eq!(
        verify_input(&tx, 0, &script_pubkey, AMOUNT + 1, flags(VERIFY_CONSENSUS), None, None),
        Err(ScriptError::EvalFalse)
    );

    // The legacy digest does not satisfy a witness program.
    let legacy_sig = key.sign(legacy_digest(&script_code, &tx, 0), SIGHASH_ALL);
    tx.input[0].witness = Witness::from_slice(&[legacy_sig, key.compressed()]);
    assert_eq!(
        verify_input(&tx, 0, &script_pubkey, AMOUNT, flags(VERIFY_CONSENSUS), None, None),
        Err(ScriptError::EvalFalse)
    );
}

#[test]
fn p2wsh_checksig_with_hash_cache() {
    let key = Key::new(12);
    let mut witness_script = Vec::new();
    push_data(&mut witness_script, &key.compressed());
    witness_script.push(OP_CHECKSIG);
    let script_pubkey = p2wsh(&witness_script);

    let mut tx = spending_tx(1, 2);
    let sig = key.sign(witness_digest(&witness_script, &tx), SIGHASH_ALL);
    tx.input[0].witness = Witness::from_slice(&[sig, witness_script]);

    let hash_cache = HashCache::new();
    assert_eq!(
        verify_input(
            &tx,
            0,
            &script_pubkey,
            AMOUNT,
            flags(VERIFY_STANDARD),
            None,
            Some(&hash_cache)
        ),
        Ok(())
    );
    assert!(hash_cache.contains(&tx.compute_txid()));
    assert_eq!(
        *hash_cache.get(&tx.compute_txid()).unwrap(),
        TxSigHashes::new(&tx)
    );
}

#[test]
fn witness_pubkey_type() {
    let key = Key::new(13);
    let script_pubkey = p2wpkh(&key.uncompressed());
    let mut tx = spending_tx(1, 1);
    let sig = key.sign(
        witness_digest(&p2pkh(&key.uncompressed()), &tx),
        SIGHASH_ALL,
    );
    tx.input[0].witness = Witness::from_slice(&[sig, key.uncompressed()]);

    assert_eq!(
        verify_input(&tx, 0, &script_pubkey, AMOUNT, flags(VERIFY_WITNESS), None, None),
        Ok(())
    );
    assert_eq!(
        verify_input(
            &tx,
            0,
            &script_pubkey,
            AMOUNT,
            flags(VERIFY_WITNESS | VERIFY_WITNESS_PUBKEYTYPE),
            None,
            None
        ),
        Err(ScriptError::WitnessPubkeyType)
    );
}

#[test]
fn high_s_signatures() {
    let key = Key::new(14);
    let script_pubkey = p2pkh(&key.compressed());
    let mut tx = spending_tx(1, 1);
    let digest = legacy_digest(&script_pubkey, &tx, 0);
    let low = signer().sign_ecdsa(&Message::from_digest(digest), &key.secret);
    let high = with_hash_type(&to_high_s(&low), SIGHASH_ALL);
    tx.input[0].script_sig = script_sig(&[&high, &key.compressed()]);

    assert_eq!(
        verify_input(&tx, 0, &script_pubkey, AMOUNT, flags(VERIFY_CONSENSUS), None, None),
        Ok(())
    );
    assert_eq!(
        verify_input(
            &tx,
            0,
            &script_pubkey,
            AMOUNT,
            flags(VERIFY_CONSENSUS | VERIFY_LOW_S),
            None,
            None
        ),
        Err(ScriptError::SigHighS)
    );
}

#[test]
fn sighash_single_without_matching_output() {
    let key = Key::new(15);
    let script_pubkey = p2pkh(&key.compressed());
    let mut tx = spending_tx(2, 1);

    let digest = legacy_signature_hash(&script_pubkey, SIGHASH_SINGLE, &tx, 1).unwrap();
    let mut one = [0u8; 32];
    one[0] = 1;
    assert_eq!(digest, one);

    let sig = key.sign(digest, SIGHASH_SINGLE);
    tx.input[1].script_sig = script_sig(&[&sig, &key.compressed()]);
    assert_eq!(
        verify_input(&tx, 1, &script_pubkey, AMOUNT, flags(VERIFY_CONSENSUS), None, None),
        Ok(())
    );
}

#[test]
fn signature_cache_records_successes() {
    let key = Key::new(16);
    let script_pubkey = p2pkh(&key.compressed());
    let mut tx = spending_tx(1, 1);
    let sig = key.sign(legacy_digest(&script_pubkey, &tx, 0), SIGHASH_ALL);
    tx.input[0].script_sig = script_sig(&[&sig, &key.compressed()]);

    let cache = SigCache::new(16);
    let run = |cache: &SigCache| {
        verify_input(&tx, 0, &script_pubkey, AMOUNT, flags(VERIFY_STANDARD), Some(cache), None)
    };
    assert_eq!(run(&cache), Ok(()));
    assert_eq!(cache.len(), 1);
    assert_eq!(run(&cache), Ok(()));
    assert_eq!(cache.len(), 1);

    // Failures never enter the cache.
    let mut tampered = tx.clone();
    tampered.lock_time = LockTime::from_consensus(5);
    assert_eq!(
        verify_input(
            &tampered,
            0,
            &script_pubkey,
            AMOUNT,
            flags(VERIFY_CONSENSUS),
            Some(&cache),
            None
        ),
        Err(ScriptError::EvalFalse)
    );
    assert_eq!(cache.len(), 1);
}

#[test]
fn multisig_verdicts_ignore_cache_warmth() {
    let keys = [Key::new(17), Key::new(18), Key::new(19)];
    let script_pubkey = multisig(2, &[&keys[0], &keys[1], &keys[2]]);
    let mut tx = spending_tx(1, 1);
    let digest = legacy_digest(&script_pubkey, &tx, 0);
    let first = keys[0].sign(digest, SIGHASH_ALL);
    let third = keys[2].sign(digest, SIGHASH_ALL);

    let sig_cache = SigCache::new(16);
    let hash_cache = HashCache::new();

    // Warm the cache with both valid (signature, key) pairs.
    tx.input[0].script_sig = script_sig(&[&[], &first, &third]);
    assert_eq!(
        verify_input(
            &tx,
            0,
            &script_pubkey,
            AMOUNT,
            flags(VERIFY_STANDARD),
            Some(&sig_cache),
            Some(&hash_cache)
        ),
        Ok(())
    );
    assert_eq!(sig_cache.len(), 2);

    let cases: [([&[u8]; 3], u32); 4] = [
        ([&[], &first, &third], VERIFY_CONSENSUS),
        ([&[], &third, &first], VERIFY_CONSENSUS),
        ([&[], &third, &first], VERIFY_CONSENSUS | VERIFY_NULLFAIL),
        ([&[], &first, &[]], VERIFY_CONSENSUS | VERIFY_NULLFAIL),
    ];
    for (items, bits) in cases {
        tx.input[0].script_sig = script_sig(&items);
        let cold = verify_input(&tx, 0, &script_pubkey, AMOUNT, flags(bits), None, None);
        let warm = verify_input(
            &tx,
            0,
            &script_pubkey,
            AMOUNT,
            flags(bits),
            Some(&sig_cache),
            Some(&hash_cache),
        );
        assert_eq!(cold, warm, "flags {bits:#x}");
    }

    tx.input[0].script_sig = script_sig(&[&[], &third, &first]);
    assert_eq!(
        verify_input(
            &tx,
            0,
            &script_pubkey,
            AMOUNT,
            flags(VERIFY_CONSENSUS | VERIFY_NULLFAIL),
            Some(&sig_cache),
            None
        ),
        Err(ScriptError::NullFail)
    );
}
