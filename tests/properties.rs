use bitcoin::{
    absolute::LockTime, transaction::Version, Amount, OutPoint, ScriptBuf, Sequence, Transaction,
    TxIn, TxOut, Witness,
};
use ledger_script::{
    check_minimal_data_encoding, disasm_string, parse_script, unparse_script, verify_input, Engine,
    EngineState, HashCache, ScriptFlags, ScriptNum, SigCache, DEFAULT_SCRIPT_NUM_LEN, LOCKTIME_SCRIPT_NUM_LEN,
    VERIFY_CONSENSUS, VERIFY_NONE, VERIFY_STANDARD,
};
use proptest::prelude::*;

const FLAG_SETS: &[u32] = &[VERIFY_NONE, VERIFY_CONSENSUS, VERIFY_STANDARD];

fn spend(script_sig: Vec<u8>) -> Transaction {
    Transaction {
        version: Version(2),
        lock_time: LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint::default(),
            script_sig: ScriptBuf::from_bytes(script_sig),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        }],
        output: vec![TxOut {
            value: Amount::from_sat(0),
            script_pubkey: ScriptBuf::new(),
        }],
    }
}

/// Scripts biased towards short pushes and common opcodes so that evaluation
/// gets past the first few instructions.
fn script_strategy() -> impl Strategy<Value = Vec<u8>> {
    let op = prop_oneof![
        3 => (0x51u8..=0x60).prop_map(|op| vec![op]),
        3 => (0x61u8..=0xb9).prop_map(|op| vec![op]),
        2 => prop::collection::vec(any::<u8>(), 1..=4).prop_map(|data| {
            let mut out = vec![data.len() as u8];
            out.extend(data);
            out
        }),
        1 => any::<u8>().prop_map(|op| vec![op]),
    ];
    prop::collection::vec(op, 0..24).prop_map(|ops| ops.concat())
}

proptest! {
    #[test]
    fn script_num_round_trips(value in -(i64::from(i32::MAX))..=i64::from(i32::MAX)) {
        let bytes = ScriptNum::new(value).to_bytes();
        prop_assert!(bytes.len() <= DEFAULT_SCRIPT_NUM_LEN);
        prop_assert!(check_minimal_data_encoding(&bytes).is_ok());
        let decoded = ScriptNum::from_bytes(&bytes, true, DEFAULT_SCRIPT_NUM_LEN).unwrap();
        prop_assert_eq!(decoded.value(), value);
    }

    #[test]
    fn five_byte_numbers_round_trip(value in -0x7f_ffff_ffffi64..=0x7f_ffff_ffff) {
        let bytes = ScriptNum::new(value).to_bytes();
        prop_assert!(bytes.len() <= LOCKTIME_SCRIPT_NUM_LEN);
        let decoded = ScriptNum::from_bytes(&bytes, true, LOCKTIME_SCRIPT_NUM_LEN).unwrap();
        prop_assert_eq!(decoded.value(), value);
    }

    #[test]
    fn non_minimal_padding_is_detected(value in 1i64..0x7fff, negative in any::<bool>()) {
        let mut bytes = ScriptNum::new(value).to_bytes();
        // Append a redundant sign byte.
        let last = bytes.len() - 1;
        bytes[last] &= 0x7f;
        bytes.push(if negative { 0x80 } else { 0x00 });
        prop_assert!(check_minimal_data_encoding(&bytes).is_err());
        let lax = ScriptNum::from_bytes(&bytes, false, DEFAULT_SCRIPT_NUM_LEN).unwrap();
        prop_assert_eq!(lax.value(), if negative { -value } else { value });
    }

    #[test]
    fn decoding_round_trips(script in prop::collection::vec(any::<u8>(), 0..64)) {
        if let Ok(ops) = parse_script(&script) {
            prop_assert_eq!(unparse_script(&ops).unwrap(), script.clone());
        }
        // Disassembly never panics, even on truncated pushes.
        let _ = disasm_string(&script);
    }

    #[test]
    fn evaluation_is_deterministic(
        script_sig in prop::collection::vec(0x00u8..=0x60, 0..8),
        script_pubkey in script_strategy(),
        flag_idx in 0..FLAG_SETS.len(),
    ) {
        let tx = spend(script_sig);
        let flags = ScriptFlags::from_bits(FLAG_SETS[flag_idx]).unwrap();

        let first = verify_input(&tx, 0, &script_pubkey, 0, flags, None, None);
        let second = verify_input(&tx, 0, &script_pubkey, 0, flags, None, None);
        prop_assert_eq!(first, second);

        // Shared caches, cold and then warm, never change the verdict.
        let sig_cache = SigCache::new(64);
        let hash_cache = HashCache::new();
        for _ in 0..2 {
            let cached = verify_input(
                &tx,
                0,
                &script_pubkey,
                0,
                flags,
                Some(&sig_cache),
                Some(&hash_cache),
            );
            prop_assert_eq!(cached, first);
        }

        // Stepping reaches the same verdict as running to completion.
        let stepped = Engine::new(&script_pubkey, &tx, 0, flags, 0).and_then(|mut engine| {
            while !engine.step()? {}
            engine.check_error_condition(true)?;
            Ok(engine.state())
        });
        prop_assert_eq!(stepped.map(|_| ()), first);
        if let Ok(state) = stepped {
            prop_assert_eq!(state, EngineState::Succeeded);
        }
    }
}
