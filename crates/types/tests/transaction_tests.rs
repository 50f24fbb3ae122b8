//! Integration tests for transaction signing and hashing.

use basalt_crypto::ecdsa::PrivateKey;
use basalt_types::{Address, Balance, Sign, Transaction, TransactionBuilder};

fn transfer(from: Address, to: Address, amount: u64, fee: u64) -> Transaction {
    TransactionBuilder::new()
        .from(from)
        .to(to)
        .amount(Balance::from(amount))
        .fee(Balance::from(fee))
        .timestamp(1_700_000_000)
        .build()
        .unwrap()
}

#[test]
fn sign_then_check_holds_for_owner() {
    let key = PrivateKey::random();
    let from = Address::from_public_key(&key.public_key());
    let mut tx = transfer(from, Address::new([2; 20]), 100, 10);

    assert!(!tx.check_sign());
    tx.sign_with(&key).unwrap();
    assert!(tx.check_sign());
}

#[test]
fn check_fails_when_sender_is_not_the_signer() {
    let key = PrivateKey::random();
    // `from` does not belong to `key`.
    let mut tx = transfer(Address::new([9; 20]), Address::new([2; 20]), 100, 10);
    tx.sign_with(&key).unwrap();
    assert!(!tx.check_sign());
}

#[test]
fn hash_depends_only_on_content() {
    let key = PrivateKey::random();
    let from = Address::from_public_key(&key.public_key());

    let mut a = transfer(from, Address::new([2; 20]), 100, 10);
    let mut b = transfer(from, Address::new([2; 20]), 100, 10);
    a.sign_with(&key).unwrap();
    b.sign_with(&key).unwrap();
    // ECDSA in k256 is RFC 6979 deterministic, so equal payloads signed by
    // the same key hash equal.
    assert_eq!(a.hash(), b.hash());

    let c = transfer(from, Address::new([2; 20]), 101, 10);
    assert_ne!(a.hash(), c.hash());
}

#[test]
fn codec_round_trip_preserves_signature_validity() {
    let key = PrivateKey::random();
    let from = Address::from_public_key(&key.public_key());
    let mut tx = transfer(from, Address::new([2; 20]), 100, 10);
    tx.sign_with(&key).unwrap();

    let bytes = basalt_codec::to_bytes(&tx);
    let decoded: Transaction = basalt_codec::from_bytes(&bytes).unwrap();
    assert_eq!(decoded, tx);
    assert_eq!(decoded.hash(), tx.hash());
    assert!(decoded.check_sign());
}

#[test]
fn serde_round_trip() {
    let key = PrivateKey::random();
    let from = Address::from_public_key(&key.public_key());
    let mut tx = transfer(from, Address::new([2; 20]), 100, 10);
    tx.sign_with(&key).unwrap();

    let json = serde_json::to_string(&tx).unwrap();
    let decoded: Transaction = serde_json::from_str(&json).unwrap();
    assert_eq!(decoded, tx);
    assert!(decoded.check_sign());
    assert!(!matches!(decoded.sign(), Sign::None));
}

#[test]
fn zero_amount_transaction_cannot_be_decoded() {
    // Hand-craft a payload with amount = 0 and check the codec refuses it;
    // the builder already refuses to produce one.
    let mut enc = basalt_codec::Encoder::new();
    enc.write(&Address::new([1; 20]));
    enc.write(&Address::new([2; 20]));
    enc.write(&Balance::zero()); // amount
    enc.write(&Balance::from(1u64)); // fee
    enc.write_u64(0); // timestamp
    enc.write_bytes(&[]); // data
    enc.write(&Sign::None);
    assert!(basalt_codec::from_bytes::<Transaction>(&enc.into_bytes()).is_err());
}
