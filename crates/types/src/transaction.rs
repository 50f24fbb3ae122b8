//! Transactions, their builder, the ordered transaction set and view calls.

use crate::{ActionType, Address, Balance, Error, Result, Sign, H256};
use basalt_codec::{Decode, Decoder, Encode, Encoder};
use basalt_crypto::ecdsa::PrivateKey;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// A signed value transfer or contract invocation.
///
/// Transactions are immutable once built: construct one through
/// [`TransactionBuilder`], sign it, and it never changes again. The recipient
/// [`Address::NULL`] marks contract creation, in which case `data` carries a
/// [`ContractInitData`] encoding.
///
/// Equality deliberately ignores the signature: two transactions with the
/// same payload are the same transaction. The hash covers the signature as
/// well, so a signed and an unsigned copy hash differently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    from: Address,
    to: Address,
    amount: Balance,
    fee: Balance,
    timestamp: u64,
    #[serde(with = "hex_bytes")]
    data: Bytes,
    sign: Sign,
}

impl Transaction {
    /// The sender address.
    pub fn from(&self) -> &Address {
        &self.from
    }

    /// The recipient address; [`Address::NULL`] for contract creation.
    pub fn to(&self) -> &Address {
        &self.to
    }

    /// The transferred amount. Always positive.
    pub fn amount(&self) -> &Balance {
        &self.amount
    }

    /// The maximum fee the sender authorizes. Always positive.
    pub fn fee(&self) -> &Balance {
        &self.fee
    }

    /// Creation time, unix seconds.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// The attached payload: calldata, or init data for creations.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// The signature.
    pub fn sign(&self) -> &Sign {
        &self.sign
    }

    /// Classifies the transaction from its shape alone. A recipient that
    /// exists as a contract turns `Transfer` into `ContractCall` at
    /// execution time; the engine re-checks against state.
    pub fn action_type(&self) -> ActionType {
        if self.to.is_null() {
            ActionType::ContractCreation
        } else if !self.data.is_empty() {
            ActionType::ContractCall
        } else {
            ActionType::Transfer
        }
    }

    /// SHA-256 over the payload fields, excluding the signature. This is the
    /// digest that gets signed.
    pub fn payload_digest(&self) -> H256 {
        let mut enc = Encoder::new();
        self.encode_payload(&mut enc);
        H256::sha256(&enc.into_bytes())
    }

    /// The transaction hash: SHA-256 over the payload extended with the
    /// signature.
    pub fn hash(&self) -> H256 {
        H256::of(self)
    }

    /// Attaches a signature produced by `key`.
    pub fn sign_with(&mut self, key: &PrivateKey) -> Result<()> {
        self.sign = Sign::create(key, &self.payload_digest())?;
        Ok(())
    }

    /// Verifies the signature against the sender address.
    pub fn check_sign(&self) -> bool {
        self.sign.verify(&self.from, &self.payload_digest())
    }

    fn encode_payload(&self, enc: &mut Encoder) {
        enc.write(&self.from);
        enc.write(&self.to);
        enc.write(&self.amount);
        enc.write(&self.fee);
        enc.write_u64(self.timestamp);
        enc.write_bytes(&self.data);
    }
}

impl PartialEq for Transaction {
    fn eq(&self, other: &Self) -> bool {
        self.from == other.from
            && self.to == other.to
            && self.amount == other.amount
            && self.fee == other.fee
            && self.timestamp == other.timestamp
            && self.data == other.data
    }
}

impl Eq for Transaction {}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tx {{ from: {}, to: {}, amount: {}, fee: {} }}",
            self.from, self.to, self.amount, self.fee
        )
    }
}

impl Encode for Transaction {
    fn encode(&self, enc: &mut Encoder) {
        self.encode_payload(enc);
        enc.write(&self.sign);
    }
}

impl Decode for Transaction {
    fn decode(dec: &mut Decoder<'_>) -> basalt_codec::Result<Self> {
        let from = dec.read()?;
        let to = dec.read()?;
        let amount: Balance = dec.read()?;
        let fee: Balance = dec.read()?;
        let timestamp = dec.read_u64()?;
        let data = Bytes::from(dec.read_bytes()?);
        let sign = dec.read()?;
        if amount.is_zero() || fee.is_zero() {
            return Err(basalt_codec::Error::InvalidValue {
                type_name: "Transaction",
                reason: "amount and fee must be positive".into(),
            });
        }
        Ok(Self {
            from,
            to,
            amount,
            fee,
            timestamp,
            data,
            sign,
        })
    }
}

/// Incremental constructor for [`Transaction`].
///
/// # Example
///
/// ```rust
/// use basalt_types::{Address, Balance, TransactionBuilder};
///
/// let tx = TransactionBuilder::new()
///     .from(Address::new([1; 20]))
///     .to(Address::new([2; 20]))
///     .amount(Balance::from(10u64))
///     .fee(Balance::from(1u64))
///     .timestamp(1700000000)
///     .build()
///     .unwrap();
/// assert!(tx.sign().is_none());
/// ```
#[derive(Debug, Default, Clone)]
pub struct TransactionBuilder {
    from: Option<Address>,
    to: Option<Address>,
    amount: Option<Balance>,
    fee: Option<Balance>,
    timestamp: Option<u64>,
    data: Bytes,
    sign: Sign,
}

impl TransactionBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the sender.
    pub fn from(mut self, from: Address) -> Self {
        self.from = Some(from);
        self
    }

    /// Sets the recipient. Use [`Address::NULL`] for contract creation.
    pub fn to(mut self, to: Address) -> Self {
        self.to = Some(to);
        self
    }

    /// Sets the transferred amount.
    pub fn amount(mut self, amount: Balance) -> Self {
        self.amount = Some(amount);
        self
    }

    /// Sets the fee budget.
    pub fn fee(mut self, fee: Balance) -> Self {
        self.fee = Some(fee);
        self
    }

    /// Sets the creation timestamp, unix seconds.
    pub fn timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Sets the payload.
    pub fn data(mut self, data: impl Into<Bytes>) -> Self {
        self.data = data.into();
        self
    }

    /// Attaches a pre-made signature.
    pub fn sign(mut self, sign: Sign) -> Self {
        self.sign = sign;
        self
    }

    /// Finalizes the transaction, validating structural constraints.
    pub fn build(self) -> Result<Transaction> {
        let amount = self.amount.ok_or(Error::MissingField("amount"))?;
        let fee = self.fee.ok_or(Error::MissingField("fee"))?;
        if amount.is_zero() {
            return Err(Error::InvalidTransaction("amount must be positive".into()));
        }
        if fee.is_zero() {
            return Err(Error::InvalidTransaction("fee must be positive".into()));
        }
        Ok(Transaction {
            from: self.from.ok_or(Error::MissingField("from"))?,
            to: self.to.ok_or(Error::MissingField("to"))?,
            amount,
            fee,
            timestamp: self.timestamp.ok_or(Error::MissingField("timestamp"))?,
            data: self.data,
            sign: self.sign,
        })
    }
}

/// The `(code, init_args)` pair carried in the data field of a contract
/// creation transaction.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContractInitData {
    /// Deployment bytecode.
    pub code: Bytes,
    /// Constructor arguments handed to the deployment code.
    pub init: Bytes,
}

impl ContractInitData {
    /// Bundles code and constructor arguments.
    pub fn new(code: impl Into<Bytes>, init: impl Into<Bytes>) -> Self {
        Self {
            code: code.into(),
            init: init.into(),
        }
    }
}

impl Encode for ContractInitData {
    fn encode(&self, enc: &mut Encoder) {
        enc.write_bytes(&self.code);
        enc.write_bytes(&self.init);
    }
}

impl Decode for ContractInitData {
    fn decode(dec: &mut Decoder<'_>) -> basalt_codec::Result<Self> {
        Ok(Self {
            code: Bytes::from(dec.read_bytes()?),
            init: Bytes::from(dec.read_bytes()?),
        })
    }
}

/// An ordered set of transactions, deduplicated by hash.
///
/// Iteration order is insertion order; a block applies its transactions in
/// exactly this order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Transaction>", into = "Vec<Transaction>")]
pub struct TransactionsSet {
    transactions: Vec<Transaction>,
    hashes: HashSet<H256>,
}

impl TransactionsSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a transaction. Returns `false` if its hash is already present.
    pub fn add(&mut self, tx: Transaction) -> bool {
        if !self.hashes.insert(tx.hash()) {
            return false;
        }
        self.transactions.push(tx);
        true
    }

    /// Checks membership by transaction hash.
    pub fn contains_hash(&self, hash: &H256) -> bool {
        self.hashes.contains(hash)
    }

    /// Checks membership of an equal transaction.
    pub fn contains(&self, tx: &Transaction) -> bool {
        self.contains_hash(&tx.hash())
    }

    /// Removes a transaction by hash. Returns whether it was present.
    pub fn remove(&mut self, hash: &H256) -> bool {
        if !self.hashes.remove(hash) {
            return false;
        }
        self.transactions.retain(|tx| tx.hash() != *hash);
        true
    }

    /// Iterates in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, Transaction> {
        self.transactions.iter()
    }

    /// Number of transactions.
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

impl From<Vec<Transaction>> for TransactionsSet {
    fn from(transactions: Vec<Transaction>) -> Self {
        transactions.into_iter().collect()
    }
}

impl From<TransactionsSet> for Vec<Transaction> {
    fn from(set: TransactionsSet) -> Self {
        set.transactions
    }
}

impl FromIterator<Transaction> for TransactionsSet {
    fn from_iter<I: IntoIterator<Item = Transaction>>(iter: I) -> Self {
        let mut set = Self::new();
        for tx in iter {
            set.add(tx);
        }
        set
    }
}

impl<'a> IntoIterator for &'a TransactionsSet {
    type Item = &'a Transaction;
    type IntoIter = std::slice::Iter<'a, Transaction>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl Encode for TransactionsSet {
    fn encode(&self, enc: &mut Encoder) {
        enc.write_u32(self.transactions.len() as u32);
        for tx in &self.transactions {
            enc.write(tx);
        }
    }
}

impl Decode for TransactionsSet {
    fn decode(dec: &mut Decoder<'_>) -> basalt_codec::Result<Self> {
        let count = dec.read_u32()?;
        let mut set = Self::new();
        for _ in 0..count {
            let tx: Transaction = dec.read()?;
            if !set.add(tx) {
                return Err(basalt_codec::Error::InvalidValue {
                    type_name: "TransactionsSet",
                    reason: "duplicate transaction hash".into(),
                });
            }
        }
        Ok(set)
    }
}

/// A side-effect-free contract invocation used to query derived state.
///
/// View calls carry no fee and persist nothing; a signature is optional and
/// checked only when present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewCall {
    from: Address,
    contract_address: Address,
    timestamp: u64,
    #[serde(with = "hex_bytes")]
    data: Bytes,
    sign: Sign,
}

impl ViewCall {
    /// Creates an unsigned view call.
    pub fn new(
        from: Address,
        contract_address: Address,
        timestamp: u64,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            from,
            contract_address,
            timestamp,
            data: data.into(),
            sign: Sign::None,
        }
    }

    /// The caller address presented to the contract.
    pub fn from(&self) -> &Address {
        &self.from
    }

    /// The contract being queried.
    pub fn contract_address(&self) -> &Address {
        &self.contract_address
    }

    /// Call time, unix seconds.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// The calldata.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// The optional signature.
    pub fn sign(&self) -> &Sign {
        &self.sign
    }

    /// SHA-256 over the call fields, excluding the signature.
    pub fn digest(&self) -> H256 {
        let mut enc = Encoder::new();
        enc.write(&self.from);
        enc.write(&self.contract_address);
        enc.write_u64(self.timestamp);
        enc.write_bytes(&self.data);
        H256::sha256(&enc.into_bytes())
    }

    /// Attaches a signature produced by `key`.
    pub fn sign_with(&mut self, key: &PrivateKey) -> Result<()> {
        self.sign = Sign::create(key, &self.digest())?;
        Ok(())
    }

    /// Verifies the signature when one is present.
    pub fn check_sign(&self) -> bool {
        self.sign.verify(&self.from, &self.digest())
    }
}

/// Serde helper rendering byte payloads as hex strings.
mod hex_bytes {
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s.strip_prefix("0x").unwrap_or(&s))
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tx() -> Transaction {
        TransactionBuilder::new()
            .from(Address::new([1; 20]))
            .to(Address::new([2; 20]))
            .amount(Balance::from(100u64))
            .fee(Balance::from(10u64))
            .timestamp(1_700_000_000)
            .data(vec![0xde, 0xad])
            .build()
            .unwrap()
    }

    #[test]
    fn builder_rejects_zero_amount_and_fee() {
        let base = TransactionBuilder::new()
            .from(Address::new([1; 20]))
            .to(Address::new([2; 20]))
            .timestamp(0);
        assert!(base
            .clone()
            .amount(Balance::zero())
            .fee(Balance::from(1u64))
            .build()
            .is_err());
        assert!(base
            .amount(Balance::from(1u64))
            .fee(Balance::zero())
            .build()
            .is_err());
    }

    #[test]
    fn equality_ignores_signature() {
        let unsigned = sample_tx();
        let mut signed = sample_tx();
        signed
            .sign_with(&basalt_crypto::ecdsa::PrivateKey::random())
            .unwrap();
        assert_eq!(unsigned, signed);
        assert_ne!(unsigned.hash(), signed.hash());
    }

    #[test]
    fn action_type_from_shape() {
        let creation = TransactionBuilder::new()
            .from(Address::new([1; 20]))
            .to(Address::NULL)
            .amount(Balance::from(1u64))
            .fee(Balance::from(1u64))
            .timestamp(0)
            .build()
            .unwrap();
        assert_eq!(creation.action_type(), ActionType::ContractCreation);
        assert_eq!(sample_tx().action_type(), ActionType::ContractCall);
    }

    #[test]
    fn transactions_set_deduplicates() {
        let mut set = TransactionsSet::new();
        assert!(set.add(sample_tx()));
        assert!(!set.add(sample_tx()));
        assert_eq!(set.len(), 1);
        assert!(set.contains(&sample_tx()));
    }

    #[test]
    fn transactions_set_keeps_insertion_order() {
        let mut set = TransactionsSet::new();
        for i in 1..=4u64 {
            let tx = TransactionBuilder::new()
                .from(Address::new([1; 20]))
                .to(Address::new([2; 20]))
                .amount(Balance::from(i))
                .fee(Balance::from(1u64))
                .timestamp(0)
                .build()
                .unwrap();
            set.add(tx);
        }
        let amounts: Vec<String> = set.iter().map(|tx| tx.amount().to_string()).collect();
        assert_eq!(amounts, ["1", "2", "3", "4"]);
    }
}
