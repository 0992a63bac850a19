//! Signature-table classification of raw logs.

use std::collections::HashMap;

use alloy::primitives::{B256, keccak256};

use crate::types::{RawLog, UNKNOWN_EVENT};

/// Canonical signatures emitted by the NeuroLend lending contract, mapped to event names.
pub const NEUROLEND_EVENT_SIGNATURES: &[(&str, &str)] = &[
    ("CollateralAdded(uint256,address,uint256,uint256,uint256)", "CollateralAdded"),
    ("CollateralRemoved(uint256,address,uint256,uint256,uint256)", "CollateralRemoved"),
    ("LoanAccepted(uint256,address,uint256,uint256)", "LoanAccepted"),
    (
        "LoanCreated(uint256,address,address,uint256,uint256,uint256,address,uint256,uint256,uint256,uint256)",
        "LoanCreated",
    ),
    ("LoanLiquidated(uint256,address,uint256,uint256,uint256)", "LoanLiquidated"),
    (
        "LoanMatched(uint256,uint256,uint256,address,address,uint256,uint256,uint256)",
        "LoanMatched",
    ),
    ("LoanOfferCancelled(uint256,address,uint256)", "LoanOfferCancelled"),
    ("LoanOfferRemoved(uint256,string)", "LoanOfferRemoved"),
    ("LoanRepaid(uint256,address,uint256,uint256)", "LoanRepaid"),
    ("LoanRequestCancelled(uint256,address,uint256)", "LoanRequestCancelled"),
    (
        "LoanRequestCreated(uint256,address,address,uint256,uint256,uint256,address,uint256,uint256,uint256,uint256)",
        "LoanRequestCreated",
    ),
    ("LoanRequestRemoved(uint256,string)", "LoanRequestRemoved"),
    ("OwnershipTransferred(address,address)", "OwnershipTransferred"),
    ("PartialRepayment(uint256,address,uint256,uint256,uint256,uint256)", "PartialRepayment"),
    ("PriceFeedSet(address,bytes32)", "PriceFeedSet"),
    ("PriceUpdatePaid(uint256,uint256,uint256)", "PriceUpdatePaid"),
];

/// Maps a log's primary topic to an event name.
///
/// Signature hashes are computed once, in [`EventClassifier::new`]. When two table entries
/// hash to the same topic the first one wins, matching a linear scan of the table.
#[derive(Debug, Clone)]
pub struct EventClassifier {
    by_topic: HashMap<B256, &'static str>,
}

impl Default for EventClassifier {
    fn default() -> Self {
        Self::new(NEUROLEND_EVENT_SIGNATURES)
    }
}

impl EventClassifier {
    #[must_use]
    pub fn new(table: &'static [(&'static str, &'static str)]) -> Self {
        let mut by_topic = HashMap::with_capacity(table.len());
        for (signature, name) in table {
            by_topic.entry(keccak256(signature.as_bytes())).or_insert(*name);
        }
        Self { by_topic }
    }

    /// Returns the mapped name, or [`UNKNOWN_EVENT`] when `topics[0]` is missing or unmatched.
    #[must_use]
    pub fn classify(&self, log: &RawLog) -> &'static str {
        log.topics
            .first()
            .and_then(|topic| self.by_topic.get(topic).copied())
            .unwrap_or(UNKNOWN_EVENT)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_topic.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_topic.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Address, Bytes, b256};

    fn log_with_topics(topics: Vec<B256>) -> RawLog {
        RawLog {
            address: Address::ZERO,
            topics,
            data: Bytes::new(),
            block_number: 1,
            transaction_hash: B256::ZERO,
            log_index: 0,
            block_timestamp: None,
        }
    }

    #[test]
    fn classifies_every_table_entry() {
        let classifier = EventClassifier::default();
        assert_eq!(classifier.len(), NEUROLEND_EVENT_SIGNATURES.len());

        for (signature, name) in NEUROLEND_EVENT_SIGNATURES {
            let log = log_with_topics(vec![keccak256(signature.as_bytes()), B256::ZERO]);
            assert_eq!(classifier.classify(&log), *name);
        }
    }

    #[test]
    fn matches_well_known_hash() {
        static ERC20: &[(&str, &str)] = &[("Transfer(address,address,uint256)", "Transfer")];
        let classifier = EventClassifier::new(ERC20);

        let log = log_with_topics(vec![b256!(
            "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"
        )]);

        assert_eq!(classifier.classify(&log), "Transfer");
    }

    #[test]
    fn unmatched_topic_is_unknown() {
        let classifier = EventClassifier::default();
        let log = log_with_topics(vec![keccak256(b"Deposit(address,uint256)")]);

        assert_eq!(classifier.classify(&log), UNKNOWN_EVENT);
    }

    #[test]
    fn log_without_topics_is_unknown() {
        let classifier = EventClassifier::default();
        assert_eq!(classifier.classify(&log_with_topics(vec![])), UNKNOWN_EVENT);
    }

    #[test]
    fn only_primary_topic_is_considered() {
        let classifier = EventClassifier::default();
        let known = keccak256(b"LoanRepaid(uint256,address,uint256,uint256)");
        let log = log_with_topics(vec![B256::ZERO, known]);

        assert_eq!(classifier.classify(&log), UNKNOWN_EVENT);
    }

    #[test]
    fn first_entry_wins_on_duplicate_signature() {
        static DUPLICATED: &[(&str, &str)] =
            &[("Ping(uint256)", "First"), ("Ping(uint256)", "Second")];
        let classifier = EventClassifier::new(DUPLICATED);

        let log = log_with_topics(vec![keccak256(b"Ping(uint256)")]);
        assert_eq!(classifier.classify(&log), "First");
        assert_eq!(classifier.len(), 1);
    }
}
