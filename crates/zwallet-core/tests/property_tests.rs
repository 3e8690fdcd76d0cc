//! Property-based tests for zwallet-core
//!
//! Uses proptest to verify invariants across randomized inputs

use proptest::prelude::*;
use zwallet_core::{
    AmountEntry, Balance, ConfirmationPolicy, ConfirmationStatus, ScanProgress, TxState,
    MAX_FRACTION_DIGITS,
};

// ============================================================================
// Property Test Strategies
// ============================================================================

/// Valid `(start, end, processed)` triples
fn progress_strategy() -> impl Strategy<Value = (u64, u64, u64)> {
    (0u64..3_000_000, 0u64..50_000).prop_flat_map(|(start, len)| {
        let end = start + len;
        (Just(start), Just(end), 0..=end)
    })
}

fn state_strategy() -> impl Strategy<Value = TxState> {
    prop_oneof![
        Just(TxState::Creating),
        Just(TxState::Created),
        Just(TxState::FailedEncoding),
        Just(TxState::Cancelled),
        Just(TxState::Submitted),
        Just(TxState::FailedSubmit),
        Just(TxState::Mined),
    ]
}

fn key_char_strategy() -> impl Strategy<Value = char> {
    prop_oneof![
        8 => prop::char::range('0', '9'),
        1 => Just('.'),
        1 => Just('<'),
    ]
}

// ============================================================================
// Progress Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_percent_is_bounded((start, end, processed) in progress_strategy()) {
        let progress = ScanProgress::new(start, end, processed).unwrap();
        prop_assert!(progress.percent() <= 100);
        prop_assert!((0.0..=1.0).contains(&progress.fraction()));
    }

    #[test]
    fn prop_percent_is_monotonic_in_processed((start, end, processed) in progress_strategy()) {
        prop_assume!(processed < end);
        let before = ScanProgress::new(start, end, processed).unwrap();
        let after = ScanProgress::new(start, end, processed + 1).unwrap();
        prop_assert!(after.percent() >= before.percent());
    }

    #[test]
    fn prop_balance_rejects_available_above_total(available in any::<u64>(), total in any::<u64>()) {
        let balance = Balance::new(available, total);
        prop_assert_eq!(balance.is_ok(), total >= available);
    }
}

// ============================================================================
// Lifecycle Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_allowed_transitions_never_lower_rank(from in state_strategy(), to in state_strategy()) {
        if from.can_transition_to(to) {
            prop_assert!(to.rank() >= from.rank());
            prop_assert!(!from.is_terminal());
        }
    }

    #[test]
    fn prop_confirmation_threshold(mined in 1u64..2_000_000, depth in 0u64..40, required in 1u32..30) {
        let policy = ConfirmationPolicy::new(required, std::time::Duration::from_secs(1875));
        let chain = mined + depth;
        let status = policy.evaluate(Some(mined), None, Some(chain), chrono::Utc::now());
        let confirmations = (depth + 1) as u32;
        if confirmations >= required {
            prop_assert_eq!(status, ConfirmationStatus::Confirmed { confirmations });
        } else {
            prop_assert_eq!(
                status,
                ConfirmationStatus::Confirming { confirmations, remaining: required - confirmations }
            );
        }
    }
}

// ============================================================================
// Amount Entry Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_typed_amount_stays_well_formed(keys in prop::collection::vec(key_char_strategy(), 0..40)) {
        let mut entry = AmountEntry::default();
        for c in keys {
            entry.type_char(c);
        }
        let text = entry.as_str();
        prop_assert!(!text.is_empty());
        prop_assert!(text.matches('.').count() <= 1);
        prop_assert!(!(text.len() > 1 && text.starts_with('0') && !text.starts_with("0.")));
        if let Some((_, fraction)) = text.split_once('.') {
            prop_assert!(fraction.len() <= MAX_FRACTION_DIGITS);
        }
    }
}
