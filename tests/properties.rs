//! Property checks for the ledger replay, discount bounds, points and search scoring.

use chrono::{Duration, FixedOffset, TimeZone, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;

use flower_shop::domain::aggregates::NewDebt;
use flower_shop::ledger::{outstanding_balance, verify_history, DebtCreation, PaymentRecord};
use flower_shop::search::{SearchField, SearchOptions, SearchScorer};
use flower_shop::tiers::{default_rules, DiscountRequest, TierDiscountEngine};
use flower_shop::{Debt, DebtHistoryEntry, EmployeeRef, LoyaltyPointsCalculator, PaymentMethod, Tier};

fn vn() -> FixedOffset { FixedOffset::east_opt(7 * 3600).expect("valid offset") }

proptest! {
    /// Replaying the ledger always lands on the aggregate's remaining balance, and no
    /// accepted payment ever drives it below zero.
    #[test]
    fn ledger_replay_matches_debt(
        original in 1i64..2_000_000,
        attempts in prop::collection::vec(1i64..800_000, 0..12)
    ) {
        let base = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).single().expect("valid date");
        let mut debt = Debt::open(NewDebt {
            customer_id: "C1".into(), customer_name: "Trần Thị Bình".into(), amount: Decimal::from(original),
            due_date: None, invoice_id: None, notes: None, employee: EmployeeRef::system(),
        }).expect("positive amount");

        let mut entries = vec![DebtHistoryEntry::debt_created(DebtCreation {
            customer_id: "C1".into(), customer_name: "Trần Thị Bình".into(), amount: Decimal::from(original),
            prior_balance: Decimal::ZERO, employee: EmployeeRef::system(), notes: None, invoice_id: None,
            debt_id: Some(debt.id().to_string()), payment_method: None,
        }, base).expect("creation entry")];

        for (i, amount) in attempts.into_iter().enumerate() {
            let amount = Decimal::from(amount);
            let prior = debt.remaining_amount();
            let applied = debt.apply_payment(amount, PaymentMethod::Cash, None, EmployeeRef::system());
            prop_assert_eq!(applied.is_ok(), amount <= prior && !prior.is_zero());
            if applied.is_ok() {
                entries.push(DebtHistoryEntry::payment(PaymentRecord {
                    customer_id: "C1".into(), customer_name: "Trần Thị Bình".into(), amount, prior_remaining: prior,
                    employee: EmployeeRef::system(), notes: None, debt_id: Some(debt.id().to_string()), payment_method: None,
                }, base + Duration::minutes(i as i64 + 1)).expect("payment entry"));
            }
            prop_assert!(debt.remaining_amount() >= Decimal::ZERO);
            prop_assert_eq!(debt.remaining_amount(), debt.original_amount() - debt.amount_paid());
        }

        prop_assert!(verify_history(&entries).is_ok());
        prop_assert_eq!(outstanding_balance(&entries), debt.remaining_amount());
    }

    /// A discount never exceeds its fraction of the order or the cap, and is zero below
    /// the minimum order.
    #[test]
    fn discount_stays_within_bounds(
        total in 0i64..10_000_000,
        tier_index in 0usize..3
    ) {
        let tier = [Tier::Farmer, Tier::Merchant, Tier::Tycoon][tier_index];
        let engine = TierDiscountEngine::new(default_rules(), vn());
        let rule = engine.rule_for(tier).expect("rule for ranked tier").clone();
        let total = Decimal::from(total);

        let outcome = engine.evaluate(DiscountRequest {
            customer_id: "C1", tier_label: Some(tier.label()), order_total: total, invoices: &[], now: Utc::now(),
        }).expect("non-negative total");

        prop_assert!(outcome.discount_amount >= Decimal::ZERO);
        prop_assert!(outcome.discount_amount <= total * rule.discount_fraction);
        if let Some(cap) = rule.max_discount {
            prop_assert!(outcome.discount_amount <= cap);
        }
        if total < rule.min_order {
            prop_assert_eq!(outcome.discount_amount, Decimal::ZERO);
            prop_assert!(!outcome.eligible);
        }
    }

    /// Paying more never earns fewer points.
    #[test]
    fn points_are_monotonic(
        a in 0i64..50_000_000,
        b in 0i64..50_000_000,
        tier_index in 0usize..5
    ) {
        let tier = [None, Some("Vô danh"), Some("Nông dân"), Some("Thương gia"), Some("Đại gia")][tier_index];
        let calc = LoyaltyPointsCalculator::default();
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        let low_points = calc.points_for(Decimal::from(low), tier).expect("non-negative");
        let high_points = calc.points_for(Decimal::from(high), tier).expect("non-negative");
        prop_assert!(low_points <= high_points);
    }

    /// Scores are normalized and results come back best first.
    #[test]
    fn search_scores_are_normalized(query in "[a-zA-Zàáạãảăâđèéêìíòóôơùúưỳý ]{0,16}") {
        let names = vec!["Trần Thị Bình", "Nguyễn Văn An", "Đặng Hoa", "Lê Minh Đức", "Phạm Thu Hà"];
        let scorer = SearchScorer::new(
            vec![SearchField::new("name", 1.0, |n: &&str| Some(n.to_string()))],
            SearchOptions::default(),
        );
        let hits = scorer.search(&names, &query);
        for hit in &hits {
            prop_assert!((0.0..=1.0).contains(&hit.score));
        }
        for pair in hits.windows(2) {
            prop_assert!(pair[0].score >= pair[1].score);
        }
    }
}
