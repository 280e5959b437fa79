//! Budget and goal evaluation over an aggregate snapshot.
//!
//! Budgets and goals are externally supplied facts, not derived state. The
//! evaluators here are pure and level-triggered: they recompute the status
//! from scratch on every call, so callers that notify the user must debounce
//! duplicate readings themselves.

use crate::aggregate::AggregateSnapshot;
use crate::model::Money;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Ratio above which a budget is considered close to its limit: 0.8.
const NEAR_LIMIT_RATIO: Decimal = Decimal::from_parts(8, 0, 0, false, 1);

/// A spending limit for one month (`YYYY-MM`). A non-positive limit means
/// "no budget set" and suppresses evaluation.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct BudgetState {
    pub month: String,
    pub limit_amount: Money,
}

/// A savings goal.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct GoalState {
    pub id: String,
    pub title: String,
    pub target_amount: Money,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetStatus {
    Ok,
    NearLimit,
    Exceeded,
}

/// The result of evaluating a budget against a snapshot.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct BudgetReading {
    pub status: BudgetStatus,
    /// `spent / limit`, unrounded.
    pub used_ratio: Decimal,
    pub spent: Money,
    pub limit: Money,
}

/// Progress toward a goal, clamped to `[0, 1]`.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct GoalProgress {
    pub goal_id: String,
    pub ratio: Decimal,
    /// The balance counted toward the goal, floored at zero.
    pub saved: Money,
    pub target: Money,
}

/// Evaluates a budget. Returns `None` when no budget is effectively set
/// (`limit_amount <= 0`).
pub fn evaluate_budget(
    snapshot: &AggregateSnapshot,
    budget: &BudgetState,
) -> Option<BudgetReading> {
    if !budget.limit_amount.is_positive() {
        return None;
    }
    let spent = snapshot.total_expense;
    let used_ratio = spent.value() / budget.limit_amount.value();
    let status = if used_ratio > Decimal::ONE {
        BudgetStatus::Exceeded
    } else if used_ratio > NEAR_LIMIT_RATIO {
        BudgetStatus::NearLimit
    } else {
        BudgetStatus::Ok
    };
    Some(BudgetReading {
        status,
        used_ratio,
        spent,
        limit: budget.limit_amount,
    })
}

/// Computes progress toward a goal. Returns `None` when the goal has no
/// positive target. Negative balances report zero progress, never negative.
pub fn goal_progress(snapshot: &AggregateSnapshot, goal: &GoalState) -> Option<GoalProgress> {
    if !goal.target_amount.is_positive() {
        return None;
    }
    let ratio = (snapshot.balance.value() / goal.target_amount.value())
        .clamp(Decimal::ZERO, Decimal::ONE);
    let saved = if snapshot.balance.is_negative() {
        Money::ZERO
    } else {
        snapshot.balance
    };
    Some(GoalProgress {
        goal_id: goal.id.clone(),
        ratio,
        saved,
        target: goal.target_amount,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::money;
    use std::str::FromStr;

    fn snapshot(income: &str, expense: &str) -> AggregateSnapshot {
        let total_income = money(income);
        let total_expense = money(expense);
        AggregateSnapshot {
            total_income,
            total_expense,
            balance: total_income - total_expense,
            ..AggregateSnapshot::default()
        }
    }

    fn budget(limit: &str) -> BudgetState {
        BudgetState {
            month: "2025-03".to_string(),
            limit_amount: money(limit),
        }
    }

    fn goal(target: &str) -> GoalState {
        GoalState {
            id: "g1".to_string(),
            title: "Emergency fund".to_string(),
            target_amount: money(target),
        }
    }

    #[test]
    fn test_near_limit_at_ninety_percent() {
        let reading = evaluate_budget(&snapshot("0", "270"), &budget("300")).unwrap();
        assert_eq!(reading.status, BudgetStatus::NearLimit);
        assert_eq!(reading.used_ratio, Decimal::from_str("0.9").unwrap());
    }

    #[test]
    fn test_exceeded_above_limit() {
        let reading = evaluate_budget(&snapshot("0", "310"), &budget("300")).unwrap();
        assert_eq!(reading.status, BudgetStatus::Exceeded);
    }

    #[test]
    fn test_ok_below_threshold() {
        let reading = evaluate_budget(&snapshot("0", "150"), &budget("300")).unwrap();
        assert_eq!(reading.status, BudgetStatus::Ok);
    }

    #[test]
    fn test_near_limit_threshold_is_exclusive() {
        // 240 / 300 is exactly 0.8, which is still Ok; one cent over tips
        // into NearLimit.
        assert_eq!(NEAR_LIMIT_RATIO, Decimal::from_str("0.8").unwrap());
        let reading = evaluate_budget(&snapshot("0", "240"), &budget("300")).unwrap();
        assert_eq!(reading.status, BudgetStatus::Ok);
        let reading = evaluate_budget(&snapshot("0", "240.03"), &budget("300")).unwrap();
        assert_eq!(reading.status, BudgetStatus::NearLimit);
    }

    #[test]
    fn test_exactly_at_limit_is_near_limit_not_exceeded() {
        let reading = evaluate_budget(&snapshot("0", "300"), &budget("300")).unwrap();
        assert_eq!(reading.status, BudgetStatus::NearLimit);
    }

    #[test]
    fn test_no_budget_set_suppresses_evaluation() {
        assert!(evaluate_budget(&snapshot("0", "100"), &budget("0")).is_none());
        assert!(evaluate_budget(&snapshot("0", "100"), &budget("-10")).is_none());
    }

    #[test]
    fn test_goal_progress_clamped() {
        let progress = goal_progress(&snapshot("1000", "250"), &goal("1500")).unwrap();
        assert_eq!(progress.ratio, Decimal::from_str("0.5").unwrap());
        assert_eq!(progress.saved, money("750"));

        let overshoot = goal_progress(&snapshot("5000", "0"), &goal("1500")).unwrap();
        assert_eq!(overshoot.ratio, Decimal::ONE);
    }

    #[test]
    fn test_negative_balance_reports_zero_progress() {
        let progress = goal_progress(&snapshot("100", "400"), &goal("1500")).unwrap();
        assert_eq!(progress.ratio, Decimal::ZERO);
        assert_eq!(progress.saved, Money::ZERO);
    }

    #[test]
    fn test_goal_without_target_is_suppressed() {
        assert!(goal_progress(&snapshot("1000", "0"), &goal("0")).is_none());
    }
}
