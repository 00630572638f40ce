//! # Eligibility Criteria
//!
//! Evaluates a reward's criteria document against a customer snapshot.
//!
//! ## Design
//! Criteria are independent predicates, modeled as a tagged union rather
//! than an ad hoc bag of optional fields. Evaluation walks the predicates in
//! a **fixed order** (not document order) and short-circuits on the first
//! failure, so the reason a customer sees is deterministic:
//!
//! ```text
//!  1. minimum points balance
//!  2. minimum purchases this calendar month
//!  3. cumulative lifetime spend threshold
//!  4. minimum referral count
//!  5. required membership tier (set membership)
//!  6. birthday-only / birth-month-only (UTC calendar match)
//!  7. allowed days of week
//!  8. active time windows (day + HH:MM ranges, OR'ed)
//!  9. valid date range (inclusive bounds)
//! 10. sign-up bonus window (near account creation)
//! 11. sufficient points for the reward's cost — checked LAST, so a
//!     customer failing a structural criterion sees that reason instead
//!     of a point-shortage message
//! ```
//!
//! All calendar matching happens in UTC to avoid timezone drift.
//!
//! ## Vouchers
//! Voucher instances never pass through this evaluator. Once granted, a
//! voucher is a standing offer; its own status and expiry govern usability.

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

use crate::types::{CustomerSnapshot, MembershipTier};

// =============================================================================
// Criterion
// =============================================================================

/// Day of week used in calendar criteria.
///
/// Defined locally (instead of `chrono::Weekday`) so criteria documents
/// serialize as plain lowercase names and export to TypeScript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum DayOfWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl DayOfWeek {
    /// Converts from a chrono weekday.
    pub fn from_chrono(day: chrono::Weekday) -> Self {
        match day {
            chrono::Weekday::Mon => DayOfWeek::Monday,
            chrono::Weekday::Tue => DayOfWeek::Tuesday,
            chrono::Weekday::Wed => DayOfWeek::Wednesday,
            chrono::Weekday::Thu => DayOfWeek::Thursday,
            chrono::Weekday::Fri => DayOfWeek::Friday,
            chrono::Weekday::Sat => DayOfWeek::Saturday,
            chrono::Weekday::Sun => DayOfWeek::Sunday,
        }
    }
}

/// One active time window: an optional day restriction plus an inclusive
/// "HH:MM".."HH:MM" range. Multiple windows on a criterion are OR'ed.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TimeWindow {
    /// Restrict the window to one weekday; None means every day.
    pub day: Option<DayOfWeek>,
    /// Start of the window, "HH:MM" 24-hour.
    pub start: String,
    /// End of the window, "HH:MM" 24-hour, inclusive.
    pub end: String,
}

impl TimeWindow {
    /// Checks whether `now` (UTC) falls inside this window.
    /// Malformed HH:MM strings never match.
    fn matches(&self, now: DateTime<Utc>) -> bool {
        if let Some(day) = self.day {
            if DayOfWeek::from_chrono(now.weekday()) != day {
                return false;
            }
        }

        let (Some(start), Some(end)) = (parse_hhmm(&self.start), parse_hhmm(&self.end)) else {
            return false;
        };

        let minute_of_day = now.hour() * 60 + now.minute();
        start <= minute_of_day && minute_of_day <= end
    }
}

/// Parses "HH:MM" into minutes from midnight.
fn parse_hhmm(s: &str) -> Option<u32> {
    let (h, m) = s.split_once(':')?;
    let h: u32 = h.parse().ok()?;
    let m: u32 = m.parse().ok()?;
    if h > 23 || m > 59 {
        return None;
    }
    Some(h * 60 + m)
}

/// A single eligibility predicate.
///
/// Serialized (as a JSON array) into the reward definition's criteria
/// column. Evaluation order is fixed by [`Criterion::rank`], not by the
/// order predicates appear in the document.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum Criterion {
    /// Customer must hold at least this many points.
    MinPoints { points: i64 },
    /// Minimum completed purchases in the current calendar month.
    MinMonthlyPurchases { count: i64 },
    /// Minimum cumulative lifetime spend, in cents.
    MinLifetimeSpend { cents: i64 },
    /// Minimum number of successful referrals.
    MinReferrals { count: i64 },
    /// Customer's tier must be one of these.
    RequiredTiers { tiers: Vec<MembershipTier> },
    /// Usable only on the customer's birthday (UTC).
    BirthdayOnly,
    /// Usable only during the customer's birth month (UTC).
    BirthMonthOnly,
    /// Usable only on these weekdays (UTC).
    AllowedWeekdays { days: Vec<DayOfWeek> },
    /// Usable only inside one of these time windows (OR'ed).
    TimeWindows { windows: Vec<TimeWindow> },
    /// Usable only between these dates, inclusive (UTC).
    ValidDateRange {
        #[ts(as = "Option<String>")]
        start: Option<NaiveDate>,
        #[ts(as = "Option<String>")]
        end: Option<NaiveDate>,
    },
    /// Sign-up bonus: valid only within N days of account creation.
    SignupBonus { within_days: i64 },
}

impl Criterion {
    /// Fixed evaluation rank; lower evaluates first.
    fn rank(&self) -> u8 {
        match self {
            Criterion::MinPoints { .. } => 1,
            Criterion::MinMonthlyPurchases { .. } => 2,
            Criterion::MinLifetimeSpend { .. } => 3,
            Criterion::MinReferrals { .. } => 4,
            Criterion::RequiredTiers { .. } => 5,
            Criterion::BirthdayOnly | Criterion::BirthMonthOnly => 6,
            Criterion::AllowedWeekdays { .. } => 7,
            Criterion::TimeWindows { .. } => 8,
            Criterion::ValidDateRange { .. } => 9,
            Criterion::SignupBonus { .. } => 10,
        }
    }

    /// Evaluates this predicate against a snapshot at `now`.
    /// Returns the blocking reason on failure.
    fn check(&self, snapshot: &CustomerSnapshot, now: DateTime<Utc>) -> Result<(), String> {
        match self {
            Criterion::MinPoints { points } => {
                if snapshot.points_balance < *points {
                    return Err(format!(
                        "Requires a balance of at least {} points",
                        points
                    ));
                }
            }
            Criterion::MinMonthlyPurchases { count } => {
                if snapshot.purchases_this_month < *count {
                    return Err(format!(
                        "Requires at least {} purchases this month",
                        count
                    ));
                }
            }
            Criterion::MinLifetimeSpend { cents } => {
                if snapshot.lifetime_spend_cents < *cents {
                    return Err(format!(
                        "Requires lifetime spend of at least {}",
                        crate::money::Money::from_cents(*cents)
                    ));
                }
            }
            Criterion::MinReferrals { count } => {
                if snapshot.referral_count < *count {
                    return Err(format!("Requires at least {} referrals", count));
                }
            }
            Criterion::RequiredTiers { tiers } => {
                if !tiers.contains(&snapshot.tier) {
                    return Err("Not available for your membership tier".to_string());
                }
            }
            Criterion::BirthdayOnly => {
                let matches = snapshot.birth_date.is_some_and(|b| {
                    b.month() == now.month() && b.day() == now.day()
                });
                if !matches {
                    return Err("Only available on your birthday".to_string());
                }
            }
            Criterion::BirthMonthOnly => {
                let matches = snapshot
                    .birth_date
                    .is_some_and(|b| b.month() == now.month());
                if !matches {
                    return Err("Only available during your birth month".to_string());
                }
            }
            Criterion::AllowedWeekdays { days } => {
                let today = DayOfWeek::from_chrono(now.weekday());
                if !days.contains(&today) {
                    return Err("Not available today".to_string());
                }
            }
            Criterion::TimeWindows { windows } => {
                if !windows.iter().any(|w| w.matches(now)) {
                    return Err("Not available at this time".to_string());
                }
            }
            Criterion::ValidDateRange { start, end } => {
                let today = now.date_naive();
                if start.is_some_and(|s| today < s) {
                    return Err("Not yet valid".to_string());
                }
                if end.is_some_and(|e| today > e) {
                    return Err("No longer valid".to_string());
                }
            }
            Criterion::SignupBonus { within_days } => {
                let age_days = (now - snapshot.joined_at).num_days();
                if age_days > *within_days {
                    return Err("Sign-up bonus period has ended".to_string());
                }
            }
        }
        Ok(())
    }
}

// =============================================================================
// Evaluation
// =============================================================================

/// The customer is not eligible for a reward; carries the first blocking
/// reason, intended for end-user display.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct Ineligible {
    pub reason: String,
}

impl Ineligible {
    fn new(reason: impl Into<String>) -> Self {
        Ineligible {
            reason: reason.into(),
        }
    }
}

/// Evaluates a criteria document against a customer snapshot.
///
/// Predicates run in their fixed rank order and short-circuit on the first
/// failure. The reward's `points_cost` sufficiency is checked **last**, after
/// every structural criterion has passed.
///
/// ## Example
/// ```rust
/// use chrono::Utc;
/// use perka_core::criteria::{evaluate, Criterion};
/// use perka_core::types::{CustomerSnapshot, MembershipTier};
///
/// let snapshot = CustomerSnapshot {
///     customer_id: "c1".into(),
///     points_balance: 500,
///     purchases_this_month: 2,
///     lifetime_spend_cents: 10_000,
///     tier: MembershipTier::Silver,
///     birth_date: None,
///     joined_at: Utc::now(),
///     referral_count: 0,
/// };
///
/// let criteria = vec![Criterion::MinPoints { points: 100 }];
/// assert!(evaluate(&snapshot, &criteria, 200, Utc::now()).is_ok());
/// ```
pub fn evaluate(
    snapshot: &CustomerSnapshot,
    criteria: &[Criterion],
    points_cost: i64,
    now: DateTime<Utc>,
) -> Result<(), Ineligible> {
    let mut ordered: Vec<&Criterion> = criteria.iter().collect();
    // Stable sort keeps document order among same-rank predicates
    ordered.sort_by_key(|c| c.rank());

    for criterion in ordered {
        criterion
            .check(snapshot, now)
            .map_err(Ineligible::new)?;
    }

    // Point sufficiency last: a structurally-blocked customer should see
    // the structural reason, not a point-shortage message.
    if snapshot.points_balance < points_cost {
        return Err(Ineligible::new(format!(
            "Insufficient points: requires {}, you have {}",
            points_cost, snapshot.points_balance
        )));
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn snapshot() -> CustomerSnapshot {
        CustomerSnapshot {
            customer_id: "c1".to_string(),
            points_balance: 500,
            purchases_this_month: 3,
            lifetime_spend_cents: 25_000,
            tier: MembershipTier::Silver,
            birth_date: NaiveDate::from_ymd_opt(1990, 6, 15),
            joined_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            referral_count: 2,
        }
    }

    /// A Monday at 10:30 UTC.
    fn monday_morning() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 17, 10, 30, 0).unwrap()
    }

    #[test]
    fn test_passes_with_no_criteria_and_enough_points() {
        assert!(evaluate(&snapshot(), &[], 200, monday_morning()).is_ok());
    }

    #[test]
    fn test_points_cost_checked_last() {
        // Both the tier criterion and the points cost fail; the tier reason
        // must win because structural criteria evaluate before cost.
        let criteria = vec![Criterion::RequiredTiers {
            tiers: vec![MembershipTier::Platinum],
        }];
        let err = evaluate(&snapshot(), &criteria, 10_000, monday_morning()).unwrap_err();
        assert_eq!(err.reason, "Not available for your membership tier");
    }

    #[test]
    fn test_insufficient_points_for_cost() {
        let err = evaluate(&snapshot(), &[], 10_000, monday_morning()).unwrap_err();
        assert!(err.reason.contains("Insufficient points"));
    }

    #[test]
    fn test_fixed_order_ignores_document_order() {
        // Document lists the weekday criterion first, but the points-balance
        // criterion has a lower rank and must produce the failure reason.
        let criteria = vec![
            Criterion::AllowedWeekdays {
                days: vec![DayOfWeek::Saturday],
            },
            Criterion::MinPoints { points: 9_999 },
        ];
        let err = evaluate(&snapshot(), &criteria, 0, monday_morning()).unwrap_err();
        assert!(err.reason.contains("at least 9999 points"));
    }

    #[test]
    fn test_short_circuits_on_first_failure() {
        let criteria = vec![
            Criterion::MinMonthlyPurchases { count: 10 },
            Criterion::MinReferrals { count: 50 },
        ];
        let err = evaluate(&snapshot(), &criteria, 0, monday_morning()).unwrap_err();
        assert!(err.reason.contains("purchases this month"));
    }

    #[test]
    fn test_birthday_match_is_utc_calendar() {
        let criteria = vec![Criterion::BirthdayOnly];

        // June 15 matches the 1990-06-15 birth date
        let birthday = Utc.with_ymd_and_hms(2026, 6, 15, 23, 0, 0).unwrap();
        assert!(evaluate(&snapshot(), &criteria, 0, birthday).is_ok());

        // June 16 does not
        let not_birthday = Utc.with_ymd_and_hms(2026, 6, 16, 1, 0, 0).unwrap();
        let err = evaluate(&snapshot(), &criteria, 0, not_birthday).unwrap_err();
        assert_eq!(err.reason, "Only available on your birthday");
    }

    #[test]
    fn test_birth_month() {
        let criteria = vec![Criterion::BirthMonthOnly];
        let june = Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap();
        let july = Utc.with_ymd_and_hms(2026, 7, 1, 0, 0, 0).unwrap();

        assert!(evaluate(&snapshot(), &criteria, 0, june).is_ok());
        assert!(evaluate(&snapshot(), &criteria, 0, july).is_err());
    }

    #[test]
    fn test_birthday_without_birth_date_fails() {
        let mut snap = snapshot();
        snap.birth_date = None;
        let criteria = vec![Criterion::BirthdayOnly];
        assert!(evaluate(&snap, &criteria, 0, monday_morning()).is_err());
    }

    #[test]
    fn test_time_windows_are_ored() {
        let criteria = vec![Criterion::TimeWindows {
            windows: vec![
                TimeWindow {
                    day: Some(DayOfWeek::Saturday),
                    start: "08:00".to_string(),
                    end: "11:00".to_string(),
                },
                TimeWindow {
                    day: None,
                    start: "10:00".to_string(),
                    end: "12:00".to_string(),
                },
            ],
        }];

        // Monday 10:30 misses the Saturday window, hits the any-day one
        assert!(evaluate(&snapshot(), &criteria, 0, monday_morning()).is_ok());

        // Monday 14:00 hits neither
        let afternoon = Utc.with_ymd_and_hms(2026, 8, 17, 14, 0, 0).unwrap();
        let err = evaluate(&snapshot(), &criteria, 0, afternoon).unwrap_err();
        assert_eq!(err.reason, "Not available at this time");
    }

    #[test]
    fn test_malformed_time_window_never_matches() {
        let criteria = vec![Criterion::TimeWindows {
            windows: vec![TimeWindow {
                day: None,
                start: "banana".to_string(),
                end: "25:99".to_string(),
            }],
        }];
        assert!(evaluate(&snapshot(), &criteria, 0, monday_morning()).is_err());
    }

    #[test]
    fn test_date_range_bounds_inclusive() {
        let criteria = vec![Criterion::ValidDateRange {
            start: NaiveDate::from_ymd_opt(2026, 8, 17),
            end: NaiveDate::from_ymd_opt(2026, 8, 20),
        }];

        // On the start bound
        assert!(evaluate(&snapshot(), &criteria, 0, monday_morning()).is_ok());

        // On the end bound
        let end_day = Utc.with_ymd_and_hms(2026, 8, 20, 23, 59, 0).unwrap();
        assert!(evaluate(&snapshot(), &criteria, 0, end_day).is_ok());

        // Past the end
        let after = Utc.with_ymd_and_hms(2026, 8, 21, 0, 0, 0).unwrap();
        assert!(evaluate(&snapshot(), &criteria, 0, after).is_err());
    }

    #[test]
    fn test_signup_bonus_window() {
        let mut snap = snapshot();
        snap.joined_at = monday_morning() - chrono::Duration::days(5);

        let criteria = vec![Criterion::SignupBonus { within_days: 7 }];
        assert!(evaluate(&snap, &criteria, 0, monday_morning()).is_ok());

        snap.joined_at = monday_morning() - chrono::Duration::days(30);
        let err = evaluate(&snap, &criteria, 0, monday_morning()).unwrap_err();
        assert_eq!(err.reason, "Sign-up bonus period has ended");
    }

    #[test]
    fn test_allowed_weekdays() {
        let criteria = vec![Criterion::AllowedWeekdays {
            days: vec![DayOfWeek::Monday, DayOfWeek::Friday],
        }];
        assert!(evaluate(&snapshot(), &criteria, 0, monday_morning()).is_ok());

        let tuesday = Utc.with_ymd_and_hms(2026, 8, 18, 10, 0, 0).unwrap();
        assert!(evaluate(&snapshot(), &criteria, 0, tuesday).is_err());
    }

    #[test]
    fn test_criteria_document_round_trips_as_json() {
        // Criteria are persisted as a JSON column on reward definitions
        let criteria = vec![
            Criterion::MinPoints { points: 100 },
            Criterion::ValidDateRange {
                start: NaiveDate::from_ymd_opt(2026, 1, 1),
                end: None,
            },
        ];
        let json = serde_json::to_string(&criteria).unwrap();
        let parsed: Vec<Criterion> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.len(), 2);
        assert!(json.contains("\"type\":\"min_points\""));
    }
}
