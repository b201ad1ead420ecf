//! First-fetch lower bounds for categories with no resumption state.
//!
//! Operators configure how far back the very first cycle should reach,
//! either as a relative expression ("3 days", "12 hours ago") or as an
//! absolute timestamp. Some categories cannot be queried beyond a retention
//! window; for those the resolved start is pulled forward to just inside it.

use chrono::{DateTime, Duration, Months, Utc};

use crate::category::LogCategory;
use crate::error::ConfigError;
use crate::timestamp::{format_timestamp, parse_timestamp};

/// Default look-back for the first cycle.
pub const DEFAULT_FIRST_FETCH: &str = "3 days";

/// Distance kept inside a retention window when clamping to it.
const LOOKBACK_SLACK_MINUTES: i64 = 5;

/// Unit of a relative first-fetch expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Minutes,
    Hours,
    Days,
    Weeks,
    Months,
    Years,
}

impl Unit {
    fn parse(s: &str) -> Option<Self> {
        let s = s.to_ascii_lowercase();
        let singular = s.strip_suffix('s').unwrap_or(&s);
        match singular {
            "minute" | "min" => Some(Self::Minutes),
            "hour" | "h" => Some(Self::Hours),
            "day" | "d" => Some(Self::Days),
            "week" | "w" => Some(Self::Weeks),
            "month" => Some(Self::Months),
            "year" | "y" => Some(Self::Years),
            _ => None,
        }
    }
}

/// A parsed first-fetch expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FirstFetch {
    Relative { amount: u32, unit: Unit },
    Absolute(DateTime<Utc>),
}

impl FirstFetch {
    /// Parse a first-fetch expression.
    ///
    /// Accepted forms:
    /// - `<n> <unit>` with an optional trailing `ago`, where unit is one of
    ///   minute(s), hour(s), day(s), week(s), month(s), year(s)
    /// - any timestamp accepted by [`parse_timestamp`]
    pub fn parse(expr: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::FirstFetch {
            expr: expr.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = expr.trim();
        if trimmed.is_empty() {
            return Err(invalid("empty expression"));
        }
        if let Ok(ts) = parse_timestamp(trimmed) {
            return Ok(Self::Absolute(ts));
        }

        let mut parts: Vec<&str> = trimmed.split_whitespace().collect();
        if parts.last().is_some_and(|p| p.eq_ignore_ascii_case("ago")) {
            parts.pop();
        }
        let [amount, unit] = parts.as_slice() else {
            return Err(invalid("expected '<number> <unit>' or a timestamp"));
        };
        let amount: u32 = amount
            .parse()
            .map_err(|_| invalid("amount is not a non-negative integer"))?;
        let unit = Unit::parse(unit).ok_or_else(|| invalid("unknown time unit"))?;
        Ok(Self::Relative { amount, unit })
    }

    /// Resolve to an instant relative to `now`.
    pub fn resolve(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, ConfigError> {
        let (amount, unit) = match self {
            Self::Absolute(ts) => return Ok(*ts),
            Self::Relative { amount, unit } => (*amount, *unit),
        };
        let out_of_range = || ConfigError::FirstFetch {
            expr: format!("{amount} {unit:?}").to_ascii_lowercase(),
            reason: "resolves outside the representable date range".into(),
        };
        let amount_i = i64::from(amount);
        let resolved = match unit {
            Unit::Minutes => now.checked_sub_signed(Duration::minutes(amount_i)),
            Unit::Hours => now.checked_sub_signed(Duration::hours(amount_i)),
            Unit::Days => now.checked_sub_signed(Duration::days(amount_i)),
            Unit::Weeks => now.checked_sub_signed(Duration::weeks(amount_i)),
            Unit::Months => now.checked_sub_months(Months::new(amount)),
            Unit::Years => amount
                .checked_mul(12)
                .and_then(|m| now.checked_sub_months(Months::new(m))),
        };
        resolved.ok_or_else(out_of_range)
    }

    /// Resolve for a specific category, applying its retention window.
    ///
    /// If the resolved start is older than `now - max_lookback_days`, it is
    /// replaced by `now - max_lookback_days + 5 minutes`.
    pub fn resolve_for(
        &self,
        category: &LogCategory,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, ConfigError> {
        let start = self.resolve(now)?;
        let Some(days) = category.max_lookback_days else {
            return Ok(start);
        };
        let Some(floor) = now.checked_sub_signed(Duration::days(i64::from(days))) else {
            return Ok(start);
        };
        if start < floor {
            let clamped = floor + Duration::minutes(LOOKBACK_SLACK_MINUTES);
            tracing::debug!(
                category = %category.id,
                requested = %format_timestamp(start),
                clamped = %format_timestamp(clamped),
                "first fetch outside retention window"
            );
            return Ok(clamped);
        }
        Ok(start)
    }
}

/// Compute the formatted first-fetch lower bound for a category.
///
/// The category's own `first_fetch` wins over `global`.
pub fn first_fetch_lower_bound(
    category: &LogCategory,
    global: &str,
    now: DateTime<Utc>,
) -> Result<String, ConfigError> {
    let expr = category.first_fetch.as_deref().unwrap_or(global);
    let start = FirstFetch::parse(expr)
        .and_then(|ff| ff.resolve_for(category, now))
        .map_err(|e| ConfigError::NoLowerBound {
            category: category.id.clone(),
            reason: e.to_string(),
        })?;
    Ok(format_timestamp(start))
}
