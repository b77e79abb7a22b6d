//! Date expressions: relative keywords, literals, and duration offsets.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::env::EvalContext;
use crate::model::Value;

use super::{Expr, ValidationCtx};

/// Relative date keyword, resolved by the environment (which owns the
/// clock and week-start policy).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelativeDate {
    Today,
    Yesterday,
    Tomorrow,
    StartOfWeek,
    EndOfWeek,
}

/// Duration unit for date offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DurationUnit {
    Minutes,
    Hours,
    Days,
    Weeks,
    Months,
    Years,
}

impl DurationUnit {
    /// Milliseconds per unit. Months and years are calendar
    /// approximations (30 / 365 days).
    pub fn approx_ms(self) -> f64 {
        const MINUTE: f64 = 60_000.0;
        match self {
            DurationUnit::Minutes => MINUTE,
            DurationUnit::Hours => 60.0 * MINUTE,
            DurationUnit::Days => 24.0 * 60.0 * MINUTE,
            DurationUnit::Weeks => 7.0 * 24.0 * 60.0 * MINUTE,
            DurationUnit::Months => 30.0 * 24.0 * 60.0 * MINUTE,
            DurationUnit::Years => 365.0 * 24.0 * 60.0 * MINUTE,
        }
    }
}

/// Base of a date expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DateBase {
    Relative(RelativeDate),
    Literal(DateTime<Utc>),
    /// Arbitrary sub-expression; the offset applies only if it actually
    /// evaluates to a Date.
    Expr(Box<Expr>),
}

/// Signed duration offset: `+ 2 weeks`, `- 3 days`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DateOffset {
    /// Negative amounts point into the past.
    pub amount: f64,
    pub unit: DurationUnit,
}

/// A date expression: base plus optional offset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateExpr {
    pub base: DateBase,
    pub offset: Option<DateOffset>,
}

impl DateExpr {
    pub fn relative(kind: RelativeDate) -> Self {
        Self { base: DateBase::Relative(kind), offset: None }
    }

    pub fn with_offset(mut self, amount: f64, unit: DurationUnit) -> Self {
        self.offset = Some(DateOffset { amount, unit });
        self
    }

    pub fn evaluate(&self, ctx: &EvalContext<'_>) -> Value {
        let base = match &self.base {
            DateBase::Relative(kind) => {
                Value::Date(ctx.env.source().resolve_relative_date(*kind))
            }
            DateBase::Literal(d) => Value::Date(*d),
            DateBase::Expr(expr) => expr.evaluate(ctx),
        };

        // The offset only applies to an actual date; any other base value
        // passes through untouched.
        match (base, self.offset) {
            (Value::Date(d), Some(offset)) => {
                let ms = ctx.env.source().duration_to_ms(offset.amount, offset.unit);
                Value::Date(d + Duration::milliseconds(ms as i64))
            }
            (other, _) => other,
        }
    }

    pub fn validate(&self, vctx: &ValidationCtx<'_>) {
        if let DateBase::Expr(expr) = &self.base {
            expr.validate(vctx);
        }
    }
}
