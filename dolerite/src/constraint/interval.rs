use std::cmp::Ordering;

use datafusion_common::{Column, ScalarValue};
use datafusion_expr::expr::BinaryExpr;
use datafusion_expr::{lit, Expr, Operator};

use crate::error::{OptError, OptResult};

/// Endpoint of a value range.
#[derive(Debug, Clone, PartialEq)]
pub enum IntervalBound {
    Unbounded,
    Included(ScalarValue),
    Excluded(ScalarValue),
}

impl IntervalBound {
    fn value(&self) -> Option<&ScalarValue> {
        match self {
            IntervalBound::Unbounded => None,
            IntervalBound::Included(v) | IntervalBound::Excluded(v) => Some(v),
        }
    }

    fn is_included(&self) -> bool {
        matches!(self, IntervalBound::Included(_))
    }

    /// Boundary between a range and its complement: the same value with the
    /// opposite closedness.
    fn flipped(&self) -> IntervalBound {
        match self {
            IntervalBound::Unbounded => IntervalBound::Unbounded,
            IntervalBound::Included(v) => IntervalBound::Excluded(v.clone()),
            IntervalBound::Excluded(v) => IntervalBound::Included(v.clone()),
        }
    }
}

/// One contiguous run of values.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueRange {
    lo: IntervalBound,
    hi: IntervalBound,
}

impl ValueRange {
    pub fn new(lo: IntervalBound, hi: IntervalBound) -> Self {
        Self { lo, hi }
    }

    pub fn unbounded() -> Self {
        Self::new(IntervalBound::Unbounded, IntervalBound::Unbounded)
    }

    pub fn point(value: ScalarValue) -> Self {
        Self::new(
            IntervalBound::Included(value.clone()),
            IntervalBound::Included(value),
        )
    }

    pub fn lo(&self) -> &IntervalBound {
        &self.lo
    }

    pub fn hi(&self) -> &IntervalBound {
        &self.hi
    }

    fn is_empty(&self) -> OptResult<bool> {
        let (Some(lo), Some(hi)) = (self.lo.value(), self.hi.value()) else {
            return Ok(false);
        };
        Ok(match cmp_values(lo, hi)? {
            Ordering::Greater => true,
            Ordering::Equal => !(self.lo.is_included() && self.hi.is_included()),
            Ordering::Less => false,
        })
    }

    fn as_point(&self) -> Option<&ScalarValue> {
        match (&self.lo, &self.hi) {
            (IntervalBound::Included(lo), IntervalBound::Included(hi)) if lo == hi => Some(lo),
            _ => None,
        }
    }
}

fn cmp_values(a: &ScalarValue, b: &ScalarValue) -> OptResult<Ordering> {
    debug_assert!(!a.is_null() && !b.is_null(), "NULL inside a value range");
    a.partial_cmp(b)
        .ok_or_else(|| OptError::IncomparableValues(format!("{a:?} vs {b:?}")))
}

/// Which lower bound starts earlier. An included bound starts before an
/// excluded one on the same value.
fn cmp_lower(a: &IntervalBound, b: &IntervalBound) -> OptResult<Ordering> {
    let (a_value, b_value) = match (a.value(), b.value()) {
        (None, None) => return Ok(Ordering::Equal),
        (None, Some(_)) => return Ok(Ordering::Less),
        (Some(_), None) => return Ok(Ordering::Greater),
        (Some(a_value), Some(b_value)) => (a_value, b_value),
    };

    Ok(match cmp_values(a_value, b_value)? {
        Ordering::Equal => match (a.is_included(), b.is_included()) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => Ordering::Equal,
        },
        other => other,
    })
}

/// Which upper bound ends later. An included bound ends after an excluded
/// one on the same value.
fn cmp_upper(a: &IntervalBound, b: &IntervalBound) -> OptResult<Ordering> {
    let (a_value, b_value) = match (a.value(), b.value()) {
        (None, None) => return Ok(Ordering::Equal),
        (None, Some(_)) => return Ok(Ordering::Greater),
        (Some(_), None) => return Ok(Ordering::Less),
        (Some(a_value), Some(b_value)) => (a_value, b_value),
    };

    Ok(match cmp_values(a_value, b_value)? {
        Ordering::Equal => match (a.is_included(), b.is_included()) {
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            _ => Ordering::Equal,
        },
        other => other,
    })
}

/// Whether a range ending at `hi` overlaps or touches one starting at `lo`.
fn connects(hi: &IntervalBound, lo: &IntervalBound) -> OptResult<bool> {
    let (Some(hi_value), Some(lo_value)) = (hi.value(), lo.value()) else {
        return Ok(true);
    };
    Ok(match cmp_values(hi_value, lo_value)? {
        Ordering::Greater => true,
        Ordering::Less => false,
        Ordering::Equal => hi.is_included() || lo.is_included(),
    })
}

fn max_lower(a: IntervalBound, b: &IntervalBound) -> OptResult<IntervalBound> {
    Ok(if cmp_lower(&a, b)? == Ordering::Less {
        b.clone()
    } else {
        a
    })
}

fn min_upper(a: IntervalBound, b: &IntervalBound) -> OptResult<IntervalBound> {
    Ok(if cmp_upper(&a, b)? == Ordering::Greater {
        b.clone()
    } else {
        a
    })
}

/// Set of rows of one column: ordered, non-overlapping value ranges plus an
/// explicit NULL marker.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintInterval {
    column: Column,
    ranges: Vec<ValueRange>,
    includes_null: bool,
}

impl ConstraintInterval {
    /// Normalizes `ranges`: empty runs dropped, overlapping and touching
    /// runs merged, the rest sorted.
    pub fn new(
        column: Column,
        ranges: Vec<ValueRange>,
        includes_null: bool,
    ) -> OptResult<Self> {
        Ok(Self {
            column,
            ranges: normalize(ranges)?,
            includes_null,
        })
    }

    /// All rows, NULL included.
    pub fn unbounded(column: Column) -> Self {
        Self {
            column,
            ranges: vec![ValueRange::unbounded()],
            includes_null: true,
        }
    }

    /// No rows.
    pub fn contradiction(column: Column) -> Self {
        Self {
            column,
            ranges: vec![],
            includes_null: false,
        }
    }

    pub fn null_only(column: Column) -> Self {
        Self {
            column,
            ranges: vec![],
            includes_null: true,
        }
    }

    pub fn point(column: Column, value: ScalarValue) -> Self {
        Self {
            column,
            ranges: vec![ValueRange::point(value)],
            includes_null: false,
        }
    }

    pub fn column(&self) -> &Column {
        &self.column
    }

    pub fn ranges(&self) -> &[ValueRange] {
        &self.ranges
    }

    pub fn includes_null(&self) -> bool {
        self.includes_null
    }

    pub fn is_contradiction(&self) -> bool {
        self.ranges.is_empty() && !self.includes_null
    }

    pub fn is_unbounded(&self) -> bool {
        self.includes_null && self.ranges == [ValueRange::unbounded()]
    }

    pub fn union(&self, other: &ConstraintInterval) -> OptResult<ConstraintInterval> {
        debug_assert_eq!(self.column, other.column, "intervals on different columns");

        let mut ranges = self.ranges.clone();
        ranges.extend(other.ranges.iter().cloned());
        ConstraintInterval::new(
            self.column.clone(),
            ranges,
            self.includes_null || other.includes_null,
        )
    }

    pub fn intersect(&self, other: &ConstraintInterval) -> OptResult<ConstraintInterval> {
        debug_assert_eq!(self.column, other.column, "intervals on different columns");

        let mut ranges = Vec::new();
        for left in &self.ranges {
            for right in &other.ranges {
                let lo = max_lower(left.lo.clone(), &right.lo)?;
                let hi = min_upper(left.hi.clone(), &right.hi)?;
                let candidate = ValueRange::new(lo, hi);
                if !candidate.is_empty()? {
                    ranges.push(candidate);
                }
            }
        }

        ConstraintInterval::new(
            self.column.clone(),
            ranges,
            self.includes_null && other.includes_null,
        )
    }

    /// Rows in `self` but not in `other`.
    pub fn difference(&self, other: &ConstraintInterval) -> OptResult<ConstraintInterval> {
        self.intersect(&other.complement()?)
    }

    /// All rows not in `self`, NULL membership flipped.
    pub fn complement(&self) -> OptResult<ConstraintInterval> {
        let mut gaps = Vec::new();
        let mut cursor = Some(IntervalBound::Unbounded);

        for range in &self.ranges {
            if let Some(lo) = cursor.take() {
                if !matches!(range.lo, IntervalBound::Unbounded) {
                    gaps.push(ValueRange::new(lo, range.lo.flipped()));
                }
            }
            if !matches!(range.hi, IntervalBound::Unbounded) {
                cursor = Some(range.hi.flipped());
            }
        }
        if let Some(lo) = cursor {
            gaps.push(ValueRange::new(lo, IntervalBound::Unbounded));
        }

        ConstraintInterval::new(self.column.clone(), gaps, !self.includes_null)
    }

    /// Every row selected by `other` is selected by `self`.
    pub fn contains(&self, other: &ConstraintInterval) -> OptResult<bool> {
        Ok(other.difference(self)?.is_contradiction())
    }

    /// Equivalent predicate tree over the interval's column.
    pub fn to_predicate(&self) -> Expr {
        if self.is_contradiction() {
            return lit(false);
        }
        if self.is_unbounded() {
            return lit(true);
        }

        let column_expr = Expr::Column(self.column.clone());
        let mut disjuncts: Vec<Expr> = self
            .ranges
            .iter()
            .map(|range| range_predicate(&column_expr, range))
            .collect();
        if self.includes_null {
            disjuncts.push(column_expr.is_null());
        }

        disjuncts
            .into_iter()
            .reduce(|acc, next| acc.or(next))
            .unwrap_or_else(|| lit(false))
    }

    /// Interval selected by a predicate over `column`. `Ok(None)` means the
    /// predicate shape is not representable as one interval.
    pub fn from_predicate(column: &Column, expr: &Expr) -> OptResult<Option<ConstraintInterval>> {
        match expr {
            Expr::BinaryExpr(BinaryExpr { left, op, right }) => match op {
                Operator::And => {
                    let (Some(l), Some(r)) = (
                        Self::from_predicate(column, left)?,
                        Self::from_predicate(column, right)?,
                    ) else {
                        return Ok(None);
                    };
                    Ok(Some(l.intersect(&r)?))
                }
                Operator::Or => {
                    let (Some(l), Some(r)) = (
                        Self::from_predicate(column, left)?,
                        Self::from_predicate(column, right)?,
                    ) else {
                        return Ok(None);
                    };
                    Ok(Some(l.union(&r)?))
                }
                Operator::Eq
                | Operator::NotEq
                | Operator::Lt
                | Operator::LtEq
                | Operator::Gt
                | Operator::GtEq => Ok(Self::from_comparison(column, left, *op, right)),
                _ => Ok(None),
            },
            Expr::IsNull(inner) => Ok(match inner.as_ref() {
                Expr::Column(c) if c == column => Some(Self::null_only(column.clone())),
                _ => None,
            }),
            Expr::IsNotNull(inner) => Ok(match inner.as_ref() {
                Expr::Column(c) if c == column => Some(Self {
                    column: column.clone(),
                    ranges: vec![ValueRange::unbounded()],
                    includes_null: false,
                }),
                _ => None,
            }),
            Expr::Literal(ScalarValue::Boolean(Some(value))) => Ok(Some(if *value {
                Self::unbounded(column.clone())
            } else {
                Self::contradiction(column.clone())
            })),
            _ => Ok(None),
        }
    }

    fn from_comparison(
        column: &Column,
        left: &Expr,
        op: Operator,
        right: &Expr,
    ) -> Option<ConstraintInterval> {
        let (value, op) = match (left, right) {
            (Expr::Column(c), Expr::Literal(value)) if c == column => (value, op),
            (Expr::Literal(value), Expr::Column(c)) if c == column => {
                (value, op.swap()?)
            }
            _ => return None,
        };

        if value.is_null() {
            // comparison with NULL selects nothing
            return Some(Self::contradiction(column.clone()));
        }

        let range = |lo, hi| Self {
            column: column.clone(),
            ranges: vec![ValueRange::new(lo, hi)],
            includes_null: false,
        };

        Some(match op {
            Operator::Eq => Self::point(column.clone(), value.clone()),
            Operator::NotEq => Self {
                column: column.clone(),
                ranges: vec![
                    ValueRange::new(
                        IntervalBound::Unbounded,
                        IntervalBound::Excluded(value.clone()),
                    ),
                    ValueRange::new(
                        IntervalBound::Excluded(value.clone()),
                        IntervalBound::Unbounded,
                    ),
                ],
                includes_null: false,
            },
            Operator::Lt => range(
                IntervalBound::Unbounded,
                IntervalBound::Excluded(value.clone()),
            ),
            Operator::LtEq => range(
                IntervalBound::Unbounded,
                IntervalBound::Included(value.clone()),
            ),
            Operator::Gt => range(
                IntervalBound::Excluded(value.clone()),
                IntervalBound::Unbounded,
            ),
            Operator::GtEq => range(
                IntervalBound::Included(value.clone()),
                IntervalBound::Unbounded,
            ),
            _ => return None,
        })
    }
}

fn range_predicate(column_expr: &Expr, range: &ValueRange) -> Expr {
    if matches!(
        (&range.lo, &range.hi),
        (IntervalBound::Unbounded, IntervalBound::Unbounded)
    ) {
        return column_expr.clone().is_not_null();
    }

    if let Some(point) = range.as_point() {
        return column_expr.clone().eq(lit(point.clone()));
    }

    let lo_predicate = match &range.lo {
        IntervalBound::Unbounded => None,
        IntervalBound::Included(v) => Some(column_expr.clone().gt_eq(lit(v.clone()))),
        IntervalBound::Excluded(v) => Some(column_expr.clone().gt(lit(v.clone()))),
    };
    let hi_predicate = match &range.hi {
        IntervalBound::Unbounded => None,
        IntervalBound::Included(v) => Some(column_expr.clone().lt_eq(lit(v.clone()))),
        IntervalBound::Excluded(v) => Some(column_expr.clone().lt(lit(v.clone()))),
    };

    match (lo_predicate, hi_predicate) {
        (Some(lo), Some(hi)) => lo.and(hi),
        (Some(lo), None) => lo,
        (None, Some(hi)) => hi,
        (None, None) => unreachable!("fully unbounded range handled above"),
    }
}

/// Drop empty ranges, sort by lower bound, merge overlapping and touching
/// neighbors.
fn normalize(ranges: Vec<ValueRange>) -> OptResult<Vec<ValueRange>> {
    let mut ranges = {
        let mut non_empty = Vec::with_capacity(ranges.len());
        for range in ranges {
            if !range.is_empty()? {
                non_empty.push(range);
            }
        }
        non_empty
    };

    // insertion sort so comparison failures can propagate
    for i in 1..ranges.len() {
        let mut j = i;
        while j > 0 && cmp_lower(&ranges[j].lo, &ranges[j - 1].lo)? == Ordering::Less {
            ranges.swap(j - 1, j);
            j -= 1;
        }
    }

    let mut merged: Vec<ValueRange> = Vec::with_capacity(ranges.len());
    for range in ranges {
        match merged.last_mut() {
            Some(last) if connects(&last.hi, &range.lo)? => {
                if cmp_upper(&last.hi, &range.hi)? == Ordering::Less {
                    last.hi = range.hi;
                }
            }
            _ => merged.push(range),
        }
    }

    Ok(merged)
}
