// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pure counter arithmetic for inventory levels.
//!
//! Storage backends read a level, apply one of these transitions, and write
//! the result back inside a single transaction. Keeping the arithmetic here
//! means every backend enforces the same invariants:
//!
//! - `available = quantity - reserved` (computed, never stored independently)
//! - `quantity >= 0` and `reserved >= 0`

use crate::error::DespachoError;

/// Why a counter transition was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CounterError {
    InvalidQuantity(i64),
    Insufficient { available: i64, requested: i64 },
    Inconsistent(String),
}

impl CounterError {
    /// Attach the level identity to produce a [`DespachoError`].
    pub fn into_error(self, product_id: i64, warehouse_id: i64) -> DespachoError {
        match self {
            CounterError::InvalidQuantity(q) => DespachoError::InvalidQuantity(q),
            CounterError::Insufficient {
                available,
                requested,
            } => DespachoError::InsufficientStock {
                product_id,
                warehouse_id,
                available,
                requested,
            },
            CounterError::Inconsistent(detail) => DespachoError::LedgerInconsistent {
                product_id,
                warehouse_id,
                detail,
            },
        }
    }
}

/// On-hand and reserved units of one level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LevelCounters {
    pub quantity: i64,
    pub reserved_qty: i64,
}

fn positive(q: i64) -> Result<i64, CounterError> {
    if q <= 0 {
        return Err(CounterError::InvalidQuantity(q));
    }
    Ok(q)
}

/// `a + b`, refusing results outside `i64`.
fn add(a: i64, b: i64) -> Result<i64, CounterError> {
    a.checked_add(b)
        .ok_or_else(|| CounterError::Inconsistent(format!("{a} + {b} overflows")))
}

/// `a - b`, refusing results outside `i64`.
fn sub(a: i64, b: i64) -> Result<i64, CounterError> {
    a.checked_sub(b)
        .ok_or_else(|| CounterError::Inconsistent(format!("{a} - {b} overflows")))
}

impl LevelCounters {
    pub fn new(quantity: i64, reserved_qty: i64) -> Self {
        Self {
            quantity,
            reserved_qty,
        }
    }

    pub fn available(&self) -> i64 {
        self.quantity.saturating_sub(self.reserved_qty)
    }

    /// Reject counters that violate the hard invariants.
    pub fn check(self) -> Result<Self, CounterError> {
        if self.quantity < 0 {
            return Err(CounterError::Inconsistent(format!(
                "quantity would become {}",
                self.quantity
            )));
        }
        if self.reserved_qty < 0 {
            return Err(CounterError::Inconsistent(format!(
                "reserved quantity would become {}",
                self.reserved_qty
            )));
        }
        Ok(self)
    }

    /// `quantity += delta`. Fails when the result would be negative.
    pub fn adjust(self, delta: i64) -> Result<Self, CounterError> {
        if delta == 0 {
            return Err(CounterError::InvalidQuantity(0));
        }
        let quantity = add(self.quantity, delta)?;
        if quantity < 0 {
            return Err(CounterError::Insufficient {
                available: self.quantity,
                requested: delta.saturating_neg(),
            });
        }
        Self::new(quantity, self.reserved_qty).check()
    }

    /// Remove `q` units for an outgoing transfer. Fails when on-hand is short.
    pub fn withdraw(self, q: i64) -> Result<Self, CounterError> {
        let q = positive(q)?;
        if self.quantity < q {
            return Err(CounterError::Insufficient {
                available: self.quantity,
                requested: q,
            });
        }
        Self::new(sub(self.quantity, q)?, self.reserved_qty).check()
    }

    /// Reserve up to `q` units. Returns the new counters and the units
    /// actually reserved, which is `min(q, max(available, 0))`.
    pub fn reserve(self, q: i64) -> Result<(Self, i64), CounterError> {
        let q = positive(q)?;
        let to_reserve = q.min(self.available()).max(0);
        let next = Self::new(self.quantity, add(self.reserved_qty, to_reserve)?).check()?;
        Ok((next, to_reserve))
    }

    /// Ship `q` units. Frees up to `q` reserved units and returns how many.
    ///
    /// A negative resulting quantity means the ledger is corrupt; the caller
    /// must abort the transaction.
    pub fn confirm_sale(self, q: i64) -> Result<(Self, i64), CounterError> {
        let q = positive(q)?;
        let released = self.reserved_qty.min(q);
        let next = Self::new(sub(self.quantity, q)?, self.reserved_qty - released).check()?;
        Ok((next, released))
    }

    /// Drop up to `q` reserved units. Never fails on shortfall.
    pub fn release(self, q: i64) -> Result<(Self, i64), CounterError> {
        let q = positive(q)?;
        let released = self.reserved_qty.min(q);
        let next = Self::new(self.quantity, self.reserved_qty - released).check()?;
        Ok((next, released))
    }

    /// Put `q` returned units back on hand.
    pub fn restock(self, q: i64) -> Result<Self, CounterError> {
        let q = positive(q)?;
        Self::new(add(self.quantity, q)?, self.reserved_qty).check()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn partial_reserve_takes_what_is_available() {
        let level = LevelCounters::new(10, 8);
        let (next, reserved) = level.reserve(5).unwrap();
        assert_eq!(reserved, 2);
        assert_eq!(next, LevelCounters::new(10, 10));
        assert_eq!(next.available(), 0);
    }

    #[test]
    fn confirm_after_partial_reserve_clamps_reserved() {
        let (level, reserved) = LevelCounters::new(10, 8).reserve(5).unwrap();
        assert_eq!(reserved, 2);
        // Release the earlier order's reservation so only ours remains.
        let (level, _) = level.release(8).unwrap();
        assert_eq!(level, LevelCounters::new(10, 2));

        let (level, released) = level.confirm_sale(5).unwrap();
        assert_eq!(released, 2);
        assert_eq!(level, LevelCounters::new(5, 0));
        assert_eq!(level.available(), level.quantity);
    }

    #[test]
    fn confirm_beyond_on_hand_is_inconsistent() {
        let err = LevelCounters::new(3, 0).confirm_sale(4).unwrap_err();
        assert!(matches!(err, CounterError::Inconsistent(_)));
        let err = err.into_error(1, 2);
        assert_eq!(err.code(), "LEDGER_INCONSISTENT");
    }

    #[test]
    fn adjust_below_zero_is_insufficient() {
        let err = LevelCounters::new(3, 0).adjust(-4).unwrap_err();
        assert_eq!(
            err,
            CounterError::Insufficient {
                available: 3,
                requested: 4
            }
        );
        assert_eq!(LevelCounters::new(3, 0).adjust(-3).unwrap().quantity, 0);
    }

    #[test]
    fn zero_and_negative_quantities_are_rejected() {
        let level = LevelCounters::new(5, 0);
        assert_eq!(level.reserve(0).unwrap_err(), CounterError::InvalidQuantity(0));
        assert_eq!(level.release(-1).unwrap_err(), CounterError::InvalidQuantity(-1));
        assert_eq!(level.adjust(0).unwrap_err(), CounterError::InvalidQuantity(0));
    }

    #[test]
    fn overflowing_quantities_are_refused() {
        let level = LevelCounters::new(1, 0);
        assert!(matches!(
            level.restock(i64::MAX).unwrap_err(),
            CounterError::Inconsistent(_)
        ));
        assert!(matches!(
            level.adjust(i64::MAX).unwrap_err(),
            CounterError::Inconsistent(_)
        ));
        assert!(matches!(
            LevelCounters::new(i64::MIN + 1, 0).adjust(-2).unwrap_err(),
            CounterError::Inconsistent(_)
        ));
        assert!(matches!(
            LevelCounters::new(-5, 0).confirm_sale(i64::MAX).unwrap_err(),
            CounterError::Inconsistent(_)
        ));
        assert_eq!(
            level.restock(i64::MAX).unwrap_err().into_error(3, 4).code(),
            "LEDGER_INCONSISTENT"
        );

        // A huge reserve only takes what is available.
        let (next, got) = LevelCounters::new(10, 0).reserve(i64::MAX).unwrap();
        assert_eq!(got, 10);
        assert_eq!(next, LevelCounters::new(10, 10));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Adjust(i64),
        Reserve(i64),
        Confirm(i64),
        Release(i64),
        Restock(i64),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (-20i64..20).prop_map(Op::Adjust),
            (1i64..20).prop_map(Op::Reserve),
            (1i64..20).prop_map(Op::Confirm),
            (1i64..20).prop_map(Op::Release),
            (1i64..20).prop_map(Op::Restock),
        ]
    }

    proptest! {
        #[test]
        fn invariants_hold_after_any_sequence(start in 0i64..50, ops in proptest::collection::vec(op(), 0..40)) {
            let mut level = LevelCounters::new(start, 0);
            for op in ops {
                let next = match op {
                    Op::Adjust(d) => level.adjust(d),
                    Op::Reserve(q) => level.reserve(q).map(|(l, _)| l),
                    Op::Confirm(q) => level.confirm_sale(q).map(|(l, _)| l),
                    Op::Release(q) => level.release(q).map(|(l, _)| l),
                    Op::Restock(q) => level.restock(q),
                };
                // A refused transition leaves the level untouched.
                if let Ok(next) = next {
                    level = next;
                }
                prop_assert!(level.quantity >= 0);
                prop_assert!(level.reserved_qty >= 0);
                prop_assert_eq!(level.available(), level.quantity - level.reserved_qty);
            }
        }

        #[test]
        fn reserve_takes_min_of_request_and_available(quantity in 0i64..100, reserved in 0i64..100, q in 1i64..100) {
            let level = LevelCounters::new(quantity, reserved);
            let (next, got) = level.reserve(q).unwrap();
            prop_assert_eq!(got, q.min(level.available().max(0)));
            prop_assert_eq!(next.reserved_qty, reserved + got);
            prop_assert_eq!(next.quantity, quantity);
        }

        #[test]
        fn confirm_clamps_reserved(reserved in 0i64..50, extra in 0i64..50, q in 1i64..50) {
            let quantity = reserved.max(q) + extra;
            let level = LevelCounters::new(quantity, reserved);
            let (next, released) = level.confirm_sale(q).unwrap();
            prop_assert_eq!(next.reserved_qty, (reserved - q).max(0));
            prop_assert_eq!(next.quantity, quantity - q);
            prop_assert_eq!(released, reserved.min(q));
        }

        #[test]
        fn release_never_touches_quantity(quantity in 0i64..50, reserved in 0i64..50, q in 1i64..80) {
            let (next, _) = LevelCounters::new(quantity, reserved).release(q).unwrap();
            prop_assert_eq!(next.quantity, quantity);
            prop_assert_eq!(next.reserved_qty, (reserved - q).max(0));
        }

        #[test]
        fn transfer_preserves_total(a in 0i64..100, b in 0i64..100, q in 1i64..100) {
            let from = LevelCounters::new(a, 0);
            let to = LevelCounters::new(b, 0);
            if let (Ok(from2), Ok(to2)) = (from.withdraw(q), to.restock(q)) {
                prop_assert_eq!(from2.quantity + to2.quantity, a + b);
            } else {
                prop_assert!(a < q);
            }
        }
    }
}
