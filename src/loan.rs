use log::{debug, info, trace};
use std::fmt;

use crate::error::LoanError;
use crate::rate::EffectiveRate;
use crate::solver::{minimize, SolverOptions};

/// Money in minor units (cents).
pub type Cents = i64;

/// Upper bound on the number of payments a duration may imply.
pub const MAX_PAYMENTS: u32 = 100_000;

pub fn to_major(amount: Cents) -> f64 {
    amount as f64 / 100.
}

/// Converts a major-unit amount to cents, rounding half to even.
pub fn to_cents(amount: f64) -> Cents {
    (amount * 100.).round_ties_even() as Cents
}

/// What drives the simulation: a payment ceiling, or a payoff duration.
#[derive(Clone, Copy, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Constraint {
    /// Fixed-payment mode: the largest single payment, in cents.
    MaxPayment(Cents),
    /// Fixed-duration mode: the target payoff time, in seconds.
    Duration(f64),
}

#[derive(Clone, Copy, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LoanTerms {
    pub principal: Cents,
    /// Nominal annual rate in percent (6.0 for 6%).
    pub annual_rate_pct: f64,
    pub compound_period_secs: f64,
    pub payment_period_secs: f64,
    pub constraint: Constraint,
}

impl LoanTerms {
    /// Builds terms from the two optional constraints; exactly one must be given.
    pub fn new(
        principal: Cents,
        annual_rate_pct: f64,
        compound_period_secs: f64,
        payment_period_secs: f64,
        max_payment: Option<Cents>,
        duration_secs: Option<f64>,
    ) -> Result<Self, LoanError> {
        let constraint = match (max_payment, duration_secs) {
            (Some(_), Some(_)) => {
                return Err(LoanError::config(
                    "over constrained: specifying both duration and payment size is a no-no",
                ))
            }
            (None, None) => {
                return Err(LoanError::config(
                    "under constrained: one of duration or payment size must be given",
                ))
            }
            (Some(max), None) => Constraint::MaxPayment(max),
            (None, Some(duration)) => Constraint::Duration(duration),
        };
        let terms = Self {
            principal,
            annual_rate_pct,
            compound_period_secs,
            payment_period_secs,
            constraint,
        };
        terms.validate()?;
        Ok(terms)
    }

    pub fn with_max_payment(
        principal: Cents,
        annual_rate_pct: f64,
        compound_period_secs: f64,
        payment_period_secs: f64,
        max_payment: Cents,
    ) -> Result<Self, LoanError> {
        Self::new(
            principal,
            annual_rate_pct,
            compound_period_secs,
            payment_period_secs,
            Some(max_payment),
            None,
        )
    }

    pub fn with_duration(
        principal: Cents,
        annual_rate_pct: f64,
        compound_period_secs: f64,
        payment_period_secs: f64,
        duration_secs: f64,
    ) -> Result<Self, LoanError> {
        Self::new(
            principal,
            annual_rate_pct,
            compound_period_secs,
            payment_period_secs,
            None,
            Some(duration_secs),
        )
    }

    pub fn validate(&self) -> Result<(), LoanError> {
        if self.principal <= 0 {
            return Err(LoanError::config(format!(
                "principal must be positive, got {}",
                self.principal
            )));
        }
        // the rate and both periods are checked by EffectiveRate
        EffectiveRate::new(
            self.annual_rate_pct,
            self.compound_period_secs,
            self.payment_period_secs,
        )?;
        match self.constraint {
            Constraint::MaxPayment(max) if max <= 0 => Err(LoanError::config(format!(
                "maximum payment size must be positive, got {}",
                max
            ))),
            Constraint::Duration(duration) if !(duration.is_finite() && duration > 0.) => Err(
                LoanError::config(format!("duration must be positive, got {} s", duration)),
            ),
            Constraint::Duration(_) => match self.n_payments() {
                Some(0) => Err(LoanError::config(
                    "duration is shorter than a single payment period",
                )),
                Some(n) if n > MAX_PAYMENTS => Err(LoanError::config(format!(
                    "duration implies {} payments, more than the limit of {}",
                    n, MAX_PAYMENTS
                ))),
                _ => Ok(()),
            },
            Constraint::MaxPayment(_) => Ok(()),
        }
    }

    /// Number of whole payment periods that fit in the target duration.
    pub fn n_payments(&self) -> Option<u32> {
        match self.constraint {
            Constraint::Duration(duration) => {
                Some((duration / self.payment_period_secs).floor() as u32)
            }
            Constraint::MaxPayment(_) => None,
        }
    }
}

/// One row of the amortization ledger.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LedgerEntry {
    pub number: u32,
    /// Seconds since the start of the simulation (or since the previous
    /// payment, for a single registered payment).
    pub elapsed_secs: u64,
    pub payment: Cents,
    /// Portion of the payment that did not reduce principal.
    pub interest: Cents,
    /// Balance left after the payment.
    pub remaining: Cents,
}

impl LedgerEntry {
    pub fn payment_major(&self) -> f64 {
        to_major(self.payment)
    }

    pub fn interest_major(&self) -> f64 {
        to_major(self.interest)
    }

    pub fn remaining_major(&self) -> f64 {
        to_major(self.remaining)
    }
}

impl fmt::Display for LedgerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pmt number {}, elapsed {} s, payment {:.2}, interest paid {:.2}, ending balance {:.2}",
            self.number,
            self.elapsed_secs,
            self.payment_major(),
            self.interest_major(),
            self.remaining_major()
        )
    }
}

/// Totals over a complete ledger.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Summary {
    pub payments: usize,
    pub total_paid: Cents,
    pub total_interest: Cents,
    pub elapsed_secs: u64,
}

impl Summary {
    pub fn from_ledger(ledger: &[LedgerEntry]) -> Self {
        Self {
            payments: ledger.len(),
            total_paid: ledger.iter().map(|e| e.payment).sum(),
            total_interest: ledger.iter().map(|e| e.interest).sum(),
            elapsed_secs: ledger.last().map_or(0, |e| e.elapsed_secs),
        }
    }
}

/// Accrues interest over `dt` seconds and takes one payment.
///
/// Interest is rounded half to even. The payment is `max_payment` when the
/// grown balance exceeds it (or when `force` is set), otherwise the grown
/// balance itself. Returns `(payment, new_remaining)`; with `force` the new
/// balance may go negative. A balance that no longer fits in [`Cents`] is an
/// [`LoanError::Overflow`].
pub fn process_payment(
    rate: &EffectiveRate,
    dt: f64,
    remaining: Cents,
    max_payment: Cents,
    force: bool,
) -> Result<(Cents, Cents), LoanError> {
    let overflow = LoanError::Overflow { remaining };
    let interest = (rate.for_interval(dt) * remaining as f64).round_ties_even();
    if !interest.is_finite() || interest.abs() >= Cents::MAX as f64 {
        return Err(overflow);
    }
    let grown = remaining
        .checked_add(interest as Cents)
        .ok_or_else(|| overflow.clone())?;
    let payment = if grown > max_payment || force {
        max_payment
    } else {
        grown
    };
    let left = grown.checked_sub(payment).ok_or(overflow)?;
    Ok((payment, left))
}

/// Absolute terminal balance as a function of a candidate payment, used to
/// search for the payment that clears a loan in exactly `n_payments` steps.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct BalanceObjective {
    rate: EffectiveRate,
    principal: Cents,
    payment_period_secs: f64,
    n_payments: u32,
}

impl BalanceObjective {
    pub fn new(
        rate: EffectiveRate,
        principal: Cents,
        payment_period_secs: f64,
        n_payments: u32,
    ) -> Self {
        Self {
            rate,
            principal,
            payment_period_secs,
            n_payments,
        }
    }

    /// Signed balance after `n_payments` forced payments of `payment`.
    ///
    /// Steps run in whole cents while the balance fits in [`Cents`]; past
    /// that the rest of the fold continues in floating point, so the result
    /// keeps growing with the number of payments and may reach infinity.
    pub fn terminal_balance(&self, payment: Cents) -> f64 {
        let period = self.payment_period_secs;
        let mut left = self.principal;
        for step in 0..self.n_payments {
            match process_payment(&self.rate, period, left, payment, true) {
                Ok((_, next)) => left = next,
                Err(_) => {
                    let growth = self.rate.for_interval(period);
                    return (step..self.n_payments).fold(left as f64, |left, _| {
                        left + growth * left - payment as f64
                    });
                }
            }
        }
        left as f64
    }

    /// `|terminal balance|` at a fractional payment, interpolated between the
    /// neighbouring whole cents so the search never sees a flat step.
    /// Balances too large to represent come back as `f64::MAX`.
    pub fn evaluate(&self, payment: f64) -> f64 {
        let floor = payment.floor();
        let weight = payment - floor;
        let below = self.terminal_balance(floor as Cents);
        let value = if weight == 0. {
            below.abs()
        } else {
            let above = self.terminal_balance(floor as Cents + 1);
            ((1. - weight) * below + weight * above).abs()
        };
        if value.is_finite() {
            value
        } else {
            f64::MAX
        }
    }

    /// Search bracket: nothing up to a payment that clears the loan in one go.
    pub fn bracket(&self) -> (f64, f64) {
        let grown = self.principal as f64 * (1. + self.rate.for_interval(self.payment_period_secs));
        (0., grown.ceil())
    }

    /// The whole-cent payment next to `x` with the smallest terminal balance.
    pub fn best_whole_cent(&self, x: f64) -> Cents {
        let (floor, ceil) = (x.floor() as Cents, x.ceil() as Cents);
        (floor.saturating_sub(1)..=ceil.saturating_add(1))
            .rev()
            .min_by(|a, b| {
                let (a, b) = (self.terminal_balance(*a).abs(), self.terminal_balance(*b).abs());
                a.total_cmp(&b)
            })
            .unwrap_or(floor)
    }
}

/// An amortization engine for one set of loan terms.
#[derive(Clone, Debug)]
pub struct Loan {
    terms: LoanTerms,
    rate: EffectiveRate,
}

impl Loan {
    pub fn new(terms: LoanTerms) -> Result<Self, LoanError> {
        terms.validate()?;
        let rate = EffectiveRate::new(
            terms.annual_rate_pct,
            terms.compound_period_secs,
            terms.payment_period_secs,
        )?;
        debug!(
            "loan of {} cents at EAR {:.6}%, {:?}",
            terms.principal,
            rate.ear() * 100.,
            terms.constraint
        );
        Ok(Self { terms, rate })
    }

    pub fn terms(&self) -> &LoanTerms {
        &self.terms
    }

    pub fn rate(&self) -> &EffectiveRate {
        &self.rate
    }

    pub fn process_payment(
        &self,
        dt: f64,
        remaining: Cents,
        max_payment: Cents,
        force: bool,
    ) -> Result<(Cents, Cents), LoanError> {
        process_payment(&self.rate, dt, remaining, max_payment, force)
    }

    /// The regular payment: the configured maximum, or in fixed-duration mode
    /// the payment discovered for the target duration.
    pub fn scheduled_payment(&self) -> Result<Cents, LoanError> {
        match self.terms.constraint {
            Constraint::MaxPayment(max) => Ok(max),
            Constraint::Duration(_) => {
                let n_payments = self.terms.n_payments().unwrap_or(0);
                self.discover_payment(n_payments)
            }
        }
    }

    /// Finds the whole-cent payment whose `n_payments` forced payments leave
    /// the smallest terminal balance.
    pub fn discover_payment(&self, n_payments: u32) -> Result<Cents, LoanError> {
        self.discover_payment_with(n_payments, &SolverOptions::default())
    }

    pub fn discover_payment_with(
        &self,
        n_payments: u32,
        opts: &SolverOptions,
    ) -> Result<Cents, LoanError> {
        let objective = BalanceObjective::new(
            self.rate,
            self.terms.principal,
            self.terms.payment_period_secs,
            n_payments,
        );
        let min = minimize(objective, opts).map_err(|e| LoanError::PaymentDiscovery {
            n_payments,
            reason: e.to_string(),
        })?;

        let payment = objective.best_whole_cent(min.x);
        if payment <= 0 {
            return Err(LoanError::PaymentDiscovery {
                n_payments,
                reason: format!("discovered payment {} is not positive", payment),
            });
        }
        info!(
            "discovered payment {} over {} payments after {} iterations (terminal balance {})",
            payment,
            n_payments,
            min.iterations,
            objective.terminal_balance(payment)
        );
        Ok(payment)
    }

    /// Simulates the loan to payoff and returns one entry per payment.
    pub fn run(&self) -> Result<Vec<LedgerEntry>, LoanError> {
        let payment = self.scheduled_payment()?;
        self.amortize(payment)
    }

    /// Fixed-payment simulation with `max_payment` as the payment ceiling.
    pub fn amortize(&self, max_payment: Cents) -> Result<Vec<LedgerEntry>, LoanError> {
        let period = self.terms.payment_period_secs;
        let mut remaining = self.terms.principal;
        let mut ledger = Vec::new();

        while remaining > 0 {
            let (payment, new_remaining) =
                self.process_payment(period, remaining, max_payment, false)?;
            let paydown = remaining - new_remaining;
            let interest = payment - paydown;
            if paydown <= 0 {
                return Err(LoanError::NonConvergent {
                    payment,
                    interest,
                    previous: remaining,
                    remaining: new_remaining,
                });
            }

            let number = ledger.len() as u32 + 1;
            let entry = LedgerEntry {
                number,
                elapsed_secs: (number as f64 * period).round() as u64,
                payment,
                interest,
                remaining: new_remaining,
            };
            trace!("{}", entry);
            ledger.push(entry);
            remaining = new_remaining;
        }

        let summary = Summary::from_ledger(&ledger);
        info!(
            "paid {} in {} payments over {} s ({} interest)",
            summary.total_paid, summary.payments, summary.elapsed_secs, summary.total_interest
        );
        Ok(ledger)
    }

    /// Registers one out-of-band payment made `elapsed_secs` after the
    /// previous one, against a balance of `remaining`.
    ///
    /// Without an override the scheduled payment is used as the ceiling. An
    /// override of zero is an initial snapshot: no time is charged and the
    /// balance comes back unchanged.
    pub fn register_single_payment(
        &self,
        elapsed_secs: f64,
        remaining: Cents,
        payment_override: Option<Cents>,
    ) -> Result<LedgerEntry, LoanError> {
        if remaining < 0 {
            return Err(LoanError::config(format!(
                "remaining balance must not be negative, got {}",
                remaining
            )));
        }
        if !(elapsed_secs.is_finite() && elapsed_secs >= 0.) {
            return Err(LoanError::config(format!(
                "elapsed time must not be negative, got {} s",
                elapsed_secs
            )));
        }

        let max_payment = match payment_override {
            Some(0) => {
                return Ok(LedgerEntry {
                    number: 0,
                    elapsed_secs: elapsed_secs.round() as u64,
                    payment: 0,
                    interest: 0,
                    remaining,
                })
            }
            Some(p) if p < 0 => {
                return Err(LoanError::config(format!(
                    "payment must not be negative, got {}",
                    p
                )))
            }
            Some(p) => p,
            None => self.scheduled_payment()?,
        };

        let (payment, new_remaining) =
            self.process_payment(elapsed_secs, remaining, max_payment, false)?;
        let paydown = remaining - new_remaining;
        let interest = if paydown > 0 { payment - paydown } else { payment };
        debug!(
            "registered payment {} after {} s: {} to interest, {} left",
            payment, elapsed_secs, interest, new_remaining
        );

        Ok(LedgerEntry {
            number: 1,
            elapsed_secs: elapsed_secs.round() as u64,
            payment,
            interest,
            remaining: new_remaining,
        })
    }
}
