//! Errors raised by the amortization core.

use crate::loan::Cents;

/// Everything that can go wrong while building or running a loan.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LoanError {
    /// The loan terms are invalid, over-constrained or under-constrained.
    #[error("invalid loan terms: {reason}")]
    Configuration { reason: String },

    /// The payment never outpaces the interest, so the balance never shrinks.
    #[error(
        "this loan will never end: payment {payment} against {interest} of interest leaves {remaining} of {previous} outstanding"
    )]
    NonConvergent {
        payment: Cents,
        interest: Cents,
        previous: Cents,
        remaining: Cents,
    },

    /// No payment could be found that pays the loan off in the requested time.
    #[error("unable to discover a payment that completes the loan in {n_payments} payments: {reason}")]
    PaymentDiscovery { n_payments: u32, reason: String },

    /// The balance grew past what fits in a cent count.
    #[error("balance of {remaining} cents grows beyond the representable range")]
    Overflow { remaining: Cents },
}

impl LoanError {
    pub(crate) fn config(reason: impl Into<String>) -> Self {
        LoanError::Configuration {
            reason: reason.into(),
        }
    }
}
