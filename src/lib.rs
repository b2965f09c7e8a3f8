//! Loan amortization under compound interest.
//!
//! [`loan::Loan`] simulates a fixed-schedule loan to payoff, either with a
//! given maximum payment or by first solving for the payment that clears the
//! loan within a target duration.

pub mod cli;
pub mod clock;
pub mod error;
pub mod loan;
pub mod rate;
pub mod solver;
pub mod timespan;

pub use error::LoanError;
pub use loan::{Cents, Constraint, LedgerEntry, Loan, LoanTerms, Summary};
pub use rate::{EffectiveRate, Frequency, SECONDS_PER_YEAR};
