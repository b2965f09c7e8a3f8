//! Payment search on top of `argmin`.
//!
//! [`BalanceObjective`] is the cost function; Brent's method runs over its
//! bracket. The objective only has to be unimodal and free of flat
//! stretches on the bracket; it does not need to be smooth.

use argmin::core::{CostFunction, Error, Executor, State, TerminationReason, TerminationStatus};
use argmin::solver::brent::BrentOpt;
use log::trace;

use crate::loan::BalanceObjective;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SolverError {
    #[error("invalid bracket [{lower}, {upper}]")]
    InvalidBracket { lower: f64, upper: f64 },

    #[error("objective is not finite near x = {x}")]
    NonFinite { x: f64 },

    #[error("solver did not converge after {iterations} iterations ({status})")]
    NotConverged { iterations: u64, status: String },

    #[error("solver failed: {0}")]
    Argmin(String),
}

impl From<Error> for SolverError {
    fn from(err: Error) -> Self {
        SolverError::Argmin(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverOptions {
    /// Absolute tolerance on the payment, in cents.
    pub x_tolerance: f64,
    /// Tolerance relative to the size of the payment.
    pub relative_tolerance: f64,
    pub max_iterations: u64,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            x_tolerance: 0.25,
            relative_tolerance: f64::EPSILON.sqrt(),
            max_iterations: 200,
        }
    }
}

/// Result of a successful search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Minimum {
    pub x: f64,
    pub value: f64,
    pub iterations: u64,
}

impl CostFunction for BalanceObjective {
    type Param = f64;
    type Output = f64;

    fn cost(&self, payment: &Self::Param) -> Result<Self::Output, Error> {
        Ok(self.evaluate(*payment))
    }
}

/// Minimizes `objective` over its bracket.
pub fn minimize(objective: BalanceObjective, opts: &SolverOptions) -> Result<Minimum, SolverError> {
    let (lower, upper) = objective.bracket();
    if !(lower.is_finite() && upper.is_finite()) || lower >= upper {
        return Err(SolverError::InvalidBracket { lower, upper });
    }

    let solver =
        BrentOpt::new(lower, upper).set_tolerance(opts.relative_tolerance, opts.x_tolerance);
    let result = Executor::new(objective, solver)
        .configure(|state| state.max_iters(opts.max_iterations))
        .run()?;
    let state = result.state();
    let iterations = state.get_iter();

    match state.get_termination_status() {
        TerminationStatus::NotTerminated
        | TerminationStatus::Terminated(TerminationReason::MaxItersReached) => {
            return Err(SolverError::NotConverged {
                iterations,
                status: format!("{:?}", state.get_termination_status()),
            })
        }
        status => trace!("search stopped after {} iterations: {:?}", iterations, status),
    }

    let x = state
        .get_best_param()
        .copied()
        .ok_or(SolverError::NonFinite { x: f64::NAN })?;
    let value = state.get_best_cost();
    if !value.is_finite() || value >= f64::MAX {
        return Err(SolverError::NonFinite { x });
    }
    Ok(Minimum {
        x,
        value,
        iterations,
    })
}
