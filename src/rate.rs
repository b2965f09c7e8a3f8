use log::debug;
use std::{fmt, str::FromStr};

use crate::error::LoanError;

/// Length of the canonical year (365.25 days). Rate conversion, timespans and
/// frequency presets all measure time against this one constant.
pub const SECONDS_PER_YEAR: f64 = 365.25 * 86_400.;

/// Common payment and compounding frequencies.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Frequency {
    Daily,
    Weekly,
    Biweekly,
    SemiMonthly,
    Monthly,
    Quarterly,
    SemiAnnually,
    Annually,
}

impl Frequency {
    pub const ALL: [Frequency; 8] = [
        Frequency::Daily,
        Frequency::Weekly,
        Frequency::Biweekly,
        Frequency::SemiMonthly,
        Frequency::Monthly,
        Frequency::Quarterly,
        Frequency::SemiAnnually,
        Frequency::Annually,
    ];

    pub fn per_year(self) -> f64 {
        match self {
            Frequency::Daily => 365.,
            Frequency::Weekly => 52.,
            Frequency::Biweekly => 26.,
            Frequency::SemiMonthly => 24.,
            Frequency::Monthly => 12.,
            Frequency::Quarterly => 4.,
            Frequency::SemiAnnually => 2.,
            Frequency::Annually => 1.,
        }
    }

    pub fn period_secs(self) -> f64 {
        SECONDS_PER_YEAR / self.per_year()
    }

    fn name(self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Biweekly => "biweekly",
            Frequency::SemiMonthly => "semi-monthly",
            Frequency::Monthly => "monthly",
            Frequency::Quarterly => "quarterly",
            Frequency::SemiAnnually => "semi-annually",
            Frequency::Annually => "annually",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Frequency::ALL
            .into_iter()
            .find(|freq| freq.name() == wanted)
            .ok_or_else(|| format!("unknown frequency '{}'", s))
    }
}

/// Growth rates derived from a nominal annual rate and its compounding period.
///
/// The effective annual rate is the single basis for every interval: the
/// per-payment rate is just `for_interval(payment_period)`.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct EffectiveRate {
    ear: f64,
    payment_period_secs: f64,
    per_payment: f64,
}

impl EffectiveRate {
    pub fn new(
        nominal_rate_pct: f64,
        compound_period_secs: f64,
        payment_period_secs: f64,
    ) -> Result<Self, LoanError> {
        if !nominal_rate_pct.is_finite() || nominal_rate_pct < 0. {
            return Err(LoanError::config(format!(
                "nominal rate must be a non-negative percentage, got {}",
                nominal_rate_pct
            )));
        }
        if !(compound_period_secs.is_finite() && compound_period_secs > 0.) {
            return Err(LoanError::config(format!(
                "compounding period must be positive, got {} s",
                compound_period_secs
            )));
        }
        if !(payment_period_secs.is_finite() && payment_period_secs > 0.) {
            return Err(LoanError::config(format!(
                "payment period must be positive, got {} s",
                payment_period_secs
            )));
        }

        let compounds_per_year = SECONDS_PER_YEAR / compound_period_secs;
        let ear = (1. + nominal_rate_pct / 100. / compounds_per_year).powf(compounds_per_year) - 1.;
        let per_payment = interval_rate(ear, payment_period_secs);
        debug!(
            "nominal {}% compounded every {} s -> EAR {:.6}%, per payment {:.8}",
            nominal_rate_pct,
            compound_period_secs,
            ear * 100.,
            per_payment
        );

        Ok(Self {
            ear,
            payment_period_secs,
            per_payment,
        })
    }

    /// Effective annual rate as a decimal (0.0609 for 6.09%).
    pub fn ear(&self) -> f64 {
        self.ear
    }

    pub fn per_payment(&self) -> f64 {
        self.per_payment
    }

    pub fn payment_period_secs(&self) -> f64 {
        self.payment_period_secs
    }

    /// Growth rate over an arbitrary elapsed interval of `dt` seconds.
    pub fn for_interval(&self, dt: f64) -> f64 {
        if dt == self.payment_period_secs {
            self.per_payment
        } else {
            interval_rate(self.ear, dt)
        }
    }
}

fn interval_rate(ear: f64, dt: f64) -> f64 {
    (1. + ear).powf(dt / SECONDS_PER_YEAR) - 1.
}
