//! Command line front end: loan simulation and single-payment reports.

use chrono::{DateTime, Utc};
use clap::Parser;
use std::io::{self, Write};
use std::process::ExitCode;

use crate::clock::{ClockError, SntpClock, SystemClock, TimeSource, DEFAULT_TIME_SERVER};
use crate::error::LoanError;
use crate::loan::{to_cents, to_major, Cents, Constraint, Loan, LoanTerms, Summary};
use crate::timespan::{format_timespan, parse_timespan, TimespanError};

const REPORT_TIME_FORMAT: &str = "%a, %d %b %Y %H:%M:%S +0000";

#[derive(Parser, Debug)]
#[command(name = "amortize", about = "Crunch mortgage numbers", version)]
pub struct Cli {
    /// Loan size
    #[arg(short, long, default_value_t = 100_000.)]
    pub size: f64,

    /// Advertised interest rate [percent]
    #[arg(short, long, default_value_t = 4.5)]
    pub rate: f64,

    /// How often interest is compounded
    #[arg(short, long, default_value = "1 year")]
    pub compound_period: String,

    /// Upper limit for a single payment (0 to leave unset)
    #[arg(short = 'p', long, default_value_t = 10_000.)]
    pub max_payment_size: f64,

    /// Time between regular payments
    #[arg(short = 'i', long, default_value = "1 month")]
    pub payment_period: String,

    /// Fix the duration of the loan (0 to leave unset)
    #[arg(short, long, default_value = "0")]
    pub duration: String,

    /// Monetary unit
    #[arg(short, long, default_value = "EUR")]
    pub unit: String,

    /// Name of the lender
    #[arg(short, long)]
    pub bank_name: Option<String>,

    /// Name of the borrower
    #[arg(short = 'w', long)]
    pub borrower_name: Option<String>,

    /// Register a payment against an existing loan and print a payment report
    #[arg(
        short = 'n',
        long,
        num_args = 3,
        value_names = ["LAST_TIMESTAMP", "LAST_REMAINING", "PAYMENT_SIZE"]
    )]
    pub register_new_payment: Option<Vec<f64>>,

    /// SNTP server used to timestamp registered payments
    #[arg(long, default_value = DEFAULT_TIME_SERVER)]
    pub time_server: String,

    /// Use the local clock instead of asking a time server
    #[arg(long)]
    pub local_clock: bool,

    /// Print more details
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Loan(#[from] LoanError),

    #[error(transparent)]
    Clock(#[from] ClockError),

    #[error("invalid {name}: {source}")]
    Timespan {
        name: &'static str,
        #[source]
        source: TimespanError,
    },

    #[error("timestamp {0} is out of range")]
    Timestamp(f64),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl CliError {
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::Io(_) => 1,
            CliError::Loan(LoanError::Configuration { .. })
            | CliError::Loan(LoanError::Overflow { .. })
            | CliError::Timespan { .. }
            | CliError::Timestamp(_) => 2,
            CliError::Loan(LoanError::NonConvergent { .. }) => 3,
            CliError::Loan(LoanError::PaymentDiscovery { .. }) => 4,
            CliError::Clock(_) => 5,
        }
    }
}

impl From<&CliError> for ExitCode {
    fn from(err: &CliError) -> Self {
        ExitCode::from(err.exit_code())
    }
}

fn timespan(name: &'static str, text: &str) -> Result<f64, CliError> {
    parse_timespan(text).map_err(|source| CliError::Timespan { name, source })
}

fn timestamp(secs: f64) -> Result<DateTime<Utc>, CliError> {
    if !secs.is_finite() {
        return Err(CliError::Timestamp(secs));
    }
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9).round().min(999_999_999.) as u32;
    DateTime::from_timestamp(whole as i64, nanos).ok_or(CliError::Timestamp(secs))
}

/// Formats cents as major units with thousands separators ("100,000.00").
pub fn format_money(amount: Cents) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let abs = amount.unsigned_abs();
    let whole = (abs / 100).to_string();
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    format!("{}{}.{:02}", sign, grouped, abs % 100)
}

impl Cli {
    /// Loan terms from the arguments; a zero payment or duration means unset.
    pub fn terms(&self) -> Result<LoanTerms, CliError> {
        let max_payment = Some(to_cents(self.max_payment_size)).filter(|&p| p != 0);
        let duration = Some(timespan("duration", &self.duration)?).filter(|&d| d != 0.);
        Ok(LoanTerms::new(
            to_cents(self.size),
            self.rate,
            timespan("compound period", &self.compound_period)?,
            timespan("payment period", &self.payment_period)?,
            max_payment,
            duration,
        )?)
    }
}

pub fn run(cli: Cli) -> ExitCode {
    let clock: Box<dyn TimeSource> = if cli.local_clock {
        Box::new(SystemClock)
    } else {
        Box::new(SntpClock::new(cli.time_server.clone()))
    };

    let stdout = io::stdout();
    match execute(&cli, clock.as_ref(), &mut stdout.lock()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err);
            ExitCode::from(&err)
        }
    }
}

pub fn execute(cli: &Cli, clock: &dyn TimeSource, out: &mut dyn Write) -> Result<(), CliError> {
    let loan = Loan::new(cli.terms()?)?;
    match cli.register_new_payment.as_deref() {
        Some(&[then, remaining, payment]) => {
            register(cli, &loan, clock, out, then, remaining, payment)
        }
        _ => simulate(cli, &loan, clock, out),
    }
}

fn simulate(
    cli: &Cli,
    loan: &Loan,
    clock: &dyn TimeSource,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    let terms = loan.terms();
    let unit = &cli.unit;
    let period = terms.payment_period_secs;

    writeln!(out, "Borrowed: {} {}", format_money(terms.principal), unit)?;
    match terms.constraint {
        Constraint::MaxPayment(max) => {
            writeln!(out, "Pre-set maximum payment: {} {}", format_money(max), unit)?
        }
        Constraint::Duration(duration) => writeln!(
            out,
            "Pre-set maximum mortgage length: {}",
            format_timespan(duration)
        )?,
    }
    writeln!(
        out,
        "Effective Annual Rate (EAR): {:.6} percent",
        loan.rate().ear() * 100.
    )?;

    if let (Constraint::Duration(duration), Some(n)) = (terms.constraint, terms.n_payments()) {
        writeln!(out, "Maximum duration loan of {}", format_timespan(duration))?;
        writeln!(out, "With payments made every {}", format_timespan(period))?;
        writeln!(
            out,
            "Results in {} payments and an actual duration of {}",
            n,
            format_timespan(n as f64 * period)
        )?;
    }

    let payment = loan.scheduled_payment()?;
    if let Constraint::Duration(_) = terms.constraint {
        writeln!(out, "Discovered payment value: {} {}", format_money(payment), unit)?;
    }

    let ledger = loan.amortize(payment)?;
    let summary = Summary::from_ledger(&ledger);
    writeln!(
        out,
        "Total paid after {}: {} {} ({} payments, {} {} of interest)",
        format_timespan(summary.elapsed_secs as f64),
        format_money(summary.total_paid),
        unit,
        summary.payments,
        format_money(summary.total_interest),
        unit
    )?;
    writeln!(out, "With payments made every {}", format_timespan(period))?;

    if cli.verbose {
        let t0 = clock.now()?.timestamp();
        writeln!(
            out,
            "#\tTimestamp\tPayment [{unit}]\tInterest [{unit}]\tRemaining [{unit}]",
            unit = unit
        )?;
        for entry in &ledger {
            writeln!(
                out,
                "{}\t{}\t{:.2}\t{:.2}\t{:.2}",
                entry.number,
                t0 + entry.elapsed_secs as i64,
                entry.payment_major(),
                entry.interest_major(),
                entry.remaining_major()
            )?;
        }
    }
    Ok(())
}

fn register(
    cli: &Cli,
    loan: &Loan,
    clock: &dyn TimeSource,
    out: &mut dyn Write,
    then: f64,
    remaining: f64,
    payment: f64,
) -> Result<(), CliError> {
    let unit = &cli.unit;
    let remaining = to_cents(remaining);
    let payment = to_cents(payment);
    let then = timestamp(then)?;

    // a zero payment is the initial report for a new loan
    let now = if payment == 0 { then } else { clock.now()? };
    let dt = (now - then).num_milliseconds() as f64 / 1000.;
    let entry = loan.register_single_payment(dt, remaining, Some(payment))?;

    writeln!(out, "LOAN REPAYMENT REPORT")?;
    writeln!(out)?;
    if let (Some(borrower), Some(bank)) = (&cli.borrower_name, &cli.bank_name) {
        writeln!(
            out,
            "This report records a payment from {} to The Bank of The {}.",
            borrower, bank
        )?;
    }
    writeln!(
        out,
        "It concerns a loan with an Effective Annual Interest Rate of {:.3}%.",
        loan.rate().ear() * 100.
    )?;
    writeln!(out)?;
    writeln!(out, "Time of this payment: {}", now.format(REPORT_TIME_FORMAT))?;
    writeln!(out, "Time of previous payment: {}", then.format(REPORT_TIME_FORMAT))?;
    writeln!(
        out,
        "Time between payments: {} seconds (or approximately {})",
        dt as i64,
        format_timespan(dt)
    )?;
    writeln!(
        out,
        "Amount remaining after previous payment: {} {}",
        format_money(remaining),
        unit
    )?;
    writeln!(out)?;
    writeln!(out, "Value of this payment: {} {}", format_money(entry.payment), unit)?;
    writeln!(
        out,
        "Amount of this payment that went to interest: {} {}",
        format_money(entry.interest),
        unit
    )?;
    writeln!(out)?;
    writeln!(out, "Total left to pay: {} {}", format_money(entry.remaining), unit)?;
    writeln!(
        out,
        "Next: -n {} {} X",
        now.timestamp(),
        to_major(entry.remaining)
    )?;
    Ok(())
}
