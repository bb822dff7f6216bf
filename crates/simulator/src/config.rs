use std::{
    io::{BufRead, Write},
    path::Path,
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::errors::SimulatorError;

/// The four values an operator supplies for a run. Stored on disk as JSON with camelCase keys.
///
/// Fields are signed so that negative input survives parsing and is rejected by
/// [`Configuration::validate`] with a proper message.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    pub total_tickets: i64,
    /// Pause between vendor releases, in milliseconds.
    pub ticket_release_rate: i64,
    /// Pause between customer purchases, in milliseconds.
    pub customer_retrieval_rate: i64,
    pub max_ticket_capacity: i64,
}

/// Validated settings handed to the driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolSettings {
    pub total_tickets: usize,
    pub release_rate: Duration,
    pub retrieval_rate: Duration,
    pub max_capacity: usize,
}

/// Values given on the command line. Unset fields fall back to the config file, then to a prompt.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConfigOverrides {
    pub total_tickets: Option<i64>,
    pub ticket_release_rate: Option<i64>,
    pub customer_retrieval_rate: Option<i64>,
    pub max_ticket_capacity: Option<i64>,
}

impl Configuration {
    pub async fn load_from_file(path: &Path) -> Result<Self, SimulatorError> {
        let raw = fs::read(path).await?;
        Ok(serde_json::from_slice(&raw)?)
    }

    pub async fn save_to_file(&self, path: &Path) -> Result<(), SimulatorError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).await?;
        Ok(())
    }

    /// Reject negative values, and a zero capacity when tickets still have to be issued
    /// (vendors could never place one and customers would wait forever).
    pub fn validate(&self) -> Result<PoolSettings, SimulatorError> {
        let total_tickets = non_negative("total tickets", self.total_tickets)?;
        let release_ms = non_negative("ticket release rate", self.ticket_release_rate)?;
        let retrieval_ms = non_negative("customer retrieval rate", self.customer_retrieval_rate)?;
        let max_capacity = non_negative("max ticket capacity", self.max_ticket_capacity)?;

        if max_capacity == 0 && total_tickets > 0 {
            return Err(SimulatorError::InvalidConfig(
                "max ticket capacity must be at least 1 when tickets are to be issued".into(),
            ));
        }

        Ok(PoolSettings {
            total_tickets: total_tickets as usize,
            release_rate: Duration::from_millis(release_ms),
            retrieval_rate: Duration::from_millis(retrieval_ms),
            max_capacity: max_capacity as usize,
        })
    }
}

fn non_negative(what: &str, value: i64) -> Result<u64, SimulatorError> {
    u64::try_from(value).map_err(|_| {
        SimulatorError::InvalidConfig(format!("{} must be non-negative, got {}", what, value))
    })
}

/// Merge command-line overrides over an optional file configuration, prompting on `input` for
/// anything still missing.
pub fn resolve(
    overrides: ConfigOverrides,
    base: Option<Configuration>,
    input: &mut impl BufRead,
    output: &mut impl Write,
) -> Result<Configuration, SimulatorError> {
    let pick = |cli: Option<i64>, file: Option<i64>| cli.or(file);

    let total = pick(overrides.total_tickets, base.as_ref().map(|c| c.total_tickets));
    let release = pick(overrides.ticket_release_rate, base.as_ref().map(|c| c.ticket_release_rate));
    let retrieval = pick(
        overrides.customer_retrieval_rate,
        base.as_ref().map(|c| c.customer_retrieval_rate),
    );
    let capacity = pick(overrides.max_ticket_capacity, base.as_ref().map(|c| c.max_ticket_capacity));

    Ok(Configuration {
        total_tickets: or_prompt(total, "total tickets", "Enter total number of tickets: ", input, output)?,
        ticket_release_rate: or_prompt(
            release,
            "ticket release rate",
            "Enter ticket release rate (ms): ",
            input,
            output,
        )?,
        customer_retrieval_rate: or_prompt(
            retrieval,
            "customer retrieval rate",
            "Enter customer retrieval rate (ms): ",
            input,
            output,
        )?,
        max_ticket_capacity: or_prompt(
            capacity,
            "max ticket capacity",
            "Enter maximum ticket capacity in pool: ",
            input,
            output,
        )?,
    })
}

fn or_prompt(
    value: Option<i64>,
    what: &'static str,
    question: &str,
    input: &mut impl BufRead,
    output: &mut impl Write,
) -> Result<i64, SimulatorError> {
    if let Some(v) = value {
        return Ok(v);
    }

    loop {
        write!(output, "{}", question)?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Err(SimulatorError::MissingValue(what));
        }
        match line.trim().parse::<i64>() {
            Ok(v) => return Ok(v),
            Err(_) => writeln!(output, "'{}' is not a whole number, try again.", line.trim())?,
        }
    }
}
