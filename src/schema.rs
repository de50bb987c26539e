//! Column-name matchers for the wide telemetry schema.
//!
//! Both matchers are pure: given a column name they either extract typed
//! fields or return `None`. The patterns themselves come from configuration.

use regex::Regex;
use thiserror::Error;

use crate::energy::types::ChannelKey;

/// Named capture holding the DC input number in the power pattern.
pub const INPUT_GROUP: &str = "input";
/// Named capture holding the inverter code in the power pattern.
pub const INVERTER_GROUP: &str = "inv";
/// Named capture holding the enclosure id in the enclosure pattern.
pub const ENCLOSURE_GROUP: &str = "eid";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PatternError {
    #[error("invalid regex: {0}")]
    Invalid(String),

    #[error("regex must contain the named group (?P<{0}>...)")]
    MissingGroup(&'static str),
}

fn compile(pattern: &str, groups: &[&'static str]) -> Result<Regex, PatternError> {
    let regex = Regex::new(pattern).map_err(|e| PatternError::Invalid(e.to_string()))?;
    for group in groups {
        if !regex.capture_names().flatten().any(|name| name == *group) {
            return Err(PatternError::MissingGroup(group));
        }
    }
    Ok(regex)
}

/// A raw power column resolved to its inverter group and DC input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PowerColumn {
    pub column_name: String,
    pub channel: ChannelKey,
}

/// Matches DC-input power columns such as `1APCS1.DC2.Power`.
///
/// Matching is anchored at the start of the column name; the inverter group
/// is the captured inverter code with every occurrence of the infix removed.
#[derive(Debug, Clone)]
pub struct PowerChannelPattern {
    regex: Regex,
    infix: String,
}

impl PowerChannelPattern {
    /// # Errors
    ///
    /// Returns a [`PatternError`] if the regex does not compile or lacks the
    /// `input`/`inv` named groups.
    pub fn new(pattern: &str, infix: &str) -> Result<Self, PatternError> {
        Ok(Self {
            regex: compile(pattern, &[INPUT_GROUP, INVERTER_GROUP])?,
            infix: infix.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    /// Extracts the channel key from a column name, if it is a power column.
    pub fn match_column(&self, column: &str) -> Option<PowerColumn> {
        let caps = self.regex.captures(column)?;
        if caps.get(0)?.start() != 0 {
            return None;
        }
        let dc_input = caps.name(INPUT_GROUP)?.as_str().parse::<u32>().ok()?;
        let inverter_code = caps.name(INVERTER_GROUP)?.as_str();
        let inverter_group = if self.infix.is_empty() {
            inverter_code.to_string()
        } else {
            inverter_code.replace(&self.infix, "")
        };
        Some(PowerColumn {
            column_name: column.to_string(),
            channel: ChannelKey::new(inverter_group, dc_input),
        })
    }

    /// All power columns of a table, in column order.
    pub fn power_columns<'a, I>(&self, columns: I) -> Vec<PowerColumn>
    where
        I: IntoIterator<Item = &'a str>,
    {
        columns
            .into_iter()
            .filter_map(|c| self.match_column(c))
            .collect()
    }
}

/// Finds enclosure identifiers (e.g. `1A1BAT3`) anywhere inside column names.
#[derive(Debug, Clone)]
pub struct EnclosurePattern {
    regex: Regex,
}

impl EnclosurePattern {
    /// # Errors
    ///
    /// Returns a [`PatternError`] if the regex does not compile or lacks the
    /// `eid` named group.
    pub fn new(pattern: &str) -> Result<Self, PatternError> {
        Ok(Self {
            regex: compile(pattern, &[ENCLOSURE_GROUP])?,
        })
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    /// Returns the captured enclosure id of the first match in `column`.
    pub fn match_column<'c>(&self, column: &'c str) -> Option<&'c str> {
        self.regex
            .captures(column)
            .and_then(|caps| caps.name(ENCLOSURE_GROUP))
            .map(|m| m.as_str())
    }
}
