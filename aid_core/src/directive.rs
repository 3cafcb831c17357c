//! Cycle output.

use crate::strategy::DecisionSource;

/// Append-only justification lines, in pipeline order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReasonTrail(Vec<String>);

impl ReasonTrail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, line: impl Into<String>) {
        self.0.push(line.into());
    }

    pub fn extend<I, S>(&mut self, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0.extend(lines.into_iter().map(Into::into));
    }

    pub fn lines(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True if any line contains `needle`.
    pub fn mentions(&self, needle: &str) -> bool {
        self.0.iter().any(|l| l.contains(needle))
    }
}

impl core::fmt::Display for ReasonTrail {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0.join("; "))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DosingDirective {
    /// Temp basal rate, U/h, never negative.
    pub basal_rate_uph: f64,
    pub basal_duration_min: u32,
    /// Bolus (SMB), U, never negative.
    pub bolus_units: f64,
    pub source: DecisionSource,
    pub trail: ReasonTrail,
}

impl DosingDirective {
    pub fn delivers_bolus(&self) -> bool {
        self.bolus_units > 0.0
    }
}
