//! Instrument definitions.
//!
//! An instrument is looked up by name. Point sequences, positions and pending
//! orders all refer to it through that name instead of holding a reference.

use serde::{Deserialize, Serialize};

use super::enums::InstrumentKind;

/// Static description of a tradable instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    /// Unique name (e.g. `"SPY"`, `"ESZ4"`).
    pub name: String,
    #[serde(default)]
    pub kind: InstrumentKind,
    /// Bar width in microseconds. `None` keeps one bar per distinct timestamp.
    #[serde(default)]
    pub time_frame_us: Option<u64>,
    /// Contract multiplier for derivatives (e.g. 100 for equity options).
    #[serde(default)]
    pub contract_multiplier: Option<f64>,
}

impl Instrument {
    /// Spot instrument without a time frame.
    pub fn spot(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: InstrumentKind::Spot,
            time_frame_us: None,
            contract_multiplier: None,
        }
    }

    /// Future or option with a contract multiplier.
    pub fn derivative(name: &str, kind: InstrumentKind, multiplier: f64) -> Self {
        Self {
            name: name.to_string(),
            kind,
            time_frame_us: None,
            contract_multiplier: Some(multiplier),
        }
    }

    pub fn with_time_frame(mut self, time_frame_us: u64) -> Self {
        self.time_frame_us = Some(time_frame_us);
        self
    }


    /// Multiplier applied to gains: 1 for spot, the contract multiplier
    /// (default 1) for derivatives.
    pub fn leverage(&self) -> f64 {
        if self.kind.is_derivative() {
            self.contract_multiplier.unwrap_or(1.0)
        } else {
            1.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spot_ignores_multiplier() {
        let mut i = Instrument::spot("SPY");
        i.contract_multiplier = Some(100.0);
        assert_eq!(i.leverage(), 1.0);
    }

    #[test]
    fn derivative_uses_multiplier() {
        let i = Instrument::derivative("SPY 240119C00480000", InstrumentKind::Option, 100.0);
        assert_eq!(i.leverage(), 100.0);
        assert_eq!(i.kind, InstrumentKind::Option);
        let f = Instrument { kind: InstrumentKind::Future, ..Instrument::spot("ES") };
        assert_eq!(f.leverage(), 1.0);
    }
}
