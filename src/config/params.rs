//! Simulation parameters and their command-line rendering.

use serde::{Deserialize, Serialize};

/// Parameters recognized by the simulator.
///
/// Unset parameters are left out of the command line so the simulator
/// applies its own defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationParams {
    /// Number of trading agents.
    pub agents: Option<u32>,
    /// Number of stocks on the market.
    pub stocks: Option<u32>,
    /// Steps per round.
    pub steps: Option<u32>,
    /// Number of rounds.
    pub rounds: Option<u32>,
    pub rate: Option<f64>,
    /// Ask the simulator to plot results.
    pub plot: Option<bool>,
    /// Behavioral model of the agents.
    #[serde(rename = "type")]
    pub model_type: Option<String>,
    pub gesture: Option<f64>,
    /// Wealth below which an agent is liquidated.
    pub liquidation_floor: Option<f64>,
    pub leader_type: Option<String>,
    /// Upper bound on agent cluster size.
    pub cluster_limit: Option<f64>,
}

fn push_flag(args: &mut Vec<String>, key: &str, value: Option<String>) {
    if let Some(value) = value {
        args.push(format!("--{key}"));
        args.push(value);
    }
}

impl SimulationParams {
    /// Render as `--key value` pairs in the simulator's canonical order.
    #[must_use]
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        push_flag(&mut args, "agents", self.agents.map(|v| v.to_string()));
        push_flag(&mut args, "stocks", self.stocks.map(|v| v.to_string()));
        push_flag(&mut args, "steps", self.steps.map(|v| v.to_string()));
        push_flag(&mut args, "rounds", self.rounds.map(|v| v.to_string()));
        push_flag(&mut args, "rate", self.rate.map(format_float));
        push_flag(&mut args, "plot", self.plot.map(format_bool));
        push_flag(&mut args, "type", self.model_type.clone());
        push_flag(&mut args, "gesture", self.gesture.map(format_float));
        push_flag(
            &mut args,
            "liquidation-floor",
            self.liquidation_floor.map(format_float),
        );
        push_flag(&mut args, "leader-type", self.leader_type.clone());
        push_flag(&mut args, "cluster-limit", self.cluster_limit.map(format_float));
        args
    }

    /// Fill every unset field from `other`.
    #[must_use]
    pub fn or(self, other: &Self) -> Self {
        Self {
            agents: self.agents.or(other.agents),
            stocks: self.stocks.or(other.stocks),
            steps: self.steps.or(other.steps),
            rounds: self.rounds.or(other.rounds),
            rate: self.rate.or(other.rate),
            plot: self.plot.or(other.plot),
            model_type: self.model_type.or_else(|| other.model_type.clone()),
            gesture: self.gesture.or(other.gesture),
            liquidation_floor: self.liquidation_floor.or(other.liquidation_floor),
            leader_type: self.leader_type.or_else(|| other.leader_type.clone()),
            cluster_limit: self.cluster_limit.or(other.cluster_limit),
        }
    }
}

/// Booleans are spelled the way the simulator's argument parser expects.
#[must_use]
pub fn format_bool(value: bool) -> String {
    let literal = if value { "True" } else { "False" };
    literal.to_string()
}

/// Format a float like the simulator's own default conversion: shortest
/// round-trip digits, `.0` on integral values, and exponent form with a
/// signed two-digit exponent outside `[1e-4, 1e16)`.
#[must_use]
pub fn format_float(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        let literal = if value > 0.0 { "inf" } else { "-inf" };
        return literal.to_string();
    }

    let magnitude = value.abs();
    if magnitude != 0.0 && !(1e-4..1e16).contains(&magnitude) {
        let formatted = format!("{value:e}");
        let (mantissa, exponent) = formatted.split_once('e').unwrap_or((formatted.as_str(), "0"));
        let (sign, digits) = match exponent.strip_prefix('-') {
            Some(digits) => ('-', digits),
            None => ('+', exponent),
        };
        return format!("{mantissa}e{sign}{digits:0>2}");
    }

    let formatted = value.to_string();
    if formatted.contains('.') {
        formatted
    } else {
        format!("{formatted}.0")
    }
}
