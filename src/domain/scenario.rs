//! Exit scenarios and returns configuration.

use crate::domain::{ensure_non_negative, Decimal, Percentage, ValidationError};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExitType {
    #[serde(rename = "M&A")]
    MergerAcquisition,
    #[serde(rename = "IPO")]
    Ipo,
    #[serde(rename = "secondary")]
    Secondary,
}

/// A hypothetical liquidity event to push through the waterfall.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitScenario {
    pub id: String,
    pub label: String,
    pub exit_value: Decimal,
    pub exit_type: ExitType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_costs_percentage: Option<Percentage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub management_carveout_percentage: Option<Percentage>,
    /// Fraction of the company floated. Required for IPO exits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub float_percentage: Option<Percentage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lockup_period_days: Option<u32>,
}

impl ExitScenario {
    /// An M&A exit with no costs or carveout.
    pub fn acquisition(id: impl Into<String>, exit_value: Decimal) -> Self {
        let id = id.into();
        Self {
            label: id.clone(),
            id,
            exit_value,
            exit_type: ExitType::MergerAcquisition,
            exit_date: None,
            transaction_costs_percentage: None,
            management_carveout_percentage: None,
            float_percentage: None,
            lockup_period_days: None,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        ensure_non_negative("exit_value", self.exit_value)?;
        if self.exit_type == ExitType::Ipo && self.float_percentage.is_none() {
            return Err(ValidationError::IpoWithoutFloat {
                scenario_id: self.id.clone(),
            });
        }
        Ok(())
    }

    /// Proceeds left for shareholders.
    ///
    /// Transaction costs come off the exit value; the management carveout is
    /// then taken from what remains.
    pub fn net_proceeds(&self) -> Decimal {
        let mut net = self.exit_value;
        if let Some(costs) = self.transaction_costs_percentage {
            net -= self.exit_value * costs.value();
        }
        if let Some(carveout) = self.management_carveout_percentage {
            net -= net * carveout.value();
        }
        net
    }

    pub fn ipo_offering_size(&self) -> Option<Decimal> {
        match (self.exit_type, self.float_percentage) {
            (ExitType::Ipo, Some(float)) => Some(self.exit_value * float.value()),
            _ => None,
        }
    }
}

fn default_true() -> bool {
    true
}

/// What the returns stage computes and shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnsConfig {
    #[serde(default)]
    pub scenarios: Vec<ExitScenario>,
    #[serde(default)]
    pub include_irr: bool,
    #[serde(default = "default_true")]
    pub include_moic: bool,
    #[serde(default = "default_true")]
    pub show_by_holder: bool,
    #[serde(default = "default_true")]
    pub show_by_share_class: bool,
    #[serde(default = "default_true")]
    pub show_waterfall_steps: bool,
}

impl Default for ReturnsConfig {
    fn default() -> Self {
        Self {
            scenarios: Vec::new(),
            include_irr: false,
            include_moic: true,
            show_by_holder: true,
            show_by_share_class: true,
            show_waterfall_steps: true,
        }
    }
}

impl ReturnsConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.scenarios.iter().try_for_each(ExitScenario::validate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    fn pct(s: &str) -> Option<Percentage> {
        Some(Percentage::new(d(s)).unwrap())
    }

    #[test]
    fn test_net_proceeds_applies_carveout_after_costs() {
        let mut scenario = ExitScenario::acquisition("base", d("100000000"));
        scenario.transaction_costs_percentage = pct("0.03");
        scenario.management_carveout_percentage = pct("0.10");
        // 100M - 3M = 97M, then 10% of 97M.
        assert_eq!(scenario.net_proceeds(), d("87300000"));
    }

    #[test]
    fn test_net_proceeds_without_costs() {
        let scenario = ExitScenario::acquisition("base", d("50000000"));
        assert_eq!(scenario.net_proceeds(), d("50000000"));
    }

    #[test]
    fn test_ipo_requires_float() {
        let mut scenario = ExitScenario::acquisition("ipo", d("500000000"));
        scenario.exit_type = ExitType::Ipo;
        assert!(matches!(
            scenario.validate(),
            Err(ValidationError::IpoWithoutFloat { .. })
        ));

        scenario.float_percentage = pct("0.2");
        assert!(scenario.validate().is_ok());
        assert_eq!(scenario.ipo_offering_size(), Some(d("100000000")));
    }

    #[test]
    fn test_exit_type_wire_names() {
        let json = serde_json::json!({
            "id": "strategic",
            "label": "Strategic sale",
            "exit_value": "75000000",
            "exit_type": "M&A"
        });
        let scenario: ExitScenario = serde_json::from_value(json).unwrap();
        assert_eq!(scenario.exit_type, ExitType::MergerAcquisition);
        assert_eq!(
            serde_json::to_value(ExitType::Ipo).unwrap(),
            serde_json::json!("IPO")
        );
    }

    #[test]
    fn test_returns_config_defaults() {
        let config: ReturnsConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ReturnsConfig::default());
        assert!(!config.include_irr);
        assert!(config.include_moic);
    }
}
