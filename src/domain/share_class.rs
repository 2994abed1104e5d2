//! Share classes and the economic rights attached to them.

use crate::domain::{ensure_non_negative, Decimal, RoundId, ShareClassId, ValidationError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Fundamental share type category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShareType {
    Common,
    Preferred,
    Option,
    Warrant,
}

impl std::fmt::Display for ShareType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ShareType::Common => "common",
            ShareType::Preferred => "preferred",
            ShareType::Option => "option",
            ShareType::Warrant => "warrant",
        };
        write!(f, "{}", s)
    }
}

/// Right to be paid a multiple of the investment before junior classes.
///
/// Rank 0 is paid first. Classes sharing a `pari_passu_group` must share a
/// rank; that is checked by [`ShareClassRegistry`], not here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationPreference {
    #[serde(default = "default_multiple")]
    pub multiple: Decimal,
    pub seniority_rank: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pari_passu_group: Option<String>,
}

fn default_multiple() -> Decimal {
    Decimal::one()
}

impl LiquidationPreference {
    pub fn new(multiple: Decimal, seniority_rank: u32) -> Self {
        Self {
            multiple,
            seniority_rank,
            pari_passu_group: None,
        }
    }

    pub fn in_group(mut self, group: impl Into<String>) -> Self {
        self.pari_passu_group = Some(group.into());
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        ensure_non_negative("liquidation_preference.multiple", self.multiple)
    }
}

/// How a class shares in proceeds after its preference is paid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "participation_type", rename_all = "snake_case")]
pub enum Participation {
    /// Preference OR as-converted, whichever is larger.
    NonParticipating,
    /// Preference AND a pro-rata share of what remains.
    Participating,
    /// Participating until preference + participation reaches
    /// `cap_multiple` times the original investment.
    CappedParticipating { cap_multiple: Decimal },
}

impl Participation {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Participation::CappedParticipating { cap_multiple } = self {
            if *cap_multiple <= Decimal::one() {
                return Err(ValidationError::CapMultipleTooLow { cap: *cap_multiple });
            }
        }
        Ok(())
    }

    /// True for the "double dip" variants.
    pub fn participates(&self) -> bool {
        matches!(
            self,
            Participation::Participating | Participation::CappedParticipating { .. }
        )
    }

    pub fn cap_multiple(&self) -> Option<Decimal> {
        match self {
            Participation::CappedParticipating { cap_multiple } => Some(*cap_multiple),
            _ => None,
        }
    }
}

/// Right to convert shares of one class into another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionRights {
    pub converts_to_class_id: ShareClassId,
    #[serde(default = "default_multiple")]
    pub initial_conversion_ratio: Decimal,
    #[serde(default = "default_multiple")]
    pub current_conversion_ratio: Decimal,
    #[serde(default = "default_true")]
    pub auto_convert_on_ipo: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qualified_ipo_threshold: Option<Decimal>,
}

fn default_true() -> bool {
    true
}

impl ConversionRights {
    /// 1:1 conversion into `target`.
    pub fn one_to_one(target: ShareClassId) -> Self {
        Self {
            converts_to_class_id: target,
            initial_conversion_ratio: Decimal::one(),
            current_conversion_ratio: Decimal::one(),
            auto_convert_on_ipo: true,
            qualified_ipo_threshold: None,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        ensure_non_negative("initial_conversion_ratio", self.initial_conversion_ratio)?;
        ensure_non_negative("current_conversion_ratio", self.current_conversion_ratio)?;
        if let Some(threshold) = self.qualified_ipo_threshold {
            ensure_non_negative("qualified_ipo_threshold", threshold)?;
        }
        Ok(())
    }

    /// Whether an IPO at `ipo_value` triggers automatic conversion.
    pub fn converts_on_ipo(&self, ipo_value: Decimal) -> bool {
        self.auto_convert_on_ipo
            && self
                .qualified_ipo_threshold
                .map_or(true, |threshold| ipo_value >= threshold)
    }
}

/// Down-round protection. Recorded on the class; ratio adjustments are
/// supplied by the caller through `current_conversion_ratio`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AntiDilution {
    None,
    #[default]
    WeightedAverageBroad,
    WeightedAverageNarrow,
    FullRatchet,
}

/// A class of shares with its economic rights.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareClass {
    pub id: ShareClassId,
    pub name: String,
    pub share_type: ShareType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liquidation_preference: Option<LiquidationPreference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participation_rights: Option<Participation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversion_rights: Option<ConversionRights>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anti_dilution_protection: Option<AntiDilution>,
    #[serde(default)]
    pub has_pro_rata_rights: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_in_round_id: Option<RoundId>,
    /// Votes carried by each share. Absent unless the caller supplies it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub votes_per_share: Option<Decimal>,
}

impl ShareClass {
    /// Plain common stock with no preference.
    pub fn common(id: ShareClassId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            share_type: ShareType::Common,
            liquidation_preference: None,
            participation_rights: None,
            conversion_rights: None,
            anti_dilution_protection: None,
            has_pro_rata_rights: false,
            created_in_round_id: None,
            votes_per_share: None,
        }
    }

    /// Preferred stock; validated before being returned.
    pub fn preferred(
        id: ShareClassId,
        name: impl Into<String>,
        preference: LiquidationPreference,
        participation: Participation,
    ) -> Result<Self, ValidationError> {
        let class = Self {
            id,
            name: name.into(),
            share_type: ShareType::Preferred,
            liquidation_preference: Some(preference),
            participation_rights: Some(participation),
            conversion_rights: None,
            anti_dilution_protection: None,
            has_pro_rata_rights: true,
            created_in_round_id: None,
            votes_per_share: None,
        };
        class.validate()?;
        Ok(class)
    }

    pub fn with_conversion(mut self, rights: ConversionRights) -> Self {
        self.conversion_rights = Some(rights);
        self
    }

    pub fn with_votes_per_share(mut self, votes: Decimal) -> Self {
        self.votes_per_share = Some(votes);
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        match self.share_type {
            ShareType::Preferred if self.liquidation_preference.is_none() => {
                return Err(ValidationError::PreferredWithoutPreference {
                    class_id: self.id.to_string(),
                });
            }
            ShareType::Option | ShareType::Warrant if self.liquidation_preference.is_some() => {
                return Err(ValidationError::DerivativeWithPreference {
                    class_id: self.id.to_string(),
                    share_type: self.share_type.to_string(),
                });
            }
            _ => {}
        }

        if let Some(pref) = &self.liquidation_preference {
            pref.validate()?;
        }
        if let Some(participation) = &self.participation_rights {
            participation.validate()?;
        }
        if let Some(conversion) = &self.conversion_rights {
            conversion.validate()?;
        }
        if let Some(votes) = self.votes_per_share {
            ensure_non_negative("votes_per_share", votes)?;
        }
        Ok(())
    }

    pub fn seniority_rank(&self) -> Option<u32> {
        self.liquidation_preference
            .as_ref()
            .map(|pref| pref.seniority_rank)
    }
}

/// All share classes of a cap table, keyed by id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShareClassRegistry {
    classes: BTreeMap<ShareClassId, ShareClass>,
}

impl ShareClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a validated class, rejecting duplicates and pari-passu groups
    /// whose members would end up on different ranks.
    pub fn insert(&mut self, class: ShareClass) -> Result<(), ValidationError> {
        class.validate()?;
        if self.classes.contains_key(&class.id) {
            return Err(ValidationError::DuplicateShareClass(class.id.to_string()));
        }
        let class_id = class.id.clone();
        self.classes.insert(class_id.clone(), class);
        if let Err(e) = self.validate_pari_passu() {
            self.classes.remove(&class_id);
            return Err(e);
        }
        Ok(())
    }

    pub fn get(&self, id: &ShareClassId) -> Option<&ShareClass> {
        self.classes.get(id)
    }

    pub fn contains(&self, id: &ShareClassId) -> bool {
        self.classes.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ShareClass> {
        self.classes.values()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Validate every class and every pari-passu group. Each class must be
    /// keyed by its own id.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (key, class) in &self.classes {
            if key != &class.id {
                return Err(ValidationError::ShareClassKeyMismatch {
                    key: key.to_string(),
                    id: class.id.to_string(),
                });
            }
            class.validate()?;
        }
        self.validate_pari_passu()
    }

    fn validate_pari_passu(&self) -> Result<(), ValidationError> {
        let mut groups: BTreeMap<&str, BTreeSet<u32>> = BTreeMap::new();
        for class in self.classes.values() {
            if let Some(pref) = &class.liquidation_preference {
                if let Some(group) = &pref.pari_passu_group {
                    groups
                        .entry(group.as_str())
                        .or_default()
                        .insert(pref.seniority_rank);
                }
            }
        }
        for (group, ranks) in groups {
            if ranks.len() > 1 {
                return Err(ValidationError::PariPassuRankMismatch {
                    group: group.to_string(),
                    ranks: ranks.into_iter().collect(),
                });
            }
        }
        Ok(())
    }
}

impl FromIterator<ShareClass> for ShareClassRegistry {
    /// Collect without validation; call [`ShareClassRegistry::validate`] after.
    fn from_iter<I: IntoIterator<Item = ShareClass>>(iter: I) -> Self {
        Self {
            classes: iter.into_iter().map(|c| (c.id.clone(), c)).collect(),
        }
    }
}
