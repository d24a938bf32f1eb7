//! Latest-indicator snapshots derived from demographic observations.
//!
//! Each indicator is resolved independently: the value reported for a
//! category is the one recorded at that category's own maximum year, so a
//! location may report 2021 population next to 2019 home values.

use crate::model::DemographicObservation;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::LazyLock;

/// The fixed set of indicators summarized per location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Indicator {
    Population,
    MedianHouseholdIncome,
    PersonsPerHousehold,
    MedianHomeValue,
    PovertyRate,
}

impl Indicator {
    pub const ALL: [Indicator; 5] = [
        Indicator::Population,
        Indicator::MedianHouseholdIncome,
        Indicator::PersonsPerHousehold,
        Indicator::MedianHomeValue,
        Indicator::PovertyRate,
    ];

    /// Normalized category label the indicator is read from.
    pub fn category(&self) -> &'static str {
        match self {
            Indicator::Population => "population",
            Indicator::MedianHouseholdIncome => "median_household_income",
            Indicator::PersonsPerHousehold => "persons_per_household",
            Indicator::MedianHomeValue => "median_home_value",
            Indicator::PovertyRate => "poverty_rate",
        }
    }

    pub fn from_category(category: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|i| i.category() == category)
    }
}

/// A resolved indicator value and the year it was observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct IndicatorValue {
    pub year: String,
    pub value: f64,
}

/// Latest value of every indicator for one location.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct IndicatorSnapshot {
    pub location_id: String,
    pub population: Option<IndicatorValue>,
    pub median_household_income: Option<IndicatorValue>,
    pub persons_per_household: Option<IndicatorValue>,
    pub median_home_value: Option<IndicatorValue>,
    pub poverty_rate: Option<IndicatorValue>,
}

impl IndicatorSnapshot {
    /// Resolve every indicator from a location's observations.
    ///
    /// Observations without a value are ignored. When two observations of a
    /// category share its maximum year, the larger value wins.
    pub fn resolve(location_id: &str, observations: &[DemographicObservation]) -> Self {
        let mut snapshot = IndicatorSnapshot { location_id: location_id.to_string(), ..Default::default() };
        for indicator in Indicator::ALL {
            let candidates = observations.iter().filter(|o| o.category == indicator.category());
            if let Some(best) = latest(candidates, None) {
                *snapshot.slot_mut(indicator) = best.value.map(|value| IndicatorValue { year: best.year.clone(), value });
            }
        }
        snapshot
    }

    pub fn get(&self, indicator: Indicator) -> Option<&IndicatorValue> {
        match indicator {
            Indicator::Population => self.population.as_ref(),
            Indicator::MedianHouseholdIncome => self.median_household_income.as_ref(),
            Indicator::PersonsPerHousehold => self.persons_per_household.as_ref(),
            Indicator::MedianHomeValue => self.median_home_value.as_ref(),
            Indicator::PovertyRate => self.poverty_rate.as_ref(),
        }
    }

    fn slot_mut(&mut self, indicator: Indicator) -> &mut Option<IndicatorValue> {
        match indicator {
            Indicator::Population => &mut self.population,
            Indicator::MedianHouseholdIncome => &mut self.median_household_income,
            Indicator::PersonsPerHousehold => &mut self.persons_per_household,
            Indicator::MedianHomeValue => &mut self.median_home_value,
            Indicator::PovertyRate => &mut self.poverty_rate,
        }
    }
}

static YEAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d{4}").expect("valid regex"));

/// Sort key for year labels.
///
/// `2021` and `2017-2021` both end in 2021; a range ending in the same year
/// as a single year sorts before it because its start is earlier. Labels
/// without any four-digit year sort below every parseable label.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct YearKey<'a> {
    end: Option<u16>,
    start: Option<u16>,
    raw: &'a str,
}

impl<'a> YearKey<'a> {
    pub fn parse(raw: &'a str) -> Self {
        let years: Vec<u16> = YEAR.find_iter(raw).filter_map(|m| m.as_str().parse().ok()).collect();
        YearKey { end: years.last().copied(), start: years.first().copied(), raw }
    }
}

/// Pick the current observation among candidates of a single category.
///
/// With `year` set, only observations of exactly that year qualify;
/// otherwise the maximum year wins. Ties go to the larger value.
pub fn latest<'a>(
    candidates: impl Iterator<Item = &'a DemographicObservation>, year: Option<&str>,
) -> Option<&'a DemographicObservation> {
    candidates
        .filter(|o| o.value.is_some())
        .filter(|o| year.is_none_or(|y| o.year == y))
        .max_by(|a, b| {
            YearKey::parse(&a.year)
                .cmp(&YearKey::parse(&b.year))
                .then_with(|| compare_values(a.value, b.value))
        })
}

fn compare_values(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (a, b) => a.is_some().cmp(&b.is_some()),
    }
}
