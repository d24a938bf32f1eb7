//! Location and observation records plus the typed query results.

use crate::Error;
use crate::geometry::Geometry;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

/// Location category.
///
/// Variants are declared alphabetically so the derived ordering matches the
/// lexicographic ordering of their names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LocationKind {
    City,
    County,
    State,
    Town,
    Zip,
}

impl LocationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocationKind::City => "city",
            LocationKind::County => "county",
            LocationKind::State => "state",
            LocationKind::Town => "town",
            LocationKind::Zip => "zip",
        }
    }
}

impl fmt::Display for LocationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LocationKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s.trim().to_ascii_lowercase().as_str() {
            "city" => Ok(LocationKind::City),
            "state" => Ok(LocationKind::State),
            "county" => Ok(LocationKind::County),
            "town" => Ok(LocationKind::Town),
            "zip" => Ok(LocationKind::Zip),
            other => Err(Error::InvalidArgument(format!(
                "unknown location type '{other}' (expected one of city, state, county, town, zip)"
            ))),
        }
    }
}

/// Set of location categories a query is restricted to.
///
/// An absent or empty filter means every category. Kinds are kept sorted so
/// that equal filters compare and serialize identically.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TypeFilter {
    #[default]
    All,
    Only(BTreeSet<LocationKind>),
}

impl TypeFilter {
    /// Parse a client-supplied filter.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for unknown category names.
    pub fn parse(raw: Option<&[String]>) -> Result<Self, Error> {
        let Some(raw) = raw.filter(|r| !r.is_empty()) else {
            return Ok(TypeFilter::All);
        };
        let kinds = raw
            .iter()
            .map(|s| s.parse::<LocationKind>())
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(TypeFilter::Only(kinds))
    }

    pub fn only(kinds: impl IntoIterator<Item = LocationKind>) -> Self {
        let kinds: BTreeSet<_> = kinds.into_iter().collect();
        if kinds.is_empty() { TypeFilter::All } else { TypeFilter::Only(kinds) }
    }

    pub fn matches(&self, kind: LocationKind) -> bool {
        match self {
            TypeFilter::All => true,
            TypeFilter::Only(kinds) => kinds.contains(&kind),
        }
    }

    /// Canonical text form: `all` or the sorted kind names joined by commas.
    pub fn canonical(&self) -> String {
        match self {
            TypeFilter::All => "all".to_string(),
            TypeFilter::Only(kinds) => kinds.iter().map(LocationKind::as_str).collect::<Vec<_>>().join(","),
        }
    }
}

/// A named place with optional geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Location {
    pub location_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: LocationKind,
    #[serde(default)]
    pub fips_code: Option<String>,
    /// Weak reference to the enclosing location.
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub geometry: Option<Geometry>,
    /// RFC 3339 timestamp of the scrape that produced this record.
    #[serde(default)]
    pub scraped_at: Option<String>,
}

/// A `Nearby` result row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LocationWithDistance {
    #[serde(flatten)]
    pub location: Location,
    pub distance_meters: f64,
}

/// A `Containing` result row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LocationWithArea {
    #[serde(flatten)]
    pub location: Location,
    /// Geodesic area of the location's geometry; zero for points.
    pub area_square_meters: f64,
}

/// One scraped demographic value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DemographicObservation {
    pub id: i64,
    pub location_id: String,
    /// Normalized label, see [`normalize_category`].
    pub category: String,
    /// Label as scraped.
    pub raw_category: String,
    /// A single year (`2021`) or a range (`2017-2021`).
    pub year: String,
    pub value: Option<f64>,
}

/// Year-by-year values of one category at one location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TimeSeries {
    pub location_id: String,
    pub name: String,
    pub category: String,
    pub values: BTreeMap<String, Option<f64>>,
}

/// One location's value in a cross-location comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ComparisonEntry {
    pub name: String,
    pub category: String,
    pub year: String,
    pub value: Option<f64>,
}

/// Comparison results keyed by location ID.
pub type Comparison = BTreeMap<String, ComparisonEntry>;

static NON_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w\s]").expect("valid regex"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Normalize a scraped category label.
///
/// Strips punctuation, lower-cases, and joins words with underscores, so
/// `"Median Household Income ($)"` becomes `median_household_income`.
pub fn normalize_category(label: &str) -> String {
    let stripped = NON_WORD.replace_all(label, "");
    let lowered = stripped.trim().to_lowercase();
    WHITESPACE.replace_all(&lowered, "_").into_owned()
}
