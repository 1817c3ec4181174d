//! Categorical grouping variables.
//!
//! Group and time-point labels arrive with inconsistent casing, spacing, and
//! one known alias, so each enum owns its normalization and rejects anything
//! outside its fixed level set at parse time.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Experimental arm. Unordered nominal category with a fixed label set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Group {
    Control,
    Atm,
    AtmRt,
    Rt,
}

impl Group {
    /// All levels, in declaration order. The last level is the one sum
    /// coding drops.
    pub const ALL: [Group; 4] = [Group::Control, Group::Atm, Group::AtmRt, Group::Rt];

    /// Canonical label.
    pub fn label(&self) -> &'static str {
        match self {
            Group::Control => "CONTROL",
            Group::Atm => "ATM",
            Group::AtmRt => "ATM+RT",
            Group::Rt => "RT",
        }
    }

    /// Parse a raw group label: strip, drop internal whitespace, uppercase,
    /// canonicalize the `ATM-RT` alias, then match against the level set.
    pub fn parse_label(raw: &str) -> Result<Group> {
        let mut label: String = raw
            .trim()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_uppercase();
        if label == "ATM-RT" {
            label = "ATM+RT".to_string();
        }
        match label.as_str() {
            "CONTROL" => Ok(Group::Control),
            "ATM" => Ok(Group::Atm),
            "ATM+RT" => Ok(Group::AtmRt),
            "RT" => Ok(Group::Rt),
            _ => bail!("Unknown group label: {:?}", raw),
        }
    }
}

/// Imaging time point. Ordered category with a fixed four-value sequence;
/// the declaration order is the time order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TimePoint {
    Baseline,
    Month2,
    Month4,
    Month6,
}

impl TimePoint {
    /// All levels, in time order.
    pub const ALL: [TimePoint; 4] = [
        TimePoint::Baseline,
        TimePoint::Month2,
        TimePoint::Month4,
        TimePoint::Month6,
    ];

    /// Canonical label.
    pub fn label(&self) -> &'static str {
        match self {
            TimePoint::Baseline => "Baseline",
            TimePoint::Month2 => "Month 2",
            TimePoint::Month4 => "Month 4",
            TimePoint::Month6 => "Month 6",
        }
    }

    /// Parse a raw time-point label: strip, collapse internal whitespace,
    /// title-case each word, then match against the level set.
    pub fn parse_label(raw: &str) -> Result<TimePoint> {
        let label = raw
            .split_whitespace()
            .map(title_case)
            .collect::<Vec<_>>()
            .join(" ");
        match label.as_str() {
            "Baseline" => Ok(TimePoint::Baseline),
            "Month 2" => Ok(TimePoint::Month2),
            "Month 4" => Ok(TimePoint::Month4),
            "Month 6" => Ok(TimePoint::Month6),
            _ => bail!("Unknown time point label: {:?}", raw),
        }
    }
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => {
            first.to_uppercase().collect::<String>() + chars.as_str().to_lowercase().as_str()
        }
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_parse_canonical() {
        assert_eq!(Group::parse_label("CONTROL").unwrap(), Group::Control);
        assert_eq!(Group::parse_label("ATM+RT").unwrap(), Group::AtmRt);
        assert_eq!(Group::parse_label("RT").unwrap(), Group::Rt);
    }

    #[test]
    fn test_group_parse_normalizes() {
        assert_eq!(Group::parse_label("  control ").unwrap(), Group::Control);
        assert_eq!(Group::parse_label("atm + rt").unwrap(), Group::AtmRt);
        assert_eq!(Group::parse_label("Atm").unwrap(), Group::Atm);
    }

    #[test]
    fn test_group_parse_alias() {
        assert_eq!(Group::parse_label("ATM-RT").unwrap(), Group::AtmRt);
        assert_eq!(Group::parse_label("atm - rt").unwrap(), Group::AtmRt);
    }

    #[test]
    fn test_group_parse_unknown() {
        assert!(Group::parse_label("SHAM").is_err());
        assert!(Group::parse_label("").is_err());
    }

    #[test]
    fn test_time_parse() {
        assert_eq!(TimePoint::parse_label("Baseline").unwrap(), TimePoint::Baseline);
        assert_eq!(TimePoint::parse_label("month 2").unwrap(), TimePoint::Month2);
        assert_eq!(TimePoint::parse_label("  MONTH   6 ").unwrap(), TimePoint::Month6);
        assert!(TimePoint::parse_label("Week 3").is_err());
    }

    #[test]
    fn test_time_ordering() {
        assert!(TimePoint::Baseline < TimePoint::Month2);
        assert!(TimePoint::Month2 < TimePoint::Month4);
        assert!(TimePoint::Month4 < TimePoint::Month6);
    }

    #[test]
    fn test_labels_round_trip() {
        for g in Group::ALL {
            assert_eq!(Group::parse_label(g.label()).unwrap(), g);
        }
        for t in TimePoint::ALL {
            assert_eq!(TimePoint::parse_label(t.label()).unwrap(), t);
        }
    }
}
