use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed set of waste categories the classifier can report.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WasteCategory {
    Bottle,
    PlasticBag,
    Can,
    Cup,
    Trash,
}

impl WasteCategory {
    pub const ALL: [WasteCategory; 5] = [
        WasteCategory::Bottle,
        WasteCategory::PlasticBag,
        WasteCategory::Can,
        WasteCategory::Cup,
        WasteCategory::Trash,
    ];

    /// Stable wire name, identical to the serde representation.
    pub fn as_str(self) -> &'static str {
        match self {
            WasteCategory::Bottle => "bottle",
            WasteCategory::PlasticBag => "plastic_bag",
            WasteCategory::Can => "can",
            WasteCategory::Cup => "cup",
            WasteCategory::Trash => "trash",
        }
    }

    /// Human-readable label for overlays and reports.
    pub fn label(self) -> &'static str {
        match self {
            WasteCategory::Bottle => "Bottle",
            WasteCategory::PlasticBag => "Plastic Bag",
            WasteCategory::Can => "Can",
            WasteCategory::Cup => "Cup",
            WasteCategory::Trash => "General Trash",
        }
    }

    /// Legend colour used by map markers and the composition chart.
    pub fn color(self) -> &'static str {
        match self {
            WasteCategory::Bottle => "#3b82f6",
            WasteCategory::PlasticBag => "#9ca3af",
            WasteCategory::Can => "#ef4444",
            WasteCategory::Cup => "#f59e0b",
            WasteCategory::Trash => "#10b981",
        }
    }
}

impl fmt::Display for WasteCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WasteCategory {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        let normalized = value.trim().to_lowercase().replace([' ', '-'], "_");
        WasteCategory::ALL
            .into_iter()
            .find(|category| category.as_str() == normalized)
            .ok_or_else(|| anyhow!("unknown waste category '{}'", value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wire_names_and_loose_spellings() {
        assert_eq!("bottle".parse::<WasteCategory>().unwrap(), WasteCategory::Bottle);
        assert_eq!(
            "Plastic Bag".parse::<WasteCategory>().unwrap(),
            WasteCategory::PlasticBag
        );
        assert_eq!(
            "plastic-bag".parse::<WasteCategory>().unwrap(),
            WasteCategory::PlasticBag
        );
        assert!("tyre".parse::<WasteCategory>().is_err());
    }

    #[test]
    fn serde_uses_snake_case_names() {
        let json = serde_json::to_string(&WasteCategory::PlasticBag).unwrap();
        assert_eq!(json, "\"plastic_bag\"");
        for category in WasteCategory::ALL {
            let json = serde_json::to_string(&category).unwrap();
            assert_eq!(json, format!("\"{}\"", category.as_str()));
        }
    }
}
