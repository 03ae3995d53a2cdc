//! Unit and adjustment-direction types
//!
//! Ingredients and line items are measured in one of three units. Weights are
//! summed as plain numbers regardless of unit, so the unit is a label rather
//! than a conversion input.

use serde::{Deserialize, Serialize};

/// Unit of measure for ingredients and line items
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Unit {
    /// Grams (solids)
    #[default]
    #[serde(rename = "g")]
    Grams,
    /// Millilitres (liquids)
    #[serde(rename = "ml")]
    Millilitres,
    /// Discrete units (eggs, buns)
    #[serde(rename = "un")]
    Units,
}

impl Unit {
    /// Database / wire tag
    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::Grams => "g",
            Unit::Millilitres => "ml",
            Unit::Units => "un",
        }
    }

    /// Human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            Unit::Grams => "Grama (g)",
            Unit::Millilitres => "Mililitro (ml)",
            Unit::Units => "Unidade (un)",
        }
    }

    /// Parse a unit tag, accepting common spellings
    pub fn parse(s: &str) -> Option<Self> {
        let lower = s.to_lowercase();
        match lower.trim() {
            "g" | "gram" | "grams" | "grama" | "gramas" => Some(Unit::Grams),
            "ml" | "milliliter" | "millilitre" | "mililitro" | "mililitros" => {
                Some(Unit::Millilitres)
            }
            "un" | "unit" | "units" | "unidade" | "unidades" | "each" | "count" => {
                Some(Unit::Units)
            }
            _ => None,
        }
    }

    /// Parse a stored tag, falling back to grams
    pub fn from_str(s: &str) -> Self {
        Self::parse(s).unwrap_or_default()
    }
}

impl std::fmt::Display for Unit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the cooking index shrinks (`menos`) or grows (`mais`) the item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CookingDirection {
    /// Weight loss while cooking
    #[default]
    Menos,
    /// Weight gain while cooking
    Mais,
}

impl CookingDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            CookingDirection::Menos => "menos",
            CookingDirection::Mais => "mais",
        }
    }

    /// Anything other than `mais` is treated as `menos`
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().trim() {
            "mais" | "+" => CookingDirection::Mais,
            _ => CookingDirection::Menos,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_units() {
        assert_eq!(Unit::parse("g"), Some(Unit::Grams));
        assert_eq!(Unit::parse(" ML "), Some(Unit::Millilitres));
        assert_eq!(Unit::parse("unidade"), Some(Unit::Units));
        assert_eq!(Unit::parse("cup"), None);
        assert_eq!(Unit::from_str("cup"), Unit::Grams);
    }

    #[test]
    fn test_unit_serde_tags() {
        assert_eq!(serde_json::to_string(&Unit::Millilitres).unwrap(), r#""ml""#);
        let unit: Unit = serde_json::from_str(r#""un""#).unwrap();
        assert_eq!(unit, Unit::Units);
    }

    #[test]
    fn test_direction_fallback() {
        assert_eq!(CookingDirection::from_str("mais"), CookingDirection::Mais);
        assert_eq!(CookingDirection::from_str("menos"), CookingDirection::Menos);
        assert_eq!(CookingDirection::from_str("sideways"), CookingDirection::Menos);
    }
}
