use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

const SEED_PRODUCTS_JSON: &str = include_str!("../resources/seed_products.json");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DietaryStatus {
    Halal,
    Haram,
    Mushbooh,
}

impl DietaryStatus {
    pub const ALL: [DietaryStatus; 3] = [Self::Halal, Self::Haram, Self::Mushbooh];

    pub fn code(self) -> &'static str {
        match self {
            Self::Halal => "HALAL",
            Self::Haram => "HARAM",
            Self::Mushbooh => "MUSHBOOH",
        }
    }
}

impl fmt::Display for DietaryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for DietaryStatus {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|status| status.code() == normalized)
            .ok_or_else(|| format!("unknown dietary status '{}'", raw.trim()))
    }
}

/// One catalog entry. Field names follow the persisted JSON layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub name: String,
    pub brand: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flavor: Option<String>,
    pub status: DietaryStatus,
    pub category: String,
    pub image_url: String,
    pub ingredients: Vec<String>,
    pub explanation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub religious_reference: Option<String>,
    #[serde(default)]
    pub is_boycotted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boycott_reason: Option<String>,
}

/// Oracle output before an id and image reference are assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductFragment {
    pub name: String,
    pub brand: String,
    pub flavor: Option<String>,
    pub status: DietaryStatus,
    pub category: String,
    pub ingredients: Vec<String>,
    pub explanation: String,
    pub religious_reference: Option<String>,
}

impl ProductFragment {
    pub fn into_product(self, id: impl Into<String>, image_url: impl Into<String>) -> Product {
        Product {
            id: id.into(),
            name: self.name,
            brand: self.brand,
            flavor: self.flavor,
            status: self.status,
            category: normalize_category(&self.category),
            image_url: image_url.into(),
            ingredients: self.ingredients,
            explanation: self.explanation,
            religious_reference: self.religious_reference,
            is_boycotted: false,
            boycott_reason: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategorySpec {
    pub id: &'static str,
    pub icon: &'static str,
}

pub const ALL_CATEGORY: &str = "all";
pub const FAVORITES_CATEGORY: &str = "favs";

pub const CATEGORIES: &[CategorySpec] = &[
    CategorySpec {
        id: "all",
        icon: "🌍",
    },
    CategorySpec {
        id: "snacks",
        icon: "🍿",
    },
    CategorySpec {
        id: "sweets",
        icon: "🍬",
    },
    CategorySpec {
        id: "drinks",
        icon: "🥤",
    },
    CategorySpec {
        id: "dairy",
        icon: "🥛",
    },
    CategorySpec {
        id: "meat",
        icon: "🥩",
    },
    CategorySpec {
        id: "e-numbers",
        icon: "🧪",
    },
    CategorySpec {
        id: "sauces",
        icon: "🥫",
    },
    CategorySpec {
        id: "frozen",
        icon: "🧊",
    },
    CategorySpec {
        id: "bakery",
        icon: "🥖",
    },
    CategorySpec {
        id: "baby",
        icon: "🍼",
    },
    CategorySpec {
        id: "favs",
        icon: "❤️",
    },
];

pub fn is_known_category(id: &str) -> bool {
    CATEGORIES
        .iter()
        .any(|spec| spec.id == id && spec.id != ALL_CATEGORY && spec.id != FAVORITES_CATEGORY)
}

/// Maps free-form category text onto the fixed category ids.
///
/// Unknown values are kept in normalized form so the product still shows up
/// under `all`.
pub fn normalize_category(raw: &str) -> String {
    let normalized = raw
        .trim()
        .to_lowercase()
        .replace(['_', ' '], "-");
    let aliases = [
        ("e-number", "e-numbers"),
        ("e-codes", "e-numbers"),
        ("e-code", "e-numbers"),
        ("additive", "e-numbers"),
        ("additives", "e-numbers"),
        ("snack", "snacks"),
        ("sweet", "sweets"),
        ("candy", "sweets"),
        ("confectionery", "sweets"),
        ("drink", "drinks"),
        ("beverage", "drinks"),
        ("beverages", "drinks"),
        ("milk", "dairy"),
        ("sauce", "sauces"),
        ("condiments", "sauces"),
        ("frozen-food", "frozen"),
        ("bread", "bakery"),
        ("baby-food", "baby"),
    ];
    if let Some((_, mapped)) = aliases.iter().find(|(alias, _)| *alias == normalized) {
        return (*mapped).to_string();
    }
    normalized
}

pub fn seed_products() -> Vec<Product> {
    serde_json::from_str(SEED_PRODUCTS_JSON).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!(" haram ".parse::<DietaryStatus>(), Ok(DietaryStatus::Haram));
        assert_eq!("Mushbooh".parse::<DietaryStatus>(), Ok(DietaryStatus::Mushbooh));
        assert!("KOSHER".parse::<DietaryStatus>().is_err());
    }

    #[test]
    fn product_serializes_with_storage_field_names() -> anyhow::Result<()> {
        let product = Product {
            id: "abc".to_string(),
            name: "Water".to_string(),
            brand: "Spring".to_string(),
            flavor: None,
            status: DietaryStatus::Halal,
            category: "drinks".to_string(),
            image_url: "https://example.test/water.jpg".to_string(),
            ingredients: Vec::new(),
            explanation: "Plain water.".to_string(),
            religious_reference: None,
            is_boycotted: false,
            boycott_reason: None,
        };
        let value = serde_json::to_value(&product)?;
        assert_eq!(value["imageUrl"], json!("https://example.test/water.jpg"));
        assert_eq!(value["status"], json!("HALAL"));
        assert_eq!(value["ingredients"], json!([]));
        assert_eq!(value.get("religiousReference"), None);
        Ok(())
    }

    #[test]
    fn product_without_ingredients_is_rejected() {
        let raw = json!({
            "id": "x",
            "name": "n",
            "brand": "b",
            "status": "HALAL",
            "category": "snacks",
            "imageUrl": "",
            "explanation": ""
        });
        assert!(serde_json::from_value::<Product>(raw).is_err());
    }

    #[test]
    fn normalize_category_maps_aliases() {
        assert_eq!(normalize_category("Sweets"), "sweets");
        assert_eq!(normalize_category("E_Number"), "e-numbers");
        assert_eq!(normalize_category(" Baby food "), "baby");
        assert_eq!(normalize_category("Spices"), "spices");
    }

    #[test]
    fn seed_catalog_is_well_formed() {
        let seed = seed_products();
        assert!(!seed.is_empty());
        let mut ids = seed.iter().map(|p| p.id.as_str()).collect::<Vec<&str>>();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), seed.len());
        assert!(seed.iter().all(|p| is_known_category(&p.category)));
        let raw: Value = serde_json::from_str(SEED_PRODUCTS_JSON).unwrap_or(Value::Null);
        assert!(raw.is_array());
    }
}
