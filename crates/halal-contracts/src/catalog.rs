use indexmap::IndexSet;

use crate::products::{Product, ALL_CATEGORY, FAVORITES_CATEGORY};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CategorySelection {
    #[default]
    All,
    /// Pseudo-category: filters by favorite membership and ignores `Product::category`.
    Favorites,
    Category(String),
}

impl CategorySelection {
    pub fn parse(raw: &str) -> Self {
        let normalized = raw.trim().to_lowercase();
        match normalized.as_str() {
            "" | ALL_CATEGORY => Self::All,
            FAVORITES_CATEGORY | "favorites" => Self::Favorites,
            _ => Self::Category(crate::products::normalize_category(&normalized)),
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::All => ALL_CATEGORY,
            Self::Favorites => FAVORITES_CATEGORY,
            Self::Category(id) => id.as_str(),
        }
    }
}

/// In-memory product list plus the favorite-id relation.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    products: Vec<Product>,
    favorites: IndexSet<String>,
}

impl Catalog {
    pub fn new(products: Vec<Product>, favorites: impl IntoIterator<Item = String>) -> Self {
        Self {
            products,
            favorites: favorites.into_iter().collect(),
        }
    }

    pub fn products(&self) -> &[Product] {
        self.products.as_slice()
    }

    pub fn favorites(&self) -> Vec<String> {
        self.favorites.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Product> {
        self.products.iter().find(|product| product.id == id)
    }

    pub fn is_favorite(&self, id: &str) -> bool {
        self.favorites.contains(id)
    }

    /// Resolves an exact id, or an id prefix that matches exactly one product.
    pub fn resolve_id(&self, raw: &str) -> Option<&str> {
        let needle = raw.trim();
        if needle.is_empty() {
            return None;
        }
        if let Some(product) = self.get(needle) {
            return Some(product.id.as_str());
        }
        let mut matches = self
            .products
            .iter()
            .filter(|product| product.id.starts_with(needle));
        let first = matches.next()?;
        if matches.next().is_some() {
            return None;
        }
        Some(first.id.as_str())
    }

    pub fn filtered_view(&self, selection: &CategorySelection, search: &str) -> Vec<&Product> {
        let query = search.to_lowercase();
        self.products
            .iter()
            .filter(|product| match selection {
                CategorySelection::All => true,
                CategorySelection::Favorites => self.favorites.contains(&product.id),
                CategorySelection::Category(id) => product.category == *id,
            })
            .filter(|product| {
                query.is_empty()
                    || product.name.to_lowercase().contains(&query)
                    || product.brand.to_lowercase().contains(&query)
                    || product.id.to_lowercase().contains(&query)
            })
            .collect()
    }

    /// Prepends without de-duplication: repeated lookups are separate findings.
    pub fn merge(&mut self, product: Product) {
        self.products.insert(0, product);
    }

    /// Returns the new membership. Unknown ids are accepted.
    pub fn toggle_favorite(&mut self, id: &str) -> bool {
        if self.favorites.shift_remove(id) {
            return false;
        }
        self.favorites.insert(id.to_string());
        true
    }
}

#[cfg(test)]
mod tests {
    use crate::products::{DietaryStatus, Product};

    use super::{Catalog, CategorySelection};

    fn product(id: &str, name: &str, brand: &str, category: &str) -> Product {
        Product {
            id: id.to_string(),
            name: name.to_string(),
            brand: brand.to_string(),
            flavor: None,
            status: DietaryStatus::Halal,
            category: category.to_string(),
            image_url: String::new(),
            ingredients: Vec::new(),
            explanation: String::new(),
            religious_reference: None,
            is_boycotted: false,
            boycott_reason: None,
        }
    }

    fn sample() -> Catalog {
        Catalog::new(
            vec![
                product("p1", "Gummy Bears", "Haribo", "sweets"),
                product("p2", "Chips", "Lays", "snacks"),
                product("p3", "Chocolate Bar", "Alpen", "sweets"),
                product("e471", "Mono-diglycerides", "Additive", "e-numbers"),
            ],
            Vec::new(),
        )
    }

    fn ids(view: Vec<&Product>) -> Vec<String> {
        view.into_iter().map(|p| p.id.clone()).collect()
    }

    #[test]
    fn favorites_view_keeps_catalog_order() {
        let mut catalog = sample();
        catalog.toggle_favorite("p3");
        catalog.toggle_favorite("p1");
        let view = catalog.filtered_view(&CategorySelection::Favorites, "");
        assert_eq!(ids(view), vec!["p1", "p3"]);
    }

    #[test]
    fn favorites_selection_ignores_category_field() {
        let mut catalog = sample();
        catalog.toggle_favorite("p2");
        catalog.toggle_favorite("e471");
        let view = catalog.filtered_view(&CategorySelection::parse("favs"), "");
        assert_eq!(ids(view), vec!["p2", "e471"]);
    }

    #[test]
    fn search_matches_name_brand_or_id_case_insensitively() {
        let catalog = sample();
        assert_eq!(
            ids(catalog.filtered_view(&CategorySelection::All, "GUMMY")),
            vec!["p1"]
        );
        assert_eq!(
            ids(catalog.filtered_view(&CategorySelection::All, "lays")),
            vec!["p2"]
        );
        assert_eq!(
            ids(catalog.filtered_view(&CategorySelection::All, "E471")),
            vec!["e471"]
        );
    }

    #[test]
    fn category_and_search_compose_with_and() {
        let catalog = sample();
        let sweets = CategorySelection::Category("sweets".to_string());
        assert_eq!(ids(catalog.filtered_view(&sweets, "")), vec!["p1", "p3"]);
        assert_eq!(ids(catalog.filtered_view(&sweets, "alpen")), vec!["p3"]);
        assert!(catalog.filtered_view(&sweets, "lays").is_empty());
    }

    #[test]
    fn merge_places_product_first_without_dedup() {
        let mut catalog = sample();
        catalog.merge(product("n1", "Nutella", "Ferrero", "sweets"));
        catalog.merge(product("n2", "Nutella", "Ferrero", "sweets"));
        let view = ids(catalog.filtered_view(&CategorySelection::All, ""));
        assert_eq!(view[0], "n2");
        assert_eq!(view[1], "n1");
        assert_eq!(catalog.len(), 6);
    }

    #[test]
    fn toggle_favorite_twice_restores_membership() {
        let mut catalog = sample();
        assert!(catalog.toggle_favorite("p2"));
        assert!(!catalog.toggle_favorite("p2"));
        assert!(!catalog.is_favorite("p2"));
        assert!(catalog.favorites().is_empty());
    }

    #[test]
    fn orphan_favorite_has_no_visible_effect() {
        let mut catalog = sample();
        assert!(catalog.toggle_favorite("x"));
        assert_eq!(catalog.favorites(), vec!["x".to_string()]);
        assert!(catalog
            .filtered_view(&CategorySelection::Favorites, "")
            .is_empty());
        assert_eq!(catalog.filtered_view(&CategorySelection::All, "").len(), 4);
    }

    #[test]
    fn resolve_id_accepts_unique_prefix() {
        let catalog = sample();
        assert_eq!(catalog.resolve_id("e4"), Some("e471"));
        assert_eq!(catalog.resolve_id("p"), None);
        assert_eq!(catalog.resolve_id("p2"), Some("p2"));
        assert_eq!(catalog.resolve_id("zzz"), None);
    }

    #[test]
    fn selection_parse_recognizes_pseudo_categories() {
        assert_eq!(CategorySelection::parse(""), CategorySelection::All);
        assert_eq!(CategorySelection::parse("ALL"), CategorySelection::All);
        assert_eq!(CategorySelection::parse("favs"), CategorySelection::Favorites);
        assert_eq!(
            CategorySelection::parse("Sweets"),
            CategorySelection::Category("sweets".to_string())
        );
    }
}
