use serde::{Deserialize, Serialize};
use std::fmt;

/// A catalog category resolved from user input.
///
/// Only [`crate::application::CategoryResolver`] creates these, so an
/// instance always carries a validated, normalised id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Category {
    id: String,
    raw_url: String,
}

impl Category {
    pub(crate) fn new(id: String, raw_url: String) -> Self {
        Self { id, raw_url }
    }

    /// Catalog path below `/catalog/`, e.g. `zhenshchinam/odezhda/platya`
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The URL exactly as the caller supplied it
    pub fn raw_url(&self) -> &str {
        &self.raw_url
    }

    /// Relative menu URL (`/catalog/<id>`) used to find the category in the main menu
    pub fn menu_path(&self) -> String {
        format!("/catalog/{}", self.id)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// Main-menu node that tells the listing API where a category lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogNode {
    pub name: String,
    pub shard: String,
    /// Listing filter, e.g. `cat=8126`
    pub query: String,
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn menu_path_is_rooted_under_catalog() {
        let category = Category::new(
            "zhenshchinam/odezhda/platya".to_string(),
            "https://www.wildberries.ru/catalog/zhenshchinam/odezhda/platya".to_string(),
        );
        assert_eq!(category.menu_path(), "/catalog/zhenshchinam/odezhda/platya");
        assert_eq!(category.to_string(), "zhenshchinam/odezhda/platya");
    }
}
