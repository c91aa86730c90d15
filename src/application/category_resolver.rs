//! Category URL resolution
//!
//! Accepts `https://www.wildberries.ru/catalog/<seg>/<seg>...` in the forms
//! users actually paste (missing scheme, trailing slash, tracking query,
//! mixed case) and turns it into a normalised [`Category`].

use regex::Regex;
use url::{ParseError, Url};

use crate::application::errors::ResolveError;
use crate::domain::Category;

const ALLOWED_HOSTS: [&str; 2] = ["wildberries.ru", "www.wildberries.ru"];

/// Catalog sections that never list products
const UNSUPPORTED_SECTIONS: [&str; 5] = ["0", "aktsii", "novinki", "brands", "podarochnye-sertifikaty"];

#[derive(Debug, Clone)]
pub struct CategoryResolver {
    catalog_path: Regex,
    segment: Regex,
}

impl CategoryResolver {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            catalog_path: Regex::new(r"(?i)^/catalog/(.+?)/?$")?,
            segment: Regex::new(r"^[A-Za-z0-9_-]+$")?,
        })
    }

    pub fn resolve(&self, raw_url: &str) -> Result<Category, ResolveError> {
        let invalid = |reason: &str| ResolveError::InvalidUrl {
            url: raw_url.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = raw_url.trim();
        if trimmed.is_empty() {
            return Err(invalid("empty URL"));
        }

        // A scheme is only recognised at the start; links inside the query don't count
        let url = match Url::parse(trimmed) {
            Ok(url) => url,
            Err(ParseError::RelativeUrlWithoutBase) => Url::parse(&format!("https://{trimmed}"))
                .map_err(|e| invalid(&e.to_string()))?,
            Err(e) => return Err(invalid(&e.to_string())),
        };

        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid("scheme must be http or https"));
        }
        let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
        if !ALLOWED_HOSTS.contains(&host.as_str()) {
            return Err(invalid("not a Wildberries URL"));
        }

        let captures = self
            .catalog_path
            .captures(url.path())
            .ok_or_else(|| invalid("path is not /catalog/<category>"))?;
        let rest = captures.get(1).map_or("", |m| m.as_str());
        let segments: Vec<&str> = rest.split('/').collect();

        let first = segments.first().copied().unwrap_or_default().to_ascii_lowercase();
        if UNSUPPORTED_SECTIONS.contains(&first.as_str())
            || (!first.is_empty() && first.chars().all(|c| c.is_ascii_digit()))
        {
            return Err(ResolveError::UnsupportedCategory {
                category_id: rest.to_ascii_lowercase(),
                reason: format!("section '{first}' does not list products"),
            });
        }

        if let Some(bad) = segments.iter().find(|s| !self.segment.is_match(s)) {
            return Err(invalid(&format!("invalid path segment '{bad}'")));
        }

        let id = segments.join("/").to_ascii_lowercase();
        Ok(Category::new(id, raw_url.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    fn resolver() -> CategoryResolver {
        CategoryResolver::new().unwrap()
    }

    #[rstest]
    #[case("https://www.wildberries.ru/catalog/zhenshchinam/odezhda/platya", "zhenshchinam/odezhda/platya")]
    #[case("https://www.wildberries.ru/catalog/zhenshchinam/odezhda/platya/", "zhenshchinam/odezhda/platya")]
    #[case("http://wildberries.ru/catalog/obuv/muzhskaya", "obuv/muzhskaya")]
    #[case("www.wildberries.ru/catalog/detyam/igrushki", "detyam/igrushki")]
    #[case("  https://WWW.Wildberries.ru/catalog/Dom/Kuhnya?sort=popular&page=2#top  ", "dom/kuhnya")]
    #[case("https://www.wildberries.ru/catalog/elektronika", "elektronika")]
    #[case("www.wildberries.ru/catalog/obuv/muzhskaya?from=https://t.me/shop", "obuv/muzhskaya")]
    #[case("wildberries.ru/catalog/obuv/muzhskaya?ref=http://vk.com/wb#https://x", "obuv/muzhskaya")]
    fn resolves_catalog_urls(#[case] url: &str, #[case] expected: &str) {
        let category = resolver().resolve(url).unwrap();
        assert_eq!(category.id(), expected);
        assert_eq!(category.raw_url(), url);
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("not a url at all")]
    #[case("https://www.ozon.ru/catalog/zhenshchinam")]
    #[case("ftp://www.wildberries.ru/catalog/zhenshchinam")]
    #[case("https://www.wildberries.ru/")]
    #[case("https://www.wildberries.ru/catalog/")]
    #[case("https://www.wildberries.ru/catalog/zhenshchinam//platya")]
    #[case("https://www.wildberries.ru/catalog/zhenshchinam/plat.ya")]
    #[case("https://www.wildberries.ru/product/12345")]
    fn rejects_malformed_urls(#[case] url: &str) {
        assert!(matches!(
            resolver().resolve(url),
            Err(ResolveError::InvalidUrl { .. })
        ));
    }

    #[rstest]
    #[case("https://www.wildberries.ru/catalog/0/search.aspx?search=платье")]
    #[case("https://www.wildberries.ru/catalog/aktsii")]
    #[case("https://www.wildberries.ru/catalog/brands/nike")]
    #[case("https://www.wildberries.ru/catalog/123456/detail.aspx")]
    fn rejects_non_listing_sections(#[case] url: &str) {
        assert!(matches!(
            resolver().resolve(url),
            Err(ResolveError::UnsupportedCategory { .. })
        ));
    }

    proptest! {
        #[test]
        fn id_is_stable_across_url_variants(
            segments in prop::collection::vec("[a-z][a-z0-9_-]{0,11}", 1..5),
            trailing_slash in any::<bool>(),
            uppercase in any::<bool>(),
        ) {
            prop_assume!(!UNSUPPORTED_SECTIONS.contains(&segments[0].as_str()));
            let expected = segments.join("/");
            let mut path = expected.clone();
            if uppercase {
                path = path.to_uppercase();
            }
            if trailing_slash {
                path.push('/');
            }

            let resolver = resolver();
            let first = resolver.resolve(&format!("https://www.wildberries.ru/catalog/{path}")).unwrap();
            let second = resolver.resolve(&format!("wildberries.ru/catalog/{path}?page=3")).unwrap();
            prop_assert_eq!(first.id(), expected.as_str());
            prop_assert_eq!(first.id(), second.id());
        }

        #[test]
        fn foreign_hosts_are_always_invalid(
            host in "[a-z]{3,10}\\.(com|org|net)",
            path in "[a-z/]{0,20}",
        ) {
            let result = resolver().resolve(&format!("https://{host}/catalog/{path}"));
            let is_invalid = matches!(result, Err(ResolveError::InvalidUrl { .. }));
            prop_assert!(is_invalid);
        }
    }
}
