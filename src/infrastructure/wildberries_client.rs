//! Wildberries catalog client
//!
//! The main-menu JSON maps a category URL to the shard and listing filter the
//! catalog API needs. The menu is downloaded once per client and reused.

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

use crate::domain::{CatalogItem, CatalogNode, CatalogSource, Category, SourceError};
use crate::infrastructure::config::CatalogConfig;
use crate::infrastructure::http_client::HttpClient;

/// Raw main-menu node; `childs` is the upstream spelling
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct MenuNode {
    #[serde(default)]
    name: String,
    #[serde(default)]
    url: String,
    shard: Option<String>,
    query: Option<String>,
    #[serde(default)]
    childs: Vec<MenuNode>,
}

#[derive(Debug, Deserialize)]
struct ListingPayload {
    #[serde(default)]
    data: Option<ListingData>,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    products: Vec<ListingProduct>,
}

#[derive(Debug, Deserialize)]
struct ListingProduct {
    id: u64,
    name: Option<String>,
}

pub struct WildberriesClient {
    http: HttpClient,
    config: CatalogConfig,
    menu: OnceCell<Vec<MenuNode>>,
}

impl WildberriesClient {
    pub fn new(http: HttpClient, config: CatalogConfig) -> Self {
        Self {
            http,
            config,
            menu: OnceCell::new(),
        }
    }

    async fn menu(&self, cancel: &CancellationToken) -> Result<&[MenuNode], SourceError> {
        let nodes = self
            .menu
            .get_or_try_init(|| async {
                info!("📥 Downloading Wildberries main menu");
                let nodes: Vec<MenuNode> = self.http.get_json(&self.config.menu_url, cancel).await?;
                info!("Main menu loaded: {} top-level sections", nodes.len());
                Ok::<_, SourceError>(nodes)
            })
            .await?;
        Ok(nodes.as_slice())
    }

    /// Listing URL for one page of a category
    pub(crate) fn listing_url(&self, node: &CatalogNode, page: u32) -> Result<String, SourceError> {
        let base = self.config.listing_url_template.replace("{shard}", &node.shard);
        let mut url = Url::parse(&base).map_err(|e| SourceError::Malformed {
            url: base.clone(),
            message: e.to_string(),
        })?;

        url.query_pairs_mut()
            .append_pair("appType", "1")
            .append_pair("curr", "rub")
            .append_pair("dest", &self.config.dest.to_string())
            .append_pair("locale", "ru")
            .append_pair("page", &page.to_string())
            .append_pair("sort", &self.config.sort)
            .append_pair("spp", "0");

        // The menu's filter is already query-encoded (`cat=8126`, `subject=1;2`)
        let mut rendered = url.to_string();
        let filter = node.query.trim_start_matches(['?', '&']);
        if !filter.is_empty() {
            rendered.push('&');
            rendered.push_str(filter);
        }
        Ok(rendered)
    }
}

/// Depth-first search for the node whose URL matches `path`. A matching node
/// without a shard or filter is a section heading, not a listing.
pub(crate) fn find_node(nodes: &[MenuNode], path: &str) -> Option<CatalogNode> {
    let wanted = normalise_menu_url(path);
    let mut stack: Vec<&MenuNode> = nodes.iter().rev().collect();

    while let Some(node) = stack.pop() {
        if normalise_menu_url(&node.url) == wanted {
            return match (&node.shard, &node.query) {
                (Some(shard), Some(query)) if !shard.is_empty() && !query.is_empty() => {
                    Some(CatalogNode {
                        name: node.name.clone(),
                        shard: shard.clone(),
                        query: query.clone(),
                        url: node.url.clone(),
                    })
                }
                _ => None,
            };
        }
        stack.extend(node.childs.iter().rev());
    }
    None
}

fn normalise_menu_url(url: &str) -> String {
    let path = url
        .split_once("wildberries.ru")
        .map_or(url, |(_, rest)| rest);
    path.trim_end_matches('/').to_lowercase()
}

fn into_items(payload: ListingPayload) -> Vec<CatalogItem> {
    payload
        .data
        .map(|data| data.products)
        .unwrap_or_default()
        .into_iter()
        .map(|product| CatalogItem {
            id: product.id,
            name: product.name,
        })
        .collect()
}

#[async_trait]
impl CatalogSource for WildberriesClient {
    async fn locate(
        &self,
        category: &Category,
        cancel: &CancellationToken,
    ) -> Result<Option<CatalogNode>, SourceError> {
        let menu = self.menu(cancel).await?;
        let node = find_node(menu, &category.menu_path());
        match &node {
            Some(node) => info!("Found category: {} (shard: {})", node.name, node.shard),
            None => info!("Category not found in main menu: {}", category),
        }
        Ok(node)
    }

    async fn fetch_page(
        &self,
        node: &CatalogNode,
        page: u32,
        cancel: &CancellationToken,
    ) -> Result<Vec<CatalogItem>, SourceError> {
        let url = self.listing_url(node, page)?;
        let payload: ListingPayload = self.http.get_json(&url, cancel).await?;
        let items = into_items(payload);
        debug!("Page {}: received {} products", page, items.len());
        Ok(items)
    }
}
