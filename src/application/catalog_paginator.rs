//! Catalog pagination
//!
//! Walks listing pages 1, 2, ... of a category until a page brings no new
//! products, the page cap is reached, or a page fails for good. Each call to
//! [`CatalogPaginator::listings`] starts a fresh walk.

use std::collections::HashSet;
use std::pin::pin;
use std::sync::Arc;

use futures::stream::{self, Stream, StreamExt};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::errors::PaginationError;
use crate::domain::{
    CatalogItem, CatalogNode, CatalogSource, PagePosition, ProductId, ProductListing,
    ProgressEvent, ProgressSink, SourceError,
};
use crate::infrastructure::retry_policy::{RetryDecision, RetryError, RetryPolicy};

/// Terminal item of a listing stream
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PageFailure {
    #[error("page {page} unavailable: {reason}")]
    Unavailable { page: u32, reason: SourceError },

    #[error("pagination cancelled")]
    Cancelled,
}

struct PageCursor {
    next_page: u32,
    seen: HashSet<ProductId>,
    total: usize,
    finished: bool,
}

pub struct CatalogPaginator {
    source: Arc<dyn CatalogSource>,
    retry: RetryPolicy,
    max_pages: u32,
}

impl CatalogPaginator {
    pub fn new(source: Arc<dyn CatalogSource>, retry: RetryPolicy, max_pages: u32) -> Self {
        Self {
            source,
            retry,
            max_pages,
        }
    }

    /// Lazy stream of distinct listings in first-seen order. A failure is
    /// yielded once as the last item.
    pub fn listings<'a>(
        &'a self,
        node: &'a CatalogNode,
        cancel: &'a CancellationToken,
        progress: &'a ProgressSink,
    ) -> impl Stream<Item = Result<ProductListing, PageFailure>> + Send + 'a {
        let cursor = PageCursor {
            next_page: 1,
            seen: HashSet::new(),
            total: 0,
            finished: false,
        };

        stream::unfold(cursor, move |mut cursor| async move {
            if cursor.finished || cursor.next_page > self.max_pages {
                if !cursor.finished {
                    info!("Page cap of {} reached, stopping pagination", self.max_pages);
                }
                return None;
            }
            if cancel.is_cancelled() {
                cursor.finished = true;
                return Some((vec![Err(PageFailure::Cancelled)], cursor));
            }

            let page = cursor.next_page;
            let items = match self.fetch_page(node, page, cancel).await {
                Ok(items) => items,
                Err(failure) => {
                    cursor.finished = true;
                    return Some((vec![Err(failure)], cursor));
                }
            };

            let fresh = take_new(&mut cursor.seen, page, items);
            cursor.total += fresh.len();
            cursor.next_page += 1;

            info!(
                "Page {}: {} new products ({} total)",
                page,
                fresh.len(),
                cursor.total
            );
            progress.emit(ProgressEvent::PageFetched {
                page,
                new_products: fresh.len(),
                total_products: cursor.total,
            });

            if fresh.is_empty() {
                info!("Page {}: no new products, stopping pagination", page);
                cursor.finished = true;
            }
            Some((fresh.into_iter().map(Ok).collect::<Vec<_>>(), cursor))
        })
        .flat_map(stream::iter)
    }

    /// Drive the stream to the end. On a page failure the products collected
    /// so far travel with the error.
    pub async fn collect(
        &self,
        node: &CatalogNode,
        cancel: &CancellationToken,
        progress: &ProgressSink,
    ) -> Result<Vec<ProductListing>, PaginationError> {
        let mut stream = pin!(self.listings(node, cancel, progress));
        let mut listings = Vec::new();

        while let Some(item) = stream.next().await {
            match item {
                Ok(listing) => listings.push(listing),
                Err(PageFailure::Cancelled) => return Err(PaginationError::Cancelled),
                Err(PageFailure::Unavailable { page, reason }) => {
                    warn!(
                        "Catalog unavailable at page {} with {} products collected: {}",
                        page,
                        listings.len(),
                        reason
                    );
                    return Err(PaginationError::CatalogUnavailable {
                        partial: listings,
                        page,
                        reason,
                    });
                }
            }
        }

        Ok(listings)
    }

    async fn fetch_page(
        &self,
        node: &CatalogNode,
        page: u32,
        cancel: &CancellationToken,
    ) -> Result<Vec<CatalogItem>, PageFailure> {
        let label = format!("catalog page {page}");
        let source = &self.source;
        let result = self
            .retry
            .run(&label, cancel, retry_decision, move |attempt| {
                debug!("Fetching catalog page {} (attempt {})", page, attempt);
                source.fetch_page(node, page, cancel)
            })
            .await;

        match result {
            Ok(items) => Ok(items),
            Err(RetryError::Cancelled)
            | Err(RetryError::Permanent {
                error: SourceError::Cancelled,
                ..
            }) => Err(PageFailure::Cancelled),
            Err(RetryError::Exhausted { last: reason, .. })
            | Err(RetryError::Permanent { error: reason, .. }) => {
                Err(PageFailure::Unavailable { page, reason })
            }
        }
    }
}

/// Transient catalog errors are retried, honouring a server-requested delay
pub(crate) fn retry_decision(error: &SourceError) -> RetryDecision {
    if error.is_transient() {
        RetryDecision::Retry {
            after: error.retry_after(),
        }
    } else {
        RetryDecision::Stop
    }
}

/// Keep named products not seen on earlier pages, in page order
fn take_new(seen: &mut HashSet<ProductId>, page: u32, items: Vec<CatalogItem>) -> Vec<ProductListing> {
    let mut fresh = Vec::new();
    let mut nameless = 0usize;

    for (index, item) in items.into_iter().enumerate() {
        let Some(name) = item.name.filter(|name| !name.trim().is_empty()) else {
            nameless += 1;
            continue;
        };
        if seen.insert(item.id) {
            let index = u32::try_from(index).unwrap_or(u32::MAX);
            fresh.push(ProductListing::new(item.id, name, PagePosition::new(page, index)));
        }
    }

    if nameless > 0 {
        debug!("Page {}: skipped {} products without a name", page, nameless);
    }
    fresh
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Category;
    use async_trait::async_trait;
    use proptest::prelude::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Scripted catalog: page -> queue of responses (the last one repeats)
    struct ScriptedCatalog {
        pages: Mutex<HashMap<u32, Vec<Result<Vec<CatalogItem>, SourceError>>>>,
        calls: AtomicU32,
    }

    impl ScriptedCatalog {
        fn new(pages: Vec<(u32, Vec<Result<Vec<CatalogItem>, SourceError>>)>) -> Arc<Self> {
            Arc::new(Self {
                pages: Mutex::new(pages.into_iter().collect()),
                calls: AtomicU32::new(0),
            })
        }

        fn with_pages(pages: Vec<Vec<CatalogItem>>) -> Arc<Self> {
            Self::new(
                pages
                    .into_iter()
                    .zip(1..)
                    .map(|(items, page)| (page, vec![Ok(items)]))
                    .collect(),
            )
        }
    }

    #[async_trait]
    impl CatalogSource for ScriptedCatalog {
        async fn locate(
            &self,
            _category: &Category,
            _cancel: &CancellationToken,
        ) -> Result<Option<CatalogNode>, SourceError> {
            Ok(Some(node()))
        }

        async fn fetch_page(
            &self,
            _node: &CatalogNode,
            page: u32,
            _cancel: &CancellationToken,
        ) -> Result<Vec<CatalogItem>, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut pages = self.pages.lock().unwrap();
            match pages.get_mut(&page) {
                Some(queue) if queue.len() > 1 => queue.remove(0),
                Some(queue) => queue[0].clone(),
                None => Ok(Vec::new()),
            }
        }
    }

    fn node() -> CatalogNode {
        CatalogNode {
            name: "Платья".to_string(),
            shard: "bl_shirts".to_string(),
            query: "cat=8126".to_string(),
            url: "/catalog/zhenshchinam/odezhda/platya".to_string(),
        }
    }

    fn item(id: u64) -> CatalogItem {
        CatalogItem::new(id, format!("Товар {id}"))
    }

    fn ids(listings: &[ProductListing]) -> Vec<u64> {
        listings.iter().map(|l| l.product_id).collect()
    }

    fn timeout() -> SourceError {
        SourceError::Timeout {
            url: "https://catalog.wb.ru".to_string(),
        }
    }

    async fn collect(
        catalog: Arc<ScriptedCatalog>,
        max_pages: u32,
    ) -> Result<Vec<ProductListing>, PaginationError> {
        let paginator = CatalogPaginator::new(catalog, RetryPolicy::immediate(3), max_pages);
        paginator
            .collect(&node(), &CancellationToken::new(), &ProgressSink::disabled())
            .await
    }

    #[tokio::test]
    async fn overlapping_pages_are_deduplicated_in_first_seen_order() {
        let catalog = ScriptedCatalog::with_pages(vec![
            vec![item(1), item(2)],
            vec![item(2), item(3)],
            vec![],
        ]);
        let listings = collect(catalog.clone(), 10).await.unwrap();
        assert_eq!(ids(&listings), vec![1, 2, 3]);
        assert_eq!(listings[2].position, PagePosition::new(2, 1));
        assert_eq!(catalog.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn page_with_only_known_products_stops_pagination() {
        let catalog = ScriptedCatalog::with_pages(vec![
            vec![item(1), item(2)],
            vec![item(1), item(2)],
            vec![item(3)],
        ]);
        let listings = collect(catalog.clone(), 10).await.unwrap();
        assert_eq!(ids(&listings), vec![1, 2]);
        assert_eq!(catalog.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn page_cap_is_respected() {
        let catalog = ScriptedCatalog::with_pages((1..=5).map(|p| vec![item(p)]).collect());
        let listings = collect(catalog.clone(), 2).await.unwrap();
        assert_eq!(ids(&listings), vec![1, 2]);
        assert_eq!(catalog.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn nameless_products_are_skipped() {
        let catalog = ScriptedCatalog::with_pages(vec![vec![
            item(1),
            CatalogItem { id: 2, name: None },
            CatalogItem::new(3, "   "),
        ]]);
        let listings = collect(catalog, 10).await.unwrap();
        assert_eq!(ids(&listings), vec![1]);
    }

    #[tokio::test]
    async fn transient_page_error_is_retried() {
        let catalog = ScriptedCatalog::new(vec![(1, vec![Err(timeout()), Ok(vec![item(7)])])]);
        let listings = collect(catalog.clone(), 10).await.unwrap();
        assert_eq!(ids(&listings), vec![7]);
        // page 1 twice, then the empty page 2
        assert_eq!(catalog.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_return_partial_listings() {
        let catalog = ScriptedCatalog::new(vec![
            (1, vec![Ok(vec![item(1), item(2)])]),
            (2, vec![Err(timeout())]),
        ]);
        match collect(catalog.clone(), 10).await {
            Err(PaginationError::CatalogUnavailable { partial, page, reason }) => {
                assert_eq!(ids(&partial), vec![1, 2]);
                assert_eq!(page, 2);
                assert_eq!(reason, timeout());
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(catalog.calls.load(Ordering::SeqCst), 1 + 3);
    }

    #[tokio::test]
    async fn permanent_page_error_is_not_retried() {
        let not_found = SourceError::HttpStatus {
            status: 404,
            url: "https://catalog.wb.ru".to_string(),
        };
        let catalog = ScriptedCatalog::new(vec![(1, vec![Err(not_found)])]);
        let result = collect(catalog.clone(), 10).await;
        assert!(matches!(
            result,
            Err(PaginationError::CatalogUnavailable { page: 1, .. })
        ));
        assert_eq!(catalog.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelled_before_start_fetches_nothing() {
        let catalog = ScriptedCatalog::with_pages(vec![vec![item(1)]]);
        let paginator = CatalogPaginator::new(catalog.clone(), RetryPolicy::immediate(3), 10);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = paginator
            .collect(&node(), &cancel, &ProgressSink::disabled())
            .await;
        assert_eq!(result, Err(PaginationError::Cancelled));
        assert_eq!(catalog.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn each_run_starts_from_page_one() {
        let catalog = ScriptedCatalog::with_pages(vec![vec![item(1)], vec![]]);
        let paginator = CatalogPaginator::new(catalog, RetryPolicy::immediate(1), 10);
        let cancel = CancellationToken::new();
        let progress = ProgressSink::disabled();
        let first = paginator.collect(&node(), &cancel, &progress).await.unwrap();
        let second = paginator.collect(&node(), &cancel, &progress).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn page_progress_is_reported() {
        let catalog = ScriptedCatalog::with_pages(vec![vec![item(1), item(2)], vec![]]);
        let paginator = CatalogPaginator::new(catalog, RetryPolicy::immediate(1), 10);
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        paginator
            .collect(&node(), &CancellationToken::new(), &ProgressSink::new(tx))
            .await
            .unwrap();

        assert_eq!(
            rx.recv().await,
            Some(ProgressEvent::PageFetched {
                page: 1,
                new_products: 2,
                total_products: 2
            })
        );
        assert_eq!(
            rx.recv().await,
            Some(ProgressEvent::PageFetched {
                page: 2,
                new_products: 0,
                total_products: 2
            })
        );
    }

    proptest! {
        #[test]
        fn never_yields_duplicate_ids(pages in prop::collection::vec(prop::collection::vec(0u64..30, 0..8), 0..6)) {
            let mut seen = HashSet::new();
            let mut all = Vec::new();
            for (page, ids) in pages.into_iter().enumerate() {
                let items = ids.into_iter().map(item).collect();
                all.extend(take_new(&mut seen, u32::try_from(page).unwrap() + 1, items));
            }
            let unique: HashSet<u64> = all.iter().map(|l| l.product_id).collect();
            prop_assert_eq!(unique.len(), all.len());
        }
    }
}
