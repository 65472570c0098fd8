//! Lazy traversal of paged collections.
//!
//! A collection page may list members under `items`, `orderedItems`, both, or
//! neither, and may continue through `first` and `next` links. Each page is
//! drained (both keys) before its links are followed, depth first with
//! `first` ahead of `next`. Pages are not deduplicated; a cycle of `next`
//! links is bounded only by the item cap.

use std::collections::VecDeque;

use apconform::document::{value_list, value_uri};
use apconform::{Document, Prop};
use serde_json::Value;
use tracing::debug;

use crate::client::Fetcher;
use crate::error::EngineError;

enum Page {
    Uri(String),
    Inline(Document),
}

/// A single pass over a collection. Restart by building a new walker.
pub struct CollectionWalker<'a, F: Fetcher + ?Sized> {
    fetcher: &'a F,
    pages: Vec<Page>,
    pending: VecDeque<String>,
    yielded: usize,
    max_items: usize,
}

impl<'a, F: Fetcher + ?Sized> CollectionWalker<'a, F> {
    pub fn new(fetcher: &'a F, collection_uri: impl Into<String>, max_items: usize) -> Self {
        Self {
            fetcher,
            pages: vec![Page::Uri(collection_uri.into())],
            pending: VecDeque::new(),
            yielded: 0,
            max_items,
        }
    }

    /// Number of identifiers yielded so far.
    pub fn yielded(&self) -> usize {
        self.yielded
    }

    /// The next member identifier, or `None` when the collection is
    /// exhausted or the cap is reached.
    pub async fn next(&mut self) -> Result<Option<String>, EngineError> {
        loop {
            if self.yielded >= self.max_items {
                return Ok(None);
            }
            if let Some(id) = self.pending.pop_front() {
                self.yielded += 1;
                return Ok(Some(id));
            }
            let Some(page) = self.pages.pop() else {
                return Ok(None);
            };
            let doc = match page {
                Page::Uri(uri) => {
                    debug!("paginator: fetching page {uri}");
                    self.fetcher.get_json(&uri).await?
                }
                Page::Inline(doc) => doc,
            };
            self.load_page(&doc);
        }
    }

    fn load_page(&mut self, doc: &Document) {
        for key in [Prop::Items, Prop::OrderedItems] {
            if let Some(value) = doc.get(key) {
                self.pending
                    .extend(value_list(value).into_iter().filter_map(value_uri).map(str::to_string));
            }
        }
        // Stack: push `next` first so `first` is walked first.
        for link in [Prop::Next, Prop::First] {
            match doc.get(link) {
                Some(Value::String(uri)) => self.pages.push(Page::Uri(uri.clone())),
                Some(Value::Object(map)) => {
                    let page = Document::from(map.clone());
                    let has_members = page.has(Prop::Items) || page.has(Prop::OrderedItems);
                    match page.id() {
                        Some(uri) if !has_members => self.pages.push(Page::Uri(uri.to_string())),
                        _ => self.pages.push(Page::Inline(page)),
                    }
                }
                _ => {}
            }
        }
    }
}

/// Every identifier in the collection, up to `max_items`.
pub async fn collection_ids<F: Fetcher + ?Sized>(
    fetcher: &F,
    collection_uri: &str,
    max_items: usize,
) -> Result<Vec<String>, EngineError> {
    let mut walker = CollectionWalker::new(fetcher, collection_uri, max_items);
    let mut ids = Vec::new();
    while let Some(id) = walker.next().await? {
        ids.push(id);
    }
    Ok(ids)
}

/// `true` if `target` appears in the collection. Stops at the first match;
/// a negative answer always comes from a full traversal.
pub async fn collection_contains<F: Fetcher + ?Sized>(
    fetcher: &F,
    collection_uri: &str,
    target: &str,
    max_items: usize,
) -> Result<bool, EngineError> {
    let mut walker = CollectionWalker::new(fetcher, collection_uri, max_items);
    while let Some(id) = walker.next().await? {
        if id == target {
            return Ok(true);
        }
    }
    Ok(false)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    /// In-memory pages keyed by URI; counts fetches.
    #[derive(Default)]
    struct Pages {
        docs: HashMap<String, Value>,
        fetches: Mutex<Vec<String>>,
    }

    impl Pages {
        fn with(mut self, uri: &str, doc: Value) -> Self {
            self.docs.insert(uri.to_string(), doc);
            self
        }

        fn fetch_count(&self) -> usize {
            self.fetches.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Fetcher for Pages {
        async fn get_json(&self, url: &str) -> Result<Document, EngineError> {
            self.fetches.lock().unwrap().push(url.to_string());
            let value = self.docs.get(url).cloned().ok_or_else(|| EngineError::BadStatus {
                url: url.to_string(),
                status: 404,
            })?;
            Ok(Document::from_value(value).unwrap())
        }
    }

    #[tokio::test]
    async fn cyclic_next_is_bounded_by_cap() {
        let pages = Pages::default()
            .with("c", json!({ "first": "p1" }))
            .with("p1", json!({ "items": ["a", "b"], "next": "p2" }))
            .with("p2", json!({ "items": ["c"], "next": "p1" }));
        let ids = collection_ids(&pages, "c", 7).await.unwrap();
        assert_eq!(ids, ["a", "b", "c", "a", "b", "c", "a"]);
    }

    #[tokio::test]
    async fn cap_stops_without_fetching_further_pages() {
        let pages = Pages::default()
            .with("c", json!({ "items": ["a", "b"], "next": "p2" }))
            .with("p2", json!({ "items": ["c"] }));
        let ids = collection_ids(&pages, "c", 2).await.unwrap();
        assert_eq!(ids, ["a", "b"]);
        assert_eq!(pages.fetch_count(), 1);
    }

    #[tokio::test]
    async fn both_item_keys_are_read_before_page_links() {
        let pages = Pages::default()
            .with(
                "c",
                json!({ "items": ["a"], "orderedItems": ["b"], "first": "p1" }),
            )
            .with("p1", json!({ "orderedItems": ["c"] }));
        let ids = collection_ids(&pages, "c", 100).await.unwrap();
        assert_eq!(ids, ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn singletons_strings_and_objects() {
        let pages = Pages::default().with(
            "c",
            json!({
                "items": { "id": "obj", "type": "Note" },
                "orderedItems": ["plain", { "id": "embedded" }, { "type": "Anonymous" }, 5],
            }),
        );
        let ids = collection_ids(&pages, "c", 100).await.unwrap();
        assert_eq!(ids, ["obj", "plain", "embedded"]);
    }

    #[tokio::test]
    async fn empty_collection_yields_nothing() {
        let pages = Pages::default().with("c", json!({ "type": "OrderedCollection", "totalItems": 0 }));
        assert!(collection_ids(&pages, "c", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn first_is_walked_before_next() {
        let pages = Pages::default()
            .with("c", json!({ "first": "f", "next": "n" }))
            .with("f", json!({ "items": ["from-first"] }))
            .with("n", json!({ "items": ["from-next"] }));
        let ids = collection_ids(&pages, "c", 10).await.unwrap();
        assert_eq!(ids, ["from-first", "from-next"]);
    }

    #[tokio::test]
    async fn inline_first_page_is_used_without_fetch() {
        let pages = Pages::default().with(
            "c",
            json!({ "first": { "id": "c?page=1", "orderedItems": ["x"], "next": "c?page=2" } }),
        )
        .with("c?page=2", json!({ "orderedItems": ["y"] }));
        let ids = collection_ids(&pages, "c", 10).await.unwrap();
        assert_eq!(ids, ["x", "y"]);
        assert_eq!(*pages.fetches.lock().unwrap(), ["c", "c?page=2"]);
    }

    #[tokio::test]
    async fn linked_first_page_by_reference_object_is_fetched() {
        let pages = Pages::default()
            .with("c", json!({ "first": { "id": "p1", "type": "CollectionPage" } }))
            .with("p1", json!({ "items": ["z"] }));
        assert_eq!(collection_ids(&pages, "c", 10).await.unwrap(), ["z"]);
    }

    #[tokio::test]
    async fn contains_scans_every_page() {
        let pages = Pages::default()
            .with("c", json!({ "items": ["a"], "next": "p2" }))
            .with("p2", json!({ "items": ["b"], "next": "p3" }))
            .with("p3", json!({ "items": ["target"] }));
        assert!(collection_contains(&pages, "c", "target", 100).await.unwrap());
        assert!(!collection_contains(&pages, "c", "missing", 100).await.unwrap());
        assert_eq!(pages.fetch_count(), 6);
    }

    #[tokio::test]
    async fn fetch_errors_propagate() {
        let pages = Pages::default().with("c", json!({ "items": ["a"], "next": "missing" }));
        let mut walker = CollectionWalker::new(&pages, "c", 10);
        assert_eq!(walker.next().await.unwrap().as_deref(), Some("a"));
        assert!(matches!(
            walker.next().await.unwrap_err(),
            EngineError::BadStatus { status: 404, .. }
        ));
    }
}
