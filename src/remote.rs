//! Remote-authoritative persistence over the marketplace HTTP API.
//!
//! The server owns the cart and collection. Every mutation is sent as one
//! request and the store then adopts the list the server returns. Calls are
//! attempted once; failures surface to the caller unchanged.

use std::time::Duration;

use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};
use url::Url;

use crate::errors::{PalettaError, Result};
use crate::store::models::{CatalogEntry, LineItem, StoreKind, check_loaded};
use crate::store::{LineItemBackend, Mutation};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Request/response seam under [`RemoteBackend`].
pub trait Transport {
    fn get(&self, path: &str) -> Result<Value>;
    fn post(&self, path: &str, body: &Value) -> Result<Value>;
    fn delete(&self, path: &str) -> Result<Value>;
}

pub struct HttpTransport {
    client: Client,
    base_url: Url,
}

impl HttpTransport {
    pub fn new(base_url: Url) -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: with_trailing_slash(base_url),
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| PalettaError::Config(format!("bad endpoint path {}: {}", path, e)))
    }

    fn read(response: reqwest::blocking::Response) -> Result<Value> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().unwrap_or_default();
            return Err(PalettaError::Remote {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json()?)
    }
}

impl Transport for HttpTransport {
    fn get(&self, path: &str) -> Result<Value> {
        let response = self.client.get(self.url(path)?).send()?;
        Self::read(response)
    }

    fn post(&self, path: &str, body: &Value) -> Result<Value> {
        let response = self.client.post(self.url(path)?).json(body).send()?;
        Self::read(response)
    }

    fn delete(&self, path: &str) -> Result<Value> {
        let response = self.client.delete(self.url(path)?).send()?;
        Self::read(response)
    }
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

#[derive(Debug, Deserialize)]
struct Ack {
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    cart_count: Option<u64>,
    #[serde(default)]
    redirect_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ItemList {
    items: Vec<LineItem>,
}

fn ack(value: Value) -> Result<Ack> {
    let ack: Ack = serde_json::from_value(value)?;
    if !ack.success {
        return Err(PalettaError::Remote {
            status: 200,
            message: ack.message.unwrap_or_else(|| "request was rejected".to_string()),
        });
    }
    Ok(ack)
}

pub struct RemoteBackend<T> {
    transport: T,
}

impl RemoteBackend<HttpTransport> {
    pub fn connect(base_url: Url) -> Result<Self> {
        Ok(Self::new(HttpTransport::new(base_url)?))
    }
}

impl<T: Transport> RemoteBackend<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Looks up a clip in the catalog so it can be offered as a candidate.
    pub fn catalog_entry(&self, id: i64) -> Result<CatalogEntry> {
        let value = self.transport.get(&format!("videos/{}/", id))?;
        Ok(serde_json::from_value(value)?)
    }

    fn send(&self, kind: StoreKind, mutation: &Mutation<'_>) -> Result<Ack> {
        let value = match (kind, mutation) {
            (StoreKind::Cart, Mutation::Add(item) | Mutation::Increment(item)) => {
                let body = json!({
                    "video_id": item.id,
                    "resolution": item.resolution,
                    "price": item.unit_price,
                });
                self.transport.post("cart/add/", &body)?
            }
            (StoreKind::Cart, Mutation::Remove(id)) => {
                self.transport.post("cart/remove/", &json!({ "item_id": id }))?
            }
            (StoreKind::Collection, Mutation::Add(item) | Mutation::Increment(item)) => {
                self.transport.post("collection/add/", &json!({ "clip_id": item.id }))?
            }
            (StoreKind::Collection, Mutation::Remove(id)) => {
                self.transport.delete(&format!("collection/{}/", id))?
            }
            (kind, Mutation::Clear) => self
                .transport
                .post(&format!("{}/clear/", kind.as_str()), &json!({}))?,
        };
        ack(value)
    }
}

impl<T: Transport> LineItemBackend for RemoteBackend<T> {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn load(&self, kind: StoreKind) -> Result<Vec<LineItem>> {
        let value = self.transport.get(&format!("{}/", kind.as_str()))?;
        let list: ItemList = serde_json::from_value(value)?;
        check_loaded(&list.items)?;
        Ok(list.items)
    }

    /// Once the server has accepted the change it counts as applied. If the
    /// list cannot be re-fetched afterwards, `next` is adopted instead.
    fn apply(
        &self,
        kind: StoreKind,
        mutation: &Mutation<'_>,
        next: &[LineItem],
    ) -> Result<Vec<LineItem>> {
        let ack = self.send(kind, mutation)?;
        if let Some(count) = ack.cart_count {
            debug!(count, "server cart count");
        }
        match self.load(kind) {
            Ok(items) => Ok(items),
            Err(e) => {
                warn!(
                    store = kind.as_str(),
                    error = %e,
                    "change accepted but the list could not be re-fetched, keeping local copy"
                );
                Ok(next.to_vec())
            }
        }
    }

    fn checkout(&self, kind: StoreKind, _items: &[LineItem]) -> Result<Option<String>> {
        let value = self
            .transport
            .post(&format!("{}/checkout/", kind.as_str()), &json!({}))?;
        Ok(ack(value)?.redirect_url)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::VecDeque;

    use rust_decimal::Decimal;

    use super::*;
    use crate::store::LineItemStore;
    use crate::store::models::{AddOutcome, NewLineItem};

    /// Replays canned responses and records every request.
    #[derive(Default)]
    struct ScriptedTransport {
        responses: RefCell<VecDeque<Result<Value>>>,
        requests: RefCell<Vec<(String, String, Option<Value>)>>,
    }

    impl ScriptedTransport {
        fn respond(self, value: Value) -> Self {
            self.responses.borrow_mut().push_back(Ok(value));
            self
        }

        fn fail(self) -> Self {
            self.responses
                .borrow_mut()
                .push_back(Err(PalettaError::Network("connection refused".into())));
            self
        }

        fn next(&self, method: &str, path: &str, body: Option<&Value>) -> Result<Value> {
            self.requests
                .borrow_mut()
                .push((method.to_string(), path.to_string(), body.cloned()));
            self.responses
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Err(PalettaError::Network("no scripted response".into())))
        }

        fn request(&self, index: usize) -> (String, String, Option<Value>) {
            self.requests.borrow()[index].clone()
        }
    }

    impl Transport for ScriptedTransport {
        fn get(&self, path: &str) -> Result<Value> {
            self.next("GET", path, None)
        }

        fn post(&self, path: &str, body: &Value) -> Result<Value> {
            self.next("POST", path, Some(body))
        }

        fn delete(&self, path: &str) -> Result<Value> {
            self.next("DELETE", path, None)
        }
    }

    fn server_item(id: i64, price: &str, quantity: u32) -> Value {
        json!({
            "id": id,
            "title": format!("Clip {}", id),
            "unit_price": price,
            "quantity": quantity,
        })
    }

    fn candidate(id: i64) -> NewLineItem {
        let mut item = NewLineItem::new(id, format!("Clip {}", id), Decimal::new(1099, 2));
        item.resolution = Some("4k".into());
        item
    }

    #[test]
    fn test_cart_add_posts_and_refetches() {
        let transport = ScriptedTransport::default()
            .respond(json!({ "items": [] }))
            .respond(json!({ "success": true, "cart_count": 1 }))
            .respond(json!({ "items": [server_item(1, "10.99", 1)] }));
        let mut store = LineItemStore::open(StoreKind::Cart, RemoteBackend::new(transport));

        store.add(candidate(1)).unwrap();
        assert_eq!(store.len(), 1);

        let (method, path, body) = store.backend().transport().request(1);
        assert_eq!(method, "POST");
        assert_eq!(path, "cart/add/");
        let body = body.unwrap();
        assert_eq!(body["video_id"], 1);
        assert_eq!(body["resolution"], "4k");
        assert_eq!(body["price"], "10.99");
        assert_eq!(store.backend().transport().request(2).1, "cart/");
    }

    #[test]
    fn test_server_list_is_authoritative() {
        let transport = ScriptedTransport::default()
            .respond(json!({ "items": [server_item(1, "10.99", 1)] }))
            .respond(json!({ "success": true, "cart_count": 2 }))
            .respond(json!({
                "items": [server_item(1, "10.99", 2), server_item(8, "3.00", 1)]
            }));
        let mut store = LineItemStore::open(StoreKind::Cart, RemoteBackend::new(transport));

        store.add(candidate(1)).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.total(), Decimal::new(2498, 2));
    }

    #[test]
    fn test_collection_duplicate_rejected_without_request() {
        let transport =
            ScriptedTransport::default().respond(json!({ "items": [server_item(5, "0", 1)] }));
        let mut store = LineItemStore::open(StoreKind::Collection, RemoteBackend::new(transport));

        assert!(matches!(store.add(candidate(5)), Err(PalettaError::AlreadyExists(5))));
        assert_eq!(store.backend().transport().requests.borrow().len(), 1);
    }

    #[test]
    fn test_collection_remove_uses_delete() {
        let transport = ScriptedTransport::default()
            .respond(json!({ "items": [server_item(5, "0", 1)] }))
            .respond(json!({ "success": true }))
            .respond(json!({ "items": [] }));
        let mut store = LineItemStore::open(StoreKind::Collection, RemoteBackend::new(transport));

        assert!(store.remove(5).unwrap());
        let (method, path, _) = store.backend().transport().request(1);
        assert_eq!(method, "DELETE");
        assert_eq!(path, "collection/5/");
        assert!(store.is_empty());
    }

    #[test]
    fn test_rejected_mutation_leaves_state() {
        let transport = ScriptedTransport::default()
            .respond(json!({ "items": [server_item(1, "10.99", 1)] }))
            .respond(json!({ "success": false, "message": "clip unavailable" }));
        let mut store = LineItemStore::open(StoreKind::Cart, RemoteBackend::new(transport));
        let before = store.list();

        let err = store.add(candidate(2)).unwrap_err();
        assert!(matches!(
            err,
            PalettaError::Remote { ref message, .. } if message == "clip unavailable"
        ));
        assert_eq!(store.list(), before);
    }

    #[test]
    fn test_network_failure_leaves_state() {
        let transport = ScriptedTransport::default()
            .respond(json!({ "items": [server_item(1, "10.99", 1)] }))
            .fail();
        let mut store = LineItemStore::open(StoreKind::Cart, RemoteBackend::new(transport));

        assert!(matches!(store.remove(1), Err(PalettaError::Network(_))));
        assert_eq!(store.len(), 1);
        // one attempt only
        assert_eq!(store.backend().transport().requests.borrow().len(), 2);
    }

    #[test]
    fn test_accepted_change_survives_failed_refetch() {
        let transport = ScriptedTransport::default()
            .respond(json!({ "items": [] }))
            .respond(json!({ "success": true, "cart_count": 1 }))
            .fail();
        let mut store = LineItemStore::open(StoreKind::Cart, RemoteBackend::new(transport));

        let outcome = store.add(candidate(1)).unwrap();
        assert!(matches!(outcome, AddOutcome::Added(_)));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(1).map(|i| i.quantity), Some(1));
        assert_eq!(store.backend().transport().requests.borrow().len(), 3);
    }

    #[test]
    fn test_server_list_with_repeated_id_opens_empty() {
        let transport = ScriptedTransport::default().respond(json!({
            "items": [server_item(3, "2.00", 1), server_item(3, "2.00", 1)]
        }));
        let store = LineItemStore::open(StoreKind::Cart, RemoteBackend::new(transport));
        assert!(store.is_empty());
    }

    #[test]
    fn test_server_list_with_zero_quantity_is_corrupt() {
        let transport =
            ScriptedTransport::default().respond(json!({ "items": [server_item(3, "2.00", 0)] }));
        let backend = RemoteBackend::new(transport);
        assert!(matches!(backend.load(StoreKind::Cart), Err(PalettaError::Corrupt(_))));
    }

    #[test]
    fn test_unreachable_server_opens_empty() {
        let transport = ScriptedTransport::default().fail();
        let store = LineItemStore::open(StoreKind::Cart, RemoteBackend::new(transport));
        assert!(store.is_empty());
    }

    #[test]
    fn test_checkout_returns_redirect() {
        let transport = ScriptedTransport::default()
            .respond(json!({ "items": [server_item(1, "10.99", 2)] }))
            .respond(json!({ "success": true, "redirect_url": "/orders/31/confirmation/" }));
        let mut store = LineItemStore::open(StoreKind::Cart, RemoteBackend::new(transport));

        let receipt = store.checkout().unwrap();
        assert_eq!(receipt.redirect_url.as_deref(), Some("/orders/31/confirmation/"));
        assert_eq!(receipt.total, Decimal::new(2198, 2));
        assert!(store.is_empty());
        assert_eq!(store.backend().transport().request(1).1, "cart/checkout/");
    }

    #[test]
    fn test_catalog_entry_lookup() {
        let transport = ScriptedTransport::default().respond(json!({
            "id": 12,
            "title": "Night market",
            "thumbnail_url": "/media/12.jpg",
            "price": 24.0,
            "duration": 31.2,
            "tags": ["street"]
        }));
        let backend = RemoteBackend::new(transport);
        let entry = backend.catalog_entry(12).unwrap();
        assert_eq!(entry.title, "Night market");
        assert_eq!(backend.transport().request(0).1, "videos/12/");
    }

    #[test]
    fn test_with_trailing_slash() {
        let url = Url::parse("https://paletta.example/api").unwrap();
        let joined = with_trailing_slash(url).join("cart/add/").unwrap();
        assert_eq!(joined.as_str(), "https://paletta.example/api/cart/add/");
    }
}
