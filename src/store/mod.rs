pub mod local;
pub mod models;
pub mod schema;

use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::errors::{PalettaError, Result};
use models::{AddOutcome, DuplicatePolicy, LineItem, NewLineItem, Snapshot, StoreKind, Summary};

/// The change a store is about to commit, passed to the backend together
/// with the full sequence it produces.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Mutation<'a> {
    Add(&'a LineItem),
    Increment(&'a LineItem),
    Remove(i64),
    Clear,
}

/// Persistence strategy for a line-item store, fixed at construction.
///
/// A backend is either fully local or fully remote-authoritative. `apply`
/// returns the sequence the store must adopt: a local backend echoes `next`,
/// a remote backend returns what the server holds after the change.
pub trait LineItemBackend {
    fn name(&self) -> &'static str;
    fn load(&self, kind: StoreKind) -> Result<Vec<LineItem>>;
    fn apply(
        &self,
        kind: StoreKind,
        mutation: &Mutation<'_>,
        next: &[LineItem],
    ) -> Result<Vec<LineItem>>;
    /// Completes checkout of `items`. May return a URL the user should be sent to.
    fn checkout(&self, kind: StoreKind, items: &[LineItem]) -> Result<Option<String>>;
}

impl<B: LineItemBackend + ?Sized> LineItemBackend for Box<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn load(&self, kind: StoreKind) -> Result<Vec<LineItem>> {
        (**self).load(kind)
    }

    fn apply(
        &self,
        kind: StoreKind,
        mutation: &Mutation<'_>,
        next: &[LineItem],
    ) -> Result<Vec<LineItem>> {
        (**self).apply(kind, mutation, next)
    }

    fn checkout(&self, kind: StoreKind, items: &[LineItem]) -> Result<Option<String>> {
        (**self).checkout(kind, items)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutReceipt {
    pub items: Vec<LineItem>,
    pub total: Decimal,
    pub redirect_url: Option<String>,
}

/// An ordered, id-unique sequence of line items backed by one persistence
/// strategy.
pub struct LineItemStore<B> {
    kind: StoreKind,
    backend: B,
    items: Vec<LineItem>,
    revision: u64,
}

impl<B: LineItemBackend> LineItemStore<B> {
    /// Loads the persisted sequence. Unreadable state is treated as empty.
    pub fn open(kind: StoreKind, backend: B) -> Self {
        let items = load_or_empty(&backend, kind);
        Self {
            kind,
            backend,
            items,
            revision: 0,
        }
    }

    pub fn kind(&self) -> StoreKind {
        self.kind
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: i64) -> Option<&LineItem> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn list(&self) -> Snapshot {
        Snapshot {
            revision: self.revision,
            items: self.items.clone(),
        }
    }

    pub fn total(&self) -> Decimal {
        self.items.iter().map(LineItem::line_total).sum()
    }

    pub fn summary(&self) -> Summary {
        Summary {
            entries: self.items.len(),
            units: self.items.iter().map(|item| u64::from(item.quantity)).sum(),
            total: self.total(),
        }
    }

    pub fn add(&mut self, candidate: NewLineItem) -> Result<AddOutcome> {
        candidate.validate()?;
        let id = candidate.id;

        let Some(pos) = self.items.iter().position(|item| item.id == id) else {
            let item = candidate.into_line_item();
            let mut next = self.items.clone();
            next.push(item.clone());
            self.commit(&Mutation::Add(&item), next)?;
            return Ok(AddOutcome::Added(self.get(id).cloned().unwrap_or(item)));
        };

        match self.kind.duplicate_policy() {
            DuplicatePolicy::Reject => Err(PalettaError::AlreadyExists(id)),
            DuplicatePolicy::Accumulate => {
                let mut next = self.items.clone();
                let updated = {
                    let entry = &mut next[pos];
                    entry.quantity = entry.quantity.saturating_add(1);
                    entry.clone()
                };
                self.commit(&Mutation::Increment(&updated), next)?;
                Ok(AddOutcome::Incremented(self.get(id).cloned().unwrap_or(updated)))
            }
        }
    }

    /// Removes the entry with `id`. Returns false, without touching the
    /// backend, when no entry matches.
    pub fn remove(&mut self, id: i64) -> Result<bool> {
        if self.get(id).is_none() {
            debug!(store = self.kind.as_str(), id, "remove of absent id ignored");
            return Ok(false);
        }
        let next: Vec<LineItem> = self
            .items
            .iter()
            .filter(|item| item.id != id)
            .cloned()
            .collect();
        self.commit(&Mutation::Remove(id), next)?;
        Ok(true)
    }

    /// Removes by position within a rendered snapshot. The snapshot must be
    /// from the current revision.
    pub fn remove_at(&mut self, snapshot: &Snapshot, index: usize) -> Result<bool> {
        if snapshot.revision != self.revision {
            return Err(PalettaError::StaleSnapshot {
                expected: self.revision,
                found: snapshot.revision,
            });
        }
        match snapshot.id_at(index) {
            Some(id) => self.remove(id),
            None => Ok(false),
        }
    }

    pub fn clear(&mut self) -> Result<()> {
        self.commit(&Mutation::Clear, Vec::new())
    }

    pub fn checkout(&mut self) -> Result<CheckoutReceipt> {
        if self.kind != StoreKind::Cart {
            return Err(PalettaError::InvalidInput(format!(
                "checkout is only available for the cart, not the {}",
                self.kind.as_str()
            )));
        }
        if self.items.is_empty() {
            return Err(PalettaError::InvalidInput("the cart is empty".to_string()));
        }

        let redirect_url = self.backend.checkout(self.kind, &self.items)?;
        let receipt = CheckoutReceipt {
            total: self.total(),
            items: std::mem::take(&mut self.items),
            redirect_url,
        };
        self.revision += 1;
        info!(
            backend = self.backend.name(),
            entries = receipt.items.len(),
            total = %receipt.total,
            "checkout completed"
        );
        Ok(receipt)
    }

    /// Replaces in-memory state with whatever the backend holds now.
    pub fn refresh(&mut self) {
        self.items = load_or_empty(&self.backend, self.kind);
        self.revision += 1;
    }

    fn commit(&mut self, mutation: &Mutation<'_>, next: Vec<LineItem>) -> Result<()> {
        let applied = self.backend.apply(self.kind, mutation, &next)?;
        debug!(
            store = self.kind.as_str(),
            backend = self.backend.name(),
            entries = applied.len(),
            ?mutation,
            "persisted"
        );
        self.items = applied;
        self.revision += 1;
        Ok(())
    }
}

fn load_or_empty<B: LineItemBackend>(backend: &B, kind: StoreKind) -> Vec<LineItem> {
    match backend.load(kind) {
        Ok(items) => items,
        Err(e) => {
            warn!(
                store = kind.as_str(),
                backend = backend.name(),
                error = %e,
                "could not read persisted items, starting empty"
            );
            Vec::new()
        }
    }
}
