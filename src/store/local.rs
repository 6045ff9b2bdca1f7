use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};

use crate::errors::Result;
use super::models::{LineItem, StoreKind, check_loaded};
use super::schema;
use super::{LineItemBackend, Mutation};

/// Profile-scoped key-value storage. Each store kind lives under its own key
/// as a single JSON array.
///
/// Two processes sharing a profile database race: the last write wins and
/// nothing is merged.
pub struct LocalBackend {
    conn: Connection,
}

impl LocalBackend {
    pub fn new(conn: Connection) -> Result<Self> {
        conn.execute(schema::CREATE_KV_TABLE, [])?;
        Ok(Self { conn })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::new(conn)
    }

    pub fn get_raw(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    pub fn set_raw(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO kv (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE
             SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, Utc::now()],
        )?;
        Ok(())
    }

    fn save(&self, kind: StoreKind, items: &[LineItem]) -> Result<()> {
        let json = serde_json::to_string(items)?;
        self.set_raw(kind.storage_key(), &json)
    }
}

impl LineItemBackend for LocalBackend {
    fn name(&self) -> &'static str {
        "local"
    }

    fn load(&self, kind: StoreKind) -> Result<Vec<LineItem>> {
        match self.get_raw(kind.storage_key())? {
            Some(json) => {
                let items: Vec<LineItem> = serde_json::from_str(&json)?;
                check_loaded(&items)?;
                Ok(items)
            }
            None => Ok(Vec::new()),
        }
    }

    fn apply(
        &self,
        kind: StoreKind,
        _mutation: &Mutation<'_>,
        next: &[LineItem],
    ) -> Result<Vec<LineItem>> {
        self.save(kind, next)?;
        Ok(next.to_vec())
    }

    fn checkout(&self, kind: StoreKind, _items: &[LineItem]) -> Result<Option<String>> {
        self.save(kind, &[])?;
        Ok(None)
    }
}
