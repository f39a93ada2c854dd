//! Cart persistence.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use common::ProductId;
use thiserror::Error;

use super::{Cart, CartProduct};

/// Key under which [`PersistentCart`] keeps its state.
pub const CART_STORAGE_KEY: &str = "cart";

/// Errors that can occur while reading or writing stored carts.
#[derive(Debug, Error)]
pub enum CartStorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage lock poisoned")]
    Poisoned,
}

/// Key-value port for cart state.
pub trait CartStorage: Send + Sync {
    /// Returns the raw stored value, or None when nothing is stored.
    fn load(&self, key: &str) -> Result<Option<String>, CartStorageError>;

    /// Stores a raw value, replacing any previous one.
    fn save(&self, key: &str, value: &str) -> Result<(), CartStorageError>;
}

/// In-memory cart storage.
#[derive(Debug, Default)]
pub struct MemoryCartStorage {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryCartStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CartStorage for MemoryCartStorage {
    fn load(&self, key: &str) -> Result<Option<String>, CartStorageError> {
        let entries = self.entries.read().map_err(|_| CartStorageError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn save(&self, key: &str, value: &str) -> Result<(), CartStorageError> {
        let mut entries = self.entries.write().map_err(|_| CartStorageError::Poisoned)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// File-backed cart storage: one `<key>.json` file per key in a directory.
#[derive(Debug, Clone)]
pub struct FileCartStorage {
    dir: PathBuf,
}

impl FileCartStorage {
    /// Creates a storage rooted at `dir`. The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, CartStorageError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(CartStorageError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl CartStorage for FileCartStorage {
    fn load(&self, key: &str) -> Result<Option<String>, CartStorageError> {
        let path = self.path_for(key)?;
        match std::fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, key: &str, value: &str) -> Result<(), CartStorageError> {
        let path = self.path_for(key)?;
        std::fs::create_dir_all(&self.dir)?;

        // Atomic replace
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// A cart that persists itself after every mutation.
///
/// Unreadable stored state yields an empty cart. Failed saves are logged and
/// the in-memory cart keeps the mutation.
pub struct PersistentCart<S: CartStorage> {
    storage: S,
    cart: Cart,
}

impl<S: CartStorage> PersistentCart<S> {
    /// Loads the cart stored under [`CART_STORAGE_KEY`].
    pub fn load(storage: S) -> Self {
        let cart = match storage.load(CART_STORAGE_KEY) {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "stored cart is corrupt, starting empty");
                Cart::new()
            }),
            Ok(None) => Cart::new(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to read stored cart, starting empty");
                Cart::new()
            }
        };

        Self { storage, cart }
    }

    pub fn cart(&self) -> &Cart {
        &self.cart
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn add_item(&mut self, product: Option<&CartProduct>, quantity: u32) {
        self.cart.add_item(product, quantity);
        self.persist();
    }

    pub fn remove_item(&mut self, product_id: ProductId) {
        self.cart.remove_item(product_id);
        self.persist();
    }

    pub fn set_quantity(&mut self, product_id: ProductId, quantity: i64) {
        self.cart.set_quantity(product_id, quantity);
        self.persist();
    }

    pub fn clear(&mut self) {
        self.cart.clear();
        self.persist();
    }

    fn persist(&self) {
        let result = serde_json::to_string(&self.cart)
            .map_err(CartStorageError::from)
            .and_then(|json| self.storage.save(CART_STORAGE_KEY, &json));

        if let Err(e) = result {
            tracing::warn!(error = %e, "failed to persist cart");
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use tempfile::TempDir;

    use super::*;

    struct FailingStorage;

    impl CartStorage for FailingStorage {
        fn load(&self, _key: &str) -> Result<Option<String>, CartStorageError> {
            Ok(None)
        }

        fn save(&self, _key: &str, _value: &str) -> Result<(), CartStorageError> {
            Err(CartStorageError::Io(std::io::Error::other("disk full")))
        }
    }

    fn fern() -> CartProduct {
        CartProduct {
            id: ProductId::new(1),
            name: "Fern".to_string(),
            price: Decimal::new(1250, 2),
            image: Some("/uploads/fern.png".to_string()),
        }
    }

    #[test]
    fn test_memory_storage_roundtrip() {
        let storage = MemoryCartStorage::new();
        assert_eq!(storage.load("cart").unwrap(), None);

        storage.save("cart", "{}").unwrap();
        assert_eq!(storage.load("cart").unwrap().as_deref(), Some("{}"));
    }

    #[test]
    fn test_file_storage_missing_key_is_none() {
        let dir = TempDir::new().unwrap();
        let storage = FileCartStorage::new(dir.path());
        assert_eq!(storage.load("cart").unwrap(), None);
    }

    #[test]
    fn test_file_storage_creates_directory_and_writes() {
        let dir = TempDir::new().unwrap();
        let storage = FileCartStorage::new(dir.path().join("nested"));

        storage.save("cart", r#"{"items":[]}"#).unwrap();
        assert!(dir.path().join("nested").join("cart.json").exists());
        assert_eq!(
            storage.load("cart").unwrap().as_deref(),
            Some(r#"{"items":[]}"#)
        );
    }

    #[test]
    fn test_file_storage_rejects_path_like_keys() {
        let dir = TempDir::new().unwrap();
        let storage = FileCartStorage::new(dir.path());

        assert!(matches!(
            storage.save("../escape", "{}"),
            Err(CartStorageError::InvalidKey(_))
        ));
        assert!(matches!(
            storage.load(""),
            Err(CartStorageError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_mutations_are_persisted() {
        let dir = TempDir::new().unwrap();

        let mut cart = PersistentCart::load(FileCartStorage::new(dir.path()));
        cart.add_item(Some(&fern()), 2);
        cart.add_item(Some(&fern()), 1);

        let reloaded = PersistentCart::load(FileCartStorage::new(dir.path()));
        assert_eq!(reloaded.cart().quantity_of(ProductId::new(1)), Some(3));
        assert_eq!(reloaded.cart().total(), Decimal::new(3750, 2));
        assert_eq!(
            reloaded.cart().items()[0].image.as_deref(),
            Some("/uploads/fern.png")
        );
    }

    #[test]
    fn test_clear_is_persisted() {
        let storage = MemoryCartStorage::new();
        let mut cart = PersistentCart::load(storage);
        cart.add_item(Some(&fern()), 2);
        cart.clear();

        let raw = cart.storage().load(CART_STORAGE_KEY).unwrap().unwrap();
        let stored: Cart = serde_json::from_str(&raw).unwrap();
        assert!(stored.is_empty());
    }

    #[test]
    fn test_corrupt_state_loads_empty() {
        let storage = MemoryCartStorage::new();
        storage.save(CART_STORAGE_KEY, "{not json").unwrap();

        let cart = PersistentCart::load(storage);
        assert!(cart.cart().is_empty());
        assert_eq!(cart.cart().total(), Decimal::ZERO);
    }

    #[test]
    fn test_wrong_shape_loads_empty() {
        let storage = MemoryCartStorage::new();
        storage
            .save(CART_STORAGE_KEY, r#"{"items": "nope"}"#)
            .unwrap();

        let cart = PersistentCart::load(storage);
        assert!(cart.cart().is_empty());
    }

    #[test]
    fn test_overflowing_stored_total_loads_empty() {
        let storage = MemoryCartStorage::new();
        storage
            .save(
                CART_STORAGE_KEY,
                r#"{"items":[{"productId":1,"name":"Gold","unitPrice":"79228162514264337593543950335","quantity":2}]}"#,
            )
            .unwrap();

        let cart = PersistentCart::load(storage);
        assert!(cart.cart().is_empty());
        assert_eq!(cart.cart().total(), Decimal::ZERO);
    }

    #[test]
    fn test_save_failure_keeps_mutation() {
        let mut cart = PersistentCart::load(FailingStorage);
        cart.add_item(Some(&fern()), 1);
        cart.set_quantity(ProductId::new(1), 4);

        assert_eq!(cart.cart().quantity_of(ProductId::new(1)), Some(4));
    }
}
