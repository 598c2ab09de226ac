//! Shared state store - small typed key/value map shared by every screen.
//!
//! Values live in RAM behind a critical-section mutex, so `get` / `set`
//! never wait on flash. Keys registered with `create_or_load_persistent`
//! are also mirrored in a `PersistentStore` backend and written back in one
//! batch by `sync_persistent`.

use crate::config::{STORE_CAPACITY, STORE_KEY_LEN, STORE_TEXT_LEN};
use crate::error::StoreError;
use core::cell::RefCell;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::mutex::Mutex;
use heapless::{FnvIndexMap, String, Vec};

/// Key type of the store.
pub type StoreKey = String<STORE_KEY_LEN>;

/// Value held under a key.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Value {
    Bool(bool),
    Int(i32),
    Char(char),
    Text(String<STORE_TEXT_LEN>),
}

const TAG_BOOL: u8 = 0;
const TAG_INT: u8 = 1;
const TAG_CHAR: u8 = 2;
const TAG_TEXT: u8 = 3;

impl Value {
    /// Text value, if `s` fits.
    pub fn text(s: &str) -> Result<Self, StoreError> {
        String::try_from(s)
            .map(Value::Text)
            .map_err(|_| StoreError::TextTooLong)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_char(&self) -> Option<char> {
        match self {
            Value::Char(c) => Some(*c),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(t) => Some(t.as_str()),
            _ => None,
        }
    }

    /// Serialize to bytes for flash storage.
    ///
    /// Format: `[tag][payload]` - bool is one byte, int and char are four
    /// little-endian bytes, text is `[len][utf-8 bytes]`.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize, StoreError> {
        let mut payload = [0u8; 1 + STORE_TEXT_LEN];
        let payload_len = match self {
            Value::Bool(b) => {
                payload[0] = *b as u8;
                1
            }
            Value::Int(i) => {
                payload[..4].copy_from_slice(&i.to_le_bytes());
                4
            }
            Value::Char(c) => {
                payload[..4].copy_from_slice(&(*c as u32).to_le_bytes());
                4
            }
            Value::Text(t) => {
                let bytes = t.as_bytes();
                payload[0] = bytes.len() as u8;
                payload[1..1 + bytes.len()].copy_from_slice(bytes);
                1 + bytes.len()
            }
        };

        let total = 1 + payload_len;
        if buf.len() < total {
            return Err(StoreError::Encoding);
        }
        buf[0] = self.tag();
        buf[1..total].copy_from_slice(&payload[..payload_len]);
        Ok(total)
    }

    /// Deserialize bytes written by [`Value::encode`].
    pub fn decode(data: &[u8]) -> Result<Self, StoreError> {
        let (&tag, rest) = data.split_first().ok_or(StoreError::Encoding)?;
        match tag {
            TAG_BOOL => match rest.first() {
                Some(0) => Ok(Value::Bool(false)),
                Some(1) => Ok(Value::Bool(true)),
                _ => Err(StoreError::Encoding),
            },
            TAG_INT => Ok(Value::Int(i32::from_le_bytes(four_bytes(rest)?))),
            TAG_CHAR => char::from_u32(u32::from_le_bytes(four_bytes(rest)?))
                .map(Value::Char)
                .ok_or(StoreError::Encoding),
            TAG_TEXT => {
                let (&len, text) = rest.split_first().ok_or(StoreError::Encoding)?;
                let text = text.get(..len as usize).ok_or(StoreError::Encoding)?;
                let text = core::str::from_utf8(text).map_err(|_| StoreError::Encoding)?;
                Value::text(text)
            }
            _ => Err(StoreError::Encoding),
        }
    }

    fn tag(&self) -> u8 {
        match self {
            Value::Bool(_) => TAG_BOOL,
            Value::Int(_) => TAG_INT,
            Value::Char(_) => TAG_CHAR,
            Value::Text(_) => TAG_TEXT,
        }
    }
}

fn four_bytes(data: &[u8]) -> Result<[u8; 4], StoreError> {
    data.get(..4)
        .and_then(|b| b.try_into().ok())
        .ok_or(StoreError::Encoding)
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i)
    }
}

impl From<char> for Value {
    fn from(c: char) -> Self {
        Value::Char(c)
    }
}

/// Durable backing store for persistable keys (flash, a database...).
#[allow(async_fn_in_trait)]
pub trait PersistentStore {
    /// Stored value of `key`, if any.
    async fn load(&mut self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Create `key` with `value`.
    async fn create(&mut self, key: &str, value: &Value) -> Result<(), StoreError>;

    /// Write every entry. Either all land or an error is returned.
    async fn save_batch(&mut self, entries: &[(StoreKey, Value)]) -> Result<(), StoreError>;
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    persistent: bool,
}

type Entries = FnvIndexMap<StoreKey, Entry, STORE_CAPACITY>;

/// Process-wide key/value store.
pub struct SharedStore<B> {
    entries: BlockingMutex<CriticalSectionRawMutex, RefCell<Entries>>,
    /// Serializes backend I/O without holding up `get` / `set`.
    backend: Mutex<CriticalSectionRawMutex, B>,
}

impl<B> SharedStore<B> {
    pub const fn new(backend: B) -> Self {
        Self {
            entries: BlockingMutex::new(RefCell::new(FnvIndexMap::new())),
            backend: Mutex::new(backend),
        }
    }

    /// Current value of `key`.
    pub fn get(&self, key: &str) -> Option<Value> {
        let key = make_key(key).ok()?;
        self.entries
            .lock(|entries| entries.borrow().get(&key).map(|e| e.value.clone()))
    }

    /// Set `key`. The last write wins; persistable keys stay persistable.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<(), StoreError> {
        let key = make_key(key)?;
        self.put(key, value.into(), false)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.as_bool())
    }

    pub fn get_int(&self, key: &str) -> Option<i32> {
        self.get(key).and_then(|v| v.as_int())
    }

    pub fn get_char(&self, key: &str) -> Option<char> {
        self.get(key).and_then(|v| v.as_char())
    }

    /// Whether `key` is mirrored in the backend.
    pub fn is_persistent(&self, key: &str) -> bool {
        let Ok(key) = make_key(key) else {
            return false;
        };
        self.entries.lock(|entries| {
            entries
                .borrow()
                .get(&key)
                .map(|e| e.persistent)
                .unwrap_or(false)
        })
    }

    fn persistent_value(&self, key: &StoreKey) -> Option<Value> {
        self.entries.lock(|entries| {
            entries
                .borrow()
                .get(key)
                .filter(|e| e.persistent)
                .map(|e| e.value.clone())
        })
    }

    fn put(&self, key: StoreKey, value: Value, persistent: bool) -> Result<(), StoreError> {
        self.entries.lock(|entries| {
            let mut entries = entries.borrow_mut();
            if let Some(entry) = entries.get_mut(&key) {
                entry.value = value;
                entry.persistent |= persistent;
                return Ok(());
            }
            entries
                .insert(key, Entry { value, persistent })
                .map(|_| ())
                .map_err(|_| StoreError::Full)
        })
    }
}

impl<B: PersistentStore> SharedStore<B> {
    /// Make `key` persistable.
    ///
    /// The first call loads the backend's value, or seeds the backend with
    /// `default` if it has none. Later calls return the in-memory value
    /// without touching the backend.
    pub async fn create_or_load_persistent(
        &self,
        key: &str,
        default: impl Into<Value>,
    ) -> Result<Value, StoreError> {
        let key = make_key(key)?;
        if let Some(value) = self.persistent_value(&key) {
            return Ok(value);
        }

        let mut backend = self.backend.lock().await;
        // Another task may have loaded it while we waited for the backend.
        if let Some(value) = self.persistent_value(&key) {
            return Ok(value);
        }

        let value = match backend.load(&key).await? {
            Some(stored) => {
                debug!("store: loaded {}", key.as_str());
                stored
            }
            None => {
                let default = default.into();
                backend.create(&key, &default).await?;
                info!("store: seeded {}", key.as_str());
                default
            }
        };

        self.put(key, value.clone(), true)?;
        Ok(value)
    }

    /// Write every persistable key to the backend in one batch.
    pub async fn sync_persistent(&self) -> Result<(), StoreError> {
        let mut backend = self.backend.lock().await;
        let batch: Vec<(StoreKey, Value), STORE_CAPACITY> = self.entries.lock(|entries| {
            entries
                .borrow()
                .iter()
                .filter(|(_, e)| e.persistent)
                .map(|(k, e)| (k.clone(), e.value.clone()))
                .collect()
        });

        if batch.is_empty() {
            return Ok(());
        }

        if let Err(e) = backend.save_batch(&batch).await {
            error!("store: sync of {} keys failed: {:?}", batch.len(), e);
            return Err(e);
        }
        info!("store: synced {} keys", batch.len());
        Ok(())
    }
}

fn make_key(key: &str) -> Result<StoreKey, StoreError> {
    StoreKey::try_from(key).map_err(|_| StoreError::KeyTooLong)
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;
    use std::collections::BTreeMap;

    /// Backend that keeps everything in a map and can be told to fail.
    #[derive(Default)]
    struct MemoryBackend {
        items: BTreeMap<std::string::String, Value>,
        creates: u32,
        batches: u32,
        fail_writes: bool,
    }

    impl PersistentStore for MemoryBackend {
        async fn load(&mut self, key: &str) -> Result<Option<Value>, StoreError> {
            Ok(self.items.get(key).cloned())
        }

        async fn create(&mut self, key: &str, value: &Value) -> Result<(), StoreError> {
            if self.fail_writes {
                return Err(StoreError::Backend);
            }
            self.creates += 1;
            self.items.insert(key.into(), value.clone());
            Ok(())
        }

        async fn save_batch(&mut self, entries: &[(StoreKey, Value)]) -> Result<(), StoreError> {
            if self.fail_writes {
                return Err(StoreError::Backend);
            }
            self.batches += 1;
            for (k, v) in entries {
                self.items.insert(k.as_str().into(), v.clone());
            }
            Ok(())
        }
    }

    fn backend_with(items: &[(&str, Value)]) -> MemoryBackend {
        MemoryBackend {
            items: items
                .iter()
                .map(|(k, v)| ((*k).into(), v.clone()))
                .collect(),
            ..Default::default()
        }
    }

    // ════════════════════════════════════════════════════════════════════════
    // In-memory map
    // ════════════════════════════════════════════════════════════════════════

    #[test]
    fn last_write_wins() {
        let store = SharedStore::new(MemoryBackend::default());
        assert_eq!(store.get("CanRing"), None);

        store.set("CanRing", true).unwrap();
        store.set("CanRing", false).unwrap();
        assert_eq!(store.get_bool("CanRing"), Some(false));
    }

    #[test]
    fn typed_getters_reject_other_variants() {
        let store = SharedStore::new(MemoryBackend::default());
        store.set("InitialKey", 'S').unwrap();
        store.set("BatteryPercent", 42).unwrap();

        assert_eq!(store.get_char("InitialKey"), Some('S'));
        assert_eq!(store.get_int("InitialKey"), None);
        assert_eq!(store.get_int("BatteryPercent"), Some(42));
        assert_eq!(store.get_bool("BatteryPercent"), None);
    }

    #[test]
    fn oversized_key_is_rejected() {
        let store = SharedStore::new(MemoryBackend::default());
        let long = "ThisKeyIsFarTooLongForTheStore";
        assert_eq!(store.set(long, 1), Err(StoreError::KeyTooLong));
        assert_eq!(store.get(long), None);
    }

    #[test]
    fn full_store_rejects_new_keys_but_updates_old_ones() {
        let store = SharedStore::new(MemoryBackend::default());
        for i in 0..STORE_CAPACITY {
            store.set(&std::format!("k{i}"), i as i32).unwrap();
        }
        assert_eq!(store.set("extra", 1), Err(StoreError::Full));
        assert_eq!(store.set("k0", 99), Ok(()));
        assert_eq!(store.get_int("k0"), Some(99));
    }

    // ════════════════════════════════════════════════════════════════════════
    // Persistence
    // ════════════════════════════════════════════════════════════════════════

    #[test]
    fn missing_persistent_key_is_seeded_with_default() {
        let store = SharedStore::new(MemoryBackend::default());

        let value = block_on(store.create_or_load_persistent("CanVibrate", true)).unwrap();
        assert_eq!(value, Value::Bool(true));
        assert!(store.is_persistent("CanVibrate"));

        let backend = block_on(store.backend.lock());
        assert_eq!(backend.items.get("CanVibrate"), Some(&Value::Bool(true)));
        assert_eq!(backend.creates, 1);
    }

    #[test]
    fn existing_persistent_value_wins_over_default() {
        let store = SharedStore::new(backend_with(&[("CanRing", Value::Bool(false))]));

        let first = block_on(store.create_or_load_persistent("CanRing", true)).unwrap();
        let second = block_on(store.create_or_load_persistent("CanRing", true)).unwrap();

        assert_eq!(first, Value::Bool(false));
        assert_eq!(second, Value::Bool(false));
        assert_eq!(store.get_bool("CanRing"), Some(false));

        let backend = block_on(store.backend.lock());
        assert_eq!(backend.items.get("CanRing"), Some(&Value::Bool(false)));
        assert_eq!(backend.creates, 0);
    }

    #[test]
    fn repeated_registration_keeps_in_memory_value() {
        let store = SharedStore::new(MemoryBackend::default());
        block_on(store.create_or_load_persistent("BeepOnly", false)).unwrap();
        store.set("BeepOnly", true).unwrap();

        let again = block_on(store.create_or_load_persistent("BeepOnly", false)).unwrap();
        assert_eq!(again, Value::Bool(true));
        assert!(store.is_persistent("BeepOnly"));
    }

    #[test]
    fn sync_writes_only_persistent_keys() {
        let store = SharedStore::new(MemoryBackend::default());
        block_on(store.create_or_load_persistent("CanVibrate", true)).unwrap();
        store.set("CanVibrate", false).unwrap();
        store.set("BatteryPercent", 80).unwrap();

        block_on(store.sync_persistent()).unwrap();

        let backend = block_on(store.backend.lock());
        assert_eq!(backend.batches, 1);
        assert_eq!(backend.items.get("CanVibrate"), Some(&Value::Bool(false)));
        assert!(!backend.items.contains_key("BatteryPercent"));
    }

    #[test]
    fn sync_with_nothing_persistent_skips_backend() {
        let store = SharedStore::new(MemoryBackend::default());
        store.set("DebugMode", true).unwrap();
        block_on(store.sync_persistent()).unwrap();
        assert_eq!(block_on(store.backend.lock()).batches, 0);
    }

    #[test]
    fn failed_sync_is_reported() {
        let store = SharedStore::new(MemoryBackend::default());
        block_on(store.create_or_load_persistent("CanRing", true)).unwrap();
        block_on(store.backend.lock()).fail_writes = true;

        assert_eq!(block_on(store.sync_persistent()), Err(StoreError::Backend));
    }

    // ════════════════════════════════════════════════════════════════════════
    // Flash encoding
    // ════════════════════════════════════════════════════════════════════════

    #[test]
    fn text_value_encoding_layout() {
        let mut buf = [0u8; 16];
        let written = Value::text("v1.2").unwrap().encode(&mut buf).unwrap();
        assert_eq!(written, 6);
        assert_eq!(&buf[..6], &[TAG_TEXT, 4, b'v', b'1', b'.', b'2']);
        assert_eq!(Value::decode(&buf[..written]), Value::text("v1.2"));
    }

    #[test]
    fn negative_int_survives_encoding() {
        let mut buf = [0u8; 8];
        let written = Value::Int(-7).encode(&mut buf).unwrap();
        assert_eq!(Value::decode(&buf[..written]), Ok(Value::Int(-7)));
    }

    #[test]
    fn encode_into_short_buffer_fails() {
        let mut buf = [0u8; 3];
        assert_eq!(Value::Int(1).encode(&mut buf), Err(StoreError::Encoding));
    }

    #[test]
    fn corrupt_bytes_are_rejected() {
        assert_eq!(Value::decode(&[]), Err(StoreError::Encoding));
        assert_eq!(Value::decode(&[TAG_BOOL, 7]), Err(StoreError::Encoding));
        assert_eq!(Value::decode(&[TAG_INT, 1, 2]), Err(StoreError::Encoding));
        assert_eq!(Value::decode(&[TAG_TEXT, 5, b'a']), Err(StoreError::Encoding));
        assert_eq!(Value::decode(&[9, 0]), Err(StoreError::Encoding));
    }
}
