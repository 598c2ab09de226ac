//! Flash backend for persistable store keys.
//!
//! Uses the nRF52840's internal flash via `sequential-storage` crate so
//! settings such as `CanRing` survive power cycles.
//!
//! Storage layout:
//!   - One map item per key. The item key is the store key, NUL-padded to
//!     a fixed width; the item value is the `Value` encoding.
//!   - Items are appended sequentially; the flash pages are managed by
//!     `sequential-storage` which handles wear levelling and GC.

use defmt::{debug, error};
use embedded_storage_async::nor_flash::NorFlash;
use handset::config::{
    STORAGE_FLASH_PAGE_COUNT, STORAGE_FLASH_PAGE_START, STORE_KEY_LEN, STORE_VALUE_MAX_ENCODED,
};
use handset::store::{PersistentStore, StoreKey, Value};
use handset::StoreError;
use sequential_storage::cache::NoCache;

/// Flash page size for nRF52840 (4 KB).
const FLASH_PAGE_SIZE: u32 = 4096;

/// Start address of our storage region.
const STORAGE_START: u32 = STORAGE_FLASH_PAGE_START * FLASH_PAGE_SIZE;

/// End address (exclusive) of our storage region.
const STORAGE_END: u32 = (STORAGE_FLASH_PAGE_START + STORAGE_FLASH_PAGE_COUNT) * FLASH_PAGE_SIZE;

/// Scratch buffer for one item: key, encoded value and item header.
const ITEM_BUF_SIZE: usize = 128;

type FlashKey = [u8; STORE_KEY_LEN];

fn flash_key(key: &str) -> FlashKey {
    let mut padded = [0u8; STORE_KEY_LEN];
    let bytes = key.as_bytes();
    let len = bytes.len().min(STORE_KEY_LEN);
    padded[..len].copy_from_slice(&bytes[..len]);
    padded
}

/// `PersistentStore` on a region of internal flash.
pub struct FlashStore<F> {
    flash: F,
}

impl<F: NorFlash> FlashStore<F> {
    pub const fn new(flash: F) -> Self {
        Self { flash }
    }

    async fn write(&mut self, key: &str, value: &Value) -> Result<(), StoreError> {
        let mut encoded = [0u8; STORE_VALUE_MAX_ENCODED];
        let len = value.encode(&mut encoded)?;
        let item = &encoded[..len];
        let mut buf = [0u8; ITEM_BUF_SIZE];

        sequential_storage::map::store_item::<FlashKey, &[u8], _>(
            &mut self.flash,
            STORAGE_START..STORAGE_END,
            &mut NoCache::new(),
            &mut buf,
            &flash_key(key),
            &item,
        )
        .await
        .map_err(|e| {
            error!("Flash write error: {:?}", defmt::Debug2Format(&e));
            StoreError::Backend
        })
    }
}

impl<F: NorFlash> PersistentStore for FlashStore<F> {
    async fn load(&mut self, key: &str) -> Result<Option<Value>, StoreError> {
        let mut buf = [0u8; ITEM_BUF_SIZE];

        match sequential_storage::map::fetch_item::<FlashKey, &[u8], _>(
            &mut self.flash,
            STORAGE_START..STORAGE_END,
            &mut NoCache::new(),
            &mut buf,
            &flash_key(key),
        )
        .await
        {
            Ok(Some(data)) => Value::decode(data).map(Some),
            Ok(None) => {
                debug!("Flash: no item for {}", key);
                Ok(None)
            }
            Err(e) => {
                error!("Flash read error: {:?}", defmt::Debug2Format(&e));
                Err(StoreError::Backend)
            }
        }
    }

    async fn create(&mut self, key: &str, value: &Value) -> Result<(), StoreError> {
        self.write(key, value).await
    }

    /// Items are written one after another; a failure part-way leaves the
    /// earlier items updated.
    async fn save_batch(&mut self, entries: &[(StoreKey, Value)]) -> Result<(), StoreError> {
        for (key, value) in entries {
            self.write(key, value).await?;
        }
        Ok(())
    }
}
