use std::path::Path;

use anyhow::{Context, Result};

use crate::{DocId, DocumentData};

/// File name prefix of the per-shard stores inside the storage folder.
const STORE_FILE_PREFIX: &str = "docs";

/// One shard of the persistent document store: a sled tree keyed by
/// big-endian doc id with bincode-encoded [`DocumentData`] values.
pub struct StorageShard {
    db: sled::Db,
}

impl StorageShard {
    pub fn put(&self, doc_id: DocId, data: &DocumentData) -> Result<()> {
        let bytes = bincode::serialize(data).context("encoding document for storage")?;
        self.db
            .insert(doc_id.to_be_bytes(), bytes)
            .with_context(|| format!("storing document {doc_id}"))?;
        Ok(())
    }

    pub fn get(&self, doc_id: DocId) -> Result<Option<DocumentData>> {
        match self.db.get(doc_id.to_be_bytes())? {
            Some(bytes) => {
                let data = bincode::deserialize(&bytes)
                    .with_context(|| format!("decoding stored document {doc_id}"))?;
                Ok(Some(data))
            }
            None => Ok(None),
        }
    }

    /// Visits every stored record in ascending doc-id order. Used by engine
    /// recovery to replay documents through the normal submission path.
    pub fn for_each(&self, mut visit: impl FnMut(DocId, DocumentData)) -> Result<()> {
        for entry in self.db.iter() {
            let (key, value) = entry.context("reading document store")?;
            let key: [u8; 8] =
                key.as_ref().try_into().context("malformed document store key")?;
            let data =
                bincode::deserialize(&value).context("decoding stored document")?;
            visit(DocId::from_be_bytes(key), data);
        }
        Ok(())
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush().context("flushing document store")?;
        Ok(())
    }
}

/// Opens (or creates) `shards` store shards under `folder`. The shard count
/// must match the one the data was written with; recovery routing depends
/// on it.
pub fn open_shards(folder: &Path, shards: usize) -> Result<Vec<StorageShard>> {
    let mut opened = Vec::with_capacity(shards);
    for shard in 0..shards {
        let path = folder.join(format!("{STORE_FILE_PREFIX}.{shard}"));
        let db = sled::open(&path)
            .with_context(|| format!("opening document store {}", path.display()))?;
        opened.push(StorageShard { db });
    }
    Ok(opened)
}
