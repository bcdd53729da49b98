use crate::prelude::*;

use std::sync::Mutex;

use bytes::Bytes;
use indexmap::IndexMap;

use super::{BlobStore, NewFile, join_locator, new_blob_key};
use crate::base::Attachment;

const MEMORY_LOCATOR_BASE: &str = "memory://blobs";

#[derive(Default)]
struct State {
    objects: IndexMap<String, Bytes>,
    upload_calls: Vec<String>,
    delete_calls: Vec<String>,
    failing_uploads: HashSet<String>,
    failing_deletes: HashSet<String>,
    unreachable: bool,
}

/// Process-local blob store. Keeps a log of every call and can be told to fail
/// specific uploads or deletes.
#[derive(Default)]
pub struct MemoryBlobStore {
    state: Mutex<State>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Uploads of a file with this name fail.
    pub fn fail_uploads_named(&self, file_name: impl Into<String>) {
        self.state().failing_uploads.insert(file_name.into());
    }

    /// Deletes of this key fail; the object is kept.
    pub fn fail_deletes_of(&self, external_id: impl Into<String>) {
        self.state().failing_deletes.insert(external_id.into());
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.state().unreachable = unreachable;
    }

    pub fn contains(&self, external_id: &str) -> bool {
        self.state().objects.contains_key(external_id)
    }

    pub fn stored_ids(&self) -> Vec<String> {
        self.state().objects.keys().cloned().collect()
    }

    /// File names of every upload attempt, in call order.
    pub fn upload_calls(&self) -> Vec<String> {
        self.state().upload_calls.clone()
    }

    /// Keys of every delete attempt, in call order.
    pub fn delete_calls(&self) -> Vec<String> {
        self.state().delete_calls.clone()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(&self, file: &NewFile, folder: &str) -> anyhow::Result<Attachment> {
        let mut state = self.state();
        state.upload_calls.push(file.file_name.clone());
        if state.unreachable {
            bail!("blob store unreachable");
        }
        if state.failing_uploads.contains(&file.file_name) {
            bail!("upload of `{}` rejected", file.file_name);
        }
        let key = new_blob_key(folder, file);
        state.objects.insert(key.clone(), file.bytes.clone());
        Ok(Attachment {
            locator: join_locator(MEMORY_LOCATOR_BASE, &key),
            external_id: key,
            kind: file.kind(),
        })
    }

    async fn delete(&self, external_id: &str) -> anyhow::Result<()> {
        let mut state = self.state();
        state.delete_calls.push(external_id.to_string());
        if state.unreachable {
            bail!("blob store unreachable");
        }
        if state.failing_deletes.contains(external_id) {
            bail!("delete of `{external_id}` rejected");
        }
        state.objects.shift_remove(external_id);
        Ok(())
    }

    async fn ping(&self) -> anyhow::Result<()> {
        if self.state().unreachable {
            bail!("blob store unreachable");
        }
        Ok(())
    }
}
