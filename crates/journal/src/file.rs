//! File-backed journal: one append-only file per plan.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use steward_core::PlanId;
use steward_execution::JournalEntry;
use steward_plan::PlanDefinition;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::codec;
use crate::error::{JournalCorruption, JournalError};
use crate::store::{Journal, LoadedPlan, check_first, created_entry};

/// File extension of plan journals.
pub const JOURNAL_EXTENSION: &str = "journal";

/// Journal storing each plan in `<dir>/<plan-id>.journal`.
///
/// Appends are written with `O_APPEND` and flushed with `sync_data` before
/// returning. Appends to one plan are serialized by a per-plan lock; plans
/// never share a file.
#[derive(Debug)]
pub struct FileJournal {
    dir: PathBuf,
    handles: DashMap<PlanId, Arc<Mutex<File>>>,
}

impl FileJournal {
    /// Open (creating if needed) a journal directory.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, JournalError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| JournalError::io(&dir, e))?;
        tracing::debug!(dir = %dir.display(), "journal directory ready");
        Ok(Self {
            dir,
            handles: DashMap::new(),
        })
    }

    /// Journal directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of a plan's journal file.
    pub fn path_for(&self, plan_id: PlanId) -> PathBuf {
        self.dir.join(format!("{plan_id}.{JOURNAL_EXTENSION}"))
    }

    async fn handle(&self, plan_id: PlanId) -> Result<Arc<Mutex<File>>, JournalError> {
        if let Some(handle) = self.handles.get(&plan_id) {
            return Ok(Arc::clone(handle.value()));
        }
        let path = self.path_for(plan_id);
        let file = OpenOptions::new()
            .append(true)
            .open(&path)
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => JournalError::PlanNotFound(plan_id),
                _ => JournalError::io(&path, e),
            })?;
        let handle = self
            .handles
            .entry(plan_id)
            .or_insert_with(|| Arc::new(Mutex::new(file)));
        Ok(Arc::clone(handle.value()))
    }

    async fn write_record(file: &mut File, path: &Path, line: &str) -> Result<(), JournalError> {
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| JournalError::io(path, e))?;
        file.sync_data().await.map_err(|e| JournalError::io(path, e))
    }

    /// Make a new file's directory entry durable.
    async fn sync_dir(&self) {
        match File::open(&self.dir).await {
            Ok(dir) => {
                if let Err(e) = dir.sync_all().await {
                    tracing::debug!(error = %e, "journal directory sync not supported");
                }
            }
            Err(e) => tracing::debug!(error = %e, "journal directory sync not supported"),
        }
    }

    async fn truncate(&self, corruption: &JournalCorruption) -> Result<(), JournalError> {
        let path = self.path_for(corruption.plan_id);
        let lock = self.handles.get(&corruption.plan_id).map(|h| Arc::clone(h.value()));
        let _guard = match &lock {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };
        let file = OpenOptions::new()
            .write(true)
            .open(&path)
            .await
            .map_err(|e| JournalError::io(&path, e))?;
        file.set_len(corruption.offset)
            .await
            .map_err(|e| JournalError::io(&path, e))?;
        file.sync_all().await.map_err(|e| JournalError::io(&path, e))
    }
}

#[async_trait]
impl Journal for FileJournal {
    async fn create(&self, definition: &PlanDefinition) -> Result<(), JournalError> {
        let path = self.path_for(definition.id);
        let line = codec::encode(&created_entry(definition))?;
        let mut file = OpenOptions::new()
            .append(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => JournalError::PlanExists(definition.id),
                _ => JournalError::io(&path, e),
            })?;
        Self::write_record(&mut file, &path, &line).await?;
        self.sync_dir().await;
        self.handles
            .insert(definition.id, Arc::new(Mutex::new(file)));
        tracing::debug!(plan_id = %definition.id, path = %path.display(), "journal created");
        Ok(())
    }

    async fn append(&self, plan_id: PlanId, entry: &JournalEntry) -> Result<(), JournalError> {
        let line = codec::encode(entry)?;
        let handle = self.handle(plan_id).await?;
        let mut file = handle.lock().await;
        Self::write_record(&mut file, &self.path_for(plan_id), &line).await?;
        tracing::trace!(%plan_id, event = entry.event_name(), "journal append");
        Ok(())
    }

    async fn load_plan(&self, plan_id: PlanId) -> Result<LoadedPlan, JournalError> {
        let path = self.path_for(plan_id);
        let bytes = fs::read(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => JournalError::PlanNotFound(plan_id),
            _ => JournalError::io(&path, e),
        })?;

        let scan = codec::scan(plan_id, &bytes);
        if let Some(corruption) = &scan.corruption {
            if scan.entries.is_empty() {
                return Err(JournalError::Corruption(corruption.clone()));
            }
            tracing::warn!(
                %plan_id,
                line = corruption.line,
                discarded_bytes = corruption.discarded_bytes,
                reason = %corruption.reason,
                "discarding corrupt journal tail"
            );
            self.truncate(corruption).await?;
        }
        check_first(plan_id, &scan.entries)?;

        Ok(LoadedPlan {
            plan_id,
            entries: scan.entries,
            corruption: scan.corruption,
        })
    }

    async fn list_plans(&self) -> Result<Vec<PlanId>, JournalError> {
        let mut dir = fs::read_dir(&self.dir)
            .await
            .map_err(|e| JournalError::io(&self.dir, e))?;
        let mut plans = Vec::new();
        while let Some(item) = dir
            .next_entry()
            .await
            .map_err(|e| JournalError::io(&self.dir, e))?
        {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some(JOURNAL_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match PlanId::parse(stem) {
                Ok(id) => plans.push(id),
                Err(_) => tracing::debug!(path = %path.display(), "skipping foreign journal file"),
            }
        }
        plans.sort();
        Ok(plans)
    }
}
