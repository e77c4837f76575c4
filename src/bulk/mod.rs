//! Bulk generation: imported rows become tasks that move through
//! `pending_image → ready → generating → completed`, one page of twenty at a
//! time. Batch runs are strictly sequential.

pub mod import;
pub mod task;

pub use import::ImportRow;
pub use task::{BulkTaskItem, TaskStatus};

use task::BulkImportData;

use crate::error::{GenerationError, GenerationErrorKind};
use crate::models::{Credentials, ImageUpload};
use crate::orchestrator::ContentGenerator;
use parking_lot::Mutex;
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum BulkError {
    #[error("unknown task `{0}`")]
    UnknownTask(String),
    #[error("task `{id}` is {status}")]
    NotReady { id: String, status: TaskStatus },
    #[error("task `{0}` has no image")]
    MissingImage(String),
    /// Rejected locally: bad upload or no text key.
    #[error(transparent)]
    Invalid(#[from] GenerationError),
    /// The generator failed; the task was put back in `status`.
    #[error("task `{id}` failed: {source}")]
    Generation {
        id: String,
        status: TaskStatus,
        #[source]
        source: GenerationError,
    },
}

impl BulkError {
    /// Where a task ended up after this error, when the error concerns one.
    pub fn task_status(&self) -> Option<TaskStatus> {
        match self {
            BulkError::NotReady { status, .. } | BulkError::Generation { status, .. } => {
                Some(*status)
            }
            BulkError::UnknownTask(_) | BulkError::MissingImage(_) | BulkError::Invalid(_) => None,
        }
    }

    pub fn generation_kind(&self) -> Option<GenerationErrorKind> {
        match self {
            BulkError::Invalid(err) | BulkError::Generation { source: err, .. } => Some(err.kind()),
            BulkError::UnknownTask(_)
            | BulkError::NotReady { .. }
            | BulkError::MissingImage(_) => None,
        }
    }
}

/// The window the front-end renders.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageView {
    pub tasks: Vec<BulkTaskItem>,
    pub total_count: usize,
    pub current_page: usize,
    pub page_size: usize,
    pub page_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchFailure {
    pub id: String,
    pub name: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub page: usize,
    pub attempted: usize,
    pub completed: Vec<String>,
    pub failed: Vec<BatchFailure>,
}

#[derive(Clone)]
pub struct BulkPipeline {
    data: Arc<Mutex<BulkImportData>>,
    generator: Arc<dyn ContentGenerator>,
}

impl BulkPipeline {
    pub fn new(generator: Arc<dyn ContentGenerator>) -> Self {
        Self {
            data: Arc::new(Mutex::new(BulkImportData::from_rows(Vec::new()))),
            generator,
        }
    }

    /// Replaces every task with a fresh import and rewinds to page 1.
    pub fn import(&self, rows: Vec<ImportRow>) -> PageView {
        let data = BulkImportData::from_rows(rows);
        info!(
            target = "vibe.bulk",
            total = data.total_count,
            pages = data.page_count(),
            "bulk import loaded"
        );
        *self.data.lock() = data;
        self.page_view()
    }

    #[cfg(test)]
    pub fn snapshot(&self) -> BulkImportData {
        self.data.lock().clone()
    }

    pub fn page_view(&self) -> PageView {
        let data = self.data.lock();
        PageView {
            tasks: data.page_window().to_vec(),
            total_count: data.total_count,
            current_page: data.current_page,
            page_size: data.page_size,
            page_count: data.page_count(),
        }
    }

    pub fn task(&self, id: &str) -> Option<BulkTaskItem> {
        self.data.lock().task(id).cloned()
    }

    pub fn change_page(&self, page: usize) -> PageView {
        if !self.data.lock().change_page(page) {
            info!(target = "vibe.bulk", page = page, "page out of range; ignored");
        }
        self.page_view()
    }

    pub fn attach_image(
        &self,
        id: &str,
        upload: Option<ImageUpload>,
    ) -> Result<BulkTaskItem, BulkError> {
        let mut data = self.data.lock();
        let task = data.task_mut(id)?;
        let from = task.status;
        let to = task.attach_image(upload)?;
        record_transition(id, from, to);
        Ok(task.clone())
    }

    pub fn attach_mock_image(&self, id: &str) -> Result<BulkTaskItem, BulkError> {
        let url = format!(
            "https://picsum.photos/80?random={}",
            rand::rng().random_range(0..1000u32)
        );
        let mut data = self.data.lock();
        let task = data.task_mut(id)?;
        let from = task.status;
        let to = task.attach_mock_image(url)?;
        record_transition(id, from, to);
        Ok(task.clone())
    }

    /// Runs one ready task through the generator. On failure the task goes
    /// back to `ready` so it can be retried by hand.
    pub async fn generate_one(
        &self,
        id: &str,
        credentials: &Credentials,
    ) -> Result<BulkTaskItem, BulkError> {
        if credentials.text_key().is_none() {
            return Err(GenerationError::validation(
                "bulk",
                "text-generation API key is not configured",
            )
            .into());
        }

        let input = {
            let mut data = self.data.lock();
            let task = data.task_mut(id)?;
            let input = task.begin_generation()?;
            record_transition(id, TaskStatus::Ready, TaskStatus::Generating);
            input
        };
        let in_flight = InFlight::new(self.data.clone(), id);

        let outcome = self.generator.generate_with(input, credentials).await;

        in_flight.disarm();
        let mut data = self.data.lock();
        // A re-import while we were waiting drops the task; nothing to settle.
        let task = data.task_mut(id)?;
        match outcome {
            Ok(result) => {
                if let Some(to) = task.finish_generation(Some(result)) {
                    record_transition(id, TaskStatus::Generating, to);
                }
                Ok(task.clone())
            }
            Err(source) => {
                if let Some(to) = task.finish_generation(None) {
                    record_transition(id, TaskStatus::Generating, to);
                }
                warn!(
                    target = "vibe.bulk",
                    task_id = id,
                    kind = %source.kind(),
                    error = %source,
                    "task generation failed; back to ready"
                );
                Err(BulkError::Generation {
                    id: id.to_string(),
                    status: task.status,
                    source,
                })
            }
        }
    }

    /// Generates every task that is `ready` on the current page right now, in
    /// page order, one at a time. Failures are collected and the loop goes on.
    pub async fn generate_all_on_page(
        &self,
        credentials: &Credentials,
    ) -> Result<BatchReport, BulkError> {
        if credentials.text_key().is_none() {
            return Err(GenerationError::validation(
                "bulk",
                "text-generation API key is not configured",
            )
            .into());
        }

        let (page, selected) = {
            let data = self.data.lock();
            let selected: Vec<(String, String)> = data
                .page_window()
                .iter()
                .filter(|task| task.status == TaskStatus::Ready)
                .map(|task| (task.id.clone(), task.name.clone()))
                .collect();
            (data.current_page, selected)
        };

        info!(
            target = "vibe.bulk",
            page = page,
            ready = selected.len(),
            "batch generation started"
        );

        let mut report = BatchReport {
            page,
            ..BatchReport::default()
        };
        for (id, name) in selected {
            report.attempted += 1;
            match self.generate_one(&id, credentials).await {
                Ok(_) => report.completed.push(id),
                Err(err) => report.failed.push(BatchFailure {
                    id,
                    name,
                    error: match &err {
                        BulkError::Generation { source, .. } => source.to_string(),
                        other => other.to_string(),
                    },
                }),
            }
        }

        info!(
            target = "vibe.bulk",
            page = page,
            attempted = report.attempted,
            completed = report.completed.len(),
            failed = report.failed.len(),
            "batch generation finished"
        );
        Ok(report)
    }
}

/// Puts a task back to `ready` if its generation future is dropped before it
/// settles (client went away, caller timed out).
struct InFlight {
    data: Arc<Mutex<BulkImportData>>,
    id: String,
    armed: bool,
}

impl InFlight {
    fn new(data: Arc<Mutex<BulkImportData>>, id: &str) -> Self {
        Self {
            data,
            id: id.to_string(),
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut data = self.data.lock();
        let Ok(task) = data.task_mut(&self.id) else {
            return;
        };
        if let Some(to) = task.finish_generation(None) {
            record_transition(&self.id, TaskStatus::Generating, to);
            warn!(
                target = "vibe.bulk",
                task_id = %self.id,
                "generation abandoned before it settled; back to ready"
            );
        }
    }
}

fn record_transition(id: &str, from: TaskStatus, to: TaskStatus) {
    if from != to {
        crate::metrics::task_transition(id, from.as_str(), to.as_str());
    }
}
