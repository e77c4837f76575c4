use super::BulkError;
use super::import::ImportRow;
use crate::models::{GenerationResult, ImageUpload, ProductInput};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub const PAGE_SIZE: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    PendingImage,
    Ready,
    Generating,
    Completed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::PendingImage => "pending_image",
            TaskStatus::Ready => "ready",
            TaskStatus::Generating => "generating",
            TaskStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkTaskItem {
    pub id: String,
    pub name: String,
    pub core_selling_point: String,
    pub target_audience: String,
    pub brand_tone: String,
    /// Raw upload; its data URI is mirrored in `image_preview`.
    #[serde(skip)]
    pub image: Option<ImageUpload>,
    pub image_preview: Option<String>,
    pub mock_image_url: Option<String>,
    pub status: TaskStatus,
    pub result: Option<GenerationResult>,
}

impl BulkTaskItem {
    pub fn from_row(row: ImportRow) -> Self {
        Self {
            id: format!("task-{}", Uuid::new_v4().simple()),
            name: row.name,
            core_selling_point: row.core_selling_point,
            target_audience: row.target_audience,
            brand_tone: row.brand_tone,
            image: None,
            image_preview: None,
            mock_image_url: None,
            status: TaskStatus::PendingImage,
            result: None,
        }
    }

    fn image_source(&self) -> Option<&str> {
        self.image_preview
            .as_deref()
            .or(self.mock_image_url.as_deref())
            .filter(|source| !source.trim().is_empty())
    }

    /// `Some` stores the upload and makes the task ready; `None` removes any
    /// image (mock included) and sends it back to `pending_image`.
    pub(super) fn attach_image(
        &mut self,
        upload: Option<ImageUpload>,
    ) -> Result<TaskStatus, BulkError> {
        match self.status {
            TaskStatus::PendingImage | TaskStatus::Ready => {}
            TaskStatus::Generating | TaskStatus::Completed => {
                return Err(BulkError::NotReady {
                    id: self.id.clone(),
                    status: self.status,
                });
            }
        }
        match upload {
            Some(upload) => {
                upload.validate()?;
                self.image_preview = Some(upload.to_data_uri());
                self.image = Some(upload);
                self.mock_image_url = None;
                self.status = TaskStatus::Ready;
            }
            None => {
                self.image = None;
                self.image_preview = None;
                self.mock_image_url = None;
                self.status = TaskStatus::PendingImage;
            }
        }
        Ok(self.status)
    }

    pub(super) fn attach_mock_image(&mut self, url: String) -> Result<TaskStatus, BulkError> {
        match self.status {
            TaskStatus::PendingImage | TaskStatus::Ready => {
                self.mock_image_url = Some(url);
                self.status = TaskStatus::Ready;
                Ok(self.status)
            }
            TaskStatus::Generating | TaskStatus::Completed => Err(BulkError::NotReady {
                id: self.id.clone(),
                status: self.status,
            }),
        }
    }

    /// Checks readiness and image together, then moves to `generating` and
    /// hands back the request for the generator.
    pub(super) fn begin_generation(&mut self) -> Result<ProductInput, BulkError> {
        match self.status {
            TaskStatus::Ready => {}
            TaskStatus::PendingImage | TaskStatus::Generating | TaskStatus::Completed => {
                return Err(BulkError::NotReady {
                    id: self.id.clone(),
                    status: self.status,
                });
            }
        }
        let Some(source) = self.image_source().map(str::to_string) else {
            return Err(BulkError::MissingImage(self.id.clone()));
        };
        self.status = TaskStatus::Generating;
        Ok(ProductInput {
            name: self.name.clone(),
            brand: self.brand_tone.clone(),
            category: String::new(),
            target_audience: self.target_audience.clone(),
            selling_points: Some(self.core_selling_point.clone())
                .filter(|points| !points.trim().is_empty()),
            image: self.image.clone(),
            image_preview: Some(source),
        })
    }

    /// Settles a `generating` task. Returns the status it ended in, or `None`
    /// when the task was not generating.
    pub(super) fn finish_generation(&mut self, result: Option<GenerationResult>) -> Option<TaskStatus> {
        match self.status {
            TaskStatus::Generating => {}
            TaskStatus::PendingImage | TaskStatus::Ready | TaskStatus::Completed => return None,
        }
        match result {
            Some(result) => {
                self.result = Some(result);
                self.status = TaskStatus::Completed;
            }
            None => self.status = TaskStatus::Ready,
        }
        Some(self.status)
    }
}

/// Imported tasks in import order plus the pagination cursor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkImportData {
    pub tasks: Vec<BulkTaskItem>,
    pub total_count: usize,
    pub current_page: usize,
    pub page_size: usize,
}

impl BulkImportData {
    pub fn from_rows(rows: Vec<ImportRow>) -> Self {
        let tasks: Vec<BulkTaskItem> = rows.into_iter().map(BulkTaskItem::from_row).collect();
        Self {
            total_count: tasks.len(),
            tasks,
            current_page: 1,
            page_size: PAGE_SIZE,
        }
    }

    pub fn page_count(&self) -> usize {
        self.total_count.div_ceil(self.page_size)
    }

    /// Moves the cursor; out-of-range pages leave it untouched.
    pub fn change_page(&mut self, page: usize) -> bool {
        if page >= 1 && page <= self.page_count() {
            self.current_page = page;
            true
        } else {
            false
        }
    }

    pub fn page_window(&self) -> &[BulkTaskItem] {
        let start = (self.current_page.saturating_sub(1) * self.page_size).min(self.tasks.len());
        let end = (self.current_page * self.page_size).min(self.tasks.len());
        &self.tasks[start..end]
    }

    pub fn task(&self, id: &str) -> Option<&BulkTaskItem> {
        self.tasks.iter().find(|task| task.id == id)
    }

    pub(super) fn task_mut(&mut self, id: &str) -> Result<&mut BulkTaskItem, BulkError> {
        self.tasks
            .iter_mut()
            .find(|task| task.id == id)
            .ok_or_else(|| BulkError::UnknownTask(id.to_string()))
    }
}
