use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use course_core::model::{CourseContent, CourseId};
use services::{CollaboratorError, ContentCatalog};
use tracing::debug;

/// Reads course structure from `<dir>/<course_id>.json`.
#[derive(Debug, Clone)]
pub struct JsonDirCatalog {
    dir: PathBuf,
}

impl JsonDirCatalog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, course: CourseId) -> PathBuf {
        self.dir.join(format!("{course}.json"))
    }

    /// Every course id with a content file in the directory.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory cannot be listed.
    pub async fn course_ids(&self) -> io::Result<Vec<CourseId>> {
        let mut ids = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if let Some(id) = course_id_from_path(&entry.path()) {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }
}

fn course_id_from_path(path: &Path) -> Option<CourseId> {
    if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
        return None;
    }
    path.file_stem()?.to_str()?.parse().ok()
}

#[async_trait]
impl ContentCatalog for JsonDirCatalog {
    async fn course_content(
        &self,
        course: CourseId,
    ) -> Result<Arc<CourseContent>, CollaboratorError> {
        let path = self.path_for(course);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(CollaboratorError::UnknownCourse(course));
            }
            Err(err) => {
                return Err(CollaboratorError::Unavailable(format!(
                    "{}: {err}",
                    path.display()
                )));
            }
        };

        let content: CourseContent = serde_json::from_str(&raw).map_err(|err| {
            CollaboratorError::Unavailable(format!("{}: {err}", path.display()))
        })?;
        content.validate().map_err(|err| {
            CollaboratorError::Unavailable(format!("{}: {err}", path.display()))
        })?;
        debug!(%course, lectures = content.total_lectures(), "course content loaded");
        Ok(Arc::new(content))
    }
}
