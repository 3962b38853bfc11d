//! File-backed course directory.
//!
//! Course content and enrollment are external to the pipeline; this
//! implementation reads them from a `courses.json` next to the database so
//! the gateway runs standalone. Deployments with a real backend swap in
//! their own [`CourseDirectory`].

use std::{path::Path, sync::Arc};

use {
    async_trait::async_trait,
    serde::Deserialize,
    tokio::sync::RwLock,
    tracing::info,
};

use {
    lernio_queue::LessonQuiz,
    lernio_scheduler::{CourseDirectory, LessonContent},
};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CourseFile {
    course_id: String,
    #[serde(default)]
    lessons: Vec<LessonFile>,
    #[serde(default)]
    roster: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LessonFile {
    lesson_id: String,
    title: String,
    body: String,
    #[serde(default)]
    media_url: Option<String>,
    #[serde(default)]
    quiz: Option<LessonQuiz>,
}

/// Directory loaded from a JSON file, reloadable at runtime.
pub struct JsonCourseDirectory {
    courses: RwLock<Vec<CourseFile>>,
}

impl JsonCourseDirectory {
    /// Load from `path`; a missing file yields an empty directory.
    pub fn load(path: &Path) -> anyhow::Result<Arc<Self>> {
        let courses = if path.exists() {
            let raw = std::fs::read_to_string(path)?;
            let courses: Vec<CourseFile> = serde_json::from_str(&raw)?;
            info!(path = %path.display(), count = courses.len(), "loaded course directory");
            courses
        } else {
            info!(path = %path.display(), "no course file, directory is empty");
            Vec::new()
        };
        Ok(Arc::new(Self {
            courses: RwLock::new(courses),
        }))
    }

    async fn course(&self, course_id: &str) -> anyhow::Result<CourseFile> {
        self.courses
            .read()
            .await
            .iter()
            .find(|c| c.course_id == course_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("unknown course: {course_id}"))
    }
}

#[async_trait]
impl CourseDirectory for JsonCourseDirectory {
    async fn lesson_count(&self, course_id: &str) -> anyhow::Result<u32> {
        Ok(self.course(course_id).await?.lessons.len() as u32)
    }

    async fn lesson(&self, course_id: &str, index: u32) -> anyhow::Result<Option<LessonContent>> {
        let course = self.course(course_id).await?;
        Ok(course.lessons.get(index as usize).map(|l| LessonContent {
            lesson_id: l.lesson_id.clone(),
            title: l.title.clone(),
            body: l.body.clone(),
            media_url: l.media_url.clone(),
            quiz: l.quiz.clone(),
        }))
    }

    async fn roster(&self, course_id: &str) -> anyhow::Result<Vec<String>> {
        Ok(self.course(course_id).await?.roster)
    }
}
