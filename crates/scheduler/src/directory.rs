//! Course content and roster seam.
//!
//! Course, lesson, and enrollment persistence live outside the pipeline;
//! the scheduler only needs to read lesson content and the enrolled
//! recipients at fan-out time.

use async_trait::async_trait;

use lernio_queue::LessonQuiz;

/// Content of one lesson, snapshotted into the job payload at fan-out.
#[derive(Debug, Clone, PartialEq)]
pub struct LessonContent {
    pub lesson_id: String,
    pub title: String,
    pub body: String,
    pub media_url: Option<String>,
    pub quiz: Option<LessonQuiz>,
}

/// Read access to courses and enrollments.
#[async_trait]
pub trait CourseDirectory: Send + Sync {
    /// Total lessons in the course timeline.
    async fn lesson_count(&self, course_id: &str) -> anyhow::Result<u32>;

    /// Lesson at a timeline index, `None` past the end.
    async fn lesson(&self, course_id: &str, index: u32) -> anyhow::Result<Option<LessonContent>>;

    /// Recipient addresses of all enrolled learners.
    async fn roster(&self, course_id: &str) -> anyhow::Result<Vec<String>>;
}
