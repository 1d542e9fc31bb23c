//! Calendar and contact rendering behind a collaborator seam.
//!
//! The gateway only needs "given a caller target, produce a document".
//! Production deployments plug in a renderer that pulls schedule data
//! from the upstream API; [`FixtureRenderer`] produces deterministic
//! payloads for tests and the test server.

use std::collections::BTreeSet;

use async_trait::async_trait;

/// Failure to produce a resource document.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("upstream request failed: {0}")]
    Upstream(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("render task failed: {0}")]
    Task(String),
}

/// Produces calendar and contact documents.
#[async_trait]
pub trait ResourceRenderer: Send + Sync {
    /// iCalendar text for a student's schedule at a school.
    async fn calendar(&self, school_id: &str, student_id: &str) -> Result<String, RenderError>;

    /// vCard text for a student.
    async fn contact(&self, student_id: &str) -> Result<String, RenderError>;
}

/// Deterministic renderer with no upstream dependency.
#[derive(Debug, Clone, Default)]
pub struct FixtureRenderer {
    missing: BTreeSet<String>,
}

impl FixtureRenderer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `student_id` render as [`RenderError::NotFound`].
    #[must_use]
    pub fn without_student(mut self, student_id: impl Into<String>) -> Self {
        self.missing.insert(student_id.into());
        self
    }

    fn ensure_known(&self, student_id: &str) -> Result<(), RenderError> {
        if self.missing.contains(student_id) {
            Err(RenderError::NotFound(format!("student {student_id}")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ResourceRenderer for FixtureRenderer {
    async fn calendar(&self, school_id: &str, student_id: &str) -> Result<String, RenderError> {
        self.ensure_known(student_id)?;
        let (school, student) = (school_id.to_string(), student_id.to_string());
        // Serialization is CPU work; keep it off the async workers.
        tokio::task::spawn_blocking(move || render_calendar(&school, &student))
            .await
            .map_err(|e| RenderError::Task(e.to_string()))
    }

    async fn contact(&self, student_id: &str) -> Result<String, RenderError> {
        self.ensure_known(student_id)?;
        let student = student_id.to_string();
        tokio::task::spawn_blocking(move || render_contact(&student))
            .await
            .map_err(|e| RenderError::Task(e.to_string()))
    }
}

fn render_calendar(school_id: &str, student_id: &str) -> String {
    let lines = [
        "BEGIN:VCALENDAR".to_string(),
        "VERSION:2.0".to_string(),
        format!("PRODID:-//saturn//{school_id}-{student_id}//EN"),
        format!("X-WR-CALNAME:Saturn {} Schedule", title_case(school_id)),
        "END:VCALENDAR".to_string(),
    ];
    crlf(&lines)
}

fn render_contact(student_id: &str) -> String {
    let lines = [
        "BEGIN:VCARD".to_string(),
        "VERSION:3.0".to_string(),
        format!("UID:saturn-student-{student_id}"),
        format!("FN:Student {student_id}"),
        "END:VCARD".to_string(),
    ];
    crlf(&lines)
}

/// Content lines are CRLF terminated in both formats.
fn crlf(lines: &[String]) -> String {
    lines.iter().map(|l| format!("{l}\r\n")).collect()
}

/// `"north-ridge_high"` -> `"North Ridge High"`.
fn title_case(slug: &str) -> String {
    slug.split(['-', '_'])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_case_splits_slugs() {
        assert_eq!(title_case("north-ridge_HIGH"), "North Ridge High");
        assert_eq!(title_case("lincoln"), "Lincoln");
        assert_eq!(title_case("--"), "");
    }

    #[tokio::test]
    async fn calendar_is_crlf_vcalendar() {
        let text = FixtureRenderer::new().calendar("north-ridge", "42").await.unwrap();
        assert!(text.starts_with("BEGIN:VCALENDAR\r\n"));
        assert!(text.ends_with("END:VCALENDAR\r\n"));
        assert!(text.contains("X-WR-CALNAME:Saturn North Ridge Schedule\r\n"));
        assert!(text.contains("PRODID:-//saturn//north-ridge-42//EN"));
    }

    #[tokio::test]
    async fn contact_is_vcard() {
        let text = FixtureRenderer::new().contact("42").await.unwrap();
        assert!(text.starts_with("BEGIN:VCARD\r\n"));
        assert!(text.contains("UID:saturn-student-42\r\n"));
    }

    #[tokio::test]
    async fn missing_student_is_not_found() {
        let renderer = FixtureRenderer::new().without_student("7");
        assert!(matches!(
            renderer.contact("7").await,
            Err(RenderError::NotFound(_))
        ));
        assert!(matches!(
            renderer.calendar("school", "7").await,
            Err(RenderError::NotFound(_))
        ));
        assert!(renderer.contact("8").await.is_ok());
    }
}
