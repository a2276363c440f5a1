//! Content tree handed to the downloader
//!
//! A tree is an ordered list of courses, each made of ordered chapters, each made
//! of ordered items. The tree is produced elsewhere (scraping is not our job) and
//! is only ever read here.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use url::Url;

use crate::util::sanitize_file_name;

#[derive(Error, Debug)]
pub enum ContentError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid content tree JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Course title {0:?} does not make a usable directory name")]
    InvalidCourseTitle(String),

    #[error("Invalid URL {url:?} for {owner:?}: {reason}")]
    InvalidUrl {
        owner: String,
        url: String,
        reason: String,
    },
}

/// The full set of courses for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentTree {
    pub courses: Vec<Course>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub title: String,
    #[serde(default)]
    pub chapters: Vec<Chapter>,
    /// Bundled exercise files, fetched after every chapter is done
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exercise_archive_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub title: String,
    #[serde(default)]
    pub items: Vec<Item>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub title: String,
    pub download_url: String,
    /// Subtitle text, written verbatim next to the media file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitles: Option<String>,
}

impl ContentTree {
    pub fn new(courses: Vec<Course>) -> Self {
        Self { courses }
    }

    pub fn from_json_str(json: &str) -> Result<Self, ContentError> {
        Ok(serde_json::from_str(json)?)
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ContentError> {
        let json = tokio::fs::read_to_string(path).await?;
        Self::from_json_str(&json)
    }

    pub fn len(&self) -> usize {
        self.courses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.courses.is_empty()
    }

    /// Check every course title and URL in the tree before any work starts.
    ///
    /// Course directories are named after the bare title, so a title that
    /// sanitizes to nothing, `.` or `..` would point outside the destination.
    pub fn validate(&self) -> Result<(), ContentError> {
        for course in &self.courses {
            if matches!(sanitize_file_name(&course.title).as_str(), "" | "." | "..") {
                return Err(ContentError::InvalidCourseTitle(course.title.clone()));
            }
            if let Some(url) = &course.exercise_archive_url {
                check_url(&course.title, url)?;
            }
            for chapter in &course.chapters {
                for item in &chapter.items {
                    check_url(&item.title, &item.download_url)?;
                }
            }
        }
        Ok(())
    }
}

impl Course {
    /// Number of items across all chapters of this course.
    pub fn total_items(&self) -> usize {
        self.chapters.iter().map(|chapter| chapter.items.len()).sum()
    }
}

fn check_url(owner: &str, raw: &str) -> Result<(), ContentError> {
    let invalid = |reason: String| ContentError::InvalidUrl {
        owner: owner.to_string(),
        url: raw.to_string(),
        reason,
    };

    let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(invalid(format!("unsupported scheme {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TREE: &str = r#"[
        {
            "title": "Rust Basics",
            "exercise_archive_url": "https://example.com/ex.zip",
            "chapters": [
                {
                    "title": "Intro",
                    "items": [
                        { "title": "Welcome", "download_url": "https://example.com/1.mp4", "subtitles": "1\n00:00:00,000 --> 00:00:01,000\nhi\n" },
                        { "title": "Setup", "download_url": "https://example.com/2.mp4" }
                    ]
                },
                { "title": "Empty" }
            ]
        }
    ]"#;

    #[test]
    fn test_parse_tree() {
        let tree = ContentTree::from_json_str(TREE).unwrap();
        assert_eq!(tree.len(), 1);

        let course = &tree.courses[0];
        assert_eq!(course.title, "Rust Basics");
        assert_eq!(course.chapters.len(), 2);
        assert_eq!(course.total_items(), 2);
        assert!(course.chapters[1].items.is_empty());
        assert!(course.chapters[0].items[0].subtitles.is_some());
        assert!(course.chapters[0].items[1].subtitles.is_none());
        assert!(tree.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_urls() {
        let mut tree = ContentTree::from_json_str(TREE).unwrap();
        tree.courses[0].chapters[0].items[1].download_url = "not a url".to_string();
        assert!(matches!(
            tree.validate(),
            Err(ContentError::InvalidUrl { owner, .. }) if owner == "Setup"
        ));

        tree.courses[0].chapters[0].items[1].download_url = "ftp://example.com/2.mp4".to_string();
        assert!(tree.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_escaping_course_titles() {
        let mut tree = ContentTree::from_json_str(TREE).unwrap();
        for title in ["..", ".", "", "???", "/.."] {
            tree.courses[0].title = title.to_string();
            assert!(
                matches!(tree.validate(), Err(ContentError::InvalidCourseTitle(t)) if t == title),
                "{title:?} should be rejected"
            );
        }

        tree.courses[0].title = "...".to_string();
        assert!(tree.validate().is_ok());
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tree.json");
        tokio::fs::write(&path, TREE).await.unwrap();

        let tree = ContentTree::load(&path).await.unwrap();
        assert_eq!(tree.courses[0].chapters[0].items[0].title, "Welcome");
    }
}
