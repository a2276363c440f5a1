//! Download course trees (courses, chapters, videos, subtitles and exercise
//! archives) over HTTP into a matching directory hierarchy.

pub mod config;
pub mod content;
pub mod course;
pub mod download;
pub mod util;
