//! Chapter JSON ingestion: deserialize the on-disk chapter description and
//! convert it into the library's sample/metadata types, resolving `image`/
//! `cover` paths relative to the JSON file's own directory.

use anyhow::{Context, Result};
use chapterforge::{ChapterImageSample, ChapterTextSample, MetadataSet};
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct PendingChapter {
    start_ms: u32,
    title: String,
    image: Option<String>,
    url: Option<String>,
    url_text: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ChapterFile {
    #[serde(default)]
    title: String,
    #[serde(default)]
    artist: String,
    #[serde(default)]
    album: String,
    #[serde(default)]
    genre: String,
    #[serde(default)]
    year: String,
    #[serde(default)]
    comment: String,
    #[serde(default)]
    cover: Option<String>,
    #[serde(default)]
    chapters: Vec<PendingChapter>,
}

pub struct LoadedChapters {
    pub titles: Vec<ChapterTextSample>,
    pub urls: Vec<ChapterTextSample>,
    pub images: Vec<ChapterImageSample>,
    pub metadata: MetadataSet,
}

fn read_file_bytes(base_dir: &Path, relative: &str) -> Result<Vec<u8>> {
    let path = base_dir.join(relative);
    fs::read(&path).with_context(|| format!("cannot read {}", path.display()))
}

/// Load and convert `chapters.json`. Image/cover paths are resolved relative
/// to the JSON file's parent directory, not the process's current directory.
pub fn load_chapters(json_path: &Path) -> Result<LoadedChapters> {
    let text = fs::read_to_string(json_path)
        .with_context(|| format!("cannot read {}", json_path.display()))?;
    let file: ChapterFile =
        serde_json::from_str(&text).with_context(|| format!("malformed chapter JSON: {}", json_path.display()))?;
    let base_dir = json_path.parent().unwrap_or_else(|| Path::new("."));

    let has_url_track = file.chapters.iter().any(|c| c.url.is_some() || c.url_text.is_some());

    let mut titles = Vec::with_capacity(file.chapters.len());
    let mut urls = Vec::new();
    let mut images = Vec::new();

    for chapter in &file.chapters {
        titles.push(ChapterTextSample {
            text: chapter.title.clone(),
            href: chapter.url.clone().unwrap_or_default(),
            start_ms: chapter.start_ms,
        });

        if has_url_track {
            urls.push(ChapterTextSample {
                text: chapter.url_text.clone().unwrap_or_default(),
                href: String::new(),
                start_ms: chapter.start_ms,
            });
        }

        if let Some(image_path) = &chapter.image {
            let data = read_file_bytes(base_dir, image_path)?;
            images.push(ChapterImageSample {
                data,
                start_ms: chapter.start_ms,
            });
        }
    }

    let cover = match &file.cover {
        Some(path) => read_file_bytes(base_dir, path)?,
        None => Vec::new(),
    };

    let metadata = MetadataSet {
        title: file.title,
        artist: file.artist,
        album: file.album,
        genre: file.genre,
        year: file.year,
        comment: file.comment,
        cover,
    };

    Ok(LoadedChapters {
        titles,
        urls,
        images,
        metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_chapters_without_url_track() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chapters.json");
        let mut f = fs::File::create(&path).unwrap();
        write!(
            f,
            r#"{{"title":"My Show","chapters":[{{"start_ms":0,"title":"Intro"}},{{"start_ms":5000,"title":"Body"}}]}}"#
        )
        .unwrap();
        drop(f);

        let loaded = load_chapters(&path).unwrap();
        assert_eq!(loaded.titles.len(), 2);
        assert!(loaded.urls.is_empty());
        assert_eq!(loaded.metadata.title, "My Show");
    }

    #[test]
    fn url_field_synthesizes_url_track() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chapters.json");
        let mut f = fs::File::create(&path).unwrap();
        write!(
            f,
            r#"{{"chapters":[{{"start_ms":0,"title":"Intro","url":"https://example.com"}}]}}"#
        )
        .unwrap();
        drop(f);

        let loaded = load_chapters(&path).unwrap();
        assert_eq!(loaded.titles[0].href, "https://example.com");
        assert_eq!(loaded.urls.len(), 1);
        assert_eq!(loaded.urls[0].text, "");
    }
}
