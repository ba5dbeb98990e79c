//! Metadata extraction and content hashing for one candidate file
//!
//! Tag parsing sits behind [`TagReader`] so the pipeline can run against
//! any parser; [`LoftyTagReader`] is the production implementation. A file
//! whose tags cannot be parsed is still catalogued with empty metadata. Only
//! a failure to hash the file keeps it out of the catalog.

use lofty::config::{ParseOptions, ParsingMode};
use lofty::file::{TaggedFile, TaggedFileExt};
use lofty::picture::MimeType;
use lofty::prelude::Accessor;
use lofty::probe::Probe;
use lofty::tag::{ItemKey, Tag};
use md5::{Digest, Md5};
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use crate::album_art::relative_to;
use crate::config::ScanJobConfig;
use crate::error::ScanError;
use crate::models::{CatalogEntry, NumberPair};
use crate::scanner::modified_millis;

/// Read buffer size for content hashing
pub const HASH_CHUNK_SIZE: usize = 64 * 1024;

/// Tags pulled out of an audio file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedTags {
    pub artist: Option<String>,
    pub album: Option<String>,
    pub title: Option<String>,
    pub year: Option<i32>,
    pub track: NumberPair,
    pub disk: NumberPair,
    /// First embedded picture, when covers were requested
    pub cover: Option<EmbeddedCover>,
}

/// Embedded picture bytes with the extension to store them under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedCover {
    pub data: Vec<u8>,
    pub extension: &'static str,
}

/// Pluggable tag parsing capability
pub trait TagReader {
    /// Parse the tags of `path`; embedded pictures are skipped when `skip_covers` is set
    fn read_tags(&self, path: &Path, skip_covers: bool) -> Result<ParsedTags, ScanError>;
}

/// [`TagReader`] backed by `lofty`
#[derive(Debug, Default, Clone, Copy)]
pub struct LoftyTagReader;

impl LoftyTagReader {
    fn parse_options(read_cover_art: bool, mode: ParsingMode, max_junk_bytes: usize) -> ParseOptions {
        ParseOptions::new()
            .read_properties(false)
            .read_cover_art(read_cover_art)
            .parsing_mode(mode)
            .max_junk_bytes(max_junk_bytes)
    }

    /// Probe by extension first, then fall back to relaxed content sniffing
    fn read_tagged_file(path: &Path, read_cover_art: bool) -> Result<TaggedFile, ScanError> {
        let primary = Self::parse_options(read_cover_art, ParsingMode::BestAttempt, 1024);
        let relaxed = Self::parse_options(read_cover_art, ParsingMode::Relaxed, 64 * 1024);

        match Probe::open(path).map(|probe| probe.options(primary).read()) {
            Ok(Ok(tagged_file)) => return Ok(tagged_file),
            Ok(Err(e)) => log::debug!("Primary tag parse failed for {:?}: {}", path, e),
            Err(e) => log::debug!("Extension probe failed for {:?}: {}", path, e),
        }

        let file = File::open(path).map_err(|e| ScanError::from(e).with_path(path))?;
        Probe::new(BufReader::new(file))
            .options(relaxed)
            .guess_file_type()
            .map_err(|e| ScanError::metadata_error(path.to_path_buf(), e.to_string()))?
            .read()
            .map_err(|e| ScanError::metadata_error(path.to_path_buf(), e.to_string()))
    }
}

impl TagReader for LoftyTagReader {
    fn read_tags(&self, path: &Path, skip_covers: bool) -> Result<ParsedTags, ScanError> {
        let tagged_file = Self::read_tagged_file(path, !skip_covers)?;
        let primary = tagged_file.primary_tag();
        let tags = tagged_file.tags();

        let artist = first_value(primary, tags, |tag| tag.artist().map(|v| v.into_owned()));
        let album = first_value(primary, tags, |tag| tag.album().map(|v| v.into_owned()));
        let title = first_value(primary, tags, |tag| tag.title().map(|v| v.into_owned()));
        let date = first_value(primary, tags, |tag| {
            tag.get_string(ItemKey::Year)
                .or_else(|| tag.get_string(ItemKey::RecordingDate))
                .or_else(|| tag.get_string(ItemKey::ReleaseDate))
                .or_else(|| tag.get_string(ItemKey::OriginalReleaseDate))
                .map(str::to_string)
        });

        let cover = if skip_covers {
            None
        } else {
            primary
                .into_iter()
                .chain(tags.iter())
                .find_map(|tag| tag.pictures().first())
                .map(|picture| EmbeddedCover {
                    data: picture.data().to_vec(),
                    extension: match picture.mime_type() {
                        Some(MimeType::Png) => "png",
                        _ => "jpg",
                    },
                })
        };

        Ok(ParsedTags {
            artist,
            album,
            title,
            year: date.as_deref().and_then(year_from_date),
            track: NumberPair::new(
                first_number(primary, tags, |t| t.track()),
                first_number(primary, tags, |t| t.track_total()),
            ),
            disk: NumberPair::new(
                first_number(primary, tags, |t| t.disk()),
                first_number(primary, tags, |t| t.disk_total()),
            ),
            cover,
        })
    }
}

fn first_value<F>(primary: Option<&Tag>, tags: &[Tag], extract: F) -> Option<String>
where
    F: FnMut(&Tag) -> Option<String>,
{
    primary
        .into_iter()
        .chain(tags.iter())
        .filter_map(extract)
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

fn first_number<F>(primary: Option<&Tag>, tags: &[Tag], extract: F) -> Option<u32>
where
    F: FnMut(&Tag) -> Option<u32>,
{
    primary.into_iter().chain(tags.iter()).find_map(extract)
}

/// First run of four digits in a date string
pub fn year_from_date(date: &str) -> Option<i32> {
    let mut digits = String::with_capacity(4);
    for ch in date.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            if digits.len() == 4 {
                return digits.parse().ok();
            }
        } else {
            digits.clear();
        }
    }
    None
}

/// Stream a file through MD5 in fixed-size chunks
pub fn hash_file(path: &Path) -> Result<String, ScanError> {
    let mut file = File::open(path)
        .map_err(|e| ScanError::hash_error(path.to_path_buf(), e.to_string()))?;
    let mut hasher = Md5::new();
    let mut buffer = vec![0u8; HASH_CHUNK_SIZE];

    loop {
        let read = match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(ScanError::hash_error(path.to_path_buf(), e.to_string())),
        };
        hasher.update(&buffer[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Builds catalog entries for files of one job
pub struct MetadataExtractor<'a, R: TagReader> {
    config: &'a ScanJobConfig,
    reader: R,
}

impl<'a, R: TagReader> MetadataExtractor<'a, R> {
    /// Create an extractor for a job
    pub fn new(config: &'a ScanJobConfig, reader: R) -> Self {
        Self { config, reader }
    }

    /// Extract the catalog entry for `path`
    ///
    /// `album_art` is the resolved art of the file's directory. Returns
    /// `Ok(None)` when the path is no longer a regular file.
    pub fn extract(
        &self,
        path: &Path,
        album_art: Option<String>,
    ) -> Result<Option<CatalogEntry>, ScanError> {
        let metadata = match fs::metadata(path) {
            Ok(m) if m.is_file() => m,
            Ok(_) => {
                log::warn!("Skipping {:?}: no longer a regular file", path);
                return Ok(None);
            }
            Err(e) => {
                log::warn!("Skipping {:?}: {}", path, e);
                return Ok(None);
            }
        };

        let tags = match self.reader.read_tags(path, self.config.skip_album_art) {
            Ok(tags) => tags,
            Err(e) => {
                log::warn!("Metadata parse error on {:?}: {}", path, e.message);
                ParsedTags::default()
            }
        };

        let album_art = if self.config.skip_album_art {
            None
        } else {
            album_art.or_else(|| self.store_embedded_cover(path, tags.cover.as_ref()))
        };

        let hash = hash_file(path)?;

        Ok(Some(CatalogEntry {
            vpath: self.config.vpath.clone(),
            filepath: relative_to(&self.config.root_directory, path),
            artist: tags.artist,
            album: tags.album,
            title: tags.title,
            track: tags.track,
            disk: tags.disk,
            year: tags.year,
            format: path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or_default()
                .to_string(),
            modified: modified_millis(&metadata),
            hash,
            album_art,
            ingested_at: 0,
        }))
    }

    /// Write an embedded cover to the art directory, returning its file name
    fn store_embedded_cover(&self, path: &Path, cover: Option<&EmbeddedCover>) -> Option<String> {
        let dir = self.config.album_art_directory.as_ref()?;
        let cover = cover?;
        if cover.data.is_empty() {
            return None;
        }

        let name = format!("{:x}.{}", Md5::digest(&cover.data), cover.extension);
        let target: PathBuf = dir.join(&name);
        if !target.exists() {
            if let Err(e) = fs::write(&target, &cover.data) {
                log::warn!("Failed to save embedded cover of {:?} to {:?}: {}", path, target, e);
                return None;
            }
        }
        Some(name)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    /// Tag reader answering from a fixed table keyed by file name
    #[derive(Default)]
    pub(crate) struct StubTagReader {
        pub tags: HashMap<String, ParsedTags>,
    }

    impl TagReader for StubTagReader {
        fn read_tags(&self, path: &Path, skip_covers: bool) -> Result<ParsedTags, ScanError> {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            match self.tags.get(name) {
                Some(tags) => {
                    let mut tags = tags.clone();
                    if skip_covers {
                        tags.cover = None;
                    }
                    Ok(tags)
                }
                None => Err(ScanError::metadata_error(path.to_path_buf(), "no tags")),
            }
        }
    }

    fn job(root: &Path) -> ScanJobConfig {
        ScanJobConfig::builder()
            .vpath("music")
            .root_directory(root)
            .store_path(root.join("files.db"))
            .build()
    }

    #[test]
    fn test_hash_file_matches_known_digest() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.mp3");
        fs::write(&path, b"hello world").unwrap();
        assert_eq!(hash_file(&path).unwrap(), "5eb63bbbe01eeed093cb22bb8f5acdc3");
    }

    #[test]
    fn test_hash_spans_multiple_chunks() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("big.flac");
        let data: Vec<u8> = (0..HASH_CHUNK_SIZE * 3 + 17).map(|i| (i % 251) as u8).collect();
        fs::write(&path, &data).unwrap();

        let expected = format!("{:x}", Md5::digest(&data));
        assert_eq!(hash_file(&path).unwrap(), expected);
    }

    #[test]
    fn test_hash_missing_file_fails() {
        let tmp = TempDir::new().unwrap();
        let err = hash_file(&tmp.path().join("gone.mp3")).unwrap_err();
        assert_eq!(err.kind, crate::error::ScanErrorKind::HashError);
    }

    #[test]
    fn test_year_from_date() {
        assert_eq!(year_from_date("1999"), Some(1999));
        assert_eq!(year_from_date("2004-05-01"), Some(2004));
        assert_eq!(year_from_date("May 12, 1987"), Some(1987));
        assert_eq!(year_from_date("99"), None);
    }

    #[test]
    fn test_extract_with_tags() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("Band");
        fs::create_dir(&dir).unwrap();
        let path = dir.join("song.MP3");
        fs::write(&path, b"audio").unwrap();

        let mut reader = StubTagReader::default();
        reader.tags.insert(
            "song.MP3".to_string(),
            ParsedTags {
                artist: Some("The Band".to_string()),
                title: Some("Song".to_string()),
                track: NumberPair::new(Some(3), Some(9)),
                ..Default::default()
            },
        );

        let config = job(tmp.path());
        let extractor = MetadataExtractor::new(&config, reader);
        let entry = extractor
            .extract(&path, Some("Band/cover.jpg".to_string()))
            .unwrap()
            .unwrap();

        assert_eq!(entry.vpath, "music");
        assert_eq!(entry.filepath, "Band/song.MP3");
        assert_eq!(entry.format, "MP3");
        assert_eq!(entry.artist.as_deref(), Some("The Band"));
        assert_eq!(entry.track, NumberPair::new(Some(3), Some(9)));
        assert_eq!(entry.album_art.as_deref(), Some("Band/cover.jpg"));
        assert_eq!(entry.hash, hash_file(&path).unwrap());
        assert!(entry.modified > 0);
    }

    #[test]
    fn test_parse_failure_degrades_to_minimal_record() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("broken.ogg");
        fs::write(&path, b"garbage").unwrap();

        let config = job(tmp.path());
        let extractor = MetadataExtractor::new(&config, StubTagReader::default());
        let entry = extractor.extract(&path, None).unwrap().unwrap();

        assert!(entry.artist.is_none());
        assert!(entry.album.is_none());
        assert!(entry.title.is_none());
        assert_eq!(entry.track, NumberPair::default());
        assert_eq!(entry.disk, NumberPair::default());
        assert!(!entry.hash.is_empty());
    }

    #[test]
    fn test_directory_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("fake.mp3");
        fs::create_dir(&path).unwrap();

        let config = job(tmp.path());
        let extractor = MetadataExtractor::new(&config, StubTagReader::default());
        assert!(extractor.extract(&path, None).unwrap().is_none());
        assert!(extractor.extract(&tmp.path().join("missing.mp3"), None).unwrap().is_none());
    }

    #[test]
    fn test_skip_album_art_drops_pointer() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.mp3");
        fs::write(&path, b"a").unwrap();

        let mut config = job(tmp.path());
        config.skip_album_art = true;
        let extractor = MetadataExtractor::new(&config, StubTagReader::default());
        let entry = extractor
            .extract(&path, Some("cover.png".to_string()))
            .unwrap()
            .unwrap();
        assert!(entry.album_art.is_none());
    }

    #[test]
    fn test_embedded_cover_written_to_art_directory() {
        let tmp = TempDir::new().unwrap();
        let art_dir = tmp.path().join("art");
        fs::create_dir(&art_dir).unwrap();
        let path = tmp.path().join("a.flac");
        fs::write(&path, b"a").unwrap();

        let cover = EmbeddedCover {
            data: b"png-bytes".to_vec(),
            extension: "png",
        };
        let mut reader = StubTagReader::default();
        reader.tags.insert(
            "a.flac".to_string(),
            ParsedTags {
                cover: Some(cover.clone()),
                ..Default::default()
            },
        );

        let mut config = job(tmp.path());
        config.album_art_directory = Some(art_dir.clone());
        let extractor = MetadataExtractor::new(&config, reader);
        let entry = extractor.extract(&path, None).unwrap().unwrap();

        let expected = format!("{:x}.png", Md5::digest(&cover.data));
        assert_eq!(entry.album_art.as_deref(), Some(expected.as_str()));
        assert_eq!(fs::read(art_dir.join(&expected)).unwrap(), cover.data);
    }

    #[test]
    fn test_directory_art_wins_over_embedded_cover() {
        let tmp = TempDir::new().unwrap();
        let art_dir = tmp.path().join("art");
        fs::create_dir(&art_dir).unwrap();
        let path = tmp.path().join("a.flac");
        fs::write(&path, b"a").unwrap();

        let mut reader = StubTagReader::default();
        reader.tags.insert(
            "a.flac".to_string(),
            ParsedTags {
                cover: Some(EmbeddedCover {
                    data: b"jpeg".to_vec(),
                    extension: "jpg",
                }),
                ..Default::default()
            },
        );

        let mut config = job(tmp.path());
        config.album_art_directory = Some(art_dir.clone());
        let extractor = MetadataExtractor::new(&config, reader);
        let entry = extractor
            .extract(&path, Some("folder.jpg".to_string()))
            .unwrap()
            .unwrap();

        assert_eq!(entry.album_art.as_deref(), Some("folder.jpg"));
        assert_eq!(fs::read_dir(&art_dir).unwrap().count(), 0);
    }
}
