//! In-memory keyword index over text documents in the data root.

use std::collections::HashSet;
use std::path::Path;

use async_trait::async_trait;
use tracing::{info, warn};

use super::{RetrievalConfig, Retriever, NO_RESULTS};
use crate::domain::Result;

const INDEXED_EXTENSIONS: &[&str] = &["txt", "md", "json"];

/// A slice of one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// File name the chunk came from.
    pub source: String,
    pub text: String,
}

/// Keyword-overlap index of document chunks.
#[derive(Debug, Clone, Default)]
pub struct LocalIndex {
    chunks: Vec<Chunk>,
    max_results: usize,
}

impl LocalIndex {
    pub fn new(max_results: usize) -> Self {
        Self {
            chunks: Vec::new(),
            max_results,
        }
    }

    /// Index every `.txt`, `.md`, and `.json` file directly under `dir`.
    ///
    /// A missing directory yields an empty index. Unreadable files are skipped.
    pub fn load(dir: &Path, config: &RetrievalConfig) -> Result<Self> {
        let mut index = Self::new(config.max_results);
        if !dir.is_dir() {
            warn!(dir = %dir.display(), "data root missing, local index is empty");
            return Ok(index);
        }

        let mut paths: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && has_indexed_extension(path))
            .collect();
        paths.sort();

        for path in paths {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            match std::fs::read_to_string(&path) {
                Ok(text) => index.add_document(&name, &text, config.chunk_size, config.chunk_overlap),
                Err(e) => warn!(file = %name, error = %e, "skipping unreadable document"),
            }
        }
        info!(chunks = index.len(), dir = %dir.display(), "local index loaded");
        Ok(index)
    }

    pub fn add_document(&mut self, source: &str, text: &str, size: usize, overlap: usize) {
        for piece in split_chunks(text, size, overlap) {
            self.chunks.push(Chunk {
                source: source.to_string(),
                text: piece,
            });
        }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Best-scoring chunks, highest first. Chunks sharing no term are dropped;
    /// ties keep document order.
    pub fn search(&self, query: &str) -> Vec<&Chunk> {
        let terms = terms(query);
        if terms.is_empty() {
            return Vec::new();
        }
        let mut scored: Vec<(usize, usize)> = self
            .chunks
            .iter()
            .enumerate()
            .filter_map(|(i, chunk)| {
                let chunk_terms = terms_of(&chunk.text);
                let score = terms.iter().filter(|t| chunk_terms.contains(*t)).count();
                (score > 0).then_some((score, i))
            })
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        scored
            .into_iter()
            .take(self.max_results)
            .map(|(_, i)| &self.chunks[i])
            .collect()
    }
}

#[async_trait]
impl Retriever for LocalIndex {
    async fn retrieve(&self, query: &str) -> String {
        let hits = self.search(query);
        if hits.is_empty() {
            return NO_RESULTS.to_string();
        }
        hits.iter()
            .map(|c| format!("[source: {}]\n{}", c.source, c.text))
            .collect::<Vec<_>>()
            .join("\n---\n")
    }
}

fn has_indexed_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| INDEXED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Overlapping character windows, trimmed, empty windows dropped.
pub(crate) fn split_chunks(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() || size == 0 {
        return Vec::new();
    }
    let step = size.saturating_sub(overlap).max(1);
    let mut out = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + size).min(chars.len());
        let piece: String = chars[start..end].iter().collect();
        let piece = piece.trim();
        if !piece.is_empty() {
            out.push(piece.to_string());
        }
        if end == chars.len() {
            break;
        }
        start += step;
    }
    out
}

fn terms(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    tokens(text).filter(|t| seen.insert(t.clone())).collect()
}

fn terms_of(text: &str) -> HashSet<String> {
    tokens(text).collect()
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 2)
        .map(|t| t.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_chunks_overlap() {
        let chunks = split_chunks("abcdefghij", 4, 1);
        assert_eq!(chunks, vec!["abcd", "defg", "ghij"]);
    }

    #[test]
    fn test_split_chunks_short_text() {
        assert_eq!(split_chunks("  hello ", 1000, 100), vec!["hello"]);
        assert!(split_chunks("", 10, 2).is_empty());
    }

    #[test]
    fn test_split_chunks_multibyte() {
        let chunks = split_chunks("çğıöşü", 3, 0);
        assert_eq!(chunks, vec!["çğı", "öşü"]);
    }

    #[test]
    fn test_search_ranks_by_overlap() {
        let mut index = LocalIndex::new(2);
        index.add_document("a.txt", "the warehouse stores apples", 1000, 100);
        index.add_document("b.txt", "apples and pears sold in the warehouse", 1000, 100);
        index.add_document("c.txt", "unrelated content", 1000, 100);

        let hits = index.search("pears warehouse");
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].source, "b.txt");
        assert_eq!(hits[1].source, "a.txt");
    }

    #[tokio::test]
    async fn test_retrieve_no_match_is_sentinel() {
        let mut index = LocalIndex::new(3);
        index.add_document("a.txt", "alpha beta", 1000, 100);
        assert_eq!(index.retrieve("gamma").await, NO_RESULTS);
        assert_eq!(LocalIndex::new(3).retrieve("alpha").await, NO_RESULTS);
    }

    #[tokio::test]
    async fn test_load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.md"), "Returns policy: thirty days").unwrap();
        std::fs::write(dir.path().join("sales.json"), r#"{"item": "lamp"}"#).unwrap();
        std::fs::write(dir.path().join("image.png"), [0u8, 1, 2]).unwrap();

        let index = LocalIndex::load(dir.path(), &RetrievalConfig::default()).unwrap();
        assert_eq!(index.len(), 2);

        let text = index.retrieve("returns policy").await;
        assert!(text.starts_with("[source: notes.md]"));
        assert!(text.contains("thirty days"));
    }

    #[test]
    fn test_load_missing_directory_is_empty() {
        let index =
            LocalIndex::load(Path::new("/nonexistent/docservice"), &RetrievalConfig::default())
                .unwrap();
        assert!(index.is_empty());
    }
}
