use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use crate::transcript::Transcript;

pub const HISTORY_FILE_PREFIX: &str = "rag_history_";

/// Flatten the transcript into `ROLE: content` records separated by a blank line
pub fn render_history(transcript: &Transcript) -> String {
    transcript
        .messages()
        .iter()
        .map(|m| format!("{}: {}", m.role().export_label(), m.content()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn history_file_name(timestamp_millis: i64) -> String {
    format!("{}{}.txt", HISTORY_FILE_PREFIX, timestamp_millis)
}

/// Write the rendered history into `dir` and return the file path
pub fn export_history(transcript: &Transcript, dir: &Path) -> Result<PathBuf> {
    let millis = chrono::Utc::now().timestamp_millis();
    export_history_at(transcript, dir, millis)
}

fn export_history_at(transcript: &Transcript, dir: &Path, timestamp_millis: i64) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Could not create export directory {}", dir.display()))?;

    let path = dir.join(history_file_name(timestamp_millis));
    fs::write(&path, render_history(transcript))
        .with_context(|| format!("Could not write {}", path.display()))?;

    info!(
        target: "raglab::export",
        path = %path.display(),
        messages = transcript.len(),
        "History exported"
    );
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::Message;

    fn hi_hello() -> Transcript {
        let mut transcript = Transcript::new();
        transcript.push(Message::user("Hi"));
        transcript.push(Message::assistant("Hello", Some("greetings.md".to_string())));
        transcript
    }

    #[test]
    fn test_render_history_exact_format() {
        assert_eq!(render_history(&hi_hello()), "USER: Hi\n\nAI: Hello");
    }

    #[test]
    fn test_render_history_empty() {
        assert_eq!(render_history(&Transcript::new()), "");
    }

    #[test]
    fn test_history_file_name() {
        assert_eq!(history_file_name(1700000000123), "rag_history_1700000000123.txt");
    }

    #[test]
    fn test_export_writes_file_into_new_dir() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("exports");

        let path = export_history_at(&hi_hello(), &target, 42).unwrap();
        assert_eq!(path, target.join("rag_history_42.txt"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "USER: Hi\n\nAI: Hello");
    }

    #[test]
    fn test_export_empty_transcript_writes_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = export_history(&Transcript::new(), dir.path()).unwrap();

        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with(HISTORY_FILE_PREFIX));
        assert!(name.ends_with(".txt"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
    }
}
