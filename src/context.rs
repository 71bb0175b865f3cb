//! Prompt context from uploaded files and from a project directory.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use itertools::Itertools;
use serde::Deserialize;
use tracing::warn;

use crate::model::UploadedFile;

/// Directories never descended into.
const IGNORED_DIRS: &[&str] = &[
    "__pycache__",
    ".git",
    ".venv",
    "venv",
    "node_modules",
    ".pytest_cache",
    ".mypy_cache",
    ".idea",
    ".vscode",
    "dist",
    "build",
    "target",
];

/// Files left out of "all files" listings.
const IGNORED_FILES: &[&str] = &[".env", ".DS_Store"];

const BINARY_EXTENSIONS: &[&str] = &[
    "pkl", "pickle", "parquet", "h5", "hdf5", "npy", "npz", "bin", "exe", "dll", "so", "dylib", "o", "obj",
    "zip", "tar", "gz", "bz2", "xz", "7z", "rar", "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "jpg",
    "jpeg", "png", "gif", "bmp", "ico", "svg", "mp3", "mp4", "avi", "mov", "wmv", "flv", "db", "sqlite",
    "sqlite3", "mdb", "pyc", "pyo", "pyd", "class", "woff", "woff2", "ttf", "eot", "otf", "jar", "war", "ear",
];

/// Bytes sniffed when deciding whether a file is binary.
const SNIFF_LEN: usize = 512;

pub const DEFAULT_MAX_FILE_SIZE: u64 = 100_000;
const TREE_DEPTH: usize = 3;
const ALL_FILES_DEPTH: usize = 5;

/// Code fence language for a file extension.
pub fn language_for(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "py" => "python",
        "js" => "javascript",
        "ts" => "typescript",
        "html" => "html",
        "css" => "css",
        "json" => "json",
        "md" => "markdown",
        "rs" => "rust",
        "go" => "go",
        "java" => "java",
        "cpp" => "cpp",
        "c" => "c",
        "sh" => "bash",
        "yaml" | "yml" => "yaml",
        "toml" => "toml",
        "xml" => "xml",
        "sql" => "sql",
        _ => "",
    }
}

fn fenced(title: &str, language: &str, body: &str) -> String {
    let lang = if language.is_empty() {
        String::new()
    } else {
        format!("{language}\n")
    };
    format!("### {title}\n```{lang}{body}\n```\n")
}

fn extension_of(name: &str) -> &str {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
}

/// Render uploaded files as a markdown section, or `None` when there are none.
pub fn format_uploaded_files(files: &[UploadedFile]) -> Option<String> {
    if files.is_empty() {
        return None;
    }
    let mut section = String::from("## Uploaded Files\n");
    for file in files {
        section.push_str(&fenced(&file.filename, language_for(extension_of(&file.filename)), &file.content));
        section.push('\n');
    }
    Some(section)
}

/// What to include from the project directory.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProjectContextRequest {
    /// Paths relative to the project root.
    pub selected_files: Vec<String>,
    pub include_readme: bool,
    pub include_tree: bool,
    /// Include every text file when no files are selected.
    pub include_all_files: bool,
}

impl Default for ProjectContextRequest {
    fn default() -> Self {
        Self {
            selected_files: Vec::new(),
            include_readme: true,
            include_tree: true,
            include_all_files: false,
        }
    }
}

/// Reads README, directory tree and source files below one root.
///
/// Reads never escape the root, even through `..` or symlinks.
#[derive(Debug, Clone)]
pub struct ProjectContext {
    root: PathBuf,
    max_file_size: u64,
}

impl ProjectContext {
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        Ok(Self {
            root: fs::canonicalize(root)?,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        })
    }

    pub fn with_max_file_size(mut self, max_file_size: u64) -> Self {
        self.max_file_size = max_file_size;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn readme(&self) -> Option<String> {
        let path = self.root.join("README.md");
        if !path.is_file() {
            return None;
        }
        match fs::read_to_string(&path) {
            Ok(text) => Some(text),
            Err(e) => {
                warn!("Could not read README.md: {}", e);
                None
            }
        }
    }

    /// `tree`-style listing, directories first, down to `max_depth` levels.
    pub fn directory_tree(&self, max_depth: usize) -> String {
        let mut lines = vec![self.root.display().to_string()];
        Self::walk_tree(&self.root, "", 0, max_depth, &mut lines);
        lines.join("\n")
    }

    fn walk_tree(dir: &Path, prefix: &str, depth: usize, max_depth: usize, lines: &mut Vec<String>) {
        let Ok(read_dir) = fs::read_dir(dir) else {
            return;
        };
        let mut entries: Vec<(bool, String, PathBuf)> = read_dir
            .filter_map(Result::ok)
            .map(|e| {
                let path = e.path();
                (!path.is_dir(), e.file_name().to_string_lossy().into_owned(), path)
            })
            .filter(|(is_file, name, _)| *is_file || !IGNORED_DIRS.contains(&name.as_str()))
            .collect();
        entries.sort();

        let count = entries.len();
        for (i, (is_file, name, path)) in entries.into_iter().enumerate() {
            let last = i + 1 == count;
            lines.push(format!("{prefix}{}{name}", if last { "└── " } else { "├── " }));
            if !is_file && depth < max_depth {
                let next = format!("{prefix}{}", if last { "    " } else { "│   " });
                Self::walk_tree(&path, &next, depth + 1, max_depth, lines);
            }
        }
    }

    /// Guess whether a file is binary from its extension and first bytes.
    pub fn is_binary_file(path: &Path) -> bool {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if BINARY_EXTENSIONS.contains(&ext.as_str()) {
            return true;
        }

        let mut head = Vec::with_capacity(SNIFF_LEN);
        let Ok(file) = fs::File::open(path) else {
            return false;
        };
        if file.take(SNIFF_LEN as u64).read_to_end(&mut head).is_err() || head.is_empty() {
            return false;
        }
        if head.contains(&0) {
            return true;
        }
        let control = head
            .iter()
            .filter(|b| **b < 32 && !matches!(**b, b'\t' | b'\n' | b'\r'))
            .count();
        control * 10 > head.len() * 3
    }

    /// Resolve a project-relative path, refusing anything outside the root.
    fn resolve(&self, relative: &str) -> Option<PathBuf> {
        let full = fs::canonicalize(self.root.join(relative)).ok()?;
        (full.starts_with(&self.root) && full.is_file()).then_some(full)
    }

    /// Read a text file below the root. Binary, missing, outside and
    /// non-UTF-8 files yield `None`.
    pub fn read_file(&self, relative: &str) -> Option<String> {
        let path = self.resolve(relative)?;
        if Self::is_binary_file(&path) {
            return None;
        }
        fs::read_to_string(&path).ok()
    }

    /// Every file below the root, relative, `/`-separated, sorted.
    pub fn all_files(&self, max_depth: usize, text_only: bool) -> Vec<String> {
        let mut files = Vec::new();
        self.collect_files(&self.root, 0, max_depth, text_only, &mut files);
        files.sort();
        files
    }

    fn collect_files(&self, dir: &Path, depth: usize, max_depth: usize, text_only: bool, out: &mut Vec<String>) {
        if depth > max_depth {
            return;
        }
        let Ok(read_dir) = fs::read_dir(dir) else {
            return;
        };
        for entry in read_dir.filter_map(Result::ok) {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            if path.is_dir() {
                if !IGNORED_DIRS.contains(&name.as_str()) {
                    self.collect_files(&path, depth + 1, max_depth, text_only, out);
                }
                continue;
            }
            if IGNORED_FILES.iter().any(|ignored| name.starts_with(ignored)) {
                continue;
            }
            if text_only && Self::is_binary_file(&path) {
                continue;
            }
            if let Ok(relative) = path.strip_prefix(&self.root) {
                out.push(relative.components().map(|c| c.as_os_str().to_string_lossy()).join("/"));
            }
        }
    }

    /// Assemble the markdown context block.
    pub fn build(&self, request: &ProjectContextRequest) -> String {
        let mut parts = Vec::new();

        if request.include_tree {
            parts.push(format!(
                "## Project Structure\n```\n{}\n```\n",
                self.directory_tree(TREE_DEPTH)
            ));
        }

        if request.include_readme {
            if let Some(readme) = self.readme() {
                parts.push(format!("## README.md\n```markdown\n{readme}\n```\n"));
            }
        }

        let files = if request.selected_files.is_empty() && request.include_all_files {
            self.all_files(ALL_FILES_DEPTH, true)
        } else {
            request.selected_files.clone()
        };

        if !files.is_empty() {
            parts.push("## Selected Files\n".to_string());
            let mut skipped_binary = Vec::new();

            for file in &files {
                match self.read_file(file) {
                    Some(content) => {
                        let size = content.len() as u64;
                        if size > self.max_file_size {
                            parts.push(fenced(file, "", &format!("[File too large: {size} bytes, skipped]")));
                        } else {
                            parts.push(fenced(file, language_for(extension_of(file)), &content));
                        }
                    }
                    None => match self.resolve(file) {
                        Some(path) if Self::is_binary_file(&path) => skipped_binary.push(file.as_str()),
                        _ => parts.push(fenced(file, "", "[File not found or could not be read]")),
                    },
                }
            }

            if !skipped_binary.is_empty() {
                let shown = skipped_binary.iter().take(5).join(", ");
                let more = if skipped_binary.len() > 5 { "..." } else { "" };
                parts.push(format!(
                    "\n*Note: {} binary file(s) skipped: {shown}{more}*\n",
                    skipped_binary.len()
                ));
            }
        }

        parts.join("\n")
    }
}
