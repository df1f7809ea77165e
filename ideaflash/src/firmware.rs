//! Firmware catalogue and fetch-by-identifier.
//!
//! Identifiers are `/`-separated paths relative to the source root, for
//! example `firmware/ideaboardfirmware03202025.bin`.

use {
    crate::error::{Error, Result},
    log::{debug, trace},
    std::{
        io::ErrorKind,
        path::{Component, Path, PathBuf},
    },
};

/// Images shipped with the Ideaboard flasher.
pub const DEFAULT_CATALOG: &[&str] = &["firmware/ideaboardfirmware03202025.bin"];

/// Maximum directory depth when searching for firmware files.
const MAX_SEARCH_DEPTH: usize = 5;

/// Directories to skip during search.
const SKIP_DIRS: &[&str] = &[".git", "target", "node_modules", ".svn", ".hg"];

/// One selectable firmware image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareEntry {
    /// Identifier passed to [`FirmwareSource::fetch`].
    pub id: String,
    /// File name shown to the user.
    pub name: String,
    /// Size in bytes, if known.
    pub size: Option<u64>,
}

impl FirmwareEntry {
    /// Entry for `id` with the display name derived from it.
    pub fn new(id: impl Into<String>, size: Option<u64>) -> Self {
        let id = id.into();
        Self {
            name: display_name(&id).to_string(),
            id,
            size,
        }
    }

    /// Format file size in a human-readable way.
    pub fn human_size(&self) -> String {
        const KB: u64 = 1024;
        const MB: u64 = 1024 * 1024;
        let Some(size) = self.size else {
            return "missing".to_string();
        };
        #[allow(clippy::cast_precision_loss)]
        if size >= MB {
            format!("{:.1} MB", size as f64 / MB as f64)
        } else if size >= KB {
            format!("{:.1} KB", size as f64 / KB as f64)
        } else {
            format!("{size} B")
        }
    }
}

/// The last path segment of an identifier.
pub fn display_name(id: &str) -> &str {
    id.rsplit('/')
        .next()
        .unwrap_or(id)
}

/// Where firmware images come from.
pub trait FirmwareSource {
    /// Available images, sorted by identifier.
    fn list(&self) -> Result<Vec<FirmwareEntry>>;

    /// Full image bytes for `id`.
    fn fetch(&self, id: &str) -> Result<Vec<u8>>;
}

/// Firmware images stored under a local directory.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
    catalog: Option<Vec<String>>,
}

impl DirectorySource {
    /// Source listing every `.bin` file below `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            catalog: None,
        }
    }

    /// Source listing exactly `ids`, whether or not the files exist yet.
    #[must_use]
    pub fn with_catalog<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.catalog = Some(
            ids.into_iter()
                .map(Into::into)
                .collect(),
        );
        self
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map an identifier to a path below the root.
    pub fn resolve(&self, id: &str) -> Result<PathBuf> {
        let relative = Path::new(id);
        if id.is_empty()
            || !relative
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(Error::InvalidFirmware(format!(
                "identifier '{id}' must be a relative path inside the firmware directory"
            )));
        }
        Ok(self
            .root
            .join(relative))
    }
}

impl FirmwareSource for DirectorySource {
    fn list(&self) -> Result<Vec<FirmwareEntry>> {
        let mut entries = match &self.catalog {
            Some(ids) => ids
                .iter()
                .map(|id| {
                    let size = self
                        .resolve(id)
                        .ok()
                        .and_then(|path| std::fs::metadata(path).ok())
                        .filter(std::fs::Metadata::is_file)
                        .map(|m| m.len());
                    FirmwareEntry::new(id.clone(), size)
                })
                .collect(),
            None => {
                let mut found = Vec::new();
                walk_dir(&self.root, &self.root, 0, &mut found);
                found
            },
        };
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        debug!(
            "{} firmware image(s) under {}",
            entries.len(),
            self.root
                .display()
        );
        Ok(entries)
    }

    fn fetch(&self, id: &str) -> Result<Vec<u8>> {
        let path = self.resolve(id)?;
        trace!("Reading firmware {}", path.display());
        match std::fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::IsADirectory) => {
                Err(Error::FirmwareNotFound(id.to_string()))
            },
            Err(e) => Err(Error::Io(e)),
        }
    }
}

/// Recursively walk directories looking for `.bin` files.
fn walk_dir(base: &Path, dir: &Path, depth: usize, out: &mut Vec<FirmwareEntry>) {
    if depth > MAX_SEARCH_DEPTH {
        return;
    }

    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            let name = entry.file_name();
            let name_str = name.to_string_lossy();
            if name_str.starts_with('.') || SKIP_DIRS.contains(&name_str.as_ref()) {
                continue;
            }
            walk_dir(base, &path, depth + 1, out);
        } else if path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("bin"))
        {
            let Ok(rel) = path.strip_prefix(base) else {
                continue;
            };
            let id = rel
                .components()
                .map(|c| {
                    c.as_os_str()
                        .to_string_lossy()
                })
                .collect::<Vec<_>>()
                .join("/");
            let size = entry
                .metadata()
                .ok()
                .map(|m| m.len());
            out.push(FirmwareEntry::new(id, size));
        }
    }
}
