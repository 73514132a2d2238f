//! Workfile versioning: save the comp as the next version after publishing.

use std::path::{Path, PathBuf};

use log::{debug, info};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::entities::{Comp, HostError};

/// `_v001` / `.V12` style version labels.
static VERSION_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)[._]v\d+").expect("valid version regex"));
static DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("valid digits regex"));

#[derive(Debug, Clone, PartialEq)]
pub enum WorkfileError {
    /// The comp was never saved
    NoCurrentFile,
    /// The versioning collaborator does not offer `save_next_version`
    Unsupported,
    /// Bumping produced the input path again
    SameVersion(PathBuf),
    Host(HostError),
    Failed(String),
}

impl std::fmt::Display for WorkfileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkfileError::NoCurrentFile => write!(f, "Comp has no current file"),
            WorkfileError::Unsupported => {
                write!(f, "Saving next workfile version is not supported")
            }
            WorkfileError::SameVersion(p) => {
                write!(f, "Created path is the same as current file: {}", p.display())
            }
            WorkfileError::Host(e) => write!(f, "{}", e),
            WorkfileError::Failed(e) => write!(f, "Failed to save next version: {}", e),
        }
    }
}

impl std::error::Error for WorkfileError {}

impl From<HostError> for WorkfileError {
    fn from(e: HostError) -> Self {
        WorkfileError::Host(e)
    }
}

/// Workfile service of the pipeline framework.
pub trait WorkfileVersioning: Send + Sync {
    /// Save the current workfile as the next version and record
    /// `description` with it. `Err(Unsupported)` asks the caller to fall
    /// back to [`version_up`].
    fn save_next_version(&self, description: &str) -> Result<(), WorkfileError>;
}

/// Splits `name.ext` at the last dot (leading dots belong to the stem).
fn split_stem(file_name: &str) -> (&str, &str) {
    match file_name.rfind('.') {
        Some(i) if file_name[..i].chars().any(|c| c != '.') => file_name.split_at(i),
        _ => (file_name, ""),
    }
}

/// Next version of `path`: the last version label is incremented keeping
/// its padding, or `_v001` is appended. Versions that already exist next
/// to the file are skipped.
pub fn version_up(path: &Path) -> Result<PathBuf, WorkfileError> {
    let dir = path.parent().unwrap_or_else(|| Path::new(""));
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or(WorkfileError::NoCurrentFile)?;
    let (stem, ext) = split_stem(&file_name);

    let (new_stem, new_label) = match VERSION_LABEL.find_iter(stem).last() {
        None => {
            debug!("Creating version...");
            (format!("{}_v001", stem), "_v001".to_string())
        }
        Some(m) => {
            let label = m.as_str();
            let digits = DIGITS.find(label).map(|d| d.as_str()).unwrap_or("0");
            let next = digits.parse::<u64>().unwrap_or(0) + 1;
            let bumped = format!("{:0width$}", next, width = digits.len());
            let new_label = label.replacen(digits, &bumped, 1);
            let new_stem = format!("{}{}{}", &stem[..m.start()], new_label, &stem[m.end()..]);
            (new_stem, new_label)
        }
    };

    let new_path = dir.join(format!("{}{}", new_stem, ext));
    if new_path == path {
        return Err(WorkfileError::SameVersion(new_path));
    }

    // Clashes count for any file sharing the name up to the version label,
    // so `test_v001_test.comp` also clashes with `test_v002.comp`
    let clash_prefix = match new_stem.find(&new_label) {
        Some(i) => &new_stem[..i + new_label.len()],
        None => new_stem.as_str(),
    };
    let clashes = std::fs::read_dir(dir)
        .map(|entries| {
            entries.filter_map(Result::ok).any(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                name.ends_with(ext) && name.starts_with(clash_prefix)
            })
        })
        .unwrap_or(false);
    if clashes {
        debug!("Skipping existing version {}", new_label);
        return version_up(&new_path);
    }

    debug!("New version {}", new_label);
    Ok(new_path)
}

/// How the workfile was incremented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncrementOutcome {
    /// The workfile service saved the next version
    NextVersion,
    /// Saved to the path produced by [`version_up`]
    VersionedUp(PathBuf),
}

/// Save the published comp as a new workfile version.
pub fn increment_current_file(
    comp: &dyn Comp,
    versioning: &dyn WorkfileVersioning,
) -> Result<IncrementOutcome, WorkfileError> {
    let current = comp.file_name().ok_or(WorkfileError::NoCurrentFile)?;
    let basename = current
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let description = format!("Incremented by publishing from {}", basename);

    match versioning.save_next_version(&description) {
        Ok(()) => Ok(IncrementOutcome::NextVersion),
        Err(WorkfileError::Unsupported) => {
            let next = version_up(&current)?;
            comp.save(Some(&next))?;
            info!("Incremented workfile to {}", next.display());
            Ok(IncrementOutcome::VersionedUp(next))
        }
        Err(e) => Err(e),
    }
}
