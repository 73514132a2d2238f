//! Output file sequence utilities
//!
//! Splits a rendered file path into `(head, padding, ext)` and enumerates the
//! literal file names a render will produce. Output naming contract:
//! `<head><frame zero-padded to padding><ext>`.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::entities::FrameRange;

/// Padding used when the filename carries no trailing frame number.
pub const DEFAULT_PADDING: usize = 4;

static TRAILING_DIGITS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.*?)([0-9]+)$").expect("valid frame regex"));

/// A file path split around its frame number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramePath {
    pub head: String,
    pub padding: usize,
    /// Extension with its leading dot, empty when absent
    pub ext: String,
}

impl FramePath {
    /// File name for `frame`.
    pub fn with_frame(&self, frame: i64) -> String {
        format!("{}{}{}", self.head, pad_frame(frame, self.padding), self.ext)
    }
}

/// Zero-pad a frame number to `padding` characters. A minus sign counts
/// toward the width: `-5` at padding 4 is `-005`.
pub fn pad_frame(frame: i64, padding: usize) -> String {
    format!("{:0width$}", frame, width = padding)
}

/// Split `path` into root and extension. Only the last component is
/// considered; leading dots of a file name do not start an extension.
fn split_ext(path: &str) -> (&str, &str) {
    let name_start = path.rfind(['/', '\\']).map(|i| i + 1).unwrap_or(0);
    let name = &path[name_start..];
    let leading = name.len() - name.trim_start_matches('.').len();

    match name[leading..].rfind('.') {
        Some(dot) => path.split_at(name_start + leading + dot),
        None => (path, ""),
    }
}

/// Split a frame path into head, padding and extension.
///
/// Total over any input: without a trailing digit run the whole root is the
/// head and padding defaults to [`DEFAULT_PADDING`].
///
/// Example: `"C:/test0001.exr"` -> `("C:/test", 4, ".exr")`
pub fn split_frame_path(path: &str) -> FramePath {
    let (root, ext) = split_ext(path);

    match TRAILING_DIGITS.captures(root) {
        Some(caps) => {
            let head = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            let digits = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
            FramePath {
                head: head.to_string(),
                padding: digits.len(),
                ext: ext.to_string(),
            }
        }
        None => FramePath {
            head: root.to_string(),
            padding: DEFAULT_PADDING,
            ext: ext.to_string(),
        },
    }
}

/// Base names for every frame of `range` including handles.
///
/// Empty when the range with handles is inverted.
pub fn expected_names(file_name: &str, range: &FrameRange) -> Vec<String> {
    let frame_path = split_frame_path(file_name);
    (range.start_with_handles()..=range.end_with_handles())
        .map(|frame| frame_path.with_frame(frame))
        .collect()
}

/// Full paths of every frame `output` renders over `range`.
///
/// `output` is the (path-mapped) file path a Saver writes to; the frame
/// number is looked for in its file name only.
pub fn expected_files(output: &str, range: &FrameRange) -> Vec<String> {
    let path = Path::new(output);
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(dir) => expected_names(&file_name, range)
            .into_iter()
            .map(|name| dir.join(name).to_string_lossy().to_string())
            .collect(),
        None => expected_names(&file_name, range),
    }
}
