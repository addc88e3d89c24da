use std::path::{Path, PathBuf};

use chrono::Utc;
use uuid::Uuid;

/// Fixed names callers habitually send; reusing them verbatim would let
/// concurrent jobs clobber each other's screenshots.
const PLACEHOLDER_NAMES: [&str; 6] = [
    "screenshot.png",
    "example-screenshot.png",
    "test-screenshot.png",
    "test.png",
    "image.png",
    "capture.png",
];

pub fn is_placeholder(name: &str) -> bool {
    let base = Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    PLACEHOLDER_NAMES.contains(&base.as_str())
}

/// `<base>-<timestamp>-<random><ext>`, unique across concurrent jobs.
pub fn unique_name(base: &str, extension: &str) -> String {
    let timestamp = Utc::now().format("%Y%m%d-%H%M%S");
    let random = Uuid::new_v4().simple().to_string();
    let ext = if extension.starts_with('.') {
        extension.to_string()
    } else {
        format!(".{extension}")
    };
    format!("{base}-{timestamp}-{}{ext}", &random[..8])
}

/// Resolve where a screenshot lands: caller-supplied names are preserved,
/// absent or placeholder names are synthesized unique under `dir`.
pub fn resolve_screenshot_path(dir: &Path, requested: Option<&str>) -> PathBuf {
    match requested {
        None => dir.join(unique_name("screenshot", ".png")),
        Some(name) if is_placeholder(name) => {
            let path = Path::new(name);
            let base = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "screenshot".to_string());
            let ext = path
                .extension()
                .map(|e| format!(".{}", e.to_string_lossy()))
                .unwrap_or_else(|| ".png".to_string());
            dir.join(unique_name(&base, &ext))
        }
        Some(name) => {
            let path = Path::new(name);
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                dir.join(path)
            }
        }
    }
}
