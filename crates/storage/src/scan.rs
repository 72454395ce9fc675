//! Image discovery in a folder

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// File extensions treated as images, compared case-insensitively
pub const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "heic", "heif"];

pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.iter().any(|known| known.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

/// Image files directly inside `folder`, sorted by path. Subfolders are not visited.
pub fn scan_images(folder: &Path) -> io::Result<Vec<PathBuf>> {
    let mut images = Vec::new();
    for entry in fs::read_dir(folder)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_file() && is_image_file(&path) {
            images.push(path);
        }
    }
    images.sort();
    Ok(images)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_image_extensions() {
        assert!(is_image_file(Path::new("leaf.jpg")));
        assert!(is_image_file(Path::new("leaf.JPEG")));
        assert!(is_image_file(Path::new("/data/sheet 3.Png")));
        assert!(is_image_file(Path::new("scan.heif")));
        assert!(!is_image_file(Path::new("notes.txt")));
        assert!(!is_image_file(Path::new("jpg")));
        assert!(!is_image_file(Path::new("herbivory.json")));
    }

    #[test]
    fn scan_skips_other_files_and_folders() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        for name in ["b.png", "a.JPG", "readme.md", "c.heic"] {
            fs::write(temp.path().join(name), b"x").expect("write should succeed");
        }
        fs::create_dir(temp.path().join("nested.jpg")).expect("dir should be created");

        let found: Vec<String> = scan_images(temp.path())
            .expect("scan should succeed")
            .iter()
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(str::to_string))
            .collect();

        assert_eq!(found, vec!["a.JPG", "b.png", "c.heic"]);
    }
}
