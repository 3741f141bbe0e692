use std::{
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use anyhow::Context;
use image::RgbaImage;

/// `whiteboard-<unix-seconds>.png` inside `dir`, or `whiteboard-<unix-seconds>-<n>.png` for the
/// first `n` that is not taken yet.
pub fn file_name(dir: &Path, now: SystemTime) -> PathBuf {
    let secs = now.duration_since(UNIX_EPOCH).map_or(0, |d| d.as_secs());
    let path = dir.join(format!("whiteboard-{secs}.png"));
    if !path.exists() {
        return path;
    }
    (1..)
        .map(|n| dir.join(format!("whiteboard-{secs}-{n}.png")))
        .find(|path| !path.exists())
        .unwrap_or(path)
}

/// Writes `image` as a PNG into `dir` and returns the path it was written to.
pub fn save_png(image: &RgbaImage, dir: &Path) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = file_name(dir, SystemTime::now());
    image
        .save_with_format(&path, image::ImageFormat::Png)
        .with_context(|| format!("failed to write `{}`", path.display()))?;
    log::info!("saved canvas to `{}`", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use image::Rgba;

    use super::*;

    #[test]
    fn names_files_by_timestamp() {
        let t = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        assert_eq!(
            file_name(Path::new("out"), t),
            Path::new("out").join("whiteboard-1700000000.png")
        );
    }

    #[test]
    fn same_second_saves_do_not_overwrite() {
        let dir = std::env::temp_dir().join(format!("pinchboard-names-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let t = UNIX_EPOCH + Duration::from_secs(1_700_000_000);

        let first = file_name(&dir, t);
        std::fs::write(&first, b"").unwrap();
        let second = file_name(&dir, t);
        std::fs::write(&second, b"").unwrap();
        assert_eq!(second, dir.join("whiteboard-1700000000-1.png"));
        assert_eq!(file_name(&dir, t), dir.join("whiteboard-1700000000-2.png"));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn writes_readable_png() {
        let dir = std::env::temp_dir().join(format!("pinchboard-export-{}", std::process::id()));
        let mut image = RgbaImage::new(4, 3);
        image.put_pixel(1, 2, Rgba([255, 0, 0, 128]));

        let path = save_png(&image, &dir).unwrap();
        let loaded = image::open(&path).unwrap().to_rgba8();
        assert_eq!(loaded, image);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
