//! Frame persistence.
//!
//! Writes raw 16-bit pixel data with a JSON header sidecar. FITS packaging
//! happens downstream; this store only guarantees the bytes and headers of
//! every frame land on disk under a predictable name.

use std::path::PathBuf;

use serde::Serialize;
use tokio::io::AsyncWriteExt;

use meridian_proto::FrameData;

use crate::error::ImageError;

/// Filesystem image store.
#[derive(Debug, Clone)]
pub struct FsImageStore {
    image_dir: PathBuf,
}

#[derive(Serialize)]
struct Sidecar<'a> {
    width: u32,
    height: u32,
    binning: u8,
    cards: &'a [(String, String)],
}

impl FsImageStore {
    pub fn new(image_dir: impl Into<PathBuf>) -> Self {
        Self {
            image_dir: image_dir.into(),
        }
    }

    /// Name a frame is stored under.
    ///
    /// Run frames are keyed by run number; glances overwrite a fixed
    /// per-unit name.
    #[must_use]
    pub fn filename(run_number: Option<u32>, unit: u8) -> String {
        match run_number {
            Some(run) => format!("r{run:07}_ut{unit}.raw"),
            None => format!("glance_ut{unit}.raw"),
        }
    }

    /// Persists one frame and its headers, returning the filename used.
    pub async fn save_frame(
        &self,
        run_number: Option<u32>,
        frame: &FrameData,
        cards: &[(String, String)],
    ) -> Result<String, ImageError> {
        tokio::fs::create_dir_all(&self.image_dir).await?;

        let filename = Self::filename(run_number, frame.unit);
        let path = self.image_dir.join(&filename);

        let mut bytes = Vec::with_capacity(frame.data.len() * 2);
        for px in &frame.data {
            bytes.extend_from_slice(&px.to_le_bytes());
        }
        let mut file = tokio::fs::File::create(&path).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;

        let sidecar = Sidecar {
            width: frame.width,
            height: frame.height,
            binning: frame.binning,
            cards,
        };
        let sidecar_path = path.with_extension("json");
        tokio::fs::write(&sidecar_path, serde_json::to_vec_pretty(&sidecar)?).await?;

        Ok(filename)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn frame(unit: u8) -> FrameData {
        FrameData {
            unit,
            width: 4,
            height: 2,
            binning: 1,
            data: vec![100, 200, 300, 400, 500, 600, 700, 800],
        }
    }

    #[tokio::test]
    async fn run_frames_are_keyed_by_run_number() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsImageStore::new(dir.path());

        let name = store
            .save_frame(Some(123), &frame(2), &[("EXPTIME".into(), "5.0".into())])
            .await
            .unwrap();

        assert_eq!(name, "r0000123_ut2.raw");
        assert!(dir.path().join(&name).exists());
        assert!(dir.path().join("r0000123_ut2.json").exists());

        let bytes = std::fs::read(dir.path().join(&name)).unwrap();
        assert_eq!(bytes.len(), 16);
        assert_eq!(u16::from_le_bytes([bytes[0], bytes[1]]), 100);
    }

    #[tokio::test]
    async fn glances_overwrite_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsImageStore::new(dir.path());

        let first = store.save_frame(None, &frame(1), &[]).await.unwrap();
        let second = store.save_frame(None, &frame(1), &[]).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first, "glance_ut1.raw");
    }
}
