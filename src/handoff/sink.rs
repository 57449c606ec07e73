//! Picture handoff targets.

use crate::capture::EncodedImage;
use crate::hardware::PictureFormat;
use crossbeam::channel::Sender;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors a handoff target may report.
#[derive(Debug, Error)]
pub enum HandoffError {
    #[error("handoff receiver disconnected")]
    Disconnected,
    #[error("failed to write picture: {0}")]
    Io(#[from] std::io::Error),
}

/// Receives one picture per successful capture session.
pub trait Handoff: Send + Sync {
    fn hand_off(&self, image: EncodedImage) -> Result<(), HandoffError>;
}

/// Transfers pictures over a channel to the next component.
#[derive(Debug, Clone)]
pub struct ChannelHandoff {
    tx: Sender<EncodedImage>,
}

impl ChannelHandoff {
    pub fn new(tx: Sender<EncodedImage>) -> Self {
        Self { tx }
    }
}

impl Handoff for ChannelHandoff {
    fn hand_off(&self, image: EncodedImage) -> Result<(), HandoffError> {
        self.tx.send(image).map_err(|_| HandoffError::Disconnected)
    }
}

/// Writes each picture to a timestamped file.
#[derive(Debug, Clone)]
pub struct DirectoryHandoff {
    directory: PathBuf,
    prefix: String,
}

impl DirectoryHandoff {
    pub fn new(directory: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            prefix: prefix.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn file_name(&self, image: &EncodedImage) -> String {
        let extension = match image.format() {
            PictureFormat::Jpeg => "jpg",
            PictureFormat::Nv21 => "nv21",
            PictureFormat::Yuyv => "yuyv",
            PictureFormat::Rgb565 => "rgb565",
        };
        format!(
            "{}_{}.{}",
            self.prefix,
            image.captured_at().format("%Y%m%d_%H%M%S_%3f"),
            extension
        )
    }
}

impl Handoff for DirectoryHandoff {
    fn hand_off(&self, image: EncodedImage) -> Result<(), HandoffError> {
        std::fs::create_dir_all(&self.directory)?;
        let path = self.directory.join(self.file_name(&image));
        std::fs::write(&path, image.bytes())?;
        tracing::info!(path = %path.display(), bytes = image.len(), "Picture written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::unbounded;

    fn jpeg() -> EncodedImage {
        EncodedImage::new(vec![0xFF, 0xD8, 0x42, 0xFF, 0xD9], PictureFormat::Jpeg)
    }

    #[test]
    fn test_channel_handoff() {
        let (tx, rx) = unbounded();
        let handoff = ChannelHandoff::new(tx);
        handoff.hand_off(jpeg()).unwrap();
        assert_eq!(rx.try_recv().unwrap().len(), 5);

        drop(rx);
        assert!(matches!(
            handoff.hand_off(jpeg()),
            Err(HandoffError::Disconnected)
        ));
    }

    #[test]
    fn test_directory_handoff_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let handoff = DirectoryHandoff::new(dir.path().join("out"), "shot");
        handoff.hand_off(jpeg()).unwrap();

        let entries: Vec<_> = std::fs::read_dir(handoff.directory())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(entries.len(), 1);
        let name = entries[0].file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("shot_"));
        assert!(name.ends_with(".jpg"));
        assert_eq!(std::fs::read(&entries[0]).unwrap(), jpeg().into_bytes());
    }
}
