//! Filename resolution under the run's working directory

use std::path::{Component, Path, PathBuf};

use generation::constants::IMAGE_EXTENSIONS;
use thiserror::Error;

use crate::error::{EngineError, Result};

/// Why a filename could not be resolved
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("empty filename")]
    Empty,

    #[error("'{0}' must be relative to the working directory")]
    Absolute(String),

    #[error("'{0}' escapes the working directory")]
    ParentComponent(String),

    #[error("no image numbered {iteration} in '{folder}'")]
    NoIndexedImage { folder: String, iteration: u32 },
}

/// Root for every relative filename in a workflow
#[derive(Debug, Clone)]
pub struct WorkingDirectory {
    root: PathBuf,
}

impl WorkingDirectory {
    /// Check that `root` exists, is a directory and is writable
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let metadata = std::fs::metadata(&root)
            .map_err(|e| EngineError::working_directory(&root, e.to_string()))?;
        if !metadata.is_dir() {
            return Err(EngineError::working_directory(&root, "not a directory"));
        }
        if metadata.permissions().readonly() {
            return Err(EngineError::working_directory(&root, "read-only"));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a workflow filename, refusing anything outside the root
    pub fn resolve(&self, name: &str) -> std::result::Result<PathBuf, PathError> {
        if name.trim().is_empty() {
            return Err(PathError::Empty);
        }
        let relative = Path::new(name);
        for component in relative.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                Component::ParentDir => return Err(PathError::ParentComponent(name.to_string())),
                Component::RootDir | Component::Prefix(_) => {
                    return Err(PathError::Absolute(name.to_string()))
                }
            }
        }
        Ok(self.root.join(relative))
    }

    /// Target of `loopSave`: `x_` becomes `x_<i>.png`, `x.png` becomes `x<i>.png`
    pub fn loop_save_path(
        &self,
        prefix: &str,
        iteration: u32,
    ) -> std::result::Result<PathBuf, PathError> {
        let stem = match prefix.len().checked_sub(4) {
            Some(cut) if prefix.is_char_boundary(cut) && prefix[cut..].eq_ignore_ascii_case(".png") => {
                &prefix[..cut]
            }
            _ => prefix,
        };
        self.resolve(&format!("{stem}{iteration}.png"))
    }

    /// Find `folder/<iteration>.<ext>` for the first known image extension
    pub async fn find_indexed_image(
        &self,
        folder: &str,
        iteration: u32,
    ) -> std::result::Result<PathBuf, PathError> {
        let folder_path = self.resolve(folder)?;
        for ext in IMAGE_EXTENSIONS {
            let candidate = folder_path.join(format!("{iteration}.{ext}"));
            if tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
                return Ok(candidate);
            }
        }
        Err(PathError::NoIndexedImage {
            folder: folder.to_string(),
            iteration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_rejects_missing_and_files() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            WorkingDirectory::open(dir.path().join("missing")),
            Err(EngineError::WorkingDirectory { .. })
        ));

        let file = dir.path().join("file.txt");
        std::fs::write(&file, "x").unwrap();
        assert!(matches!(
            WorkingDirectory::open(&file),
            Err(EngineError::WorkingDirectory { .. })
        ));

        assert!(WorkingDirectory::open(dir.path()).is_ok());
    }

    #[test]
    fn test_resolve_confines_paths() {
        let dir = tempdir().unwrap();
        let workdir = WorkingDirectory::open(dir.path()).unwrap();

        assert_eq!(
            workdir.resolve("in/base.png").unwrap(),
            dir.path().join("in/base.png")
        );
        assert_eq!(workdir.resolve(""), Err(PathError::Empty));
        assert!(matches!(
            workdir.resolve("../outside.png"),
            Err(PathError::ParentComponent(_))
        ));
        assert!(matches!(
            workdir.resolve("in/../../outside.png"),
            Err(PathError::ParentComponent(_))
        ));
        assert!(matches!(
            workdir.resolve("/etc/passwd"),
            Err(PathError::Absolute(_))
        ));
    }

    #[test]
    fn test_loop_save_path_templates() {
        let dir = tempdir().unwrap();
        let workdir = WorkingDirectory::open(dir.path()).unwrap();

        assert_eq!(
            workdir.loop_save_path("v_", 2).unwrap(),
            dir.path().join("v_2.png")
        );
        assert_eq!(
            workdir.loop_save_path("out/frame.png", 10).unwrap(),
            dir.path().join("out/frame10.png")
        );
        assert_eq!(
            workdir.loop_save_path("shot.PNG", 0).unwrap(),
            dir.path().join("shot0.png")
        );
    }

    #[tokio::test]
    async fn test_find_indexed_image_tries_extensions_in_order() {
        let dir = tempdir().unwrap();
        let frames = dir.path().join("frames");
        std::fs::create_dir_all(&frames).unwrap();
        std::fs::write(frames.join("0.jpg"), b"x").unwrap();
        std::fs::write(frames.join("1.webp"), b"x").unwrap();
        std::fs::write(frames.join("1.png"), b"x").unwrap();

        let workdir = WorkingDirectory::open(dir.path()).unwrap();
        assert_eq!(
            workdir.find_indexed_image("frames", 0).await.unwrap(),
            frames.join("0.jpg")
        );
        assert_eq!(
            workdir.find_indexed_image("frames", 1).await.unwrap(),
            frames.join("1.png")
        );
        assert_eq!(
            workdir.find_indexed_image("frames", 2).await,
            Err(PathError::NoIndexedImage {
                folder: "frames".into(),
                iteration: 2
            })
        );
    }
}
