use std::{
    collections::BTreeSet,
    fs, io,
    path::{Path, PathBuf},
};

use super::bundle::Bundle;
use crate::error::ProfileError;

pub const DEFAULT_PROFILE: &str = "default";
const BUNDLE_EXT: &str = "json";
const BACKUP_SUFFIX: &str = ".bak";

/// Lowercase slug of alphanumerics, `-` and `_`; anything else becomes `-`.
pub fn sanitize_profile(name: &str) -> String {
    let slug: String = name
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect();
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        DEFAULT_PROFILE.to_string()
    } else {
        slug.to_string()
    }
}

/// One bundle file per profile slug plus a single `.bak` generation beside it.
#[derive(Clone, Debug)]
pub struct ProfileStore {
    dir: PathBuf,
}

impl ProfileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn bundle_path(&self, slug: &str) -> PathBuf {
        self.dir.join(format!("{slug}.{BUNDLE_EXT}"))
    }

    pub fn backup_path(&self, slug: &str) -> PathBuf {
        self.dir.join(format!("{slug}.{BUNDLE_EXT}{BACKUP_SUFFIX}"))
    }

    pub fn exists(&self, slug: &str) -> bool {
        self.bundle_path(slug).is_file()
    }

    pub fn has_backup(&self, slug: &str) -> bool {
        self.backup_path(slug).is_file()
    }

    /// Missing or unreadable bundles yield `None`; corruption is logged, never raised.
    pub fn load(&self, slug: &str) -> Option<Bundle> {
        let path = self.bundle_path(slug);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return None,
            Err(err) => {
                log::warn!("failed to read profile bundle {}: {err}", path.display());
                return None;
            }
        };
        match Bundle::decode(&text) {
            Ok(bundle) => Some(bundle),
            Err(err) => {
                log::warn!("ignoring corrupt profile bundle {}: {err}", path.display());
                None
            }
        }
    }

    /// Writes through a temporary sibling so readers never observe a partial file.
    pub fn save(&self, slug: &str, bundle: &Bundle) -> Result<(), ProfileError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.bundle_path(slug);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, bundle.encode()?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Copies the current bundle over the backup. Returns whether there was anything to copy.
    pub fn backup(&self, slug: &str) -> Result<bool, ProfileError> {
        let src = self.bundle_path(slug);
        if !src.is_file() {
            return Ok(false);
        }
        fs::copy(&src, self.backup_path(slug))?;
        Ok(true)
    }

    pub fn restore_backup(&self, slug: &str) -> Result<(), ProfileError> {
        let bak = self.backup_path(slug);
        if !bak.is_file() {
            return Err(ProfileError::NoBackup(slug.to_string()));
        }
        fs::copy(&bak, self.bundle_path(slug))?;
        Ok(())
    }

    pub fn copy(&self, from: &str, to: &str) -> Result<(), ProfileError> {
        fs::create_dir_all(&self.dir)?;
        fs::copy(self.bundle_path(from), self.bundle_path(to))?;
        Ok(())
    }

    /// Removes the bundle and its backup. Returns whether anything was deleted.
    pub fn remove(&self, slug: &str) -> Result<bool, ProfileError> {
        let mut removed = false;
        for path in [self.bundle_path(slug), self.backup_path(slug)] {
            match fs::remove_file(&path) {
                Ok(()) => removed = true,
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(removed)
    }

    /// Moves `src` to `dst`; the backup follows unless `dst` already has one.
    pub fn rename(&self, src: &str, dst: &str) -> Result<(), ProfileError> {
        let src_path = self.bundle_path(src);
        let dst_path = self.bundle_path(dst);
        if !src_path.is_file() {
            return Err(ProfileError::NotFound(src.to_string()));
        }
        if dst_path.exists() {
            return Err(ProfileError::AlreadyExists(dst.to_string()));
        }
        fs::rename(&src_path, &dst_path)?;

        let src_bak = self.backup_path(src);
        let dst_bak = self.backup_path(dst);
        if src_bak.is_file() && !dst_bak.exists() {
            fs::rename(&src_bak, &dst_bak)?;
        }
        Ok(())
    }

    /// Profiles found on disk. Backups and temporaries are not profiles.
    pub fn list(&self) -> BTreeSet<String> {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return BTreeSet::new();
        };
        entries
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some(BUNDLE_EXT) {
                    return None;
                }
                let stem = path.file_stem()?.to_str()?;
                (!stem.is_empty()).then(|| sanitize_profile(stem))
            })
            .collect()
    }
}
