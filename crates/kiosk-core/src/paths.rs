use crate::error::{KioskError, Result};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

pub const APP_QUALIFIER: &str = "com";
pub const APP_ORG: &str = "freekiosk";
pub const APP_NAME: &str = "kiosk";

const PREFERENCES_FILE: &str = "preferences.json";

pub fn data_dir() -> Result<PathBuf> {
    if let Ok(override_path) = std::env::var("KIOSK_DATA_DIR") {
        return Ok(PathBuf::from(override_path));
    }
    let dirs = ProjectDirs::from(APP_QUALIFIER, APP_ORG, APP_NAME)
        .ok_or_else(|| KioskError::Storage("cannot determine data directory".into()))?;
    Ok(dirs.data_dir().to_path_buf())
}

pub fn preferences_path(data_dir: &Path) -> PathBuf {
    data_dir.join(PREFERENCES_FILE)
}
