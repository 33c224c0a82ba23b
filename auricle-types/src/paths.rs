//! Platform-specific directory resolution for Auricle artifacts.

use std::path::PathBuf;

fn project_dirs() -> directories::ProjectDirs {
    directories::ProjectDirs::from("", "", "auricle")
        .expect("Failed to determine project directories")
}

/// Returns the platform-appropriate data directory.
///
/// | Platform | Directory |
/// |----------|-----------|
/// | Linux | `$XDG_DATA_HOME/auricle` or `~/.local/share/auricle` |
/// | macOS | `~/Library/Application Support/auricle` |
/// | Windows | `%LOCALAPPDATA%\auricle\auricle\data` |
pub fn data_dir() -> PathBuf {
    project_dirs().data_local_dir().to_path_buf()
}

/// Directory for daily transcript files.
pub fn transcripts_dir() -> PathBuf {
    data_dir().join("transcripts")
}

/// Path of the persisted speaker store.
pub fn speaker_store_path() -> PathBuf {
    data_dir().join("speakers.json")
}

/// Path of the service configuration file.
pub fn config_path() -> PathBuf {
    project_dirs().config_dir().join("config.json")
}
