use std::env;
use std::fs;
use std::path::PathBuf;

/// Filesystem locations for everything the backend persists.
///
/// The data directory is resolved once at startup; every store receives
/// its path from here instead of deriving one on its own.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub chat_db_path: PathBuf,
    pub vector_db_path: PathBuf,
    pub config_path: PathBuf,
}

impl AppPaths {
    pub fn new() -> Self {
        let data_dir = discover_data_dir();
        Self::with_data_dir(data_dir)
    }

    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        let log_dir = data_dir.join("logs");
        let chat_db_path = data_dir.join("chat.db");
        let vector_db_path = data_dir.join("collections.db");
        let config_path = config_file_path(&data_dir);

        for dir in [&data_dir, &log_dir] {
            let _ = fs::create_dir_all(dir);
        }

        AppPaths {
            data_dir,
            log_dir,
            chat_db_path,
            vector_db_path,
            config_path,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

fn discover_data_dir() -> PathBuf {
    if let Ok(dir) = env::var("DOCCHAT_DATA_DIR") {
        return PathBuf::from(dir);
    }

    PathBuf::from("data")
}

fn config_file_path(data_dir: &std::path::Path) -> PathBuf {
    if let Ok(path) = env::var("DOCCHAT_CONFIG_PATH") {
        return PathBuf::from(path);
    }

    let user_config = data_dir.join("config.yml");
    if user_config.exists() {
        return user_config;
    }

    PathBuf::from("config.yml")
}
