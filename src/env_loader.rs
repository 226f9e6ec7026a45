use std::env;
use std::path::PathBuf;

fn fallback_dotenv_path(config_dir: Option<PathBuf>) -> Option<PathBuf> {
    Some(config_dir?.join("sebsync/.env"))
}

pub fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    let fallback = match env::var_os("SEBSYNC_CONFIG_DIR") {
        Some(dir) => fallback_dotenv_path(Some(PathBuf::from(dir))),
        None => fallback_dotenv_path(dirs::config_dir()),
    };

    let Some(path) = fallback else {
        return;
    };
    if path.is_file() {
        let _ = dotenvy::from_path(&path);
    }
}
