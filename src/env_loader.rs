use std::env;
use std::path::PathBuf;

fn fallback_dotenv_path(scx_home: Option<PathBuf>, home_dir: Option<PathBuf>) -> Option<PathBuf> {
    match scx_home {
        Some(base) => Some(base.join(".env")),
        None => Some(home_dir?.join(".scx-archive/.env")),
    }
}

pub fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    let fallback = fallback_dotenv_path(
        env::var_os("SCX_HOME").map(PathBuf::from),
        dirs::home_dir(),
    );

    let Some(path) = fallback else {
        return;
    };
    if path.is_file() {
        let _ = dotenvy::from_path(&path);
    }
}
