use std::path::PathBuf;

use crate::db::{get_connection, init_db};
use crate::error::Result;
use crate::settings::{load_settings, save_settings, settings_path, shellexpand_path};

pub fn run(data_dir: Option<String>) -> Result<()> {
    let mut settings = load_settings();
    if let Some(dir) = data_dir {
        settings.data_dir = shellexpand_path(&dir);
    }

    let resolved = PathBuf::from(&settings.data_dir);
    std::fs::create_dir_all(&resolved)?;
    save_settings(&settings)?;

    let conn = get_connection(&settings.db_path())?;
    init_db(&conn)?;

    println!("Initialized tally at {}", resolved.display());
    println!("Settings: {}", settings_path().display());
    Ok(())
}
