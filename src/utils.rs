use std::path::Path;

use log::info;
use tokio::fs;

/// Asynchronously ensures that a directory exists, creating it if it does not.
/// This function is idempotent.
pub async fn ensure_directory_exists<P: AsRef<Path>>(path: P) -> std::io::Result<()> {
    let path = path.as_ref();
    if !fs::try_exists(path).await? {
        fs::create_dir_all(path).await?;
        info!("Created directory at: {:?}", path);
    }
    Ok(())
}
