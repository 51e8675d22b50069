use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use common::access::key_hash;

const STAMP_DIR: &str = "db";
const STAMP_PREFIX: &str = "joined-";

/// On-disk marker recording that bootstrap completed for a given token.
///
/// The file name is derived from the raw token text exactly as the operator
///  supplied it, not its parsed form, so any change to the token (even a
///  cosmetic one) triggers a fresh bootstrap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapStamp {
    path: PathBuf,
}

impl BootstrapStamp {
    pub fn new(data_dir: &Path, raw_token: &str) -> Self {
        let name = format!("{}{}", STAMP_PREFIX, key_hash(raw_token));
        Self {
            path: data_dir.join(STAMP_DIR).join(name),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> io::Result<bool> {
        match fs::metadata(&self.path) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Create the stamp. Creating one that already exists is a no-op,
    ///  including when another process wins the race.
    pub fn create(&self) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            create_private_dir(parent)?;
        }

        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
        {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(e),
        }
    }
}

fn create_private_dir(dir: &Path) -> io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(dir)
}
