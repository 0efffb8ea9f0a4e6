//! First-run bootstrapping of the engine root directory.
//!
//! ```text
//! <root>/
//! ├── conf/
//! │   ├── server.conf   runtime configuration
//! │   └── log.conf      logging configuration
//! └── db/               table data
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use super::ConfigError;

/// Permissions for created directories (rwx rwx r-x).
pub const DIR_MODE: u32 = 0o775;

const SERVER_CONF: &str = "\
# Generated on first run; never overwritten.

# disable services
query.cache.enabled=false
select.cache.enabled=false
insert.cache.enabled=false
update.cache.enabled=false
wal.enabled.default=false
metrics.enabled=false
telemetry.enabled=false

# worker pools
shared.worker.count=2
query.worker.count=1
ingest.writer.worker.count=1

# commit lag bounds (ms)
o3.max.lag=10000
o3.min.lag=2000
";

const LOG_CONF: &str = "\
# Generated on first run; never overwritten.
writers=stdout,file
level=info
format=text
file.location=engine-same-process.log
";

/// Resolved paths under an engine root.
#[derive(Clone, Debug)]
pub struct RuntimeLayout {
    pub root: PathBuf,
    pub conf_dir: PathBuf,
    pub db_dir: PathBuf,
    pub server_conf: PathBuf,
    pub log_conf: PathBuf,
    /// True if `ensure` wrote any configuration file.
    pub created: bool,
}

impl RuntimeLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let conf_dir = root.join("conf");
        Self {
            db_dir: root.join("db"),
            server_conf: conf_dir.join("server.conf"),
            log_conf: conf_dir.join("log.conf"),
            conf_dir,
            root,
            created: false,
        }
    }
}

/// Produces a runtime configuration for a root directory.
#[derive(Clone, Debug)]
pub struct ConfigBootstrapper {
    layout: RuntimeLayout,
}

impl ConfigBootstrapper {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            layout: RuntimeLayout::new(root),
        }
    }

    /// Create the directory tree and any missing configuration file.
    ///
    /// Existing files are left untouched, so edits survive restarts.
    pub fn ensure(&self) -> Result<RuntimeLayout, ConfigError> {
        let mut layout = self.layout.clone();

        create_dir(&layout.conf_dir)?;
        create_dir(&layout.db_dir)?;

        layout.created |= write_if_missing(&layout.server_conf, SERVER_CONF)?;
        layout.created |= write_if_missing(&layout.log_conf, LOG_CONF)?;

        if layout.created {
            tracing::info!(root = %layout.root.display(), "configuration created");
        } else {
            tracing::debug!(root = %layout.root.display(), "configuration already present");
        }

        Ok(layout)
    }
}

fn create_dir(path: &Path) -> Result<(), ConfigError> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(DIR_MODE);
    }
    builder.create(path).map_err(|e| ConfigError::io(path, e))
}

fn write_if_missing(path: &Path, contents: &str) -> Result<bool, ConfigError> {
    if path.exists() {
        return Ok(false);
    }
    fs::write(path, contents).map_err(|e| ConfigError::io(path, e))?;
    Ok(true)
}
