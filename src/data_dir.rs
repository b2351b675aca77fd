use std::{
    ffi::OsString,
    fmt,
    path::{Path, PathBuf},
};

use tracing::debug;

use crate::error::{Error, Result};

pub const DATA_DIR_ENV_VAR: &str = "BROCHURE_RAG_DATA_DIR";

/// Where the data directory location came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataDirSource {
    Explicit,
    Environment,
    Xdg,
}

impl fmt::Display for DataDirSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DataDirSource::Explicit => "--data-dir",
            DataDirSource::Environment => DATA_DIR_ENV_VAR,
            DataDirSource::Xdg => "XDG data home",
        })
    }
}

/// Root directory holding everything brochure-rag persists.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
    source: DataDirSource,
}

impl DataDir {
    /// Resolve the data directory, first match wins:
    /// an explicit path, `BROCHURE_RAG_DATA_DIR`, then
    /// `~/.local/share/brochure-rag/`. The directory is created if needed.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        Self::resolve_with(explicit, std::env::var_os(DATA_DIR_ENV_VAR))
    }

    fn resolve_with(
        explicit: Option<&Path>,
        env: Option<OsString>,
    ) -> Result<Self> {
        let (root, source) = match (explicit, env) {
            (Some(path), _) => (path.to_path_buf(), DataDirSource::Explicit),
            (None, Some(val)) if !val.is_empty() => {
                (PathBuf::from(val), DataDirSource::Environment)
            }
            _ => (xdg_data_home()?, DataDirSource::Xdg),
        };

        std::fs::create_dir_all(&root)
            .map_err(|_| Error::DataDir(root.clone()))?;
        debug!(root = %root.display(), %source, "resolved data directory");

        Ok(Self { root, source })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn source(&self) -> DataDirSource {
        self.source
    }

    /// Default index location. Created lazily by the first build.
    pub fn index_dir(&self) -> PathBuf {
        self.root.join("index")
    }
}

fn xdg_data_home() -> Result<PathBuf> {
    xdg::BaseDirectories::with_prefix("brochure-rag")
        .get_data_home()
        .ok_or_else(|| {
            Error::Config("could not determine XDG data home directory".into())
        })
}
