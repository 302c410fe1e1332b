//! Filesystem function store: one `<name>.py` file per block.

use super::{FunctionStore, StoreLocation};
use crate::codegen::{is_identifier, GeneratedFunction};
use crate::errors::{BlockflowError, NotFoundError};
use crate::functions::{BlockFunction, PythonFunction, PythonInterpreter};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Stores each function as `<dir>/<name>.py`.
///
/// Files are read fresh on every load, so hand edits take effect on the next
/// run.
#[derive(Debug, Clone)]
pub struct FileFunctionStore {
    dir: PathBuf,
    interpreter: Arc<PythonInterpreter>,
}

impl FileFunctionStore {
    /// Creates a store rooted at `dir` using the default interpreter.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_interpreter(dir, Arc::new(PythonInterpreter::default()))
    }

    /// Creates a store rooted at `dir` that runs files with `interpreter`.
    pub fn with_interpreter(dir: impl Into<PathBuf>, interpreter: Arc<PythonInterpreter>) -> Self {
        Self {
            dir: dir.into(),
            interpreter,
        }
    }

    /// The directory functions are written to.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file for `name`, or `None` if `name` is not a valid
    /// identifier.
    #[must_use]
    pub fn path_for(&self, name: &str) -> Option<PathBuf> {
        is_identifier(name).then(|| self.dir.join(format!("{name}.py")))
    }
}

#[async_trait]
impl FunctionStore for FileFunctionStore {
    async fn save(&self, function: &GeneratedFunction) -> Result<StoreLocation, BlockflowError> {
        let path = self.path_for(function.name()).ok_or_else(|| {
            std::io::Error::new(
                ErrorKind::InvalidInput,
                format!("'{}' is not a valid function name", function.name()),
            )
        })?;

        tokio::fs::create_dir_all(&self.dir).await?;
        // Write then rename so a crash never leaves a half-written file.
        let tmp = path.with_extension("py.tmp");
        tokio::fs::write(&tmp, function.source()).await?;
        tokio::fs::rename(&tmp, &path).await?;

        debug!(block = %function.name(), path = %path.display(), "wrote function file");
        Ok(StoreLocation::File(path))
    }

    async fn load(&self, name: &str) -> Result<Arc<dyn BlockFunction>, BlockflowError> {
        let Some(path) = self.path_for(name) else {
            return Err(NotFoundError::new(name).into());
        };

        let source = match tokio::fs::read_to_string(&path).await {
            Ok(source) => source,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(NotFoundError::new(name)
                    .with_location(path.display().to_string())
                    .into());
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Arc::new(PythonFunction::new(
            name,
            source,
            Arc::clone(&self.interpreter),
        )))
    }

    async fn exists(&self, name: &str) -> bool {
        match self.path_for(name) {
            Some(path) => tokio::fs::try_exists(path).await.unwrap_or(false),
            None => false,
        }
    }
}
