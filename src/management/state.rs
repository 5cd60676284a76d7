use std::{
    collections::HashSet,
    fmt,
    io::Error,
    path::{Path, PathBuf},
};

use tokio::sync::Mutex;

use crate::{logging::SharedLogger, management::persist};

#[derive(Debug)]
pub enum StateError {
    IoError(PathBuf, Error),
    SerdeError(PathBuf, serde_json::Error),
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateError::IoError(path, e) => write!(f, "state file {}: {}", path.display(), e),
            StateError::SerdeError(path, e) => {
                write!(f, "parse state file {}: {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for StateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StateError::IoError(_, e) => Some(e),
            StateError::SerdeError(_, e) => Some(e),
        }
    }
}

/// Names of albums that were fully processed.
///
/// Every mutation is persisted before it becomes visible: the file always
/// holds a sorted, deduplicated JSON array and is replaced atomically. One
/// async mutex guards the set; `mark_completed` holds it across the check and
/// the file write, so concurrent workers never interleave writes or observe a
/// name whose record is not yet on disk.
pub struct CompletionStore {
    path: PathBuf,
    completed: Mutex<HashSet<String>>,
}

impl CompletionStore {
    /// Opens the store, loading `path` if it exists.
    ///
    /// # Arguments
    ///
    /// * `path` - Location of the JSON state file
    /// * `logger` - Receives a line with the number of loaded names
    ///
    /// # Errors
    ///
    /// A missing file yields an empty store; unreadable or malformed files are
    /// errors.
    pub async fn open(path: impl Into<PathBuf>, logger: SharedLogger) -> Result<Self, StateError> {
        let path = path.into();

        let completed: HashSet<String> = match async_fs::read_to_string(&path).await {
            Ok(json) => {
                let names: Vec<String> = serde_json::from_str(&json)
                    .map_err(|e| StateError::SerdeError(path.clone(), e))?;
                names.into_iter().collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashSet::new(),
            Err(e) => return Err(StateError::IoError(path, e)),
        };

        if !completed.is_empty() {
            logger.info(&format!(
                "Loaded {} completed album(s) from {}",
                completed.len(),
                path.display()
            ));
        }

        Ok(Self {
            path,
            completed: Mutex::new(completed),
        })
    }

    /// Location of the state file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Exact, case-sensitive membership check.
    pub async fn is_completed(&self, name: &str) -> bool {
        self.completed.lock().await.contains(name)
    }

    pub async fn len(&self) -> usize {
        self.completed.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.completed.lock().await.is_empty()
    }

    /// Copy of the current set, for bulk membership checks.
    pub async fn snapshot(&self) -> HashSet<String> {
        self.completed.lock().await.clone()
    }

    /// Sorted copy of the completed names.
    pub async fn names(&self) -> Vec<String> {
        sorted(&*self.completed.lock().await)
    }

    /// Records `name` and persists the full set before returning.
    ///
    /// Already-recorded names return immediately without touching the disk.
    /// On a write failure the in-memory set is left unchanged.
    pub async fn mark_completed(&self, name: &str) -> Result<(), StateError> {
        let mut completed = self.completed.lock().await;

        if completed.contains(name) {
            return Ok(());
        }

        let mut names = sorted(&completed);
        names.push(name.to_string());
        names.sort();
        names.dedup();

        let json =
            serde_json::to_vec(&names).map_err(|e| StateError::SerdeError(self.path.clone(), e))?;
        persist::write_atomic(&self.path, &json)
            .await
            .map_err(|e| StateError::IoError(self.path.clone(), e))?;

        completed.insert(name.to_string());
        Ok(())
    }
}

fn sorted(set: &HashSet<String>) -> Vec<String> {
    let mut names: Vec<String> = set.iter().cloned().collect();
    names.sort();
    names
}
