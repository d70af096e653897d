use std::{
    fs,
    path::{Path, PathBuf},
};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::dao::storage::{StorageError, StorageResult};

/// Compact summary of one completed race, as written to durable storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaceSummaryEntity {
    /// Index of the race within the competition.
    pub race_index: u32,
    /// Final key total of the viewing player's team.
    pub home_keys: u32,
    /// Final key total of the opposing team.
    pub away_keys: u32,
    /// Final board positions keyed by player identity.
    pub final_positions: IndexMap<String, usize>,
}

/// Rolling history of completed races for one competition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompetitionHistoryEntity {
    /// Identifier of the competition the races belong to.
    pub competition_id: String,
    /// Completed races, oldest first.
    pub races: Vec<RaceSummaryEntity>,
}

/// Abstraction over the persistence layer for race histories.
pub trait HistoryStore: Send + Sync {
    /// Load the stored history for `competition_id`, if any.
    fn load(&self, competition_id: &str) -> StorageResult<Option<CompetitionHistoryEntity>>;
    /// Persist `history`, replacing any previous record for its competition.
    fn save(&self, history: &CompetitionHistoryEntity) -> StorageResult<()>;
}

/// History store writing one JSON file per competition under a root directory.
#[derive(Debug, Clone)]
pub struct FileHistoryStore {
    root: PathBuf,
}

impl FileHistoryStore {
    /// Build a store rooted at `root`; the directory is created on first save.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn record_path(&self, competition_id: &str) -> PathBuf {
        // Competition ids come from the server; keep only filename-safe
        // characters so an id can never escape the root directory.
        let safe: String = competition_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            })
            .collect();
        self.root.join(format!("{safe}.json"))
    }
}

impl HistoryStore for FileHistoryStore {
    fn load(&self, competition_id: &str) -> StorageResult<Option<CompetitionHistoryEntity>> {
        let path = self.record_path(competition_id);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(StorageError::unavailable(
                    format!("reading history record {}", path.display()),
                    err,
                ));
            }
        };

        let history = serde_json::from_str(&contents).map_err(|err| {
            StorageError::corrupt(format!("decoding history record {}", path.display()), err)
        })?;
        Ok(Some(history))
    }

    fn save(&self, history: &CompetitionHistoryEntity) -> StorageResult<()> {
        ensure_dir(&self.root)?;
        let path = self.record_path(&history.competition_id);
        let contents = serde_json::to_string_pretty(history).map_err(|err| {
            StorageError::corrupt(format!("encoding history record {}", path.display()), err)
        })?;
        fs::write(&path, contents).map_err(|err| {
            StorageError::unavailable(format!("writing history record {}", path.display()), err)
        })
    }
}

fn ensure_dir(path: &Path) -> StorageResult<()> {
    fs::create_dir_all(path)
        .map_err(|err| StorageError::unavailable(format!("creating {}", path.display()), err))
}
