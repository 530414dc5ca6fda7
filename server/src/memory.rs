use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use kernel::{CreateRun, DeleteResult, Run, RunFile, RunSummary, Verdict};
use uuid::Uuid;

use crate::domain::{NewFile, Storage};

#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("Run {0} not found")]
    RunNotFound(String),
    #[error("File {0} not found")]
    FileNotFound(String),
}

/// Keeps runs and file contents in process memory.
#[derive(Default)]
pub struct Memory {
    runs: BTreeMap<String, Run>,
    // file path -> content
    blobs: HashMap<String, Vec<u8>>,
    // run ids in creation order
    order: Vec<String>,
    next_file_id: i64,
}

impl Memory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for Memory {
    type Err = MemoryError;

    fn create_run(&mut self, request: CreateRun) -> Result<String, Self::Err> {
        let id = Uuid::new_v4().simple().to_string();
        let run = Run {
            id: id.clone(),
            created_at: Some(Utc::now().to_rfc3339()),
            tags: request.tags,
            files: Vec::new(),
            stats: request.stats,
        };
        self.runs.insert(id.clone(), run);
        self.order.push(id.clone());
        Ok(id)
    }

    fn insert_file(&mut self, run_id: &str, file: NewFile) -> Result<RunFile, Self::Err> {
        let Some(run) = self.runs.get_mut(run_id) else {
            return Err(MemoryError::RunNotFound(run_id.to_owned()));
        };

        self.next_file_id += 1;
        let stored = file.data.len() as u64;
        let path = format!("{run_id}/{}", file.name);
        let (size, compressed_size) = match file.original_size {
            Some(original) => (original, Some(stored)),
            None => (stored, None),
        };
        let info = RunFile {
            id: self.next_file_id.to_string(),
            name: file.name,
            path: path.clone(),
            size,
            compressed_size,
            role: file.role,
        };

        // uploading the same name twice replaces the earlier file
        run.files.retain(|f| f.path != path);
        run.files.push(info.clone());
        self.blobs.insert(path, file.data);
        Ok(info)
    }

    fn get_runs(&self) -> Result<Vec<RunSummary>, Self::Err> {
        let summaries = self
            .order
            .iter()
            .filter_map(|id| self.runs.get(id))
            .map(|run| RunSummary {
                id: run.id.clone(),
                created_at: run.created_at.clone(),
                verdict: run.stats.verdict.or_else(|| {
                    run.stats.failed.map(|failed| {
                        if failed == 0 {
                            Verdict::Pass
                        } else {
                            Verdict::Fail
                        }
                    })
                }),
                file_count: Some(run.files.len()),
                tags: run.tags.clone(),
            })
            .collect();
        Ok(summaries)
    }

    fn get_run(&self, run_id: &str) -> Result<Run, Self::Err> {
        self.runs
            .get(run_id)
            .cloned()
            .ok_or_else(|| MemoryError::RunNotFound(run_id.to_owned()))
    }

    fn get_file_data(&self, path: &str) -> Result<(RunFile, Vec<u8>), Self::Err> {
        let not_found = || MemoryError::FileNotFound(path.to_owned());
        let (run_id, _) = path.split_once('/').ok_or_else(not_found)?;
        let run = self.runs.get(run_id).ok_or_else(not_found)?;
        let info = run
            .files
            .iter()
            .find(|f| f.path == path)
            .ok_or_else(not_found)?;
        let data = self.blobs.get(path).ok_or_else(not_found)?;
        Ok((info.clone(), data.clone()))
    }

    fn delete_run(&mut self, run_id: &str) -> Result<DeleteResult, Self::Err> {
        let Some(run) = self.runs.remove(run_id) else {
            return Err(MemoryError::RunNotFound(run_id.to_owned()));
        };
        self.order.retain(|id| id != run_id);
        for file in &run.files {
            self.blobs.remove(&file.path);
        }
        Ok(DeleteResult {
            files: run.files.len(),
        })
    }
}
