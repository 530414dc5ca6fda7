use std::fmt::{Debug, Display};

use kernel::{CreateRun, DeleteResult, FileRole, Run, RunFile, RunSummary};

/// File received by the upload endpoint.
#[derive(Debug, Clone)]
pub struct NewFile {
    pub name: String,
    pub role: Option<FileRole>,
    /// Size before compression, when the client compressed the file
    pub original_size: Option<u64>,
    pub data: Vec<u8>,
}

pub trait Storage {
    type Err: Debug + Display;

    fn create_run(&mut self, request: CreateRun) -> Result<String, Self::Err>;

    fn insert_file(&mut self, run_id: &str, file: NewFile) -> Result<RunFile, Self::Err>;

    fn get_runs(&self) -> Result<Vec<RunSummary>, Self::Err>;

    fn get_run(&self, run_id: &str) -> Result<Run, Self::Err>;

    fn get_file_data(&self, path: &str) -> Result<(RunFile, Vec<u8>), Self::Err>;

    fn delete_run(&mut self, run_id: &str) -> Result<DeleteResult, Self::Err>;
}
