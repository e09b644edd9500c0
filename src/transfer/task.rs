//! Transfer task and queue types.

use std::collections::VecDeque;
use std::path::Path;

/// One item the embedder selected for transfer, relative to the source
/// directory.
#[derive(Debug, Clone)]
pub struct TransferItem {
    pub name: String,
    pub is_directory: bool,
    pub size: u64,
}

/// One unit of work for the coordinator: a file or directory to recreate
/// at the target. Tasks are consumed front to back.
#[derive(Debug, Clone)]
pub struct TransferTask {
    source_path: String,
    target_path: String,
    is_directory: bool,
    size: u64,
    overwrite: bool,
}

impl TransferTask {
    pub fn new(
        source_path: String,
        target_path: String,
        is_directory: bool,
        size: u64,
    ) -> TransferTask {
        TransferTask {
            source_path,
            target_path,
            is_directory,
            size,
            overwrite: false,
        }
    }

    pub fn source_path(&self) -> &str {
        &self.source_path
    }

    pub fn target_path(&self) -> &str {
        &self.target_path
    }

    pub fn is_directory(&self) -> bool {
        self.is_directory
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn overwrite(&self) -> bool {
        self.overwrite
    }

    pub fn set_overwrite(&mut self, overwrite: bool) {
        self.overwrite = overwrite;
    }
}

pub type TaskList = VecDeque<TransferTask>;

/// Join a directory path and an entry name the way the local platform
/// expects.
pub fn join_path(directory: &str, name: &str) -> String {
    Path::new(directory).join(name).to_string_lossy().into_owned()
}
