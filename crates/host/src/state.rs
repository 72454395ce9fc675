use herbivory_storage::Database;
use std::path::PathBuf;

/// Host-side state: the store of the folder currently open, if any.
#[derive(Debug, Default)]
pub struct HostState {
    pub folder: Option<PathBuf>,
    pub database: Option<Database>,
}

impl HostState {
    pub fn database(&self) -> Option<&Database> {
        self.database.as_ref()
    }

    pub fn database_mut(&mut self) -> Option<&mut Database> {
        self.database.as_mut()
    }
}
