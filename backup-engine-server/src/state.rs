use crate::db::connection::DbPool;
use backup_engine::BackupEngine;
use std::sync::Arc;

pub struct AppState {
    pub db: DbPool,
    pub engine: Arc<BackupEngine>,
}

impl AppState {
    pub fn new(db: DbPool, engine: Arc<BackupEngine>) -> Self {
        Self { db, engine }
    }
}
