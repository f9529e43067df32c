// In-memory ObjectStore for tests.
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;

use super::{ObjectStore, ObjectWriter};
use crate::errors::{AppError, Result};

#[derive(Default)]
struct State {
    // Kept in insertion order so listings come back unsorted.
    objects: Vec<(String, Vec<u8>)>,
    delete_attempts: Vec<String>,
    aborted: Vec<String>,
    failing_deletes: HashSet<String>,
    fail_list: bool,
    fail_open: bool,
    fail_finish: bool,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn with_objects(names: &[&str]) -> Self {
        let store = MemoryStore::default();
        store.state.lock().unwrap().objects = names
            .iter()
            .map(|name| (name.to_string(), Vec::new()))
            .collect();
        store
    }

    pub fn fail_delete_of(&self, key: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_deletes
            .insert(key.to_string());
    }

    pub fn fail_listing(&self) {
        self.state.lock().unwrap().fail_list = true;
    }

    pub fn fail_open(&self) {
        self.state.lock().unwrap().fail_open = true;
    }

    pub fn fail_finish(&self) {
        self.state.lock().unwrap().fail_finish = true;
    }

    pub fn names(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.objects.iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        let state = self.state.lock().unwrap();
        state
            .objects
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, body)| body.clone())
    }

    pub fn delete_attempts(&self) -> Vec<String> {
        self.state.lock().unwrap().delete_attempts.clone()
    }

    pub fn aborted(&self) -> Vec<String> {
        self.state.lock().unwrap().aborted.clone()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn open_writer(&self, key: &str) -> Result<Box<dyn ObjectWriter>> {
        if self.state.lock().unwrap().fail_open {
            return Err(AppError::Storage(format!("cannot open {}", key)));
        }
        Ok(Box::new(MemoryWriter {
            key: key.to_string(),
            body: Vec::new(),
            state: Arc::clone(&self.state),
        }))
    }

    async fn list_names(&self) -> Result<Vec<String>> {
        if self.state.lock().unwrap().fail_list {
            return Err(AppError::Storage("listing unavailable".to_string()));
        }
        Ok(self.names())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.delete_attempts.push(key.to_string());
        if state.failing_deletes.contains(key) {
            return Err(AppError::Storage(format!("cannot delete {}", key)));
        }
        state.objects.retain(|(name, _)| name != key);
        Ok(())
    }
}

struct MemoryWriter {
    key: String,
    body: Vec<u8>,
    state: Arc<Mutex<State>>,
}

#[async_trait]
impl ObjectWriter for MemoryWriter {
    async fn write(&mut self, chunk: Bytes) -> Result<()> {
        self.body.extend_from_slice(&chunk);
        Ok(())
    }

    async fn finish(&mut self) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        if state.fail_finish {
            return Err(AppError::Storage(format!("cannot complete {}", self.key)));
        }
        let body = std::mem::take(&mut self.body);
        let size = body.len() as u64;
        state.objects.retain(|(name, _)| *name != self.key);
        state.objects.push((self.key.clone(), body));
        Ok(size)
    }

    async fn abort(&mut self) -> Result<()> {
        self.state.lock().unwrap().aborted.push(self.key.clone());
        Ok(())
    }
}
