//! In-memory function store.

use std::collections::HashMap;
use std::sync::RwLock;

use ukfaas_types::Function;

use crate::{Error, FunctionStore, Result};

/// Concurrent map of service name → function spec.
#[derive(Debug, Default)]
pub struct MemoryFunctionStore {
    functions: RwLock<HashMap<String, Function>>,
}

impl MemoryFunctionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FunctionStore for MemoryFunctionStore {
    fn put_function(&self, service: &str, function: Function) -> Result<()> {
        let mut functions = self.functions.write().map_err(|_| Error::LockPoisoned)?;
        functions.insert(service.to_string(), function);
        Ok(())
    }

    fn get_function(&self, service: &str) -> Result<Function> {
        let functions = self.functions.read().map_err(|_| Error::LockPoisoned)?;
        functions
            .get(service)
            .cloned()
            .ok_or_else(|| Error::FunctionNotFound(service.to_string()))
    }

    fn delete_function(&self, service: &str) -> Result<()> {
        let mut functions = self.functions.write().map_err(|_| Error::LockPoisoned)?;
        functions.remove(service);
        Ok(())
    }

    fn list_functions(&self) -> Result<Vec<Function>> {
        let functions = self.functions.read().map_err(|_| Error::LockPoisoned)?;
        Ok(functions.values().cloned().collect())
    }
}
