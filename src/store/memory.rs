use std::cell::RefCell;
use std::collections::HashMap;

use crate::error::Result;
use crate::store::repo::StateRepository;

/// Non-persistent repository; state dies with the process.
#[derive(Debug, Default)]
pub struct MemoryRepo {
    values: RefCell<HashMap<String, String>>,
}

impl MemoryRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateRepository for MemoryRepo {
    fn get_text(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.borrow().get(key).cloned())
    }

    fn set_many(&self, entries: &[(&str, &str)]) -> Result<()> {
        let mut values = self.values.borrow_mut();
        for (k, v) in entries {
            values.insert((*k).to_string(), (*v).to_string());
        }
        Ok(())
    }

    fn remove_many(&self, keys: &[&str]) -> Result<()> {
        let mut values = self.values.borrow_mut();
        for k in keys {
            values.remove(*k);
        }
        Ok(())
    }
}
