use crate::error::Result;

/// Persisted client state: a handful of string keys.
///
/// `set_many`/`remove_many` apply all entries or none; readers never see a
/// cache blob without its timestamp.
pub trait StateRepository {
    fn get_text(&self, key: &str) -> Result<Option<String>>;
    fn set_many(&self, entries: &[(&str, &str)]) -> Result<()>;
    fn remove_many(&self, keys: &[&str]) -> Result<()>;

    fn set_text(&self, key: &str, value: &str) -> Result<()> {
        self.set_many(&[(key, value)])
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.remove_many(&[key])
    }

    fn get_i64(&self, key: &str) -> Result<Option<i64>> {
        Ok(self.get_text(key)?.and_then(|v| v.trim().parse().ok()))
    }

    fn set_i64(&self, key: &str, value: i64) -> Result<()> {
        self.set_text(key, &value.to_string())
    }
}

impl<R: StateRepository + ?Sized> StateRepository for std::rc::Rc<R> {
    fn get_text(&self, key: &str) -> Result<Option<String>> {
        (**self).get_text(key)
    }

    fn set_many(&self, entries: &[(&str, &str)]) -> Result<()> {
        (**self).set_many(entries)
    }

    fn remove_many(&self, keys: &[&str]) -> Result<()> {
        (**self).remove_many(keys)
    }
}
