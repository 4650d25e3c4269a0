use crate::error::{FlatError, FlatResult};
use crate::query::result::RaResult;

impl RaResult {
    /// Keep only the named aliases. A table left without any alias leaves
    /// the result, so project after the joins that need it.
    pub fn project(&mut self, keep: &[&str]) -> FlatResult<&mut Self> {
        self.aliases.retain(|alias, _| keep.contains(&alias.as_str()));
        let aliases = &self.aliases;
        self.tables
            .retain(|name, _| aliases.values().any(|c| &c.table_name == name));
        Ok(self)
    }

    /// Rename an alias.
    pub fn redefine(&mut self, old: &str, new: &str) -> FlatResult<&mut Self> {
        if self.aliases.contains_key(new) {
            return Err(FlatError::AliasAlreadyExists(new.to_string()));
        }
        let column = self
            .aliases
            .remove(old)
            .ok_or_else(|| FlatError::AliasNotFound(old.to_string()))?;
        self.aliases.insert(new.to_string(), column);
        Ok(self)
    }
}
