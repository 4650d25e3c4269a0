use crate::error::{FlatError, FlatResult};
use crate::storage::{Row, TableRef, is_deleted};
use std::collections::BTreeMap;
use std::fmt::Write;

/// A table taking part in a query, and its surviving rows.
#[derive(Debug, Clone)]
pub struct TableResult {
    pub table: TableRef,
    pub row_numbers: Vec<usize>,
}

/// The table and column an alias stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableColumn {
    pub table_name: String,
    pub column_name: String,
}

/// Relational algebra result.
///
/// Every table's `row_numbers` has the same length: position `i` across all
/// of them is one row of the result.
#[derive(Debug, Clone, Default)]
pub struct RaResult {
    pub(crate) tables: BTreeMap<String, TableResult>,
    pub(crate) aliases: BTreeMap<String, TableColumn>,
}

impl RaResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Independent copy that shares the table handles.
    pub fn copy(&self) -> Self {
        self.clone()
    }

    /// Live row numbers of `table` and the aliases its user columns bring in.
    pub(crate) fn scan(
        &self,
        table: &TableRef,
    ) -> FlatResult<(String, Vec<usize>, Vec<(String, TableColumn)>)> {
        let table = table.read();
        let name = table.name().to_string();
        if self.tables.contains_key(&name) {
            return Err(FlatError::TableAlreadyExists(name));
        }

        let mut aliases = Vec::new();
        for column in table.columns().iter().filter(|c| !c.is_system) {
            if self.aliases.contains_key(&column.name) {
                tracing::warn!(
                    "Column {} of table {} duplicates an existing alias",
                    column.name,
                    name
                );
                return Err(FlatError::DuplicateAlias(column.name.clone()));
            }
            aliases.push((
                column.name.clone(),
                TableColumn {
                    table_name: name.clone(),
                    column_name: column.name.clone(),
                },
            ));
        }

        let mut live = Vec::new();
        for i in 0..table.number_of_rows()? {
            if !is_deleted(&table.read(i)?) {
                live.push(i);
            }
        }
        Ok((name, live, aliases))
    }

    pub(crate) fn register(
        &mut self,
        table: &TableRef,
        name: String,
        row_numbers: Vec<usize>,
        aliases: Vec<(String, TableColumn)>,
    ) {
        self.tables.insert(
            name,
            TableResult {
                table: TableRef::clone(table),
                row_numbers,
            },
        );
        self.aliases.extend(aliases);
    }

    /// Bring every live row of a table into the result, with one alias per
    /// user column. Fails without changes if a column name is already an alias.
    pub fn load(&mut self, table: &TableRef) -> FlatResult<&mut Self> {
        let (name, live, aliases) = self.scan(table)?;
        self.register(table, name, live, aliases);
        Ok(self)
    }

    pub fn number_of_rows(&self) -> usize {
        self.tables
            .values()
            .next()
            .map_or(0, |t| t.row_numbers.len())
    }

    /// The row at `position`, keyed by alias.
    pub fn read(&self, position: usize) -> FlatResult<Row> {
        let rows = self.number_of_rows();
        if position >= rows {
            return Err(FlatError::RowOutOfRange {
                table: self.tables.keys().cloned().collect::<Vec<_>>().join(","),
                row: position,
                rows,
            });
        }

        let mut sources: BTreeMap<&str, Row> = BTreeMap::new();
        for (name, t) in &self.tables {
            let source = t.table.read().read(t.row_numbers[position])?;
            sources.insert(name.as_str(), source);
        }

        let mut row = Row::new();
        for (alias, column) in &self.aliases {
            let value = sources
                .get(column.table_name.as_str())
                .and_then(|source| source.get(&column.column_name))
                .cloned()
                .unwrap_or_default();
            row.insert(alias.clone(), value);
        }
        Ok(row)
    }

    pub fn table(&self, name: &str) -> FlatResult<&TableResult> {
        self.tables
            .get(name)
            .ok_or_else(|| FlatError::TableNotFound(name.to_string()))
    }

    pub fn aliases(&self) -> impl Iterator<Item = (&str, &TableColumn)> {
        self.aliases.iter().map(|(alias, c)| (alias.as_str(), c))
    }

    pub(crate) fn alias(&self, alias: &str) -> FlatResult<&TableColumn> {
        self.aliases
            .get(alias)
            .ok_or_else(|| FlatError::AliasNotFound(alias.to_string()))
    }

    /// Describe the result's tables and aliases, also logged at debug level.
    pub fn report(&self) -> String {
        let mut content = String::new();
        for (name, t) in &self.tables {
            let _ = writeln!(content, "Table: {}\t{:?}", name, t.row_numbers);
        }
        for (alias, c) in &self.aliases {
            let _ = writeln!(
                content,
                "Alias {}\tis {}.{}",
                alias, c.table_name, c.column_name
            );
        }
        tracing::debug!("{}", content);
        content
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn people(db: &Database) -> TableRef {
        let people = db.create("PEOPLE").unwrap();
        {
            let mut t = people.write();
            t.add("NAME", 20).unwrap();
            t.add("AGE", 2).unwrap();
            for (name, age) in [("Buzz", "18"), ("Christina", "21"), ("Nick", "30")] {
                let row: Row = [
                    ("NAME".to_string(), name.to_string()),
                    ("AGE".to_string(), age.to_string()),
                ]
                .into();
                t.insert(&row).unwrap();
            }
            t.delete(1).unwrap();
        }
        people
    }

    #[test]
    fn test_load_skips_deleted_rows() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();
        let people = people(&db);

        let mut r = RaResult::new();
        r.load(&people).unwrap();
        assert_eq!(r.number_of_rows(), 2);
        assert_eq!(r.table("PEOPLE").unwrap().row_numbers, vec![0, 2]);

        let aliases: Vec<_> = r.aliases().map(|(a, _)| a.to_string()).collect();
        assert_eq!(aliases, vec!["AGE", "NAME"]);

        let row = r.read(1).unwrap();
        assert_eq!(row["NAME"], "Nick");
        assert_eq!(row["AGE"], "30");
        assert!(!row.contains_key("~del"));
        assert!(r.read(2).is_err());
    }

    #[test]
    fn test_load_rejects_duplicates() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();
        let people = people(&db);
        let other = db.create("OTHER").unwrap();
        other.write().add("NAME", 5).unwrap();

        let mut r = RaResult::new();
        r.load(&people).unwrap();
        assert!(matches!(
            r.load(&people),
            Err(FlatError::TableAlreadyExists(_))
        ));
        assert!(matches!(r.load(&other), Err(FlatError::DuplicateAlias(_))));
        assert!(r.table("OTHER").is_err());
    }

    #[test]
    fn test_copy_is_independent() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();
        let people = people(&db);

        let mut r = RaResult::new();
        r.load(&people).unwrap();
        let snapshot = r.copy();
        r.tables.get_mut("PEOPLE").unwrap().row_numbers.clear();
        assert_eq!(snapshot.number_of_rows(), 2);
        assert!(snapshot.report().contains("Alias NAME\tis PEOPLE.NAME"));
    }
}
