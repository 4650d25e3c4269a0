use crate::error::FlatResult;
use crate::query::filter::Filter;
use crate::query::result::RaResult;
use crate::storage::is_deleted;

/// One condition of a multiple select.
pub struct Condition {
    pub alias: String,
    pub filter: Box<dyn Filter>,
    pub parameter: String,
}

impl Condition {
    pub fn new(
        alias: impl Into<String>,
        filter: impl Filter + 'static,
        parameter: impl Into<String>,
    ) -> Self {
        Self {
            alias: alias.into(),
            filter: Box::new(filter),
            parameter: parameter.into(),
        }
    }
}

impl RaResult {
    /// Keep the positions whose `alias` value passes `filter`. Every table in
    /// the result is narrowed to the same positions, so joined rows stay
    /// aligned.
    pub fn select(
        &mut self,
        alias: &str,
        filter: &dyn Filter,
        parameter: &str,
    ) -> FlatResult<&mut Self> {
        let column = self.alias(alias)?.clone();
        let driving = self.table(&column.table_name)?;

        let mut kept = Vec::new();
        {
            let table = driving.table.read();
            for (position, &row_number) in driving.row_numbers.iter().enumerate() {
                let row = table.read(row_number)?;
                let value = row.get(&column.column_name).map_or("", String::as_str);
                if !is_deleted(&row) && filter.compare(value, parameter) {
                    kept.push(position);
                }
            }
        }

        for table in self.tables.values_mut() {
            table.row_numbers = kept.iter().map(|&i| table.row_numbers[i]).collect();
        }
        Ok(self)
    }

    /// Apply conditions left to right, stopping at the first failure.
    pub fn multiple_select(&mut self, conditions: &[Condition]) -> FlatResult<&mut Self> {
        for condition in conditions {
            self.select(
                &condition.alias,
                condition.filter.as_ref(),
                &condition.parameter,
            )?;
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FlatError;
    use crate::query::filter::{Eq, Gt, Lt};
    use crate::storage::{Database, Row, TableRef};
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
        }
        people
    }

    fn names(r: &RaResult) -> Vec<String> {
        (0..r.number_of_rows())
            .map(|i| r.read(i).unwrap()["NAME"].clone())
            .collect()
    }

    #[test]
    fn test_select() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();
        let people = people(&db);

        let mut r = RaResult::new();
        r.load(&people).unwrap().select("AGE", &Gt, "20").unwrap();
        assert_eq!(names(&r), vec!["Christina", "Nick"]);

        r.select("NAME", &Eq, "Nick").unwrap();
        assert_eq!(r.table("PEOPLE").unwrap().row_numbers, vec![2]);

        assert!(matches!(
            r.select("SITE", &Eq, "x"),
            Err(FlatError::AliasNotFound(_))
        ));
    }

    #[test]
    fn test_select_excludes_rows_deleted_after_load() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();
        let people = people(&db);

        let mut r = RaResult::new();
        r.load(&people).unwrap();
        people.write().delete(0).unwrap();
        r.select("AGE", &Lt, "99").unwrap();
        assert_eq!(names(&r), vec!["Christina", "Nick"]);
    }

    #[test]
    fn test_multiple_select() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();
        let people = people(&db);

        let mut r = RaResult::new();
        r.load(&people)
            .unwrap()
            .multiple_select(&[
                Condition::new("AGE", Gt, "18"),
                Condition::new("AGE", Lt, "25"),
            ])
            .unwrap();
        assert_eq!(names(&r), vec!["Christina"]);

        let mut r = RaResult::new();
        r.load(&people).unwrap();
        assert!(
            r.multiple_select(&[Condition::new("NOPE", Eq, "")])
                .is_err()
        );
    }
}
