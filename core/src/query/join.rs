use crate::error::{FlatError, FlatResult};
use crate::query::result::RaResult;
use crate::storage::{TableRef, is_deleted};
use std::collections::BTreeMap;

impl RaResult {
    /// Nested-loop equality join of `alias` against `column` of `other`.
    ///
    /// Every matching pair extends each existing table's rows with the
    /// driving position and `other` with the matched row, so positions keep
    /// lining up across all tables of the result.
    pub fn nl_join(
        &mut self,
        alias: &str,
        other: &TableRef,
        column: &str,
    ) -> FlatResult<&mut Self> {
        let driving = self.alias(alias)?.clone();
        if !other.read().has_column(column) {
            return Err(FlatError::ColumnNotFound(column.to_string()));
        }
        // Checks the other table's aliases before anything changes
        let (other_name, other_live, other_aliases) = self.scan(other)?;

        let driving_rows = {
            let driving_table = self.table(&driving.table_name)?;
            let table = driving_table.table.read();
            driving_table
                .row_numbers
                .iter()
                .map(|&row_number| table.read(row_number))
                .collect::<FlatResult<Vec<_>>>()?
        };
        let other_rows = {
            let table = other.read();
            other_live
                .iter()
                .map(|&row_number| table.read(row_number).map(|row| (row_number, row)))
                .collect::<FlatResult<Vec<_>>>()?
        };

        let mut joined: BTreeMap<String, Vec<usize>> = self
            .tables
            .keys()
            .map(|name| (name.clone(), Vec::new()))
            .collect();
        let mut other_matched = Vec::new();

        for (position, left) in driving_rows.iter().enumerate() {
            if is_deleted(left) {
                continue;
            }
            for (row_number, right) in &other_rows {
                if is_deleted(right) || left.get(&driving.column_name) != right.get(column) {
                    continue;
                }
                for (name, rows) in joined.iter_mut() {
                    rows.push(self.tables[name].row_numbers[position]);
                }
                other_matched.push(*row_number);
            }
        }

        tracing::debug!(
            "Joined {} on {} = {}.{}: {} rows",
            driving.table_name,
            driving.column_name,
            other_name,
            column,
            other_matched.len()
        );
        for (name, rows) in joined {
            if let Some(table) = self.tables.get_mut(&name) {
                table.row_numbers = rows;
            }
        }
        self.register(other, other_name, other_matched, other_aliases);
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::filter::Eq;
    use crate::storage::{Database, Row};
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn insert(table: &TableRef, values: &[(&str, &str)]) {
        let row: Row = values
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        table.write().insert(&row).unwrap();
    }

    fn setup(db: &Database) -> (TableRef, TableRef) {
        let people = db.create("PEOPLE").unwrap();
        people.write().add("NAME", 20).unwrap();
        people.write().add("AGE", 2).unwrap();
        insert(&people, &[("NAME", "Buzz"), ("AGE", "18")]);
        insert(&people, &[("NAME", "Christina"), ("AGE", "21")]);
        insert(&people, &[("NAME", "Nick"), ("AGE", "30")]);

        let contact = db.create("CONTACT").unwrap();
        contact.write().add("SITE", 20).unwrap();
        contact.write().add("OWNER", 20).unwrap();
        insert(&contact, &[("SITE", "github"), ("OWNER", "Nick")]);
        insert(&contact, &[("SITE", "gmail"), ("OWNER", "Buzz")]);
        insert(&contact, &[("SITE", "gitlab"), ("OWNER", "Nick")]);
        (people, contact)
    }

    #[test]
    fn test_nl_join_pairs_rows() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();
        let (people, contact) = setup(&db);

        let mut r = RaResult::new();
        r.load(&people).unwrap().nl_join("NAME", &contact, "OWNER").unwrap();

        assert_eq!(r.number_of_rows(), 3);
        assert_eq!(r.table("PEOPLE").unwrap().row_numbers, vec![0, 2, 2]);
        assert_eq!(r.table("CONTACT").unwrap().row_numbers, vec![1, 0, 2]);
        let row = r.read(1).unwrap();
        assert_eq!(row["NAME"], "Nick");
        assert_eq!(row["SITE"], "github");
    }

    #[test]
    fn test_select_after_join_keeps_correspondence() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();
        let (people, contact) = setup(&db);

        let mut r = RaResult::new();
        r.load(&people)
            .unwrap()
            .nl_join("NAME", &contact, "OWNER")
            .unwrap()
            .select("NAME", &Eq, "Nick")
            .unwrap();

        assert_eq!(r.table("PEOPLE").unwrap().row_numbers, vec![2, 2]);
        assert_eq!(r.table("CONTACT").unwrap().row_numbers, vec![0, 2]);
        let sites: Vec<_> = (0..r.number_of_rows())
            .map(|i| r.read(i).unwrap()["SITE"].clone())
            .collect();
        assert_eq!(sites, vec!["github", "gitlab"]);
    }

    #[test]
    fn test_nl_join_skips_deleted_rows() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();
        let (people, contact) = setup(&db);
        contact.write().delete(0).unwrap();

        let mut r = RaResult::new();
        r.load(&people).unwrap().nl_join("NAME", &contact, "OWNER").unwrap();
        assert_eq!(r.table("CONTACT").unwrap().row_numbers, vec![1, 2]);
    }

    #[test]
    fn test_nl_join_requires_distinct_aliases() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();
        let (people, _) = setup(&db);
        let friends = db.create("FRIENDS").unwrap();
        friends.write().add("NAME", 20).unwrap();
        insert(&friends, &[("NAME", "Buzz")]);

        let mut r = RaResult::new();
        r.load(&people).unwrap();
        assert!(matches!(
            r.nl_join("NAME", &friends, "NAME"),
            Err(FlatError::DuplicateAlias(_))
        ));
        assert_eq!(r.number_of_rows(), 3);

        r.redefine("NAME", "PERSON_NAME").unwrap();
        r.nl_join("PERSON_NAME", &friends, "NAME").unwrap();
        assert_eq!(r.number_of_rows(), 1);
        assert_eq!(r.read(0).unwrap()["PERSON_NAME"], "Buzz");
    }
}
