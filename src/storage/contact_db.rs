use rusqlite::{Result as SqlResult, params};
use std::path::Path;

use super::LocalStore;
use super::database::Database;
use crate::common::Contact;
use crate::error::SyncError;

/// SQLite-backed contact cache.
pub struct ContactDatabase {
    db: Database,
}

impl ContactDatabase {
    /// Open (or create) the contact cache at `path`.
    pub fn with_path<P: AsRef<Path>>(path: P) -> Result<Self, SyncError> {
        let db = Database::new(path)?;
        let contact_db = Self { db };
        contact_db.init_schema()?;
        Ok(contact_db)
    }

    pub fn in_memory() -> Result<Self, SyncError> {
        let contact_db = Self {
            db: Database::in_memory()?,
        };
        contact_db.init_schema()?;
        Ok(contact_db)
    }

    fn init_schema(&self) -> Result<(), SyncError> {
        self.db.with_connection(|conn| {
            // No uniqueness on phone_number: duplicates are resolved when merging.
            conn.execute(
                "CREATE TABLE IF NOT EXISTS contacts (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    phone_number TEXT NOT NULL
                )",
                [],
            )?;
            Ok(())
        })
    }

    /// Get contact count
    pub fn count(&self) -> Result<usize, SyncError> {
        self.db.with_connection(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM contacts", [], |row| row.get(0))?;
            Ok(count as usize)
        })
    }
}

impl LocalStore for ContactDatabase {
    fn insert(&self, contact: &Contact) -> Result<(), SyncError> {
        self.db.with_connection(|conn| {
            conn.execute(
                "INSERT INTO contacts (name, phone_number) VALUES (?1, ?2)",
                params![contact.name, contact.phone_number],
            )?;
            Ok(())
        })?;
        log::debug!("Cached contact {} locally", contact.phone_number);
        Ok(())
    }

    fn list_all(&self) -> Result<Vec<Contact>, SyncError> {
        self.db.with_connection(|conn| {
            let mut stmt =
                conn.prepare("SELECT name, phone_number FROM contacts ORDER BY id ASC")?;
            let contacts = stmt
                .query_map([], |row| {
                    Ok(Contact {
                        name: row.get(0)?,
                        phone_number: row.get(1)?,
                    })
                })?
                .collect::<SqlResult<Vec<_>>>()?;
            Ok(contacts)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_all_preserves_insertion_order() {
        let db = ContactDatabase::in_memory().unwrap();
        db.insert(&Contact::new("Bob", "+1 555-0101")).unwrap();
        db.insert(&Contact::new("Alice", "+1 555-0100")).unwrap();

        let contacts = db.list_all().unwrap();
        assert_eq!(
            contacts,
            vec![
                Contact::new("Bob", "+1 555-0101"),
                Contact::new("Alice", "+1 555-0100"),
            ]
        );
    }

    #[test]
    fn duplicate_phone_numbers_are_both_stored() {
        let db = ContactDatabase::in_memory().unwrap();
        db.insert(&Contact::new("Alice", "+1 555-0100")).unwrap();
        db.insert(&Contact::new("Alicia", "+1 555-0100")).unwrap();
        assert_eq!(db.count().unwrap(), 2);
    }

    #[test]
    fn contacts_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/contacts.db");
        {
            let db = ContactDatabase::with_path(&path).unwrap();
            db.insert(&Contact::new("Alice", "+1 555-0100")).unwrap();
        }
        let db = ContactDatabase::with_path(&path).unwrap();
        assert_eq!(db.list_all().unwrap(), vec![Contact::new("Alice", "+1 555-0100")]);
    }

    #[test]
    fn unopenable_path_is_a_storage_failure() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened as a database file.
        let err = ContactDatabase::with_path(dir.path()).err().unwrap();
        assert!(matches!(err, SyncError::LocalStorage(_)));
    }
}
