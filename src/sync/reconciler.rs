use std::collections::HashSet;
use std::sync::Arc;

use super::{Pending, run_blocking, settle};
use crate::common::Contact;
use crate::error::SyncError;
use crate::remote::RemoteContacts;
use crate::storage::LocalStore;

/// Where a contact screen visit stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPhase {
    Idle,
    /// Local contacts are loaded, the remote fetch is in flight.
    Fetching,
    /// The remote fetch resolved (successfully or not).
    Merged,
}

/// `local ++ remote`, keeping the first contact seen for each phone number.
/// Local entries therefore win over remote ones.
pub fn merged_view(local: &[Contact], remote: &[Contact]) -> Vec<Contact> {
    let mut seen = HashSet::new();
    local
        .iter()
        .chain(remote)
        .filter(|contact| seen.insert(contact.phone_number.as_str()))
        .cloned()
        .collect()
}

/// Keeps the local cache and the remote collection in one deduplicated list.
///
/// Writes go to both stores without atomicity: when the remote push fails
/// the contact stays visible locally and is missing remotely until some
/// client pushes it again.
pub struct Reconciler {
    local: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteContacts>,
    local_contacts: Vec<Contact>,
    remote_contacts: Vec<Contact>,
    phase: LoadPhase,
    /// Bumped by every `load_contacts`; only the latest fetch may land.
    generation: u64,
}

impl Reconciler {
    pub fn new(local: Arc<dyn LocalStore>, remote: Arc<dyn RemoteContacts>) -> Self {
        Self {
            local,
            remote,
            local_contacts: Vec::new(),
            remote_contacts: Vec::new(),
            phase: LoadPhase::Idle,
            generation: 0,
        }
    }

    pub fn phase(&self) -> LoadPhase {
        self.phase
    }

    /// The display list for the current state.
    pub fn merged(&self) -> Vec<Contact> {
        merged_view(&self.local_contacts, &self.remote_contacts)
    }

    /// Read the local cache and start the remote fetch in the background.
    ///
    /// `merged()` reflects the local contacts as soon as this returns; pass
    /// the fetch result to `apply_remote` along with the returned generation
    /// once it resolves.
    pub async fn load_contacts(&mut self) -> Result<(u64, Pending<Vec<Contact>>), SyncError> {
        let local = Arc::clone(&self.local);
        self.local_contacts = run_blocking(move || local.list_all()).await?;
        self.phase = LoadPhase::Fetching;
        self.generation += 1;
        log::debug!(
            "Loaded {} cached contacts (load {})",
            self.local_contacts.len(),
            self.generation
        );

        let remote = Arc::clone(&self.remote);
        let fetch = tokio::spawn(async move { remote.fetch_all_once().await });
        Ok((self.generation, fetch))
    }

    /// Whether `generation` belongs to the most recent `load_contacts`.
    pub fn is_current(&self, generation: u64) -> bool {
        generation == self.generation
    }

    /// Fold in the remote fetch result. On failure the previously known
    /// remote contacts stay in place and the error is returned for the user.
    ///
    /// Results of a superseded load are dropped, whatever order the fetches
    /// finish in.
    pub fn apply_remote(
        &mut self,
        generation: u64,
        result: Result<Vec<Contact>, SyncError>,
    ) -> Result<(), SyncError> {
        if !self.is_current(generation) {
            log::debug!("Dropping contacts of superseded load {generation}");
            return Ok(());
        }
        self.phase = LoadPhase::Merged;
        let contacts = result?;
        self.remote_contacts = contacts;
        Ok(())
    }

    /// `load_contacts` followed by waiting for the fetch.
    pub async fn load_and_merge(&mut self) -> Result<Vec<Contact>, SyncError> {
        let (generation, fetch) = self.load_contacts().await?;
        let result = settle(fetch, SyncError::RemoteFetch).await;
        self.apply_remote(generation, result)?;
        Ok(self.merged())
    }

    /// Save a new contact locally, show it right away and push it to the
    /// remote collection in the background.
    ///
    /// Blank fields fail validation before any write.
    pub async fn add_contact(
        &mut self,
        name: &str,
        phone_number: &str,
    ) -> Result<(Contact, Pending<()>), SyncError> {
        let (name, phone_number) = (name.trim(), phone_number.trim());
        if name.is_empty() || phone_number.is_empty() {
            return Err(SyncError::Validation("Please fill in both fields.".to_string()));
        }
        let contact = Contact::new(name, phone_number);

        let local = Arc::clone(&self.local);
        let row = contact.clone();
        run_blocking(move || local.insert(&row)).await?;
        self.local_contacts.push(contact.clone());

        let remote = Arc::clone(&self.remote);
        let pushed = contact.clone();
        let push = tokio::spawn(async move {
            let result = remote.push(&pushed).await;
            match &result {
                Ok(()) => log::debug!("Contact {} added to remote", pushed.phone_number),
                Err(err) => log::error!("Error adding contact {}: {err}", pushed.phone_number),
            }
            result
        });
        Ok((contact, push))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryBackend;
    use crate::storage::ContactDatabase;

    fn alice() -> Contact {
        Contact::new("Alice", "+1 555-0100")
    }

    fn reconciler() -> (Reconciler, Arc<ContactDatabase>, MemoryBackend) {
        let db = Arc::new(ContactDatabase::in_memory().unwrap());
        let backend = MemoryBackend::new();
        let reconciler = Reconciler::new(db.clone(), Arc::new(backend.clone()));
        (reconciler, db, backend)
    }

    #[test]
    fn merged_view_keeps_one_entry_per_number_and_local_name_wins() {
        let local = vec![alice(), Contact::new("Bob", "+1 555-0101")];
        let remote = vec![
            Contact::new("Alice Remote", "+1 555-0100"),
            Contact::new("Carol", "+1 555-0102"),
            Contact::new("Carol Again", "+1 555-0102"),
        ];

        let merged = merged_view(&local, &remote);
        assert_eq!(
            merged,
            vec![
                alice(),
                Contact::new("Bob", "+1 555-0101"),
                Contact::new("Carol", "+1 555-0102"),
            ]
        );
    }

    #[test]
    fn merged_view_is_idempotent() {
        let local = vec![alice(), Contact::new("Dup", "+1 555-0100")];
        let remote = vec![Contact::new("Eve", "+44 20 0000")];
        let merged = merged_view(&local, &remote);
        assert_eq!(merged_view(&merged, &[]), merged);
    }

    #[test]
    fn duplicate_local_numbers_keep_first_inserted() {
        let local = vec![alice(), Contact::new("Alicia", "+1 555-0100")];
        assert_eq!(merged_view(&local, &[]), vec![alice()]);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        /// Few numbers and short names, so lists collide on phone number often.
        fn contact() -> impl Strategy<Value = Contact> {
            let numbers = vec!["+1 555-0100", "+1 555-0101", "+1 555-0102", "+44 20 7946 0000"];
            ("[A-D][a-z]{0,2}", prop::sample::select(numbers))
                .prop_map(|(name, phone_number)| Contact::new(name, phone_number))
        }

        fn contacts() -> impl Strategy<Value = Vec<Contact>> {
            prop::collection::vec(contact(), 0..8)
        }

        proptest! {
            #[test]
            fn every_number_listed_exactly_once(local in contacts(), remote in contacts()) {
                let merged = merged_view(&local, &remote);
                let listed: HashSet<&str> =
                    merged.iter().map(|c| c.phone_number.as_str()).collect();
                let known: HashSet<&str> = local
                    .iter()
                    .chain(&remote)
                    .map(|c| c.phone_number.as_str())
                    .collect();
                prop_assert_eq!(listed.len(), merged.len());
                prop_assert_eq!(listed, known);
            }

            #[test]
            fn earliest_entry_wins_local_before_remote(local in contacts(), remote in contacts()) {
                let merged = merged_view(&local, &remote);
                for entry in &merged {
                    let earliest = local
                        .iter()
                        .chain(&remote)
                        .find(|c| c.phone_number == entry.phone_number);
                    prop_assert_eq!(Some(entry), earliest);
                }
            }

            #[test]
            fn merging_again_changes_nothing(local in contacts(), remote in contacts()) {
                let merged = merged_view(&local, &remote);
                prop_assert_eq!(&merged_view(&merged, &[]), &merged);
                prop_assert_eq!(&merged_view(&merged, &remote), &merged);
            }
        }
    }

    #[tokio::test]
    async fn added_contact_is_visible_before_remote_round_trip() {
        let (mut reconciler, _db, _backend) = reconciler();
        let (contact, _push) = reconciler.add_contact("Alice", "+1 555-0100").await.unwrap();
        assert_eq!(contact, alice());

        let _fetch = reconciler.load_contacts().await.unwrap();
        assert_eq!(reconciler.phase(), LoadPhase::Fetching);
        let matching: Vec<_> = reconciler
            .merged()
            .into_iter()
            .filter(|c| c.phone_number == "+1 555-0100")
            .collect();
        assert_eq!(matching, vec![alice()]);
    }

    #[tokio::test]
    async fn blank_input_writes_nothing() {
        let (mut reconciler, db, backend) = reconciler();
        for (name, phone) in [("", "+1 555-0100"), ("Alice", "   "), (" ", "")] {
            let err = reconciler.add_contact(name, phone).await.unwrap_err();
            assert!(err.is_validation());
        }
        assert_eq!(db.count().unwrap(), 0);
        assert!(backend.stored_contacts().is_empty());
        assert!(reconciler.merged().is_empty());
    }

    #[tokio::test]
    async fn add_contact_fans_out_to_both_stores() {
        let (mut reconciler, db, backend) = reconciler();
        let (_, push) = reconciler.add_contact(" Alice ", "+1 555-0100").await.unwrap();
        settle(push, SyncError::RemoteWrite).await.unwrap();

        assert_eq!(db.list_all().unwrap(), vec![alice()]);
        assert_eq!(backend.stored_contacts(), vec![alice()]);
    }

    #[tokio::test]
    async fn failed_push_keeps_local_contact() {
        let (mut reconciler, db, backend) = reconciler();
        backend.set_fail_writes(true);

        let (_, push) = reconciler.add_contact("Alice", "+1 555-0100").await.unwrap();
        let err = settle(push, SyncError::RemoteWrite).await.unwrap_err();
        assert!(matches!(err, SyncError::RemoteWrite(_)));

        assert_eq!(db.count().unwrap(), 1);
        assert_eq!(reconciler.merged(), vec![alice()]);
        assert!(backend.stored_contacts().is_empty());
    }

    #[tokio::test]
    async fn remote_contacts_merge_after_fetch() {
        let (mut reconciler, db, backend) = reconciler();
        db.insert(&alice()).unwrap();
        backend.push(&Contact::new("Alice Remote", "+1 555-0100")).await.unwrap();
        backend.push(&Contact::new("Bob", "+1 555-0101")).await.unwrap();

        let merged = reconciler.load_and_merge().await.unwrap();
        assert_eq!(reconciler.phase(), LoadPhase::Merged);
        assert_eq!(merged, vec![alice(), Contact::new("Bob", "+1 555-0101")]);
    }

    #[tokio::test]
    async fn fetch_of_superseded_load_is_dropped() {
        let (mut reconciler, _db, _backend) = reconciler();
        let (first, _) = reconciler.load_contacts().await.unwrap();
        let (second, _) = reconciler.load_contacts().await.unwrap();
        assert!(!reconciler.is_current(first));

        let bob = Contact::new("Bob", "+1 555-0101");
        reconciler.apply_remote(second, Ok(vec![bob.clone()])).unwrap();
        reconciler.apply_remote(first, Ok(Vec::new())).unwrap();
        assert_eq!(reconciler.merged(), vec![bob]);

        // A late failure of the old load is not reported either.
        reconciler
            .apply_remote(first, Err(SyncError::RemoteFetch("timeout".to_string())))
            .unwrap();
        assert_eq!(reconciler.phase(), LoadPhase::Merged);
    }

    #[tokio::test]
    async fn failed_fetch_keeps_previous_remote_state() {
        let (mut reconciler, _db, backend) = reconciler();
        backend.push(&Contact::new("Bob", "+1 555-0101")).await.unwrap();
        reconciler.load_and_merge().await.unwrap();

        backend.set_fail_fetch(true);
        let err = reconciler.load_and_merge().await.unwrap_err();
        assert!(matches!(err, SyncError::RemoteFetch(_)));
        assert_eq!(reconciler.phase(), LoadPhase::Merged);
        assert_eq!(reconciler.merged(), vec![Contact::new("Bob", "+1 555-0101")]);
    }
}
