//! Reconciliation ("lettering") engine
//!
//! A link groups a set of entries marking them as mutually settled. Links
//! have no data of their own; their display letter is the base-26 encoding
//! of the link's creation rank among the links of the same fiscal year.

use std::collections::BTreeSet;
use tracing::debug;

use crate::traits::LedgerStorage;
use crate::types::*;

const LETTERS: &[u8; 26] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Base-26 letter sequence for a zero-based rank: A..Z, AA..AZ, BA..
pub fn letter_for_rank(rank: usize) -> String {
    let mut rank = rank;
    let mut result = String::new();
    while rank >= 26 {
        let (div, rem) = (rank / 26, rank % 26);
        result.insert(0, LETTERS[rem] as char);
        rank = div - 1;
    }
    result.insert(0, LETTERS[rank] as char);
    result
}

/// Releases the link of an entry, clearing it on every peer and deleting
/// the link row. Entries of a finished year are immutable: the call is a
/// silent no-op for them.
pub(crate) async fn unlink_entry<S: LedgerStorage>(
    storage: &mut S,
    entry: EntryId,
) -> LedgerResult<()> {
    let entry = storage
        .get_entry(entry)
        .await?
        .ok_or(LedgerError::EntryNotFound(entry))?;
    let Some(link) = entry.link else {
        return Ok(());
    };
    let year = storage
        .get_year(entry.year)
        .await?
        .ok_or(LedgerError::NoCurrentFiscalYear)?;
    if year.status == YearStatus::Finished {
        return Ok(());
    }
    for mut peer in storage.entries_of_link(link).await? {
        peer.link = None;
        storage.update_entry(&peer).await?;
    }
    storage.delete_link(link).await?;
    debug!(link, "link released");
    Ok(())
}

/// Groups the given entries under one fresh link, releasing whatever links
/// they carried before.
pub(crate) async fn create_link<S: LedgerStorage>(
    storage: &mut S,
    entries: &[EntryId],
) -> LedgerResult<AccountLink> {
    let mut unique = Vec::new();
    for &id in entries {
        if !unique.contains(&id) {
            unique.push(id);
        }
    }
    if unique.len() < 2 {
        return Err(LedgerError::Validation(
            "a link requires at least two entries".to_string(),
        ));
    }
    for &id in &unique {
        unlink_entry(storage, id).await?;
    }
    let link = storage.insert_link().await?;
    for &id in &unique {
        let mut entry = storage
            .get_entry(id)
            .await?
            .ok_or(LedgerError::EntryNotFound(id))?;
        entry.link = Some(link.id);
        storage.update_entry(&entry).await?;
    }
    debug!(link = link.id, entries = unique.len(), "link created");
    Ok(link)
}

/// Manager for the reconciliation engine
pub struct LinkManager<S: LedgerStorage> {
    storage: S,
}

impl<S: LedgerStorage> LinkManager<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Groups `entries` (at least two) under a new link; any link an entry
    /// previously carried is released first.
    pub async fn create_link(&mut self, entries: &[EntryId]) -> LedgerResult<AccountLink> {
        create_link(&mut self.storage, entries).await
    }

    /// Releases the link carried by `entry`, if any. Entries of a finished
    /// year can never be unlinked.
    pub async fn unlink(&mut self, entry: EntryId) -> LedgerResult<()> {
        unlink_entry(&mut self.storage, entry).await
    }

    /// Deterministic letter label of a link: base-26 encoding of its rank
    /// among all links touching the same fiscal year, ordered by link id.
    pub async fn letter_of(&self, link: LinkId) -> LedgerResult<String> {
        let entries = self.storage.entries_of_link(link).await?;
        let first = entries.first().ok_or_else(|| {
            LedgerError::InvalidState("link has no entries".to_string())
        })?;
        let in_year = self
            .storage
            .list_entries(&EntryFilter {
                year: Some(first.year),
                linked: Some(true),
                ..EntryFilter::default()
            })
            .await?;
        let year_links: BTreeSet<LinkId> = in_year.iter().filter_map(|entry| entry.link).collect();
        let rank = year_links.iter().filter(|&&id| id < link).count();
        Ok(letter_for_rank(rank))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letter_sequence() {
        assert_eq!(letter_for_rank(0), "A");
        assert_eq!(letter_for_rank(1), "B");
        assert_eq!(letter_for_rank(25), "Z");
        assert_eq!(letter_for_rank(26), "AA");
        assert_eq!(letter_for_rank(27), "AB");
        assert_eq!(letter_for_rank(51), "AZ");
        assert_eq!(letter_for_rank(52), "BA");
        assert_eq!(letter_for_rank(701), "ZZ");
        assert_eq!(letter_for_rank(702), "AAA");
    }

    #[test]
    fn test_letters_strictly_increase() {
        let mut previous = letter_for_rank(0);
        for rank in 1..200 {
            let current = letter_for_rank(rank);
            // base-26 ordering: shorter strings sort first, then lexicographic
            let ordered = (previous.len(), previous.clone()) < (current.len(), current.clone());
            assert!(ordered, "{previous} !< {current}");
            previous = current;
        }
    }
}
