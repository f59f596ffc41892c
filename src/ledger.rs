// Registry Ledger - contribution bookkeeping for gift items
//
// Invariant for every item written through the ledger:
//   contributed == sum(contributions[*].amount)  and  contributed <= total
//
// contribute() enforces the ceiling with a conditional UPDATE so that the
// read-check-write happens inside SQLite, never as two round-trips.

use crate::db::{self, Store};
use crate::error::{LedgerError, LedgerResult};
use crate::models::{derive_item_id, BulkLoadSummary, Contribution, GiftItem};
use crate::parser::{RegistryListRow, RegistryRow};
use crate::seed;
use chrono::Utc;
use rusqlite::{params, TransactionBehavior};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct Ledger {
    store: Store,
}

impl Ledger {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    #[cfg(test)]
    pub(crate) fn store(&self) -> &Store {
        &self.store
    }

    /// All items in insertion order, contributions in append order
    pub fn list_items(&self) -> LedgerResult<Vec<GiftItem>> {
        let conn = self.store.lock()?;
        db::get_all_items(&conn)
    }

    pub fn get_item(&self, item_id: &str) -> LedgerResult<GiftItem> {
        let conn = self.store.lock()?;
        db::get_item(&conn, item_id)?.ok_or_else(LedgerError::item_not_found)
    }

    /// Create a single unfunded item under a caller-supplied id
    pub fn create_item(&self, id: &str, name: &str, link: &str, total: f64) -> LedgerResult<GiftItem> {
        if !total.is_finite() || total < 0.0 {
            return Err(LedgerError::InvalidOperation(
                "Item total must be a non-negative number".to_string(),
            ));
        }

        let conn = self.store.lock()?;
        if db::item_exists(&conn, id)? {
            return Err(LedgerError::InvalidOperation(format!(
                "Item '{}' already exists",
                id
            )));
        }

        let item = GiftItem::new(id, name, link, total);
        db::insert_item(&conn, &item)?;
        tracing::info!(item_id = %id, total, "registry item created");

        Ok(item)
    }

    /// Record a contribution and return the item's new contributed total
    ///
    /// Reaching the total exactly is allowed; going past it is rejected
    /// without touching the item.
    pub fn contribute(&self, item_id: &str, contributor_name: &str, amount: f64) -> LedgerResult<f64> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(LedgerError::InvalidOperation(
                "Contribution amount must be positive".to_string(),
            ));
        }

        let mut conn = self.store.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let updated = tx.execute(
            "UPDATE registry_items
             SET contributed = contributed + ?1
             WHERE id = ?2 AND contributed + ?1 <= total",
            params![amount, item_id],
        )?;

        if updated == 0 {
            // Nothing written; the transaction rolls back on drop
            if db::item_exists(&tx, item_id)? {
                tracing::warn!(item_id, amount, "contribution rejected: exceeds total");
                return Err(LedgerError::InvalidOperation(
                    "Contribution exceeds item total".to_string(),
                ));
            }
            return Err(LedgerError::item_not_found());
        }

        db::append_contribution(&tx, item_id, &Contribution::new(contributor_name, amount))?;
        let new_total = db::get_contributed(&tx, item_id)?.ok_or_else(LedgerError::item_not_found)?;
        tx.commit()?;

        tracing::info!(item_id, amount, new_total, "contribution recorded");
        Ok(new_total)
    }

    /// Remove the contribution at `index` and return it
    ///
    /// Later contributions shift down by one. `contributed` drops by the
    /// removed amount, clamped at zero.
    pub fn delete_contribution(&self, item_id: &str, index: usize) -> LedgerResult<Contribution> {
        let mut conn = self.store.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if !db::item_exists(&tx, item_id)? {
            return Err(LedgerError::item_not_found());
        }

        let offset = i64::try_from(index).map_err(|_| LedgerError::contribution_not_found())?;
        let (seq, removed) = db::contribution_at(&tx, item_id, offset)?
            .ok_or_else(LedgerError::contribution_not_found)?;

        db::delete_contribution_row(&tx, seq)?;
        tx.execute(
            "UPDATE registry_items SET contributed = MAX(0.0, contributed - ?1) WHERE id = ?2",
            params![removed.amount, item_id],
        )?;
        tx.commit()?;

        tracing::info!(item_id, index, amount = removed.amount, "contribution deleted");
        Ok(removed)
    }

    /// Replace the whole registry with items and contributions built from CSV rows
    pub fn bulk_load_with_contributions(&self, rows: &[RegistryRow]) -> LedgerResult<BulkLoadSummary> {
        let (items, total_contributions) = build_registry(rows);

        let mut conn = self.store.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let removed = db::clear_registry(&tx)?;
        for item in &items {
            db::insert_item(&tx, item)?;
        }
        tx.commit()?;

        let summary = BulkLoadSummary {
            items_count: items.len(),
            total_contributions,
        };
        tracing::info!(
            removed,
            items_count = summary.items_count,
            total_contributions = summary.total_contributions,
            "registry reloaded with contributions"
        );

        Ok(summary)
    }

    /// Replace the whole registry with unfunded items, one per row
    ///
    /// Rows are not merged: a later row whose derived id repeats an earlier
    /// one overwrites it in place, keeping the first row's position.
    pub fn bulk_load_items_only(&self, rows: &[RegistryListRow]) -> LedgerResult<usize> {
        let mut conn = self.store.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let removed = db::clear_registry(&tx)?;

        let mut applied = 0;
        for row in rows {
            if row.item.is_empty() {
                tracing::warn!("skipping registry row with empty item name");
                continue;
            }
            let item = GiftItem::new(derive_item_id(&row.item), row.item.clone(), row.link.clone(), row.total);
            db::replace_item(&tx, &item)?;
            applied += 1;
        }
        tx.commit()?;

        tracing::info!(removed, items_count = applied, "registry reloaded from item list");
        Ok(applied)
    }

    /// Replace the registry with the built-in default items
    pub fn seed_defaults(&self) -> LedgerResult<usize> {
        let items = seed::default_items();

        let mut conn = self.store.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        db::clear_registry(&tx)?;
        for item in &items {
            db::insert_item(&tx, item)?;
        }
        tx.commit()?;

        tracing::info!(items_count = items.len(), "registry seeded with defaults");
        Ok(items.len())
    }
}

/// Merge CSV rows into items keyed by derived id
///
/// Items appear in first-seen order. The first row for an id fixes its name,
/// link and total. Rows whose contributor is empty or "0" only declare the
/// item; every other row appends a contribution (timestamp defaults to now).
/// Returns the items and the number of contributions applied.
pub fn build_registry(rows: &[RegistryRow]) -> (Vec<GiftItem>, usize) {
    let mut items: Vec<GiftItem> = Vec::new();
    let mut slots: HashMap<String, usize> = HashMap::new();
    let mut applied = 0;

    for row in rows {
        if row.item_name.is_empty() {
            tracing::warn!("skipping registry row with empty item name");
            continue;
        }

        let id = derive_item_id(&row.item_name);
        let slot = *slots.entry(id.clone()).or_insert_with(|| {
            items.push(GiftItem::new(id, row.item_name.clone(), row.link.clone(), row.total));
            items.len() - 1
        });

        if row.is_declaration() {
            continue;
        }

        let timestamp = row.timestamp.unwrap_or_else(Utc::now);
        items[slot].push_contribution(Contribution::at(row.contributor.clone(), row.amount, timestamp));
        applied += 1;
    }

    for item in items.iter().filter(|item| item.contributed > item.total) {
        tracing::warn!(
            item_id = %item.id,
            contributed = item.contributed,
            total = item.total,
            "uploaded contributions exceed item total"
        );
    }

    (items, applied)
}
