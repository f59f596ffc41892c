// RSVP book: guests' attendance replies

use crate::db::{self, Store};
use crate::error::LedgerResult;
use crate::models::{Rsvp, RsvpCreate};

/// Store a new RSVP with a generated id and the current time
pub fn create_rsvp(store: &Store, input: RsvpCreate) -> LedgerResult<Rsvp> {
    let rsvp = Rsvp::from(input);

    let conn = store.lock()?;
    db::insert_rsvp(&conn, &rsvp)?;
    tracing::info!(rsvp_id = %rsvp.id, pax = rsvp.pax, "rsvp recorded");

    Ok(rsvp)
}

/// Every RSVP in the order it was received
pub fn list_rsvps(store: &Store) -> LedgerResult<Vec<Rsvp>> {
    let conn = store.lock()?;
    db::get_all_rsvps(&conn)
}
