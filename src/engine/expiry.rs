//! Expiry guard.

use chrono::{DateTime, Utc};

use crate::envelope::Envelope;

/// True iff the envelope carries an expiry date strictly before `now`.
///
/// An envelope expiring exactly at `now` is still processed.
pub fn is_expired(envelope: &Envelope, now: DateTime<Utc>) -> bool {
    envelope.expiry_date.is_some_and(|expiry| expiry < now)
}
