//! Harvest core: pure domain types and state machines, free of IO.
mod counters;
mod field;
mod parse;
mod phone;
mod reference;
mod state;
mod validate;

pub use counters::SessionCounters;
pub use field::{FieldKey, FieldValue, Record, UNKNOWN_NAME};
pub use parse::{collapse_whitespace, find_email, find_phone_candidate, Parse};
pub use phone::{PhoneNormalizer, PhoneSettings};
pub use reference::{ItemReference, ReferenceStore};
pub use state::{EscalationPolicy, EscalationTier, HarvestState, StopReason};
pub use validate::Validity;
