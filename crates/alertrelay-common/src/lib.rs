//! Shared data carriers for the alert dispatcher.
//!
//! A [`types::Notice`] is the decoded form of one alert occurrence as handed
//! to the dispatcher: the event itself, its recipient users, and any
//! pre-rendered templates. The raw JSON document is kept alongside so it can
//! be persisted verbatim for audit.

pub mod error;
pub mod types;
