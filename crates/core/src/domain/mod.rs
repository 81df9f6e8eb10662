//! Record shapes held by the hosted backend.
//!
//! Every collection has a `New*` insert shape and a stored shape carrying the
//! generated id and creation timestamp.

pub mod application;
pub mod conversation;
pub mod lead;
pub mod property;
pub mod report;
pub mod upload;

use serde::{Deserialize, Deserializer};

pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
