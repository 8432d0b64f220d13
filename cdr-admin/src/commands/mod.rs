pub mod audio;
pub mod biblio;
pub mod docs;
pub mod filters;
pub mod jobs;
pub mod nomap;
pub mod worker;

use anyhow::Result;
use serde::Serialize;

/// Prints `value` as pretty JSON, or through `text` otherwise.
pub fn emit<T, F>(value: &T, json: bool, text: F) -> Result<()>
where
    T: Serialize + ?Sized,
    F: FnOnce(&T),
{
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        text(value);
    }
    Ok(())
}
