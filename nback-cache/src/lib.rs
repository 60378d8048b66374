//! Process-wide interner for on-screen text.
//!
//! The renderer keys its rasterised lines by intern id, so every distinct
//! line of text is laid out once per colour no matter how often it is shown.

use lazy_static::lazy_static;
use std::sync::{PoisonError, RwLock};
pub use string_cache::DefaultAtom as Atom;

lazy_static! {
    static ref TEXT_INTERNER: RwLock<Vec<Atom>> = RwLock::new(Vec::new());
}

/// Intern a string and return its id. Ids are stable for the process lifetime.
pub fn intern_text(s: &str) -> usize {
    let atom = Atom::from(s);
    let mut v = TEXT_INTERNER
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    match v.iter().position(|a| *a == atom) {
        Some(idx) => idx,
        None => {
            v.push(atom);
            v.len() - 1
        }
    }
}

pub fn get_text(id: usize) -> Option<Atom> {
    TEXT_INTERNER
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(id)
        .cloned()
}
