//! Process-wide foundation foods corpus.
//!
//! The index is built at most once per process, on the first successful call
//! to [`load_foundation_foods`], and never rebuilt. Queries issued before that
//! return no results.

use anyhow::{anyhow, Result};
use std::path::Path;
use std::sync::{Mutex, OnceLock};
use tracing::info;

use crate::aggregate::FoodProfile;
use crate::search::corpus::load_corpus;
use crate::search::index::{build_index, SearchIndex};

static CORPUS: OnceLock<SearchIndex> = OnceLock::new();
static INIT: Mutex<()> = Mutex::new(());

/// Loads and indexes the corpus at `path`, or returns the already built one.
///
/// Concurrent first callers serialize on an init lock, so the corpus is read
/// once and no caller sees a partially built index. A failed load leaves the
/// corpus unset and a later call may retry. Once set, `path` is ignored.
pub fn load_foundation_foods(path: &Path) -> Result<&'static SearchIndex> {
    if let Some(index) = CORPUS.get() {
        return Ok(index);
    }
    let _guard = INIT
        .lock()
        .map_err(|_| anyhow!("Foundation foods initialization lock poisoned"))?;
    if let Some(index) = CORPUS.get() {
        return Ok(index);
    }

    let index = build_index(load_corpus(path)?);
    info!(records = index.len(), "foundation foods index ready");
    Ok(CORPUS.get_or_init(|| index))
}

/// The corpus, if it has been loaded.
pub fn foundation_foods_index() -> Option<&'static SearchIndex> {
    CORPUS.get()
}

/// Foods best matching a code/name/category query.
///
/// ```no_run
/// use foundation_foods::search::{foundation_foods, load_foundation_foods};
/// # fn main() -> anyhow::Result<()> {
/// load_foundation_foods(std::path::Path::new("index.csv"))?;
/// for food in foundation_foods("raw kale") {
///     println!("{} {}", food.code, food.name);
/// }
/// # Ok(())
/// # }
/// ```
pub fn foundation_foods(query: &str) -> Vec<&'static FoodProfile> {
    CORPUS.get().map(|index| index.search(query)).unwrap_or_default()
}
