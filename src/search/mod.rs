pub mod corpus;
pub mod global;
pub mod index;
pub mod tokenizer;

pub use corpus::{load_corpus, read_corpus};
pub use global::{foundation_foods, foundation_foods_index, load_foundation_foods};
pub use index::{boost_leading_segment, build_index, Posting, SearchIndex};
