pub mod b_plus_tree;
pub mod btree_page;
pub mod index_iterator;
pub mod key_comparator;

pub use b_plus_tree::BPlusTree;
pub use btree_page::{BTreePageType, NodeMut, NodeRef};
pub use index_iterator::IndexIterator;
pub use key_comparator::{BytewiseComparator, IntegerComparator, KeyComparator, LongComparator};
