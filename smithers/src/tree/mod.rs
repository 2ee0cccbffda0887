//! Plan tree: the in-memory `Node` type, its content-hash function, and its
//! canonical XML serializer (spec §3, §4.3).
//!
//! The render layer that produces trees lives outside this crate (spec §1,
//! §4 table: "External interfaces"); this module only defines the data model
//! and the two pure functions the engine runs over it every frame.

pub mod hash;
pub mod lint;
pub mod node;
pub mod xml;

pub use hash::{content_hash, ContentHash};
pub use lint::attach_nesting_warnings;
pub use node::{
    Node, NodeKey, PropValue, EXECUTABLE_TYPES, KNOWN_TYPES, RESERVED_PROP_NAMES, ROOT,
    SMITHERS_STOP, STOP_ALIAS, TEXT,
};
pub use xml::{parse_plan_xml, to_canonical_xml};
