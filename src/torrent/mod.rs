pub use info_hash::*;
pub use metainfo::*;
pub use peer_id::*;

mod info_hash;
mod metainfo;
mod peer_id;
