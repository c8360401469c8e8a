//! Live chat semantics: the wire event vocabulary, presence relays and
//! message fan-out.

pub mod events;
pub mod fanout;
pub mod presence;
