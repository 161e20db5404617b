//! Directory model: users pulled from sources and the match criteria of
//! configured mappings.
//!
//! A [`User`] satisfies a [`MappingSet`] when it holds *any* of the set's
//! groups or roles (see [`mapping::is_satisfied`]).

pub mod mapping;
pub mod user;

pub use mapping::{is_satisfied, MappingSet};
pub use user::User;
