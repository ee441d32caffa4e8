mod editor;
mod error;
mod plugin;
mod policy;
mod range;
mod scrub;
mod session;
mod tag;
mod toggle;
mod tree;
mod value;

pub use crate::editor::*;
pub use crate::error::*;
pub use crate::plugin::*;
pub use crate::policy::*;
pub use crate::range::*;
pub use crate::scrub::*;
pub use crate::session::*;
pub use crate::tag::*;
pub use crate::toggle::*;
pub use crate::tree::*;
pub use crate::value::*;
