mod comment;
mod engagement;
mod profile;
mod story;

pub use comment::*;
pub use engagement::*;
pub use profile::*;
pub use story::*;
