mod directory;
mod ids;
mod summary;

pub use directory::*;
pub use ids::*;
pub use summary::*;
