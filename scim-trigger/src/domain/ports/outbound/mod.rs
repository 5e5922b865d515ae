mod directory;
#[cfg(test)]
mod mock;

pub use directory::*;
#[cfg(test)]
pub use mock::*;
