//! Framework adapters.
//!
//! Each supported test framework implements [`TestAdapter`]; the
//! [`AdapterRegistry`] picks the one that owns a project root.

mod error;
pub mod jest;
pub mod phpunit;
pub mod process;
mod registry;
pub mod scan;
mod traits;

pub use error::AdapterError;
pub use jest::JestAdapter;
pub use phpunit::PhpUnitAdapter;
pub use registry::AdapterRegistry;
pub use traits::TestAdapter;
