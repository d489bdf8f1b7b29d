pub mod catalog;
pub mod resolved;
pub mod resolver;
pub mod types;
pub mod validator;

pub use catalog::*;
pub use resolved::*;
pub use resolver::*;
pub use types::*;
pub use validator::*;
