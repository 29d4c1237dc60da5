pub mod codec;
pub mod error;
pub mod frame;
pub mod session;
pub mod wire;

pub use error::{Diagnostic, Error as S7PlusError, Result as S7PlusResult};
