pub use errors::*;
pub use response::*;
pub use tier::*;
pub use transport::*;

pub mod errors;
mod response;
mod tier;
mod transport;
