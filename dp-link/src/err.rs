pub use dp_if::err::AuxError;
pub use dp_if::host::DpError;

pub type Result<T = ()> = core::result::Result<T, DpError>;
