mod error;
mod message;
mod policy;
mod visual;

pub use error::*;
pub use message::*;
pub use policy::{Diagnostic, Policy, Severity};
pub use visual::{Pointer, Visual};

const RED: &str = "\x1B[31m";
const YELLOW: &str = "\x1b[33m";
const RESET: &str = "\x1B[0m";
