//! UL4 - Template Engine
//!
//! Templates are compiled once into an immutable [`Template`], and rendered
//! against [`Arguments`] as many times as needed. Values, including
//! templates, can be exchanged with other implementations through the
//! [`ul4on`] format.
//!
//! ```
//! use ul4::{compile, Arguments};
//!
//! let template = compile("<?for n in range(3)?><?print n?><?end for?>").unwrap();
//! assert_eq!(template.renders(Arguments::new()).unwrap(), "012");
//! ```
mod builtin;
mod compile;
mod engine;
mod format;
mod function;
mod log;
mod pipe;
mod region;
mod render;
mod store;
mod value;

pub mod ul4on;

pub use compile::{compile, token, tree, Builder, Marker, Template, Whitespace};
pub use engine::Engine;
pub use function::{Function, Native};
pub use log::{Diagnostic, Error, ErrorKind, Policy, Severity};
pub use region::{Location, Region};
pub use render::{compare, Argument, Arguments, Bound, Closure, Parameter, Scope, Signature};
pub use store::Store;
pub use ul4on::{Decoder, Encoder, Persistent, Registry};
pub use value::{AttributeProvider, Color, Dict, List, Method, Set, Shared, Value};
