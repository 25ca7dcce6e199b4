//! Contains the `Function` trait and the `Native` wrapper that makes host
//! code callable from templates.
//!
//! A function is any type which implements the [`Function`] trait. Wrap it in
//! a [`Native`] with a name and a [`Signature`], and register it with an
//! [`Engine`][`crate::Engine`] via
//! [`add_function`][`crate::Engine::add_function()`]. It is then available to
//! every template rendered by that engine, and receives its arguments bound
//! by the same rules that apply to template calls.
//!
//! # Examples
//!
//! Functions may be plain closures taking the [`Bound`] arguments:
//!
//! ```
//! use ul4::{Arguments, Bound, Engine, Error, Signature, Value};
//!
//! fn shout(arguments: &Bound) -> Result<Value, Error> {
//!     let text = arguments.value("text");
//!     match text.as_str() {
//!         Some(text) => Ok(Value::from(format!("{}!", text.to_uppercase()))),
//!         None => Err(Error::build("`shout` requires a string")),
//!     }
//! }
//!
//! let engine = Engine::default()
//!     .with_function_must("shout", Signature::new().with_parameter("text"), shout);
//! let template = engine.compile("<?print shout('hey')?>").unwrap();
//!
//! assert_eq!(engine.renders(&template, Arguments::new()).unwrap(), "HEY!");
//! ```
use crate::{
    log::Error,
    render::{Arguments, Bound, Signature},
    value::Value,
};
use std::fmt::{Debug, Formatter, Result as FmtResult};

/// Describes a type which can be called from a template.
pub trait Function: Send + Sync {
    /// Execute the function with the bound arguments.
    ///
    /// # Errors
    ///
    /// The returned [`Error`] is reported at the location of the call.
    fn call(&self, arguments: &Bound) -> Result<Value, Error>;
}

impl<F> Function for F
where
    F: Fn(&Bound) -> Result<Value, Error> + Send + Sync,
{
    fn call(&self, arguments: &Bound) -> Result<Value, Error> {
        self(arguments)
    }
}

/// A named [`Function`] with its [`Signature`].
pub struct Native {
    name: String,
    signature: Signature,
    function: Box<dyn Function>,
}

impl Native {
    /// Create a new [`Native`] function.
    pub fn new<T, F>(name: T, signature: Signature, function: F) -> Self
    where
        T: Into<String>,
        F: Function + 'static,
    {
        Self {
            name: name.into(),
            signature,
            function: Box::new(function),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Bind the arguments and call the function.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the arguments do not match the signature, or
    /// the function fails.
    pub fn call(&self, arguments: Arguments) -> Result<Value, Error> {
        let bound = self.signature.bind(&self.name, arguments)?;

        self.function.call(&bound)
    }
}

impl Debug for Native {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "Native({}{})", self.name, self.signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::ErrorKind;

    fn double(arguments: &Bound) -> Result<Value, Error> {
        match arguments.value("x") {
            Value::Int(int) => Ok(Value::Int(int * 2)),
            _ => Err(Error::build("not an int")),
        }
    }

    #[test]
    fn test_native_call() {
        let native = Native::new("double", Signature::new().with_parameter("x"), double);

        assert_eq!(native.name(), "double");
        assert_eq!(native.call(Arguments::new().arg(21)).unwrap(), Value::Int(42));
    }

    #[test]
    fn test_native_binding_error() {
        let native = Native::new("double", Signature::new().with_parameter("x"), double);
        let error = native.call(Arguments::new()).unwrap_err();

        assert_eq!(error.kind(), ErrorKind::MissingArgument);
    }

    #[test]
    fn test_native_closure() {
        let offset = 10;
        let native = Native::new(
            "offset",
            Signature::new().with_default("x", 0),
            move |arguments: &Bound| -> Result<Value, Error> {
                Ok(Value::Int(arguments.value("x").as_int().unwrap_or(0) + offset))
            },
        );

        assert_eq!(native.call(Arguments::new()).unwrap(), Value::Int(10));
    }
}
