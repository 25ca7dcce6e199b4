use crate::{
    compile::Template,
    render::{Scope, Signature},
};
use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    sync::Arc,
};

/// A [`Template`] bound to the scope it was defined in.
///
/// Calling a closure runs the template in a new frame whose parent is the
/// captured scope, so the body sees the current state of the variables
/// around its definition.
pub struct Closure {
    template: Arc<Template>,
    signature: Option<Arc<Signature>>,
    scope: Option<Scope>,
}

impl Closure {
    /// Create a new [`Closure`].
    ///
    /// A closure without a scope only sees its arguments and the globals.
    pub fn new(
        template: Arc<Template>,
        signature: Option<Arc<Signature>>,
        scope: Option<Scope>,
    ) -> Self {
        Self {
            template,
            signature,
            scope,
        }
    }

    /// Wrap a top level template, using the signature evaluated when it was
    /// compiled.
    pub fn from_template(template: Arc<Template>) -> Self {
        let signature = template.bound.clone();

        Self::new(template, signature, None)
    }

    pub fn template(&self) -> &Arc<Template> {
        &self.template
    }

    pub fn signature(&self) -> Option<&Arc<Signature>> {
        self.signature.as_ref()
    }

    pub fn scope(&self) -> Option<&Scope> {
        self.scope.as_ref()
    }
}

impl Debug for Closure {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Closure")
            .field("name", &self.template.name())
            .field("signature", &self.signature)
            .field("scope", &self.scope)
            .finish()
    }
}
