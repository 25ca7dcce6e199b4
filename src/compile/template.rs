use crate::{
    compile::{
        tree::{Node, SignatureTree},
        Whitespace,
    },
    engine::Engine,
    log::{Diagnostic, Error},
    region::{Location, Region},
    render::{Arguments, Signature},
    value::Value,
    Store,
};
use std::{fmt::Write, sync::Arc};

/// A compiled template.
///
/// A `Template` is immutable once compiled, and may be shared between
/// threads. Templates defined with `<?def?>` inside another template are
/// `Template` instances as well, sharing the source of their parent.
#[derive(Debug, Clone)]
pub struct Template {
    pub(crate) name: Option<Arc<str>>,
    /// The complete source this template was compiled from.
    pub(crate) source: Arc<str>,
    /// The part of the source holding the content of this template.
    pub(crate) region: Region,
    pub(crate) whitespace: Whitespace,
    pub(crate) doc: Option<String>,
    pub(crate) signature: Option<SignatureTree>,
    /// The signature with its defaults evaluated, set for templates declared
    /// with `<?ul4?>`.
    pub(crate) bound: Option<Arc<Signature>>,
    pub(crate) content: Vec<Node>,
    pub(crate) delimiters: (String, String),
    pub(crate) diagnostics: Vec<Diagnostic>,
}

impl Template {
    /// Compile a new [`Template`] with the shared [`Engine`].
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] when the source contains invalid syntax.
    ///
    /// # Examples
    ///
    /// ```
    /// use ul4::Template;
    ///
    /// let template = Template::compile("<?print 1 + 2?>").unwrap();
    /// assert_eq!(template.content().len(), 1);
    /// ```
    #[inline]
    pub fn compile(source: &str) -> Result<Self, Error> {
        Engine::shared().compile(source)
    }

    /// Return the name, given by the host or by a `<?ul4?>` tag.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Return the complete source text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Return the part of the source that holds the content of this
    /// template.
    ///
    /// For a top level template this is the whole source, for a local one
    /// the text between its opening and closing tag.
    pub fn code(&self) -> &str {
        &self.source[self.region]
    }

    /// Return the [`Region`] of the content within the source.
    pub fn region(&self) -> Region {
        self.region
    }

    pub fn whitespace(&self) -> Whitespace {
        self.whitespace
    }

    /// Return the text of the last `<?doc?>` tag at the top level of this
    /// template.
    pub fn doc(&self) -> Option<&str> {
        self.doc.as_deref()
    }

    /// Return the parsed signature.
    ///
    /// A template without a signature accepts keyword arguments only.
    pub fn signature(&self) -> Option<&SignatureTree> {
        self.signature.as_ref()
    }

    /// Return the text of the signature, parentheses excluded.
    pub fn signature_text(&self) -> Option<&str> {
        self.signature.as_ref().map(|signature| signature.text.as_str())
    }

    /// Return the nodes making up the content.
    pub fn content(&self) -> &[Node] {
        &self.content
    }

    /// Return the tag delimiters the template was compiled with.
    pub fn delimiters(&self) -> (&str, &str) {
        (&self.delimiters.0, &self.delimiters.1)
    }

    /// Return the warnings admitted while compiling.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Render the template to the given output.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the arguments do not match the signature,
    /// evaluation fails, or writing to the output fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use ul4::{Arguments, Template};
    ///
    /// let template = Template::compile("hello, <?print name?>!").unwrap();
    /// let mut buffer = String::new();
    /// template.render(&mut buffer, Arguments::new().kwarg("name", "taylor")).unwrap();
    ///
    /// assert_eq!(buffer, "hello, taylor!");
    /// ```
    #[inline]
    pub fn render(&self, out: &mut dyn Write, arguments: Arguments) -> Result<(), Error> {
        Engine::shared().render(self, out, arguments)
    }

    /// Render the template and return the output.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the arguments do not match the signature, or
    /// evaluation fails.
    #[inline]
    pub fn renders(&self, arguments: Arguments) -> Result<String, Error> {
        Engine::shared().renders(self, arguments)
    }

    /// Call the template for the value of its `<?return?>` tag.
    ///
    /// Output is discarded. A template that does not return a value
    /// returns `None`.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the arguments do not match the signature, or
    /// evaluation fails.
    #[inline]
    pub fn call(&self, arguments: Arguments) -> Result<Value, Error> {
        Engine::shared().call(self, arguments)
    }

    /// Render the template to the given output, with extra global
    /// variables.
    ///
    /// Globals are visible where no local variable of the same name exists,
    /// and cannot be changed by the template.
    ///
    /// # Errors
    ///
    /// See [`Template::render`].
    #[inline]
    pub fn render_with_globals(
        &self,
        out: &mut dyn Write,
        arguments: Arguments,
        globals: &Store,
    ) -> Result<(), Error> {
        Engine::shared().render_with_globals(self, out, arguments, globals)
    }

    /// Render the template with extra global variables and return the
    /// output.
    ///
    /// # Errors
    ///
    /// See [`Template::renders`].
    #[inline]
    pub fn renders_with_globals(
        &self,
        arguments: Arguments,
        globals: &Store,
    ) -> Result<String, Error> {
        Engine::shared().renders_with_globals(self, arguments, globals)
    }

    /// Call the template with extra global variables.
    ///
    /// # Errors
    ///
    /// See [`Template::call`].
    #[inline]
    pub fn call_with_globals(&self, arguments: Arguments, globals: &Store) -> Result<Value, Error> {
        Engine::shared().call_with_globals(self, arguments, globals)
    }

    /// Return a [`Location`] in this template.
    pub(crate) fn location(&self, region: Region) -> Location {
        Location::new(self.name.clone(), Arc::clone(&self.source), region)
    }

    /// Return the number of nodes in the template, nested ones included.
    pub(crate) fn size(&self) -> usize {
        fn count(nodes: &[Node]) -> usize {
            nodes
                .iter()
                .map(|node| {
                    1 + match node {
                        Node::If(block) => {
                            block.branches.iter().map(|b| count(&b.body)).sum::<usize>()
                                + block.otherwise.as_deref().map_or(0, count)
                        }
                        Node::For(block) => count(&block.body),
                        Node::While(block) => count(&block.body),
                        Node::Def(def) => def.template.size(),
                        Node::RenderBlock(block) => block.content.size(),
                        Node::RenderBlocks(block) => count(&block.body),
                        _ => 0,
                    }
                })
                .sum()
        }

        count(&self.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_accessors() {
        let template = Template::compile(
            "<?ul4 greet(name='you')?><?doc Greets.?><?whitespace smart?>hi <?print name?>",
        )
        .unwrap();

        assert_eq!(template.name(), Some("greet"));
        assert_eq!(template.doc(), Some("Greets."));
        assert_eq!(template.signature_text(), Some("name='you'"));
        assert_eq!(template.whitespace(), Whitespace::Smart);
        assert_eq!(template.delimiters(), ("<?", "?>"));
        assert!(template.diagnostics().is_empty());
    }

    #[test]
    fn test_template_node_regions() {
        let source = "a<?print x?><?if y?>b<?end if?>";
        let template = Template::compile(source).unwrap();
        let regions: Vec<_> = template
            .content()
            .iter()
            .map(|node| &source[node.region()])
            .collect();

        assert_eq!(regions, vec!["a", "<?print x?>", "<?if y?>b<?end if?>"]);
        assert_eq!(template.size(), 4);
    }

    #[test]
    fn test_template_local_code() {
        let template = Template::compile("<?def f?>inner<?end def?>").unwrap();
        let Node::Def(def) = &template.content()[0] else {
            unreachable!()
        };

        assert_eq!(def.template.code(), "inner");
        assert_eq!(def.template.source(), template.source());
    }

    #[test]
    fn test_template_renders() {
        let template = Template::compile("<?ul4 t(x, y=2)?><?print x * y?>").unwrap();

        assert_eq!(template.renders(Arguments::new().arg(21)).unwrap(), "42");
        assert_eq!(
            template
                .renders(Arguments::new().arg(1).kwarg("y", 5))
                .unwrap(),
            "5"
        );
    }

    #[test]
    fn test_template_call_and_globals() {
        let template = Template::compile("<?return prefix + name?>").unwrap();
        let globals = Store::new().with_value("prefix", Value::from("dr. "));
        let value = template
            .call_with_globals(Arguments::new().kwarg("name", "who"), &globals)
            .unwrap();

        assert_eq!(value, Value::from("dr. who"));
        assert_eq!(
            Template::compile("x").unwrap().call(Arguments::new()).unwrap(),
            Value::None
        );
    }
}
