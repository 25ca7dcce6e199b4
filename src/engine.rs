use crate::{
    compile::{parse_signature, tree::SignatureTree, Builder, Parser, Template, Whitespace},
    function::{Function, Native},
    log::{error_missing_template, Error, Policy},
    pipe::Pipe,
    render::{Arguments, Renderer, Scope, Signature},
    value::Value,
    Store,
};
use indexmap::IndexMap;
use std::{
    fmt::Write,
    sync::{Arc, OnceLock},
};

type Escaper = Arc<dyn Fn(&str) -> String + Send + Sync>;
type Interrupt = Arc<dyn Fn() -> bool + Send + Sync>;

/// Facilitates compiling and rendering templates, and provides storage
/// for functions and templates.
///
/// # Examples
///
/// ```
/// use ul4::{Arguments, Engine};
///
/// let engine = Engine::default();
/// let template = engine.compile("hello, <?print name?>!").unwrap();
/// let result = engine.renders(&template, Arguments::new().kwarg("name", "taylor"));
///
/// assert_eq!(result.unwrap(), "hello, taylor!");
/// ```
pub struct Engine {
    /// Markers and default whitespace mode.
    builder: Builder,
    /// Decides what happens to soft compile problems.
    policy: Policy,
    /// Functions that this engine is aware of.
    functions: IndexMap<String, Value>,
    /// Templates that this engine is aware of.
    templates: IndexMap<String, Arc<Template>>,
    /// Escapes the output of `printx` and `renderx`.
    escaper: Escaper,
    /// Maximum number of nested template calls.
    recursion_limit: usize,
    /// Polled before every statement, rendering stops when it returns true.
    interrupt: Option<Interrupt>,
}

impl Engine {
    /// Create a new instance of [`Engine`] with the given [`Builder`].
    #[inline]
    pub fn new(builder: Builder) -> Self {
        Self {
            builder,
            policy: Policy::default(),
            functions: IndexMap::new(),
            templates: IndexMap::new(),
            escaper: Arc::new(escape_xml),
            recursion_limit: 100,
            interrupt: None,
        }
    }

    /// Return the default [`Engine`] shared by [`compile`][`crate::compile`]
    /// and the rendering methods of [`Template`].
    pub fn shared() -> &'static Engine {
        static SHARED: OnceLock<Engine> = OnceLock::new();

        SHARED.get_or_init(Engine::default)
    }

    /// Set the [`Policy`] used when compiling.
    ///
    /// Returns the [`Engine`], so additional methods may be chained.
    #[inline]
    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.policy = policy;

        self
    }

    /// Set the maximum depth of nested template calls.
    ///
    /// Returns the [`Engine`], so additional methods may be chained.
    #[inline]
    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit;

        self
    }

    /// Set a check that is polled before every statement. Rendering fails
    /// with a cancellation error once it returns true.
    ///
    /// Returns the [`Engine`], so additional methods may be chained.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::{
    ///     atomic::{AtomicBool, Ordering},
    ///     Arc,
    /// };
    /// use ul4::{Arguments, Engine, ErrorKind};
    ///
    /// let stop = Arc::new(AtomicBool::new(true));
    /// let flag = Arc::clone(&stop);
    /// let engine = Engine::default().with_interrupt(move || flag.load(Ordering::Relaxed));
    /// let template = engine.compile("<?while True?><?end while?>").unwrap();
    ///
    /// let error = engine.renders(&template, Arguments::new()).unwrap_err();
    /// assert_eq!(error.kind(), ErrorKind::Cancelled);
    /// ```
    pub fn with_interrupt<F>(mut self, interrupt: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.interrupt = Some(Arc::new(interrupt));

        self
    }

    /// Set the function that escapes the output of `printx` and `renderx`.
    ///
    /// Returns the [`Engine`], so additional methods may be chained.
    pub fn with_escaper<F>(mut self, escaper: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.escaper = Arc::new(escaper);

        self
    }

    /// Compile a new [`Template`].
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] when compilation fails, which most likely means the source
    /// contains invalid syntax.
    ///
    /// # Examples
    ///
    /// ```
    /// use ul4::Engine;
    ///
    /// let engine = Engine::default();
    /// let template = engine.compile("hello, <?print name?>!");
    /// assert!(template.is_ok());
    /// ```
    #[inline]
    pub fn compile(&self, source: &str) -> Result<Template, Error> {
        self.compile_with(None, source, &self.builder)
    }

    /// Compile a new [`Template`] with the given name.
    ///
    /// The name appears in error messages, and is replaced by a name given
    /// in a `<?ul4?>` tag.
    ///
    /// # Errors
    ///
    /// See [`Engine::compile`].
    #[inline]
    pub fn compile_named(&self, name: &str, source: &str) -> Result<Template, Error> {
        self.compile_with(Some(name), source, &self.builder)
    }

    fn compile_with(
        &self,
        name: Option<&str>,
        source: &str,
        builder: &Builder,
    ) -> Result<Template, Error> {
        tracing::debug!(name = ?name, length = source.len(), "compiling template");
        let source: Arc<str> = Arc::from(source);
        let mut template = Parser::new(&source, name, builder, self.policy).compile()?;

        if let Some(tree) = template.signature.clone() {
            let signature = self
                .evaluate_signature(&template, &tree)
                .map_err(|error| error.located(&template.location(tree.region)))?;
            template.bound = Some(Arc::new(signature));
        }

        tracing::debug!(
            name = ?template.name(),
            nodes = template.size(),
            whitespace = %template.whitespace(),
            diagnostics = template.diagnostics().len(),
            "compiled template"
        );
        Ok(template)
    }

    /// Evaluate the defaults of a top level signature, which cannot see any
    /// variables.
    fn evaluate_signature(&self, template: &Template, tree: &SignatureTree) -> Result<Signature, Error> {
        let mut sink = String::new();
        let mut pipe = Pipe::new(&mut sink);

        Renderer::new(self, None).signature(template, tree, &Scope::new(), &mut pipe)
    }

    /// Compile a template received in serialized form.
    pub(crate) fn load_template(
        &self,
        name: Option<&str>,
        source: &str,
        signature: Option<&str>,
        whitespace: Whitespace,
        delimiters: (&str, &str),
    ) -> Result<Template, Error> {
        let builder = Builder::new()
            .with_tag(delimiters.0, delimiters.1)
            .with_whitespace(whitespace);
        let mut template = self.compile_with(name, source, &builder)?;

        if let (None, Some(text)) = (&template.signature, signature) {
            let tree = parse_signature(text)?;
            let bound = self.evaluate_signature(&template, &tree)?;
            template.signature = Some(tree);
            template.bound = Some(Arc::new(bound));
        }

        Ok(template)
    }

    /// Render a [`Template`] to the given output.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the arguments do not match the signature,
    /// evaluation fails, or writing to the output fails.
    #[inline]
    pub fn render(
        &self,
        template: &Template,
        out: &mut dyn Write,
        arguments: Arguments,
    ) -> Result<(), Error> {
        self.run(template, out, arguments, None).map(|_| ())
    }

    /// Render a [`Template`] and return the output.
    ///
    /// # Errors
    ///
    /// See [`Engine::render`].
    #[inline]
    pub fn renders(&self, template: &Template, arguments: Arguments) -> Result<String, Error> {
        let mut buffer = String::with_capacity(template.code().len());
        self.run(template, &mut buffer, arguments, None)?;

        Ok(buffer)
    }

    /// Call a [`Template`] for the value of its `<?return?>` tag.
    ///
    /// # Errors
    ///
    /// See [`Engine::render`].
    #[inline]
    pub fn call(&self, template: &Template, arguments: Arguments) -> Result<Value, Error> {
        let mut sink = String::new();
        let value = self.run(template, &mut sink, arguments, None)?;

        Ok(value.unwrap_or(Value::None))
    }

    /// Render a [`Template`] to the given output, with extra global
    /// variables.
    ///
    /// # Errors
    ///
    /// See [`Engine::render`].
    #[inline]
    pub fn render_with_globals(
        &self,
        template: &Template,
        out: &mut dyn Write,
        arguments: Arguments,
        globals: &Store,
    ) -> Result<(), Error> {
        self.run(template, out, arguments, Some(globals)).map(|_| ())
    }

    /// Render a [`Template`] with extra global variables and return the
    /// output.
    ///
    /// # Errors
    ///
    /// See [`Engine::render`].
    #[inline]
    pub fn renders_with_globals(
        &self,
        template: &Template,
        arguments: Arguments,
        globals: &Store,
    ) -> Result<String, Error> {
        let mut buffer = String::with_capacity(template.code().len());
        self.run(template, &mut buffer, arguments, Some(globals))?;

        Ok(buffer)
    }

    /// Call a [`Template`] with extra global variables.
    ///
    /// # Errors
    ///
    /// See [`Engine::render`].
    #[inline]
    pub fn call_with_globals(
        &self,
        template: &Template,
        arguments: Arguments,
        globals: &Store,
    ) -> Result<Value, Error> {
        let mut sink = String::new();
        let value = self.run(template, &mut sink, arguments, Some(globals))?;

        Ok(value.unwrap_or(Value::None))
    }

    /// Render the template stored in this engine under the given name.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if no template has the name, or rendering fails.
    pub fn render_named(&self, name: &str, arguments: Arguments) -> Result<String, Error> {
        let template = self
            .get_template(name)
            .ok_or_else(|| error_missing_template(name))?;

        self.renders(template, arguments)
    }

    fn run(
        &self,
        template: &Template,
        out: &mut dyn Write,
        arguments: Arguments,
        globals: Option<&Store>,
    ) -> Result<Option<Value>, Error> {
        let mut pipe = Pipe::new(out);

        Renderer::new(self, globals).enter(
            template,
            template.bound.as_deref(),
            None,
            arguments,
            &mut pipe,
        )
    }

    /// Compile and store a new [`Template`] with the given name.
    ///
    /// Stored templates are visible by name to every template rendered by
    /// this engine.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] when a `Template` with the given name already exists,
    /// or when compilation fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use ul4::Engine;
    ///
    /// let mut engine = Engine::default();
    /// let result = engine.add_template("header", "<h1><?print title?></h1>");
    /// assert!(result.is_ok());
    ///
    /// let second = engine.add_template("header", "hello again");
    /// assert!(second.is_err());
    /// ```
    pub fn add_template(&mut self, name: &str, source: &str) -> Result<(), Error> {
        if self.templates.contains_key(name) {
            return Err(Error::build(format!(
                "template with name `{name}` already exists in engine, \
                overwrite it with `.add_template_must`"
            )));
        }
        self.add_template_must(name, source)
    }

    /// Compile and store a new [`Template`], overwriting any template with
    /// the same name.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] when compilation fails.
    pub fn add_template_must(&mut self, name: &str, source: &str) -> Result<(), Error> {
        let template = self.compile_named(name, source)?;
        self.templates.insert(name.to_string(), Arc::new(template));

        Ok(())
    }

    /// Return the template with the given name, if it exists in Engine.
    #[inline]
    pub fn get_template(&self, name: &str) -> Option<&Arc<Template>> {
        self.templates.get(name)
    }

    /// Add a [`Function`].
    ///
    /// # Errors
    ///
    /// If a `Function` with the given name already exists in the engine, an [`Error`] is returned.
    pub fn add_function<T>(&mut self, name: &str, signature: Signature, function: T) -> Result<(), Error>
    where
        T: Function + 'static,
    {
        if self.functions.contains_key(name) {
            return Err(Error::build(format!(
                "function with name `{name}` already exists in engine, \
                overwrite it with `.add_function_must`"
            )));
        }
        self.add_function_must(name, signature, function);

        Ok(())
    }

    /// Add a [`Function`].
    ///
    /// If a `Function` with the given name already exists in the engine, it is overwritten.
    #[inline]
    pub fn add_function_must<T>(&mut self, name: &str, signature: Signature, function: T)
    where
        T: Function + 'static,
    {
        let native = Native::new(name, signature, function);
        self.functions
            .insert(name.to_string(), Value::Function(Arc::new(native)));
    }

    /// Add a [`Function`].
    ///
    /// Returns the [`Engine`], so additional methods may be chained.
    ///
    /// # Errors
    ///
    /// If a `Function` with the given name already exists in the engine, an [`Error`] is returned.
    #[inline]
    pub fn with_function<T>(mut self, name: &str, signature: Signature, function: T) -> Result<Self, Error>
    where
        T: Function + 'static,
    {
        self.add_function(name, signature, function)?;

        Ok(self)
    }

    /// Add a [`Function`].
    ///
    /// Returns the [`Engine`], so additional methods may be chained.
    ///
    /// If a `Function` with the given name already exists in the engine, it is overwritten.
    #[inline]
    pub fn with_function_must<T>(mut self, name: &str, signature: Signature, function: T) -> Self
    where
        T: Function + 'static,
    {
        self.add_function_must(name, signature, function);

        self
    }

    /// Return the function with the given name, if it exists in Engine.
    #[inline]
    pub fn get_function(&self, name: &str) -> Option<&Value> {
        self.functions.get(name)
    }

    /// Return the markers and default whitespace mode.
    pub fn builder(&self) -> &Builder {
        &self.builder
    }

    pub(crate) fn recursion_limit(&self) -> usize {
        self.recursion_limit
    }

    pub(crate) fn is_interrupted(&self) -> bool {
        self.interrupt.as_ref().is_some_and(|interrupt| interrupt())
    }

    pub(crate) fn escape(&self, text: &str) -> String {
        (self.escaper)(text)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(Builder::default())
    }
}

/// Escape the characters that have a meaning in XML and HTML.
fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }

    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{render::Bound, ErrorKind};

    fn faux_function(arguments: &Bound) -> Result<Value, Error> {
        Ok(Value::from(format!("<{}>", arguments.value("x").as_str().unwrap_or(""))))
    }

    fn signature() -> Signature {
        Signature::new().with_parameter("x")
    }

    #[test]
    fn test_add() {
        let mut engine = Engine::default();
        engine.add_function_must("faux", signature(), faux_function);

        assert!(engine.get_function("faux").is_some());
        assert!(engine.get_function("ghost").is_none())
    }

    #[test]
    fn test_add_fluent() {
        assert!(Engine::default()
            .with_function("faux", signature(), faux_function)
            .unwrap()
            .get_function("faux")
            .is_some());
    }

    #[test]
    fn test_add_duplicate() {
        assert!(Engine::default()
            .with_function_must("faux", signature(), faux_function)
            .with_function("faux", signature(), faux_function)
            .is_err())
    }

    #[test]
    fn test_function_in_template() {
        let engine = Engine::default().with_function_must("faux", signature(), faux_function);
        let template = engine.compile("<?print faux('a')?><?printx faux(x='b')?>").unwrap();

        assert_eq!(engine.renders(&template, Arguments::new()).unwrap(), "<a>&lt;b&gt;");
    }

    #[test]
    fn test_named_templates() {
        let mut engine = Engine::default();
        engine
            .add_template("greet", "<?ul4 greet(name)?>hi <?print name?>")
            .unwrap();
        engine
            .add_template("page", "[<?render greet('taylor')?>]")
            .unwrap();

        assert_eq!(engine.render_named("page", Arguments::new()).unwrap(), "[hi taylor]");
        assert!(engine.render_named("ghost", Arguments::new()).is_err());
    }

    #[test]
    fn test_custom_delimiters_and_escaper() {
        let engine = Engine::new(Builder::new().with_tag("{%", "%}"))
            .with_escaper(|text: &str| text.to_uppercase());
        let template = engine.compile("{%printx 'abc'%}").unwrap();

        assert_eq!(engine.renders(&template, Arguments::new()).unwrap(), "ABC");
        assert_eq!(template.delimiters(), ("{%", "%}"));
    }

    #[test]
    fn test_compile_named() {
        let engine = Engine::default();
        let template = engine.compile_named("page", "<?print 1 // 0?>").unwrap();
        let error = engine.renders(&template, Arguments::new()).unwrap_err();

        assert_eq!(template.name(), Some("page"));
        assert_eq!(error.kind(), ErrorKind::ZeroDivision);
        assert_eq!(error.get_name(), Some("page"));
    }

    #[test]
    fn test_signature_defaults_evaluated_once() {
        let engine = Engine::default();
        let template = engine
            .compile("<?ul4 t(x=[])?><?code x.append(1)?><?return len(x)?>")
            .unwrap();

        assert_eq!(engine.call(&template, Arguments::new()).unwrap(), Value::Int(1));
        assert_eq!(engine.call(&template, Arguments::new()).unwrap(), Value::Int(2));
    }
}
