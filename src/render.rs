//! Evaluation of compiled templates.
//!
//! A [`Renderer`] walks the tree of a [`Template`], evaluating expressions
//! against a chain of [`Scope`] frames and writing output to a [`Pipe`].
pub mod compare;

mod access;
mod arithmetic;
mod bind;
mod closure;
mod scope;

pub use bind::{Argument, Arguments, Bound, Parameter, Signature};
pub use closure::Closure;
pub use scope::Scope;

use crate::{
    builtin,
    compile::{
        tree::{
            Binary, CallArgument, ChangeVar, Comprehension, Def, DictComprehension, DictItem,
            Expression, For, If, Item, Lvalue, Node, Render, RenderBlock, RenderBlocks,
            SignatureTree, While,
        },
        Operator, Template,
    },
    engine::Engine,
    format,
    log::{error_type, error_undefined, error_write, Error, ErrorKind},
    pipe::Pipe,
    region::Region,
    value::Value,
    Store,
};
use std::{cmp::Ordering, sync::Arc};

/// Signals that end a sequence of statements early.
#[derive(Debug)]
pub(crate) enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

pub(crate) struct Renderer<'engine> {
    /// An engine containing any registered functions and templates.
    engine: &'engine Engine,
    /// Variables visible below every scope.
    globals: Option<&'engine Store>,
    /// Number of template calls currently running.
    depth: usize,
}

impl<'engine> Renderer<'engine> {
    /// Create a new Renderer.
    pub fn new(engine: &'engine Engine, globals: Option<&'engine Store>) -> Self {
        Self {
            engine,
            globals,
            depth: 0,
        }
    }

    /// Run a template with the given arguments, writing its output to the
    /// pipe.
    ///
    /// Returns the value of the `<?return?>` tag that ended the template, if
    /// any.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the arguments do not match the signature, or
    /// any statement fails.
    pub fn enter(
        &mut self,
        template: &Template,
        signature: Option<&Signature>,
        parent: Option<&Scope>,
        arguments: Arguments,
        pipe: &mut Pipe,
    ) -> Result<Option<Value>, Error> {
        let name = template.name().unwrap_or("template");
        let limit = self.engine.recursion_limit();
        if self.depth >= limit {
            return Err(Error::build("maximum recursion depth exceeded")
                .with_kind(ErrorKind::Recursion)
                .with_help(format!("template calls may nest at most {limit} levels deep")));
        }

        let bound = match signature {
            Some(signature) => signature.bind(name, arguments)?,
            None => Signature::bind_keywords(name, arguments)?,
        };
        let scope = match parent {
            Some(parent) => parent.child(),
            None => Scope::new(),
        };
        for (name, value) in bound {
            scope.set(name, value);
        }

        tracing::trace!(template = name, depth = self.depth, "entering template");
        self.depth += 1;
        let flow = self.execute(template, &template.content, &scope, pipe);
        self.depth -= 1;

        match flow? {
            Flow::Return(value) => Ok(Some(value)),
            _ => Ok(None),
        }
    }

    /// Run a closure, writing its output to the pipe.
    fn invoke(
        &mut self,
        closure: &Closure,
        arguments: Arguments,
        pipe: &mut Pipe,
    ) -> Result<Option<Value>, Error> {
        self.enter(
            closure.template(),
            closure.signature().map(|signature| &**signature),
            closure.scope(),
            arguments,
            pipe,
        )
    }

    /// Run a closure for the value it returns, discarding its output.
    fn call_closure(
        &mut self,
        closure: &Closure,
        arguments: Arguments,
        pipe: &mut Pipe,
    ) -> Result<Value, Error> {
        pipe.begin_capture();
        let result = self.invoke(closure, arguments, pipe);
        pipe.end_capture();

        Ok(result?.unwrap_or(Value::None))
    }

    /// Evaluate the defaults of a parsed signature in the given scope.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if evaluating a default fails.
    pub fn signature(
        &mut self,
        template: &Template,
        tree: &SignatureTree,
        scope: &Scope,
        pipe: &mut Pipe,
    ) -> Result<Signature, Error> {
        let mut signature = Signature::new();
        for parameter in &tree.parameters {
            signature = match &parameter.default {
                Some(default) => {
                    let value = self.evaluate(template, default, scope, pipe)?;
                    signature.with_default(&parameter.name, value)
                }
                None => signature.with_parameter(&parameter.name),
            };
        }
        if let Some(rest) = &tree.rest {
            signature = signature.with_rest(rest);
        }
        if let Some(kwrest) = &tree.kwrest {
            signature = signature.with_kwrest(kwrest);
        }

        Ok(signature)
    }

    /// Execute a sequence of statements.
    fn execute(
        &mut self,
        template: &Template,
        nodes: &[Node],
        scope: &Scope,
        pipe: &mut Pipe,
    ) -> Result<Flow, Error> {
        for node in nodes {
            self.check_interrupt(template, node.region())?;

            let flow = match node {
                Node::Text(text) => {
                    pipe.write_text(&text.text).map_err(|_| error_write())?;
                    Flow::Normal
                }
                Node::Print(output) => {
                    let value = self
                        .evaluate(template, &output.expression, scope, pipe)
                        .map_err(at(template, output.region))?;
                    pipe.write_value(&value).map_err(|_| error_write())?;
                    Flow::Normal
                }
                Node::PrintX(output) => {
                    let value = self
                        .evaluate(template, &output.expression, scope, pipe)
                        .map_err(at(template, output.region))?;
                    let text = self.engine.escape(&format::display(&value));
                    pipe.write_text(&text).map_err(|_| error_write())?;
                    Flow::Normal
                }
                Node::Expression(output) => {
                    self.evaluate(template, &output.expression, scope, pipe)
                        .map_err(at(template, output.region))?;
                    Flow::Normal
                }
                Node::SetVar(set) => {
                    let value = self
                        .evaluate(template, &set.value, scope, pipe)
                        .map_err(at(template, set.region))?;
                    self.assign(template, &set.target, value, scope, pipe)
                        .map_err(at(template, set.region))?;
                    Flow::Normal
                }
                Node::ChangeVar(change) => {
                    self.change(template, change, scope, pipe)
                        .map_err(at(template, change.region))?;
                    Flow::Normal
                }
                Node::If(block) => self.execute_if(template, block, scope, pipe)?,
                Node::For(block) => self.execute_for(template, block, scope, pipe)?,
                Node::While(block) => self.execute_while(template, block, scope, pipe)?,
                Node::Def(def) => {
                    self.define(template, def, scope, pipe)
                        .map_err(at(template, def.tag))?;
                    Flow::Normal
                }
                Node::Return(output) => {
                    let value = self
                        .evaluate(template, &output.expression, scope, pipe)
                        .map_err(at(template, output.region))?;
                    Flow::Return(value)
                }
                Node::Break(_) => Flow::Break,
                Node::Continue(_) => Flow::Continue,
                Node::Render(render) => {
                    self.render(template, render, scope, pipe)
                        .map_err(at(template, render.region))?;
                    Flow::Normal
                }
                Node::RenderBlock(block) => {
                    self.render_block(template, block, scope, pipe)?;
                    Flow::Normal
                }
                Node::RenderBlocks(block) => {
                    self.render_blocks(template, block, scope, pipe)?;
                    Flow::Normal
                }
            };

            if !matches!(flow, Flow::Normal) {
                return Ok(flow);
            }
        }

        Ok(Flow::Normal)
    }

    fn check_interrupt(&self, template: &Template, region: Region) -> Result<(), Error> {
        if self.engine.is_interrupted() {
            return Err(Error::build("rendering cancelled")
                .with_kind(ErrorKind::Cancelled)
                .with_location(template.location(region)));
        }

        Ok(())
    }

    fn execute_if(
        &mut self,
        template: &Template,
        block: &If,
        scope: &Scope,
        pipe: &mut Pipe,
    ) -> Result<Flow, Error> {
        for branch in &block.branches {
            let condition = self
                .evaluate(template, &branch.condition, scope, pipe)
                .map_err(at(template, branch.tag))?;
            if compare::is_truthy(&condition) {
                return self.execute(template, &branch.body, scope, pipe);
            }
        }

        match &block.otherwise {
            Some(body) => self.execute(template, body, scope, pipe),
            None => Ok(Flow::Normal),
        }
    }

    /// Execute a `for` loop.
    ///
    /// The loop variables are assigned in the enclosing scope, so they keep
    /// their last value after the loop.
    fn execute_for(
        &mut self,
        template: &Template,
        block: &For,
        scope: &Scope,
        pipe: &mut Pipe,
    ) -> Result<Flow, Error> {
        let items = self
            .evaluate(template, &block.iterable, scope, pipe)
            .and_then(|iterable| iterable.iterate())
            .map_err(at(template, block.tag))?;

        for item in items {
            self.assign(template, &block.target, item, scope, pipe)
                .map_err(at(template, block.tag))?;
            match self.execute(template, &block.body, scope, pipe)? {
                Flow::Break => break,
                Flow::Return(value) => return Ok(Flow::Return(value)),
                Flow::Normal | Flow::Continue => {}
            }
        }

        Ok(Flow::Normal)
    }

    fn execute_while(
        &mut self,
        template: &Template,
        block: &While,
        scope: &Scope,
        pipe: &mut Pipe,
    ) -> Result<Flow, Error> {
        loop {
            self.check_interrupt(template, block.tag)?;
            let condition = self
                .evaluate(template, &block.condition, scope, pipe)
                .map_err(at(template, block.tag))?;
            if !compare::is_truthy(&condition) {
                break;
            }
            match self.execute(template, &block.body, scope, pipe)? {
                Flow::Break => break,
                Flow::Return(value) => return Ok(Flow::Return(value)),
                Flow::Normal | Flow::Continue => {}
            }
        }

        Ok(Flow::Normal)
    }

    /// Bind a local template to its name, capturing the current scope.
    fn define(
        &mut self,
        template: &Template,
        def: &Def,
        scope: &Scope,
        pipe: &mut Pipe,
    ) -> Result<(), Error> {
        let inner = &def.template;
        let signature = match inner.signature() {
            Some(tree) => Some(Arc::new(self.signature(template, tree, scope, pipe)?)),
            None => None,
        };
        let closure = Closure::new(Arc::clone(inner), signature, Some(scope.clone()));
        if let Some(name) = inner.name() {
            scope.set(name, Value::Template(Arc::new(closure)));
        }

        Ok(())
    }

    fn render(
        &mut self,
        template: &Template,
        render: &Render,
        scope: &Scope,
        pipe: &mut Pipe,
    ) -> Result<(), Error> {
        let callee = self.evaluate(template, &render.call.callee, scope, pipe)?;
        let arguments = self.arguments(template, &render.call.arguments, scope, pipe)?;
        let closure = expect_template(&callee)?;

        self.render_closure(closure, arguments, render.escape, render.indent.as_deref(), pipe)
    }

    /// Render the callee, passing the block content as the `content`
    /// argument.
    fn render_block(
        &mut self,
        template: &Template,
        block: &RenderBlock,
        scope: &Scope,
        pipe: &mut Pipe,
    ) -> Result<(), Error> {
        let callee = self
            .evaluate(template, &block.call.callee, scope, pipe)
            .map_err(at(template, block.tag))?;
        let mut arguments = self
            .arguments(template, &block.call.arguments, scope, pipe)
            .map_err(at(template, block.tag))?;
        let content = Closure::new(
            Arc::clone(&block.content),
            Some(Arc::new(Signature::new())),
            Some(scope.clone()),
        );
        arguments.push(Argument::Keyword(
            "content".to_string(),
            Value::Template(Arc::new(content)),
        ));

        expect_template(&callee)
            .and_then(|closure| {
                self.render_closure(closure, arguments, false, block.indent.as_deref(), pipe)
            })
            .map_err(at(template, block.tag))
    }

    /// Render the callee, passing every variable defined by the block body
    /// as a keyword argument.
    fn render_blocks(
        &mut self,
        template: &Template,
        block: &RenderBlocks,
        scope: &Scope,
        pipe: &mut Pipe,
    ) -> Result<(), Error> {
        let callee = self
            .evaluate(template, &block.call.callee, scope, pipe)
            .map_err(at(template, block.tag))?;
        let mut arguments = self
            .arguments(template, &block.call.arguments, scope, pipe)
            .map_err(at(template, block.tag))?;

        let inner = scope.child();
        pipe.begin_capture();
        let flow = self.execute(template, &block.body, &inner, pipe);
        pipe.end_capture();
        flow?;
        let locals = inner.locals();
        let mut passed: Vec<&str> = vec![];
        for node in &block.body {
            let Node::Def(def) = node else { continue };
            let Some(name) = def.template.name() else { continue };
            if passed.contains(&name) {
                continue;
            }
            if let Some((_, value)) = locals.iter().find(|(local, _)| local == name) {
                arguments.push(Argument::Keyword(name.to_string(), value.clone()));
                passed.push(name);
            }
        }

        expect_template(&callee)
            .and_then(|closure| {
                self.render_closure(closure, arguments, false, block.indent.as_deref(), pipe)
            })
            .map_err(at(template, block.tag))
    }

    fn render_closure(
        &mut self,
        closure: &Closure,
        arguments: Arguments,
        escape: bool,
        indent: Option<&str>,
        pipe: &mut Pipe,
    ) -> Result<(), Error> {
        if let Some(indent) = indent {
            pipe.push_indent(indent);
        }
        let result = if escape {
            pipe.begin_capture();
            let result = self.invoke(closure, arguments, pipe);
            let output = pipe.end_capture();
            result.and_then(|_| {
                pipe.write_text(&self.engine.escape(&output))
                    .map_err(|_| error_write())
            })
        } else {
            self.invoke(closure, arguments, pipe).map(|_| ())
        };
        if indent.is_some() {
            pipe.pop_indent();
        }

        result
    }

    /// Assign a value to an assignment target.
    fn assign(
        &mut self,
        template: &Template,
        target: &Lvalue,
        value: Value,
        scope: &Scope,
        pipe: &mut Pipe,
    ) -> Result<(), Error> {
        match target {
            Lvalue::Var(var) => scope.set(var.name.as_str(), value),
            Lvalue::Attr(attr) => {
                let object = self.evaluate(template, &attr.object, scope, pipe)?;
                access::set_attribute(&object, &attr.name, value)?;
            }
            Lvalue::Item(item) => {
                let object = self.evaluate(template, &item.left, scope, pipe)?;
                let key = self.evaluate(template, &item.right, scope, pipe)?;
                access::set_item(&object, &key, value)?;
            }
            Lvalue::Unpack(targets, _) => {
                let items = value.iterate()?;
                if items.len() != targets.len() {
                    return Err(Error::build("cannot unpack")
                        .with_kind(ErrorKind::Value)
                        .with_help(format!(
                            "expected {} values to unpack, got {}",
                            targets.len(),
                            items.len()
                        )));
                }
                for (target, item) in targets.iter().zip(items) {
                    self.assign(template, target, item, scope, pipe)?;
                }
            }
        }

        Ok(())
    }

    /// Execute an augmented assignment like `x += 1`.
    fn change(
        &mut self,
        template: &Template,
        change: &ChangeVar,
        scope: &Scope,
        pipe: &mut Pipe,
    ) -> Result<(), Error> {
        let value = self.evaluate(template, &change.value, scope, pipe)?;
        match &change.target {
            Lvalue::Var(var) => {
                let current = self.lookup(&var.name, scope);
                let result = arithmetic::augment(change.operator, &current, &value)?;
                scope.set(var.name.as_str(), result);
            }
            Lvalue::Attr(attr) => {
                let object = self.evaluate(template, &attr.object, scope, pipe)?;
                let current = access::attribute(&object, &attr.name)?;
                let result = arithmetic::augment(change.operator, &current, &value)?;
                access::set_attribute(&object, &attr.name, result)?;
            }
            Lvalue::Item(item) => {
                let object = self.evaluate(template, &item.left, scope, pipe)?;
                let key = self.evaluate(template, &item.right, scope, pipe)?;
                let current = access::item(&object, &key)?;
                let result = arithmetic::augment(change.operator, &current, &value)?;
                access::set_item(&object, &key, result)?;
            }
            Lvalue::Unpack(..) => {
                return Err(error_type(
                    "augmented assignment requires a single target",
                ))
            }
        }

        Ok(())
    }

    /// Return the value of a variable.
    ///
    /// Names are searched in the scope chain, then the globals, then the
    /// templates and functions of the engine, then the builtins.
    fn lookup(&self, name: &str, scope: &Scope) -> Value {
        if let Some(value) = scope.get(name) {
            return value;
        }
        if let Some(value) = self.globals.and_then(|globals| globals.get(name)) {
            return value.clone();
        }
        if let Some(template) = self.engine.get_template(name) {
            return Value::Template(Arc::new(Closure::from_template(Arc::clone(template))));
        }
        if let Some(function) = self.engine.get_function(name) {
            return function.clone();
        }

        builtin::function(name).unwrap_or_else(|| Value::undefined(name))
    }

    /// Evaluate an [`Expression`] to return a [`Value`].
    fn evaluate(
        &mut self,
        template: &Template,
        expression: &Expression,
        scope: &Scope,
        pipe: &mut Pipe,
    ) -> Result<Value, Error> {
        let value = match expression {
            Expression::Const(constant) => constant.value.clone(),
            Expression::Var(var) => self.lookup(&var.name, scope),
            Expression::List(container) => {
                Value::list(self.items(template, &container.items, scope, pipe)?)
            }
            Expression::Set(container) => {
                Value::set(self.items(template, &container.items, scope, pipe)?)?
            }
            Expression::Dict(container) => {
                let mut pairs = vec![];
                for item in &container.items {
                    match item {
                        DictItem::Pair(key, value) => {
                            let key = self.evaluate(template, key, scope, pipe)?;
                            let value = self.evaluate(template, value, scope, pipe)?;
                            pairs.push((key, value));
                        }
                        DictItem::Unpack(expression) => {
                            match self.evaluate(template, expression, scope, pipe)? {
                                Value::Dict(dict) => pairs.extend(dict.snapshot()),
                                Value::Undefined(name) => return Err(error_undefined(&name)),
                                other => {
                                    return Err(error_type(format!(
                                        "`**` requires a dict, not `{}`",
                                        other.type_name()
                                    )))
                                }
                            }
                        }
                    }
                }
                Value::dict(pairs)?
            }
            Expression::ListComp(comprehension) | Expression::GenExpr(comprehension) => {
                Value::list(self.comprehend(template, comprehension, scope, pipe)?)
            }
            Expression::SetComp(comprehension) => {
                Value::set(self.comprehend(template, comprehension, scope, pipe)?)?
            }
            Expression::DictComp(comprehension) => {
                self.comprehend_dict(template, comprehension, scope, pipe)?
            }
            Expression::Attr(attr) => {
                let object = self.evaluate(template, &attr.object, scope, pipe)?;
                access::attribute(&object, &attr.name)?
            }
            Expression::Item(binary) => {
                let (object, key) = self.operands(template, binary, scope, pipe)?;
                access::item(&object, &key)?
            }
            Expression::Slice(slice) => {
                let object = self.evaluate(template, &slice.object, scope, pipe)?;
                let start = self.optional(template, slice.start.as_ref(), scope, pipe)?;
                let stop = self.optional(template, slice.stop.as_ref(), scope, pipe)?;
                access::slice(&object, start.as_ref(), stop.as_ref())?
            }
            Expression::Call(call) => {
                let callee = self.evaluate(template, &call.callee, scope, pipe)?;
                let arguments = self.arguments(template, &call.arguments, scope, pipe)?;
                self.call_value(&callee, arguments, pipe)?
            }
            Expression::Not(unary) => {
                let operand = self.evaluate(template, &unary.operand, scope, pipe)?;
                Value::Bool(!compare::is_truthy(&operand))
            }
            Expression::Neg(unary) => {
                arithmetic::negate(&self.evaluate(template, &unary.operand, scope, pipe)?)?
            }
            Expression::BitNot(unary) => {
                arithmetic::invert(&self.evaluate(template, &unary.operand, scope, pipe)?)?
            }
            Expression::Add(binary) => self.arithmetic(Operator::Add, template, binary, scope, pipe)?,
            Expression::Sub(binary) => {
                self.arithmetic(Operator::Subtract, template, binary, scope, pipe)?
            }
            Expression::Mul(binary) => {
                self.arithmetic(Operator::Multiply, template, binary, scope, pipe)?
            }
            Expression::TrueDiv(binary) => {
                self.arithmetic(Operator::TrueDivide, template, binary, scope, pipe)?
            }
            Expression::FloorDiv(binary) => {
                self.arithmetic(Operator::FloorDivide, template, binary, scope, pipe)?
            }
            Expression::Mod(binary) => {
                self.arithmetic(Operator::Modulo, template, binary, scope, pipe)?
            }
            Expression::ShiftLeft(binary) => {
                self.arithmetic(Operator::ShiftLeft, template, binary, scope, pipe)?
            }
            Expression::ShiftRight(binary) => {
                self.arithmetic(Operator::ShiftRight, template, binary, scope, pipe)?
            }
            Expression::BitAnd(binary) => {
                self.arithmetic(Operator::BitAnd, template, binary, scope, pipe)?
            }
            Expression::BitXor(binary) => {
                self.arithmetic(Operator::BitXor, template, binary, scope, pipe)?
            }
            Expression::BitOr(binary) => {
                self.arithmetic(Operator::BitOr, template, binary, scope, pipe)?
            }
            Expression::Eq(binary) => {
                let (left, right) = self.operands(template, binary, scope, pipe)?;
                Value::Bool(compare::equals(&left, &right))
            }
            Expression::Ne(binary) => {
                let (left, right) = self.operands(template, binary, scope, pipe)?;
                Value::Bool(!compare::equals(&left, &right))
            }
            Expression::Lt(binary) => {
                let (left, right) = self.operands(template, binary, scope, pipe)?;
                Value::Bool(compare::compare(&left, &right)? == Ordering::Less)
            }
            Expression::Le(binary) => {
                let (left, right) = self.operands(template, binary, scope, pipe)?;
                Value::Bool(compare::compare(&left, &right)? != Ordering::Greater)
            }
            Expression::Gt(binary) => {
                let (left, right) = self.operands(template, binary, scope, pipe)?;
                Value::Bool(compare::compare(&left, &right)? == Ordering::Greater)
            }
            Expression::Ge(binary) => {
                let (left, right) = self.operands(template, binary, scope, pipe)?;
                Value::Bool(compare::compare(&left, &right)? != Ordering::Less)
            }
            Expression::Contains(binary) => {
                let (item, container) = self.operands(template, binary, scope, pipe)?;
                Value::Bool(compare::contains(&container, &item)?)
            }
            Expression::NotContains(binary) => {
                let (item, container) = self.operands(template, binary, scope, pipe)?;
                Value::Bool(!compare::contains(&container, &item)?)
            }
            Expression::Is(binary) => {
                let (left, right) = self.operands(template, binary, scope, pipe)?;
                Value::Bool(compare::identical(&left, &right))
            }
            Expression::IsNot(binary) => {
                let (left, right) = self.operands(template, binary, scope, pipe)?;
                Value::Bool(!compare::identical(&left, &right))
            }
            Expression::And(binary) => {
                let left = self.evaluate(template, &binary.left, scope, pipe)?;
                if compare::is_truthy(&left) {
                    self.evaluate(template, &binary.right, scope, pipe)?
                } else {
                    left
                }
            }
            Expression::Or(binary) => {
                let left = self.evaluate(template, &binary.left, scope, pipe)?;
                if compare::is_truthy(&left) {
                    left
                } else {
                    self.evaluate(template, &binary.right, scope, pipe)?
                }
            }
            Expression::If(conditional) => {
                let condition = self.evaluate(template, &conditional.condition, scope, pipe)?;
                if compare::is_truthy(&condition) {
                    self.evaluate(template, &conditional.value, scope, pipe)?
                } else {
                    self.evaluate(template, &conditional.otherwise, scope, pipe)?
                }
            }
        };

        Ok(value)
    }

    fn operands(
        &mut self,
        template: &Template,
        binary: &Binary,
        scope: &Scope,
        pipe: &mut Pipe,
    ) -> Result<(Value, Value), Error> {
        let left = self.evaluate(template, &binary.left, scope, pipe)?;
        let right = self.evaluate(template, &binary.right, scope, pipe)?;

        Ok((left, right))
    }

    fn arithmetic(
        &mut self,
        operator: Operator,
        template: &Template,
        binary: &Binary,
        scope: &Scope,
        pipe: &mut Pipe,
    ) -> Result<Value, Error> {
        let (left, right) = self.operands(template, binary, scope, pipe)?;

        arithmetic::apply(operator, &left, &right)
    }

    fn optional(
        &mut self,
        template: &Template,
        expression: Option<&Expression>,
        scope: &Scope,
        pipe: &mut Pipe,
    ) -> Result<Option<Value>, Error> {
        expression
            .map(|expression| self.evaluate(template, expression, scope, pipe))
            .transpose()
    }

    /// Evaluate the items of a list or set literal, spreading `*x` items.
    fn items(
        &mut self,
        template: &Template,
        items: &[Item],
        scope: &Scope,
        pipe: &mut Pipe,
    ) -> Result<Vec<Value>, Error> {
        let mut values = vec![];
        for item in items {
            match item {
                Item::Value(expression) => values.push(self.evaluate(template, expression, scope, pipe)?),
                Item::Unpack(expression) => {
                    values.extend(self.evaluate(template, expression, scope, pipe)?.iterate()?)
                }
            }
        }

        Ok(values)
    }

    /// Evaluate a list, set or generator comprehension.
    ///
    /// The loop variables live in a private scope, which is dropped when the
    /// comprehension is done.
    fn comprehend(
        &mut self,
        template: &Template,
        comprehension: &Comprehension,
        scope: &Scope,
        pipe: &mut Pipe,
    ) -> Result<Vec<Value>, Error> {
        let items = self
            .evaluate(template, &comprehension.iterable, scope, pipe)?
            .iterate()?;
        let inner = scope.child();

        let mut values = vec![];
        for item in items {
            self.assign(template, &comprehension.target, item, &inner, pipe)?;
            if let Some(condition) = &comprehension.condition {
                let condition = self.evaluate(template, condition, &inner, pipe)?;
                if !compare::is_truthy(&condition) {
                    continue;
                }
            }
            values.push(self.evaluate(template, &comprehension.item, &inner, pipe)?);
        }

        Ok(values)
    }

    fn comprehend_dict(
        &mut self,
        template: &Template,
        comprehension: &DictComprehension,
        scope: &Scope,
        pipe: &mut Pipe,
    ) -> Result<Value, Error> {
        let items = self
            .evaluate(template, &comprehension.iterable, scope, pipe)?
            .iterate()?;
        let inner = scope.child();

        let mut pairs = vec![];
        for item in items {
            self.assign(template, &comprehension.target, item, &inner, pipe)?;
            if let Some(condition) = &comprehension.condition {
                let condition = self.evaluate(template, condition, &inner, pipe)?;
                if !compare::is_truthy(&condition) {
                    continue;
                }
            }
            let key = self.evaluate(template, &comprehension.key, &inner, pipe)?;
            let value = self.evaluate(template, &comprehension.value, &inner, pipe)?;
            pairs.push((key, value));
        }

        Value::dict(pairs)
    }

    /// Evaluate the arguments at a call site.
    fn arguments(
        &mut self,
        template: &Template,
        arguments: &[CallArgument],
        scope: &Scope,
        pipe: &mut Pipe,
    ) -> Result<Arguments, Error> {
        let mut result = Arguments::new();
        for argument in arguments {
            let argument = match argument {
                CallArgument::Positional(expression) => {
                    Argument::Positional(self.evaluate(template, expression, scope, pipe)?)
                }
                CallArgument::Keyword(name, expression) => Argument::Keyword(
                    name.clone(),
                    self.evaluate(template, expression, scope, pipe)?,
                ),
                CallArgument::Unpack(expression) => {
                    Argument::Unpack(self.evaluate(template, expression, scope, pipe)?)
                }
                CallArgument::UnpackMap(expression) => {
                    Argument::UnpackMap(self.evaluate(template, expression, scope, pipe)?)
                }
            };
            result.push(argument);
        }

        Ok(result)
    }

    /// Call a value with the given arguments.
    fn call_value(
        &mut self,
        callee: &Value,
        arguments: Arguments,
        pipe: &mut Pipe,
    ) -> Result<Value, Error> {
        match callee {
            Value::Template(closure) => self.call_closure(closure, arguments, pipe),
            Value::Function(native) => native.call(arguments),
            Value::Method(method) => match (&method.receiver, &*method.name) {
                (Value::Template(closure), "render") => {
                    self.invoke(closure, arguments, pipe)?;
                    Ok(Value::None)
                }
                (Value::Template(closure), "renders") => {
                    pipe.begin_capture();
                    let result = self.invoke(closure, arguments, pipe);
                    let output = pipe.end_capture();
                    result?;
                    Ok(output.into())
                }
                (receiver, name) => builtin::call_method(receiver, name, arguments),
            },
            Value::Undefined(name) => Err(error_undefined(name)),
            other => Err(error_type(format!(
                "`{}` object is not callable",
                other.type_name()
            ))),
        }
    }
}

/// Return a function that attaches the location of the region to an
/// [`Error`].
fn at(template: &Template, region: Region) -> impl FnOnce(Error) -> Error + '_ {
    move |error| error.located(&template.location(region))
}

fn expect_template(callee: &Value) -> Result<&Closure, Error> {
    match callee {
        Value::Template(closure) => Ok(closure),
        Value::Undefined(name) => Err(error_undefined(name)),
        other => Err(error_type(format!(
            "`render` requires a template, not `{}`",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{compile, Builder, Whitespace};

    fn renders(source: &str) -> String {
        compile(source).unwrap().renders(Arguments::new()).unwrap()
    }

    fn renders_in(whitespace: Whitespace, source: &str) -> String {
        let engine = Engine::new(Builder::new().with_whitespace(whitespace));
        let template = engine.compile(source).unwrap();

        engine.renders(&template, Arguments::new()).unwrap()
    }

    #[test]
    fn test_render_text_and_print() {
        assert_eq!(renders("hello, <?print 'taylor'?>!"), "hello, taylor!");
        assert_eq!(renders("<?print None?><?print undefined_name?>."), ".");
        assert_eq!(renders("<?printx '<a & b>'?>"), "&lt;a &amp; b&gt;");
    }

    #[test]
    fn test_render_for_leaks() {
        let source = "<?for x in range(5)?><?code y=x?><?end for?><?print x?>;<?print y?>";

        assert_eq!(renders(source), "4;4");
    }

    #[test]
    fn test_render_comprehension_does_not_leak() {
        let source = "<?code l = [2*i for i in range(4)]?><?print l?>;<?print isundefined(i)?>";

        assert_eq!(renders(source), "[0, 2, 4, 6];True");
    }

    #[test]
    fn test_render_closure_sees_later_changes() {
        let source = "<?code i=1?><?def x?><?print i?><?end def?><?code i=2?><?render x()?>";

        assert_eq!(renders(source), "2");
    }

    #[test]
    fn test_render_shared_default() {
        let source = "<?def f(x=[])?><?code x.append(1)?><?return x?><?end def?>\
                      <?code a = f()?><?code b = f()?><?print a is b?> <?print len(b)?>";

        assert_eq!(renders(source), "True 2");
    }

    #[test]
    fn test_render_smart_whitespace() {
        assert_eq!(
            renders_in(Whitespace::Smart, "<?if True?>\nTrue\n<?end if?>\n"),
            "True\n"
        );
        assert_eq!(
            renders_in(Whitespace::Smart, "x<?if True?>\nTrue\n<?end if?>\n"),
            "x\nTrue\n"
        );
    }

    #[test]
    fn test_render_strip_whitespace() {
        assert_eq!(
            renders_in(Whitespace::Strip, "g\t\n\t u \n  r\n\t\tk"),
            "g\tu rk"
        );
    }

    #[test]
    fn test_render_reuse_indent() {
        let source = "<?whitespace smart?><?def line?>\n\
                      <?print 'a'?>\n\
                      b\n\
                      <?end def?>\n\
                      \t<?render line()?>\n";

        assert_eq!(renders(source), "\ta\n\tb\n");
    }

    #[test]
    fn test_render_loops() {
        let source = "<?code i = 0?><?while True?><?code i += 1?>\
                      <?if i == 2?><?continue?><?end if?>\
                      <?if i > 4?><?break?><?end if?><?print i?><?end while?>";

        assert_eq!(renders(source), "134");
        assert_eq!(
            renders("<?for (a, (b, c)) in [[1, [2, 3]]]?><?print a + b + c?><?end for?>"),
            "6"
        );
    }

    #[test]
    fn test_render_unpack_mismatch() {
        let template = compile("<?code (a, b) = [1, 2, 3]?>").unwrap();
        let error = template.renders(Arguments::new()).unwrap_err();

        assert_eq!(error.kind(), ErrorKind::Value);
    }

    #[test]
    fn test_render_boolean_operators() {
        assert_eq!(renders("<?print 0 or 'b'?>|<?print 1 and 'c'?>|<?print not []?>"), "b|c|True");
        assert_eq!(renders("<?print 'a' if x else 'b'?>"), "b");
    }

    #[test]
    fn test_render_renderx_escapes() {
        let source = "<?def t?><b><?end def?><?renderx t()?>|<?render t()?>";

        assert_eq!(renders(source), "&lt;b&gt;|<b>");
    }

    #[test]
    fn test_render_renderblock() {
        let source = "<?def box(content)?>[<?render content()?>]<?end def?>\
                      <?code who = 'you'?>\
                      <?renderblock box()?>hi <?print who?><?end renderblock?>";

        assert_eq!(renders(source), "[hi you]");
    }

    #[test]
    fn test_render_renderblocks() {
        let source = "<?def page(title, body)?><?render title()?>:<?render body()?><?end def?>\
                      <?renderblocks page()?>\
                      <?def title?>T<?end def?>\
                      <?def body?>B<?end def?>\
                      <?end renderblocks?>";

        assert_eq!(renders(source), "T:B");
    }

    #[test]
    fn test_render_renderblocks_passes_only_defs() {
        let source = "<?def page(a)?><?render a()?><?end def?>\
                      <?renderblocks page()?>\
                      <?code n = 1?>\
                      <?def a?>A<?print n?><?end def?>\
                      <?end renderblocks?>";

        assert_eq!(renders(source), "A1");
    }

    #[test]
    fn test_render_template_methods() {
        let source = "<?def t(x)?><?print x?><?return x * 2?><?end def?>\
                      <?print t(2)?>|<?print t.renders(x=3)?>|<?code t.render(4)?>|<?print t.name?>";

        assert_eq!(renders(source), "4|3|4|t");
    }

    #[test]
    fn test_render_error_chain() {
        let source = "<?def inner?><?print 1 / 0?><?end def?><?def outer?><?render inner()?><?end def?>\n<?render outer()?>";
        let template = compile(source).unwrap();
        let error = template.renders(Arguments::new()).unwrap_err();
        let snippets: Vec<_> = error
            .chain()
            .map(|error| error.location().map(|l| l.snippet().to_string()))
            .collect();

        assert_eq!(error.kind(), ErrorKind::ZeroDivision);
        assert_eq!(
            snippets,
            vec![
                Some("<?render outer()?>".to_string()),
                Some("<?render inner()?>".to_string()),
                Some("<?print 1 / 0?>".to_string()),
            ]
        );
        assert_eq!(error.chain().last().and_then(|e| e.location()).map(|l| l.line()), Some(1));
        assert_eq!(error.location().map(|l| l.line()), Some(2));
    }

    #[test]
    fn test_render_recursion_limit() {
        let engine = Engine::default().with_recursion_limit(20);
        let template = engine
            .compile("<?def f(n)?><?return f(n + 1)?><?end def?><?print f(0)?>")
            .unwrap();
        let error = engine.renders(&template, Arguments::new()).unwrap_err();

        assert_eq!(error.root().kind(), ErrorKind::Recursion);
    }

    #[test]
    fn test_render_interrupt() {
        let engine = Engine::default().with_interrupt(|| true);
        let template = engine.compile("<?while True?><?end while?>").unwrap();
        let error = engine.renders(&template, Arguments::new()).unwrap_err();

        assert_eq!(error.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn test_render_signature_errors() {
        let template = compile("<?ul4 t(x)?><?print x?>").unwrap();

        assert_eq!(
            template.renders(Arguments::new()).unwrap_err().kind(),
            ErrorKind::MissingArgument
        );
        assert_eq!(
            compile("<?print y?>")
                .unwrap()
                .renders(Arguments::new().arg(1))
                .unwrap_err()
                .kind(),
            ErrorKind::TooManyArguments
        );
    }
}
