//! The Abstract Syntax Tree.
//!
//! Every node carries the [`Region`] of the source it was parsed from. Block
//! nodes additionally carry the region of their opening tag, which is where
//! errors raised by the tag itself are reported.
use crate::{
    compile::{Operator, Template},
    region::Region,
    value::Value,
};
use std::sync::Arc;

/// A node in the content of a template.
#[derive(Debug, Clone)]
pub enum Node {
    /// Literal text, as left by whitespace handling.
    Text(Text),
    /// `<?print x?>`
    Print(Output),
    /// `<?printx x?>`
    PrintX(Output),
    /// `<?code f(x)?>`
    Expression(Output),
    /// `<?code x = y?>`
    SetVar(SetVar),
    /// `<?code x += y?>` and the other augmented assignments.
    ChangeVar(ChangeVar),
    If(If),
    For(For),
    While(While),
    Def(Def),
    Return(Output),
    Break(Region),
    Continue(Region),
    /// `<?render x()?>` or `<?renderx x()?>`
    Render(Render),
    RenderBlock(RenderBlock),
    RenderBlocks(RenderBlocks),
}

impl Node {
    /// Return the name of the node kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Node::Text(_) => "text",
            Node::Print(_) => "print",
            Node::PrintX(_) => "printx",
            Node::Expression(_) => "expr",
            Node::SetVar(_) => "setvar",
            Node::ChangeVar(change) => match change.operator {
                Operator::Add => "addvar",
                Operator::Subtract => "subvar",
                Operator::Multiply => "mulvar",
                Operator::TrueDivide => "truedivvar",
                Operator::FloorDivide => "floordivvar",
                Operator::Modulo => "modvar",
                Operator::ShiftLeft => "shiftleftvar",
                Operator::ShiftRight => "shiftrightvar",
                Operator::BitAnd => "bitandvar",
                Operator::BitXor => "bitxorvar",
                Operator::BitOr => "bitorvar",
                _ => "changevar",
            },
            Node::If(_) => "if",
            Node::For(_) => "for",
            Node::While(_) => "while",
            Node::Def(_) => "def",
            Node::Return(_) => "return",
            Node::Break(_) => "break",
            Node::Continue(_) => "continue",
            Node::Render(render) if render.escape => "renderx",
            Node::Render(_) => "render",
            Node::RenderBlock(_) => "renderblock",
            Node::RenderBlocks(_) => "renderblocks",
        }
    }

    /// Return the [`Region`] covered by the node.
    ///
    /// For blocks this spans from the opening tag to the closing tag.
    pub fn region(&self) -> Region {
        match self {
            Node::Text(text) => text.region,
            Node::Print(output)
            | Node::PrintX(output)
            | Node::Expression(output)
            | Node::Return(output) => output.region,
            Node::SetVar(set) => set.region,
            Node::ChangeVar(change) => change.region,
            Node::If(block) => block.region,
            Node::For(block) => block.region,
            Node::While(block) => block.region,
            Node::Def(block) => block.region,
            Node::Break(region) | Node::Continue(region) => *region,
            Node::Render(render) => render.region,
            Node::RenderBlock(block) => block.region,
            Node::RenderBlocks(block) => block.region,
        }
    }
}

/// Literal text.
#[derive(Debug, Clone)]
pub struct Text {
    /// The text that is written when rendering.
    pub text: String,
    pub region: Region,
}

/// A tag holding a single expression.
#[derive(Debug, Clone)]
pub struct Output {
    pub expression: Expression,
    /// The whole tag.
    pub region: Region,
}

/// Plain assignment.
#[derive(Debug, Clone)]
pub struct SetVar {
    pub target: Lvalue,
    pub value: Expression,
    pub region: Region,
}

/// Augmented assignment, like `x += 1`.
#[derive(Debug, Clone)]
pub struct ChangeVar {
    pub operator: Operator,
    pub target: Lvalue,
    pub value: Expression,
    pub region: Region,
}

/// An `if`/`elif`/`else` chain.
#[derive(Debug, Clone)]
pub struct If {
    /// The `if` branch followed by every `elif` branch.
    pub branches: Vec<Branch>,
    /// The content of the `else` branch.
    pub otherwise: Option<Vec<Node>>,
    pub region: Region,
}

/// One conditional branch of an [`If`].
#[derive(Debug, Clone)]
pub struct Branch {
    pub condition: Expression,
    pub body: Vec<Node>,
    /// The `if` or `elif` tag.
    pub tag: Region,
}

/// A `for` loop.
#[derive(Debug, Clone)]
pub struct For {
    pub target: Lvalue,
    pub iterable: Expression,
    pub body: Vec<Node>,
    pub tag: Region,
    pub region: Region,
}

/// A `while` loop.
#[derive(Debug, Clone)]
pub struct While {
    pub condition: Expression,
    pub body: Vec<Node>,
    pub tag: Region,
    pub region: Region,
}

/// A local template definition.
///
/// The template is bound to its name when the node executes.
#[derive(Debug, Clone)]
pub struct Def {
    pub template: Arc<Template>,
    pub tag: Region,
    pub region: Region,
}

/// Render the result of a call into the output.
#[derive(Debug, Clone)]
pub struct Render {
    pub call: Call,
    /// True for `renderx`, which escapes the output of the callee.
    pub escape: bool,
    /// Indentation removed from the line of the tag, written again in front
    /// of every line of output.
    pub indent: Option<String>,
    pub region: Region,
}

/// Render a call, passing the block content as the `content` argument.
#[derive(Debug, Clone)]
pub struct RenderBlock {
    pub call: Call,
    pub content: Arc<Template>,
    pub indent: Option<String>,
    pub tag: Region,
    pub region: Region,
}

/// Render a call, passing every variable defined by the block content as a
/// keyword argument.
#[derive(Debug, Clone)]
pub struct RenderBlocks {
    pub call: Call,
    pub body: Vec<Node>,
    pub indent: Option<String>,
    pub tag: Region,
    pub region: Region,
}

/// An expression, which evaluates to a value.
///
/// Each operator has its own variant, so a tree can always report exactly
/// what it holds.
#[derive(Debug, Clone)]
pub enum Expression {
    /// A literal.
    Const(Const),
    /// A variable reference.
    Var(Var),
    List(Container<Item>),
    Set(Container<Item>),
    Dict(Container<DictItem>),
    ListComp(Box<Comprehension>),
    SetComp(Box<Comprehension>),
    GenExpr(Box<Comprehension>),
    DictComp(Box<DictComprehension>),
    /// `x.name`
    Attr(Box<Attr>),
    /// `x[y]`
    Item(Box<Binary>),
    /// `x[a:b]`
    Slice(Box<Slice>),
    Call(Box<Call>),
    Not(Box<Unary>),
    Neg(Box<Unary>),
    BitNot(Box<Unary>),
    Add(Box<Binary>),
    Sub(Box<Binary>),
    Mul(Box<Binary>),
    TrueDiv(Box<Binary>),
    FloorDiv(Box<Binary>),
    Mod(Box<Binary>),
    ShiftLeft(Box<Binary>),
    ShiftRight(Box<Binary>),
    BitAnd(Box<Binary>),
    BitXor(Box<Binary>),
    BitOr(Box<Binary>),
    Eq(Box<Binary>),
    Ne(Box<Binary>),
    Lt(Box<Binary>),
    Le(Box<Binary>),
    Gt(Box<Binary>),
    Ge(Box<Binary>),
    Contains(Box<Binary>),
    NotContains(Box<Binary>),
    Is(Box<Binary>),
    IsNot(Box<Binary>),
    And(Box<Binary>),
    Or(Box<Binary>),
    /// `a if condition else b`
    If(Box<Conditional>),
}

impl Expression {
    /// Return the name of the expression kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Expression::Const(_) => "const",
            Expression::Var(_) => "var",
            Expression::List(_) => "list",
            Expression::Set(_) => "set",
            Expression::Dict(_) => "dict",
            Expression::ListComp(_) => "listcomp",
            Expression::SetComp(_) => "setcomp",
            Expression::GenExpr(_) => "genexpr",
            Expression::DictComp(_) => "dictcomp",
            Expression::Attr(_) => "attr",
            Expression::Item(_) => "item",
            Expression::Slice(_) => "slice",
            Expression::Call(_) => "call",
            Expression::Not(_) => "not",
            Expression::Neg(_) => "neg",
            Expression::BitNot(_) => "bitnot",
            Expression::Add(_) => "add",
            Expression::Sub(_) => "sub",
            Expression::Mul(_) => "mul",
            Expression::TrueDiv(_) => "truediv",
            Expression::FloorDiv(_) => "floordiv",
            Expression::Mod(_) => "mod",
            Expression::ShiftLeft(_) => "shiftleft",
            Expression::ShiftRight(_) => "shiftright",
            Expression::BitAnd(_) => "bitand",
            Expression::BitXor(_) => "bitxor",
            Expression::BitOr(_) => "bitor",
            Expression::Eq(_) => "eq",
            Expression::Ne(_) => "ne",
            Expression::Lt(_) => "lt",
            Expression::Le(_) => "le",
            Expression::Gt(_) => "gt",
            Expression::Ge(_) => "ge",
            Expression::Contains(_) => "contains",
            Expression::NotContains(_) => "notcontains",
            Expression::Is(_) => "is",
            Expression::IsNot(_) => "isnot",
            Expression::And(_) => "and",
            Expression::Or(_) => "or",
            Expression::If(_) => "if",
        }
    }

    /// Return the [`Region`] covered by the expression.
    pub fn region(&self) -> Region {
        match self {
            Expression::Const(constant) => constant.region,
            Expression::Var(var) => var.region,
            Expression::List(container) | Expression::Set(container) => container.region,
            Expression::Dict(container) => container.region,
            Expression::ListComp(comprehension)
            | Expression::SetComp(comprehension)
            | Expression::GenExpr(comprehension) => comprehension.region,
            Expression::DictComp(comprehension) => comprehension.region,
            Expression::Attr(attr) => attr.region,
            Expression::Slice(slice) => slice.region,
            Expression::Call(call) => call.region,
            Expression::Not(unary) | Expression::Neg(unary) | Expression::BitNot(unary) => {
                unary.region
            }
            Expression::If(conditional) => conditional.region,
            Expression::Item(binary)
            | Expression::Add(binary)
            | Expression::Sub(binary)
            | Expression::Mul(binary)
            | Expression::TrueDiv(binary)
            | Expression::FloorDiv(binary)
            | Expression::Mod(binary)
            | Expression::ShiftLeft(binary)
            | Expression::ShiftRight(binary)
            | Expression::BitAnd(binary)
            | Expression::BitXor(binary)
            | Expression::BitOr(binary)
            | Expression::Eq(binary)
            | Expression::Ne(binary)
            | Expression::Lt(binary)
            | Expression::Le(binary)
            | Expression::Gt(binary)
            | Expression::Ge(binary)
            | Expression::Contains(binary)
            | Expression::NotContains(binary)
            | Expression::Is(binary)
            | Expression::IsNot(binary)
            | Expression::And(binary)
            | Expression::Or(binary) => binary.region,
        }
    }

    /// Create the binary expression for the given [`Operator`].
    pub(crate) fn binary(operator: Operator, left: Expression, right: Expression) -> Self {
        let region = left.region().combine(right.region());
        let binary = Box::new(Binary {
            left,
            right,
            region,
        });

        match operator {
            Operator::Add => Expression::Add(binary),
            Operator::Subtract => Expression::Sub(binary),
            Operator::Multiply => Expression::Mul(binary),
            Operator::TrueDivide => Expression::TrueDiv(binary),
            Operator::FloorDivide => Expression::FloorDiv(binary),
            Operator::Modulo => Expression::Mod(binary),
            Operator::ShiftLeft => Expression::ShiftLeft(binary),
            Operator::ShiftRight => Expression::ShiftRight(binary),
            Operator::BitAnd => Expression::BitAnd(binary),
            Operator::BitXor => Expression::BitXor(binary),
            Operator::BitOr | Operator::BitNot => Expression::BitOr(binary),
            Operator::Equal => Expression::Eq(binary),
            Operator::NotEqual => Expression::Ne(binary),
            Operator::Lesser => Expression::Lt(binary),
            Operator::LesserOrEqual => Expression::Le(binary),
            Operator::Greater => Expression::Gt(binary),
            Operator::GreaterOrEqual => Expression::Ge(binary),
        }
    }
}

/// A literal value.
#[derive(Debug, Clone)]
pub struct Const {
    pub value: Value,
    pub region: Region,
}

/// A variable reference.
#[derive(Debug, Clone)]
pub struct Var {
    pub name: String,
    pub region: Region,
}

/// The items of a list, set or dict literal.
#[derive(Debug, Clone)]
pub struct Container<T> {
    pub items: Vec<T>,
    pub region: Region,
}

/// An item of a list or set literal.
#[derive(Debug, Clone)]
pub enum Item {
    /// `x`
    Value(Expression),
    /// `*x`
    Unpack(Expression),
}

/// An item of a dict literal.
#[derive(Debug, Clone)]
pub enum DictItem {
    /// `k: v`
    Pair(Expression, Expression),
    /// `**x`
    Unpack(Expression),
}

/// A list, set or generator comprehension.
#[derive(Debug, Clone)]
pub struct Comprehension {
    pub item: Expression,
    pub target: Lvalue,
    pub iterable: Expression,
    pub condition: Option<Expression>,
    pub region: Region,
}

/// A dict comprehension.
#[derive(Debug, Clone)]
pub struct DictComprehension {
    pub key: Expression,
    pub value: Expression,
    pub target: Lvalue,
    pub iterable: Expression,
    pub condition: Option<Expression>,
    pub region: Region,
}

/// Attribute access.
#[derive(Debug, Clone)]
pub struct Attr {
    pub object: Expression,
    pub name: String,
    pub region: Region,
}

/// A slice, either bound may be left out.
#[derive(Debug, Clone)]
pub struct Slice {
    pub object: Expression,
    pub start: Option<Expression>,
    pub stop: Option<Expression>,
    pub region: Region,
}

/// A call with its arguments.
#[derive(Debug, Clone)]
pub struct Call {
    pub callee: Expression,
    pub arguments: Vec<CallArgument>,
    pub region: Region,
}

/// One argument at a call site.
#[derive(Debug, Clone)]
pub enum CallArgument {
    /// `f(x)`
    Positional(Expression),
    /// `f(name=x)`
    Keyword(String, Expression),
    /// `f(*x)`
    Unpack(Expression),
    /// `f(**x)`
    UnpackMap(Expression),
}

#[derive(Debug, Clone)]
pub struct Unary {
    pub operand: Expression,
    pub region: Region,
}

#[derive(Debug, Clone)]
pub struct Binary {
    pub left: Expression,
    pub right: Expression,
    pub region: Region,
}

/// `value if condition else otherwise`
#[derive(Debug, Clone)]
pub struct Conditional {
    pub value: Expression,
    pub condition: Expression,
    pub otherwise: Expression,
    pub region: Region,
}

/// An assignment target.
#[derive(Debug, Clone)]
pub enum Lvalue {
    Var(Var),
    Attr(Box<Attr>),
    Item(Box<Binary>),
    /// Nested targets, as in `(a, (b, c))`.
    Unpack(Vec<Lvalue>, Region),
}

impl Lvalue {
    /// Return the [`Region`] covered by the target.
    pub fn region(&self) -> Region {
        match self {
            Lvalue::Var(var) => var.region,
            Lvalue::Attr(attr) => attr.region,
            Lvalue::Item(item) => item.region,
            Lvalue::Unpack(_, region) => *region,
        }
    }
}

/// A parsed signature, with its defaults still unevaluated.
#[derive(Debug, Clone, Default)]
pub struct SignatureTree {
    pub parameters: Vec<ParameterTree>,
    /// Name of the parameter collecting extra positional arguments.
    pub rest: Option<String>,
    /// Name of the parameter collecting extra keyword arguments.
    pub kwrest: Option<String>,
    /// The signature text, parentheses excluded.
    pub text: String,
    pub region: Region,
}

#[derive(Debug, Clone)]
pub struct ParameterTree {
    pub name: String,
    pub default: Option<Expression>,
}
