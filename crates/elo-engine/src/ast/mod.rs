//! Abstract Syntax Tree definitions.
//!
//! The node set is closed: the code generator matches exhaustively over
//! [`StatementKind`] and [`ExpressionKind`]. Every node carries the source
//! line it starts on.

/// A complete program.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    /// The top-level statements
    pub body: Vec<Statement>,
}

/// A statement with its source line.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// What kind of statement this is
    pub kind: StatementKind,
    /// Source line (1-based)
    pub line: u32,
}

impl Statement {
    /// Creates a statement.
    pub fn new(kind: StatementKind, line: u32) -> Self {
        Self { kind, line }
    }
}

/// The statement kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum StatementKind {
    /// Expression evaluated for its effects
    Expression(Expression),
    /// `var`, `const` or `:=` declaration
    Declaration(Declaration),
    /// Plain or compound assignment
    Assignment(Assignment),
    /// Named function declaration
    Function(FunctionLiteral),
    /// `break` or `continue`
    Branch(BranchKind),
    /// `return` with zero or more values
    Return(Vec<Expression>),
    /// If statement
    If(IfStatement),
    /// Three-clause, conditional or infinite for loop
    For(ForStatement),
    /// `for key, value in collection` loop
    ForIn(ForInStatement),
    /// Nested `{ ... }` block
    Block(Block),
}

/// A braced statement list.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block {
    /// The statements
    pub statements: Vec<Statement>,
}

/// Declaration flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclarationKind {
    /// `var a, b = ...`
    Var,
    /// `const a = ...`
    Const,
    /// `a, b := ...`
    Short,
}

/// A declaration of one or more names.
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    /// The declaration flavor
    pub kind: DeclarationKind,
    /// Declared names, left to right
    pub names: Vec<String>,
    /// Initializers (may be fewer than names)
    pub values: Vec<Expression>,
}

/// Assignment operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOperator {
    /// `=`
    Assign,
    /// `+=`, `-=`, ... carrying the underlying binary operator
    Compound(BinaryOperator),
}

/// An assignment to one or more targets.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    /// The operator
    pub operator: AssignOperator,
    /// Assignment targets
    pub targets: Vec<Expression>,
    /// Values (may be fewer than targets)
    pub values: Vec<Expression>,
}

/// `break` or `continue`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchKind {
    /// break
    Break,
    /// continue
    Continue,
}

impl BranchKind {
    /// The keyword.
    pub fn keyword(self) -> &'static str {
        match self {
            BranchKind::Break => "break",
            BranchKind::Continue => "continue",
        }
    }
}

/// An if statement.
#[derive(Debug, Clone, PartialEq)]
pub struct IfStatement {
    /// Optional init statement (`if x := f(); x > 0 { }`)
    pub init: Option<Box<Statement>>,
    /// The condition
    pub condition: Expression,
    /// Taken when the condition is truthy
    pub then_branch: Block,
    /// Either a block or a chained if statement
    pub else_branch: Option<Box<Statement>>,
}

/// A for loop with optional init, condition and step.
#[derive(Debug, Clone, PartialEq)]
pub struct ForStatement {
    /// Runs once before the loop
    pub init: Option<Box<Statement>>,
    /// Tested before each iteration; absent means forever
    pub condition: Option<Expression>,
    /// Runs after each iteration
    pub step: Option<Box<Statement>>,
    /// The loop body
    pub body: Block,
}

/// A for-in loop.
#[derive(Debug, Clone, PartialEq)]
pub struct ForInStatement {
    /// First loop variable. With a single name it receives the value.
    pub key: String,
    /// Second loop variable, receiving the value
    pub value: Option<String>,
    /// The collection iterated over
    pub collection: Expression,
    /// The loop body
    pub body: Block,
}

/// Name of a function declaration.
#[derive(Debug, Clone, PartialEq)]
pub enum FunctionName {
    /// `func name()` declares a local
    Simple(String),
    /// `func a.b.c()` assigns into the selector target
    Path(Box<Expression>),
}

/// A function literal or declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionLiteral {
    /// Present for declarations
    pub name: Option<FunctionName>,
    /// Parameter names
    pub params: Vec<String>,
    /// The body; `=> exprs` bodies are a single return statement
    pub body: Block,
}

impl FunctionLiteral {
    /// The name recorded on the compiled prototype.
    pub fn display_name(&self) -> Option<String> {
        match &self.name {
            Some(FunctionName::Simple(name)) => Some(name.clone()),
            Some(FunctionName::Path(path)) => Some(path.dotted_name()),
            None => None,
        }
    }
}

/// An expression with its source line.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    /// What kind of expression this is
    pub kind: ExpressionKind,
    /// Source line (1-based)
    pub line: u32,
}

impl Expression {
    /// Creates an expression.
    pub fn new(kind: ExpressionKind, line: u32) -> Self {
        Self { kind, line }
    }

    /// True for calls and spreads, which can produce several values.
    pub fn is_multi_value(&self) -> bool {
        matches!(
            self.kind,
            ExpressionKind::Call(_) | ExpressionKind::Spread(_)
        )
    }

    /// True if the expression can appear on the left of `=`.
    pub fn is_assignable(&self) -> bool {
        matches!(
            self.kind,
            ExpressionKind::Identifier(_)
                | ExpressionKind::Selector(_)
                | ExpressionKind::Subscript(_)
        )
    }

    /// Renders `a.b.c` style paths; other shapes render as `?`.
    pub fn dotted_name(&self) -> String {
        match &self.kind {
            ExpressionKind::Identifier(name) => name.clone(),
            ExpressionKind::Selector(sel) => format!("{}.{}", sel.object.dotted_name(), sel.field),
            _ => "?".to_string(),
        }
    }
}

/// The expression kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionKind {
    /// nil
    Nil,
    /// true / false
    Bool(bool),
    /// Number literal
    Number(f64),
    /// String literal
    String(String),
    /// Name reference
    Identifier(String),
    /// `[a, b, c]`
    Array(Vec<Expression>),
    /// `{key: value}`
    Object(Vec<ObjectField>),
    /// Function literal
    Function(Box<FunctionLiteral>),
    /// `object.field`
    Selector(SelectorExpression),
    /// `object[index]`
    Subscript(SubscriptExpression),
    /// `callee(args)`
    Call(CallExpression),
    /// `-x`, `!x`, `~x`
    Unary(UnaryExpression),
    /// `x++`, `--x`
    Update(UpdateExpression),
    /// `a op b`
    Binary(BinaryExpression),
    /// `cond ? a : b`
    Ternary(TernaryExpression),
    /// `xs...`
    Spread(Box<Expression>),
}

/// One `key: value` entry of an object literal.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectField {
    /// Field name
    pub key: String,
    /// Field value
    pub value: Expression,
}

/// Field selection.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectorExpression {
    /// The selected-from expression
    pub object: Box<Expression>,
    /// The field name
    pub field: String,
}

/// Indexing.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptExpression {
    /// The indexed expression
    pub object: Box<Expression>,
    /// The index
    pub index: Box<Expression>,
}

/// A call.
#[derive(Debug, Clone, PartialEq)]
pub struct CallExpression {
    /// The called expression; a selector makes this a method call
    pub callee: Box<Expression>,
    /// Arguments
    pub args: Vec<Expression>,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    /// -
    Minus,
    /// ! and not
    Not,
    /// ~
    Complement,
}

/// A unary expression.
#[derive(Debug, Clone, PartialEq)]
pub struct UnaryExpression {
    /// The operator
    pub operator: UnaryOperator,
    /// The operand
    pub operand: Box<Expression>,
}

/// Increment or decrement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOperator {
    /// ++
    Increment,
    /// --
    Decrement,
}

/// `x++`, `x--`, `++x`, `--x`.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateExpression {
    /// The operator
    pub operator: UpdateOperator,
    /// True for `++x`: the expression yields the new value
    pub prefix: bool,
    /// The updated target
    pub target: Box<Expression>,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    /// +
    Add,
    /// -
    Sub,
    /// *
    Mul,
    /// /
    Div,
    /// %
    Mod,
    /// **
    Pow,
    /// <<
    Shl,
    /// >>
    Shr,
    /// &
    BitAnd,
    /// |
    BitOr,
    /// ^
    BitXor,
    /// <
    Lt,
    /// <=
    Le,
    /// >
    Gt,
    /// >=
    Ge,
    /// ==
    Eq,
    /// !=
    Ne,
    /// &&
    And,
    /// ||
    Or,
}

impl BinaryOperator {
    /// The operator's source spelling.
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
            BinaryOperator::Mod => "%",
            BinaryOperator::Pow => "**",
            BinaryOperator::Shl => "<<",
            BinaryOperator::Shr => ">>",
            BinaryOperator::BitAnd => "&",
            BinaryOperator::BitOr => "|",
            BinaryOperator::BitXor => "^",
            BinaryOperator::Lt => "<",
            BinaryOperator::Le => "<=",
            BinaryOperator::Gt => ">",
            BinaryOperator::Ge => ">=",
            BinaryOperator::Eq => "==",
            BinaryOperator::Ne => "!=",
            BinaryOperator::And => "&&",
            BinaryOperator::Or => "||",
        }
    }
}

/// A binary expression.
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryExpression {
    /// The operator
    pub operator: BinaryOperator,
    /// Left operand
    pub left: Box<Expression>,
    /// Right operand
    pub right: Box<Expression>,
}

/// `condition ? then_value : else_value`.
#[derive(Debug, Clone, PartialEq)]
pub struct TernaryExpression {
    /// The condition
    pub condition: Box<Expression>,
    /// Value when truthy
    pub then_value: Box<Expression>,
    /// Value when falsy
    pub else_value: Box<Expression>,
}
