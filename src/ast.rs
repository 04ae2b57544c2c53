//! The Marklar syntax tree.
//!
//! A program is a strictly owned tree: `Node::Program` is the unique root
//! and every child has exactly one parent. `Ident` carries three textual
//! payloads behind one variant: plain identifiers, raw integer literal
//! text, and quoted string literals (surrounding quotes included). Which
//! one it is gets decided at lowering time, against the symbol table.

/// A parsed tree node.
#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    Ident(String),
    Program(Vec<Node>),
    Function(FnDef),
    Definition(VarDef),
    Declaration(VarDecl),
    Assignment(Assign),
    Return(Box<Node>),
    Call(CallExpr),
    If(IfStmt),
    While(WhileLoop),
    BinaryOp(OpChain),
    UserType(TypeDef),
}

/// A function definition: `i32 name(i32 a, i64 b) { ... }`.
#[derive(Clone, Debug, PartialEq)]
pub struct FnDef {
    pub return_type: String,
    pub name: String,
    pub params: Vec<VarDef>,
    pub body: Vec<Node>,
}

/// A name declared with a type and no initializer: `i32 a`.
#[derive(Clone, Debug, PartialEq)]
pub struct VarDef {
    pub type_name: String,
    pub name: String,
}

/// A declaration with an initializer: `i32 a = expr;`.
#[derive(Clone, Debug, PartialEq)]
pub struct VarDecl {
    pub type_name: String,
    pub name: String,
    pub init: Option<Box<Node>>,
}

/// `name = expr;`
#[derive(Clone, Debug, PartialEq)]
pub struct Assign {
    pub name: String,
    pub rhs: Box<Node>,
}

/// `callee(arg, arg, ...)`
#[derive(Clone, Debug, PartialEq)]
pub struct CallExpr {
    pub callee: String,
    pub args: Vec<Node>,
}

/// `if (cond) { ... } else { ... }`; the else body may be empty.
#[derive(Clone, Debug, PartialEq)]
pub struct IfStmt {
    pub cond: OpChain,
    pub then_body: Vec<Node>,
    pub else_body: Vec<Node>,
}

/// `while (cond) { ... }`
#[derive(Clone, Debug, PartialEq)]
pub struct WhileLoop {
    pub cond: OpChain,
    pub body: Vec<Node>,
}

/// A flat operator chain: `lhs op rhs op rhs ...`.
///
/// There is no precedence. Folding `ops` left to right is the contract:
/// `a + b * c` means `(a + b) * c`.
#[derive(Clone, Debug, PartialEq)]
pub struct OpChain {
    pub lhs: Box<Node>,
    pub ops: Vec<Operation>,
}

/// One `op rhs` step of a chain.
#[derive(Clone, Debug, PartialEq)]
pub struct Operation {
    pub op: String,
    pub rhs: Node,
}

/// `type Name { i32 field; ... }`; registered but not lowered to IR.
#[derive(Clone, Debug, PartialEq)]
pub struct TypeDef {
    pub name: String,
    pub fields: Vec<VarDef>,
}
