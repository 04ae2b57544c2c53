use crate::ast::*;
use crate::diagnostic::{Diagnostic, ErrorKind};
use crate::lexeme::Lexeme;
use crate::span::{Span, Spanned};

/// Recursive descent parser over the token stream.
///
/// Choices are ordered the way the grammar requires: two-character
/// operators are already resolved by the lexer, `VarDef ";"` is tried
/// before `VarDecl` (semicolon vs `=` after `TypeName Ident`), and a call
/// is tried before a plain atom inside a factor (`(`-lookahead). The first
/// error aborts the parse; there is no partial tree.
pub struct Parser {
    tokens: Vec<Spanned<Lexeme>>,
    pos: usize,
    diagnostics: Vec<Diagnostic>,
}

impl Parser {
    pub fn new(tokens: Vec<Spanned<Lexeme>>) -> Self {
        Self {
            tokens,
            pos: 0,
            diagnostics: Vec::new(),
        }
    }

    pub fn parse_program(mut self) -> Result<Node, Vec<Diagnostic>> {
        let mut children = Vec::new();

        if self.at(&Lexeme::Eof) {
            self.error_with_help(
                "expected a function or type declaration",
                "a Marklar program is one or more function definitions, e.g. `i32 main() { return 0; }`",
            );
            return Err(self.diagnostics);
        }

        while !self.at(&Lexeme::Eof) && !self.failed() {
            if self.at(&Lexeme::Type) {
                children.push(self.parse_user_type());
            } else {
                children.push(self.parse_function());
            }
        }

        if self.failed() {
            return Err(self.diagnostics);
        }
        Ok(Node::Program(children))
    }

    /// `type Name { i32 field; ... }`
    fn parse_user_type(&mut self) -> Node {
        self.expect(&Lexeme::Type);
        let name = self.expect_ident();
        self.expect(&Lexeme::LBrace);
        let mut fields = Vec::new();
        while !self.at(&Lexeme::RBrace) && !self.at(&Lexeme::Eof) && !self.failed() {
            fields.push(self.parse_var_def());
            self.expect(&Lexeme::Semicolon);
        }
        self.expect(&Lexeme::RBrace);
        Node::UserType(TypeDef { name, fields })
    }

    /// `TypeName Ident ( VarDef, ... ) { Stmt* }`
    fn parse_function(&mut self) -> Node {
        let return_type = self.expect_type_name();
        let name = self.expect_ident();
        self.expect(&Lexeme::LParen);
        let mut params = Vec::new();
        while !self.at(&Lexeme::RParen) && !self.at(&Lexeme::Eof) && !self.failed() {
            params.push(self.parse_var_def());
            if !self.eat(&Lexeme::Comma) {
                break;
            }
        }
        self.expect(&Lexeme::RParen);
        self.expect(&Lexeme::LBrace);
        let body = self.parse_stmts();
        self.expect(&Lexeme::RBrace);
        Node::Function(FnDef {
            return_type,
            name,
            params,
            body,
        })
    }

    fn parse_var_def(&mut self) -> VarDef {
        let type_name = self.expect_type_name();
        let name = self.expect_ident();
        VarDef { type_name, name }
    }

    fn parse_stmts(&mut self) -> Vec<Node> {
        let mut stmts = Vec::new();
        while !self.at(&Lexeme::RBrace) && !self.at(&Lexeme::Eof) && !self.failed() {
            stmts.push(self.parse_stmt());
        }
        stmts
    }

    fn parse_stmt(&mut self) -> Node {
        match self.peek().clone() {
            // A lone integer literal is a valid (no-op) statement
            Lexeme::Integer(text) => {
                self.advance();
                Node::Ident(text)
            }
            Lexeme::Return => self.parse_return(),
            Lexeme::If => self.parse_if(),
            Lexeme::While => self.parse_while(),
            Lexeme::Ident(_) => match self.peek_ahead(1) {
                // Call statement: `f(...)`;
                Lexeme::LParen => {
                    let call = self.parse_call();
                    self.expect(&Lexeme::Semicolon);
                    call
                }
                // Definition or declaration: `TypeName Ident` then ';' or '='
                Lexeme::Ident(_) => self.parse_def_or_decl(),
                // Assignment: `name = expr;`
                Lexeme::Assign => self.parse_assign(),
                _ => {
                    self.error_with_help(
                        &format!("unexpected {} after identifier", self.peek_ahead(1).description()),
                        "statements are declarations, assignments, calls, if, while, or return",
                    );
                    self.advance();
                    Node::Ident("_error_".to_string())
                }
            },
            _ => {
                self.error_with_help(
                    &format!("expected statement, found {}", self.peek().description()),
                    "statements are declarations, assignments, calls, if, while, or return",
                );
                self.advance();
                Node::Ident("_error_".to_string())
            }
        }
    }

    /// `TypeName Ident ;` is a definition; `TypeName Ident = init ;` is a
    /// declaration. The definition form is tried first.
    fn parse_def_or_decl(&mut self) -> Node {
        let type_name = self.expect_type_name();
        let name = self.expect_ident();
        if self.eat(&Lexeme::Semicolon) {
            return Node::Definition(VarDef { type_name, name });
        }
        if self.eat(&Lexeme::Assign) {
            let init = self.parse_op_expr();
            self.expect(&Lexeme::Semicolon);
            return Node::Declaration(VarDecl {
                type_name,
                name,
                init: Some(Box::new(init)),
            });
        }
        self.error_with_help(
            &format!("expected ';' or '=', found {}", self.peek().description()),
            "a variable is declared as `i32 name;` or `i32 name = value;`",
        );
        Node::Declaration(VarDecl {
            type_name,
            name,
            init: None,
        })
    }

    fn parse_assign(&mut self) -> Node {
        let name = self.expect_ident();
        self.expect(&Lexeme::Assign);
        let rhs = self.parse_op_expr();
        self.expect(&Lexeme::Semicolon);
        Node::Assignment(Assign {
            name,
            rhs: Box::new(rhs),
        })
    }

    fn parse_return(&mut self) -> Node {
        self.expect(&Lexeme::Return);
        let value = self.parse_op_expr();
        self.expect(&Lexeme::Semicolon);
        Node::Return(Box::new(value))
    }

    fn parse_if(&mut self) -> Node {
        self.expect(&Lexeme::If);
        self.expect(&Lexeme::LParen);
        let cond = self.parse_op_chain();
        self.expect(&Lexeme::RParen);
        self.expect(&Lexeme::LBrace);
        let then_body = self.parse_stmts();
        self.expect(&Lexeme::RBrace);
        let else_body = if self.eat(&Lexeme::Else) {
            self.expect(&Lexeme::LBrace);
            let body = self.parse_stmts();
            self.expect(&Lexeme::RBrace);
            body
        } else {
            Vec::new()
        };
        Node::If(IfStmt {
            cond,
            then_body,
            else_body,
        })
    }

    fn parse_while(&mut self) -> Node {
        self.expect(&Lexeme::While);
        self.expect(&Lexeme::LParen);
        let cond = self.parse_op_chain();
        self.expect(&Lexeme::RParen);
        self.expect(&Lexeme::LBrace);
        let body = self.parse_stmts();
        self.expect(&Lexeme::RBrace);
        Node::While(WhileLoop { cond, body })
    }

    // --- Expression parsing ---

    /// `Factor (Op Factor)*` as a raw chain. Deliberately flat: every
    /// operator has the same precedence and the chain folds left to right.
    fn parse_op_chain(&mut self) -> OpChain {
        let lhs = self.parse_factor();
        let mut ops = Vec::new();
        while let Some(op) = self.peek().op_str() {
            self.advance();
            let rhs = self.parse_factor();
            ops.push(Operation {
                op: op.to_string(),
                rhs,
            });
        }
        OpChain {
            lhs: Box::new(lhs),
            ops,
        }
    }

    /// Like `parse_op_chain`, but a chain with no operators collapses to
    /// its single factor.
    fn parse_op_expr(&mut self) -> Node {
        let chain = self.parse_op_chain();
        if chain.ops.is_empty() {
            *chain.lhs
        } else {
            Node::BinaryOp(chain)
        }
    }

    /// `( OpExpr )` | Call | Atom | QuotedString. Call comes before atom, so
    /// `f(x)` is not taken as the variable `f`.
    fn parse_factor(&mut self) -> Node {
        match self.peek().clone() {
            Lexeme::LParen => {
                self.advance();
                let inner = self.parse_op_expr();
                self.expect(&Lexeme::RParen);
                inner
            }
            Lexeme::Ident(name) => {
                if self.peek_ahead(1) == &Lexeme::LParen {
                    self.parse_call()
                } else {
                    self.advance();
                    Node::Ident(name)
                }
            }
            Lexeme::Integer(text) => {
                self.advance();
                Node::Ident(text)
            }
            Lexeme::Str(text) => {
                self.advance();
                Node::Ident(text)
            }
            _ => {
                self.error_with_help(
                    &format!("expected expression, found {}", self.peek().description()),
                    "expressions are literals, variables, calls, and operator chains",
                );
                self.advance();
                Node::Ident("_error_".to_string())
            }
        }
    }

    fn parse_call(&mut self) -> Node {
        let callee = self.expect_ident();
        self.expect(&Lexeme::LParen);
        let mut args = Vec::new();
        while !self.at(&Lexeme::RParen) && !self.at(&Lexeme::Eof) && !self.failed() {
            args.push(self.parse_op_expr());
            if !self.eat(&Lexeme::Comma) {
                break;
            }
        }
        self.expect(&Lexeme::RParen);
        Node::Call(CallExpr { callee, args })
    }

    // --- Utility methods ---

    fn peek(&self) -> &Lexeme {
        &self.tokens[self.pos].node
    }

    fn peek_ahead(&self, n: usize) -> &Lexeme {
        match self.tokens.get(self.pos + n) {
            Some(tok) => &tok.node,
            None => &Lexeme::Eof,
        }
    }

    fn current_span(&self) -> Span {
        self.tokens[self.pos].span
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
    }

    fn at(&self, token: &Lexeme) -> bool {
        std::mem::discriminant(self.peek()) == std::mem::discriminant(token)
    }

    fn eat(&mut self, token: &Lexeme) -> bool {
        if self.at(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Lexeme) {
        if self.at(token) {
            self.advance();
        } else {
            self.error_at_current(&format!(
                "expected {}, found {}",
                token.description(),
                self.peek().description()
            ));
        }
    }

    fn expect_ident(&mut self) -> String {
        if let Lexeme::Ident(name) = self.peek().clone() {
            self.advance();
            name
        } else {
            self.error_at_current(&format!(
                "expected identifier, found {}",
                self.peek().description()
            ));
            "_error_".to_string()
        }
    }

    /// Type names admit letters, digits, and underscores only, without
    /// apostrophes, unlike plain identifiers.
    fn expect_type_name(&mut self) -> String {
        if let Lexeme::Ident(name) = self.peek().clone() {
            if name.contains('\'') {
                self.error_with_help(
                    &format!("'{}' is not a valid type name", name),
                    "type names use only letters, digits, and underscores",
                );
            }
            self.advance();
            name
        } else {
            self.error_at_current(&format!(
                "expected type name, found {}",
                self.peek().description()
            ));
            "_error_".to_string()
        }
    }

    fn failed(&self) -> bool {
        !self.diagnostics.is_empty()
    }

    fn error_at_current(&mut self, msg: &str) {
        self.diagnostics
            .push(Diagnostic::error(ErrorKind::Parse, msg).with_span(self.current_span()));
    }

    fn error_with_help(&mut self, msg: &str, help: &str) {
        self.diagnostics.push(
            Diagnostic::error(ErrorKind::Parse, msg)
                .with_span(self.current_span())
                .with_help(help),
        );
    }
}
