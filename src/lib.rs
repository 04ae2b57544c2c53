pub mod ast;
pub mod codegen;
pub mod diagnostic;
pub mod driver;
pub mod ir;
pub mod lexeme;
pub mod lexer;
pub mod parser;
pub mod span;
pub mod symbol;
pub mod types;

use diagnostic::Diagnostic;
use lexer::Lexer;
use parser::Parser;

/// Parse Marklar source text into its program root node.
pub fn parse_source(source: &str) -> Result<ast::Node, Vec<Diagnostic>> {
    let (tokens, lex_errors) = Lexer::new(source).tokenize();
    if !lex_errors.is_empty() {
        return Err(lex_errors);
    }
    Parser::new(tokens).parse_program()
}

/// Parse and lower a program to a verified IR module.
///
/// On success the accompanying diagnostics are warnings only.
pub fn compile_to_module(
    source: &str,
) -> Result<(ir::Module, Vec<Diagnostic>), Vec<Diagnostic>> {
    let root = parse_source(source)?;
    let mut module = ir::Module::new("marklar");
    let diagnostics = codegen::CodeGen::new(&mut module).lower_program(&root);
    if diagnostic::has_errors(&diagnostics) {
        return Err(diagnostics);
    }
    if let Err(msg) = ir::verify::verify_module(&module) {
        return Err(vec![Diagnostic::error(
            diagnostic::ErrorKind::Verifier,
            format!("failed to generate IR: {}", msg),
        )
        .with_note(module.dump())]);
    }
    Ok((module, diagnostics))
}
