/// All lexemes in the Marklar language.
#[derive(Clone, Debug, PartialEq)]
pub enum Lexeme {
    // Keywords
    Return,
    If,
    Else,
    While,
    Type,

    // Punctuation
    LParen,    // (
    RParen,    // )
    LBrace,    // {
    RBrace,    // }
    Semicolon, // ;
    Comma,     // ,
    Assign,    // =

    // Operators. Two-character forms are scanned before their
    // one-character prefixes (>> before >, == before =, and so on).
    Shr,    // >>
    Shl,    // <<
    Ge,     // >=
    Le,     // <=
    Ne,     // !=
    EqEq,   // ==
    OrOr,   // ||
    AndAnd, // &&
    Plus,   // +
    Minus,  // -
    Star,   // *
    Slash,  // /
    Percent, // %
    Lt,     // <
    Gt,     // >
    Amp,    // &

    // Literals
    Ident(String),
    /// Raw digit text; materialized as a 32-bit constant at lowering time.
    Integer(String),
    /// Quoted string literal, surrounding quotes included.
    Str(String),

    // End of file
    Eof,
}

impl Lexeme {
    /// Try to match an identifier string to a keyword lexeme.
    pub fn from_keyword(s: &str) -> Option<Lexeme> {
        match s {
            "return" => Some(Lexeme::Return),
            "if" => Some(Lexeme::If),
            "else" => Some(Lexeme::Else),
            "while" => Some(Lexeme::While),
            "type" => Some(Lexeme::Type),
            _ => None,
        }
    }

    /// The operator token text, for lexemes that are binary operators.
    pub fn op_str(&self) -> Option<&'static str> {
        match self {
            Lexeme::Shr => Some(">>"),
            Lexeme::Shl => Some("<<"),
            Lexeme::Ge => Some(">="),
            Lexeme::Le => Some("<="),
            Lexeme::Ne => Some("!="),
            Lexeme::EqEq => Some("=="),
            Lexeme::OrOr => Some("||"),
            Lexeme::AndAnd => Some("&&"),
            Lexeme::Plus => Some("+"),
            Lexeme::Minus => Some("-"),
            Lexeme::Star => Some("*"),
            Lexeme::Slash => Some("/"),
            Lexeme::Percent => Some("%"),
            Lexeme::Lt => Some("<"),
            Lexeme::Gt => Some(">"),
            Lexeme::Amp => Some("&"),
            _ => None,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Lexeme::Return => "'return'",
            Lexeme::If => "'if'",
            Lexeme::Else => "'else'",
            Lexeme::While => "'while'",
            Lexeme::Type => "'type'",
            Lexeme::LParen => "'('",
            Lexeme::RParen => "')'",
            Lexeme::LBrace => "'{'",
            Lexeme::RBrace => "'}'",
            Lexeme::Semicolon => "';'",
            Lexeme::Comma => "','",
            Lexeme::Assign => "'='",
            Lexeme::Shr => "'>>'",
            Lexeme::Shl => "'<<'",
            Lexeme::Ge => "'>='",
            Lexeme::Le => "'<='",
            Lexeme::Ne => "'!='",
            Lexeme::EqEq => "'=='",
            Lexeme::OrOr => "'||'",
            Lexeme::AndAnd => "'&&'",
            Lexeme::Plus => "'+'",
            Lexeme::Minus => "'-'",
            Lexeme::Star => "'*'",
            Lexeme::Slash => "'/'",
            Lexeme::Percent => "'%'",
            Lexeme::Lt => "'<'",
            Lexeme::Gt => "'>'",
            Lexeme::Amp => "'&'",
            Lexeme::Ident(_) => "identifier",
            Lexeme::Integer(_) => "integer literal",
            Lexeme::Str(_) => "string literal",
            Lexeme::Eof => "end of file",
        }
    }
}
