use logos::Logos;

#[derive(Logos, Debug, PartialEq, Clone)]
#[logos(skip r"[ \t\r\n]+")]
#[logos(skip(r";[^\n]*", allow_greedy = true))]
pub enum Token {
    #[token("module")]
    Module,
    #[token("enum")]
    Enum,
    #[token("fn")]
    Fn,
    #[token("test")]
    Test,

    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(",")]
    Comma,
    #[token("::")]
    PathSep,
    #[token(":")]
    Colon,
    #[token("=")]
    Assign,
    #[token("->")]
    Arrow,

    /// Kept as text so widths beyond 64 bits survive; the sign is part of
    /// the token so `+3` and `-3` read as jump offsets.
    #[regex(r"[+-]?[0-9][0-9_]*", |lex| lex.slice().to_string())]
    #[regex(r"0x[0-9a-fA-F_]+", |lex| lex.slice().to_string())]
    #[regex(r"0b[01_]+", |lex| lex.slice().to_string())]
    Int(String),

    /// Opcodes, type names, labels and `fail!`-style builtin names.
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*!?", |lex| lex.slice().to_string())]
    Ident(String),
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Module => write!(f, "`module`"),
            Token::Enum => write!(f, "`enum`"),
            Token::Fn => write!(f, "`fn`"),
            Token::Test => write!(f, "`test`"),
            Token::LBrace => write!(f, "`{{`"),
            Token::RBrace => write!(f, "`}}`"),
            Token::LParen => write!(f, "`(`"),
            Token::RParen => write!(f, "`)`"),
            Token::LBracket => write!(f, "`[`"),
            Token::RBracket => write!(f, "`]`"),
            Token::Comma => write!(f, "`,`"),
            Token::PathSep => write!(f, "`::`"),
            Token::Colon => write!(f, "`:`"),
            Token::Assign => write!(f, "`=`"),
            Token::Arrow => write!(f, "`->`"),
            Token::Int(text) => write!(f, "integer `{text}`"),
            Token::Ident(name) => write!(f, "`{name}`"),
        }
    }
}

/// Lex assembly text into tokens with byte ranges.
pub fn lex(source: &str) -> Result<Vec<(Token, std::ops::Range<usize>)>, LexError> {
    let mut lexer = Token::lexer(source);
    let mut tokens = Vec::new();

    while let Some(result) = lexer.next() {
        match result {
            Ok(token) => tokens.push((token, lexer.span())),
            Err(()) => {
                let span = lexer.span();
                return Err(LexError {
                    position: span.start,
                    snippet: source[span.clone()].to_string(),
                    suggestion: suggest_fix(&source[span]),
                });
            }
        }
    }

    Ok(tokens)
}

fn suggest_fix(bad_token: &str) -> String {
    if bad_token.starts_with('#') || bad_token.starts_with("//") {
        "comments start with `;`".to_string()
    } else if bad_token.starts_with('"') {
        "assembly has no string literals; encode text as a u8 array".to_string()
    } else if bad_token == "-" || bad_token == "+" {
        "jump offsets are written without a space, e.g. `jump_rel +3`".to_string()
    } else {
        format!("unexpected character(s) '{bad_token}'")
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("unexpected input `{snippet}` at byte {position}")]
pub struct LexError {
    pub position: usize,
    pub snippet: String,
    pub suggestion: String,
}
