use std::fmt;

use minic_reporting::Location;

use crate::symbol::Symbol;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
  // Keywords.
  ElseKw,
  IfKw,
  IntKw,
  ReturnKw,
  StrKw,
  VoidKw,
  WhileKw,

  // Operators.
  Add,
  Assign,
  Bang,
  Div,
  Equal,
  Greater,
  GreaterEqual,
  Less,
  LessEqual,
  Mul,
  NotEqual,
  Sub,

  // Punctuation.
  BraceClose,
  BraceOpen,
  Colon,
  Comma,
  ParenClose,
  ParenOpen,
  Semi,

  // Non-terminals.
  Ident,
  Int,
  Str,

  // Layout.
  Dedent,
  Indent,
  Newline,

  // Other.
  Eof,
}

impl TokenKind {
  pub fn description(&self) -> &str {
    match self {
      // Keywords.
      | TokenKind::ElseKw => "the 'else' keyword",
      | TokenKind::IfKw => "the 'if' keyword",
      | TokenKind::IntKw => "the 'int' keyword",
      | TokenKind::ReturnKw => "the 'return' keyword",
      | TokenKind::StrKw => "the 'string' keyword",
      | TokenKind::VoidKw => "the 'void' keyword",
      | TokenKind::WhileKw => "the 'while' keyword",

      // Operators.
      | TokenKind::Add => "a '+'",
      | TokenKind::Assign => "a '='",
      | TokenKind::Bang => "a '!'",
      | TokenKind::Div => "a '/'",
      | TokenKind::Equal => "a '=='",
      | TokenKind::Greater => "a '>'",
      | TokenKind::GreaterEqual => "a '>='",
      | TokenKind::Less => "a '<'",
      | TokenKind::LessEqual => "a '<='",
      | TokenKind::Mul => "a '*'",
      | TokenKind::NotEqual => "a '!='",
      | TokenKind::Sub => "a '-'",

      // Punctuation.
      | TokenKind::BraceClose => "a '}'",
      | TokenKind::BraceOpen => "a '{'",
      | TokenKind::Colon => "a ':'",
      | TokenKind::Comma => "a ','",
      | TokenKind::ParenClose => "a ')'",
      | TokenKind::ParenOpen => "a '('",
      | TokenKind::Semi => "a ';'",

      // Non-terminals.
      | TokenKind::Ident => "an identifier",
      | TokenKind::Int => "an integer literal",
      | TokenKind::Str => "a string literal",

      // Layout.
      | TokenKind::Dedent => "a dedent",
      | TokenKind::Indent => "an indent",
      | TokenKind::Newline => "a newline",

      // Other.
      | TokenKind::Eof => "the end of input",
    }
  }

  /// Returns the fixed source spelling of the kind, if it has one.
  fn lexeme(&self) -> Option<&str> {
    let lexeme = match self {
      | TokenKind::ElseKw => "else",
      | TokenKind::IfKw => "if",
      | TokenKind::IntKw => "int",
      | TokenKind::ReturnKw => "return",
      | TokenKind::StrKw => "string",
      | TokenKind::VoidKw => "void",
      | TokenKind::WhileKw => "while",
      | TokenKind::Add => "+",
      | TokenKind::Assign => "=",
      | TokenKind::Bang => "!",
      | TokenKind::Div => "/",
      | TokenKind::Equal => "==",
      | TokenKind::Greater => ">",
      | TokenKind::GreaterEqual => ">=",
      | TokenKind::Less => "<",
      | TokenKind::LessEqual => "<=",
      | TokenKind::Mul => "*",
      | TokenKind::NotEqual => "!=",
      | TokenKind::Sub => "-",
      | TokenKind::BraceClose => "}",
      | TokenKind::BraceOpen => "{",
      | TokenKind::Colon => ":",
      | TokenKind::Comma => ",",
      | TokenKind::ParenClose => ")",
      | TokenKind::ParenOpen => "(",
      | TokenKind::Semi => ";",
      | _ => return None,
    };

    Some(lexeme)
  }
}

/// The payload of a token: an integer for integer literals, a string for identifiers, keywords
/// (their lexeme), and string literals (decoded), and nothing otherwise.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenValue {
  None,
  Int(i64),
  Str(Symbol),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Token {
  pub kind: TokenKind,
  pub value: TokenValue,
  pub location: Location,
}

impl Token {
  pub fn new(kind: TokenKind, value: TokenValue, location: Location) -> Self {
    Self {
      kind,
      value,
      location,
    }
  }

  /// Returns a token that signals the end of the input stream. Using it so we don't need to
  /// wrap/unwrap every token in [Option].
  pub fn eof(location: Location) -> Self {
    Self::new(TokenKind::Eof, TokenValue::None, location)
  }

  /// Returns `true` if the token is the end of input token.
  pub fn is_eof(&self) -> bool {
    self.kind == TokenKind::Eof
  }

  /// Returns `true` if the token is skipped by the parser, i.e. pure layout.
  pub fn is_layout(&self) -> bool {
    matches!(
      self.kind,
      TokenKind::Newline | TokenKind::Indent | TokenKind::Dedent
    )
  }
}

impl Default for Token {
  fn default() -> Self {
    Self::eof(Location::default())
  }
}

impl fmt::Display for Token {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.value {
      | TokenValue::Int(value) => write!(f, "{value}"),
      | TokenValue::Str(value) if self.kind == TokenKind::Str => write!(f, "\"{value}\""),
      | TokenValue::Str(value) => write!(f, "{value}"),
      | TokenValue::None => {
        match self.kind.lexeme() {
          | Some(lexeme) => write!(f, "{lexeme}"),
          | None => write!(f, "{}", self.kind.description()),
        }
      },
    }
  }
}
