use std::collections::VecDeque;

use minic_reporting::{Location, Span};
use thiserror::Error;

use super::ascii::*;
use super::token::{Token, TokenKind, TokenValue};
use crate::symbol::symbol;

/// How many spaces a tab is worth when measuring indentation width.
const TAB_WIDTH: usize = 4;

type Result<T> = std::result::Result<T, LexError>;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("lex error {line}:{column}: {message}")]
pub struct LexError {
  /// The error message.
  pub message: String,
  /// The line the error was found on, 1-based.
  pub line: usize,
  /// The column the error was found at, 1-based.
  pub column: usize,
}

impl LexError {
  pub fn new(message: impl AsRef<str> + Into<String>, line: usize, column: usize) -> Self {
    Self {
      message: message.into(),
      line,
      column,
    }
  }
}

/// Helper macro to select and create a token based on the next character.
///
/// ## Example
///
/// ```ignore
/// select!(self, {
///   EQUAL => (TokenKind::Equal, 2),
///   _ => (TokenKind::Assign, 1),
/// })
/// ```
macro_rules! select {
  ($self:expr, {
    $($pattern:pat $(if $guard:expr)? => ($kind:expr, $offset:expr)),+ $(,)?
  }) => {
    {
      let start = $self.position;
      let line = $self.line;
      let column = $self.column;

      let (kind, offset) = match $self.peek(1) {
        $(| $pattern $(if $guard)? => ($kind, $offset),)+
      };

      $self.advance_by(offset);

      Token::new(kind, TokenValue::None, $self.location(start, line, column))
    }
  };
}

pub struct Lexer<'i> {
  /// The stream of bytes to process.
  input: &'i [u8],
  /// The current position in the input stream.
  position: usize,
  /// Input length, i.e. the maximum position in the input stream.
  length: usize,
  /// The current line number.
  line: usize,
  /// The current column number.
  column: usize,
  /// The stack of open indentation widths. Seeded with 0 and never emptied below it.
  indents: Vec<usize>,
  /// Indents and dedents minted by the last indentation scan, not yet delivered.
  pending: VecDeque<Token>,
}

impl<'i> Lexer<'i> {
  /// Creates a new lexer for the given input.
  pub fn new(input: &'i [u8]) -> Self {
    let length = input.len();

    Self {
      input,
      position: 0,
      length,
      line: 1,
      column: 1,
      indents: vec![0],
      pending: VecDeque::new(),
    }
  }

  /// Lexes the input and returns a vector of tokens terminated by a single [TokenKind::Eof].
  pub fn lex(&mut self) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();

    loop {
      let token = self.next()?;
      let kind = token.kind;

      tokens.push(token);

      if kind == TokenKind::Eof {
        break;
      }
    }

    Ok(tokens)
  }

  /// Lexes the input and returns a vector of tokens, but all tokens have their `location` set to
  /// `Location::default()`. Needed for testing.
  #[cfg(test)]
  pub fn lex_locationless(&mut self) -> Result<Vec<Token>> {
    let location = Location::default();

    self.lex().map(|tokens| {
      tokens
        .into_iter()
        .map(|token| Token::new(token.kind, token.value, location))
        .collect()
    })
  }

  /// Returns `true` if there is another byte to process.
  #[inline]
  fn has_next(&self) -> bool {
    self.position < self.length
  }

  /// Returns the byte at the given offset from the current position.
  fn peek(&self, offset: usize) -> u8 {
    let index = self.position + offset;

    if index < self.length {
      self.input[index]
    } else {
      0
    }
  }

  /// Returns the current byte.
  fn current_byte(&self) -> u8 {
    if self.has_next() {
      self.input[self.position]
    } else {
      0
    }
  }

  /// Consumes the current byte, keeping the line and column counters in sync.
  fn advance(&mut self) -> u8 {
    let current = self.current_byte();

    if self.has_next() {
      self.position += 1;

      if current == NEWLINE {
        self.line += 1;
        self.column = 1;
      } else {
        self.column += 1;
      }
    }

    current
  }

  /// Consumes `n` bytes.
  fn advance_by(&mut self, n: usize) {
    for _ in 0..n {
      self.advance();
    }
  }

  /// Returns a string slice of the given range.
  fn slice(&self, start: usize, stop: usize) -> String {
    String::from_utf8_lossy(&self.input[start..stop]).into_owned()
  }

  /// Returns a location spanning from the given start point to the current position.
  fn location(&self, start: usize, line: usize, column: usize) -> Location {
    Location::new(
      Span::new(start, self.position),
      Span::new(line, self.line),
      Span::new(column, self.column),
    )
  }
}

impl Lexer<'_> {
  /// Returns the next token.
  pub fn next(&mut self) -> Result<Token> {
    if let Some(token) = self.pending.pop_front() {
      return Ok(token);
    }

    loop {
      match self.current_byte() {
        | SPACE | TAB | CARRIAGE_RETURN => {
          self.advance();
        },
        | SLASH if self.peek(1) == SLASH => self.line_comment(),
        | SLASH if self.peek(1) == STAR => self.block_comment(),
        | NEWLINE => return self.newline(),
        | ZERO..=NINE => return self.int(),
        | QUOTE => return self.string(),
        | LOWER_A..=LOWER_Z | UPPER_A..=UPPER_Z | UNDERSCORE => return Ok(self.identifier()),
        | PLUS => return Ok(self.token_single(TokenKind::Add)),
        | HYPHEN => return Ok(self.token_single(TokenKind::Sub)),
        | STAR => return Ok(self.token_single(TokenKind::Mul)),
        | SLASH => return Ok(self.token_single(TokenKind::Div)),
        | EQUAL => return Ok(self.equal()),
        | BANG => return Ok(self.bang()),
        | LESS => return Ok(self.less()),
        | GREATER => return Ok(self.greater()),
        | PAREN_OPEN => return Ok(self.token_single(TokenKind::ParenOpen)),
        | PAREN_CLOSE => return Ok(self.token_single(TokenKind::ParenClose)),
        | BRACE_OPEN => return Ok(self.token_single(TokenKind::BraceOpen)),
        | BRACE_CLOSE => return Ok(self.token_single(TokenKind::BraceClose)),
        | COLON => return Ok(self.token_single(TokenKind::Colon)),
        | COMMA => return Ok(self.token_single(TokenKind::Comma)),
        | SEMICOLON => return Ok(self.token_single(TokenKind::Semi)),
        | other => {
          return if self.has_next() {
            Err(LexError::new(
              format!("unexpected character '{}'", other as char),
              self.line,
              self.column,
            ))
          } else {
            Ok(self.eof())
          };
        },
      }
    }
  }

  /// Returns a token that signals the end of the input stream.
  fn eof(&self) -> Token {
    Token::eof(Location::new(
      Span::new(self.position, self.position),
      Span::new(self.line, self.line),
      Span::new(self.column, self.column),
    ))
  }

  /// Returns a token of the given kind for the single byte at the current position.
  fn token_single(&mut self, kind: TokenKind) -> Token {
    let start = self.position;
    let line = self.line;
    let column = self.column;

    self.advance();

    Token::new(kind, TokenValue::None, self.location(start, line, column))
  }

  /// Returns a token for: `==`, `=`.
  fn equal(&mut self) -> Token {
    select!(self, {
      EQUAL => (TokenKind::Equal, 2),
      _ => (TokenKind::Assign, 1),
    })
  }

  /// Returns a token for: `!=`, `!`.
  fn bang(&mut self) -> Token {
    select!(self, {
      EQUAL => (TokenKind::NotEqual, 2),
      _ => (TokenKind::Bang, 1),
    })
  }

  /// Returns a token for: `<=`, `<`.
  fn less(&mut self) -> Token {
    select!(self, {
      EQUAL => (TokenKind::LessEqual, 2),
      _ => (TokenKind::Less, 1),
    })
  }

  /// Returns a token for: `>=`, `>`.
  fn greater(&mut self) -> Token {
    select!(self, {
      EQUAL => (TokenKind::GreaterEqual, 2),
      _ => (TokenKind::Greater, 1),
    })
  }

  /// Skips a `//` comment. The terminating newline is left in place so the indentation scan still
  /// sees it.
  fn line_comment(&mut self) {
    while self.has_next() && self.current_byte() != NEWLINE {
      self.advance();
    }
  }

  /// Skips a `/* ... */` comment. Nesting is not supported; an unterminated comment silently
  /// consumes the rest of the input.
  fn block_comment(&mut self) {
    self.advance_by(2);

    while self.has_next() {
      if self.current_byte() == STAR && self.peek(1) == SLASH {
        self.advance_by(2);
        return;
      }

      self.advance();
    }
  }

  /// Returns a token for a newline, then scans the indentation of the next line, queueing indents
  /// and dedents for delivery.
  fn newline(&mut self) -> Result<Token> {
    let start = self.position;
    let line = self.line;
    let column = self.column;

    self.advance();

    let token = Token::new(
      TokenKind::Newline,
      TokenValue::None,
      self.location(start, line, column),
    );

    self.scan_indentation()?;

    Ok(token)
  }

  /// Measures the indentation of the line at the current position and updates the indentation
  /// stack, queueing one indent or as many dedents as levels were closed.
  fn scan_indentation(&mut self) -> Result<()> {
    let start = self.position;

    let mut width = 0;
    let mut seen_space = false;
    let mut seen_tab = false;

    loop {
      match self.current_byte() {
        | SPACE => {
          seen_space = true;
          width += 1;
          self.advance();
        },
        | TAB => {
          seen_tab = true;
          width += TAB_WIDTH;
          self.advance();
        },
        | _ => break,
      }
    }

    // Blank lines produce no indentation change.
    if matches!(self.current_byte(), NEWLINE | CARRIAGE_RETURN) || !self.has_next() {
      return Ok(());
    }

    if seen_space && seen_tab {
      return Err(LexError::new(
        "indentation mixes tabs and spaces",
        self.line,
        1,
      ));
    }

    let current = self.indents.last().copied().unwrap_or(0);

    if width > current {
      self.indents.push(width);
      self.pending.push_back(self.layout_token(TokenKind::Indent, start));
    } else if width < current {
      while self.indents.last().copied().unwrap_or(0) > width {
        self.indents.pop();
        self.pending.push_back(self.layout_token(TokenKind::Dedent, start));
      }

      if self.indents.last().copied().unwrap_or(0) != width {
        return Err(LexError::new(
          "inconsistent indentation",
          self.line,
          self.column,
        ));
      }
    }

    Ok(())
  }

  /// Returns an indent or dedent token spanning the indentation of the current line.
  fn layout_token(&self, kind: TokenKind, start: usize) -> Token {
    Token::new(
      kind,
      TokenValue::None,
      Location::new(
        Span::new(start, self.position),
        Span::new(self.line, self.line),
        Span::new(1, self.column),
      ),
    )
  }

  /// Returns a token for an integer literal.
  fn int(&mut self) -> Result<Token> {
    let start = self.position;
    let line = self.line;
    let column = self.column;

    while let ZERO..=NINE = self.current_byte() {
      self.advance();
    }

    let lexeme = self.slice(start, self.position);

    let value = lexeme.parse().map_err(|_| {
      LexError::new(
        format!("integer literal '{lexeme}' is out of range"),
        line,
        column,
      )
    })?;

    Ok(Token::new(
      TokenKind::Int,
      TokenValue::Int(value),
      self.location(start, line, column),
    ))
  }

  /// Returns a token for an identifier or a keyword.
  fn identifier(&mut self) -> Token {
    let start = self.position;
    let line = self.line;
    let column = self.column;

    while let ZERO..=NINE | LOWER_A..=LOWER_Z | UPPER_A..=UPPER_Z | UNDERSCORE | DOLLAR =
      self.current_byte()
    {
      self.advance();
    }

    let lexeme = self.slice(start, self.position);
    let value = lexeme.as_str();

    let kind = match lexeme.len() {
      | 2 => {
        match value {
          | "if" => TokenKind::IfKw,
          | _ => TokenKind::Ident,
        }
      },
      | 3 => {
        match value {
          | "int" => TokenKind::IntKw,
          | _ => TokenKind::Ident,
        }
      },
      | 4 => {
        match value {
          | "else" => TokenKind::ElseKw,
          | "void" => TokenKind::VoidKw,
          | _ => TokenKind::Ident,
        }
      },
      | 5 => {
        match value {
          | "while" => TokenKind::WhileKw,
          | _ => TokenKind::Ident,
        }
      },
      | 6 => {
        match value {
          | "return" => TokenKind::ReturnKw,
          | "string" => TokenKind::StrKw,
          | _ => TokenKind::Ident,
        }
      },
      | _ => TokenKind::Ident,
    };

    Token::new(
      kind,
      TokenValue::Str(symbol(lexeme)),
      self.location(start, line, column),
    )
  }

  /// Returns a token for a string literal, decoding escape sequences.
  fn string(&mut self) -> Result<Token> {
    let start = self.position;
    let line = self.line;
    let column = self.column;

    // Opening quote.
    self.advance();

    let mut value = Vec::new();

    loop {
      if !self.has_next() {
        return Err(LexError::new("unterminated string literal", line, column));
      }

      match self.current_byte() {
        | QUOTE => {
          self.advance();
          break;
        },
        | BACKSLASH => {
          let escape_line = self.line;
          let escape_column = self.column;

          self.advance();

          if !self.has_next() {
            return Err(LexError::new("unterminated string literal", line, column));
          }

          let decoded = match self.current_byte() {
            | LOWER_N => NEWLINE,
            | LOWER_T => TAB,
            | LOWER_R => CARRIAGE_RETURN,
            | LOWER_B => 0x08,
            | QUOTE => QUOTE,
            | BACKSLASH => BACKSLASH,
            | other => {
              return Err(LexError::new(
                format!("unknown escape sequence '\\{}'", other as char),
                escape_line,
                escape_column,
              ));
            },
          };

          value.push(decoded);
          self.advance();
        },
        | other => {
          value.push(other);
          self.advance();
        },
      }
    }

    let value = String::from_utf8_lossy(&value).into_owned();

    Ok(Token::new(
      TokenKind::Str,
      TokenValue::Str(symbol(value)),
      self.location(start, line, column),
    ))
  }
}
