use std::mem;

use minic_reporting::{Located, Location};
use thiserror::Error;

use crate::ir::ast::*;
use crate::lexer::{Token, TokenKind, TokenValue};

type Result<T> = std::result::Result<T, ParseError>;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("parse error {location}: {message}")]
pub struct ParseError {
  /// The error message.
  pub message: String,
  /// The location of the error.
  pub location: Location,
}

impl ParseError {
  pub fn new(message: impl AsRef<str> + Into<String>, location: Location) -> Self {
    Self {
      message: message.into(),
      location,
    }
  }
}

pub struct Parser {
  /// The tokens to parse.
  tokens: Vec<Token>,
  /// Current position in token stream.
  pos: usize,
}

impl Parser {
  pub fn new(tokens: Vec<Token>) -> Self {
    Self { tokens, pos: 0 }
  }

  /// Parses the input and returns the AST.
  pub fn parse(&mut self) -> Result<Program> {
    self.program()
  }

  /// Returns the next token, skipping newlines, indents, and dedents.
  fn next(&mut self) -> Token {
    loop {
      if self.pos >= self.tokens.len() {
        return Token::default();
      }

      // Move the token out of the vector, replacing it with EOF token.
      let token = mem::take(&mut self.tokens[self.pos]);

      self.pos += 1;

      if token.is_layout() {
        continue;
      }

      return token;
    }
  }

  /// Peeks at the `n`th token relative the current position, skipping layout tokens.
  fn peek(&self, mut n: usize) -> &Token {
    let mut pos = self.pos;

    while pos < self.tokens.len() {
      // Here `n` acts as the logical offset, decrementing only when a non-layout token is
      // encountered.
      if self.tokens[pos].is_layout() {
        pos += 1;
      } else if n <= 1 {
        return &self.tokens[pos];
      } else {
        n -= 1;
        pos += 1;
      }
    }

    &self.tokens[self.tokens.len().saturating_sub(1)]
  }

  /// Consumes the next token if it matches the given kind.
  fn expect(&mut self, kind: TokenKind) -> Result<Token> {
    let token = self.next();
    self.check_token_kind(&token, kind)?;

    Ok(token)
  }

  /// Advances to the next token and consumes it if it is valid.
  fn consume(&mut self) -> Result<Token> {
    let token = self.next();
    self.check_token(&token)?;

    Ok(token)
  }

  /// Checks that the next token is not [TokenKind::Eof].
  fn check_token(&self, token: &Token) -> Result<()> {
    if token.is_eof() {
      return Err(ParseError::new(
        "the end of the input is reached, but more is expected",
        token.location,
      ));
    }

    Ok(())
  }

  /// Checks if the next token is of the given kind. Also validates the token.
  fn check_token_kind(&self, token: &Token, kind: TokenKind) -> Result<()> {
    self.check_token(token)?;

    if token.kind != kind {
      return Err(ParseError::new(
        format!("expected {}, found '{token}' instead", kind.description()),
        token.location,
      ));
    }

    Ok(())
  }

  /// Skips forward past the next `;` so that parsing could resume at a statement boundary.
  fn synchronize(&mut self) {
    loop {
      let token = self.next();

      if token.kind == TokenKind::Semi || token.is_eof() {
        break;
      }
    }
  }
}

impl Parser {
  /// Parses a whole program.
  fn program(&mut self) -> Result<Program> {
    let mut functions = Vec::new();

    while !self.peek(1).is_eof() {
      functions.push(self.function()?);
    }

    let location = functions
      .first()
      .zip(functions.last())
      .map(|(first, last)| Location::merge(&first.location, &last.location))
      .unwrap_or_default();

    Ok(Program {
      functions,
      location,
    })
  }

  /// Parses a function definition.
  fn function(&mut self) -> Result<Function> {
    let (return_type, start) = self.parse_type()?;
    let name = self.identifier()?;

    self.expect(TokenKind::ParenOpen)?;

    let params = match self.peek(1).kind {
      | TokenKind::ParenClose => Vec::new(),
      | _ => self.params()?,
    };

    self.expect(TokenKind::ParenClose)?;

    let (body, end) = self.block()?;
    let location = Location::merge(&start, &end);

    Ok(Function {
      name,
      return_type,
      params,
      body,
      location,
    })
  }

  /// Parses a comma-separated parameter list.
  fn params(&mut self) -> Result<Vec<Param>> {
    let mut params = Vec::new();

    loop {
      params.push(self.param()?);

      match self.peek(1).kind {
        | TokenKind::Comma => {
          self.consume()?;
        },
        | _ => break,
      }
    }

    Ok(params)
  }

  /// Parses a single parameter.
  fn param(&mut self) -> Result<Param> {
    let (typ, start) = self.parse_type()?;
    let name = self.identifier()?;
    let location = Location::merge(&start, name.location());

    Ok(Param {
      typ,
      name,
      location,
    })
  }

  /// Parses a type keyword.
  fn parse_type(&mut self) -> Result<(Type, Location)> {
    let token = self.consume()?;

    let typ = match token.kind {
      | TokenKind::IntKw => Type::Int,
      | TokenKind::StrKw => Type::Str,
      | TokenKind::VoidKw => Type::Void,
      | _ => {
        return Err(ParseError::new(
          format!("expected a type, found '{token}' instead"),
          token.location,
        ));
      },
    };

    Ok((typ, token.location))
  }

  /// Parses a brace-delimited block of statements and returns them along with the block's
  /// location.
  fn block(&mut self) -> Result<(Vec<Stmt>, Location)> {
    let open = self.expect(TokenKind::BraceOpen)?;

    let mut body = Vec::new();

    while self.peek(1).kind != TokenKind::BraceClose && !self.peek(1).is_eof() {
      match self.statement() {
        | Ok(statement) => body.push(statement),
        | Err(error) => {
          self.synchronize();
          return Err(error);
        },
      }
    }

    let close = self.expect(TokenKind::BraceClose)?;
    let location = Location::merge(&open.location, &close.location);

    Ok((body, location))
  }

  /// Parses a statement.
  fn statement(&mut self) -> Result<Stmt> {
    let token = self.peek(1);

    match token.kind {
      | TokenKind::IfKw => self.statement_if(),
      | TokenKind::WhileKw => self.statement_while(),
      | TokenKind::ReturnKw => self.statement_return(),
      | TokenKind::IntKw | TokenKind::StrKw | TokenKind::VoidKw => self.declaration(),
      | TokenKind::Ident => self.statement_assign(),
      | _ => {
        Err(ParseError::new(
          format!("expected a statement, found '{token}' instead"),
          token.location,
        ))
      },
    }
  }

  /// Parses a variable declaration with an optional initializer.
  fn declaration(&mut self) -> Result<Stmt> {
    let (typ, start) = self.parse_type()?;
    let name = self.identifier()?;

    let next = self.peek(1);

    match next.kind {
      | TokenKind::Assign => {
        self.consume()?;

        let initializer = self.expression()?;
        let end = self.expect(TokenKind::Semi)?;
        let location = Location::merge(&start, &end.location);

        Ok(Stmt::VarDecl(VarDecl {
          typ,
          name,
          initializer: Some(initializer),
          location,
        }))
      },
      | TokenKind::Semi => {
        let end = self.expect(TokenKind::Semi)?;
        let location = Location::merge(&start, &end.location);

        Ok(Stmt::VarDecl(VarDecl {
          typ,
          name,
          initializer: None,
          location,
        }))
      },
      | _ => {
        Err(ParseError::new(
          format!("expected ';' or '=' after declaration, found '{next}'"),
          next.location,
        ))
      },
    }
  }

  /// Parses an assignment statement.
  fn statement_assign(&mut self) -> Result<Stmt> {
    let name = self.identifier()?;

    self.expect(TokenKind::Assign)?;

    let value = self.expression()?;
    let end = self.expect(TokenKind::Semi)?;
    let location = Location::merge(name.location(), &end.location);

    Ok(Stmt::Assign(Assign {
      name,
      value,
      location,
    }))
  }

  /// Parses a return statement with an optional value.
  fn statement_return(&mut self) -> Result<Stmt> {
    let token = self.consume()?;

    let value = match self.peek(1).kind {
      | TokenKind::Semi => None,
      | _ => Some(self.expression()?),
    };

    let end = self.expect(TokenKind::Semi)?;
    let location = Location::merge(&token.location, &end.location);

    Ok(Stmt::Return(Return { value, location }))
  }

  /// Parses an if statement.
  ///
  /// Parentheses around the condition are not required: `(x > 0)` simply parses as a
  /// parenthesized expression.
  fn statement_if(&mut self) -> Result<Stmt> {
    let token = self.consume()?;
    let condition = self.expression()?;

    let (then_branch, then_location) = self.block()?;

    let (else_branch, end) = match self.peek(1).kind {
      | TokenKind::ElseKw => {
        self.consume()?;
        self.block()?
      },
      | _ => (Vec::new(), then_location),
    };

    let location = Location::merge(&token.location, &end);

    Ok(Stmt::If(If {
      condition,
      then_branch,
      else_branch,
      location,
    }))
  }

  /// Parses a while statement.
  fn statement_while(&mut self) -> Result<Stmt> {
    let token = self.consume()?;
    let condition = self.expression()?;

    let (body, end) = self.block()?;
    let location = Location::merge(&token.location, &end);

    Ok(Stmt::While(While {
      condition,
      body,
      location,
    }))
  }

  /// Parses an expression.
  fn expression(&mut self) -> Result<Expr> {
    self.comparison()
  }

  /// Parses a comparison expression.
  fn comparison(&mut self) -> Result<Expr> {
    let mut left = self.term()?;

    while let Some(op) = Self::comparison_op(self.peek(1)) {
      self.consume()?;

      let right = self.term()?;
      let location = Location::merge(left.location(), right.location());

      left = Expr::Binary(Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
        location,
      });
    }

    Ok(left)
  }

  /// Parses an additive expression.
  fn term(&mut self) -> Result<Expr> {
    let mut left = self.factor()?;

    while let Some(op) = Self::term_op(self.peek(1)) {
      self.consume()?;

      let right = self.factor()?;
      let location = Location::merge(left.location(), right.location());

      left = Expr::Binary(Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
        location,
      });
    }

    Ok(left)
  }

  /// Parses a multiplicative expression.
  fn factor(&mut self) -> Result<Expr> {
    let mut left = self.primary()?;

    while let Some(op) = Self::factor_op(self.peek(1)) {
      self.consume()?;

      let right = self.primary()?;
      let location = Location::merge(left.location(), right.location());

      left = Expr::Binary(Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
        location,
      });
    }

    Ok(left)
  }

  /// Parses a primary expression.
  fn primary(&mut self) -> Result<Expr> {
    let token = self.peek(1);

    match token.kind {
      | TokenKind::Int => self.constant(),
      | TokenKind::Str => self.string(),
      | TokenKind::Ident => self.variable(),
      | TokenKind::ParenOpen => self.group(),
      | TokenKind::Bang | TokenKind::Sub => self.unary(),
      | _ => {
        Err(ParseError::new(
          format!("expected a primary expression, found '{token}' instead"),
          token.location,
        ))
      },
    }
  }

  /// Parses an unary expression.
  fn unary(&mut self) -> Result<Expr> {
    let token = self.consume()?;

    let op = match token.kind {
      | TokenKind::Bang => UnaryOp::Not,
      | TokenKind::Sub => UnaryOp::Negate,
      | _ => {
        return Err(ParseError::new(
          format!("expected an unary operator, found '{token}' instead"),
          token.location,
        ));
      },
    };

    let expression = self.primary()?;
    let location = Location::merge(&token.location, expression.location());

    Ok(Expr::Unary(Unary {
      op,
      expression: Box::new(expression),
      location,
    }))
  }

  /// Parses an expression group.
  fn group(&mut self) -> Result<Expr> {
    self.consume()?;

    let expression = self.expression()?;

    self.expect(TokenKind::ParenClose)?;

    Ok(expression)
  }

  /// Parses an integer literal.
  fn constant(&mut self) -> Result<Expr> {
    let token = self.consume()?;

    match token.value {
      | TokenValue::Int(value) => {
        Ok(Expr::Constant(Int {
          value,
          location: token.location,
        }))
      },
      | _ => {
        Err(ParseError::new(
          format!("expected an integer literal, found '{token}' instead"),
          token.location,
        ))
      },
    }
  }

  /// Parses a string literal.
  fn string(&mut self) -> Result<Expr> {
    let token = self.consume()?;

    match token.value {
      | TokenValue::Str(value) => {
        Ok(Expr::Str(Str {
          value,
          location: token.location,
        }))
      },
      | _ => {
        Err(ParseError::new(
          format!("expected a string literal, found '{token}' instead"),
          token.location,
        ))
      },
    }
  }

  /// Parses a variable reference.
  fn variable(&mut self) -> Result<Expr> {
    let ident = self.identifier()?;

    Ok(Expr::Var(ident))
  }

  /// Parses an identifier.
  fn identifier(&mut self) -> Result<Ident> {
    let token = self.consume()?;

    match (token.kind, token.value) {
      | (TokenKind::Ident, TokenValue::Str(value)) => {
        Ok(Ident {
          value,
          location: token.location,
        })
      },
      | _ => {
        Err(ParseError::new(
          format!("expected an identifier, found '{token}' instead"),
          token.location,
        ))
      },
    }
  }

  /// Returns the matching comparison operator for the given token.
  fn comparison_op(token: &Token) -> Option<BinaryOp> {
    match token.kind {
      | TokenKind::Equal => Some(BinaryOp::Equal),
      | TokenKind::NotEqual => Some(BinaryOp::NotEqual),
      | TokenKind::Less => Some(BinaryOp::Less),
      | TokenKind::LessEqual => Some(BinaryOp::LessEqual),
      | TokenKind::Greater => Some(BinaryOp::Greater),
      | TokenKind::GreaterEqual => Some(BinaryOp::GreaterEqual),
      | _ => None,
    }
  }

  /// Returns the matching additive operator for the given token.
  fn term_op(token: &Token) -> Option<BinaryOp> {
    match token.kind {
      | TokenKind::Add => Some(BinaryOp::Add),
      | TokenKind::Sub => Some(BinaryOp::Sub),
      | _ => None,
    }
  }

  /// Returns the matching multiplicative operator for the given token.
  fn factor_op(token: &Token) -> Option<BinaryOp> {
    match token.kind {
      | TokenKind::Mul => Some(BinaryOp::Mul),
      | TokenKind::Div => Some(BinaryOp::Div),
      | _ => None,
    }
  }
}

#[cfg(test)]
mod tests {
  use indoc::indoc;

  use super::*;
  use crate::lexer::Lexer;
  use crate::symbol::symbol;

  /// Creates a new parser from the given input.
  fn parser(input: impl AsRef<str>) -> Parser {
    let mut lexer = Lexer::new(input.as_ref().trim().as_bytes());
    let tokens = lexer.lex_locationless().expect("should lex");

    Parser::new(tokens)
  }

  fn parse(input: impl AsRef<str>) -> Program {
    parser(input).parse().expect("should parse")
  }

  fn parse_err(input: impl AsRef<str>) -> ParseError {
    parser(input).parse().expect_err("should fail to parse")
  }

  fn ident(name: &str) -> Ident {
    Ident {
      value: symbol(name),
      location: Location::default(),
    }
  }

  fn constant(value: i64) -> Expr {
    Expr::Constant(Int {
      value,
      location: Location::default(),
    })
  }

  fn var(name: &str) -> Expr {
    Expr::Var(ident(name))
  }

  fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary(Binary {
      op,
      left: Box::new(left),
      right: Box::new(right),
      location: Location::default(),
    })
  }

  fn unary(op: UnaryOp, expression: Expr) -> Expr {
    Expr::Unary(Unary {
      op,
      expression: Box::new(expression),
      location: Location::default(),
    })
  }

  #[test]
  fn parse_empty_program() {
    let program = parse("");

    assert!(program.functions.is_empty());
  }

  #[test]
  fn parse_program() {
    let actual = parse(indoc! {"
      int main() {
        int a = 21;
        int b;

        b = a + 1;

        return b;
      }
    "});

    let expected = Program {
      functions: vec![Function {
        name: ident("main"),
        return_type: Type::Int,
        params: vec![],
        body: vec![
          Stmt::VarDecl(VarDecl {
            typ: Type::Int,
            name: ident("a"),
            initializer: Some(constant(21)),
            location: Location::default(),
          }),
          Stmt::VarDecl(VarDecl {
            typ: Type::Int,
            name: ident("b"),
            initializer: None,
            location: Location::default(),
          }),
          Stmt::Assign(Assign {
            name: ident("b"),
            value: binary(BinaryOp::Add, var("a"), constant(1)),
            location: Location::default(),
          }),
          Stmt::Return(Return {
            value: Some(var("b")),
            location: Location::default(),
          }),
        ],
        location: Location::default(),
      }],
      location: Location::default(),
    };

    assert_eq!(actual, expected);
  }

  #[test]
  fn parse_params() {
    let program = parse("int add(int a, int b) { return a + b; }");
    let function = &program.functions[0];

    assert_eq!(function.name, ident("add"));
    assert_eq!(function.params.len(), 2);
    assert_eq!(function.params[0].typ, Type::Int);
    assert_eq!(function.params[0].name, ident("a"));
    assert_eq!(function.params[1].typ, Type::Int);
    assert_eq!(function.params[1].name, ident("b"));
  }

  #[test]
  fn parse_multiple_functions() {
    let program = parse(indoc! {"
      int one() { return 1; }

      void nothing() { return; }

      string greeting() { return \"hi\"; }
    "});

    let names: Vec<_> = program
      .functions
      .iter()
      .map(|function| (function.name.value.to_string(), function.return_type))
      .collect();

    assert_eq!(
      names,
      vec![
        ("one".to_string(), Type::Int),
        ("nothing".to_string(), Type::Void),
        ("greeting".to_string(), Type::Str),
      ]
    );
  }

  #[test]
  fn parse_precedence() {
    let program = parse("int main() { return 1 + 2 * 3 < 10; }");

    let Stmt::Return(Return { value, .. }) = &program.functions[0].body[0] else {
      panic!("expected a return statement");
    };

    let expected = binary(
      BinaryOp::Less,
      binary(
        BinaryOp::Add,
        constant(1),
        binary(BinaryOp::Mul, constant(2), constant(3)),
      ),
      constant(10),
    );

    assert_eq!(value.as_ref(), Some(&expected));
  }

  #[test]
  fn parse_left_associativity() {
    let program = parse("int main() { return 1 - 2 - 3; }");

    let Stmt::Return(Return { value, .. }) = &program.functions[0].body[0] else {
      panic!("expected a return statement");
    };

    let expected = binary(
      BinaryOp::Sub,
      binary(BinaryOp::Sub, constant(1), constant(2)),
      constant(3),
    );

    assert_eq!(value.as_ref(), Some(&expected));
  }

  #[test]
  fn parse_grouping() {
    let program = parse("int main() { return (1 + 2) * 3; }");

    let Stmt::Return(Return { value, .. }) = &program.functions[0].body[0] else {
      panic!("expected a return statement");
    };

    let expected = binary(
      BinaryOp::Mul,
      binary(BinaryOp::Add, constant(1), constant(2)),
      constant(3),
    );

    assert_eq!(value.as_ref(), Some(&expected));
  }

  #[test]
  fn parse_unary() {
    let program = parse("int main() { return -1 + !x; }");

    let Stmt::Return(Return { value, .. }) = &program.functions[0].body[0] else {
      panic!("expected a return statement");
    };

    let expected = binary(
      BinaryOp::Add,
      unary(UnaryOp::Negate, constant(1)),
      unary(UnaryOp::Not, var("x")),
    );

    assert_eq!(value.as_ref(), Some(&expected));
  }

  #[test]
  fn parse_if_with_parens() {
    let program = parse(indoc! {"
      int main() {
        if (x > 0) {
          return 1;
        } else {
          return 0;
        }
      }
    "});

    let Stmt::If(conditional) = &program.functions[0].body[0] else {
      panic!("expected an if statement");
    };

    assert_eq!(
      conditional.condition,
      binary(BinaryOp::Greater, var("x"), constant(0))
    );
    assert_eq!(conditional.then_branch.len(), 1);
    assert_eq!(conditional.else_branch.len(), 1);
  }

  #[test]
  fn parse_if_without_parens() {
    let program = parse(indoc! {"
      int main() {
        if x > 0 {
          return 1;
        }
      }
    "});

    let Stmt::If(conditional) = &program.functions[0].body[0] else {
      panic!("expected an if statement");
    };

    assert_eq!(
      conditional.condition,
      binary(BinaryOp::Greater, var("x"), constant(0))
    );
    assert_eq!(conditional.then_branch.len(), 1);
    assert!(conditional.else_branch.is_empty());
  }

  #[test]
  fn parse_while() {
    let program = parse(indoc! {"
      int main() {
        while (i < 10) {
          i = i + 1;
        }
      }
    "});

    let Stmt::While(loop_) = &program.functions[0].body[0] else {
      panic!("expected a while statement");
    };

    assert_eq!(loop_.condition, binary(BinaryOp::Less, var("i"), constant(10)));
    assert_eq!(loop_.body.len(), 1);
  }

  #[test]
  fn parse_return_without_value() {
    let program = parse("void noop() { return; }");

    let Stmt::Return(Return { value, .. }) = &program.functions[0].body[0] else {
      panic!("expected a return statement");
    };

    assert!(value.is_none());
  }

  #[test]
  fn parse_string_declaration() {
    let program = parse(r#"int main() { string s = "hi\n"; }"#);

    let Stmt::VarDecl(declaration) = &program.functions[0].body[0] else {
      panic!("expected a declaration");
    };

    assert_eq!(declaration.typ, Type::Str);

    let Some(Expr::Str(string)) = &declaration.initializer else {
      panic!("expected a string initializer");
    };

    assert_eq!(string.value, symbol("hi\n"));
  }

  #[test]
  fn parse_missing_semicolon() {
    let error = parse_err("int main() { return 0 }");

    assert!(error.message.contains("expected a ';'"));
  }

  #[test]
  fn parse_missing_brace() {
    let error = parse_err("int main() { return 0;");

    assert!(error.message.contains("end of the input"));
  }

  #[test]
  fn parse_unexpected_statement() {
    let error = parse_err("int main() { + }");

    assert!(error.message.contains("expected a statement"));
  }

  #[test]
  fn parse_declaration_without_terminator() {
    let error = parse_err("int main() { int x 1; }");

    assert!(error.message.contains("expected ';' or '='"));
  }
}
