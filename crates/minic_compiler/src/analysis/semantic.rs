use std::collections::HashMap;

use minic_reporting::{Located, Location};
use thiserror::Error;

use crate::ir::ast::*;
use crate::symbol::Symbol;

type Result<T> = std::result::Result<T, SemanticError>;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("semantic error {location}: {message}")]
pub struct SemanticError {
  /// The error message.
  pub message: String,
  /// The location of the error.
  pub location: Location,
}

impl SemanticError {
  pub fn new(message: impl AsRef<str> + Into<String>, location: Location) -> Self {
    Self {
      message: message.into(),
      location,
    }
  }
}

/// A single lexical scope, mapping variable names to their declared types.
type Scope = HashMap<Symbol, Type>;

/// Pass validating scoping, typing, and control-flow rules.
///
/// The pass walks the AST without changing it: declarations populate a stack of scopes, lookups
/// walk the stack from the top, and every expression is checked against the closed set of typing
/// rules. The first violation aborts the walk.
pub struct SemanticPass {
  /// The stack of open scopes, innermost last.
  scopes: Vec<Scope>,
  /// Return types of every declared function.
  functions: HashMap<Symbol, Type>,
  /// The return type of the function being checked.
  current_return_type: Type,
}

impl SemanticPass {
  pub fn new() -> Self {
    Self {
      scopes: Vec::new(),
      functions: HashMap::new(),
      current_return_type: Type::Void,
    }
  }

  /// Checks the given program, leaving it untouched.
  pub fn run(&mut self, program: &Program) -> Result<()> {
    self.scopes.clear();
    self.functions.clear();

    self.check_program(program)
  }

  fn check_program(&mut self, program: &Program) -> Result<()> {
    // The global scope.
    self.push_scope();

    // Register every function up front so bodies could refer to any of them.
    for function in &program.functions {
      if self.functions.contains_key(&function.name.value) {
        return Err(SemanticError::new(
          format!("function '{}' is defined twice", function.name.value),
          function.name.location,
        ));
      }

      self.functions.insert(function.name.value, function.return_type);
    }

    for function in &program.functions {
      self.check_function(function)?;
    }

    self.pop_scope();

    Ok(())
  }

  fn check_function(&mut self, function: &Function) -> Result<()> {
    self.current_return_type = function.return_type;
    self.push_scope();

    for param in &function.params {
      if self.is_declared_in_current_scope(&param.name.value) {
        return Err(SemanticError::new(
          format!("parameter '{}' is declared twice", param.name.value),
          param.name.location,
        ));
      }

      self.declare(param.name.value, param.typ);
    }

    for statement in &function.body {
      self.check_statement(statement)?;
    }

    self.pop_scope();

    Ok(())
  }

  fn check_statement(&mut self, statement: &Stmt) -> Result<()> {
    match statement {
      | Stmt::VarDecl(declaration) => self.check_declaration(declaration),
      | Stmt::Assign(assignment) => self.check_assignment(assignment),
      | Stmt::Return(return_) => self.check_return(return_),
      | Stmt::If(conditional) => self.check_if(conditional),
      | Stmt::While(loop_) => self.check_while(loop_),
    }
  }

  fn check_declaration(&mut self, declaration: &VarDecl) -> Result<()> {
    if self.is_declared_in_current_scope(&declaration.name.value) {
      return Err(SemanticError::new(
        format!(
          "variable '{}' is declared twice in the same scope",
          declaration.name.value
        ),
        declaration.name.location,
      ));
    }

    if declaration.typ == Type::Void {
      return Err(SemanticError::new(
        format!("variable '{}' cannot have type 'void'", declaration.name.value),
        declaration.name.location,
      ));
    }

    self.declare(declaration.name.value, declaration.typ);

    if let Some(initializer) = &declaration.initializer {
      let inferred = self.infer_type(initializer)?;

      if inferred != declaration.typ {
        return Err(SemanticError::new(
          format!(
            "initializer of '{}' has type '{inferred}', expected '{}'",
            declaration.name.value, declaration.typ
          ),
          *initializer.location(),
        ));
      }
    }

    Ok(())
  }

  fn check_assignment(&mut self, assignment: &Assign) -> Result<()> {
    let Some(declared) = self.lookup(&assignment.name.value) else {
      return Err(SemanticError::new(
        format!("variable '{}' is not declared", assignment.name.value),
        assignment.name.location,
      ));
    };

    // Unreachable given the declaration rules, but enforced anyway.
    if declared == Type::Void {
      return Err(SemanticError::new(
        format!("cannot assign to 'void' variable '{}'", assignment.name.value),
        assignment.name.location,
      ));
    }

    let inferred = self.infer_type(&assignment.value)?;

    if inferred != declared {
      return Err(SemanticError::new(
        format!(
          "cannot assign '{inferred}' to variable '{}' of type '{declared}'",
          assignment.name.value
        ),
        *assignment.value.location(),
      ));
    }

    Ok(())
  }

  fn check_return(&mut self, return_: &Return) -> Result<()> {
    match &return_.value {
      | Some(value) if self.current_return_type == Type::Void => {
        Err(SemanticError::new(
          "void function cannot return a value",
          *value.location(),
        ))
      },
      | Some(value) => {
        let inferred = self.infer_type(value)?;

        if inferred != self.current_return_type {
          return Err(SemanticError::new(
            format!(
              "return value has type '{inferred}', expected '{}'",
              self.current_return_type
            ),
            *value.location(),
          ));
        }

        Ok(())
      },
      | None if self.current_return_type == Type::Void => Ok(()),
      | None => {
        Err(SemanticError::new(
          "non-void function must return a value",
          return_.location,
        ))
      },
    }
  }

  fn check_if(&mut self, conditional: &If) -> Result<()> {
    self.check_condition(&conditional.condition)?;

    self.push_scope();

    for statement in &conditional.then_branch {
      self.check_statement(statement)?;
    }

    self.pop_scope();
    self.push_scope();

    for statement in &conditional.else_branch {
      self.check_statement(statement)?;
    }

    self.pop_scope();

    Ok(())
  }

  fn check_while(&mut self, loop_: &While) -> Result<()> {
    self.check_condition(&loop_.condition)?;

    self.push_scope();

    for statement in &loop_.body {
      self.check_statement(statement)?;
    }

    self.pop_scope();

    Ok(())
  }

  fn check_condition(&mut self, condition: &Expr) -> Result<()> {
    let inferred = self.infer_type(condition)?;

    if inferred != Type::Int {
      return Err(SemanticError::new(
        format!("condition has type '{inferred}', expected 'int'"),
        *condition.location(),
      ));
    }

    Ok(())
  }

  /// Infers the type of an expression, validating operand types along the way.
  fn infer_type(&self, expression: &Expr) -> Result<Type> {
    match expression {
      | Expr::Constant(..) => Ok(Type::Int),
      | Expr::Str(..) => Ok(Type::Str),
      | Expr::Var(ident) => {
        self.lookup(&ident.value).ok_or_else(|| {
          SemanticError::new(
            format!("variable '{}' is not declared", ident.value),
            ident.location,
          )
        })
      },
      | Expr::Unary(unary) => {
        let operand = self.infer_type(&unary.expression)?;

        if operand != Type::Int {
          return Err(SemanticError::new(
            format!("unary operator requires an 'int' operand, found '{operand}'"),
            *unary.expression.location(),
          ));
        }

        Ok(Type::Int)
      },
      | Expr::Binary(binary) => {
        let left = self.infer_type(&binary.left)?;
        let right = self.infer_type(&binary.right)?;

        if left != Type::Int || right != Type::Int {
          return Err(SemanticError::new(
            format!("binary operator requires 'int' operands, found '{left}' and '{right}'"),
            binary.location,
          ));
        }

        Ok(Type::Int)
      },
    }
  }

  fn push_scope(&mut self) {
    self.scopes.push(Scope::new());
  }

  fn pop_scope(&mut self) {
    self.scopes.pop();
  }

  /// Declares a variable in the innermost scope.
  fn declare(&mut self, name: Symbol, typ: Type) {
    if let Some(scope) = self.scopes.last_mut() {
      scope.insert(name, typ);
    }
  }

  /// Looks a variable up, walking the scope stack from the top.
  fn lookup(&self, name: &Symbol) -> Option<Type> {
    self
      .scopes
      .iter()
      .rev()
      .find_map(|scope| scope.get(name).copied())
  }

  fn is_declared_in_current_scope(&self, name: &Symbol) -> bool {
    self
      .scopes
      .last()
      .map(|scope| scope.contains_key(name))
      .unwrap_or(false)
  }
}

#[cfg(test)]
mod tests {
  use indoc::indoc;

  use super::*;
  use crate::lexer::Lexer;
  use crate::parser::Parser;

  fn parse(input: impl AsRef<str>) -> Program {
    let mut lexer = Lexer::new(input.as_ref().trim().as_bytes());
    let tokens = lexer.lex().expect("should lex");

    Parser::new(tokens).parse().expect("should parse")
  }

  fn analyze(input: impl AsRef<str>) -> Result<()> {
    SemanticPass::new().run(&parse(input))
  }

  fn analyze_err(input: impl AsRef<str>) -> SemanticError {
    analyze(input).expect_err("should fail analysis")
  }

  #[test]
  fn analyze_valid_program() {
    let result = analyze(indoc! {"
      int main() {
        int x = 0;
        int limit = 10;

        while (x < limit) {
          x = x + 1;
        }

        if (x == limit) {
          return x;
        } else {
          return -x;
        }
      }
    "});

    assert!(result.is_ok());
  }

  #[test]
  fn analyze_is_read_only() {
    let program = parse("int main() { int x = 1; return x; }");
    let mut pass = SemanticPass::new();

    assert!(pass.run(&program).is_ok());
    assert!(pass.run(&program).is_ok());
  }

  #[test]
  fn analyze_undeclared_assignment() {
    let error = analyze_err("int main() { x = 1; }");

    assert!(error.message.contains("'x'"));
    assert!(error.message.contains("not declared"));
  }

  #[test]
  fn analyze_undeclared_in_expression() {
    let error = analyze_err("int main() { return y + 1; }");

    assert!(error.message.contains("'y'"));
  }

  #[test]
  fn analyze_redeclaration_in_same_scope() {
    let error = analyze_err("int main() { int x = 1; int x = 2; }");

    assert!(error.message.contains("declared twice"));
  }

  #[test]
  fn analyze_shadowing_in_inner_scope() {
    let result = analyze(indoc! {"
      int main() {
        int x = 1;

        if (x > 0) {
          int x = 2;
          return x;
        }

        return x;
      }
    "});

    assert!(result.is_ok());
  }

  #[test]
  fn analyze_inner_declaration_does_not_leak() {
    let error = analyze_err(indoc! {"
      int main() {
        if (1) {
          int x = 2;
        }

        return x;
      }
    "});

    assert!(error.message.contains("'x'"));
  }

  #[test]
  fn analyze_void_variable() {
    let error = analyze_err("int main() { void x; }");

    assert!(error.message.contains("'void'"));
  }

  #[test]
  fn analyze_initializer_type_mismatch() {
    let error = analyze_err(r#"int main() { int x = "a"; }"#);

    assert!(error.message.contains("'str'"));
    assert!(error.message.contains("'int'"));
  }

  #[test]
  fn analyze_assignment_type_mismatch() {
    let error = analyze_err(r#"int main() { int x = 1; x = "a"; }"#);

    assert!(error.message.contains("cannot assign"));
  }

  #[test]
  fn analyze_mixed_operands() {
    let error = analyze_err(r#"int main() { return 1 + "x"; }"#);

    assert!(error.message.contains("'int' operands"));
  }

  #[test]
  fn analyze_string_comparison() {
    let error = analyze_err(r#"int main() { string s = "a"; return s < s; }"#);

    assert!(error.message.contains("'int' operands"));
  }

  #[test]
  fn analyze_unary_on_string() {
    let error = analyze_err(r#"int main() { string s = "a"; return -s; }"#);

    assert!(error.message.contains("'int' operand"));
  }

  #[test]
  fn analyze_non_int_condition() {
    let error = analyze_err(r#"int main() { if ("a") { return 1; } return 0; }"#);

    assert!(error.message.contains("condition"));
  }

  #[test]
  fn analyze_return_value_in_void_function() {
    let error = analyze_err("void noop() { return 1; }");

    assert!(error.message.contains("void function"));
  }

  #[test]
  fn analyze_missing_return_value() {
    let error = analyze_err("int main() { return; }");

    assert!(error.message.contains("must return a value"));
  }

  #[test]
  fn analyze_return_type_mismatch() {
    let error = analyze_err(r#"int main() { return "a"; }"#);

    assert!(error.message.contains("'str'"));
  }

  #[test]
  fn analyze_duplicate_function() {
    let error = analyze_err("int f() { return 1; } int f() { return 2; }");

    assert!(error.message.contains("defined twice"));
  }

  #[test]
  fn analyze_duplicate_parameter() {
    let error = analyze_err("int f(int a, int a) { return a; }");

    assert!(error.message.contains("parameter 'a'"));
  }

  #[test]
  fn analyze_parameters_are_in_scope() {
    let result = analyze("int add(int a, int b) { return a + b; }");

    assert!(result.is_ok());
  }
}
