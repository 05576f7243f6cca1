use std::collections::HashMap;
use std::mem;

use minic_reporting::Location;
use thiserror::Error;

use crate::ir::ast;
use crate::ir::tac::*;
use crate::symbol::{symbol, Symbol};

pub type Result<T> = std::result::Result<T, LoweringError>;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("lowering error {location}: {message}")]
pub struct LoweringError {
  /// The error message.
  pub message: String,
  /// The location of the error.
  pub location: Location,
}

impl LoweringError {
  pub fn new(message: impl AsRef<str> + Into<String>, location: Location) -> Self {
    Self {
      message: message.into(),
      location,
    }
  }
}

/// Pass to transform (lower) the analyzed AST into the three-address IR.
///
/// Each function gets its own temporaries (`t0`, `t1`, ...) and control-flow labels
/// (`<prefix>_<N>`); both counters restart at zero per function, so lowering the same AST twice
/// produces identical programs. Instructions land in the block opened most recently.
pub struct LoweringPass {
  /// Blocks of the function under construction.
  blocks: Vec<BasicBlock>,
  /// Mapping from source variable names to their IR operand names.
  variables: HashMap<Symbol, Symbol>,
  /// Temporaries minted so far in the current function.
  temp_counter: usize,
  /// Control-flow labels minted so far in the current function.
  label_counter: usize,
}

impl LoweringPass {
  pub fn new() -> Self {
    Self {
      blocks: Vec::new(),
      variables: HashMap::new(),
      temp_counter: 0,
      label_counter: 0,
    }
  }

  /// Lowers the AST to an IR program.
  pub fn lower(&mut self, program: &ast::Program) -> Result<Program> {
    let mut functions = Vec::new();

    for (index, function) in program.functions.iter().enumerate() {
      functions.push(self.lower_function(function, index)?);
    }

    Ok(Program { functions })
  }

  /// Lowers a single function into a sequence of basic blocks starting with its entry block.
  fn lower_function(&mut self, function: &ast::Function, index: usize) -> Result<Function> {
    self.blocks.clear();
    self.variables.clear();
    self.temp_counter = 0;
    self.label_counter = 0;

    // The entry block is numbered by the function's position in the program, so control-flow
    // labels start at 0 within each function.
    self.open_block(symbol(format!("entry_{index}")));

    let params: Vec<Symbol> = function
      .params
      .iter()
      .map(|param| param.name.value)
      .collect();

    for param in &params {
      self.variables.insert(*param, *param);
    }

    for statement in &function.body {
      self.lower_statement(statement)?;
    }

    Ok(Function {
      name: function.name.value,
      return_type: function.return_type,
      params,
      blocks: mem::take(&mut self.blocks),
    })
  }

  /// Lowers a statement into the current block, opening new blocks for control flow.
  fn lower_statement(&mut self, statement: &ast::Stmt) -> Result<()> {
    match statement {
      | ast::Stmt::VarDecl(declaration) => self.lower_declaration(declaration),
      | ast::Stmt::Assign(assignment) => self.lower_assignment(assignment),
      | ast::Stmt::Return(return_) => self.lower_return(return_),
      | ast::Stmt::If(conditional) => self.lower_if(conditional),
      | ast::Stmt::While(loop_) => self.lower_while(loop_),
    }
  }

  fn lower_declaration(&mut self, declaration: &ast::VarDecl) -> Result<()> {
    let name = declaration.name.value;

    // Variables keep their source names in the IR; the map doubles as a declaration check.
    self.variables.insert(name, name);

    if let Some(initializer) = &declaration.initializer {
      let value = self.lower_expression(initializer)?;
      self.emit(Opcode::Assign, name, value, blank());
    }

    Ok(())
  }

  fn lower_assignment(&mut self, assignment: &ast::Assign) -> Result<()> {
    let value = self.lower_expression(&assignment.value)?;
    self.emit(Opcode::Assign, assignment.name.value, value, blank());

    Ok(())
  }

  fn lower_return(&mut self, return_: &ast::Return) -> Result<()> {
    match &return_.value {
      | Some(value) => {
        let value = self.lower_expression(value)?;
        self.emit(Opcode::Return, blank(), value, blank());
      },
      | None => self.emit(Opcode::Return, blank(), blank(), blank()),
    }

    Ok(())
  }

  /// Lowers an if statement.
  ///
  /// Produces the following block structure; an if without an else still gets an else block
  /// holding only the jump to the end:
  ///
  /// ```plaintext,ignore
  /// <condition instructions>
  /// JumpIfNot(condition, else_label)
  /// if_then_N:
  ///   <then instructions>
  ///   Jump(end_label)
  /// if_else_N:
  ///   <else instructions>
  ///   Jump(end_label)
  /// if_end_N:
  /// ```
  fn lower_if(&mut self, conditional: &ast::If) -> Result<()> {
    let condition = self.lower_expression(&conditional.condition)?;

    let then_label = self.new_label("if_then");
    let else_label = self.new_label("if_else");
    let end_label = self.new_label("if_end");

    self.emit(Opcode::JumpIfNot, blank(), condition, else_label);

    self.open_block(then_label);

    for statement in &conditional.then_branch {
      self.lower_statement(statement)?;
    }

    self.emit(Opcode::Jump, blank(), end_label, blank());

    self.open_block(else_label);

    for statement in &conditional.else_branch {
      self.lower_statement(statement)?;
    }

    self.emit(Opcode::Jump, blank(), end_label, blank());

    self.open_block(end_label);

    Ok(())
  }

  /// Lowers a while statement.
  ///
  /// ```plaintext,ignore
  /// Jump(cond_label)
  /// while_cond_N:
  ///   <condition instructions>
  ///   JumpIfNot(condition, end_label)
  /// while_body_N:
  ///   <body instructions>
  ///   Jump(cond_label)
  /// while_end_N:
  /// ```
  fn lower_while(&mut self, loop_: &ast::While) -> Result<()> {
    let cond_label = self.new_label("while_cond");
    let body_label = self.new_label("while_body");
    let end_label = self.new_label("while_end");

    self.emit(Opcode::Jump, blank(), cond_label, blank());

    self.open_block(cond_label);

    let condition = self.lower_expression(&loop_.condition)?;
    self.emit(Opcode::JumpIfNot, blank(), condition, end_label);

    self.open_block(body_label);

    for statement in &loop_.body {
      self.lower_statement(statement)?;
    }

    self.emit(Opcode::Jump, blank(), cond_label, blank());

    self.open_block(end_label);

    Ok(())
  }

  /// Lowers an expression and returns the name of the operand holding its value.
  fn lower_expression(&mut self, expression: &ast::Expr) -> Result<Symbol> {
    match expression {
      | ast::Expr::Constant(int) => {
        let temp = self.new_temp();
        self.emit(Opcode::Assign, temp, symbol(int.value.to_string()), blank());

        Ok(temp)
      },
      | ast::Expr::Str(string) => {
        // String literal payloads are stored verbatim.
        let temp = self.new_temp();
        self.emit(Opcode::Assign, temp, string.value, blank());

        Ok(temp)
      },
      | ast::Expr::Var(ident) => {
        self.variables.get(&ident.value).copied().ok_or_else(|| {
          LoweringError::new(
            format!("variable '{}' is not declared", ident.value),
            ident.location,
          )
        })
      },
      | ast::Expr::Unary(unary) => {
        let operand = self.lower_expression(&unary.expression)?;
        let temp = self.new_temp();

        let opcode = match unary.op {
          | ast::UnaryOp::Negate => Opcode::Neg,
          | ast::UnaryOp::Not => Opcode::Not,
        };

        self.emit(opcode, temp, operand, blank());

        Ok(temp)
      },
      | ast::Expr::Binary(binary) => {
        let left = self.lower_expression(&binary.left)?;
        let right = self.lower_expression(&binary.right)?;
        let temp = self.new_temp();

        self.emit(Self::lower_binary_op(&binary.op), temp, left, right);

        Ok(temp)
      },
    }
  }

  /// Maps a binary operator to its IR opcode.
  fn lower_binary_op(op: &ast::BinaryOp) -> Opcode {
    match op {
      // Arithmetic operators.
      | ast::BinaryOp::Add => Opcode::Add,
      | ast::BinaryOp::Div => Opcode::Div,
      | ast::BinaryOp::Mul => Opcode::Mul,
      | ast::BinaryOp::Sub => Opcode::Sub,
      // Relational operators.
      | ast::BinaryOp::Equal => Opcode::Eq,
      | ast::BinaryOp::Greater => Opcode::Gt,
      | ast::BinaryOp::GreaterEqual => Opcode::Ge,
      | ast::BinaryOp::Less => Opcode::Lt,
      | ast::BinaryOp::LessEqual => Opcode::Le,
      | ast::BinaryOp::NotEqual => Opcode::Neq,
    }
  }

  /// Mints a fresh temporary name.
  fn new_temp(&mut self) -> Symbol {
    let name = format!("t{}", self.temp_counter);
    self.temp_counter += 1;

    symbol(name)
  }

  /// Mints a fresh label with the given prefix. The counter is shared between all label
  /// prefixes but separate from the temporaries counter.
  fn new_label(&mut self, prefix: &str) -> Symbol {
    let label = format!("{}_{}", prefix, self.label_counter);
    self.label_counter += 1;

    symbol(label)
  }

  /// Opens a new block; subsequent emits land there.
  fn open_block(&mut self, label: Symbol) {
    self.blocks.push(BasicBlock::new(label));
  }

  /// Appends an instruction to the current block.
  fn emit(&mut self, opcode: Opcode, result: Symbol, operand1: Symbol, operand2: Symbol) {
    if let Some(block) = self.blocks.last_mut() {
      block.instructions.push(Instruction::new(opcode, result, operand1, operand2));
    }
  }
}

/// The empty operand.
fn blank() -> Symbol {
  symbol("")
}
