use std::fmt;
use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use minic_compiler::analysis::SemanticPass;
use minic_compiler::emitter::Emitter;
use minic_compiler::ir::tac::LoweringPass;
use minic_compiler::lexer;
use minic_compiler::parser;

/// Helper macro to bail on a specified [CompileStage].
macro_rules! bail_on {
  ($options: expr, $stage: expr) => {
    if $options.should_bail($stage) {
      let message = format!("WARN | Bailed on stage '{}'", $stage);
      let message = format!("{}", boxed(&message));

      println!("{message}");

      return Ok(CompileStatus::Bailed);
    }
  };
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum CompileStage {
  Lex,
  Parse,
  Analyze,
  Lower,
  Codegen,
}

impl fmt::Display for CompileStage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let stage = match self {
      | CompileStage::Lex => "Lex",
      | CompileStage::Parse => "Parse",
      | CompileStage::Analyze => "Analyze",
      | CompileStage::Lower => "Lower",
      | CompileStage::Codegen => "Codegen",
    };

    write!(f, "{stage}")
  }
}

#[derive(Clone, Copy, Debug)]
enum CompileStatus {
  Success,
  Bailed,
}

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
  /// MC program to compile.
  input: PathBuf,
  /// Path of the generated assembly file.
  #[arg(short, long, default_value = "output.asm")]
  output: PathBuf,
  /// Stages to print debug output for.
  #[arg(short, long, num_args = 1.., value_enum, value_delimiter = ' ')]
  print: Vec<CompileStage>,
  /// Stage to stop compilation at.
  #[arg(short, long, value_enum)]
  stage: Option<CompileStage>,
}

#[derive(Debug)]
struct CompileOptions {
  output: PathBuf,
  print: Vec<CompileStage>,
  stage: Option<CompileStage>,
}

impl CompileOptions {
  /// Creates a new compile options struct from the CLI arguments.
  fn from_cli(cli: Cli) -> Self {
    Self {
      output: cli.output,
      print: cli.print,
      stage: cli.stage,
    }
  }

  /// Returns `true` if the given stage should be printed.
  fn should_print(&self, stage: CompileStage) -> bool {
    self.print.contains(&stage)
  }

  /// Returns `true` if the given stage should be bailed on.
  fn should_bail(&self, target: CompileStage) -> bool {
    match self.stage {
      | Some(stage) => stage == target,
      | None => false,
    }
  }
}

/// Returns a string with an ASCII box around the given text.
fn boxed(text: &str) -> String {
  let mut header = String::new();
  let size = text.len();

  let line = "+-".to_string() + "-".repeat(size).as_str() + "-+\n";
  let message = format!("| {text:<size$} |\n", size = size);

  header.push_str(&line);
  header.push_str(&message);
  header.push_str(&line);

  header
}

/// Compiles the given MC source.
fn compile(source: &str, options: &CompileOptions) -> anyhow::Result<CompileStatus> {
  // Lex.
  let mut lexer = lexer::Lexer::new(source.as_bytes());
  let tokens = lexer.lex()?;

  if options.should_print(CompileStage::Lex) {
    println!("{}", boxed("Stage | Lex (tokens)"));
    println!("[");

    for token in &tokens {
      println!("  {token:?}");
    }

    println!("]\n");
  }

  bail_on!(options, CompileStage::Lex);

  // Parse.
  let mut parser = parser::Parser::new(tokens);
  let program = parser.parse()?;

  if options.should_print(CompileStage::Parse) {
    println!("{}", boxed("Stage | Parse (AST)"));
    println!("{program:#?}");
    println!();
  }

  bail_on!(options, CompileStage::Parse);

  // Analyze.
  SemanticPass::new().run(&program)?;

  if options.should_print(CompileStage::Analyze) {
    println!("{}", boxed("Stage | Analyze"));
    println!("OK");
    println!();
  }

  bail_on!(options, CompileStage::Analyze);

  // Lower.
  let tac = LoweringPass::new().lower(&program)?;

  if options.should_print(CompileStage::Lower) {
    println!("{}", boxed("Stage | Lower (IR)"));
    println!("{tac}");
  }

  bail_on!(options, CompileStage::Lower);

  // Codegen.
  let output = Emitter::new().emit(&tac);

  if options.should_print(CompileStage::Codegen) {
    println!("{}", boxed("Stage | Codegen (assembly)"));
    println!("{output}");
  }

  bail_on!(options, CompileStage::Codegen);

  fs::write(&options.output, output.as_bytes())
    .with_context(|| format!("failed to write '{}'", options.output.display()))?;

  Ok(CompileStatus::Success)
}

/// Compiler driver.
fn main() -> anyhow::Result<()> {
  let cli = Cli::parse();

  let source = fs::read_to_string(&cli.input)
    .with_context(|| format!("failed to read '{}'", cli.input.display()))?;

  let options = CompileOptions::from_cli(cli);

  match compile(&source, &options)? {
    | CompileStatus::Success | CompileStatus::Bailed => Ok(()),
  }
}
