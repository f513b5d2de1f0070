//! nlsheet CLI - natural-language spreadsheet formulas

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use nlsheet::prelude::*;
use nlsheet::TokenizeResult;
use serde::Serialize;
use serde_json::Value;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nlsheet")]
#[command(
    author,
    version,
    about = "Turn Vietnamese requests into spreadsheet formulas and evaluate them"
)]
struct Cli {
    /// Log pipeline decisions (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a request into a formula
    Convert {
        /// The request, e.g. "tính margin từ giá bán và giá vốn"
        text: String,

        /// Sample value to evaluate the formula against (name=value, repeatable)
        #[arg(short = 'x', long = "with", value_name = "NAME=VALUE")]
        values: Vec<String>,

        /// Minimum confidence to accept a detection
        #[arg(long, default_value_t = 0.3)]
        min_confidence: f64,

        /// Maximum number of alternative intents to report
        #[arg(long, default_value_t = 3)]
        alternatives: usize,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Suggest formulas for partial input
    Suggest {
        /// Partial request; empty lists the templates
        #[arg(default_value = "")]
        text: String,

        #[arg(short, long, default_value_t = 5)]
        limit: usize,
    },

    /// List the formula templates
    Templates {
        #[arg(long)]
        json: bool,
    },

    /// Evaluate a formula
    Eval {
        /// Formula, e.g. "=(retailPrice-costPrice)/retailPrice*100"
        formula: String,

        /// Value for a name or cell (name=value, repeatable)
        #[arg(short = 'x', long = "with", value_name = "NAME=VALUE")]
        values: Vec<String>,
    },

    /// Resolve formula columns in a JSON array of row objects
    Rows {
        /// Input JSON file (default: stdin)
        input: Option<PathBuf>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Value available to every row (name=value, repeatable)
        #[arg(short = 'x', long = "with", value_name = "NAME=VALUE")]
        values: Vec<String>,
    },

    /// Show how a request is tokenized
    Tokenize {
        text: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Convert {
            text,
            values,
            min_confidence,
            alternatives,
            json,
        } => convert(&text, &values, min_confidence, alternatives, json),
        Commands::Suggest { text, limit } => suggest(&text, limit),
        Commands::Templates { json } => list_templates(json),
        Commands::Eval { formula, values } => eval(&formula, &values),
        Commands::Rows {
            input,
            output,
            values,
        } => rows(input.as_deref(), output.as_deref(), &values),
        Commands::Tokenize { text } => tokenize(&text),
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn convert(
    text: &str,
    values: &[String],
    min_confidence: f64,
    alternatives: usize,
    json: bool,
) -> Result<()> {
    let options = ConvertOptions {
        min_confidence,
        include_alternatives: alternatives > 0,
        max_alternatives: alternatives,
        test_context: if values.is_empty() {
            None
        } else {
            Some(parse_assignments(values)?)
        },
        ..Default::default()
    };

    let result = FormulaConverter::new().convert(text, &options);

    if json {
        return print_json(&result);
    }

    println!(
        "Intent: {} ({:.2})",
        result.intent.kind, result.intent.confidence
    );
    match &result.formula {
        Some(formula) => println!("Formula: {}", formula),
        None => println!("Formula: -"),
    }
    if let Some(built) = &result.formula_result {
        if !built.description.is_empty() {
            println!("Description: {}", built.description);
        }
        for warning in &built.warnings {
            println!("Warning: {}", warning);
        }
    }
    if let Some(evaluation) = &result.evaluation {
        match (&evaluation.value, &evaluation.error) {
            (_, Some(error)) => println!("Result: {}", error),
            (Some(value), None) => println!("Result: {}", value),
            (None, None) => {}
        }
    }
    for alt in &result.alternative_intents {
        println!(
            "Alternative: {} ({:.2}) {}",
            alt.kind,
            alt.confidence,
            alt.suggested_formula.as_deref().unwrap_or("")
        );
    }

    if !result.success {
        bail!(result
            .error
            .unwrap_or_else(|| "Conversion failed".to_string()));
    }
    Ok(())
}

fn suggest(text: &str, limit: usize) -> Result<()> {
    let suggestions = FormulaConverter::new().suggest(text, limit);
    if suggestions.is_empty() {
        eprintln!("No suggestions");
        return Ok(());
    }

    for s in suggestions {
        println!("{:<45} {:.2}  {}", s.formula, s.confidence, s.description);
    }
    Ok(())
}

fn list_templates(json: bool) -> Result<()> {
    let templates = FormulaConverter::new().templates();
    if json {
        return print_json(&templates);
    }

    for t in templates {
        println!("{}", t.intent);
        println!("  {}", t.template);
        println!("  {}", t.description);
        if !t.required_fields.is_empty() {
            println!("  Fields: {}", t.required_fields.join(", "));
        }
    }
    Ok(())
}

fn eval(formula: &str, values: &[String]) -> Result<()> {
    let ctx = parse_assignments(values)?;
    let ast = parse_formula(formula).with_context(|| format!("Failed to parse '{}'", formula))?;
    println!("{}", evaluate(&ast, &ctx));
    Ok(())
}

fn rows(input: Option<&Path>, output: Option<&Path>, values: &[String]) -> Result<()> {
    let text = match input {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read '{}'", path.display()))?,
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read stdin")?;
            buf
        }
    };

    let json: Value = serde_json::from_str(&text).context("Input is not valid JSON")?;
    let Value::Array(items) = json else {
        bail!("Expected a JSON array of row objects");
    };

    let rows = items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(map) => Ok(map
                .into_iter()
                .map(|(k, v)| (k, json_to_value(v)))
                .collect::<Row>()),
            _ => bail!("Row {} is not an object", i),
        })
        .collect::<Result<Vec<Row>>>()?;

    let extra = parse_assignments(values)?;
    let processed = process_rows(&rows, &extra);

    let out = serde_json::to_string_pretty(&processed).context("Failed to encode rows")?;
    match output {
        Some(path) => {
            std::fs::write(path, out)
                .with_context(|| format!("Failed to write '{}'", path.display()))?;
            eprintln!("Wrote {} rows to '{}'", processed.len(), path.display());
        }
        None => {
            let mut stdout = io::stdout();
            writeln!(stdout, "{}", out).context("Failed to write to stdout")?;
        }
    }
    Ok(())
}

fn tokenize(text: &str) -> Result<()> {
    let result: TokenizeResult = Tokenizer::new().tokenize(text);
    println!("Normalized: {}", result.normalized_text);
    for token in &result.tokens {
        println!(
            "{:>4}  {:<12} {:<20} {:?}",
            token.position,
            format!("{:?}", token.token_type()),
            token.value,
            token.kind
        );
    }
    Ok(())
}

/// `name=value` pairs; numbers, TRUE/FALSE, and otherwise text. Cell
/// addresses (`A1=5`) become cell values.
fn parse_assignments(values: &[String]) -> Result<EvaluationContext> {
    let mut ctx = EvaluationContext::new();
    for assignment in values {
        let (name, raw) = assignment
            .split_once('=')
            .with_context(|| format!("Expected NAME=VALUE, got '{}'", assignment))?;
        let name = name.trim();
        if name.is_empty() {
            bail!("Missing name in '{}'", assignment);
        }

        let value = parse_scalar(raw.trim());
        if nlsheet::CellAddress::parse(name).is_ok() {
            ctx.set_cell(name, value)
                .with_context(|| format!("Invalid cell '{}'", name))?;
        } else {
            ctx.set(name, value);
        }
    }
    Ok(ctx)
}

fn parse_scalar(raw: &str) -> FormulaValue {
    if let Ok(n) = raw.parse::<f64>() {
        return FormulaValue::Number(n);
    }
    match raw.to_ascii_uppercase().as_str() {
        "TRUE" => FormulaValue::Boolean(true),
        "FALSE" => FormulaValue::Boolean(false),
        _ => FormulaValue::String(raw.to_string()),
    }
}

fn json_to_value(value: Value) -> FormulaValue {
    match value {
        Value::Null => FormulaValue::Empty,
        Value::Bool(b) => FormulaValue::Boolean(b),
        Value::Number(n) => n.as_f64().map_or(FormulaValue::Empty, FormulaValue::Number),
        Value::String(s) => FormulaValue::String(s),
        other => FormulaValue::String(other.to_string()),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("Failed to encode JSON")?;
    println!("{}", out);
    Ok(())
}
