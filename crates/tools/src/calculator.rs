//! Calculator tool: evaluates arithmetic expressions.
//!
//! Supports `+`, `-`, `*`, `/`, `%`, `^`, parentheses and unary negation.

use async_trait::async_trait;
use toolgate_core::{
    ArgType, ArgsSchema, RichComponent, Severity, Tool, ToolArgs, ToolContext, ToolError,
    ToolResult, UiComponent,
};

pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Evaluate an arithmetic expression. Supports +, -, *, /, %, ^, parentheses, and decimal numbers."
    }

    fn args_schema(&self) -> ArgsSchema {
        ArgsSchema::new().required(
            "expression",
            ArgType::String,
            "The expression to evaluate, e.g. '(2 + 3) * 4'",
        )
    }

    async fn execute(&self, _context: &ToolContext, args: ToolArgs) -> Result<ToolResult, ToolError> {
        let expr = args
            .get_str("expression")
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'expression' argument".into()))?;

        match evaluate(expr) {
            Ok(value) => {
                let formatted = format_number(value);
                let ui = UiComponent::from_rich(RichComponent::Text {
                    content: format!("`{expr}` = **{formatted}**"),
                    markdown: true,
                })
                .with_simple_text(format!("{expr} = {formatted}"));
                Ok(ToolResult::success(formatted)
                    .with_ui(ui)
                    .with_metadata("value", serde_json::json!(value)))
            }
            Err(e) => Ok(ToolResult::failure(format!("Error: {e}"))
                .with_ui(UiComponent::status(Severity::Error, format!("Could not evaluate: {e}")))),
        }
    }
}

/// Drop a trailing `.0` for integral values.
fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

// ── Expression evaluator ──────────────────────────────────────────────────

/// Why an expression could not be evaluated. Positions are byte offsets.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CalcError {
    #[error("Division by zero")]
    DivisionByZero,

    #[error("Invalid number '{0}'")]
    InvalidNumber(String),

    #[error("Unexpected character '{ch}' at {at}")]
    UnexpectedChar { ch: char, at: usize },

    #[error("Unexpected {found} at {at}")]
    UnexpectedToken { found: String, at: usize },

    #[error("Missing ')' for the '(' at {0}")]
    Unclosed(usize),

    #[error("Expression ended early")]
    UnexpectedEnd,
}

/// Evaluate an arithmetic expression.
pub fn evaluate(expr: &str) -> Result<f64, CalcError> {
    let mut eval = Evaluator {
        tokens: lex(expr)?.into_iter().peekable(),
    };
    let value = eval.expr(0)?;
    match eval.tokens.next() {
        None => Ok(value),
        Some((at, token)) => Err(CalcError::UnexpectedToken {
            found: token.to_string(),
            at,
        }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Num(f64),
    Op(char),
    Open,
    Close,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Num(n) => write!(f, "number {n}"),
            Token::Op(op) => write!(f, "'{op}'"),
            Token::Open => f.write_str("'('"),
            Token::Close => f.write_str("')'"),
        }
    }
}

fn lex(input: &str) -> Result<Vec<(usize, Token)>, CalcError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some((at, ch)) = chars.next() {
        let token = match ch {
            c if c.is_whitespace() => continue,
            '+' | '-' | '*' | '/' | '%' | '^' => Token::Op(ch),
            '(' => Token::Open,
            ')' => Token::Close,
            c if c.is_ascii_digit() || c == '.' => {
                let mut end = at + c.len_utf8();
                while let Some(&(i, d)) = chars.peek() {
                    if !(d.is_ascii_digit() || d == '.') {
                        break;
                    }
                    end = i + d.len_utf8();
                    chars.next();
                }
                let literal = &input[at..end];
                let value = literal
                    .parse()
                    .map_err(|_| CalcError::InvalidNumber(literal.to_string()))?;
                Token::Num(value)
            }
            ch => return Err(CalcError::UnexpectedChar { ch, at }),
        };
        tokens.push((at, token));
    }
    Ok(tokens)
}

/// Binding power of prefix `-`: looser than `^`, tighter than `*`.
const NEGATION_BP: u8 = 5;

/// (left, right) binding powers; `^` binds right-to-left.
fn infix_bp(op: char) -> (u8, u8) {
    match op {
        '+' | '-' => (1, 2),
        '*' | '/' | '%' => (3, 4),
        _ => (6, 5),
    }
}

fn apply(op: char, lhs: f64, rhs: f64) -> Result<f64, CalcError> {
    Ok(match op {
        '+' => lhs + rhs,
        '-' => lhs - rhs,
        '*' => lhs * rhs,
        '/' | '%' if rhs == 0.0 => return Err(CalcError::DivisionByZero),
        '/' => lhs / rhs,
        '%' => lhs % rhs,
        _ => lhs.powf(rhs),
    })
}

/// Pratt parser evaluating as it goes.
struct Evaluator {
    tokens: std::iter::Peekable<std::vec::IntoIter<(usize, Token)>>,
}

impl Evaluator {
    fn expr(&mut self, min_bp: u8) -> Result<f64, CalcError> {
        let mut lhs = match self.tokens.next() {
            Some((_, Token::Num(n))) => n,
            Some((_, Token::Op('-'))) => -self.expr(NEGATION_BP)?,
            Some((open_at, Token::Open)) => {
                let inner = self.expr(0)?;
                match self.tokens.next() {
                    Some((_, Token::Close)) => inner,
                    _ => return Err(CalcError::Unclosed(open_at)),
                }
            }
            Some((at, token)) => {
                return Err(CalcError::UnexpectedToken {
                    found: token.to_string(),
                    at,
                });
            }
            None => return Err(CalcError::UnexpectedEnd),
        };

        while let Some(&(_, Token::Op(op))) = self.tokens.peek() {
            let (left_bp, right_bp) = infix_bp(op);
            if left_bp < min_bp {
                break;
            }
            self.tokens.next();
            let rhs = self.expr(right_bp)?;
            lhs = apply(op, lhs, rhs)?;
        }
        Ok(lhs)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────
