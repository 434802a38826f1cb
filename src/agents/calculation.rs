//! Arithmetic agent

use async_trait::async_trait;

use super::Agent;
use crate::intent::Intent;

/// Why an expression could not be evaluated
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvalError {
    /// Nothing left after dropping filler words
    #[error("empty expression")]
    Empty,

    /// Rejected by the expression parser or evaluator
    #[error("invalid expression: {0}")]
    Invalid(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("result is not a finite number")]
    NotFinite,
}

/// Functions that may be applied to a bare number ("sqrt 16")
const FUNCTIONS: &[&str] = &[
    "sqrt", "abs", "sin", "cos", "tan", "ln", "log", "exp", "floor", "ceil", "round",
];

/// Evaluate an arithmetic expression
///
/// Spoken operators ("plus", "divided by") and number words are accepted.
/// Supports `+ - * / % ^`, parentheses, `pi`, `e`, and the usual math
/// functions; `log` is base 10.
///
/// # Errors
///
/// Returns error if the expression is malformed, divides by zero, or the
/// result is not finite
pub fn evaluate(expression: &str) -> Result<f64, EvalError> {
    let rewritten = rewrite_spoken(expression);
    if rewritten.trim().is_empty() {
        return Err(EvalError::Empty);
    }

    let parsed: meval::Expr = rewritten
        .parse()
        .map_err(|e: meval::Error| EvalError::Invalid(e.to_string()))?;

    let mut context = meval::Context::new();
    context.func("log", f64::log10);

    let value = parsed
        .eval_with_context(&context)
        .map_err(|e| EvalError::Invalid(e.to_string()))?;

    if value.is_finite() {
        Ok(value)
    } else if rewritten.contains(['/', '%']) {
        Err(EvalError::DivisionByZero)
    } else {
        Err(EvalError::NotFinite)
    }
}

const FILLER: &[&str] = &[
    "what", "is", "whats", "calculate", "compute", "evaluate", "how", "much", "the", "please",
    "equals", "equal", "to", "of", "tell", "me", "solve", "and",
];

const PHRASES: &[(&[&str], &str)] = &[
    (&["divided", "by"], "/"),
    (&["multiplied", "by"], "*"),
    (&["to", "the", "power", "of"], "^"),
    (&["raised", "to"], "^"),
    (&["square", "root", "of"], "sqrt"),
    (&["square", "root"], "sqrt"),
    (&["plus"], "+"),
    (&["minus"], "-"),
    (&["times"], "*"),
    (&["x"], "*"),
    (&["over"], "/"),
    (&["mod"], "%"),
    (&["modulo"], "%"),
    (&["squared"], "^ 2"),
    (&["cubed"], "^ 3"),
];

fn number_word(word: &str) -> Option<u64> {
    let value = match word {
        "zero" => 0,
        "one" => 1,
        "two" => 2,
        "three" => 3,
        "four" => 4,
        "five" => 5,
        "six" => 6,
        "seven" => 7,
        "eight" => 8,
        "nine" => 9,
        "ten" => 10,
        "eleven" => 11,
        "twelve" => 12,
        "thirteen" => 13,
        "fourteen" => 14,
        "fifteen" => 15,
        "sixteen" => 16,
        "seventeen" => 17,
        "eighteen" => 18,
        "nineteen" => 19,
        "twenty" => 20,
        "thirty" => 30,
        "forty" => 40,
        "fifty" => 50,
        "sixty" => 60,
        "seventy" => 70,
        "eighty" => 80,
        "ninety" => 90,
        _ => return None,
    };
    Some(value)
}

/// Accumulates a run of number words ("two hundred and five")
#[derive(Default)]
struct SpokenNumber {
    total: u64,
    current: u64,
    active: bool,
}

impl SpokenNumber {
    fn push(&mut self, word: &str) -> bool {
        if let Some(value) = number_word(word) {
            self.current = self.current.saturating_add(value);
        } else if word == "hundred" && self.active {
            self.current = self.current.max(1).saturating_mul(100);
        } else if word == "thousand" && self.active {
            self.total = self
                .total
                .saturating_add(self.current.max(1).saturating_mul(1000));
            self.current = 0;
        } else if word == "million" && self.active {
            self.total = self
                .total
                .saturating_add(self.current.max(1).saturating_mul(1_000_000));
            self.current = 0;
        } else {
            return false;
        }
        self.active = true;
        true
    }

    fn flush(&mut self, out: &mut Vec<String>) {
        if self.active {
            out.push(self.total.saturating_add(self.current).to_string());
        }
        *self = Self::default();
    }
}

/// Turn a spoken expression into operator syntax
fn rewrite_spoken(text: &str) -> String {
    let mut spaced = String::with_capacity(text.len() * 2);
    for c in text.to_lowercase().replace("what's", "what is").chars() {
        match c {
            '+' | '-' | '*' | '/' | '%' | '^' | '(' | ')' => {
                spaced.push(' ');
                spaced.push(c);
                spaced.push(' ');
            }
            '×' => spaced.push_str(" * "),
            '÷' => spaced.push_str(" / "),
            ',' => {}
            '?' | '!' | '=' => spaced.push(' '),
            _ => spaced.push(c),
        }
    }

    let words: Vec<&str> = spaced.split_whitespace().collect();
    let mut out = Vec::with_capacity(words.len());
    let mut number = SpokenNumber::default();
    let mut i = 0;

    while i < words.len() {
        let word = words[i].trim_end_matches('.');

        // "and" inside a number ("two hundred and five")
        if word == "and" && number.active {
            i += 1;
            continue;
        }
        if number.push(word) {
            i += 1;
            continue;
        }
        number.flush(&mut out);

        if let Some((phrase, replacement)) = PHRASES
            .iter()
            .find(|(phrase, _)| words[i..].starts_with(phrase))
        {
            out.push((*replacement).to_string());
            i += phrase.len();
            continue;
        }

        if !FILLER.contains(&word) {
            out.push(words[i].to_string());
        }
        i += 1;
    }
    number.flush(&mut out);

    apply_bare_functions(out).join(" ")
}

/// Attach arguments to function names: `sqrt 16` -> `sqrt(16)`, `abs (` -> `abs(`
fn apply_bare_functions(tokens: Vec<String>) -> Vec<String> {
    let mut out = Vec::with_capacity(tokens.len());
    let mut iter = tokens.into_iter().peekable();

    while let Some(token) = iter.next() {
        if !FUNCTIONS.contains(&token.as_str()) {
            out.push(token);
            continue;
        }
        match iter.next_if(|next| next == "(" || next.parse::<f64>().is_ok()) {
            Some(open) if open == "(" => out.push(format!("{token}(")),
            Some(argument) => out.push(format!("{token}({argument})")),
            None => out.push(token),
        }
    }

    out
}

/// Format without trailing zeros
#[must_use]
pub fn format_number(value: f64) -> String {
    let formatted = format!("{value:.6}");
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    if trimmed == "-0" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Evaluates arithmetic expressions
#[derive(Debug, Default)]
pub struct CalculationAgent;

impl CalculationAgent {
    /// Create the agent
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Agent for CalculationAgent {
    fn name(&self) -> &str {
        "calculation"
    }

    async fn execute(&self, intent: &Intent) -> String {
        if intent.action != "evaluate_expression" {
            return "I don't know how to perform that calculation.".to_string();
        }

        let Some(expression) = intent.parameter_str("expression") else {
            return "You asked me to calculate something, but didn't provide an expression."
                .to_string();
        };

        tracing::info!(expression = %expression, "evaluating expression");

        match evaluate(expression) {
            Ok(value) => format!("The answer is {}", format_number(value)),
            Err(EvalError::DivisionByZero) => "I can't divide by zero.".to_string(),
            Err(e) => {
                tracing::warn!(expression = %expression, error = %e, "failed to evaluate");
                "I'm sorry, I couldn't understand that math expression.".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(expression: &str) -> f64 {
        evaluate(expression).unwrap()
    }

    #[test]
    fn test_precedence() {
        assert!((eval("2 + 3 * 4") - 14.0).abs() < 1e-9);
        assert!((eval("(2 + 3) * 4") - 20.0).abs() < 1e-9);
        assert!((eval("10 - 4 - 3") - 3.0).abs() < 1e-9);
        assert!((eval("2 ^ 10") - 1024.0).abs() < 1e-9);
        assert!((eval("17 % 5") - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_functions_and_constants() {
        assert!((eval("sqrt(16)") - 4.0).abs() < 1e-9);
        assert!((eval("sqrt 16 + 1") - 5.0).abs() < 1e-9);
        assert!((eval("2 * pi") - std::f64::consts::TAU).abs() < 1e-9);
        assert!((eval("log(1000)") - 3.0).abs() < 1e-9);
        assert!((eval("ln(e)") - 1.0).abs() < 1e-9);
        assert!((eval("abs(-3.5)") - 3.5).abs() < 1e-9);
    }

    #[test]
    fn test_spoken_expressions() {
        assert!((eval("what is twelve times seven") - 84.0).abs() < 1e-9);
        assert!((eval("What's 10 divided by 4?") - 2.5).abs() < 1e-9);
        assert!((eval("two hundred and five plus one") - 206.0).abs() < 1e-9);
        assert!((eval("square root of eighty one") - 9.0).abs() < 1e-9);
        assert!((eval("5 x 3") - 15.0).abs() < 1e-9);
        assert!((eval("three squared") - 9.0).abs() < 1e-9);
        assert!((eval("1,000 minus 1") - 999.0).abs() < 1e-9);
    }

    #[test]
    fn test_bare_function_rewrite() {
        assert_eq!(rewrite_spoken("square root of sixteen"), "sqrt(16)");
        assert_eq!(rewrite_spoken("sqrt 2 + abs(3)"), "sqrt(2) + abs( 3 )");
    }

    #[test]
    fn test_errors() {
        assert_eq!(evaluate(""), Err(EvalError::Empty));
        assert_eq!(evaluate("what is"), Err(EvalError::Empty));
        assert_eq!(evaluate("5 / 0"), Err(EvalError::DivisionByZero));
        assert_eq!(evaluate("sqrt(-1)"), Err(EvalError::NotFinite));
        assert!(matches!(evaluate("2 +"), Err(EvalError::Invalid(_))));
        assert!(matches!(evaluate("banana"), Err(EvalError::Invalid(_))));
        assert!(matches!(evaluate("(1 + 2"), Err(EvalError::Invalid(_))));
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(8.0), "8");
        assert_eq!(format_number(2.5), "2.5");
        assert_eq!(format_number(1.0 / 3.0), "0.333333");
        assert_eq!(format_number(-0.0), "0");
    }

    #[tokio::test]
    async fn test_execute() {
        let agent = CalculationAgent::new();

        let intent = Intent::new("calculation", "evaluate_expression", 1.0)
            .with_parameter("expression", "5 + 3");
        assert_eq!(agent.execute(&intent).await, "The answer is 8");

        let missing = Intent::new("calculation", "evaluate_expression", 1.0);
        assert!(agent.execute(&missing).await.contains("didn't provide an expression"));

        let bad = Intent::new("calculation", "evaluate_expression", 1.0)
            .with_parameter("expression", "five banana");
        assert!(agent.execute(&bad).await.starts_with("I'm sorry"));

        let zero = Intent::new("calculation", "evaluate_expression", 1.0)
            .with_parameter("expression", "ten divided by zero");
        assert_eq!(agent.execute(&zero).await, "I can't divide by zero.");

        let other = Intent::new("calculation", "integrate", 1.0);
        assert_eq!(
            agent.execute(&other).await,
            "I don't know how to perform that calculation."
        );
    }
}
