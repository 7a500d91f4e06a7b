//! 期望逻辑描述 → 布尔语句。
//!
//! 语法：`目标 = 表达式` 或 `表达式 -> 目标`，语句以 `;` 或换行分隔。
//! 运算符：`AND & && *`、`OR | || +`、`NOT ! ~`、括号、`TRUE`/`FALSE`。
//! 标识符：地址、块成员（`%TM0.Q`）、比较表达式（`[%MW0>100]`）或别名。
//! 自由文本只识别少数固定句式，先改写成上述语法再解析。

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

use super::il::canonical_operand;
use crate::domain::Expr;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExpectedError {
    #[error("statement {statement}: {message}")]
    Syntax { statement: usize, message: String },

    #[error("statement {statement}: operator {operator} cannot be expressed with AND/OR/NOT")]
    UnsupportedOperator { statement: usize, operator: String },

    #[error("no statements in expected logic")]
    Empty,
}

/// 一条期望语句；变量名已规范化，别名保持原样，留给文档解析
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub source: String,
    pub target: String,
    pub expr: Expr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    And,
    Or,
    Not,
    True,
    False,
    Open,
    Close,
    Assign,
    Arrow,
}

/// 期望文本中的一条原始语句及其解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedStatement {
    pub source: String,
    pub result: Result<Statement, ExpectedError>,
}

/// 逐条解析：某一条出错只影响该条本身
pub fn parse_statements(text: &str) -> Vec<ParsedStatement> {
    text.split(|c| c == ';' || c == '\n')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .enumerate()
        .map(|(i, raw)| ParsedStatement {
            source: raw.to_string(),
            result: parse_statement(i + 1, raw),
        })
        .collect()
}

/// 整体解析：任一语句出错即失败
pub fn parse_expected(text: &str) -> Result<Vec<Statement>, ExpectedError> {
    let out = parse_statements(text)
        .into_iter()
        .map(|parsed| parsed.result)
        .collect::<Result<Vec<_>, _>>()?;
    if out.is_empty() {
        return Err(ExpectedError::Empty);
    }
    Ok(out)
}

fn parse_statement(statement: usize, raw: &str) -> Result<Statement, ExpectedError> {
    let rewritten = rewrite_phrase(raw).unwrap_or_else(|| raw.to_string());
    let tokens = tokenize(statement, &rewritten)?;
    let (target, expr) = split_statement(statement, &tokens)?;
    Ok(Statement {
        source: raw.to_string(),
        target,
        expr,
    })
}

const IDENT: &str = r"(%[\w.]+|\[[^\]]+\]|[A-Za-z_]\w*)";

struct Phrase {
    pattern: Regex,
    rewrite: fn(&regex::Captures<'_>) -> String,
}

fn phrases() -> &'static [Phrase] {
    static PHRASES: OnceLock<Vec<Phrase>> = OnceLock::new();
    PHRASES.get_or_init(|| {
        let compile = |body: String| {
            Regex::new(&format!(r"(?i)^{body}\.?$")).expect("static phrase pattern")
        };
        vec![
            Phrase {
                pattern: compile(format!(
                    r"(?P<x>{IDENT})\s+stays\s+on\s+once\s+(?P<a>{IDENT})\s+triggers\s+it,?\s+until\s+(?P<b>{IDENT})\s+stops\s+it"
                )),
                rewrite: |c| format!("{x} = ({a} OR {x}) AND NOT {b}", x = &c["x"], a = &c["a"], b = &c["b"]),
            },
            Phrase {
                pattern: compile(format!(
                    r"(?P<a>{IDENT})\s+starts\s+(?P<x>{IDENT}),?\s+(?:and\s+)?(?P<b>{IDENT})\s+stops\s+it"
                )),
                rewrite: |c| format!("{x} = ({a} OR {x}) AND NOT {b}", x = &c["x"], a = &c["a"], b = &c["b"]),
            },
            Phrase {
                pattern: compile(format!(
                    r"(?P<x>{IDENT})\s+is\s+the\s+inverse\s+of\s+(?P<a>{IDENT})"
                )),
                rewrite: |c| format!("{} = NOT {}", &c["x"], &c["a"]),
            },
            Phrase {
                pattern: compile(format!(r"(?P<x>{IDENT})\s+follows\s+(?P<a>{IDENT})")),
                rewrite: |c| format!("{} = {}", &c["x"], &c["a"]),
            },
            Phrase {
                pattern: compile(format!(
                    r"(?P<x>{IDENT})\s+(?:turns\s+on|is\s+on|is\s+energized|energizes)\s+(?:when|while|if)\s+(?P<cond>.+?)"
                )),
                rewrite: |c| format!("{} = {}", &c["x"], &c["cond"]),
            },
        ]
    })
}

/// 固定句式改写；不匹配时返回 None
fn rewrite_phrase(text: &str) -> Option<String> {
    phrases().iter().find_map(|phrase| {
        phrase
            .pattern
            .captures(text)
            .map(|caps| (phrase.rewrite)(&caps))
    })
}

fn tokenize(statement: usize, text: &str) -> Result<Vec<Token>, ExpectedError> {
    let syntax = |message: String| ExpectedError::Syntax { statement, message };
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::Open);
                i += 1;
            }
            ')' => {
                tokens.push(Token::Close);
                i += 1;
            }
            '&' | '*' => {
                tokens.push(Token::And);
                i += if chars.get(i + 1) == Some(&'&') { 2 } else { 1 };
            }
            '|' | '+' => {
                tokens.push(Token::Or);
                i += if chars.get(i + 1) == Some(&'|') { 2 } else { 1 };
            }
            '!' | '~' => {
                tokens.push(Token::Not);
                i += 1;
            }
            '=' => {
                tokens.push(Token::Assign);
                i += 1;
            }
            '-' if chars.get(i + 1) == Some(&'>') => {
                tokens.push(Token::Arrow);
                i += 2;
            }
            '^' => {
                return Err(ExpectedError::UnsupportedOperator {
                    statement,
                    operator: "^".to_string(),
                })
            }
            '[' => {
                let end = chars[i..]
                    .iter()
                    .position(|&c| c == ']')
                    .ok_or_else(|| syntax("unterminated comparison".to_string()))?;
                let raw: String = chars[i..=i + end].iter().collect();
                let name = canonical_operand(&raw, None)
                    .ok_or_else(|| syntax(format!("invalid comparison {raw}")))?;
                tokens.push(Token::Ident(name));
                i += end + 1;
            }
            '%' => {
                let len = chars[i + 1..]
                    .iter()
                    .take_while(|c| c.is_ascii_alphanumeric() || **c == '.')
                    .count();
                let raw: String = chars[i..=i + len].iter().collect();
                let raw = raw.trim_end_matches('.');
                let name = canonical_operand(raw, None)
                    .ok_or_else(|| syntax(format!("invalid address {raw}")))?;
                tokens.push(Token::Ident(name));
                i += len + 1;
            }
            c if c.is_alphabetic() || c == '_' => {
                let len = chars[i..]
                    .iter()
                    .take_while(|c| c.is_alphanumeric() || **c == '_')
                    .count();
                let word: String = chars[i..i + len].iter().collect();
                tokens.push(match word.to_ascii_uppercase().as_str() {
                    "AND" => Token::And,
                    "OR" => Token::Or,
                    "NOT" => Token::Not,
                    "TRUE" => Token::True,
                    "FALSE" => Token::False,
                    "XOR" | "XNOR" | "NAND" | "NOR" | "RISING" | "FALLING" => {
                        return Err(ExpectedError::UnsupportedOperator {
                            statement,
                            operator: word,
                        })
                    }
                    _ => Token::Ident(word),
                });
                i += len;
            }
            other => return Err(syntax(format!("unexpected character '{other}'"))),
        }
    }
    Ok(tokens)
}

fn split_statement(statement: usize, tokens: &[Token]) -> Result<(String, Expr), ExpectedError> {
    let syntax = |message: &str| ExpectedError::Syntax {
        statement,
        message: message.to_string(),
    };
    let (target_tokens, expr_tokens) =
        if let Some(at) = tokens.iter().position(|t| *t == Token::Arrow) {
            (&tokens[at + 1..], &tokens[..at])
        } else if let Some(at) = tokens.iter().position(|t| *t == Token::Assign) {
            (&tokens[..at], &tokens[at + 1..])
        } else {
            return Err(syntax("expected 'target = expression' or 'expression -> target'"));
        };

    let target = match target_tokens {
        [Token::Ident(name)] => name.clone(),
        _ => return Err(syntax("the target must be a single address or symbol")),
    };

    let mut parser = ExprParser {
        tokens: expr_tokens,
        pos: 0,
        statement,
    };
    let expr = parser.or_expr()?;
    if parser.pos != expr_tokens.len() {
        return Err(syntax("trailing tokens after expression"));
    }
    Ok((target, expr))
}

struct ExprParser<'a> {
    tokens: &'a [Token],
    pos: usize,
    statement: usize,
}

impl ExprParser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn error(&self, message: &str) -> ExpectedError {
        ExpectedError::Syntax {
            statement: self.statement,
            message: message.to_string(),
        }
    }

    fn or_expr(&mut self) -> Result<Expr, ExpectedError> {
        let mut items = vec![self.and_expr()?];
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            items.push(self.and_expr()?);
        }
        Ok(if items.len() == 1 {
            items.remove(0)
        } else {
            Expr::or(items)
        })
    }

    fn and_expr(&mut self) -> Result<Expr, ExpectedError> {
        let mut items = vec![self.unary()?];
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            items.push(self.unary()?);
        }
        Ok(if items.len() == 1 {
            items.remove(0)
        } else {
            Expr::and(items)
        })
    }

    fn unary(&mut self) -> Result<Expr, ExpectedError> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            return Ok(Expr::not(self.unary()?));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, ExpectedError> {
        let token = self.peek().cloned().ok_or_else(|| self.error("unexpected end of expression"))?;
        self.pos += 1;
        match token {
            Token::Ident(name) => Ok(Expr::Var(name)),
            Token::True => Ok(Expr::Const(true)),
            Token::False => Ok(Expr::Const(false)),
            Token::Open => {
                let inner = self.or_expr()?;
                if self.peek() != Some(&Token::Close) {
                    return Err(self.error("missing ')'"));
                }
                self.pos += 1;
                Ok(inner)
            }
            _ => Err(self.error("expected an operand")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one(text: &str) -> Statement {
        let mut out = parse_expected(text).unwrap();
        assert_eq!(out.len(), 1);
        out.remove(0)
    }

    #[test]
    fn parses_both_statement_forms_with_precedence() {
        let s = one("%Q0.0 = %I0.1 & !%I0.2 | %M0");
        assert_eq!(s.target, "%Q0.0");
        assert_eq!(s.expr.to_string(), "(%I0.1 AND NOT %I0.2) OR %M0");

        let s = one("(start OR motor) AND NOT stop -> motor");
        assert_eq!(s.target, "motor");
        assert_eq!(s.expr.to_string(), "(start OR motor) AND NOT stop");
    }

    #[test]
    fn canonicalizes_addresses_and_comparisons() {
        let s = one("%q0.0 = [ %mw0 > 10 ] and %tm0.q");
        assert_eq!(s.target, "%Q0.0");
        assert_eq!(s.expr.to_string(), "[%MW0>10] AND %TM0.Q");
    }

    #[test]
    fn rewrites_seal_in_phrase() {
        let s = one("%Q0.0 stays on once %I0.1 triggers it, until %I0.2 stops it.");
        assert_eq!(s.expr.to_string(), "(%I0.1 OR %Q0.0) AND NOT %I0.2");

        let s = one("Start starts Motor, Stop stops it");
        assert_eq!(s.target, "Motor");
        assert_eq!(s.expr.to_string(), "(Start OR Motor) AND NOT Stop");
    }

    #[test]
    fn rewrites_simple_phrases() {
        assert_eq!(one("Lamp turns on when A and not B").expr.to_string(), "A AND NOT B");
        assert_eq!(one("%Q0.1 follows %I0.3").expr.to_string(), "%I0.3");
        assert_eq!(one("%Q0.1 is the inverse of %I0.3").expr.to_string(), "NOT %I0.3");
    }

    #[test]
    fn splits_statements_and_reports_errors() {
        let out = parse_expected("%Q0.0 = %I0.0; %Q0.1 = %I0.1\n\n%Q0.2 = TRUE").unwrap();
        assert_eq!(out.len(), 3);

        assert!(matches!(
            parse_expected("%Q0.0 = %I0.0 XOR %I0.1"),
            Err(ExpectedError::UnsupportedOperator { .. })
        ));
        assert!(matches!(parse_expected("%Q0.0 = (%I0.0"), Err(ExpectedError::Syntax { .. })));
        assert!(matches!(parse_expected("%I0.0 AND %I0.1"), Err(ExpectedError::Syntax { .. })));
        assert_eq!(parse_expected("  ;\n"), Err(ExpectedError::Empty));
    }

    #[test]
    fn statements_fail_one_at_a_time() {
        let out = parse_statements("%Q0.0 = %I0.0 XOR %I0.1; %Q0.1 = NOT %I0.2");
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].source, "%Q0.0 = %I0.0 XOR %I0.1");
        assert!(matches!(out[0].result, Err(ExpectedError::UnsupportedOperator { statement: 1, .. })));
        assert_eq!(out[1].result.as_ref().map(|s| s.target.as_str()), Ok("%Q0.1"));
    }
}
