//! 布尔表达式树（仅 AND / OR / NOT），用于梯级逻辑的语义比对。
//!
//! 规范形：否定下推到变量、展平嵌套 AND/OR、操作数排序去重、常量折叠。
//! 规范形相同必然等价；不同时再按真值表穷举判定。

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Expr {
    Const(bool),
    Var(String),
    Not(Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
}

/// 两个表达式的等价判定结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Equivalence {
    Equivalent,
    /// 反例：在该赋值下两者取值不同
    Different { counterexample: BTreeMap<String, bool> },
    /// 变量过多，放弃穷举
    TooManyVariables(usize),
}

impl Expr {
    pub fn var(name: impl Into<String>) -> Self {
        Expr::Var(name.into())
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(inner: Expr) -> Self {
        Expr::Not(Box::new(inner))
    }

    pub fn and(items: Vec<Expr>) -> Self {
        Expr::And(items)
    }

    pub fn or(items: Vec<Expr>) -> Self {
        Expr::Or(items)
    }

    pub fn evaluate<F: Fn(&str) -> bool>(&self, env: &F) -> bool {
        match self {
            Expr::Const(value) => *value,
            Expr::Var(name) => env(name),
            Expr::Not(inner) => !inner.evaluate(env),
            Expr::And(items) => items.iter().all(|item| item.evaluate(env)),
            Expr::Or(items) => items.iter().any(|item| item.evaluate(env)),
        }
    }

    pub fn variables(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_variables(&mut out);
        out
    }

    fn collect_variables(&self, out: &mut BTreeSet<String>) {
        match self {
            Expr::Const(_) => {}
            Expr::Var(name) => {
                out.insert(name.clone());
            }
            Expr::Not(inner) => inner.collect_variables(out),
            Expr::And(items) | Expr::Or(items) => {
                for item in items {
                    item.collect_variables(out);
                }
            }
        }
    }

    /// 把变量 `name` 替换为 `replacement`
    pub fn substitute(&self, name: &str, replacement: &Expr) -> Expr {
        match self {
            Expr::Var(var) if var == name => replacement.clone(),
            Expr::Const(_) | Expr::Var(_) => self.clone(),
            Expr::Not(inner) => Expr::not(inner.substitute(name, replacement)),
            Expr::And(items) => Expr::And(items.iter().map(|i| i.substitute(name, replacement)).collect()),
            Expr::Or(items) => Expr::Or(items.iter().map(|i| i.substitute(name, replacement)).collect()),
        }
    }

    /// 规范形（幂等：`e.normalize().normalize() == e.normalize()`）
    pub fn normalize(&self) -> Expr {
        simplify(push_negation(self, false))
    }
}

fn push_negation(expr: &Expr, negate: bool) -> Expr {
    match expr {
        Expr::Const(value) => Expr::Const(*value != negate),
        Expr::Var(_) if negate => Expr::not(expr.clone()),
        Expr::Var(_) => expr.clone(),
        Expr::Not(inner) => push_negation(inner, !negate),
        Expr::And(items) => {
            let items = items.iter().map(|item| push_negation(item, negate)).collect();
            if negate {
                Expr::Or(items)
            } else {
                Expr::And(items)
            }
        }
        Expr::Or(items) => {
            let items = items.iter().map(|item| push_negation(item, negate)).collect();
            if negate {
                Expr::And(items)
            } else {
                Expr::Or(items)
            }
        }
    }
}

fn simplify(expr: Expr) -> Expr {
    match expr {
        Expr::And(items) => simplify_junction(items, true),
        Expr::Or(items) => simplify_junction(items, false),
        other => other,
    }
}

/// `is_and = true` 处理合取，否则处理析取；两者互为对偶
fn simplify_junction(items: Vec<Expr>, is_and: bool) -> Expr {
    let identity = is_and;
    let absorbing = !is_and;

    let mut flat: Vec<Expr> = Vec::new();
    for item in items.into_iter().map(simplify) {
        match item {
            Expr::Const(value) if value == identity => {}
            Expr::Const(value) if value == absorbing => return Expr::Const(absorbing),
            Expr::And(inner) if is_and => flat.extend(inner),
            Expr::Or(inner) if !is_and => flat.extend(inner),
            other => flat.push(other),
        }
    }
    flat.sort();
    flat.dedup();

    // x 与 NOT x 同时出现
    let complementary = flat.iter().any(|item| match item {
        Expr::Not(inner) => flat.contains(inner),
        _ => false,
    });
    if complementary {
        return Expr::Const(absorbing);
    }

    match flat.len() {
        0 => Expr::Const(identity),
        1 => flat.pop().unwrap_or(Expr::Const(identity)),
        _ if is_and => Expr::And(flat),
        _ => Expr::Or(flat),
    }
}

/// 语义等价判定：先比规范形，再在 `limit` 个变量以内穷举真值表
pub fn equivalence(left: &Expr, right: &Expr, limit: usize) -> Equivalence {
    if left.normalize() == right.normalize() {
        return Equivalence::Equivalent;
    }

    let mut names = left.variables();
    names.extend(right.variables());
    let names: Vec<String> = names.into_iter().collect();
    if names.len() > limit || names.len() >= u64::BITS as usize {
        return Equivalence::TooManyVariables(names.len());
    }

    for bits in 0u64..(1u64 << names.len()) {
        let assignment: BTreeMap<String, bool> = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), bits & (1 << i) != 0))
            .collect();
        let env = |name: &str| assignment.get(name).copied().unwrap_or(false);
        if left.evaluate(&env) != right.evaluate(&env) {
            return Equivalence::Different {
                counterexample: assignment,
            };
        }
    }
    Equivalence::Equivalent
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Const(true) => f.write_str("TRUE"),
            Expr::Const(false) => f.write_str("FALSE"),
            Expr::Var(name) => f.write_str(name),
            Expr::Not(inner) => {
                f.write_str("NOT ")?;
                write_operand(f, inner)
            }
            Expr::And(items) => write_junction(f, items, " AND "),
            Expr::Or(items) => write_junction(f, items, " OR "),
        }
    }
}

fn write_junction(f: &mut fmt::Formatter<'_>, items: &[Expr], separator: &str) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(separator)?;
        }
        write_operand(f, item)?;
    }
    Ok(())
}

fn write_operand(f: &mut fmt::Formatter<'_>, expr: &Expr) -> fmt::Result {
    match expr {
        Expr::And(_) | Expr::Or(_) => write!(f, "({expr})"),
        _ => write!(f, "{expr}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(name: &str) -> Expr {
        Expr::var(name)
    }

    #[test]
    fn normal_form_ignores_operand_order_and_nesting() {
        let a = Expr::and(vec![v("B"), Expr::and(vec![v("A"), v("C")])]);
        let b = Expr::and(vec![v("C"), v("B"), v("A")]);
        assert_eq!(a.normalize(), b.normalize());
        assert_eq!(a.normalize().to_string(), "A AND B AND C");
    }

    #[test]
    fn pushes_negation_with_de_morgan() {
        let e = Expr::not(Expr::or(vec![v("A"), Expr::not(v("B"))]));
        assert_eq!(e.normalize().to_string(), "B AND NOT A");
    }

    #[test]
    fn folds_constants_and_complements() {
        let e = Expr::and(vec![v("A"), Expr::Const(true)]);
        assert_eq!(e.normalize(), v("A"));
        let e = Expr::or(vec![v("A"), Expr::not(v("A"))]);
        assert_eq!(e.normalize(), Expr::Const(true));
        let e = Expr::and(vec![v("A"), Expr::Const(false)]);
        assert_eq!(e.normalize(), Expr::Const(false));
    }

    #[test]
    fn normalize_is_idempotent() {
        let e = Expr::and(vec![
            Expr::or(vec![v("%I0.1"), v("%Q0.0")]),
            Expr::not(v("%I0.2")),
        ]);
        let once = e.normalize();
        assert_eq!(once.normalize(), once);
    }

    #[test]
    fn substitute_replaces_every_occurrence() {
        let e = Expr::and(vec![v("Q"), Expr::not(v("R"))]);
        let latched = e.substitute("Q", &Expr::or(vec![v("Q"), v("S")]));
        assert_eq!(latched.to_string(), "(Q OR S) AND NOT R");
    }

    #[test]
    fn truth_table_catches_equivalences_normal_form_misses() {
        // 吸收律：A OR (A AND B) == A
        let left = Expr::or(vec![v("A"), Expr::and(vec![v("A"), v("B")])]);
        assert_eq!(equivalence(&left, &v("A"), 16), Equivalence::Equivalent);
    }

    #[test]
    fn reports_counterexample_and_variable_limit() {
        let left = Expr::and(vec![v("A"), Expr::not(v("B"))]);
        let right = Expr::and(vec![v("B"), Expr::not(v("A"))]);
        match equivalence(&left, &right, 16) {
            Equivalence::Different { counterexample } => {
                let env = |n: &str| counterexample.get(n).copied().unwrap_or(false);
                assert_ne!(left.evaluate(&env), right.evaluate(&env));
            }
            other => panic!("expected a counterexample, got {other:?}"),
        }
        assert_eq!(equivalence(&left, &right, 1), Equivalence::TooManyVariables(2));
    }
}
