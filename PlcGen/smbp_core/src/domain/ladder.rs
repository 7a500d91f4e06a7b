//! 梯形图求值：在给定变量赋值下计算能流，得到每个线圈/功能块输入的取值。
//!
//! 电气模型：
//! - 每行的列边界 `(row, b)`（b = 0..=11）是一个节点，`b = 0` 为左母线。
//! - 元件左端子位于 `(r, c)`（需 `Left`），右端子位于 `(r, c+w)`（需 `Right`）。
//! - `Up`/`Down` 把右端子并到上/下一行同一边界；线圈右侧是母线，因此作用在左端子上。
//! - 导通的元件把左右端子连通；线圈左端子与母线连通即得电。
//! - 定时器/计数器的左端子只决定输入引脚，完成位为真时右端子直接接到母线。

use std::collections::{BTreeMap, BTreeSet};

use super::element::{Element, ElementKind, Operand, OUTPUT_COLUMN};

/// 功能块引脚名
pub const TIMER_INPUT: &str = "IN";
pub const TIMER_DONE: &str = "Q";
pub const COUNTER_UP: &str = "CU";
pub const COUNTER_DONE: &str = "D";

const BOUNDARIES: usize = OUTPUT_COLUMN as usize + 2;

struct Nodes {
    parent: Vec<usize>,
    rows: usize,
}

impl Nodes {
    fn new(rows: usize) -> Self {
        Self {
            parent: (0..rows * BOUNDARIES).collect(),
            rows,
        }
    }

    fn id(&self, row: i64, boundary: usize) -> Option<usize> {
        if row < 0 || row as usize >= self.rows || boundary >= BOUNDARIES {
            return None;
        }
        Some(row as usize * BOUNDARIES + boundary)
    }

    fn find(&mut self, mut node: usize) -> usize {
        while self.parent[node] != node {
            self.parent[node] = self.parent[self.parent[node]];
            node = self.parent[node];
        }
        node
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[ra] = rb;
        }
    }

    fn union_all(&mut self, nodes: &[usize]) {
        for pair in nodes.windows(2) {
            self.union(pair[0], pair[1]);
        }
    }
}

struct Terminals {
    left: Vec<usize>,
    right: Vec<usize>,
}

fn terminals(nodes: &Nodes, element: &Element) -> Terminals {
    let pos = element.position();
    let row = i64::from(pos.row);
    let col = pos.column as usize;
    let end = col + element.width() as usize;
    let conn = element.connections();

    let mut left = Vec::new();
    let mut right = Vec::new();
    if conn.left {
        left.extend(nodes.id(row, col));
    }
    if element.kind() == ElementKind::Coil {
        if conn.up {
            left.extend(nodes.id(row - 1, col));
        }
        if conn.down {
            left.extend(nodes.id(row + 1, col));
        }
    } else {
        if conn.right {
            right.extend(nodes.id(row, end));
        }
        if conn.up {
            right.extend(nodes.id(row - 1, end));
        }
        if conn.down {
            right.extend(nodes.id(row + 1, end));
        }
    }
    Terminals { left, right }
}

/// 元件读取的变量名（触点地址、比较表达式、功能块完成位）
pub fn input_variable(element: &Element) -> Option<String> {
    match (element.kind(), element.operand()) {
        (ElementKind::NormalContact | ElementKind::NegatedContact, Operand::Address(a)) => {
            Some(a.to_string())
        }
        (ElementKind::CompareBlock, Operand::Comparison(cmp)) => Some(cmp.to_string()),
        (ElementKind::Timer, Operand::Address(a)) => Some(a.member(TIMER_DONE)),
        (ElementKind::Counter, Operand::Address(a)) => Some(a.member(COUNTER_DONE)),
        _ => None,
    }
}

/// 元件驱动的变量名（线圈地址、功能块输入引脚）
pub fn output_variable(element: &Element) -> Option<String> {
    match (element.kind(), element.operand()) {
        (ElementKind::Coil, Operand::Address(a)) => Some(a.to_string()),
        (ElementKind::Timer, Operand::Address(a)) => Some(a.member(TIMER_INPUT)),
        (ElementKind::Counter, Operand::Address(a)) => Some(a.member(COUNTER_UP)),
        _ => None,
    }
}

pub fn ladder_inputs(elements: &[Element]) -> BTreeSet<String> {
    elements.iter().filter_map(input_variable).collect()
}

fn conducts<F: Fn(&str) -> bool>(element: &Element, env: &F) -> bool {
    match element.kind() {
        ElementKind::Line => true,
        ElementKind::Coil => false,
        ElementKind::NegatedContact => input_variable(element).is_some_and(|name| !env(&name)),
        _ => input_variable(element).is_some_and(|name| env(&name)),
    }
}

/// 在赋值 `env` 下求值，返回 输出变量 → 是否得电
pub fn evaluate_ladder<F: Fn(&str) -> bool>(elements: &[Element], env: &F) -> BTreeMap<String, bool> {
    let rows = elements
        .iter()
        .map(|e| e.position().row as usize + 2)
        .max()
        .unwrap_or(1);
    let mut nodes = Nodes::new(rows);

    let rail: Vec<usize> = (0..rows as i64).filter_map(|r| nodes.id(r, 0)).collect();
    nodes.union_all(&rail);

    let wired: Vec<(usize, Terminals)> = elements
        .iter()
        .enumerate()
        .map(|(i, element)| (i, terminals(&nodes, element)))
        .collect();

    for (i, terms) in &wired {
        nodes.union_all(&terms.left);
        nodes.union_all(&terms.right);
        let element = &elements[*i];
        if !conducts(element, env) {
            continue;
        }
        // 功能块输出由完成位驱动，与输入端是否得电无关
        let source = if element.kind().is_block() {
            rail.first()
        } else {
            terms.left.first()
        };
        if let (Some(s), Some(r)) = (source, terms.right.first()) {
            nodes.union(*s, *r);
        }
    }

    let rail_root = rail.first().map(|r| nodes.find(*r));
    let mut out = BTreeMap::new();
    for (i, terms) in &wired {
        let Some(name) = output_variable(&elements[*i]) else {
            continue;
        };
        let energized = match (terms.left.first(), rail_root) {
            (Some(l), Some(root)) => nodes.find(*l) == root,
            _ => false,
        };
        *out.entry(name).or_insert(false) |= energized;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::element::Connections;

    fn element(kind: ElementKind, operand: &str, row: i64, col: i64, conn: Connections) -> Element {
        let operand = if operand.is_empty() {
            Operand::None
        } else {
            Operand::Address(operand.parse().unwrap())
        };
        Element::new(kind, operand, row, col, conn).unwrap()
    }

    fn seal_in() -> Vec<Element> {
        let mut out = vec![
            element(ElementKind::NormalContact, "%I0.1", 0, 0, Connections::LEFT_RIGHT),
            element(ElementKind::NegatedContact, "%I0.2", 0, 1, Connections::LEFT_RIGHT),
            element(ElementKind::NormalContact, "%Q0.0", 1, 0, Connections::UP_LEFT),
            element(ElementKind::Coil, "%Q0.0", 0, 10, Connections::LEFT),
        ];
        for col in 2..10 {
            out.push(Element::line(0, col).unwrap());
        }
        out
    }

    #[test]
    fn seal_in_branch_is_ored_with_trigger() {
        let elements = seal_in();
        let run = |start: bool, stop: bool, out: bool| {
            let env = |name: &str| match name {
                "%I0.1" => start,
                "%I0.2" => stop,
                "%Q0.0" => out,
                _ => false,
            };
            evaluate_ladder(&elements, &env)["%Q0.0"]
        };
        assert!(run(true, false, false));
        assert!(run(false, false, true));
        assert!(!run(true, true, true));
        assert!(!run(false, false, false));
    }

    #[test]
    fn broken_row_never_energizes_coil() {
        let elements = vec![
            element(ElementKind::NormalContact, "%I0.1", 0, 0, Connections::LEFT_RIGHT),
            element(ElementKind::Coil, "%Q0.0", 0, 10, Connections::LEFT),
        ];
        let env = |_: &str| true;
        assert!(!evaluate_ladder(&elements, &env)["%Q0.0"]);
    }

    #[test]
    fn timer_output_follows_done_bit() {
        let mut elements = vec![
            element(ElementKind::NormalContact, "%I0.0", 0, 0, Connections::LEFT_RIGHT),
            element(ElementKind::Timer, "%TM0", 0, 1, Connections::LEFT_RIGHT),
            element(ElementKind::Coil, "%Q0.1", 0, 10, Connections::LEFT),
        ];
        for col in 3..10 {
            elements.push(Element::line(0, col).unwrap());
        }
        let run = |input: bool, done: bool| {
            let env = |name: &str| match name {
                "%I0.0" => input,
                "%TM0.Q" => done,
                _ => false,
            };
            evaluate_ladder(&elements, &env)
        };
        assert!(run(true, false)["%TM0.IN"]);
        assert!(!run(true, false)["%Q0.1"]);
        assert!(run(false, true)["%Q0.1"]);
        assert!(!run(false, true)["%TM0.IN"]);
    }

    #[test]
    fn reports_inputs_read_by_the_grid() {
        let inputs = ladder_inputs(&seal_in());
        let names: Vec<&str> = inputs.iter().map(String::as_str).collect();
        assert_eq!(names, vec!["%I0.1", "%I0.2", "%Q0.0"]);
    }
}
