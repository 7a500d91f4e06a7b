//! 梯级构造器：由串联条件 + 可选自锁分支 + 输出线圈生成网格与等价的指令表。
//!
//! 布局规则：
//! - 条件元件从第 0 列起依次摆放在第 0 行；功能块/比较块可指定起始列，空档用连线补齐。
//! - 最后一个条件之后用连线补到第 9 列，线圈固定在第 10 列，多线圈向下逐行堆叠。
//! - 自锁分支：反馈触点固定在第 1 行第 0 列，连接 `Up, Left`，与第一个条件并联。

use log::debug;

use crate::domain::ladder::{COUNTER_DONE, TIMER_DONE};
use crate::domain::{
    Address, AddressKind, Comparison, Connections, Direction, Element, ElementKind, Instruction,
    LayoutError, Mnemonic, Operand, Rung, LAST_LOGIC_COLUMN, OUTPUT_COLUMN,
};

/// 串联条件中的一步
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Contact(Address),
    NegatedContact(Address),
    Compare {
        comparison: Comparison,
        column: Option<u16>,
    },
    Timer {
        address: Address,
        column: Option<u16>,
    },
    Counter {
        address: Address,
        column: Option<u16>,
    },
}

impl Step {
    fn kind(&self) -> ElementKind {
        match self {
            Step::Contact(_) => ElementKind::NormalContact,
            Step::NegatedContact(_) => ElementKind::NegatedContact,
            Step::Compare { .. } => ElementKind::CompareBlock,
            Step::Timer { .. } => ElementKind::Timer,
            Step::Counter { .. } => ElementKind::Counter,
        }
    }

    fn column(&self) -> Option<u16> {
        match self {
            Step::Compare { column, .. } | Step::Timer { column, .. } | Step::Counter { column, .. } => {
                *column
            }
            _ => None,
        }
    }

    fn operand(&self) -> Operand {
        match self {
            Step::Contact(a) | Step::NegatedContact(a) => Operand::Address(*a),
            Step::Timer { address, .. } | Step::Counter { address, .. } => Operand::Address(*address),
            Step::Compare { comparison, .. } => Operand::Comparison(*comparison),
        }
    }

    fn is_block(&self) -> bool {
        matches!(self, Step::Timer { .. } | Step::Counter { .. })
    }

    /// 作为串联条件时的指令（首条用 LD 系，其余用 AND 系）
    fn condition(&self, first: bool) -> Instruction {
        let (plain, negated) = if first {
            (Mnemonic::Ld, Mnemonic::Ldn)
        } else {
            (Mnemonic::And, Mnemonic::Andn)
        };
        match self {
            Step::Contact(a) => Instruction::new(plain, a),
            Step::NegatedContact(a) => Instruction::new(negated, a),
            Step::Compare { comparison, .. } => Instruction::new(plain, comparison),
            // 块只会出现在 BLK 段中，不走这里
            Step::Timer { address, .. } | Step::Counter { address, .. } => {
                Instruction::new(plain, address)
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RungBuilder {
    name: String,
    comment: String,
    steps: Vec<Step>,
    seal_in: Option<Address>,
    coils: Vec<Address>,
}

impl RungBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    pub fn contact(mut self, address: Address) -> Self {
        self.steps.push(Step::Contact(address));
        self
    }

    pub fn negated_contact(mut self, address: Address) -> Self {
        self.steps.push(Step::NegatedContact(address));
        self
    }

    pub fn compare(mut self, comparison: Comparison, column: Option<u16>) -> Self {
        self.steps.push(Step::Compare { comparison, column });
        self
    }

    pub fn timer(mut self, address: Address, column: Option<u16>) -> Self {
        self.steps.push(Step::Timer { address, column });
        self
    }

    pub fn counter(mut self, address: Address, column: Option<u16>) -> Self {
        self.steps.push(Step::Counter { address, column });
        self
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// 与第一个条件并联的反馈触点（通常就是输出自身）
    pub fn seal_in(mut self, feedback: Address) -> Self {
        self.seal_in = Some(feedback);
        self
    }

    pub fn coil(mut self, address: Address) -> Self {
        self.coils.push(address);
        self
    }

    pub fn build(self) -> Result<Rung, LayoutError> {
        if self.coils.is_empty() {
            return Err(LayoutError::MissingCoil);
        }
        let first = self
            .steps
            .first()
            .ok_or_else(|| LayoutError::InvalidLayout("rung needs at least one condition".into()))?;
        if first.is_block() {
            return Err(LayoutError::InvalidLayout(
                "a timer or counter needs at least one preceding condition".into(),
            ));
        }
        if self.steps.iter().filter(|s| s.is_block()).count() > 1 {
            return Err(LayoutError::InvalidLayout(
                "only one timer or counter block per rung".into(),
            ));
        }
        if self.seal_in.is_some() && !matches!(first, Step::Contact(_) | Step::NegatedContact(_)) {
            return Err(LayoutError::InvalidLayout(
                "a seal-in branch can only bridge a single contact".into(),
            ));
        }

        let elements = self.layout()?;
        let instructions = self.instructions();
        debug!(
            "built rung '{}': {} elements, {} instructions",
            self.name,
            elements.len(),
            instructions.len()
        );
        Rung::new(self.name, self.comment, elements, instructions)
    }

    fn layout(&self) -> Result<Vec<Element>, LayoutError> {
        let mut elements = Vec::new();
        let mut column: u16 = 0;

        for step in &self.steps {
            let kind = step.kind();
            let start = step.column().unwrap_or(column);
            if start < column {
                return Err(LayoutError::InvalidLayout(format!(
                    "{kind:?} at column {start} overlaps the preceding element ending at column {}",
                    column.saturating_sub(1)
                )));
            }
            let end = start + crate::domain::width(kind);
            if end > OUTPUT_COLUMN {
                return Err(LayoutError::InvalidLayout(format!(
                    "{kind:?} at column {start} leaves no room before the output column"
                )));
            }
            for filler in column..start {
                elements.push(Element::line(0, filler)?);
            }
            elements.push(Element::new(
                kind,
                step.operand(),
                0,
                start.into(),
                Connections::LEFT_RIGHT,
            )?);
            column = end;
        }

        for filler in column..=LAST_LOGIC_COLUMN {
            elements.push(Element::line(0, filler)?);
        }

        if let Some(feedback) = self.seal_in {
            elements.push(Element::new(
                ElementKind::NormalContact,
                Operand::Address(feedback),
                1,
                0,
                Connections::UP_LEFT,
            )?);
        }

        let last = self.coils.len() - 1;
        for (row, coil) in self.coils.iter().enumerate() {
            let mut connections = Connections::LEFT;
            if row > 0 {
                connections = connections.with(Direction::Up);
            }
            if row < last {
                connections = connections.with(Direction::Down);
            }
            elements.push(Element::new(
                ElementKind::Coil,
                Operand::Address(*coil),
                row as i64,
                OUTPUT_COLUMN.into(),
                connections,
            )?);
        }
        Ok(elements)
    }

    fn instructions(&self) -> Vec<Instruction> {
        let block_at = self.steps.iter().position(Step::is_block);
        let (before, block, after) = match block_at {
            Some(i) => (&self.steps[..i], Some(&self.steps[i]), &self.steps[i + 1..]),
            None => (&self.steps[..], None, &self.steps[..0]),
        };

        let mut out = Vec::new();
        let mut condition = Vec::new();
        for (i, step) in before.iter().enumerate() {
            condition.push(step.condition(i == 0));
            if i == 0 {
                if let Some(feedback) = self.seal_in {
                    condition.push(Instruction::new(Mnemonic::Or, feedback));
                }
            }
        }

        match block {
            Some(Step::Timer { address, .. }) | Some(Step::Counter { address, .. }) => {
                let (pin, done) = if address.kind() == AddressKind::Timer {
                    (Mnemonic::In, TIMER_DONE)
                } else {
                    (Mnemonic::Cu, COUNTER_DONE)
                };
                out.push(Instruction::new(Mnemonic::Blk, address));
                out.extend(condition);
                out.push(Instruction::bare(pin));
                out.push(Instruction::bare(Mnemonic::OutBlk));
                out.push(Instruction::new(Mnemonic::Ld, done));
                out.extend(after.iter().map(|step| step.condition(false)));
                out.extend(self.coils.iter().map(|c| Instruction::new(Mnemonic::St, c)));
                out.push(Instruction::bare(Mnemonic::EndBlk));
            }
            _ => {
                out.extend(condition);
                out.extend(self.coils.iter().map(|c| Instruction::new(Mnemonic::St, c)));
            }
        }
        out
    }
}

/// 单触点驱动线圈：`LD|LDN input / ST output`
pub fn build_simple_rung(input: Address, output: Address, negated: bool) -> Result<Rung, LayoutError> {
    let builder = RungBuilder::new(output.to_string());
    let builder = if negated {
        builder.negated_contact(input)
    } else {
        builder.contact(input)
    };
    builder.coil(output).build()
}

/// 启保停自锁：`LD trigger / OR output / ANDN stop / ST output`
pub fn build_hysteresis_rung(trigger: Address, stop: Address, output: Address) -> Result<Rung, LayoutError> {
    RungBuilder::new(output.to_string())
        .contact(trigger)
        .seal_in(output)
        .negated_contact(stop)
        .coil(output)
        .build()
}

/// 输入触点 → 定时器（占 `column`、`column+1`）→ 输出线圈
pub fn build_timer_rung(
    input: Address,
    timer: Address,
    output: Address,
    column: u16,
) -> Result<Rung, LayoutError> {
    RungBuilder::new(output.to_string())
        .contact(input)
        .timer(timer, Some(column))
        .coil(output)
        .build()
}

/// 比较块（占 `column`、`column+1`）→ 输出线圈
pub fn build_compare_rung(comparison: Comparison, output: Address, column: u16) -> Result<Rung, LayoutError> {
    RungBuilder::new(output.to_string())
        .compare(comparison, Some(column))
        .coil(output)
        .build()
}

/// 输入触点 → 计数器（占 `column`、`column+1`）→ 输出线圈
pub fn build_counter_rung(
    input: Address,
    counter: Address,
    output: Address,
    column: u16,
) -> Result<Rung, LayoutError> {
    RungBuilder::new(output.to_string())
        .contact(input)
        .counter(counter, Some(column))
        .coil(output)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::GridPosition;

    fn addr(text: &str) -> Address {
        text.parse().unwrap()
    }

    fn il(rung: &Rung) -> Vec<String> {
        rung.instructions().iter().map(|i| i.to_string()).collect()
    }

    #[test]
    fn simple_rung_fills_unused_columns() {
        let rung = build_simple_rung(addr("%I0.0"), addr("%Q0.0"), true).unwrap();
        assert_eq!(il(&rung), vec!["LDN   %I0.0", "ST    %Q0.0"]);
        let lines = rung
            .elements()
            .iter()
            .filter(|e| e.kind() == ElementKind::Line)
            .count();
        assert_eq!(lines, 9);
        assert_eq!(rung.coils().count(), 1);
    }

    #[test]
    fn hysteresis_rung_places_feedback_below_first_contact() {
        let rung = build_hysteresis_rung(addr("%I0.1"), addr("%I0.2"), addr("%Q0.0")).unwrap();
        assert_eq!(
            il(&rung),
            vec!["LD    %I0.1", "OR    %Q0.0", "ANDN  %I0.2", "ST    %Q0.0"]
        );
        let feedback = rung
            .elements()
            .iter()
            .find(|e| e.position().row == 1)
            .unwrap();
        assert_eq!(feedback.position(), GridPosition { row: 1, column: 0 });
        assert_eq!(feedback.connections().to_string(), "Up, Left");
        assert_eq!(feedback.address(), Some(addr("%Q0.0")));
    }

    #[test]
    fn timer_rung_wraps_block_in_il() {
        let rung = build_timer_rung(addr("%I0.0"), addr("%TM0"), addr("%Q0.1"), 3).unwrap();
        assert_eq!(
            il(&rung),
            vec!["BLK   %TM0", "LD    %I0.0", "IN", "OUT_BLK", "LD    Q", "ST    %Q0.1", "END_BLK"]
        );
        let timer = rung
            .elements()
            .iter()
            .find(|e| e.kind() == ElementKind::Timer)
            .unwrap();
        assert_eq!(timer.columns(), 3..=4);
        // 第 1、2 列补线，块后 5..=9 补线
        let line_columns: Vec<u16> = rung
            .elements()
            .iter()
            .filter(|e| e.kind() == ElementKind::Line)
            .map(|e| e.position().column)
            .collect();
        assert_eq!(line_columns, vec![1, 2, 5, 6, 7, 8, 9]);
    }

    #[test]
    fn counter_rung_uses_count_up_pin() {
        let rung = build_counter_rung(addr("%I0.3"), addr("%C0"), addr("%M1"), 1).unwrap();
        assert!(il(&rung).contains(&"CU".to_string()));
        assert!(il(&rung).contains(&"LD    D".to_string()));
    }

    #[test]
    fn rejects_blocks_that_collide_or_overflow() {
        let err = build_timer_rung(addr("%I0.0"), addr("%TM0"), addr("%Q0.1"), 0).unwrap_err();
        assert!(matches!(err, LayoutError::InvalidLayout(_)));

        let cmp: Comparison = "[%MW0>100]".parse().unwrap();
        let err = build_compare_rung(cmp, addr("%Q0.0"), 9).unwrap_err();
        assert!(matches!(err, LayoutError::InvalidLayout(_)));
        assert!(build_compare_rung(cmp, addr("%Q0.0"), 8).is_ok());

        let err = RungBuilder::new("r")
            .timer(addr("%TM0"), None)
            .coil(addr("%Q0.0"))
            .build()
            .unwrap_err();
        assert!(matches!(err, LayoutError::InvalidLayout(_)));
    }

    #[test]
    fn stacked_coils_share_the_output_net() {
        let rung = RungBuilder::new("multi")
            .contact(addr("%I0.0"))
            .coil(addr("%Q0.0"))
            .coil(addr("%Q0.1"))
            .coil(addr("%Q0.2"))
            .build()
            .unwrap();
        let conns: Vec<String> = rung.coils().map(|c| c.connections().to_string()).collect();
        assert_eq!(conns, vec!["Down, Left", "Up, Down, Left", "Up, Left"]);

        let env = |name: &str| name == "%I0.0";
        let out = rung.evaluate_ladder(&env);
        assert!(out["%Q0.0"] && out["%Q0.1"] && out["%Q0.2"]);
    }

    #[test]
    fn missing_coil_is_rejected() {
        let err = RungBuilder::new("r").contact(addr("%I0.0")).build().unwrap_err();
        assert_eq!(err, LayoutError::MissingCoil);
    }
}
