//! 梯级：元件网格 + 等价的指令表镜像。

use std::collections::{BTreeMap, BTreeSet, HashSet};

use super::address::Address;
use super::element::{Element, ElementKind, LayoutError, LAST_LOGIC_COLUMN, OUTPUT_COLUMN};
use super::instruction::Instruction;
use super::ladder;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rung {
    name: String,
    comment: String,
    elements: Vec<Element>,
    instructions: Vec<Instruction>,
    /// true：梯形图视图为准；false：指令表视图为准
    ladder_selected: bool,
}

impl Rung {
    /// 构造梯级并检查网格不变量（格子不重叠、线圈在第 10 列、其余元件不越过第 9 列）
    pub fn new(
        name: impl Into<String>,
        comment: impl Into<String>,
        elements: Vec<Element>,
        instructions: Vec<Instruction>,
    ) -> Result<Self, LayoutError> {
        check_grid(&elements)?;
        Ok(Self {
            name: name.into(),
            comment: comment.into(),
            elements,
            instructions,
            ladder_selected: true,
        })
    }

    pub fn with_ladder_selected(mut self, ladder_selected: bool) -> Self {
        self.ladder_selected = ladder_selected;
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn is_ladder_selected(&self) -> bool {
        self.ladder_selected
    }

    pub fn coils(&self) -> impl Iterator<Item = &Element> {
        self.elements.iter().filter(|e| e.kind() == ElementKind::Coil)
    }

    /// 梯形图与指令表中出现的全部地址
    pub fn referenced_addresses(&self) -> BTreeSet<Address> {
        let mut out: BTreeSet<Address> = self
            .elements
            .iter()
            .flat_map(Element::referenced_addresses)
            .collect();
        out.extend(self.instructions.iter().flat_map(Instruction::referenced_addresses));
        out
    }

    pub fn evaluate_ladder<F: Fn(&str) -> bool>(&self, env: &F) -> BTreeMap<String, bool> {
        ladder::evaluate_ladder(&self.elements, env)
    }

    pub fn ladder_inputs(&self) -> BTreeSet<String> {
        ladder::ladder_inputs(&self.elements)
    }

    pub(crate) fn elements_mut(&mut self) -> &mut [Element] {
        &mut self.elements
    }
}

fn check_grid(elements: &[Element]) -> Result<(), LayoutError> {
    let mut cells: HashSet<(u16, u16)> = HashSet::new();
    for element in elements {
        let row = element.position().row;
        for column in element.columns() {
            if !cells.insert((row, column)) {
                return Err(LayoutError::Overlap { row, column });
            }
        }

        let column = element.position().column;
        if element.kind() == ElementKind::Coil {
            if column != OUTPUT_COLUMN {
                return Err(LayoutError::InvalidLayout(format!(
                    "coil at row {row} sits on column {column}, expected column {OUTPUT_COLUMN}"
                )));
            }
        } else if element.last_column() > LAST_LOGIC_COLUMN {
            return Err(LayoutError::InvalidLayout(format!(
                "{:?} at row {row} reaches column {}, only coils may use column {OUTPUT_COLUMN}",
                element.kind(),
                element.last_column()
            )));
        }
    }

    if !elements.iter().any(|e| e.kind() == ElementKind::Coil) {
        return Err(LayoutError::MissingCoil);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::element::{Connections, Operand};

    fn contact(text: &str, row: i64, col: i64) -> Element {
        Element::new(
            ElementKind::NormalContact,
            Operand::Address(text.parse().unwrap()),
            row,
            col,
            Connections::LEFT_RIGHT,
        )
        .unwrap()
    }

    fn coil(text: &str, col: i64) -> Element {
        Element::new(
            ElementKind::Coil,
            Operand::Address(text.parse().unwrap()),
            0,
            col,
            Connections::LEFT,
        )
        .unwrap()
    }

    #[test]
    fn rejects_overlapping_cells() {
        let timer = Element::new(
            ElementKind::Timer,
            Operand::Address("%TM0".parse().unwrap()),
            0,
            1,
            Connections::LEFT_RIGHT,
        )
        .unwrap();
        let err = Rung::new("r", "", vec![timer, contact("%I0.0", 0, 2), coil("%Q0.0", 10)], vec![])
            .unwrap_err();
        assert_eq!(err, LayoutError::Overlap { row: 0, column: 2 });
    }

    #[test]
    fn requires_a_coil_on_the_output_column() {
        let err = Rung::new("r", "", vec![contact("%I0.0", 0, 0)], vec![]).unwrap_err();
        assert_eq!(err, LayoutError::MissingCoil);

        let err = Rung::new("r", "", vec![contact("%I0.0", 0, 0), coil("%Q0.0", 5)], vec![])
            .unwrap_err();
        assert!(matches!(err, LayoutError::InvalidLayout(_)));

        let err = Rung::new("r", "", vec![contact("%I0.0", 0, 10), coil("%Q0.0", 10)], vec![])
            .unwrap_err();
        assert!(matches!(err, LayoutError::InvalidLayout(_)));
    }

    #[test]
    fn collects_addresses_from_both_views() {
        let rung = Rung::new(
            "r",
            "",
            vec![contact("%I0.0", 0, 0), coil("%Q0.0", 10)],
            vec!["LD %I0.0".parse().unwrap(), "AND %M3".parse().unwrap()],
        )
        .unwrap();
        let refs: Vec<String> = rung.referenced_addresses().iter().map(|a| a.to_string()).collect();
        assert_eq!(refs, vec!["%I0.0", "%Q0.0", "%M3"]);
    }
}
