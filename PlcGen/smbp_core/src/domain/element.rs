//! 梯形图网格模型：元件类型、网格位置、连接描述、比较表达式。
//!
//! 网格约定：每个梯级列号 0..=10，第 0 列紧贴左母线，第 10 列为输出列（线圈）。
//! 触点/线圈/连线宽度 1；定时器/计数器/比较块宽度 2（占 `c`、`c+1` 两列）。

use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::address::{Address, AddressKind};

/// 输出列（右母线前的线圈列）
pub const OUTPUT_COLUMN: u16 = 10;
/// 非线圈元件可占用的最后一列
pub const LAST_LOGIC_COLUMN: u16 = OUTPUT_COLUMN - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementKind {
    NormalContact,
    NegatedContact,
    Coil,
    Line,
    Timer,
    Counter,
    CompareBlock,
}

impl ElementKind {
    pub const ALL: [ElementKind; 7] = [
        ElementKind::NormalContact,
        ElementKind::NegatedContact,
        ElementKind::Coil,
        ElementKind::Line,
        ElementKind::Timer,
        ElementKind::Counter,
        ElementKind::CompareBlock,
    ];

    /// SMBP `<ElementType>` 文本
    pub fn as_str(self) -> &'static str {
        match self {
            ElementKind::NormalContact => "NormalContact",
            ElementKind::NegatedContact => "NegatedContact",
            ElementKind::Coil => "Coil",
            ElementKind::Line => "Line",
            ElementKind::Timer => "Timer",
            ElementKind::Counter => "Counter",
            ElementKind::CompareBlock => "CompareBlock",
        }
    }

    pub fn is_contact(self) -> bool {
        matches!(self, ElementKind::NormalContact | ElementKind::NegatedContact)
    }

    pub fn is_block(self) -> bool {
        matches!(self, ElementKind::Timer | ElementKind::Counter)
    }
}

impl FromStr for ElementKind {
    type Err = LayoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        ElementKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(text))
            .ok_or_else(|| LayoutError::UnknownElementKind(text.to_string()))
    }
}

/// 元件占用的列宽
pub fn width(kind: ElementKind) -> u16 {
    match kind {
        ElementKind::Timer | ElementKind::Counter | ElementKind::CompareBlock => 2,
        _ => 1,
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LayoutError {
    #[error("negative grid position: row={row} column={column}")]
    NegativePosition { row: i64, column: i64 },

    #[error("{kind:?} at column {column} with width {width} exceeds column 10")]
    OutOfGrid {
        kind: ElementKind,
        column: u16,
        width: u16,
    },

    #[error("{kind:?} cannot use operand {operand}: {reason}")]
    InvalidOperand {
        kind: ElementKind,
        operand: String,
        reason: String,
    },

    #[error("cell row={row} column={column} is occupied by more than one element")]
    Overlap { row: u16, column: u16 },

    #[error("invalid layout: {0}")]
    InvalidLayout(String),

    #[error("rung has no coil on column 10")]
    MissingCoil,

    #[error("unknown element type: {0}")]
    UnknownElementKind(String),

    #[error("invalid connection descriptor: {0}")]
    InvalidConnection(String),

    #[error("invalid comparison: {0}")]
    InvalidComparison(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GridPosition {
    pub row: u16,
    pub column: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    const ORDER: [Direction; 4] = [Direction::Up, Direction::Down, Direction::Left, Direction::Right];

    fn as_str(self) -> &'static str {
        match self {
            Direction::Up => "Up",
            Direction::Down => "Down",
            Direction::Left => "Left",
            Direction::Right => "Right",
        }
    }
}

/// 连接描述（SMBP `<ChosenConnection>`，如 `Left, Right` / `Up, Left`）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Connections {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
}

impl Connections {
    pub const NONE: Connections = Connections {
        up: false,
        down: false,
        left: false,
        right: false,
    };
    pub const LEFT_RIGHT: Connections = Connections {
        up: false,
        down: false,
        left: true,
        right: true,
    };
    pub const LEFT: Connections = Connections {
        up: false,
        down: false,
        left: true,
        right: false,
    };
    /// 自锁反馈触点固定使用的连接
    pub const UP_LEFT: Connections = Connections {
        up: true,
        down: false,
        left: true,
        right: false,
    };

    pub fn of(directions: &[Direction]) -> Self {
        let mut out = Connections::NONE;
        for direction in directions {
            out.set(*direction, true);
        }
        out
    }

    pub fn has(&self, direction: Direction) -> bool {
        match direction {
            Direction::Up => self.up,
            Direction::Down => self.down,
            Direction::Left => self.left,
            Direction::Right => self.right,
        }
    }

    pub fn set(&mut self, direction: Direction, value: bool) {
        match direction {
            Direction::Up => self.up = value,
            Direction::Down => self.down = value,
            Direction::Left => self.left = value,
            Direction::Right => self.right = value,
        }
    }

    pub fn with(mut self, direction: Direction) -> Self {
        self.set(direction, true);
        self
    }
}

impl fmt::Display for Connections {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = Direction::ORDER
            .iter()
            .filter(|d| self.has(**d))
            .map(|d| d.as_str())
            .collect();
        if names.is_empty() {
            f.write_str("None")
        } else {
            f.write_str(&names.join(", "))
        }
    }
}

impl FromStr for Connections {
    type Err = LayoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut out = Connections::NONE;
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            if part.eq_ignore_ascii_case("None") {
                continue;
            }
            let direction = Direction::ORDER
                .iter()
                .copied()
                .find(|d| d.as_str().eq_ignore_ascii_case(part))
                .ok_or_else(|| LayoutError::InvalidConnection(s.to_string()))?;
            out.set(direction, true);
        }
        Ok(out)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "<>")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
}

impl CompareOp {
    // 双字符运算符必须先于单字符匹配
    const MATCH_ORDER: [CompareOp; 6] = [
        CompareOp::Ne,
        CompareOp::Le,
        CompareOp::Ge,
        CompareOp::Eq,
        CompareOp::Lt,
        CompareOp::Gt,
    ];

    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOperand {
    Address(Address),
    Constant(i64),
}

impl fmt::Display for CompareOperand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompareOperand::Address(address) => write!(f, "{address}"),
            CompareOperand::Constant(value) => write!(f, "{value}"),
        }
    }
}

/// 比较块表达式，文本形式 `[%MW0>100]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Comparison {
    pub left: Address,
    pub op: CompareOp,
    pub right: CompareOperand,
}

impl Comparison {
    pub fn new(left: Address, op: CompareOp, right: CompareOperand) -> Result<Self, LayoutError> {
        if !left.kind().is_numeric() {
            return Err(LayoutError::InvalidComparison(format!(
                "left operand {left} is not a numeric address"
            )));
        }
        if let CompareOperand::Address(address) = right {
            if !address.kind().is_numeric() {
                return Err(LayoutError::InvalidComparison(format!(
                    "right operand {address} is not a numeric address"
                )));
            }
        }
        Ok(Self { left, op, right })
    }

    pub fn addresses(&self) -> Vec<Address> {
        match self.right {
            CompareOperand::Address(right) => vec![self.left, right],
            CompareOperand::Constant(_) => vec![self.left],
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}{}{}]", self.left, self.op.symbol(), self.right)
    }
}

impl FromStr for Comparison {
    type Err = LayoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || LayoutError::InvalidComparison(s.to_string());
        let inner = s
            .trim()
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
            .ok_or_else(invalid)?;
        let compact: String = inner.chars().filter(|c| !c.is_whitespace()).collect();

        let (op, at) = CompareOp::MATCH_ORDER
            .iter()
            .find_map(|op| compact.find(op.symbol()).map(|at| (*op, at)))
            .ok_or_else(invalid)?;
        let left = compact[..at].parse::<Address>().map_err(|_| invalid())?;
        let right_text = &compact[at + op.symbol().len()..];
        let right = match right_text.parse::<i64>() {
            Ok(value) => CompareOperand::Constant(value),
            Err(_) => CompareOperand::Address(right_text.parse().map_err(|_| invalid())?),
        };
        Comparison::new(left, op, right)
    }
}

/// 元件操作数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operand {
    None,
    Address(Address),
    Comparison(Comparison),
}

impl Operand {
    /// SMBP `<Descriptor>` 文本；连线没有描述符
    pub fn descriptor(&self) -> Option<String> {
        match self {
            Operand::None => None,
            Operand::Address(address) => Some(address.to_string()),
            Operand::Comparison(comparison) => Some(comparison.to_string()),
        }
    }
}

/// 梯形图上的单个可视元件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    kind: ElementKind,
    operand: Operand,
    symbol: Option<String>,
    comment: String,
    position: GridPosition,
    connections: Connections,
}

impl Element {
    /// 构造元件：负坐标、越界、操作数类型不符都直接拒绝
    pub fn new(
        kind: ElementKind,
        operand: Operand,
        row: i64,
        column: i64,
        connections: Connections,
    ) -> Result<Self, LayoutError> {
        if row < 0 || column < 0 {
            return Err(LayoutError::NegativePosition { row, column });
        }
        let row = u16::try_from(row).map_err(|_| {
            LayoutError::InvalidLayout(format!("row {row} is beyond the supported grid"))
        })?;
        let column = u16::try_from(column).map_err(|_| LayoutError::OutOfGrid {
            kind,
            column: u16::MAX,
            width: width(kind),
        })?;
        let span = width(kind);
        if column > OUTPUT_COLUMN + 1 - span {
            return Err(LayoutError::OutOfGrid {
                kind,
                column,
                width: span,
            });
        }
        check_operand(kind, &operand)?;
        Ok(Self {
            kind,
            operand,
            symbol: None,
            comment: String::new(),
            position: GridPosition { row, column },
            connections,
        })
    }

    /// 水平连线
    pub fn line(row: u16, column: u16) -> Result<Self, LayoutError> {
        Self::new(
            ElementKind::Line,
            Operand::None,
            row.into(),
            column.into(),
            Connections::LEFT_RIGHT,
        )
    }

    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        let symbol = symbol.into();
        self.symbol = if symbol.trim().is_empty() {
            None
        } else {
            Some(symbol)
        };
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    pub fn operand(&self) -> &Operand {
        &self.operand
    }

    pub fn address(&self) -> Option<Address> {
        match self.operand {
            Operand::Address(address) => Some(address),
            _ => None,
        }
    }

    pub fn symbol(&self) -> Option<&str> {
        self.symbol.as_deref()
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }

    pub fn position(&self) -> GridPosition {
        self.position
    }

    pub fn connections(&self) -> Connections {
        self.connections
    }

    pub fn width(&self) -> u16 {
        width(self.kind)
    }

    pub fn columns(&self) -> RangeInclusive<u16> {
        self.position.column..=self.last_column()
    }

    pub fn last_column(&self) -> u16 {
        self.position.column + self.width() - 1
    }

    /// 元件引用的全部地址（比较块可能引用两个）
    pub fn referenced_addresses(&self) -> Vec<Address> {
        match &self.operand {
            Operand::None => Vec::new(),
            Operand::Address(address) => vec![*address],
            Operand::Comparison(comparison) => comparison.addresses(),
        }
    }

    pub(crate) fn set_symbol(&mut self, symbol: Option<String>) {
        self.symbol = symbol.filter(|s| !s.trim().is_empty());
    }
}

fn check_operand(kind: ElementKind, operand: &Operand) -> Result<(), LayoutError> {
    let reject = |reason: &str| {
        Err(LayoutError::InvalidOperand {
            kind,
            operand: operand.descriptor().unwrap_or_else(|| "<none>".to_string()),
            reason: reason.to_string(),
        })
    };
    match (kind, operand) {
        (ElementKind::Line, Operand::None) => Ok(()),
        (ElementKind::Line, _) => reject("lines carry no operand"),
        (ElementKind::NormalContact | ElementKind::NegatedContact, Operand::Address(a)) => {
            if a.kind().is_bit() {
                Ok(())
            } else {
                reject("contacts need a bit address")
            }
        }
        (ElementKind::Coil, Operand::Address(a)) => {
            if a.kind().is_writable_bit() {
                Ok(())
            } else {
                reject("coils need an output or memory bit")
            }
        }
        (ElementKind::Timer, Operand::Address(a)) if a.kind() == AddressKind::Timer => Ok(()),
        (ElementKind::Counter, Operand::Address(a)) if a.kind() == AddressKind::Counter => Ok(()),
        (ElementKind::CompareBlock, Operand::Comparison(_)) => Ok(()),
        _ => reject("operand type does not match element type"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(text: &str) -> Address {
        text.parse().unwrap()
    }

    #[test]
    fn width_is_two_for_blocks() {
        assert_eq!(width(ElementKind::NormalContact), 1);
        assert_eq!(width(ElementKind::Coil), 1);
        assert_eq!(width(ElementKind::Line), 1);
        assert_eq!(width(ElementKind::Timer), 2);
        assert_eq!(width(ElementKind::Counter), 2);
        assert_eq!(width(ElementKind::CompareBlock), 2);
    }

    #[test]
    fn rejects_negative_and_out_of_grid_positions() {
        let contact = Operand::Address(addr("%I0.0"));
        assert!(matches!(
            Element::new(ElementKind::NormalContact, contact, -1, 0, Connections::LEFT_RIGHT),
            Err(LayoutError::NegativePosition { .. })
        ));
        assert!(matches!(
            Element::new(ElementKind::NormalContact, contact, 0, -3, Connections::LEFT_RIGHT),
            Err(LayoutError::NegativePosition { .. })
        ));
        let timer = Operand::Address(addr("%TM0"));
        assert!(matches!(
            Element::new(ElementKind::Timer, timer, 0, 10, Connections::LEFT_RIGHT),
            Err(LayoutError::OutOfGrid { width: 2, .. })
        ));
        let ok = Element::new(ElementKind::Timer, timer, 0, 8, Connections::LEFT_RIGHT).unwrap();
        assert_eq!(ok.columns(), 8..=9);
    }

    #[test]
    fn rejects_mismatched_operands() {
        let word = Operand::Address(addr("%MW0"));
        assert!(matches!(
            Element::new(ElementKind::NormalContact, word, 0, 0, Connections::LEFT_RIGHT),
            Err(LayoutError::InvalidOperand { .. })
        ));
        let input = Operand::Address(addr("%I0.0"));
        assert!(matches!(
            Element::new(ElementKind::Coil, input, 0, 10, Connections::LEFT),
            Err(LayoutError::InvalidOperand { .. })
        ));
        assert!(Element::new(ElementKind::Line, input, 0, 1, Connections::LEFT_RIGHT).is_err());
    }

    #[test]
    fn connections_round_trip_text() {
        assert_eq!(Connections::UP_LEFT.to_string(), "Up, Left");
        assert_eq!(Connections::LEFT_RIGHT.to_string(), "Left, Right");
        assert_eq!(Connections::NONE.to_string(), "None");
        assert_eq!("left,  RIGHT".parse::<Connections>().unwrap(), Connections::LEFT_RIGHT);
        assert_eq!("None".parse::<Connections>().unwrap(), Connections::NONE);
        assert!("Left, Sideways".parse::<Connections>().is_err());
    }

    #[test]
    fn comparison_parses_two_char_operators_first() {
        let cmp: Comparison = "[ %MW0 >= 100 ]".parse().unwrap();
        assert_eq!(cmp.op, CompareOp::Ge);
        assert_eq!(cmp.to_string(), "[%MW0>=100]");
        let cmp: Comparison = "[%MF2<>%MF3]".parse().unwrap();
        assert_eq!(cmp.right, CompareOperand::Address(addr("%MF3")));
        assert!("[%I0.0>1]".parse::<Comparison>().is_err());
        assert!("%MW0>1".parse::<Comparison>().is_err());
    }
}
