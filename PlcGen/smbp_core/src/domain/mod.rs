pub mod address;
pub mod document;
pub mod element;
pub mod expr;
pub mod instruction;
pub mod ladder;
pub mod rung;

pub use address::{Address, AddressError, AddressKind};
pub use document::{
    CounterSettings, Declaration, DeclarationSettings, DeclarationTable, Document, ProjectInfo,
    TimeBase, TimerSettings, TimerType,
};
pub use element::{
    width, CompareOp, CompareOperand, Comparison, Connections, Direction, Element, ElementKind,
    GridPosition, LayoutError, Operand, LAST_LOGIC_COLUMN, OUTPUT_COLUMN,
};
pub use expr::{equivalence, Equivalence, Expr};
pub use instruction::{Instruction, Mnemonic};
pub use rung::Rung;
