//! 指令表 → 布尔赋值（目标变量 = 表达式）。
//!
//! 累加器模型：LD 系装载、AND/OR 系合并、`AND(`...`)` 嵌套、MPS/MRD/MPP 分支栈。
//! 功能块段 `BLK ... END_BLK` 内，`IN`/`CU`/`CD`/`R` 把累加器写到块引脚，
//! `OUT_BLK` 之后 `Q`/`D` 等单字母操作数指块的输出位。

use thiserror::Error;

use crate::domain::{Address, Comparison, Expr, Instruction, Mnemonic};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IlError {
    #[error("line {line}: unsupported instruction {mnemonic}")]
    Unsupported { line: usize, mnemonic: String },

    #[error("line {line}: {mnemonic} needs an operand")]
    MissingOperand { line: usize, mnemonic: String },

    #[error("line {line}: unrecognized operand {operand}")]
    InvalidOperand { line: usize, operand: String },

    #[error("line {line}: {mnemonic} with an empty accumulator")]
    EmptyAccumulator { line: usize, mnemonic: String },

    #[error("line {line}: {mnemonic} without a matching opener")]
    Unbalanced { line: usize, mnemonic: String },

    #[error("{0} parenthesis left open at end of rung")]
    UnclosedParenthesis(usize),
}

/// 一次赋值：目标变量（线圈地址或块引脚）← 表达式
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub target: String,
    pub expr: Expr,
}

#[derive(Debug, Clone, Copy)]
enum Join {
    And,
    Or,
}

struct Frame {
    join: Join,
    negated: bool,
    saved: Expr,
}

struct Machine {
    acc: Option<Expr>,
    parens: Vec<Frame>,
    branches: Vec<Expr>,
    block: Option<Address>,
    out: Vec<Assignment>,
}

/// 解析一段指令表；同一目标被多次写入时，后一次表达式中的该目标替换为前一次的值
pub fn parse_instructions(lines: &[Instruction]) -> Result<Vec<Assignment>, IlError> {
    let mut machine = Machine {
        acc: None,
        parens: Vec::new(),
        branches: Vec::new(),
        block: None,
        out: Vec::new(),
    };
    for (i, instruction) in lines.iter().enumerate() {
        machine.step(i + 1, instruction)?;
    }
    if !machine.parens.is_empty() {
        return Err(IlError::UnclosedParenthesis(machine.parens.len()));
    }
    Ok(machine.out)
}

impl Machine {
    fn step(&mut self, line: usize, instruction: &Instruction) -> Result<(), IlError> {
        let mnemonic = &instruction.mnemonic;
        let name = || mnemonic.as_str().to_string();
        match mnemonic {
            Mnemonic::Ld => self.acc = Some(self.operand(line, instruction)?),
            Mnemonic::Ldn => self.acc = Some(Expr::not(self.operand(line, instruction)?)),
            Mnemonic::And | Mnemonic::Andn | Mnemonic::Or | Mnemonic::Orn => {
                let mut term = self.operand(line, instruction)?;
                if matches!(mnemonic, Mnemonic::Andn | Mnemonic::Orn) {
                    term = Expr::not(term);
                }
                let join = if matches!(mnemonic, Mnemonic::And | Mnemonic::Andn) {
                    Join::And
                } else {
                    Join::Or
                };
                let acc = self.take_acc(line, mnemonic)?;
                self.acc = Some(combine(join, acc, term));
            }
            Mnemonic::AndOpen | Mnemonic::AndnOpen | Mnemonic::OrOpen | Mnemonic::OrnOpen => {
                let saved = self.take_acc(line, mnemonic)?;
                let inner = self.operand(line, instruction)?;
                self.parens.push(Frame {
                    join: if matches!(mnemonic, Mnemonic::AndOpen | Mnemonic::AndnOpen) {
                        Join::And
                    } else {
                        Join::Or
                    },
                    negated: matches!(mnemonic, Mnemonic::AndnOpen | Mnemonic::OrnOpen),
                    saved,
                });
                self.acc = Some(inner);
            }
            Mnemonic::Close => {
                let frame = self.parens.pop().ok_or_else(|| IlError::Unbalanced {
                    line,
                    mnemonic: name(),
                })?;
                let mut inner = self.take_acc(line, mnemonic)?;
                if frame.negated {
                    inner = Expr::not(inner);
                }
                self.acc = Some(combine(frame.join, frame.saved, inner));
            }
            Mnemonic::Not => {
                let acc = self.take_acc(line, mnemonic)?;
                self.acc = Some(Expr::not(acc));
            }
            Mnemonic::Mps => {
                let acc = self.peek_acc(line, mnemonic)?;
                self.branches.push(acc);
            }
            Mnemonic::Mrd => {
                let top = self.branches.last().cloned().ok_or_else(|| IlError::Unbalanced {
                    line,
                    mnemonic: name(),
                })?;
                self.acc = Some(top);
            }
            Mnemonic::Mpp => {
                let top = self.branches.pop().ok_or_else(|| IlError::Unbalanced {
                    line,
                    mnemonic: name(),
                })?;
                self.acc = Some(top);
            }
            Mnemonic::St | Mnemonic::Stn => {
                let target = self.target(line, instruction)?;
                let mut value = self.peek_acc(line, mnemonic)?;
                if matches!(mnemonic, Mnemonic::Stn) {
                    value = Expr::not(value);
                }
                self.assign(target, value);
            }
            Mnemonic::Set => {
                let target = self.target(line, instruction)?;
                let value = self.peek_acc(line, mnemonic)?;
                let latched = Expr::or(vec![Expr::var(target.clone()), value]);
                self.assign(target, latched);
            }
            Mnemonic::Reset => match (&instruction.operand, self.block) {
                (None, Some(block)) => {
                    let value = self.peek_acc(line, mnemonic)?;
                    self.assign(block.member("R"), value);
                }
                _ => {
                    let target = self.target(line, instruction)?;
                    let value = self.peek_acc(line, mnemonic)?;
                    let cleared = Expr::and(vec![Expr::var(target.clone()), Expr::not(value)]);
                    self.assign(target, cleared);
                }
            },
            Mnemonic::Blk => {
                let operand = instruction.operand.as_deref().ok_or_else(|| IlError::MissingOperand {
                    line,
                    mnemonic: name(),
                })?;
                let block = operand
                    .parse::<Address>()
                    .ok()
                    .filter(|a| a.kind().is_block())
                    .ok_or_else(|| IlError::InvalidOperand {
                        line,
                        operand: operand.to_string(),
                    })?;
                self.block = Some(block);
                self.acc = None;
            }
            Mnemonic::In | Mnemonic::Cu | Mnemonic::Cd => {
                let block = self.block.ok_or_else(|| IlError::Unbalanced {
                    line,
                    mnemonic: name(),
                })?;
                let value = self.peek_acc(line, mnemonic)?;
                self.assign(block.member(mnemonic.as_str()), value);
            }
            Mnemonic::OutBlk => {
                if self.block.is_none() {
                    return Err(IlError::Unbalanced { line, mnemonic: name() });
                }
                self.acc = None;
            }
            Mnemonic::EndBlk => {
                if self.block.take().is_none() {
                    return Err(IlError::Unbalanced { line, mnemonic: name() });
                }
                self.acc = None;
            }
            Mnemonic::Other(text) => {
                return Err(IlError::Unsupported {
                    line,
                    mnemonic: text.clone(),
                })
            }
        }
        Ok(())
    }

    fn take_acc(&mut self, line: usize, mnemonic: &Mnemonic) -> Result<Expr, IlError> {
        self.acc.take().ok_or_else(|| IlError::EmptyAccumulator {
            line,
            mnemonic: mnemonic.as_str().to_string(),
        })
    }

    fn peek_acc(&self, line: usize, mnemonic: &Mnemonic) -> Result<Expr, IlError> {
        self.acc.clone().ok_or_else(|| IlError::EmptyAccumulator {
            line,
            mnemonic: mnemonic.as_str().to_string(),
        })
    }

    fn operand(&self, line: usize, instruction: &Instruction) -> Result<Expr, IlError> {
        let text = instruction.operand.as_deref().ok_or_else(|| IlError::MissingOperand {
            line,
            mnemonic: instruction.mnemonic.as_str().to_string(),
        })?;
        let name = canonical_operand(text, self.block).ok_or_else(|| IlError::InvalidOperand {
            line,
            operand: text.to_string(),
        })?;
        Ok(Expr::var(name))
    }

    fn target(&self, line: usize, instruction: &Instruction) -> Result<String, IlError> {
        match self.operand(line, instruction)? {
            Expr::Var(name) if !name.starts_with('[') => Ok(name),
            _ => Err(IlError::InvalidOperand {
                line,
                operand: instruction.operand.clone().unwrap_or_default(),
            }),
        }
    }

    /// 同一目标只保留一条赋值，后写入的表达式引用前值
    fn assign(&mut self, target: String, value: Expr) {
        match self.out.iter_mut().find(|a| a.target == target) {
            Some(existing) => {
                let composed = value.substitute(&target, &existing.expr);
                existing.expr = composed;
            }
            None => self.out.push(Assignment { target, expr: value }),
        }
    }
}

fn combine(join: Join, left: Expr, right: Expr) -> Expr {
    match join {
        Join::And => Expr::and(vec![left, right]),
        Join::Or => Expr::or(vec![left, right]),
    }
}

/// 操作数规范化：地址、块成员（`%TM0.Q`）、比较表达式；块段内的单个引脚名指当前块
pub fn canonical_operand(text: &str, block: Option<Address>) -> Option<String> {
    let text = text.trim();
    if text.starts_with('[') {
        return text.parse::<Comparison>().ok().map(|c| c.to_string());
    }
    if let Ok(address) = text.parse::<Address>() {
        return Some(address.to_string());
    }
    if let Some((base, member)) = text.rsplit_once('.') {
        let base = base.parse::<Address>().ok().filter(|a| a.kind().is_block())?;
        return is_pin(member).then(|| base.member(&member.to_ascii_uppercase()));
    }
    match block {
        Some(block) if is_pin(text) => Some(block.member(&text.to_ascii_uppercase())),
        _ => None,
    }
}

fn is_pin(text: &str) -> bool {
    !text.is_empty() && text.len() <= 3 && text.chars().all(|c| c.is_ascii_alphabetic())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(lines: &[&str]) -> Result<Vec<Assignment>, IlError> {
        let lines: Vec<Instruction> = lines.iter().map(|l| l.parse().unwrap()).collect();
        parse_instructions(&lines)
    }

    fn rendered(lines: &[&str]) -> Vec<String> {
        parse(lines)
            .unwrap()
            .iter()
            .map(|a| format!("{} = {}", a.target, a.expr.normalize()))
            .collect()
    }

    #[test]
    fn seal_in_rung_reads_as_latch() {
        let out = rendered(&["LD %I0.1", "OR %Q0.0", "ANDN %I0.2", "ST %Q0.0"]);
        assert_eq!(out, vec!["%Q0.0 = NOT %I0.2 AND (%I0.1 OR %Q0.0)"]);
    }

    #[test]
    fn parentheses_and_branch_stack() {
        let out = rendered(&[
            "LD %I0.0",
            "AND( %I0.1",
            "OR %I0.2",
            ")",
            "MPS",
            "AND %M0",
            "ST %Q0.0",
            "MPP",
            "ANDN %M0",
            "ST %Q0.1",
        ]);
        assert_eq!(
            out,
            vec![
                "%Q0.0 = %I0.0 AND %M0 AND (%I0.1 OR %I0.2)",
                "%Q0.1 = %I0.0 AND NOT %M0 AND (%I0.1 OR %I0.2)",
            ]
        );
    }

    #[test]
    fn timer_block_writes_input_pin_and_reads_done_bit() {
        let out = rendered(&[
            "BLK %TM0",
            "LD %I0.0",
            "IN",
            "OUT_BLK",
            "LD Q",
            "ST %Q0.1",
            "END_BLK",
        ]);
        assert_eq!(out, vec!["%TM0.IN = %I0.0", "%Q0.1 = %TM0.Q"]);
    }

    #[test]
    fn set_and_reset_compose_on_same_target() {
        let out = rendered(&["LD %I0.0", "S %M0", "LD %I0.1", "R %M0"]);
        assert_eq!(out, vec!["%M0 = NOT %I0.1 AND (%I0.0 OR %M0)"]);
    }

    #[test]
    fn rejects_unknown_mnemonics_and_bad_structure() {
        assert!(matches!(
            parse(&["LD %I0.0", "XOR %I0.1", "ST %Q0.0"]),
            Err(IlError::Unsupported { line: 2, .. })
        ));
        assert!(matches!(parse(&["AND %I0.0"]), Err(IlError::EmptyAccumulator { .. })));
        assert!(matches!(parse(&["LD %I0.0", ")"]), Err(IlError::Unbalanced { .. })));
        assert!(matches!(
            parse(&["LD %I0.0", "AND( %I0.1", "ST %Q0.0"]),
            Err(IlError::UnclosedParenthesis(1))
        ));
        assert!(matches!(parse(&["LD Q"]), Err(IlError::InvalidOperand { .. })));
    }

    #[test]
    fn canonicalizes_operands() {
        assert_eq!(canonical_operand("%i0.1", None).as_deref(), Some("%I0.1"));
        assert_eq!(canonical_operand("%tm2.q", None).as_deref(), Some("%TM2.Q"));
        assert_eq!(canonical_operand("[%MW0 > 5]", None).as_deref(), Some("[%MW0>5]"));
        let block = "%C1".parse().ok();
        assert_eq!(canonical_operand("D", block).as_deref(), Some("%C1.D"));
        assert_eq!(canonical_operand("%M0.Q", None), None);
    }
}
