//! 指令表（IL）镜像：每个梯级附带一段与梯形图等价的助记符序列。

use std::fmt;
use std::str::FromStr;

use super::address::Address;
use super::element::Comparison;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Mnemonic {
    Ld,
    Ldn,
    And,
    Andn,
    Or,
    Orn,
    AndOpen,
    AndnOpen,
    OrOpen,
    OrnOpen,
    Close,
    Not,
    St,
    Stn,
    /// `S x`：置位线圈
    Set,
    /// `R x`：复位线圈；块内无操作数时为复位引脚
    Reset,
    Mps,
    Mrd,
    Mpp,
    Blk,
    In,
    Cu,
    Cd,
    OutBlk,
    EndBlk,
    /// 未识别的助记符（XOR、边沿、运算块等），原样保留
    Other(String),
}

impl Mnemonic {
    pub fn as_str(&self) -> &str {
        match self {
            Mnemonic::Ld => "LD",
            Mnemonic::Ldn => "LDN",
            Mnemonic::And => "AND",
            Mnemonic::Andn => "ANDN",
            Mnemonic::Or => "OR",
            Mnemonic::Orn => "ORN",
            Mnemonic::AndOpen => "AND(",
            Mnemonic::AndnOpen => "ANDN(",
            Mnemonic::OrOpen => "OR(",
            Mnemonic::OrnOpen => "ORN(",
            Mnemonic::Close => ")",
            Mnemonic::Not => "NOT",
            Mnemonic::St => "ST",
            Mnemonic::Stn => "STN",
            Mnemonic::Set => "S",
            Mnemonic::Reset => "R",
            Mnemonic::Mps => "MPS",
            Mnemonic::Mrd => "MRD",
            Mnemonic::Mpp => "MPP",
            Mnemonic::Blk => "BLK",
            Mnemonic::In => "IN",
            Mnemonic::Cu => "CU",
            Mnemonic::Cd => "CD",
            Mnemonic::OutBlk => "OUT_BLK",
            Mnemonic::EndBlk => "END_BLK",
            Mnemonic::Other(text) => text,
        }
    }
}

impl From<&str> for Mnemonic {
    fn from(text: &str) -> Self {
        match text.to_ascii_uppercase().as_str() {
            "LD" => Mnemonic::Ld,
            "LDN" => Mnemonic::Ldn,
            "AND" => Mnemonic::And,
            "ANDN" => Mnemonic::Andn,
            "OR" => Mnemonic::Or,
            "ORN" => Mnemonic::Orn,
            "AND(" => Mnemonic::AndOpen,
            "ANDN(" => Mnemonic::AndnOpen,
            "OR(" => Mnemonic::OrOpen,
            "ORN(" => Mnemonic::OrnOpen,
            ")" => Mnemonic::Close,
            "NOT" => Mnemonic::Not,
            "ST" => Mnemonic::St,
            "STN" => Mnemonic::Stn,
            "S" => Mnemonic::Set,
            "R" => Mnemonic::Reset,
            "MPS" => Mnemonic::Mps,
            "MRD" => Mnemonic::Mrd,
            "MPP" => Mnemonic::Mpp,
            "BLK" => Mnemonic::Blk,
            "IN" => Mnemonic::In,
            "CU" => Mnemonic::Cu,
            "CD" => Mnemonic::Cd,
            "OUT_BLK" => Mnemonic::OutBlk,
            "END_BLK" => Mnemonic::EndBlk,
            _ => Mnemonic::Other(text.to_string()),
        }
    }
}

/// 一行指令：助记符 + 可选操作数 + 行注释
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub mnemonic: Mnemonic,
    pub operand: Option<String>,
    pub comment: String,
}

impl Instruction {
    pub fn new(mnemonic: Mnemonic, operand: impl fmt::Display) -> Self {
        Self {
            mnemonic,
            operand: Some(operand.to_string()),
            comment: String::new(),
        }
    }

    /// 无操作数指令（IN / OUT_BLK / END_BLK / `)` ...）
    pub fn bare(mnemonic: Mnemonic) -> Self {
        Self {
            mnemonic,
            operand: None,
            comment: String::new(),
        }
    }

    /// 操作数中引用的地址（`%TM0.Q` 之类的块成员取其块地址）
    pub fn referenced_addresses(&self) -> Vec<Address> {
        let Some(operand) = self.operand.as_deref() else {
            return Vec::new();
        };
        if operand.starts_with('[') {
            return operand
                .parse::<Comparison>()
                .map(|cmp| cmp.addresses())
                .unwrap_or_default();
        }
        let base = operand.split('.').take(2).collect::<Vec<_>>();
        // %I0.1 自身带点号；%TM0.Q 的点号后是成员名
        let candidate = match base.as_slice() {
            [head, tail] if tail.chars().all(|c| c.is_ascii_digit()) => format!("{head}.{tail}"),
            [head, ..] => head.to_string(),
            [] => return Vec::new(),
        };
        candidate.parse::<Address>().map(|a| vec![a]).unwrap_or_default()
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.operand {
            Some(operand) => write!(f, "{:<6}{}", self.mnemonic.as_str(), operand),
            None => f.write_str(self.mnemonic.as_str()),
        }
    }
}

impl FromStr for Instruction {
    type Err = std::convert::Infallible;

    /// 按空白切分：首个记号为助记符，其余为操作数（比较表达式内部可能含空格）
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let line = s.trim();
        let (head, rest) = match line.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (line, ""),
        };
        Ok(Self {
            mnemonic: Mnemonic::from(head),
            operand: if rest.is_empty() {
                None
            } else {
                Some(rest.to_string())
            },
            comment: String::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_with_padded_mnemonic() {
        let address: Address = "%I0.1".parse().unwrap();
        assert_eq!(Instruction::new(Mnemonic::Ld, address).to_string(), "LD    %I0.1");
        assert_eq!(Instruction::new(Mnemonic::Andn, "%I0.2").to_string(), "ANDN  %I0.2");
        assert_eq!(Instruction::bare(Mnemonic::OutBlk).to_string(), "OUT_BLK");
    }

    #[test]
    fn parses_lines_and_keeps_unknown_mnemonics() {
        let line: Instruction = "  ld   %q0.0 ".parse().unwrap();
        assert_eq!(line.mnemonic, Mnemonic::Ld);
        assert_eq!(line.operand.as_deref(), Some("%q0.0"));

        let cmp: Instruction = "AND   [%MW0 > 10]".parse().unwrap();
        assert_eq!(cmp.operand.as_deref(), Some("[%MW0 > 10]"));

        let xor: Instruction = "XOR %I0.0".parse().unwrap();
        assert_eq!(xor.mnemonic, Mnemonic::Other("XOR".to_string()));
    }

    #[test]
    fn resolves_referenced_addresses() {
        let refs = |line: &str| {
            line.parse::<Instruction>()
                .unwrap()
                .referenced_addresses()
                .iter()
                .map(Address::to_string)
                .collect::<Vec<_>>()
        };
        assert_eq!(refs("LD %I0.1"), vec!["%I0.1"]);
        assert_eq!(refs("BLK %TM0"), vec!["%TM0"]);
        assert_eq!(refs("LD %TM0.Q"), vec!["%TM0"]);
        assert_eq!(refs("LD [%MW0>%MW1]"), vec!["%MW0", "%MW1"]);
        assert!(refs("LD Q").is_empty());
        assert!(refs("IN").is_empty());
    }
}
