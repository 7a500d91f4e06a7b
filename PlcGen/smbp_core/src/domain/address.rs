//! 地址模型：SMBP 中的类型化内存引用（`%I0.1` / `%Q0.0` / `%MW10` / `%TM0` ...）。
//!
//! 约定：
//! - 文本形式大小写不敏感，统一规范为大写。
//! - I/Q 及模拟量地址必须带通道号（`模块.通道`），其余地址只有单一编号。

use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// 地址类别（声明表按此顺序输出）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AddressKind {
    DigitalInput,
    DigitalOutput,
    AnalogInput,
    AnalogOutput,
    MemoryBit,
    MemoryWord,
    MemoryFloat,
    Timer,
    Counter,
}

impl AddressKind {
    /// 前缀匹配顺序：长前缀必须排在短前缀之前（%IW 先于 %I，%MW/%MF 先于 %M）。
    const PARSE_ORDER: [AddressKind; 9] = [
        AddressKind::AnalogInput,
        AddressKind::AnalogOutput,
        AddressKind::DigitalInput,
        AddressKind::DigitalOutput,
        AddressKind::MemoryWord,
        AddressKind::MemoryFloat,
        AddressKind::MemoryBit,
        AddressKind::Timer,
        AddressKind::Counter,
    ];

    pub const ALL: [AddressKind; 9] = [
        AddressKind::DigitalInput,
        AddressKind::DigitalOutput,
        AddressKind::AnalogInput,
        AddressKind::AnalogOutput,
        AddressKind::MemoryBit,
        AddressKind::MemoryWord,
        AddressKind::MemoryFloat,
        AddressKind::Timer,
        AddressKind::Counter,
    ];

    pub fn prefix(self) -> &'static str {
        match self {
            AddressKind::DigitalInput => "%I",
            AddressKind::DigitalOutput => "%Q",
            AddressKind::AnalogInput => "%IW",
            AddressKind::AnalogOutput => "%QW",
            AddressKind::MemoryBit => "%M",
            AddressKind::MemoryWord => "%MW",
            AddressKind::MemoryFloat => "%MF",
            AddressKind::Timer => "%TM",
            AddressKind::Counter => "%C",
        }
    }

    /// 位地址：可以作为触点的操作数
    pub fn is_bit(self) -> bool {
        matches!(
            self,
            AddressKind::DigitalInput | AddressKind::DigitalOutput | AddressKind::MemoryBit
        )
    }

    /// 可被线圈驱动的位地址（输入映像不可写）
    pub fn is_writable_bit(self) -> bool {
        matches!(self, AddressKind::DigitalOutput | AddressKind::MemoryBit)
    }

    /// 数值地址：可出现在比较块中
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            AddressKind::AnalogInput
                | AddressKind::AnalogOutput
                | AddressKind::MemoryWord
                | AddressKind::MemoryFloat
        )
    }

    /// 功能块地址（定时器/计数器），在整个文档内必须唯一声明
    pub fn is_block(self) -> bool {
        matches!(self, AddressKind::Timer | AddressKind::Counter)
    }

    fn has_channel(self) -> bool {
        matches!(
            self,
            AddressKind::DigitalInput
                | AddressKind::DigitalOutput
                | AddressKind::AnalogInput
                | AddressKind::AnalogOutput
        )
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("address is empty")]
    Empty,

    #[error("unknown address prefix: {0}")]
    UnknownPrefix(String),

    #[error("invalid index in address {text}: {reason}")]
    InvalidIndex { text: String, reason: String },
}

/// 类型化地址：类别 + 编号（+ 通道号）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address {
    kind: AddressKind,
    index: u32,
    channel: Option<u32>,
}

impl Address {
    /// I/Q/IW/QW 构造（模块号 + 通道号）
    pub fn channel(kind: AddressKind, module: u32, channel: u32) -> Result<Self, AddressError> {
        if !kind.has_channel() {
            return Err(AddressError::InvalidIndex {
                text: format!("{}{}.{}", kind.prefix(), module, channel),
                reason: "this address kind has no channel".to_string(),
            });
        }
        Ok(Self {
            kind,
            index: module,
            channel: Some(channel),
        })
    }

    /// %M / %MW / %MF / %TM / %C 构造
    pub fn indexed(kind: AddressKind, index: u32) -> Result<Self, AddressError> {
        if kind.has_channel() {
            return Err(AddressError::InvalidIndex {
                text: format!("{}{}", kind.prefix(), index),
                reason: "this address kind requires module.channel".to_string(),
            });
        }
        Ok(Self {
            kind,
            index,
            channel: None,
        })
    }

    pub fn kind(&self) -> AddressKind {
        self.kind
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn channel_number(&self) -> Option<u32> {
        self.channel
    }

    /// 功能块成员变量名，例如 `%TM0.Q`、`%C1.CU`
    pub fn member(&self, pin: &str) -> String {
        format!("{self}.{pin}")
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.channel {
            Some(channel) => write!(f, "{}{}.{}", self.kind.prefix(), self.index, channel),
            None => write!(f, "{}{}", self.kind.prefix(), self.index),
        }
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim().to_ascii_uppercase();
        if text.is_empty() {
            return Err(AddressError::Empty);
        }

        let kind = AddressKind::PARSE_ORDER
            .iter()
            .copied()
            .find(|kind| {
                text.strip_prefix(kind.prefix())
                    .and_then(|rest| rest.chars().next())
                    .is_some_and(|c| c.is_ascii_digit())
            })
            .ok_or_else(|| AddressError::UnknownPrefix(text.clone()))?;

        let rest = &text[kind.prefix().len()..];
        let invalid = |reason: &str| AddressError::InvalidIndex {
            text: text.clone(),
            reason: reason.to_string(),
        };

        match rest.split_once('.') {
            Some((module, channel)) => {
                if !kind.has_channel() {
                    return Err(invalid("unexpected channel number"));
                }
                let module = parse_number(module).ok_or_else(|| invalid("bad module number"))?;
                let channel = parse_number(channel).ok_or_else(|| invalid("bad channel number"))?;
                Address::channel(kind, module, channel)
            }
            None => {
                if kind.has_channel() {
                    return Err(invalid("missing channel number"));
                }
                let index = parse_number(rest).ok_or_else(|| invalid("bad index"))?;
                Address::indexed(kind, index)
            }
        }
    }
}

fn parse_number(text: &str) -> Option<u32> {
    if text.is_empty() || !text.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_kind_and_canonicalizes_case() {
        let cases = [
            ("%I0.1", AddressKind::DigitalInput),
            ("%q0.0", AddressKind::DigitalOutput),
            ("%IW0.2", AddressKind::AnalogInput),
            ("%QW1.0", AddressKind::AnalogOutput),
            ("%M12", AddressKind::MemoryBit),
            ("%MW100", AddressKind::MemoryWord),
            ("%MF4", AddressKind::MemoryFloat),
            ("%tm0", AddressKind::Timer),
            ("%C3", AddressKind::Counter),
        ];
        for (text, kind) in cases {
            let address: Address = text.parse().unwrap();
            assert_eq!(address.kind(), kind, "{text}");
            assert_eq!(address.to_string(), text.to_ascii_uppercase());
        }
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert_eq!("".parse::<Address>(), Err(AddressError::Empty));
        assert!(matches!("%X1".parse::<Address>(), Err(AddressError::UnknownPrefix(_))));
        assert!(matches!("%I0".parse::<Address>(), Err(AddressError::InvalidIndex { .. })));
        assert!(matches!("%M1.2".parse::<Address>(), Err(AddressError::InvalidIndex { .. })));
        assert!(matches!("%TM-1".parse::<Address>(), Err(AddressError::UnknownPrefix(_))));
        assert!(matches!("%Q0.x".parse::<Address>(), Err(AddressError::InvalidIndex { .. })));
    }

    #[test]
    fn orders_numerically_within_kind() {
        let mut addresses: Vec<Address> = ["%MW10", "%MW2", "%I0.10", "%I0.2"]
            .iter()
            .map(|s| s.parse().unwrap())
            .collect();
        addresses.sort();
        let text: Vec<String> = addresses.iter().map(Address::to_string).collect();
        assert_eq!(text, vec!["%I0.2", "%I0.10", "%MW2", "%MW10"]);
    }

    #[test]
    fn serde_uses_text_form() {
        let address: Address = "%TM3".parse().unwrap();
        let json = serde_json::to_string(&address).unwrap();
        assert_eq!(json, "\"%TM3\"");
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, address);
        assert_eq!(address.member("Q"), "%TM3.Q");
    }
}
