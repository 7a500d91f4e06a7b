//! 程序文档：梯级列表 + 变量声明表 + 控制器/工程元数据。
//!
//! 文档只能经由装配器（`application::assembler`）构造，装配时已保证：
//! - 所有被引用的地址都在声明表中恰好出现一次；
//! - 定时器/计数器地址全局唯一；
//! - 别名（符号）全局唯一。

use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::address::{Address, AddressKind};
use super::rung::Rung;

/// 定时器类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TimerType {
    #[default]
    #[serde(rename = "TON")]
    Ton,
    #[serde(rename = "TOF")]
    Tof,
    #[serde(rename = "TP")]
    Tp,
}

impl TimerType {
    pub fn as_str(self) -> &'static str {
        match self {
            TimerType::Ton => "TON",
            TimerType::Tof => "TOF",
            TimerType::Tp => "TP",
        }
    }
}

impl FromStr for TimerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TON" => Ok(TimerType::Ton),
            "TOF" => Ok(TimerType::Tof),
            "TP" => Ok(TimerType::Tp),
            other => Err(format!("unknown timer type: {other}")),
        }
    }
}

/// 定时器时基
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TimeBase {
    OneMs,
    TenMs,
    HundredMs,
    #[default]
    OneSecond,
    OneMinute,
}

impl TimeBase {
    const ALL: [TimeBase; 5] = [
        TimeBase::OneMs,
        TimeBase::TenMs,
        TimeBase::HundredMs,
        TimeBase::OneSecond,
        TimeBase::OneMinute,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TimeBase::OneMs => "OneMs",
            TimeBase::TenMs => "TenMs",
            TimeBase::HundredMs => "HundredMs",
            TimeBase::OneSecond => "OneSecond",
            TimeBase::OneMinute => "OneMinute",
        }
    }
}

impl FromStr for TimeBase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        TimeBase::ALL
            .iter()
            .copied()
            .find(|base| base.as_str().eq_ignore_ascii_case(text))
            .ok_or_else(|| format!("unknown time base: {text}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerSettings {
    #[serde(default)]
    pub timer_type: TimerType,
    #[serde(default)]
    pub base: TimeBase,
    #[serde(default)]
    pub preset: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterSettings {
    #[serde(default)]
    pub preset: u32,
}

/// 声明附带的类别参数（只有功能块地址才有）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum DeclarationSettings {
    #[default]
    Plain,
    Timer(TimerSettings),
    Counter(CounterSettings),
}

impl DeclarationSettings {
    /// 按地址类别给出默认参数
    pub fn default_for(kind: AddressKind) -> Self {
        match kind {
            AddressKind::Timer => DeclarationSettings::Timer(TimerSettings::default()),
            AddressKind::Counter => DeclarationSettings::Counter(CounterSettings::default()),
            _ => DeclarationSettings::Plain,
        }
    }

    /// 参数类别是否与地址类别匹配
    pub fn fits(&self, kind: AddressKind) -> bool {
        match self {
            DeclarationSettings::Plain => !kind.is_block(),
            DeclarationSettings::Timer(_) => kind == AddressKind::Timer,
            DeclarationSettings::Counter(_) => kind == AddressKind::Counter,
        }
    }
}

/// 变量声明：地址 + 别名 + 注释 + 是否被使用
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Declaration {
    pub address: Address,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub used: bool,
    #[serde(default)]
    pub settings: DeclarationSettings,
}

impl Declaration {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            symbol: String::new(),
            comment: String::new(),
            used: false,
            settings: DeclarationSettings::default_for(address.kind()),
        }
    }

    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = symbol.into().trim().to_string();
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    pub fn with_timer(mut self, settings: TimerSettings) -> Self {
        self.settings = DeclarationSettings::Timer(settings);
        self
    }

    pub fn with_counter(mut self, settings: CounterSettings) -> Self {
        self.settings = DeclarationSettings::Counter(settings);
        self
    }

    pub fn timer(&self) -> Option<&TimerSettings> {
        match &self.settings {
            DeclarationSettings::Timer(settings) => Some(settings),
            _ => None,
        }
    }

    pub fn counter(&self) -> Option<&CounterSettings> {
        match &self.settings {
            DeclarationSettings::Counter(settings) => Some(settings),
            _ => None,
        }
    }
}

/// 声明表（按地址类别、编号有序）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeclarationTable {
    entries: BTreeMap<Address, Declaration>,
}

impl DeclarationTable {
    pub fn get(&self, address: &Address) -> Option<&Declaration> {
        self.entries.get(address)
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.entries.contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Declaration> {
        self.entries.values()
    }

    pub fn of_kind(&self, kind: AddressKind) -> impl Iterator<Item = &Declaration> {
        self.entries.values().filter(move |d| d.address.kind() == kind)
    }

    /// 别名表：(别名, 地址)，跳过空别名
    pub fn symbols(&self) -> impl Iterator<Item = (&str, Address)> {
        self.entries
            .values()
            .filter(|d| !d.symbol.is_empty())
            .map(|d| (d.symbol.as_str(), d.address))
    }

    /// 按别名查地址（大小写不敏感）
    pub fn lookup_symbol(&self, symbol: &str) -> Option<Address> {
        let symbol = symbol.trim();
        self.symbols()
            .find(|(name, _)| name.eq_ignore_ascii_case(symbol))
            .map(|(_, address)| address)
    }

    pub(crate) fn entry(&mut self, address: Address) -> btree_map::Entry<'_, Address, Declaration> {
        self.entries.entry(address)
    }

    pub(crate) fn get_mut(&mut self, address: &Address) -> Option<&mut Declaration> {
        self.entries.get_mut(address)
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Declaration> {
        self.entries.values_mut()
    }
}

impl<'a> IntoIterator for &'a DeclarationTable {
    type Item = &'a Declaration;
    type IntoIter = btree_map::Values<'a, Address, Declaration>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.values()
    }
}

/// 工程元数据
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectInfo {
    pub name: String,
    pub path: String,
    pub version: String,
    pub pou_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    controller: String,
    project: ProjectInfo,
    rungs: Vec<Rung>,
    declarations: DeclarationTable,
}

impl Document {
    pub(crate) fn from_parts(
        controller: String,
        project: ProjectInfo,
        rungs: Vec<Rung>,
        declarations: DeclarationTable,
    ) -> Self {
        Self {
            controller,
            project,
            rungs,
            declarations,
        }
    }

    /// 拆回梯级与声明（用于在现有文档上追加梯级后重新装配）
    pub fn into_parts(self) -> (Vec<Rung>, Vec<Declaration>) {
        (self.rungs, self.declarations.entries.into_values().collect())
    }

    pub fn controller(&self) -> &str {
        &self.controller
    }

    pub fn project(&self) -> &ProjectInfo {
        &self.project
    }

    pub fn rungs(&self) -> &[Rung] {
        &self.rungs
    }

    pub fn declarations(&self) -> &DeclarationTable {
        &self.declarations
    }

    pub fn contains_address(&self, address: &Address) -> bool {
        self.declarations.contains(address)
    }

    pub fn symbol_of(&self, address: &Address) -> Option<&str> {
        self.declarations
            .get(address)
            .map(|d| d.symbol.as_str())
            .filter(|s| !s.is_empty())
    }

    /// 别名或地址文本 → 地址；两者都不在声明表中时返回 None
    pub fn resolve_symbol(&self, name: &str) -> Option<Address> {
        if let Ok(address) = name.parse::<Address>() {
            return self.contains_address(&address).then_some(address);
        }
        self.declarations.lookup_symbol(name)
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] rungs={} declarations={}",
            self.project.name,
            self.controller,
            self.rungs.len(),
            self.declarations.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(text: &str) -> Address {
        text.parse().unwrap()
    }

    #[test]
    fn defaults_follow_address_kind() {
        assert_eq!(
            Declaration::new(addr("%TM0")).settings,
            DeclarationSettings::Timer(TimerSettings::default())
        );
        assert_eq!(
            Declaration::new(addr("%C1")).settings,
            DeclarationSettings::Counter(CounterSettings::default())
        );
        assert_eq!(Declaration::new(addr("%M0")).settings, DeclarationSettings::Plain);
    }

    #[test]
    fn settings_must_fit_kind() {
        let timer = DeclarationSettings::Timer(TimerSettings::default());
        assert!(timer.fits(AddressKind::Timer));
        assert!(!timer.fits(AddressKind::Counter));
        assert!(DeclarationSettings::Plain.fits(AddressKind::MemoryWord));
        assert!(!DeclarationSettings::Plain.fits(AddressKind::Timer));
    }

    #[test]
    fn symbols_resolve_case_insensitively() {
        let mut table = DeclarationTable::default();
        for decl in [
            Declaration::new(addr("%I0.1")).with_symbol("Start"),
            Declaration::new(addr("%Q0.0")).with_symbol(""),
        ] {
            table.entry(decl.address).or_insert(decl);
        }
        assert_eq!(table.lookup_symbol("START"), Some(addr("%I0.1")));
        assert_eq!(table.symbols().count(), 1);
        assert_eq!(table.lookup_symbol("Motor"), None);
    }

    #[test]
    fn timer_text_forms() {
        assert_eq!("ton".parse::<TimerType>().unwrap(), TimerType::Ton);
        assert_eq!("HundredMs".parse::<TimeBase>().unwrap(), TimeBase::HundredMs);
        assert!("fortnight".parse::<TimeBase>().is_err());
    }
}
