//! 文档装配：梯级 + 声明 → 完整文档。
//!
//! 装配时即保证文档不变量（而不是留给校验阶段）：
//! - 元件引用但未声明的地址自动登记：别名为空，used = true；
//! - 同一地址重复声明、别名重复、参数类别与地址类别不符都直接报错；
//! - 每个定时器/计数器实例只能放在一个功能块上（线圈不受此限）；
//! - 元件上的别名回填空的声明别名，随后元件别名统一同步为声明别名。

use std::collections::{BTreeMap, BTreeSet};
use std::collections::btree_map::Entry;

use log::debug;
use thiserror::Error;

use crate::adapters::smbp::SmbpConfig;
use crate::domain::{Address, Declaration, DeclarationTable, Document, Element, ProjectInfo, Rung};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AssemblyError {
    #[error("controller model is empty")]
    MissingController,

    #[error("address {0} is declared more than once")]
    DuplicateDeclaration(Address),

    #[error("symbol '{symbol}' is used by both {first} and {second}")]
    DuplicateSymbol {
        symbol: String,
        first: Address,
        second: Address,
    },

    #[error("declaration settings of {0} do not match its address kind")]
    SettingsMismatch(Address),

    #[error("block {0} is placed in more than one rung")]
    DuplicateBlock(Address),
}

#[derive(Debug, Clone)]
pub struct Assembler {
    project: ProjectInfo,
}

impl Assembler {
    pub fn new(config: &SmbpConfig) -> Self {
        Self {
            project: config.project_info(),
        }
    }

    /// 沿用已有工程信息（解析现有文件时）
    pub fn with_project(project: ProjectInfo) -> Self {
        Self { project }
    }

    pub fn project(&self) -> &ProjectInfo {
        &self.project
    }

    pub fn assemble(
        &self,
        controller: &str,
        mut rungs: Vec<Rung>,
        declared: Vec<Declaration>,
    ) -> Result<Document, AssemblyError> {
        let controller = controller.trim();
        if controller.is_empty() {
            return Err(AssemblyError::MissingController);
        }
        check_block_placement(&rungs)?;

        let mut table = DeclarationTable::default();
        for mut declaration in declared {
            if !declaration.settings.fits(declaration.address.kind()) {
                return Err(AssemblyError::SettingsMismatch(declaration.address));
            }
            declaration.symbol = declaration.symbol.trim().to_string();
            match table.entry(declaration.address) {
                Entry::Occupied(_) => {
                    return Err(AssemblyError::DuplicateDeclaration(declaration.address))
                }
                Entry::Vacant(slot) => {
                    slot.insert(declaration);
                }
            }
        }

        let mut registered = 0usize;
        for rung in &rungs {
            for address in rung.referenced_addresses() {
                let declaration = table.entry(address).or_insert_with(|| {
                    registered += 1;
                    Declaration::new(address)
                });
                declaration.used = true;
            }
        }

        // 元件别名回填空的声明别名
        for element in rungs.iter().flat_map(|r| r.elements()) {
            let (Some(address), Some(symbol)) = (element.address(), element.symbol()) else {
                continue;
            };
            if let Some(declaration) = table.get_mut(&address) {
                if declaration.symbol.is_empty() {
                    declaration.symbol = symbol.trim().to_string();
                }
            }
        }

        check_symbols(&table)?;

        for declaration in table.iter_mut() {
            declaration.used |= !declaration.symbol.is_empty();
        }

        for rung in &mut rungs {
            for element in rung.elements_mut() {
                let symbol = element
                    .address()
                    .and_then(|a| table.get(&a))
                    .map(|d| d.symbol.clone());
                element.set_symbol(symbol);
            }
        }

        debug!(
            "assembled {} rungs, {} declarations ({} auto-registered)",
            rungs.len(),
            table.len(),
            registered
        );
        Ok(Document::from_parts(
            controller.to_string(),
            self.project.clone(),
            rungs,
            table,
        ))
    }
}

/// 使用默认工程信息装配
pub fn assemble(
    controller: &str,
    rungs: Vec<Rung>,
    declared: Vec<Declaration>,
) -> Result<Document, AssemblyError> {
    Assembler::new(&SmbpConfig::m221()).assemble(controller, rungs, declared)
}

/// 梯级上放置的定时器/计数器实例
pub(crate) fn block_instances(rung: &Rung) -> impl Iterator<Item = Address> + '_ {
    rung.elements()
        .iter()
        .filter(|e| e.kind().is_block())
        .filter_map(Element::address)
}

pub(crate) fn check_block_placement(rungs: &[Rung]) -> Result<(), AssemblyError> {
    let mut placed = BTreeSet::new();
    for address in rungs.iter().flat_map(block_instances) {
        if !placed.insert(address) {
            return Err(AssemblyError::DuplicateBlock(address));
        }
    }
    Ok(())
}

fn check_symbols(table: &DeclarationTable) -> Result<(), AssemblyError> {
    let mut seen: BTreeMap<String, Address> = BTreeMap::new();
    for (symbol, address) in table.symbols() {
        match seen.entry(symbol.to_lowercase()) {
            Entry::Occupied(first) => {
                return Err(AssemblyError::DuplicateSymbol {
                    symbol: symbol.to_string(),
                    first: *first.get(),
                    second: address,
                })
            }
            Entry::Vacant(slot) => {
                slot.insert(address);
            }
        }
    }
    Ok(())
}
