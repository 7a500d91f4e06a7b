/*
SMBP 文本解析：文本 → 节点树 → 文档模型
说明：
- 先用 quick-xml 读成轻量节点树，再按路径映射到领域模型，最后交给装配器（与生成路径共用同一套不变量检查）。
- 读标签时顺带纠正常见拼写错误（RungEntry → RungEntity 等），纠正记录随结果返回。
- 严格模式遇错即停；宽松模式跳过无法映射的梯级/声明，保留其原始片段。
*/
use std::collections::{BTreeMap, BTreeSet};

use log::{debug, warn};
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Serialize;
use thiserror::Error;

use super::config::SmbpConfig;
use super::protocol::*;
use crate::application::assembler::{block_instances, AssemblyError, Assembler};
use crate::domain::{
    Address, AddressKind, Comparison, Connections, CounterSettings, Declaration, Document, Element,
    ElementKind, Instruction, LayoutError, Operand, ProjectInfo, Rung, TimerSettings,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("malformed XML at byte {position}: {message}")]
    Xml { position: usize, message: String },

    #[error("root element is <{0}>, expected <ProjectDescriptor>")]
    MissingRoot(String),

    #[error("missing section {0}")]
    MissingSection(String),

    #[error("invalid {path} '{value}': {reason}")]
    InvalidField {
        path: String,
        value: String,
        reason: String,
    },

    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error(transparent)]
    Assembly(#[from] AssemblyError),
}

/// 读取时纠正的标签拼写
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TagFix {
    pub found: String,
    pub corrected: String,
    pub count: usize,
}

/// 宽松解析时丢弃的片段
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DroppedFragment {
    pub section: String,
    pub index: usize,
    pub reason: String,
    pub raw: String,
}

#[derive(Debug, Clone)]
pub struct LenientParse {
    pub document: Document,
    pub tag_fixes: Vec<TagFix>,
    pub dropped: Vec<DroppedFragment>,
    /// 其他就地修正（重复声明、别名冲突、缺失的工程信息……）
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, Default)]
struct Node {
    name: String,
    text: String,
    children: Vec<Node>,
}

impl Node {
    fn child(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.name == name)
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Node> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    fn path(&self, path: &[&str]) -> Option<&Node> {
        path.iter().try_fold(self, |node, name| node.child(name))
    }

    fn text_of(&self, name: &str) -> Option<&str> {
        self.child(name).map(|c| c.text.trim())
    }

    fn render(&self, out: &mut String) {
        if self.children.is_empty() && self.text.is_empty() {
            out.push_str(&format!("<{} />", self.name));
            return;
        }
        out.push_str(&format!("<{}>", self.name));
        out.push_str(&escape(&self.text));
        for child in &self.children {
            child.render(out);
        }
        out.push_str(&format!("</{}>", self.name));
    }

    fn raw(&self) -> String {
        let mut out = String::new();
        self.render(&mut out);
        out
    }
}

struct Tree {
    root: Node,
    tag_fixes: Vec<TagFix>,
}

fn xml_error(reader: &Reader<&[u8]>, message: impl ToString) -> ParseError {
    ParseError::Xml {
        position: reader.buffer_position(),
        message: message.to_string(),
    }
}

/// 读成节点树；`strict = false` 时容忍错配/未闭合的标签
fn read_tree(text: &str, strict: bool) -> Result<Tree, ParseError> {
    let text = text.strip_prefix(BOM).unwrap_or(text);
    let mut reader = Reader::from_str(text);
    reader.trim_text(true);
    reader.check_end_names(false);

    let mut stack: Vec<Node> = vec![Node::default()];
    let mut fixes: BTreeMap<(String, &'static str), usize> = BTreeMap::new();
    let mut normalize = |raw: &[u8]| -> String {
        let name = String::from_utf8_lossy(raw).into_owned();
        match correct_tag(&name) {
            Some(corrected) => {
                *fixes.entry((name, corrected)).or_default() += 1;
                corrected.to_string()
            }
            None => name,
        }
    };

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = normalize(e.name().as_ref());
                stack.push(Node {
                    name,
                    ..Node::default()
                });
            }
            Ok(Event::Empty(e)) => {
                let name = normalize(e.name().as_ref());
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(Node {
                        name,
                        ..Node::default()
                    });
                }
            }
            Ok(Event::End(e)) => {
                let name = normalize(e.name().as_ref());
                let open = stack.iter().skip(1).rposition(|n| n.name == name).map(|i| i + 1);
                match open {
                    Some(at) if at == stack.len() - 1 => close_top(&mut stack),
                    Some(at) if !strict => {
                        warn!("closing </{name}> implicitly closes {} open tags", stack.len() - 1 - at);
                        while stack.len() > at {
                            close_top(&mut stack);
                        }
                    }
                    None if !strict => warn!("ignoring stray closing tag </{name}>"),
                    _ => {
                        let top = stack.last().map(|n| n.name.clone()).unwrap_or_default();
                        return Err(xml_error(
                            &reader,
                            format!("closing tag </{name}> does not match <{top}>"),
                        ));
                    }
                }
            }
            Ok(Event::Text(t)) => {
                let value = t.unescape().map_err(|err| xml_error(&reader, err))?;
                if let Some(node) = stack.last_mut() {
                    node.text.push_str(&value);
                }
            }
            Ok(Event::CData(c)) => {
                let value = String::from_utf8_lossy(&c.into_inner()).into_owned();
                if let Some(node) = stack.last_mut() {
                    node.text.push_str(&value);
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => return Err(xml_error(&reader, err)),
        }
    }

    if stack.len() > 1 {
        if strict {
            let open = stack.last().map(|n| n.name.clone()).unwrap_or_default();
            return Err(xml_error(&reader, format!("<{open}> is never closed")));
        }
        warn!("{} tags left open at end of input", stack.len() - 1);
        while stack.len() > 1 {
            close_top(&mut stack);
        }
    }

    let document = stack.pop().unwrap_or_default();
    let root = document
        .children
        .into_iter()
        .next()
        .ok_or_else(|| ParseError::MissingRoot(String::new()))?;

    drop(normalize);
    let tag_fixes = fixes
        .into_iter()
        .map(|((found, corrected), count)| TagFix {
            found,
            corrected: corrected.to_string(),
            count,
        })
        .collect();
    Ok(Tree { root, tag_fixes })
}

fn close_top(stack: &mut Vec<Node>) {
    if stack.len() < 2 {
        return;
    }
    if let Some(node) = stack.pop() {
        if let Some(parent) = stack.last_mut() {
            parent.children.push(node);
        }
    }
}

fn invalid(path: &str, value: &str, reason: impl ToString) -> ParseError {
    ParseError::InvalidField {
        path: path.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn required<'a>(node: &'a Node, tag: &str, owner: &str) -> Result<&'a str, ParseError> {
    node.text_of(tag)
        .ok_or_else(|| ParseError::MissingSection(format!("{owner}/{tag}")))
}

fn parse_bool(path: &str, text: &str) -> Result<bool, ParseError> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        other => Err(invalid(path, other, "expected true or false")),
    }
}

fn parse_number<T: std::str::FromStr>(path: &str, text: &str) -> Result<T, ParseError>
where
    T::Err: ToString,
{
    text.trim().parse().map_err(|err: T::Err| invalid(path, text, err))
}

fn map_element(node: &Node) -> Result<Element, ParseError> {
    let kind_text = required(node, ELEMENT_TYPE, LADDER_ENTITY)?;
    let kind: ElementKind = kind_text.parse()?;
    let descriptor = node.text_of(DESCRIPTOR).unwrap_or_default();
    let operand = match kind {
        ElementKind::Line => Operand::None,
        ElementKind::CompareBlock => Operand::Comparison(descriptor.parse::<Comparison>()?),
        _ => Operand::Address(
            descriptor
                .parse::<Address>()
                .map_err(|err| invalid("LadderEntity/Descriptor", descriptor, err))?,
        ),
    };
    let row: i64 = parse_number("LadderEntity/Row", required(node, ROW, LADDER_ENTITY)?)?;
    let column: i64 = parse_number("LadderEntity/Column", required(node, COLUMN, LADDER_ENTITY)?)?;
    let connections: Connections = node
        .text_of(CHOSEN_CONNECTION)
        .unwrap_or("None")
        .parse()?;

    Ok(Element::new(kind, operand, row, column, connections)?
        .with_symbol(node.text_of(SYMBOL).unwrap_or_default())
        .with_comment(node.text_of(COMMENT).unwrap_or_default()))
}

fn map_rung(node: &Node) -> Result<Rung, ParseError> {
    let elements = node
        .child(LADDER_ELEMENTS)
        .map(|list| list.children_named(LADDER_ENTITY).map(map_element).collect())
        .unwrap_or_else(|| Ok(Vec::new()))?;
    let instructions = node
        .child(INSTRUCTION_LINES)
        .map(|list| {
            list.children_named(INSTRUCTION_LINE_ENTITY)
                .filter_map(|entity| {
                    let line = entity.text_of(INSTRUCTION_LINE)?;
                    let mut instruction: Instruction = line.parse().ok()?;
                    instruction.comment = entity.text_of(COMMENT).unwrap_or_default().to_string();
                    Some(instruction)
                })
                .filter(|i| !i.mnemonic.as_str().is_empty())
                .collect()
        })
        .unwrap_or_default();

    let ladder_selected = match node.text_of(IS_LADDER_SELECTED) {
        Some(text) => parse_bool("RungEntity/IsLadderSelected", text)?,
        None => true,
    };
    Ok(Rung::new(
        node.text_of(NAME).unwrap_or_default(),
        node.text_of(MAIN_COMMENT).unwrap_or_default(),
        elements,
        instructions,
    )?
    .with_ladder_selected(ladder_selected))
}

fn map_declaration(node: &Node, kind: AddressKind) -> Result<Declaration, ParseError> {
    let text = required(node, ADDRESS, &node.name)?;
    let address: Address = text
        .parse()
        .map_err(|err| invalid(&format!("{}/Address", node.name), text, err))?;
    if address.kind() != kind {
        return Err(invalid(
            &format!("{}/Address", node.name),
            text,
            format!("expected a {kind:?} address"),
        ));
    }

    let mut declaration = Declaration::new(address)
        .with_symbol(node.text_of(SYMBOL).unwrap_or_default())
        .with_comment(node.text_of(COMMENT).unwrap_or_default());
    if let Some(used) = node.text_of(IS_USED) {
        declaration.used = parse_bool(&format!("{}/IsUsed", node.name), used)?;
    }

    match kind {
        AddressKind::Timer => {
            let mut settings = TimerSettings::default();
            if let Some(preset) = node.text_of(PRESET) {
                settings.preset = parse_number("TimerTM/Preset", preset)?;
            }
            if let Some(base) = node.text_of(BASE) {
                settings.base = base.parse().map_err(|err: String| invalid("TimerTM/Base", base, err))?;
            }
            if let Some(timer_type) = node.text_of(TIMER_TYPE) {
                settings.timer_type = timer_type
                    .parse()
                    .map_err(|err: String| invalid("TimerTM/TimerType", timer_type, err))?;
            }
            declaration = declaration.with_timer(settings);
        }
        AddressKind::Counter => {
            let mut settings = CounterSettings::default();
            if let Some(preset) = node.text_of(PRESET) {
                settings.preset = parse_number("Counter/Preset", preset)?;
            }
            declaration = declaration.with_counter(settings);
        }
        _ => {}
    }
    Ok(declaration)
}

/// 文档中可独立映射的各部分
struct Sections<'a> {
    project: ProjectInfo,
    controller: Option<String>,
    rungs: Vec<&'a Node>,
    declarations: Vec<(AddressKind, &'a Node)>,
    symbols: Vec<&'a Node>,
}

fn sections(root: &Node) -> Result<Sections<'_>, ParseError> {
    if root.name != ROOT {
        return Err(ParseError::MissingRoot(root.name.clone()));
    }
    let software = root.child(SOFTWARE_CONFIGURATION);
    let pou = software.and_then(|s| s.path(&[POUS, POU]));

    let text = |node: Option<&Node>, tag: &str| {
        node.and_then(|n| n.text_of(tag))
            .filter(|t| !t.is_empty())
            .map(str::to_string)
    };
    let defaults = SmbpConfig::m221().project_info();
    let project = ProjectInfo {
        name: text(Some(root), NAME).unwrap_or(defaults.name),
        path: text(Some(root), FULL_PATH).unwrap_or(defaults.path),
        version: text(Some(root), PROJECT_VERSION).unwrap_or(defaults.version),
        pou_name: text(pou, NAME).unwrap_or(defaults.pou_name),
    };
    let controller = text(root.path(&[HARDWARE_CONFIGURATION, PLC]), REFERENCE);

    let rungs = pou
        .and_then(|p| p.child(RUNGS))
        .map(|r| r.children_named(RUNG_ENTITY).collect())
        .unwrap_or_default();

    let mut declarations = Vec::new();
    if let Some(software) = software {
        for (kind, (section, item)) in AddressKind::ALL.iter().zip(DECLARATION_SECTIONS) {
            if let Some(section) = software.child(section) {
                declarations.extend(section.children_named(item).map(|node| (*kind, node)));
            }
        }
    }
    let symbols = software
        .and_then(|s| s.child(SYMBOL_TABLE))
        .map(|t| t.children_named(SYMBOL_ENTRY).collect())
        .unwrap_or_default();

    Ok(Sections {
        project,
        controller,
        rungs,
        declarations,
        symbols,
    })
}

/// 符号表条目回填声明别名
fn apply_symbol_table(
    symbols: &[&Node],
    declarations: &mut Vec<Declaration>,
) -> Result<(), ParseError> {
    for entry in symbols {
        let name = entry.text_of(NAME).unwrap_or_default();
        let text = entry.text_of(ADDRESS).unwrap_or_default();
        if name.is_empty() {
            continue;
        }
        let address: Address = text
            .parse()
            .map_err(|err| invalid("SymbolEntry/Address", text, err))?;
        match declarations.iter_mut().find(|d| d.address == address) {
            Some(declaration) if declaration.symbol.is_empty() => {
                declaration.symbol = name.to_string();
            }
            Some(_) => {}
            None => declarations.push(Declaration::new(address).with_symbol(name)),
        }
    }
    Ok(())
}

/// 严格解析：任何无法映射的片段都会导致失败
pub fn parse_document(text: &str) -> Result<Document, ParseError> {
    let tree = read_tree(text, true)?;
    let sections = sections(&tree.root)?;

    let controller = sections
        .controller
        .clone()
        .ok_or_else(|| ParseError::MissingSection("HardwareConfiguration/Plc/Reference".into()))?;
    let rungs = sections
        .rungs
        .iter()
        .map(|node| map_rung(node))
        .collect::<Result<Vec<_>, _>>()?;
    let mut declarations = sections
        .declarations
        .iter()
        .map(|(kind, node)| map_declaration(node, *kind))
        .collect::<Result<Vec<_>, _>>()?;
    apply_symbol_table(&sections.symbols, &mut declarations)?;

    let document = Assembler::with_project(sections.project).assemble(&controller, rungs, declarations)?;
    debug!("parsed {document}");
    Ok(document)
}

/// 宽松解析：跳过坏梯级/坏声明，纠正可纠正的冲突，其余保留为原始片段
pub fn parse_lenient(text: &str) -> Result<LenientParse, ParseError> {
    let mut tree = read_tree(text, false)?;
    let mut notes = Vec::new();
    scrub_placeholders(&mut tree.root, &mut notes);
    let sections = sections(&tree.root)?;
    let mut dropped = Vec::new();

    let controller = match &sections.controller {
        Some(controller) => controller.clone(),
        None => {
            let fallback = SmbpConfig::m221().controller;
            notes.push(format!("missing controller reference, using {fallback}"));
            fallback
        }
    };

    let mut rungs = Vec::new();
    let mut placed: BTreeSet<Address> = BTreeSet::new();
    for (index, node) in sections.rungs.iter().enumerate() {
        match map_rung(node) {
            Ok(rung) => {
                let blocks: Vec<Address> = block_instances(&rung).collect();
                if let Some(reused) = blocks.iter().find(|a| placed.contains(*a)) {
                    warn!("dropping rung {index}: block {reused} is already placed");
                    dropped.push(DroppedFragment {
                        section: RUNG_ENTITY.to_string(),
                        index,
                        reason: format!("block {reused} is already placed in another rung"),
                        raw: node.raw(),
                    });
                    continue;
                }
                placed.extend(blocks);
                rungs.push(rung);
            }
            Err(err) => {
                warn!("dropping rung {index}: {err}");
                dropped.push(DroppedFragment {
                    section: RUNG_ENTITY.to_string(),
                    index,
                    reason: err.to_string(),
                    raw: node.raw(),
                });
            }
        }
    }

    let mut declarations: Vec<Declaration> = Vec::new();
    for (index, (kind, node)) in sections.declarations.iter().enumerate() {
        match map_declaration(node, *kind) {
            Ok(declaration) if declarations.iter().any(|d| d.address == declaration.address) => {
                notes.push(format!("removed duplicate declaration of {}", declaration.address));
                dropped.push(DroppedFragment {
                    section: node.name.clone(),
                    index,
                    reason: format!("duplicate declaration of {}", declaration.address),
                    raw: node.raw(),
                });
            }
            Ok(declaration) => declarations.push(declaration),
            Err(err) => {
                warn!("dropping declaration {index}: {err}");
                dropped.push(DroppedFragment {
                    section: node.name.clone(),
                    index,
                    reason: err.to_string(),
                    raw: node.raw(),
                });
            }
        }
    }
    if let Err(err) = apply_symbol_table(&sections.symbols, &mut declarations) {
        notes.push(format!("symbol table ignored: {err}"));
    }
    dedupe_symbols(&mut rungs, &mut declarations, &mut notes);

    let document = Assembler::with_project(sections.project).assemble(&controller, rungs, declarations)?;
    Ok(LenientParse {
        document,
        tag_fixes: tree.tag_fixes,
        dropped,
        notes,
    })
}

/// 自由文本字段里的占位/退化值（null、NaN、undefined、[object Object]）清空；
/// 结构字段保持原样，交给映射阶段拒绝
fn scrub_placeholders(node: &mut Node, notes: &mut Vec<String>) {
    const FREE_TEXT: [&str; 5] = [NAME, COMMENT, MAIN_COMMENT, SYMBOL, LABEL];
    const PLACEHOLDERS: [&str; 3] = ["null", "NaN", "undefined"];

    let value = node.text.trim();
    let degenerate = PLACEHOLDERS.contains(&value) || value.contains("[object Object]");
    if degenerate && FREE_TEXT.contains(&node.name.as_str()) {
        notes.push(format!("cleared placeholder '{value}' in <{}>", node.name));
        node.text.clear();
    }
    for child in &mut node.children {
        scrub_placeholders(child, notes);
    }
}

/// 别名冲突时保留先出现的一方，后者清空
fn dedupe_symbols(rungs: &mut [Rung], declarations: &mut [Declaration], notes: &mut Vec<String>) {
    let mut owners: BTreeMap<String, Address> = BTreeMap::new();
    for declaration in declarations.iter_mut() {
        if declaration.symbol.is_empty() {
            continue;
        }
        let key = declaration.symbol.to_lowercase();
        match owners.get(&key).copied() {
            Some(owner) if owner != declaration.address => {
                notes.push(format!(
                    "cleared symbol '{}' on {}, already used by {owner}",
                    declaration.symbol, declaration.address
                ));
                declaration.symbol.clear();
            }
            _ => {
                owners.insert(key, declaration.address);
            }
        }
    }

    let declared: BTreeSet<Address> = declarations
        .iter()
        .filter(|d| !d.symbol.is_empty())
        .map(|d| d.address)
        .collect();
    for rung in rungs.iter_mut() {
        for element in rung.elements_mut() {
            let (Some(address), Some(symbol)) = (element.address(), element.symbol()) else {
                continue;
            };
            if declared.contains(&address) {
                continue;
            }
            let key = symbol.to_lowercase();
            match owners.get(&key).copied() {
                Some(owner) if owner != address => {
                    notes.push(format!(
                        "cleared symbol '{symbol}' on {address}, already used by {owner}"
                    ));
                    element.set_symbol(None);
                }
                _ => {
                    owners.insert(key, address);
                }
            }
        }
    }
}
